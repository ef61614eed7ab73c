#![warn(missing_docs, unused_imports)]

//! Fast base conversion between the coefficient base `q`, the auxiliary
//! base `Bsk`, and the `{plain, gamma}` base used in decryption rounding,
//! following the full-RNS variant of the FV scheme.

use crate::errors::{Error, Result};
use crate::ntt::NttTables;
use crate::zq::SmallModulus;
use ndarray::{Array1, Array2};
use num_bigint::BigUint;
use num_traits::cast::ToPrimitive;

/// `m_tilde`: the Montgomery factor used to clear the fast-conversion
/// overflow during multiplication.
const M_TILDE: u64 = 1 << 32;

/// `m_sk`: the extra prime extending the auxiliary base to `Bsk`.
const M_SK: u64 = 0x1fff_ffff_ffe0_0001;

/// `gamma`: the second modulus of the decryption-rounding base.
const GAMMA: u64 = 0x1fff_ffff_ffc8_0001;

/// The fixed table of 61-bit primes congruent to 1 modulo 2^18 from which
/// the auxiliary base is drawn; every entry supports the negacyclic NTT for
/// degrees up to 2^17.
const AUX_SMALL_MODS: [u64; 18] = [
    0x1fff_ffff_ffb4_0001,
    0x1fff_ffff_ff50_0001,
    0x1fff_ffff_ff38_0001,
    0x1fff_ffff_ff00_0001,
    0x1fff_ffff_fef0_0001,
    0x1fff_ffff_fee8_0001,
    0x1fff_ffff_feb4_0001,
    0x1fff_ffff_fe78_0001,
    0x1fff_ffff_fe60_0001,
    0x1fff_ffff_fe4c_0001,
    0x1fff_ffff_fdf4_0001,
    0x1fff_ffff_fdac_0001,
    0x1fff_ffff_fda4_0001,
    0x1fff_ffff_fc68_0001,
    0x1fff_ffff_fc00_0001,
    0x1fff_ffff_fb88_0001,
    0x1fff_ffff_fb7c_0001,
    0x1fff_ffff_fb30_0001,
];

fn reduce_big(value: &BigUint, modulus: &SmallModulus) -> u64 {
    (value % modulus.value()).to_u64().expect("residue fits u64")
}

fn invert_big(value: &BigUint, modulus: &SmallModulus) -> Result<u64> {
    modulus
        .inv(reduce_big(value, modulus))
        .map_err(|_| Error::BaseGenFailed("modular inverse does not exist"))
}

/// Precomputed state for fast conversions between the coefficient base
/// `q = (q_1, ..., q_k)`, the auxiliary base `Bsk = (m_1, ..., m_l, m_sk)`,
/// and the `{plain, gamma}` base. Immutable after construction; all
/// precomputation failures surface from the constructor as
/// [`Error::BaseGenFailed`], and the conversions are total afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseConverter {
    coeff_count: usize,
    coeff_base: Vec<SmallModulus>,
    aux_base: Vec<SmallModulus>,
    bsk_base: Vec<SmallModulus>,
    plain_gamma_base: [SmallModulus; 2],
    m_tilde: SmallModulus,
    m_sk: SmallModulus,

    // (q/q_i)^{-1} mod q_i
    inv_coeff_base_products_mod_coeff: Array1<u64>,
    // m_tilde * (q/q_i)^{-1} mod q_i
    mtilde_inv_coeff_base_products_mod_coeff: Array1<u64>,
    // (q/q_i) mod m, row-per-Bsk-modulus
    coeff_base_products_mod_aux_bsk: Array2<u64>,
    // (q/q_i) mod m_tilde
    coeff_base_products_mod_mtilde: Array1<u64>,
    // q^{-1} mod m, per Bsk modulus
    inv_coeff_products_all_mod_aux_bsk: Array1<u64>,
    // (B/m_j) mod q_i, row-per-coeff-modulus
    aux_base_products_mod_coeff: Array2<u64>,
    // (B/m_j)^{-1} mod m_j
    inv_aux_base_products_mod_aux: Array1<u64>,
    // (B/m_j) mod m_sk
    aux_base_products_mod_msk: Array1<u64>,
    // B^{-1} mod m_sk
    inv_aux_products_mod_msk: u64,
    // B mod q_i
    aux_products_all_mod_coeff: Array1<u64>,
    // m_tilde^{-1} mod m, per Bsk modulus
    inv_mtilde_mod_bsk: Array1<u64>,
    // q^{-1} mod m_tilde
    inv_coeff_products_mod_mtilde: u64,
    // q mod m, per Bsk modulus
    coeff_products_all_mod_bsk: Array1<u64>,
    // (q/q_i) mod m, row-per-{plain, gamma} modulus
    coeff_products_mod_plain_gamma: Array2<u64>,
    // (-q)^{-1} mod m, per {plain, gamma} modulus
    neg_inv_coeff_products_all_mod_plain_gamma: Array1<u64>,
    // plain * gamma mod q_i
    plain_gamma_product_mod_coeff: Array1<u64>,
    // gamma^{-1} mod plain
    inv_gamma_mod_plain: u64,

    bsk_ntt_tables: Vec<NttTables>,
}

impl BaseConverter {
    /// Perform all precomputation for the given coefficient base,
    /// polynomial degree `n = 2^coeff_count_power`, and plaintext modulus.
    pub fn new(
        coeff_base: &[SmallModulus],
        coeff_count_power: u32,
        plain: &SmallModulus,
    ) -> Result<Self> {
        if coeff_base.is_empty() {
            return Err(Error::BaseGenFailed("coefficient base cannot be empty"));
        }

        let k = coeff_base.len();
        let m_tilde = SmallModulus::new(M_TILDE).expect("fixed modulus is valid");
        let m_sk = SmallModulus::new(M_SK).expect("fixed modulus is valid");
        let gamma = SmallModulus::new(GAMMA).expect("fixed modulus is valid");

        // The auxiliary base matches the size of the coefficient base, one
        // larger when K * n * t * q^2 < q * B * m_sk could fail: 32 bits are
        // reserved for the cross-term factor, the table primes are 61 bits.
        let total_coeff_bits: u32 = coeff_base.iter().map(|q| q.bit_count()).sum();
        let mut aux_count = k;
        if 32 + plain.bit_count() + total_coeff_bits >= 61 * (k as u32) + 61 {
            aux_count += 1;
        }
        if aux_count > AUX_SMALL_MODS.len() {
            return Err(Error::BaseGenFailed("auxiliary base table exhausted"));
        }
        let aux_base = AUX_SMALL_MODS[..aux_count]
            .iter()
            .map(|m| SmallModulus::new(*m).expect("fixed modulus is valid"))
            .collect::<Vec<_>>();
        let mut bsk_base = aux_base.clone();
        bsk_base.push(m_sk);

        let bsk_ntt_tables = bsk_base
            .iter()
            .map(|m| NttTables::generate(coeff_count_power, m))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| Error::BaseGenFailed("auxiliary ntt tables"))?;

        let plain_gamma_base = [*plain, gamma];

        let coeff_products: Vec<BigUint> = (0..k)
            .map(|i| {
                coeff_base
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, q)| BigUint::from(q.value()))
                    .product()
            })
            .collect();
        let aux_products: Vec<BigUint> = (0..aux_count)
            .map(|j| {
                aux_base
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != j)
                    .map(|(_, m)| BigUint::from(m.value()))
                    .product()
            })
            .collect();
        let coeff_products_all: BigUint =
            coeff_base.iter().map(|q| BigUint::from(q.value())).product();
        let aux_products_all: BigUint =
            aux_base.iter().map(|m| BigUint::from(m.value())).product();

        // (q/q_i)^{-1} mod q_i and its m_tilde multiple.
        let mut inv_coeff_base_products_mod_coeff = Array1::zeros(k);
        let mut mtilde_inv_coeff_base_products_mod_coeff = Array1::zeros(k);
        for (i, q) in coeff_base.iter().enumerate() {
            let inverse = invert_big(&coeff_products[i], q)?;
            inv_coeff_base_products_mod_coeff[i] = inverse;
            mtilde_inv_coeff_base_products_mod_coeff[i] =
                q.mul(inverse, q.reduce(m_tilde.value()));
        }

        // (B/m_j)^{-1} mod m_j and (B/m_j) mod m_sk.
        let mut inv_aux_base_products_mod_aux = Array1::zeros(aux_count);
        let mut aux_base_products_mod_msk = Array1::zeros(aux_count);
        for (j, m) in aux_base.iter().enumerate() {
            inv_aux_base_products_mod_aux[j] = invert_big(&aux_products[j], m)?;
            aux_base_products_mod_msk[j] = reduce_big(&aux_products[j], &m_sk);
        }

        // (q/q_i) mod m for every m in Bsk, and mod m_tilde.
        let coeff_base_products_mod_aux_bsk =
            Array2::from_shape_fn((bsk_base.len(), k), |(j, i)| {
                reduce_big(&coeff_products[i], &bsk_base[j])
            });
        let coeff_base_products_mod_mtilde =
            Array1::from_shape_fn(k, |i| reduce_big(&coeff_products[i], &m_tilde));

        // q^{-1} mod m for every m in Bsk, and mod m_tilde.
        let inv_coeff_products_all_mod_aux_bsk = Array1::from_vec(
            bsk_base
                .iter()
                .map(|m| invert_big(&coeff_products_all, m))
                .collect::<Result<Vec<_>>>()?,
        );
        let inv_coeff_products_mod_mtilde = invert_big(&coeff_products_all, &m_tilde)?;

        // B^{-1} mod m_sk, B mod q_i, (B/m_j) mod q_i.
        let inv_aux_products_mod_msk = invert_big(&aux_products_all, &m_sk)?;
        let aux_products_all_mod_coeff =
            Array1::from_shape_fn(k, |i| reduce_big(&aux_products_all, &coeff_base[i]));
        let aux_base_products_mod_coeff = Array2::from_shape_fn((k, aux_count), |(i, j)| {
            reduce_big(&aux_products[j], &coeff_base[i])
        });

        // m_tilde^{-1} mod m for every m in Bsk.
        let inv_mtilde_mod_bsk = Array1::from_vec(
            bsk_base
                .iter()
                .map(|m| {
                    m.inv(m.reduce(m_tilde.value()))
                        .map_err(|_| Error::BaseGenFailed("m_tilde is not invertible"))
                })
                .collect::<Result<Vec<_>>>()?,
        );

        // q mod m for every m in Bsk.
        let coeff_products_all_mod_bsk = Array1::from_shape_fn(bsk_base.len(), |j| {
            reduce_big(&coeff_products_all, &bsk_base[j])
        });

        // (q/q_i) mod m and (-q)^{-1} mod m for m in {plain, gamma}.
        let coeff_products_mod_plain_gamma = Array2::from_shape_fn((2, k), |(j, i)| {
            reduce_big(&coeff_products[i], &plain_gamma_base[j])
        });
        let neg_inv_coeff_products_all_mod_plain_gamma = Array1::from_vec(
            plain_gamma_base
                .iter()
                .map(|m| {
                    m.inv(m.neg(reduce_big(&coeff_products_all, m)))
                        .map_err(|_| Error::BaseGenFailed("coefficient base meets plain base"))
                })
                .collect::<Result<Vec<_>>>()?,
        );

        // plain * gamma mod q_i, and gamma^{-1} mod plain.
        let plain_gamma_product_mod_coeff = Array1::from_shape_fn(k, |i| {
            let q = &coeff_base[i];
            q.mul(q.reduce(plain.value()), q.reduce(gamma.value()))
        });
        let inv_gamma_mod_plain = plain
            .inv(plain.reduce(gamma.value()))
            .map_err(|_| Error::BaseGenFailed("gamma is not invertible modulo plain"))?;

        Ok(Self {
            coeff_count: 1usize << coeff_count_power,
            coeff_base: coeff_base.to_vec(),
            aux_base,
            bsk_base,
            plain_gamma_base,
            m_tilde,
            m_sk,
            inv_coeff_base_products_mod_coeff,
            mtilde_inv_coeff_base_products_mod_coeff,
            coeff_base_products_mod_aux_bsk,
            coeff_base_products_mod_mtilde,
            inv_coeff_products_all_mod_aux_bsk,
            aux_base_products_mod_coeff,
            inv_aux_base_products_mod_aux,
            aux_base_products_mod_msk,
            inv_aux_products_mod_msk,
            aux_products_all_mod_coeff,
            inv_mtilde_mod_bsk,
            inv_coeff_products_mod_mtilde,
            coeff_products_all_mod_bsk,
            coeff_products_mod_plain_gamma,
            neg_inv_coeff_products_all_mod_plain_gamma,
            plain_gamma_product_mod_coeff,
            inv_gamma_mod_plain,
            bsk_ntt_tables,
        })
    }

    /// The polynomial degree `n`.
    pub fn coeff_count(&self) -> usize {
        self.coeff_count
    }

    /// The number of moduli in the coefficient base.
    pub fn coeff_base_mod_count(&self) -> usize {
        self.coeff_base.len()
    }

    /// The number of moduli in the auxiliary base (excluding `m_sk`).
    pub fn aux_base_mod_count(&self) -> usize {
        self.aux_base.len()
    }

    /// The number of moduli in `Bsk`.
    pub fn bsk_base_mod_count(&self) -> usize {
        self.bsk_base.len()
    }

    /// The moduli of `Bsk`.
    pub fn bsk_base(&self) -> &[SmallModulus] {
        &self.bsk_base
    }

    /// The `{plain, gamma}` base.
    pub fn plain_gamma_base(&self) -> &[SmallModulus; 2] {
        &self.plain_gamma_base
    }

    /// NTT tables for every modulus in `Bsk`.
    pub fn bsk_ntt_tables(&self) -> &[NttTables] {
        &self.bsk_ntt_tables
    }

    /// `(q/q_i)^{-1} mod q_i` for every coefficient modulus.
    pub fn inv_coeff_base_products_mod_coeff(&self) -> &Array1<u64> {
        &self.inv_coeff_base_products_mod_coeff
    }

    /// `plain * gamma mod q_i` for every coefficient modulus.
    pub fn plain_gamma_product_mod_coeff(&self) -> &Array1<u64> {
        &self.plain_gamma_product_mod_coeff
    }

    /// `(-q)^{-1} mod m` for `m` in `{plain, gamma}`.
    pub fn neg_inv_coeff_products_all_mod_plain_gamma(&self) -> &Array1<u64> {
        &self.neg_inv_coeff_products_all_mod_plain_gamma
    }

    /// `gamma^{-1} mod plain`.
    pub fn inv_gamma_mod_plain(&self) -> u64 {
        self.inv_gamma_mod_plain
    }

    /// Approximate base extension `q -> Bsk`.
    ///
    /// Uses `x_i * (q/q_i)^{-1} mod q_i` as the intermediate and evaluates
    /// `sum_i intermediate_i * (q/q_i) mod m` with 128-bit lazy
    /// accumulation. The lift is off from exact by at most `(k-1) * q`.
    pub fn fastbconv(&self, input: &[u64], destination: &mut [u64]) {
        let n = self.coeff_count;
        let k = self.coeff_base.len();
        debug_assert_eq!(input.len(), k * n);
        debug_assert_eq!(destination.len(), self.bsk_base.len() * n);

        let transition =
            self.coeff_transition(input, &self.inv_coeff_base_products_mod_coeff);
        self.sum_transition(
            &transition,
            &self.coeff_base_products_mod_aux_bsk,
            &self.bsk_base,
            destination,
        );
    }

    /// Base extension `q -> Bsk U {m_tilde}` with each intermediate
    /// premultiplied by `m_tilde mod q_i`; the `m_tilde` residues land in
    /// the final `n` entries of the destination.
    pub fn fastbconv_mtilde(&self, input: &[u64], destination: &mut [u64]) {
        let n = self.coeff_count;
        let k = self.coeff_base.len();
        let bsk = self.bsk_base.len();
        debug_assert_eq!(input.len(), k * n);
        debug_assert_eq!(destination.len(), (bsk + 1) * n);

        let transition =
            self.coeff_transition(input, &self.mtilde_inv_coeff_base_products_mod_coeff);
        self.sum_transition(
            &transition,
            &self.coeff_base_products_mod_aux_bsk,
            &self.bsk_base,
            &mut destination[..bsk * n],
        );

        // The m_tilde component.
        for kappa in 0..n {
            let mut acc: u128 = 0;
            for i in 0..k {
                acc += (transition[kappa * k + i] as u128)
                    * (self.coeff_base_products_mod_mtilde[i] as u128);
            }
            destination[bsk * n + kappa] = self.m_tilde.barrett_reduce_128(acc);
        }
    }

    /// Montgomery-style removal of the `m_tilde` overflow introduced by
    /// [`BaseConverter::fastbconv_mtilde`]: `Bsk U {m_tilde} -> Bsk`.
    pub fn mont_rq(&self, input: &[u64], destination: &mut [u64]) {
        let n = self.coeff_count;
        let bsk = self.bsk_base.len();
        debug_assert_eq!(input.len(), (bsk + 1) * n);
        debug_assert_eq!(destination.len(), bsk * n);

        let input_m_tilde = &input[bsk * n..];
        for (j, m) in self.bsk_base.iter().enumerate() {
            let q_mod_m = self.coeff_products_all_mod_bsk[j];
            let inv_mtilde = self.inv_mtilde_mod_bsk[j];
            for kappa in 0..n {
                let r_mtilde = self.m_tilde.neg(self.m_tilde.mul(
                    self.m_tilde.reduce(input_m_tilde[kappa]),
                    self.inv_coeff_products_mod_mtilde,
                ));
                let acc = (q_mod_m as u128) * (r_mtilde as u128)
                    + (input[j * n + kappa] as u128);
                destination[j * n + kappa] =
                    m.mul(m.barrett_reduce_128(acc), inv_mtilde);
            }
        }
    }

    /// Fast floor `q U Bsk -> Bsk`: computes `floor(x / q)` in `Bsk` given
    /// `x` expressed in both bases (the `q` residues first, then the `Bsk`
    /// residues).
    pub fn fast_floor(&self, input: &[u64], destination: &mut [u64]) {
        let n = self.coeff_count;
        let k = self.coeff_base.len();
        let bsk = self.bsk_base.len();
        debug_assert_eq!(input.len(), (k + bsk) * n);
        debug_assert_eq!(destination.len(), bsk * n);

        self.fastbconv(&input[..k * n], destination);

        let bsk_input = &input[k * n..];
        for (j, m) in self.bsk_base.iter().enumerate() {
            let inv_q = self.inv_coeff_products_all_mod_aux_bsk[j];
            for kappa in 0..n {
                let idx = j * n + kappa;
                // The negation need not be reduced before the multiply.
                destination[idx] = m.mul(
                    m.reduce(bsk_input[idx] + m.value() - destination[idx]),
                    inv_q,
                );
            }
        }
    }

    /// Exact conversion `Bsk -> q` by Shenoy-Kumaresan: a fast conversion
    /// from `B`, corrected by `alpha_sk` computed from the `m_sk` residue
    /// (interpreted as negative above `m_sk / 2`).
    pub fn fastbconv_sk(&self, input: &[u64], destination: &mut [u64]) {
        let n = self.coeff_count;
        let k = self.coeff_base.len();
        let aux = self.aux_base.len();
        debug_assert_eq!(input.len(), self.bsk_base.len() * n);
        debug_assert_eq!(destination.len(), k * n);

        // Fast convert B -> q.
        let mut transition = vec![0u64; aux * n];
        for (j, m) in self.aux_base.iter().enumerate() {
            let inverse = self.inv_aux_base_products_mod_aux[j];
            for kappa in 0..n {
                transition[kappa * aux + j] = m.mul(input[j * n + kappa], inverse);
            }
        }
        for (i, q) in self.coeff_base.iter().enumerate() {
            for kappa in 0..n {
                let mut acc: u128 = 0;
                for j in 0..aux {
                    acc += (transition[kappa * aux + j] as u128)
                        * (self.aux_base_products_mod_coeff[[i, j]] as u128);
                }
                destination[i * n + kappa] = q.barrett_reduce_128(acc);
            }
        }

        // Fast convert B -> m_sk and derive the correction alpha_sk.
        let msk_value = self.m_sk.value();
        let msk_div_2 = msk_value >> 1;
        let mut alpha_sk = vec![0u64; n];
        for kappa in 0..n {
            let mut acc: u128 = 0;
            for j in 0..aux {
                acc += (transition[kappa * aux + j] as u128)
                    * (self.aux_base_products_mod_msk[j] as u128);
            }
            let converted = self.m_sk.barrett_reduce_128(acc);
            // The negated m_sk residue need not be fully reduced.
            let negated = msk_value - input[aux * n + kappa];
            alpha_sk[kappa] = self.m_sk.mul(
                self.m_sk.reduce(converted + negated),
                self.inv_aux_products_mod_msk,
            );
        }

        for (i, q) in self.coeff_base.iter().enumerate() {
            let b_mod_q = self.aux_products_all_mod_coeff[i];
            for kappa in 0..n {
                let idx = i * n + kappa;
                let acc = if alpha_sk[kappa] > msk_div_2 {
                    // alpha_sk is centered; correct with its negation.
                    (b_mod_q as u128) * ((msk_value - alpha_sk[kappa]) as u128)
                        + (destination[idx] as u128)
                } else {
                    ((q.value() - b_mod_q) as u128) * (alpha_sk[kappa] as u128)
                        + (destination[idx] as u128)
                };
                destination[idx] = q.barrett_reduce_128(acc);
            }
        }
    }

    /// Base conversion `q -> {plain, gamma}` used by the decryption
    /// rescale.
    pub fn fastbconv_plain_gamma(&self, input: &[u64], destination: &mut [u64]) {
        let n = self.coeff_count;
        let k = self.coeff_base.len();
        debug_assert_eq!(input.len(), k * n);
        debug_assert_eq!(destination.len(), 2 * n);

        let transition =
            self.coeff_transition(input, &self.inv_coeff_base_products_mod_coeff);
        for (j, m) in self.plain_gamma_base.iter().enumerate() {
            let row = self.coeff_products_mod_plain_gamma.row(j);
            for kappa in 0..n {
                let mut acc: u128 = 0;
                for i in 0..k {
                    acc += (transition[kappa * k + i] as u128) * (row[i] as u128);
                }
                destination[j * n + kappa] = m.barrett_reduce_128(acc);
            }
        }
    }

    /// The per-coefficient intermediates `x_i * factor_i mod q_i`, laid out
    /// coefficient-major for the accumulation passes.
    fn coeff_transition(&self, input: &[u64], factors: &Array1<u64>) -> Vec<u64> {
        let n = self.coeff_count;
        let k = self.coeff_base.len();
        let mut transition = vec![0u64; k * n];
        for (i, q) in self.coeff_base.iter().enumerate() {
            let factor = factors[i];
            for kappa in 0..n {
                transition[kappa * k + i] = q.mul(input[i * n + kappa], factor);
            }
        }
        transition
    }

    /// Accumulate `sum_i transition_i * products[m][i]` modulo each modulus
    /// of `bases`, with 128-bit lazy accumulation. The 123-bit products can
    /// be summed 31 times without overflow, which bounds the coefficient
    /// base at 31 moduli; the fixed auxiliary table is far below that.
    fn sum_transition(
        &self,
        transition: &[u64],
        products: &Array2<u64>,
        bases: &[SmallModulus],
        destination: &mut [u64],
    ) {
        let n = self.coeff_count;
        let k = self.coeff_base.len();
        for (j, m) in bases.iter().enumerate() {
            let row = products.row(j);
            for kappa in 0..n {
                let mut acc: u128 = 0;
                for i in 0..k {
                    acc += (transition[kappa * k + i] as u128) * (row[i] as u128);
                }
                destination[j * n + kappa] = m.barrett_reduce_128(acc);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BaseConverter, GAMMA};
    use crate::zq::SmallModulus;
    use num_bigint::BigUint;
    use num_traits::cast::ToPrimitive;
    use rand::{thread_rng, Rng};

    fn residues(value: &BigUint, moduli: &[SmallModulus], n: usize, index: usize) -> Vec<u64> {
        // A polynomial whose only nonzero coefficient is `value` at `index`.
        let mut out = vec![0u64; moduli.len() * n];
        for (i, m) in moduli.iter().enumerate() {
            out[i * n + index] = (value % m.value()).to_u64().unwrap();
        }
        out
    }

    #[test]
    fn test_constructor() {
        let t = SmallModulus::new(3).unwrap();
        let q = [SmallModulus::new(17).unwrap()];
        let conv = BaseConverter::new(&q, 3, &t).unwrap();
        assert_eq!(conv.coeff_base_mod_count(), 1);
        assert_eq!(conv.aux_base_mod_count(), 1);
        assert_eq!(conv.bsk_base_mod_count(), 2);
        assert_eq!(conv.coeff_count(), 8);
        assert_eq!(conv.bsk_ntt_tables().len(), 2);

        assert!(BaseConverter::new(&[], 3, &t).is_err());

        // A wide plaintext modulus next to a full-width prime trips the +1
        // rule for the auxiliary base size.
        let t_wide = SmallModulus::new((1u64 << 30) + 3).unwrap();
        let q = [SmallModulus::new(4611686018427387761).unwrap()];
        let conv = BaseConverter::new(&q, 3, &t_wide).unwrap();
        assert_eq!(conv.aux_base_mod_count(), 2);
        assert_eq!(conv.bsk_base_mod_count(), 3);
    }

    #[test]
    fn test_fastbconv_exact_for_single_prime() {
        // With k = 1 the approximate lift has no error term.
        let t = SmallModulus::new(3).unwrap();
        let q = [SmallModulus::new(17).unwrap()];
        let conv = BaseConverter::new(&q, 1, &t).unwrap();
        let n = 2;

        for x in 0u64..17 {
            let input = vec![x, 0];
            let mut output = vec![0u64; conv.bsk_base_mod_count() * n];
            conv.fastbconv(&input, &mut output);
            for (j, m) in conv.bsk_base().iter().enumerate() {
                assert_eq!(output[j * n], x % m.value());
                assert_eq!(output[j * n + 1], 0);
            }
        }
    }

    #[test]
    fn test_fastbconv_close_for_two_primes() {
        let t = SmallModulus::new(3).unwrap();
        let q = [
            SmallModulus::new(1153).unwrap(),
            SmallModulus::new(786433).unwrap(),
        ];
        let conv = BaseConverter::new(&q, 2, &t).unwrap();
        let n = 4;
        let q_product = 1153u64 * 786433;

        let mut rng = thread_rng();
        for _ in 0..50 {
            let x = rng.gen_range(0..q_product);
            let input = residues(&BigUint::from(x), &q, n, 0);
            let mut output = vec![0u64; conv.bsk_base_mod_count() * n];
            conv.fastbconv(&input, &mut output);
            for (j, m) in conv.bsk_base().iter().enumerate() {
                // Off by at most (k-1) * q from the exact lift.
                let candidates =
                    [x % m.value(), (x + q_product) % m.value()];
                assert!(candidates.contains(&output[j * n]));
            }
        }
    }

    #[test]
    fn test_mtilde_then_montgomery_reduction() {
        let t = SmallModulus::new(3).unwrap();
        let q = [SmallModulus::new(17).unwrap()];
        let conv = BaseConverter::new(&q, 2, &t).unwrap();
        let n = 4;
        let bsk = conv.bsk_base_mod_count();

        for x in 0u64..17 {
            let input = residues(&BigUint::from(x), &[q[0]], n, 1);
            let mut mid = vec![0u64; (bsk + 1) * n];
            conv.fastbconv_mtilde(&input, &mut mid);
            let mut output = vec![0u64; bsk * n];
            conv.mont_rq(&mid, &mut output);

            // The result is x + alpha * q for alpha in {0, 1}, consistently
            // across the Bsk moduli.
            let matches_alpha = |alpha: u64| {
                conv.bsk_base()
                    .iter()
                    .enumerate()
                    .all(|(j, m)| output[j * n + 1] == (x + alpha * 17) % m.value())
            };
            assert!(matches_alpha(0) || matches_alpha(1));
        }
    }

    #[test]
    fn test_fast_floor_exact_for_single_prime() {
        let t = SmallModulus::new(3).unwrap();
        let q_mod = SmallModulus::new(17).unwrap();
        let conv = BaseConverter::new(&[q_mod], 1, &t).unwrap();
        let n = 2;
        let bsk = conv.bsk_base_mod_count();

        let mut rng = thread_rng();
        for _ in 0..100 {
            // floor(v / 17) for v below 17 * min(Bsk).
            let v: u64 = rng.gen_range(0..17 * 1_000_000);
            let expected = v / 17;

            let mut input = vec![0u64; (1 + bsk) * n];
            input[0] = v % 17;
            for (j, m) in conv.bsk_base().iter().enumerate() {
                input[n + j * n] = v % m.value();
            }
            let mut output = vec![0u64; bsk * n];
            conv.fast_floor(&input, &mut output);
            for (j, m) in conv.bsk_base().iter().enumerate() {
                assert_eq!(output[j * n], expected % m.value());
            }
        }
    }

    #[test]
    fn test_fastbconv_sk_exact() {
        let t = SmallModulus::new(3).unwrap();
        let q = [
            SmallModulus::new(1153).unwrap(),
            SmallModulus::new(786433).unwrap(),
        ];
        let conv = BaseConverter::new(&q, 2, &t).unwrap();
        let n = 4;

        let mut rng = thread_rng();
        for _ in 0..100 {
            // Values far below B * m_sk / 2 convert exactly.
            let v: u64 = rng.gen_range(0..1u64 << 40);
            let input = residues(&BigUint::from(v), conv.bsk_base(), n, 2);
            let mut output = vec![0u64; 2 * n];
            conv.fastbconv_sk(&input, &mut output);
            for (i, qi) in q.iter().enumerate() {
                assert_eq!(output[i * n + 2], v % qi.value());
            }
        }
    }

    #[test]
    fn test_fastbconv_plain_gamma_exact_for_single_prime() {
        let t = SmallModulus::new(3).unwrap();
        let q = [SmallModulus::new(17).unwrap()];
        let conv = BaseConverter::new(&q, 1, &t).unwrap();
        let n = 2;

        for x in 0u64..17 {
            let input = vec![x, 0];
            let mut output = vec![0u64; 2 * n];
            conv.fastbconv_plain_gamma(&input, &mut output);
            assert_eq!(output[0], x % 3);
            assert_eq!(output[n], x % GAMMA);
        }
    }

    #[test]
    fn test_gamma_inverse() {
        let t = SmallModulus::new(17).unwrap();
        let q = [SmallModulus::new(1153).unwrap()];
        let conv = BaseConverter::new(&q, 2, &t).unwrap();
        assert_eq!(
            t.mul(conv.inv_gamma_mod_plain(), t.reduce(GAMMA)),
            1
        );
        assert_eq!(conv.plain_gamma_base()[0].value(), 17);
        assert_eq!(conv.plain_gamma_base()[1].value(), GAMMA);
    }
}
