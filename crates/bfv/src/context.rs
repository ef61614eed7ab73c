//! Validation of an encryption-parameter set and the derived
//! precomputation shared by every operation.

use crate::errors::{Error, Result};
use crate::parameters::EncryptionParameters;
use bfv_math::ntt::NttTables;
use bfv_math::rns::BaseConverter;
use bfv_math::zq::SmallModulus;
use num_bigint::BigUint;
use num_traits::cast::ToPrimitive;

/// Derived booleans describing which algorithms the parameters enable.
///
/// `parameters_set` implies both `enable_fft` and `enable_ntt`; every
/// downstream component reads the flags at construction time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncryptionParameterQualifiers {
    /// The parameters passed every validation step.
    pub parameters_set: bool,
    /// The polynomial modulus is `x^n + 1` with `n` a power of two.
    pub enable_fft: bool,
    /// Every coefficient modulus satisfies `q_i = 1 mod 2n`.
    pub enable_ntt: bool,
    /// The plaintext modulus additionally satisfies `t = 1 mod 2n`.
    pub enable_batching: bool,
    /// The plaintext modulus is below every coefficient modulus, enabling
    /// the per-prime plaintext lift.
    pub enable_fast_plain_lift: bool,
    /// A nonzero decomposition bit count enables relinearization.
    pub enable_relinearization: bool,
}

/// A frozen parameter-set handle carrying all precomputation: the
/// qualifiers, the per-prime NTT tables, the base converter, the product of
/// the coefficient base, the CRT composition factors, and the
/// plaintext-lift constants.
///
/// Immutable after construction and safe to share across threads.
#[derive(Debug)]
pub struct Context {
    parms: EncryptionParameters,
    qualifiers: EncryptionParameterQualifiers,
    coeff_count_power: u32,
    coeff_ntt_tables: Vec<NttTables>,
    plain_ntt_tables: Option<NttTables>,
    base_converter: BaseConverter,
    total_coeff_modulus: BigUint,

    // Garner factors (q/q_i) * [(q/q_i)^{-1}]_{q_i} for CRT composition.
    garner: Vec<BigUint>,

    // floor(q/t) mod q_i, and (q - floor(q/t) * t) mod q_i.
    coeff_div_plain_modulus: Vec<u64>,
    upper_half_increment: Vec<u64>,
    // (t + 1) / 2.
    plain_upper_half_threshold: u64,
    // q - t, and q_i - t when the fast plain lift is enabled.
    plain_upper_half_increment: BigUint,
    plain_upper_half_increment_array: Vec<u64>,
}

impl Context {
    /// Validate `parms` and perform all precomputation.
    ///
    /// Fails with [`Error::InvalidParameters`] when the degree is not a
    /// power of two at least 2, a coefficient modulus is not prime or not
    /// congruent to 1 modulo `2n`, the coefficient base repeats a prime,
    /// the plaintext modulus reaches the product of the coefficient base,
    /// or the decomposition bit count is out of range.
    pub fn new(parms: EncryptionParameters) -> Result<Self> {
        let degree = parms.poly_modulus_degree();
        if degree < 2 || !degree.is_power_of_two() {
            return Err(Error::InvalidParameters);
        }
        let coeff_count_power = degree.trailing_zeros();

        if parms.coeff_modulus().is_empty() || parms.plain_modulus().is_zero() {
            return Err(Error::InvalidParameters);
        }
        if parms.noise_standard_deviation() < 0.0 || parms.noise_max_deviation() < 0.0 {
            return Err(Error::InvalidParameters);
        }

        // The coefficient base must consist of distinct primes; distinct
        // primes are pairwise coprime.
        for (i, q) in parms.coeff_modulus().iter().enumerate() {
            if !bfv_util::is_prime(q.value()) {
                return Err(Error::InvalidParameters);
            }
            if parms.coeff_modulus()[..i].iter().any(|p| p.value() == q.value()) {
                return Err(Error::InvalidParameters);
            }
        }

        let total_coeff_modulus: BigUint = parms
            .coeff_modulus()
            .iter()
            .map(|q| BigUint::from(q.value()))
            .product();
        if BigUint::from(parms.plain_modulus().value()) >= total_coeff_modulus {
            return Err(Error::InvalidParameters);
        }

        let mut qualifiers = EncryptionParameterQualifiers {
            enable_fft: true,
            ..Default::default()
        };

        // The NTT must be available for every coefficient modulus.
        let coeff_ntt_tables = parms
            .coeff_modulus()
            .iter()
            .map(|q| NttTables::generate(coeff_count_power, q))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| Error::InvalidParameters)?;
        qualifiers.enable_ntt = true;

        // Batching additionally needs the NTT for the plaintext modulus.
        let plain_ntt_tables = NttTables::generate(coeff_count_power, parms.plain_modulus()).ok();
        qualifiers.enable_batching = plain_ntt_tables.is_some();

        qualifiers.enable_fast_plain_lift = parms
            .coeff_modulus()
            .iter()
            .all(|q| parms.plain_modulus().value() < q.value());

        let total_bits = total_coeff_modulus.bits() as u32;
        let w = parms.decomposition_bit_count();
        if w > 0 {
            if w >= total_bits {
                return Err(Error::InvalidParameters);
            }
            qualifiers.enable_relinearization = true;
        }

        let base_converter = BaseConverter::new(
            parms.coeff_modulus(),
            coeff_count_power,
            parms.plain_modulus(),
        )
        .map_err(|_| Error::InvalidParameters)?;

        // Garner factors for CRT composition.
        let garner = parms
            .coeff_modulus()
            .iter()
            .map(|q| {
                let q_hat = &total_coeff_modulus / q.value();
                let q_hat_mod = (&q_hat % q.value()).to_u64().expect("residue fits u64");
                let q_hat_inv = q.inv(q_hat_mod)?;
                Ok(q_hat * q_hat_inv)
            })
            .collect::<Result<Vec<_>>>()?;

        // Plaintext lift constants.
        let t = parms.plain_modulus().value();
        let delta = &total_coeff_modulus / t;
        let coeff_div_plain_modulus = parms
            .coeff_modulus()
            .iter()
            .map(|q| (&delta % q.value()).to_u64().expect("residue fits u64"))
            .collect();
        let upper_half_big = &total_coeff_modulus - &delta * t;
        let upper_half_increment = parms
            .coeff_modulus()
            .iter()
            .map(|q| (&upper_half_big % q.value()).to_u64().expect("residue fits u64"))
            .collect();
        let plain_upper_half_threshold = (t + 1) >> 1;
        let plain_upper_half_increment = &total_coeff_modulus - t;
        let plain_upper_half_increment_array = if qualifiers.enable_fast_plain_lift {
            parms
                .coeff_modulus()
                .iter()
                .map(|q| q.value() - t)
                .collect()
        } else {
            Vec::new()
        };

        qualifiers.parameters_set = true;

        Ok(Self {
            parms,
            qualifiers,
            coeff_count_power,
            coeff_ntt_tables,
            plain_ntt_tables,
            base_converter,
            total_coeff_modulus,
            garner,
            coeff_div_plain_modulus,
            upper_half_increment,
            plain_upper_half_threshold,
            plain_upper_half_increment,
            plain_upper_half_increment_array,
        })
    }

    /// The frozen parameters.
    pub fn parms(&self) -> &EncryptionParameters {
        &self.parms
    }

    /// The derived qualifiers.
    pub fn qualifiers(&self) -> &EncryptionParameterQualifiers {
        &self.qualifiers
    }

    /// The polynomial degree `n`.
    pub fn poly_modulus_degree(&self) -> usize {
        self.parms.poly_modulus_degree()
    }

    /// `log2(n)`.
    pub fn coeff_count_power(&self) -> u32 {
        self.coeff_count_power
    }

    /// The coefficient base.
    pub fn coeff_modulus(&self) -> &[SmallModulus] {
        self.parms.coeff_modulus()
    }

    /// The number of moduli in the coefficient base.
    pub fn coeff_mod_count(&self) -> usize {
        self.parms.coeff_modulus().len()
    }

    /// The plaintext modulus.
    pub fn plain_modulus(&self) -> &SmallModulus {
        self.parms.plain_modulus()
    }

    /// NTT tables for every coefficient modulus.
    pub fn coeff_ntt_tables(&self) -> &[NttTables] {
        &self.coeff_ntt_tables
    }

    /// NTT tables for the plaintext modulus, present when batching is
    /// enabled.
    pub fn plain_ntt_tables(&self) -> Option<&NttTables> {
        self.plain_ntt_tables.as_ref()
    }

    /// The base converter.
    pub fn base_converter(&self) -> &BaseConverter {
        &self.base_converter
    }

    /// The product of the coefficient base.
    pub fn total_coeff_modulus(&self) -> &BigUint {
        &self.total_coeff_modulus
    }

    /// The CRT composition factors `(q/q_i) * [(q/q_i)^{-1}]_{q_i}`.
    pub fn garner(&self) -> &[BigUint] {
        &self.garner
    }

    /// `floor(q/t) mod q_i`.
    pub fn coeff_div_plain_modulus(&self) -> &[u64] {
        &self.coeff_div_plain_modulus
    }

    /// `(q - floor(q/t) * t) mod q_i`.
    pub fn upper_half_increment(&self) -> &[u64] {
        &self.upper_half_increment
    }

    /// `(t + 1) / 2`: plaintext coefficients at or above this value
    /// represent negatives and are lifted with an increment.
    pub fn plain_upper_half_threshold(&self) -> u64 {
        self.plain_upper_half_threshold
    }

    /// `q - t` as a big integer, for the exact plaintext lift.
    pub fn plain_upper_half_increment(&self) -> &BigUint {
        &self.plain_upper_half_increment
    }

    /// `q_i - t` for every coefficient modulus; empty unless the fast
    /// plain lift is enabled.
    pub fn plain_upper_half_increment_array(&self) -> &[u64] {
        &self.plain_upper_half_increment_array
    }

    /// The fingerprint of the frozen parameters.
    pub fn fingerprint(&self) -> &crate::parameters::Fingerprint {
        self.parms.fingerprint()
    }

    /// Compose RNS residues (prime-major, one residue polynomial per
    /// coefficient modulus) into big-integer coefficients modulo `q`.
    pub fn compose(&self, residues: &[u64]) -> Vec<BigUint> {
        let n = self.poly_modulus_degree();
        let k = self.coeff_mod_count();
        debug_assert_eq!(residues.len(), k * n);

        (0..n)
            .map(|kappa| {
                let mut acc = BigUint::default();
                for i in 0..k {
                    acc += &self.garner[i] * residues[i * n + kappa];
                }
                acc % &self.total_coeff_modulus
            })
            .collect()
    }
}
