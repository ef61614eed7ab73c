#![warn(missing_docs, unused_imports)]

//! Negacyclic number-theoretic transform modulo a small prime, for the ring
//! `Z_q[x]/(x^n+1)` with `n` a power of two, in Harvey's lazy form.

use crate::errors::{Error, Result};
use crate::zq::{self, SmallModulus};
use bfv_util::reverse_bits;
use ndarray::Array1;
use rand::thread_rng;

/// Precomputed tables for the negacyclic NTT for one prime modulus.
///
/// The tables hold, in bit-reversed order, the powers of the minimal
/// primitive `2n`-th root of unity and of its inverse, each together with
/// the Harvey quotients `floor(power * 2^64 / q)`, plus the inverse powers
/// divided by two (the final `n^{-1}` adjustment is folded into the inverse
/// butterflies).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NttTables {
    root: u64,
    coeff_count_power: u32,
    coeff_count: usize,
    modulus: SmallModulus,
    root_powers: Array1<u64>,
    scaled_root_powers: Array1<u64>,
    inv_root_powers: Array1<u64>,
    scaled_inv_root_powers: Array1<u64>,
    inv_root_powers_div_two: Array1<u64>,
    scaled_inv_root_powers_div_two: Array1<u64>,
    inv_degree_modulo: u64,
}

impl NttTables {
    /// Generate the tables for polynomials of degree `n = 2^coeff_count_power`
    /// modulo `modulus`.
    ///
    /// Fails when `coeff_count_power` is zero, the modulus is smaller than 4,
    /// or no primitive `2n`-th root of unity exists (`q != 1 mod 2n`).
    pub fn generate(coeff_count_power: u32, modulus: &SmallModulus) -> Result<Self> {
        if coeff_count_power == 0 || coeff_count_power > 30 {
            return Err(Error::NttGenFailed("invalid polynomial degree"));
        }
        if modulus.value() < 4 {
            return Err(Error::NttGenFailed("modulus too small"));
        }

        let n = 1usize << coeff_count_power;
        let root = zq::try_minimal_primitive_root(2 * n as u64, modulus, &mut thread_rng())?;
        let inv_root = modulus.inv(root)?;

        let root_powers = Self::powers_of_primitive_root(root, n, coeff_count_power, modulus);
        let scaled_root_powers = Self::scale_powers_of_primitive_root(&root_powers, modulus);
        let inv_root_powers = Self::powers_of_primitive_root(inv_root, n, coeff_count_power, modulus);
        let scaled_inv_root_powers = Self::scale_powers_of_primitive_root(&inv_root_powers, modulus);
        let inv_root_powers_div_two = inv_root_powers.mapv(|p| modulus.half(p));
        let scaled_inv_root_powers_div_two =
            Self::scale_powers_of_primitive_root(&inv_root_powers_div_two, modulus);

        let inv_degree_modulo = modulus.inv(modulus.reduce(n as u64))?;

        Ok(Self {
            root,
            coeff_count_power,
            coeff_count: n,
            modulus: *modulus,
            root_powers,
            scaled_root_powers,
            inv_root_powers,
            scaled_inv_root_powers,
            inv_root_powers_div_two,
            scaled_inv_root_powers_div_two,
            inv_degree_modulo,
        })
    }

    /// The minimal primitive `2n`-th root of unity the tables were built on.
    pub const fn root(&self) -> u64 {
        self.root
    }

    /// The modulus the tables were built on.
    pub const fn modulus(&self) -> &SmallModulus {
        &self.modulus
    }

    /// The polynomial degree `n`.
    pub const fn coeff_count(&self) -> usize {
        self.coeff_count
    }

    /// `log2(n)`.
    pub const fn coeff_count_power(&self) -> u32 {
        self.coeff_count_power
    }

    /// The inverse of the degree modulo `q`.
    pub const fn inv_degree_modulo(&self) -> u64 {
        self.inv_degree_modulo
    }

    /// The bit-scrambled powers of the root, with their Harvey quotients.
    pub fn root_powers(&self) -> (&Array1<u64>, &Array1<u64>) {
        (&self.root_powers, &self.scaled_root_powers)
    }

    /// The bit-scrambled powers of the inverse root, with their Harvey
    /// quotients.
    pub fn inv_root_powers(&self) -> (&Array1<u64>, &Array1<u64>) {
        (&self.inv_root_powers, &self.scaled_inv_root_powers)
    }

    /// Bit-scrambled powers of `root`: entry `bitrev(i)` holds `root^i`.
    fn powers_of_primitive_root(
        root: u64,
        n: usize,
        coeff_count_power: u32,
        modulus: &SmallModulus,
    ) -> Array1<u64> {
        let mut powers = Array1::zeros(n);
        powers[0] = 1;
        let mut power = 1u64;
        for i in 1..n {
            power = modulus.mul(power, root);
            powers[reverse_bits(i as u32, coeff_count_power) as usize] = power;
        }
        powers
    }

    /// Harvey quotients `floor(power * 2^64 / q)`.
    fn scale_powers_of_primitive_root(powers: &Array1<u64>, modulus: &SmallModulus) -> Array1<u64> {
        powers.mapv(|p| (((p as u128) << 64) / (modulus.value() as u128)) as u64)
    }

    /// In-place forward negacyclic NTT in the lazy form: Cooley-Tukey
    /// decimation in time with Harvey butterflies, all intermediate
    /// coefficients kept in `[0, 4q)`, output in bit-reversed order.
    pub fn forward_lazy(&self, operand: &mut [u64]) {
        debug_assert_eq!(operand.len(), self.coeff_count);

        let n = self.coeff_count;
        let q = self.modulus.value();
        let two_q = q << 1;

        let mut t = n;
        let mut m = 1;
        while m < n {
            t >>= 1;
            for i in 0..m {
                let j1 = 2 * i * t;
                let w = self.root_powers[m + i];
                let w_quot = self.scaled_root_powers[m + i];
                for j in j1..j1 + t {
                    // The Harvey butterfly: X, Y in [0, 4q) to X', Y' in
                    // [0, 4q), with X', Y' = X + WY, X - WY (mod q).
                    let mut x = operand[j];
                    let y = operand[j + t];
                    if x >= two_q {
                        x -= two_q;
                    }
                    let quot = (((w_quot as u128) * (y as u128)) >> 64) as u64;
                    let wy = w.wrapping_mul(y).wrapping_sub(quot.wrapping_mul(q));
                    operand[j] = x + wy;
                    operand[j + t] = x + two_q - wy;
                }
            }
            m <<= 1;
        }
    }

    /// In-place forward negacyclic NTT; the output coefficients are fully
    /// reduced into `[0, q)`.
    pub fn forward(&self, operand: &mut [u64]) {
        self.forward_lazy(operand);

        let q = self.modulus.value();
        let two_q = q << 1;
        for x in operand.iter_mut() {
            if *x >= two_q {
                *x -= two_q;
            }
            if *x >= q {
                *x -= q;
            }
        }
    }

    /// In-place inverse negacyclic NTT in the lazy form: Gentleman-Sande
    /// decimation in frequency, the `n^{-1}` and inverse-root factors folded
    /// into the precomputed constants, output in `[0, 2q)`.
    ///
    /// The input must be in bit-reversed order with coefficients in `[0, 2q)`.
    pub fn backward_lazy(&self, operand: &mut [u64]) {
        debug_assert_eq!(operand.len(), self.coeff_count);

        let n = self.coeff_count;
        let q = self.modulus.value();
        let two_q = q << 1;

        let mut t = 1;
        let mut m = n;
        while m > 1 {
            let h = m >> 1;
            let mut j1 = 0;
            for i in 0..h {
                let w = self.inv_root_powers_div_two[h + i];
                let w_quot = self.scaled_inv_root_powers_div_two[h + i];
                for j in j1..j1 + t {
                    let u = operand[j];
                    let v = operand[j + t];

                    let tt = u + two_q - v;

                    let mut sum = u + v;
                    if sum >= two_q {
                        sum -= two_q;
                    }
                    // Halve modulo q; sum is below 2q so the add cannot
                    // overflow 64 bits.
                    operand[j] = if sum & 1 == 1 {
                        (sum + q) >> 1
                    } else {
                        sum >> 1
                    };

                    let quot = (((w_quot as u128) * (tt as u128)) >> 64) as u64;
                    operand[j + t] = w.wrapping_mul(tt).wrapping_sub(quot.wrapping_mul(q));
                }
                j1 += t << 1;
            }
            t <<= 1;
            m = h;
        }
    }

    /// In-place inverse negacyclic NTT; the output coefficients are fully
    /// reduced into `[0, q)`.
    pub fn backward(&self, operand: &mut [u64]) {
        self.backward_lazy(operand);

        let q = self.modulus.value();
        for x in operand.iter_mut() {
            if *x >= q {
                *x -= q;
            }
        }
    }
}
