//! Encryption parameters and their 128-bit fingerprint.

use crate::errors::Result;
use crate::serialization::{invalid_data, read_f64, read_u32, write_f64, write_u32, write_u64};
use bfv_math::zq::SmallModulus;
use sha2::{Digest, Sha256};
use std::io::{self, Read, Write};

/// The 128-bit digest identifying a parameter set. Every ciphertext, key
/// and key-consuming operation carries or checks one of these; a mismatch
/// is always fatal to the call.
pub type Fingerprint = [u8; 16];

/// The parameters of the scheme: the polynomial modulus degree `n` (the
/// ring is `Z_q[x]/(x^n + 1)`), the coefficient base `q_1, ..., q_k`, the
/// plaintext modulus `t`, the noise distribution, and the decomposition bit
/// count used by key switching.
///
/// Parameters stay mutable until handed to a [`crate::Context`], which
/// freezes them; the fingerprint is recomputed on every mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptionParameters {
    poly_modulus_degree: usize,
    coeff_modulus: Vec<SmallModulus>,
    plain_modulus: SmallModulus,
    noise_standard_deviation: f64,
    noise_max_deviation: f64,
    decomposition_bit_count: u32,
    fingerprint: Fingerprint,
}

impl Default for EncryptionParameters {
    fn default() -> Self {
        Self::new()
    }
}

impl EncryptionParameters {
    /// Create an empty parameter set with the default noise distribution
    /// (standard deviation 3.19, clipped at five standard deviations).
    pub fn new() -> Self {
        let mut parms = Self {
            poly_modulus_degree: 0,
            coeff_modulus: Vec::new(),
            plain_modulus: SmallModulus::zero(),
            noise_standard_deviation: 3.19,
            noise_max_deviation: 5.0 * 3.19,
            decomposition_bit_count: 0,
            fingerprint: [0; 16],
        };
        parms.compute_fingerprint();
        parms
    }

    /// Set the degree `n` of the polynomial modulus `x^n + 1`.
    pub fn set_poly_modulus_degree(&mut self, degree: usize) -> &mut Self {
        self.poly_modulus_degree = degree;
        self.compute_fingerprint();
        self
    }

    /// Set the coefficient base.
    pub fn set_coeff_modulus(&mut self, moduli: &[u64]) -> Result<&mut Self> {
        self.coeff_modulus = moduli
            .iter()
            .map(|m| SmallModulus::new(*m))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.compute_fingerprint();
        Ok(self)
    }

    /// Set the plaintext modulus.
    pub fn set_plain_modulus(&mut self, modulus: u64) -> Result<&mut Self> {
        self.plain_modulus = SmallModulus::new(modulus)?;
        self.compute_fingerprint();
        Ok(self)
    }

    /// Set the standard deviation of the noise distribution.
    pub fn set_noise_standard_deviation(&mut self, sigma: f64) -> &mut Self {
        self.noise_standard_deviation = sigma;
        self.compute_fingerprint();
        self
    }

    /// Set the maximum deviation at which the noise distribution is
    /// clipped.
    pub fn set_noise_max_deviation(&mut self, max_deviation: f64) -> &mut Self {
        self.noise_max_deviation = max_deviation;
        self.compute_fingerprint();
        self
    }

    /// Set the decomposition bit count `w`; zero disables relinearization.
    pub fn set_decomposition_bit_count(&mut self, count: u32) -> &mut Self {
        self.decomposition_bit_count = count;
        self.compute_fingerprint();
        self
    }

    /// The degree of the polynomial modulus.
    pub fn poly_modulus_degree(&self) -> usize {
        self.poly_modulus_degree
    }

    /// The coefficient base.
    pub fn coeff_modulus(&self) -> &[SmallModulus] {
        &self.coeff_modulus
    }

    /// The plaintext modulus.
    pub fn plain_modulus(&self) -> &SmallModulus {
        &self.plain_modulus
    }

    /// The standard deviation of the noise distribution.
    pub fn noise_standard_deviation(&self) -> f64 {
        self.noise_standard_deviation
    }

    /// The clipping bound of the noise distribution.
    pub fn noise_max_deviation(&self) -> f64 {
        self.noise_max_deviation
    }

    /// The decomposition bit count.
    pub fn decomposition_bit_count(&self) -> u32 {
        self.decomposition_bit_count
    }

    /// The fingerprint of the current parameter values.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Serialize the parameters, little-endian.
    pub fn save<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_u32(writer, self.poly_modulus_degree as u32)?;
        write_u32(writer, self.coeff_modulus.len() as u32)?;
        for modulus in &self.coeff_modulus {
            modulus.save(writer)?;
        }
        self.plain_modulus.save(writer)?;
        write_f64(writer, self.noise_standard_deviation)?;
        write_f64(writer, self.noise_max_deviation)?;
        write_u32(writer, self.decomposition_bit_count)?;
        Ok(())
    }

    /// Deserialize parameters written by [`EncryptionParameters::save`].
    pub fn load<R: Read>(reader: &mut R) -> io::Result<Self> {
        let poly_modulus_degree = read_u32(reader)? as usize;
        let coeff_count = read_u32(reader)? as usize;
        if coeff_count > 64 {
            return Err(invalid_data("too many coefficient moduli"));
        }
        let mut coeff_modulus = Vec::with_capacity(coeff_count);
        for _ in 0..coeff_count {
            coeff_modulus.push(SmallModulus::load(reader)?);
        }
        let plain_modulus = SmallModulus::load(reader)?;
        let noise_standard_deviation = read_f64(reader)?;
        let noise_max_deviation = read_f64(reader)?;
        let decomposition_bit_count = read_u32(reader)?;

        let mut parms = Self {
            poly_modulus_degree,
            coeff_modulus,
            plain_modulus,
            noise_standard_deviation,
            noise_max_deviation,
            decomposition_bit_count,
            fingerprint: [0; 16],
        };
        parms.compute_fingerprint();
        Ok(parms)
    }

    /// Recompute the fingerprint from the canonical encoding of the
    /// parameter values.
    fn compute_fingerprint(&mut self) {
        let mut encoding = Vec::new();
        let _ = write_u64(&mut encoding, self.poly_modulus_degree as u64);
        let _ = write_u64(&mut encoding, self.coeff_modulus.len() as u64);
        for modulus in &self.coeff_modulus {
            let _ = write_u64(&mut encoding, modulus.value());
        }
        let _ = write_u64(&mut encoding, self.plain_modulus.value());
        let _ = write_u64(&mut encoding, self.decomposition_bit_count as u64);
        let _ = write_u64(&mut encoding, self.noise_standard_deviation.to_bits());
        let _ = write_u64(&mut encoding, self.noise_max_deviation.to_bits());

        let digest = Sha256::digest(&encoding);
        self.fingerprint.copy_from_slice(&digest[..16]);
    }
}
