//! Plaintext polynomials in `Z_t[x]`.

use crate::serialization::{invalid_data, read_u32, read_u64, write_u32, write_u64};
use ndarray::Array1;
use std::io::{self, Read, Write};

/// A polynomial over the plaintext modulus, of degree below the polynomial
/// modulus degree. Coefficient `i` is the coefficient of `x^i`.
///
/// A plaintext transformed for fast plain multiplication is widened to
/// `n * k` entries over the coefficient base in NTT form; its length tells
/// the two apart, as on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plaintext {
    coeffs: Array1<u64>,
}

impl Default for Plaintext {
    fn default() -> Self {
        Self::zero()
    }
}

impl Plaintext {
    /// The zero plaintext.
    pub fn zero() -> Self {
        Self {
            coeffs: Array1::from_vec(Vec::new()),
        }
    }

    /// Create a plaintext from its coefficients, constant term first.
    pub fn from_coeffs(coeffs: Vec<u64>) -> Self {
        Self {
            coeffs: Array1::from_vec(coeffs),
        }
    }

    /// The coefficients.
    pub fn coeffs(&self) -> &[u64] {
        self.coeffs.as_slice().expect("coefficients are contiguous")
    }

    /// Replace the coefficients.
    pub(crate) fn set_coeffs(&mut self, coeffs: Vec<u64>) {
        self.coeffs = Array1::from_vec(coeffs);
    }

    /// The number of stored coefficients.
    pub fn coeff_count(&self) -> usize {
        self.coeffs.len()
    }

    /// The number of coefficients up to and including the last nonzero one.
    pub fn significant_coeff_count(&self) -> usize {
        self.coeffs()
            .iter()
            .rposition(|c| *c != 0)
            .map_or(0, |i| i + 1)
    }

    /// Whether every coefficient is zero.
    pub fn is_zero(&self) -> bool {
        self.coeffs.iter().all(|c| *c == 0)
    }

    /// The coefficient of `x^index`, zero when beyond the stored length.
    pub fn coeff(&self, index: usize) -> u64 {
        self.coeffs.get(index).copied().unwrap_or(0)
    }

    /// Serialize as `count (u32) || coefficients (8 bytes each)`,
    /// little-endian.
    pub fn save<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_u32(writer, self.coeffs.len() as u32)?;
        for c in self.coeffs.iter() {
            write_u64(writer, *c)?;
        }
        Ok(())
    }

    /// Deserialize a plaintext written by [`Plaintext::save`].
    pub fn load<R: Read>(reader: &mut R) -> io::Result<Self> {
        let count = read_u32(reader)? as usize;
        if count > (1 << 28) {
            return Err(invalid_data("plaintext is too large"));
        }
        let mut coeffs = Vec::with_capacity(count);
        for _ in 0..count {
            coeffs.push(read_u64(reader)?);
        }
        Ok(Self::from_coeffs(coeffs))
    }
}

#[cfg(test)]
mod tests {
    use super::Plaintext;

    #[test]
    fn test_significant_count() {
        assert_eq!(Plaintext::zero().significant_coeff_count(), 0);
        assert!(Plaintext::zero().is_zero());

        let pt = Plaintext::from_coeffs(vec![1, 2, 0, 0]);
        assert_eq!(pt.coeff_count(), 4);
        assert_eq!(pt.significant_coeff_count(), 2);
        assert!(!pt.is_zero());
        assert_eq!(pt.coeff(1), 2);
        assert_eq!(pt.coeff(7), 0);

        let pt = Plaintext::from_coeffs(vec![0, 0, 0]);
        assert_eq!(pt.significant_coeff_count(), 0);
        assert!(pt.is_zero());
    }

    #[test]
    fn test_save_load() {
        let pt = Plaintext::from_coeffs(vec![1, 2, 0, 5]);
        let mut bytes = Vec::new();
        pt.save(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 4 + 4 * 8);
        assert_eq!(Plaintext::load(&mut bytes.as_slice()).unwrap(), pt);
    }
}
