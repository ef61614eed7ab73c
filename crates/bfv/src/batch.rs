//! CRT batching: packing a 2 x (n/2) matrix of integers modulo `t` into
//! the slots of one plaintext, so that ciphertext addition and
//! multiplication act slot-wise and Galois rotations move the slots.

use crate::context::Context;
use crate::errors::{Error, Result};
use crate::plaintext::Plaintext;
use bfv_util::reverse_bits;
use std::sync::Arc;

/// Encoder between slot vectors and plaintext polynomials; available when
/// the parameters enable batching (`t = 1 mod 2n`).
#[derive(Debug)]
pub struct BatchEncoder {
    ctx: Arc<Context>,
    // Slot index to bit-reversed Zm* position, following the generator
    // ordering of the rotation automorphisms.
    matrix_reps_index_map: Vec<usize>,
}

impl BatchEncoder {
    /// Create an encoder for `ctx`.
    ///
    /// Fails with [`Error::InvalidParameters`] when batching is not
    /// enabled.
    pub fn new(ctx: &Arc<Context>) -> Result<Self> {
        if !ctx.qualifiers().enable_batching {
            return Err(Error::InvalidParameters);
        }
        let n = ctx.poly_modulus_degree();
        let log_n = ctx.coeff_count_power();

        let row_size = n >> 1;
        let m = n << 1;
        let gen: usize = 3;
        let mut pos: usize = 1;
        let mut matrix_reps_index_map = vec![0usize; n];
        for i in 0..row_size {
            let index1 = (pos - 1) >> 1;
            let index2 = (m - pos - 1) >> 1;
            matrix_reps_index_map[i] = reverse_bits(index1 as u32, log_n) as usize;
            matrix_reps_index_map[row_size | i] = reverse_bits(index2 as u32, log_n) as usize;
            pos = (pos * gen) & (m - 1);
        }

        Ok(Self {
            ctx: ctx.clone(),
            matrix_reps_index_map,
        })
    }

    /// The number of slots, equal to the polynomial degree.
    pub fn slot_count(&self) -> usize {
        self.matrix_reps_index_map.len()
    }

    /// Encode up to `n` values modulo `t` into a plaintext; missing values
    /// are zero. The first half fills the first matrix row, the second
    /// half the second row.
    pub fn encode(&self, values: &[u64]) -> Result<Plaintext> {
        let n = self.slot_count();
        if values.len() > n {
            return Err(Error::SizeMismatch("too many values to batch"));
        }
        let t = self.ctx.plain_modulus();
        if values.iter().any(|v| *v >= t.value()) {
            return Err(Error::SizeMismatch("value exceeds the plaintext modulus"));
        }

        let mut coeffs = vec![0u64; n];
        for (i, value) in values.iter().enumerate() {
            coeffs[self.matrix_reps_index_map[i]] = *value;
        }

        let tables = self
            .ctx
            .plain_ntt_tables()
            .expect("batching was checked at construction");
        tables.backward(&mut coeffs);
        Ok(Plaintext::from_coeffs(coeffs))
    }

    /// Decode a plaintext back into its `n` slot values.
    pub fn decode(&self, plain: &Plaintext) -> Result<Vec<u64>> {
        let n = self.slot_count();
        if plain.significant_coeff_count() > n {
            return Err(Error::SizeMismatch("plaintext has too many coefficients"));
        }

        let mut coeffs = vec![0u64; n];
        coeffs[..plain.coeff_count().min(n)]
            .copy_from_slice(&plain.coeffs()[..plain.coeff_count().min(n)]);

        let tables = self
            .ctx
            .plain_ntt_tables()
            .expect("batching was checked at construction");
        tables.forward(&mut coeffs);

        Ok((0..n)
            .map(|i| coeffs[self.matrix_reps_index_map[i]])
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::BatchEncoder;
    use crate::context::Context;
    use crate::parameters::EncryptionParameters;
    use std::sync::Arc;

    fn context() -> Arc<Context> {
        let mut parms = EncryptionParameters::new();
        parms.set_poly_modulus_degree(8);
        parms.set_coeff_modulus(&[786433]).unwrap();
        parms.set_plain_modulus(17).unwrap();
        Arc::new(Context::new(parms).unwrap())
    }

    #[test]
    fn test_requires_batching() {
        let mut parms = EncryptionParameters::new();
        parms.set_poly_modulus_degree(8);
        parms.set_coeff_modulus(&[786433]).unwrap();
        // 19 != 1 mod 16.
        parms.set_plain_modulus(19).unwrap();
        let ctx = Arc::new(Context::new(parms).unwrap());
        assert!(BatchEncoder::new(&ctx).is_err());
    }

    #[test]
    fn test_round_trip() {
        let ctx = context();
        let encoder = BatchEncoder::new(&ctx).unwrap();
        assert_eq!(encoder.slot_count(), 8);

        let values = vec![1, 2, 3, 4, 5, 6, 7, 8];
        let plain = encoder.encode(&values).unwrap();
        assert_eq!(encoder.decode(&plain).unwrap(), values);

        // Short inputs pad with zeros.
        let plain = encoder.encode(&[9, 16]).unwrap();
        assert_eq!(encoder.decode(&plain).unwrap(), vec![9, 16, 0, 0, 0, 0, 0, 0]);

        assert!(encoder.encode(&[17]).is_err());
        assert!(encoder.encode(&vec![0; 9]).is_err());
    }

    #[test]
    fn test_constant_polynomial_fills_slots() {
        // The constant c encodes to the all-c slot vector and conversely.
        let ctx = context();
        let encoder = BatchEncoder::new(&ctx).unwrap();
        let plain = crate::plaintext::Plaintext::from_coeffs(vec![5]);
        assert_eq!(encoder.decode(&plain).unwrap(), vec![5; 8]);
    }
}
