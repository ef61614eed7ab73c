//! Evaluation keys for relinearization.

use crate::ciphertext::Ciphertext;
use crate::parameters::Fingerprint;
use crate::serialization::{
    invalid_data, read_fingerprint, read_i32, write_fingerprint, write_i32,
};
use std::io::{self, Read, Write};

/// Evaluation keys: for each relinearization power `s^p` (`p = 2, 3, ...`)
/// and each coefficient modulus `q_i`, the NTT-form encryption pairs of the
/// base-`2^w` multiples of the garner factor times `s^p`, packed as the
/// alternating components of one ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationKeys {
    pub(crate) fingerprint: Fingerprint,
    pub(crate) decomposition_bit_count: u32,
    pub(crate) keys: Vec<Vec<Ciphertext>>,
}

impl EvaluationKeys {
    /// The fingerprint of the producing parameter set.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// The decomposition bit count `w` the keys were generated for.
    pub fn decomposition_bit_count(&self) -> u32 {
        self.decomposition_bit_count
    }

    /// The number of stored powers; relinearizing a size-`s` ciphertext
    /// down to size 2 consumes `s - 2` of them.
    pub fn size(&self) -> usize {
        self.keys.len()
    }

    /// The per-prime key ciphertexts for power index `p` (power `s^{p+2}`).
    pub(crate) fn key(&self, index: usize) -> &[Ciphertext] {
        &self.keys[index]
    }

    /// Serialize per the wire layout: `fingerprint (16) ||
    /// decomposition_bit_count (i32) || outer_size (i32) || for each level:
    /// inner_size (i32) || ciphertext pairs`, little-endian.
    pub fn save<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_fingerprint(writer, &self.fingerprint)?;
        write_i32(writer, self.decomposition_bit_count as i32)?;
        write_i32(writer, self.keys.len() as i32)?;
        for level in &self.keys {
            write_i32(writer, level.len() as i32)?;
            for ct in level {
                ct.save(writer)?;
            }
        }
        Ok(())
    }

    /// Deserialize evaluation keys written by [`EvaluationKeys::save`].
    pub fn load<R: Read>(reader: &mut R) -> io::Result<Self> {
        let fingerprint = read_fingerprint(reader)?;
        let decomposition_bit_count = read_i32(reader)?;
        let outer = read_i32(reader)?;
        if !(0..=64).contains(&outer) || decomposition_bit_count < 0 {
            return Err(invalid_data("malformed evaluation keys"));
        }
        let mut keys = Vec::with_capacity(outer as usize);
        for _ in 0..outer {
            let inner = read_i32(reader)?;
            if !(0..=64).contains(&inner) {
                return Err(invalid_data("malformed evaluation keys"));
            }
            let mut level = Vec::with_capacity(inner as usize);
            for _ in 0..inner {
                level.push(Ciphertext::load(reader)?);
            }
            keys.push(level);
        }
        Ok(Self {
            fingerprint,
            decomposition_bit_count: decomposition_bit_count as u32,
            keys,
        })
    }
}
