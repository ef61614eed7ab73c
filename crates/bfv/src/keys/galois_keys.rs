//! Galois keys for slot rotations.

use crate::ciphertext::Ciphertext;
use crate::parameters::Fingerprint;
use crate::serialization::{
    invalid_data, read_fingerprint, read_i32, read_u64, write_fingerprint, write_i32, write_u64,
};
use std::collections::HashMap;
use std::io::{self, Read, Write};

/// Galois keys: key-switching material for the automorphisms
/// `x -> x^g`, keyed by the odd Galois exponent `g < 2n`. Structurally
/// identical to evaluation keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GaloisKeys {
    pub(crate) fingerprint: Fingerprint,
    pub(crate) decomposition_bit_count: u32,
    pub(crate) keys: HashMap<u64, Vec<Ciphertext>>,
}

impl GaloisKeys {
    /// The fingerprint of the producing parameter set.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// The decomposition bit count `w` the keys were generated for.
    pub fn decomposition_bit_count(&self) -> u32 {
        self.decomposition_bit_count
    }

    /// Whether a key for the Galois exponent `g` is present.
    pub fn has_key(&self, galois_elt: u64) -> bool {
        self.keys.contains_key(&galois_elt)
    }

    /// The per-prime key ciphertexts for the Galois exponent `g`.
    pub(crate) fn key(&self, galois_elt: u64) -> Option<&[Ciphertext]> {
        self.keys.get(&galois_elt).map(Vec::as_slice)
    }

    /// Serialize per the wire layout: `fingerprint (16) ||
    /// decomposition_bit_count (i32) || outer_size (i32) || for each entry:
    /// galois exponent (u64) || inner_size (i32) || ciphertext pairs`,
    /// little-endian, in ascending exponent order.
    pub fn save<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_fingerprint(writer, &self.fingerprint)?;
        write_i32(writer, self.decomposition_bit_count as i32)?;
        write_i32(writer, self.keys.len() as i32)?;
        let mut exponents = self.keys.keys().copied().collect::<Vec<_>>();
        exponents.sort_unstable();
        for g in exponents {
            write_u64(writer, g)?;
            let level = &self.keys[&g];
            write_i32(writer, level.len() as i32)?;
            for ct in level {
                ct.save(writer)?;
            }
        }
        Ok(())
    }

    /// Deserialize Galois keys written by [`GaloisKeys::save`].
    pub fn load<R: Read>(reader: &mut R) -> io::Result<Self> {
        let fingerprint = read_fingerprint(reader)?;
        let decomposition_bit_count = read_i32(reader)?;
        let outer = read_i32(reader)?;
        if !(0..=(1 << 20)).contains(&outer) || decomposition_bit_count < 0 {
            return Err(invalid_data("malformed galois keys"));
        }
        let mut keys = HashMap::with_capacity(outer as usize);
        for _ in 0..outer {
            let g = read_u64(reader)?;
            let inner = read_i32(reader)?;
            if !(0..=64).contains(&inner) {
                return Err(invalid_data("malformed galois keys"));
            }
            let mut level = Vec::with_capacity(inner as usize);
            for _ in 0..inner {
                level.push(Ciphertext::load(reader)?);
            }
            keys.insert(g, level);
        }
        Ok(Self {
            fingerprint,
            decomposition_bit_count: decomposition_bit_count as u32,
            keys,
        })
    }
}
