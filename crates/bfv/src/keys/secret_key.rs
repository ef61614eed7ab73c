//! Secret keys.

use crate::parameters::Fingerprint;
use crate::serialization::{
    invalid_data, read_fingerprint, read_u32, read_u64, write_fingerprint, write_u32, write_u64,
};
use std::io::{self, Read, Write};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A secret key: a ternary polynomial of `Z_q[x]/(x^n + 1)`, stored in NTT
/// form over the coefficient base. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    #[zeroize(skip)]
    pub(crate) fingerprint: Fingerprint,
    pub(crate) data: Vec<u64>,
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKey")
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

impl SecretKey {
    /// The fingerprint of the producing parameter set.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// The NTT-form residues, prime-major.
    pub(crate) fn data(&self) -> &[u64] {
        &self.data
    }

    /// Serialize as `fingerprint (16) || count (u32) || residues`,
    /// little-endian.
    pub fn save<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_fingerprint(writer, &self.fingerprint)?;
        write_u32(writer, self.data.len() as u32)?;
        for word in &self.data {
            write_u64(writer, *word)?;
        }
        Ok(())
    }

    /// Deserialize a secret key written by [`SecretKey::save`].
    pub fn load<R: Read>(reader: &mut R) -> io::Result<Self> {
        let fingerprint = read_fingerprint(reader)?;
        let count = read_u32(reader)? as usize;
        if count > (1 << 30) {
            return Err(invalid_data("secret key is too large"));
        }
        let mut data = Vec::with_capacity(count);
        for _ in 0..count {
            data.push(read_u64(reader)?);
        }
        Ok(Self { fingerprint, data })
    }
}
