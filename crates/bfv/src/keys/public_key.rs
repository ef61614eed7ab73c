//! Public keys.

use crate::ciphertext::Ciphertext;
use crate::parameters::Fingerprint;
use std::io::{self, Read, Write};

/// A public key: the RNS polynomial pair `(-(a*s + e), a)` in NTT form,
/// held as a size-2 ciphertext encrypting zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub(crate) data: Ciphertext,
}

impl PublicKey {
    /// The fingerprint of the producing parameter set.
    pub fn fingerprint(&self) -> &Fingerprint {
        self.data.fingerprint()
    }

    /// The underlying polynomial pair.
    pub(crate) fn data(&self) -> &Ciphertext {
        &self.data
    }

    /// Serialize with the ciphertext wire layout.
    pub fn save<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.data.save(writer)
    }

    /// Deserialize a public key written by [`PublicKey::save`].
    pub fn load<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            data: Ciphertext::load(reader)?,
        })
    }
}
