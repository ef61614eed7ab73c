//! The error domain of the scheme.

use thiserror::Error;

/// The errors of the bfv crate, a closed set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The encryption parameters fail validation: the polynomial modulus is
    /// not `x^n + 1` with `n` a power of two, a coefficient modulus is not
    /// prime or repeats, the NTT is unavailable, or a derived
    /// precomputation failed.
    #[error("encryption parameters are not valid for this operation")]
    InvalidParameters,

    /// A fingerprint mismatch between an input object and the active
    /// parameter set.
    #[error("object is not valid for the encryption parameters")]
    WrongParams,

    /// A plaintext is too large, a ciphertext has an unexpected size, or a
    /// destination size is out of range.
    #[error("operand size is not valid: {0}")]
    SizeMismatch(&'static str),

    /// Evaluation or Galois keys are absent or too short.
    #[error("required evaluation key is absent or too short")]
    NeedsKey,

    /// Multiplication by a zero plaintext.
    #[error("plaintext cannot be zero")]
    PlainIsZero,

    /// An operation was handed an uninitialized memory pool.
    #[error("memory pool is uninitialized")]
    NoPool,

    /// A requested modular inverse does not exist.
    #[error("operand is not coprime to the modulus")]
    NotCoprime,

    /// Primitive-root search failed.
    #[error("no primitive root exists for these parameters")]
    NoRoot,
}

impl From<bfv_math::Error> for Error {
    fn from(e: bfv_math::Error) -> Self {
        match e {
            bfv_math::Error::NotCoprime(_) => Error::NotCoprime,
            bfv_math::Error::NoRoot(_) => Error::NoRoot,
            _ => Error::InvalidParameters,
        }
    }
}

/// A result of the bfv crate.
pub type Result<T> = std::result::Result<T, Error>;
