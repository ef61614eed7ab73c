//! Errors of the arithmetic core.

use thiserror::Error;

/// The errors of the bfv-math crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A modulus outside `[2, 2^62)` was given.
    #[error("invalid modulus: {0}")]
    InvalidModulus(u64),

    /// A modular inverse does not exist.
    #[error("{0} is not coprime to the modulus")]
    NotCoprime(u64),

    /// No primitive root of the requested degree exists, or the random
    /// search gave up.
    #[error("no primitive root of degree {0}")]
    NoRoot(u64),

    /// The NTT tables could not be generated for these parameters.
    #[error("ntt tables cannot be generated: {0}")]
    NttGenFailed(&'static str),

    /// The polynomial is a zero divisor and cannot be inverted.
    #[error("polynomial is not invertible")]
    PolyNotInvertible,

    /// The base converter precomputation failed.
    #[error("base converter generation failed: {0}")]
    BaseGenFailed(&'static str),
}

/// A result of the bfv-math crate.
pub type Result<T> = std::result::Result<T, Error>;
