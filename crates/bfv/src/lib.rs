#![crate_name = "bfv"]
#![crate_type = "lib"]
#![warn(missing_docs, unused_imports)]

//! BFV homomorphic encryption over polynomial rings, in the full-RNS
//! variant: a client encrypts integers (or vectors of integers) under a
//! public key, arbitrary parties add and multiply the ciphertexts, and the
//! secret-key holder decrypts the result of the same arithmetic performed
//! on the plaintexts.

mod ciphertext;
mod context;
mod decryptor;
mod encryptor;
mod errors;
mod evaluator;
mod parameters;
mod plaintext;
mod pool;
mod sampling;
mod serialization;

pub mod batch;
pub mod keys;

pub use bfv_math::zq::SmallModulus;
pub use ciphertext::Ciphertext;
pub use context::{Context, EncryptionParameterQualifiers};
pub use decryptor::Decryptor;
pub use encryptor::Encryptor;
pub use errors::{Error, Result};
pub use evaluator::Evaluator;
pub use parameters::{EncryptionParameters, Fingerprint};
pub use plaintext::Plaintext;
pub use pool::MemoryPool;
