//! Cryptographic primitives for phone-number attestation.
//!
//! - **Blake2b** for on-chain identifiers (phone number + pepper)
//! - **Ristretto OPRF** blinding so the pepper service never sees the number
//! - Pepper derivation from an unblinded OPRF output
//! - Security-code prefix derivation from an issuer address

pub mod blind;
pub mod error;
pub mod hash;
pub mod pepper;
pub mod security_code;

pub use blind::{blind, evaluate, unblind, BlindedMessage, BlindingFactor, OprfKey};
pub use error::CryptoError;
pub use hash::{blake2b_256, blake2b_256_multi, identifier_for, sha256};
pub use pepper::pepper_from_evaluation;
pub use security_code::{security_code_prefix, SECURITY_CODE_DIGITS};
