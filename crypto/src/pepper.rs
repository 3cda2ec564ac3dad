//! Pepper derivation from an unblinded OPRF output.

use crate::error::CryptoError;
use crate::hash::sha256;
use avk_types::Pepper;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Characters of the encoded digest kept as the pepper.
pub const PEPPER_LENGTH: usize = 13;

/// Derive the pepper: the first 13 characters of `base64(sha256(output))`.
pub fn pepper_from_evaluation(unblinded: &[u8]) -> Result<Pepper, CryptoError> {
    let encoded = STANDARD.encode(sha256(unblinded));
    let head = encoded
        .get(..PEPPER_LENGTH)
        .ok_or_else(|| CryptoError::InvalidEncoding("digest too short".into()))?;
    Pepper::new(head).map_err(|e| CryptoError::InvalidEncoding(e.to_string()))
}
