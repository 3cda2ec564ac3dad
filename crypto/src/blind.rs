//! Oblivious PRF over Ristretto255.
//!
//! The client hashes its input to a group element `P`, multiplies it by a
//! random scalar `r`, and sends `r·P` to the service. The service returns
//! `k·r·P`; the client multiplies by `r⁻¹` to obtain `k·P` without the service
//! ever seeing `P`. The unblinded output is independent of `r`.

use crate::error::CryptoError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use sha2::{Digest, Sha512};
use zeroize::{Zeroize, ZeroizeOnDrop};

const HASH_TO_GROUP_DOMAIN: &[u8] = b"avk-oprf-h2g-v1";
const KEY_DERIVE_DOMAIN: &[u8] = b"avk-oprf-key-v1";

/// The client's secret blinding scalar. Wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct BlindingFactor(Scalar);

/// A blinded group element, safe to send to the pepper service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlindedMessage([u8; 32]);

impl BlindedMessage {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn from_base64(s: &str) -> Result<Self, CryptoError> {
        decode_point_bytes(s).map(Self)
    }
}

/// A service-side OPRF key.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct OprfKey(Scalar);

impl OprfKey {
    /// Derive a key deterministically from seed bytes.
    pub fn from_seed(seed: &[u8]) -> Self {
        Self(Scalar::from_bytes_mod_order_wide(&wide_hash(&[
            KEY_DERIVE_DOMAIN,
            seed,
        ])))
    }
}

fn wide_hash(parts: &[&[u8]]) -> [u8; 64] {
    let mut hasher = Sha512::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 64];
    out.copy_from_slice(&hasher.finalize());
    out
}

fn hash_to_group(message: &[u8]) -> RistrettoPoint {
    RistrettoPoint::from_uniform_bytes(&wide_hash(&[HASH_TO_GROUP_DOMAIN, message]))
}

fn decompress(bytes: &[u8; 32]) -> Result<RistrettoPoint, CryptoError> {
    CompressedRistretto(*bytes)
        .decompress()
        .ok_or(CryptoError::InvalidPoint)
}

fn decode_point_bytes(s: &str) -> Result<[u8; 32], CryptoError> {
    let raw = STANDARD
        .decode(s.trim())
        .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;
    raw.try_into()
        .map_err(|v: Vec<u8>| CryptoError::InvalidEncoding(format!("expected 32 bytes, got {}", v.len())))
}

/// Blind `message` with a fresh random scalar.
pub fn blind(message: &[u8]) -> Result<(BlindedMessage, BlindingFactor), CryptoError> {
    let mut wide = [0u8; 64];
    getrandom::getrandom(&mut wide).map_err(|e| CryptoError::Rng(e.to_string()))?;
    let r = Scalar::from_bytes_mod_order_wide(&wide);
    wide.zeroize();
    if r == Scalar::ZERO {
        return Err(CryptoError::ZeroScalar);
    }
    let blinded = hash_to_group(message) * r;
    Ok((BlindedMessage(blinded.compress().to_bytes()), BlindingFactor(r)))
}

/// Service side: apply the OPRF key to a blinded element.
pub fn evaluate(key: &OprfKey, blinded: &BlindedMessage) -> Result<[u8; 32], CryptoError> {
    let point = decompress(&blinded.0)?;
    Ok((point * key.0).compress().to_bytes())
}

/// Remove the blinding from the service's evaluation (base64-encoded).
pub fn unblind(factor: &BlindingFactor, evaluation_b64: &str) -> Result<[u8; 32], CryptoError> {
    let point = decompress(&decode_point_bytes(evaluation_b64)?)?;
    Ok((point * factor.0.invert()).compress().to_bytes())
}
