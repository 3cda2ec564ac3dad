//! Account address type (20-byte, `0x`-prefixed hex).

use crate::error::TypesError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An on-chain account address, stored lowercase with its `0x` prefix.
///
/// Used for externally owned accounts, meta-transaction wallets, issuers, and
/// contract implementations alike. Comparison is case-insensitive because the
/// stored form is always normalised.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// The standard prefix for all addresses.
    pub const PREFIX: &'static str = "0x";

    /// Number of hex characters after the prefix.
    pub const HEX_LEN: usize = 40;

    /// Parse and normalise an address from untrusted input.
    pub fn parse(raw: &str) -> Result<Self, TypesError> {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix(Self::PREFIX)
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| TypesError::InvalidAddress(raw.to_string()))?;
        if body.len() != Self::HEX_LEN || !body.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypesError::InvalidAddress(raw.to_string()));
        }
        Ok(Self(format!("{}{}", Self::PREFIX, body.to_ascii_lowercase())))
    }

    /// Create an address from a string known to be well-formed.
    ///
    /// # Panics
    /// Panics if the string is not a `0x`-prefixed 40-character hex string.
    pub fn new(raw: impl AsRef<str>) -> Self {
        match Self::parse(raw.as_ref()) {
            Ok(addr) => addr,
            Err(e) => panic!("{e}"),
        }
    }

    /// The all-zero address, returned by contracts for "no match".
    pub fn zero() -> Self {
        Self(format!("{}{}", Self::PREFIX, "0".repeat(Self::HEX_LEN)))
    }

    pub fn is_zero(&self) -> bool {
        self.0[Self::PREFIX.len()..].bytes().all(|b| b == b'0')
    }

    /// Return the raw (normalised) address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 20 address bytes.
    pub fn to_bytes(&self) -> [u8; 20] {
        let mut out = [0u8; 20];
        // Validated on construction, so decoding cannot fail.
        let _ = hex::decode_to_slice(&self.0[Self::PREFIX.len()..], &mut out);
        out
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Address {
    type Error = TypesError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Address> for String {
    fn from(a: Address) -> Self {
        a.0
    }
}
