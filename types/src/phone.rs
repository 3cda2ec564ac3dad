//! Phone numbers and the per-number pepper.

use crate::error::TypesError;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A validated E.164 phone number (`+` followed by 2–15 digits, no leading zero).
///
/// `Debug` masks all but the last two digits so numbers never reach logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct E164Number(String);

impl E164Number {
    pub fn parse(raw: &str) -> Result<Self, TypesError> {
        let digits = raw
            .strip_prefix('+')
            .ok_or_else(|| TypesError::InvalidPhoneNumber(mask(raw)))?;
        let valid = (2..=15).contains(&digits.len())
            && digits.chars().all(|c| c.is_ascii_digit())
            && !digits.starts_with('0');
        if !valid {
            return Err(TypesError::InvalidPhoneNumber(mask(raw)));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn mask(raw: &str) -> String {
    let keep = raw.len().saturating_sub(2);
    raw.char_indices()
        .map(|(i, c)| if i < keep && c.is_ascii_digit() { '*' } else { c })
        .collect()
}

impl fmt::Debug for E164Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E164Number({})", mask(&self.0))
    }
}

impl TryFrom<String> for E164Number {
    type Error = TypesError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<E164Number> for String {
    fn from(n: E164Number) -> Self {
        n.0
    }
}

/// The secret blinding value mixed into a phone number's identifier.
///
/// Obtained once through the oblivious pepper protocol and cached locally.
/// The backing string is wiped on drop.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Pepper(String);

impl Pepper {
    pub fn new(raw: impl Into<String>) -> Result<Self, TypesError> {
        let s = raw.into();
        if s.is_empty() {
            return Err(TypesError::EmptyPepper);
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Pepper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pepper(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_e164() {
        assert!(E164Number::parse("+14155550000").is_ok());
        assert!(E164Number::parse("+49301234567").is_ok());
    }

    #[test]
    fn rejects_non_e164() {
        assert!(E164Number::parse("14155550000").is_err());
        assert!(E164Number::parse("+04155550000").is_err());
        assert!(E164Number::parse("+1415555000012345").is_err());
        assert!(E164Number::parse("+1415-555").is_err());
        assert!(E164Number::parse("+1").is_err());
    }

    #[test]
    fn debug_masks_number() {
        let n = E164Number::parse("+14155550000").unwrap();
        let shown = format!("{n:?}");
        assert!(!shown.contains("4155550"));
        assert!(shown.ends_with("00)"));
    }

    #[test]
    fn pepper_rejects_empty_and_hides_value() {
        assert_eq!(Pepper::new(""), Err(TypesError::EmptyPepper));
        let p = Pepper::new("nDjlcYoFZ1bQU").unwrap();
        assert_eq!(format!("{p:?}"), "Pepper(..)");
    }
}
