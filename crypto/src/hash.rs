//! Blake2b and SHA-256 hashing, and the phone-number identifier.

use avk_types::{E164Number, Identifier, Pepper};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use sha2::Sha256;

type Blake2b256 = Blake2b<U32>;

/// Scheme prefix mixed into every identifier preimage.
const IDENTIFIER_PREFIX: &str = "tel://";

/// Separator between the phone number and its pepper.
const PEPPER_SEPARATOR: &str = "__";

/// Compute a 256-bit Blake2b hash of arbitrary data.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    blake2b_256_multi(&[data])
}

/// Hash multiple byte slices in sequence (avoids concatenation allocation).
pub fn blake2b_256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut output = [0u8; 32];
    output.copy_from_slice(&hasher.finalize());
    output
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut output = [0u8; 32];
    output.copy_from_slice(&Sha256::digest(data));
    output
}

/// Derive the on-chain identifier for a phone number and its pepper.
///
/// Pure and deterministic: the same pair always yields the same identifier.
pub fn identifier_for(phone: &E164Number, pepper: &Pepper) -> Identifier {
    Identifier::new(blake2b_256_multi(&[
        IDENTIFIER_PREFIX.as_bytes(),
        phone.as_str().as_bytes(),
        PEPPER_SEPARATOR.as_bytes(),
        pepper.as_str().as_bytes(),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phone() -> E164Number {
        E164Number::parse("+14155550000").unwrap()
    }

    #[test]
    fn blake2b_multi_equivalent() {
        let single = blake2b_256(b"helloworld");
        let multi = blake2b_256_multi(&[b"hello", b"world"]);
        assert_eq!(single, multi);
    }

    #[test]
    fn identifier_deterministic() {
        let pepper = Pepper::new("piWqRHHYWtfg9").unwrap();
        assert_eq!(identifier_for(&phone(), &pepper), identifier_for(&phone(), &pepper));
    }

    #[test]
    fn new_pepper_changes_identifier() {
        let a = identifier_for(&phone(), &Pepper::new("piWqRHHYWtfg9").unwrap());
        let b = identifier_for(&phone(), &Pepper::new("piWqRHHYWtfg8").unwrap());
        assert_ne!(a, b);
    }

    #[test]
    fn separator_prevents_ambiguity() {
        // "+1415555000" + "__" + "0abc" must differ from "+14155550000" + "__" + "abc".
        let a = identifier_for(
            &E164Number::parse("+1415555000").unwrap(),
            &Pepper::new("0abc").unwrap(),
        );
        let b = identifier_for(&phone(), &Pepper::new("abc").unwrap());
        assert_ne!(a, b);
    }

    #[test]
    fn sha256_known_vector() {
        let h = sha256(b"abc");
        assert_eq!(h[..4], [0xba, 0x78, 0x16, 0xbf]);
    }
}
