//! Security-code ("short code") prefixes.
//!
//! A security code is one prefix digit identifying the issuer followed by
//! seven digits chosen by the issuer. The prefix lets the client route a short
//! code to the right issuer without trying them all.

use avk_types::Address;

/// Digits following the prefix in a security code.
pub const SECURITY_CODE_DIGITS: usize = 7;

/// The issuer's prefix digit: its address read as a big-endian integer, mod 10.
pub fn security_code_prefix(issuer: &Address) -> char {
    let rem = issuer
        .to_bytes()
        .iter()
        .fold(0u32, |acc, b| (acc * 256 + u32::from(*b)) % 10);
    char::from(b'0' + rem as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_addresses() {
        let a = Address::new("0x000000000000000000000000000000000000000c");
        assert_eq!(security_code_prefix(&a), '2');
        assert_eq!(security_code_prefix(&Address::zero()), '0');
    }

    #[test]
    fn multi_byte_value() {
        // 0x0100 = 256 -> 6
        let a = Address::new("0x0000000000000000000000000000000000000100");
        assert_eq!(security_code_prefix(&a), '6');
    }
}
