//! Pulling attestation codes out of free-form messages.

use avk_crypto::SECURITY_CODE_DIGITS;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Base64 length range of a full attestation code (65-byte signature,
/// with or without padding).
const FULL_CODE_LEN: std::ops::RangeInclusive<usize> = 87..=88;

/// Path segment that precedes the code in a verification deep link.
const DEEP_LINK_MARKER: &str = "/v/";

/// Some SMS gateways mangle `_` into one of these.
fn sanitize(message: &str) -> String {
    message.replace(['¿', '§'], "_")
}

fn is_code_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '=' | '_' | '-' | '+' | '/')
}

fn as_full_code(token: &str) -> Option<&str> {
    let candidate = if FULL_CODE_LEN.contains(&token.len()) {
        token
    } else {
        let at = token.find(DEEP_LINK_MARKER)?;
        &token[at + DEEP_LINK_MARKER.len()..]
    };
    (FULL_CODE_LEN.contains(&candidate.len()) && candidate.chars().all(is_code_char))
        .then_some(candidate)
}

/// Decode URL-safe or standard base64, with or without padding.
fn decode_lenient(code: &str) -> Option<Vec<u8>> {
    let mut normalized: String = code
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();
    while normalized.len() % 4 != 0 {
        normalized.push('=');
    }
    STANDARD.decode(normalized).ok().filter(|b| !b.is_empty())
}

/// The full attestation code in `message` as `0x`-prefixed hex.
///
/// The code is a whitespace-separated base64 token, optionally the tail of a
/// deep link (`scheme://host/v/<code>`).
pub fn extract_attestation_code(message: &str) -> Option<String> {
    let message = sanitize(message);
    message
        .split_whitespace()
        .filter_map(as_full_code)
        .find_map(decode_lenient)
        .map(|bytes| format!("0x{}", hex::encode(bytes)))
}

/// A security code in `message`: the issuer prefix digit followed by
/// [`SECURITY_CODE_DIGITS`] digits.
pub fn extract_security_code(message: &str) -> Option<String> {
    message
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_ascii_alphanumeric()))
        .find(|t| t.len() == SECURITY_CODE_DIGITS + 1 && t.bytes().all(|b| b.is_ascii_digit()))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_b64() -> String {
        let bytes: Vec<u8> = (0u8..65).collect();
        STANDARD.encode(bytes)
    }

    fn sample_hex() -> String {
        let bytes: Vec<u8> = (0u8..65).collect();
        format!("0x{}", hex::encode(bytes))
    }

    #[test]
    fn plain_message() {
        let msg = format!("Your verification code is {}", sample_b64());
        assert_eq!(extract_attestation_code(&msg), Some(sample_hex()));
    }

    #[test]
    fn deep_link() {
        let msg = format!("Tap avk://wallet/v/{} to verify", sample_b64());
        assert_eq!(extract_attestation_code(&msg), Some(sample_hex()));
    }

    #[test]
    fn url_safe_unpadded() {
        let b64 = sample_b64().replace('+', "-").replace('/', "_");
        let b64 = b64.trim_end_matches('=');
        assert_eq!(b64.len(), 87);
        assert_eq!(extract_attestation_code(b64), Some(sample_hex()));
    }

    #[test]
    fn mangled_underscore_is_repaired() {
        let b64 = sample_b64().replace('/', "_");
        if !b64.contains('_') {
            return;
        }
        let mangled = b64.replace('_', "§");
        assert_eq!(extract_attestation_code(&mangled), Some(sample_hex()));
    }

    #[test]
    fn wrong_length_is_ignored() {
        let short = &sample_b64()[..80];
        assert_eq!(extract_attestation_code(short), None);
        assert_eq!(extract_attestation_code(""), None);
        assert_eq!(extract_attestation_code("hello world"), None);
    }

    #[test]
    fn code_must_be_its_own_token() {
        let msg = format!("code:{}", sample_b64());
        assert_eq!(extract_attestation_code(&msg), None);
    }

    #[test]
    fn security_codes() {
        assert_eq!(
            extract_security_code("Your verification code is 51234567."),
            Some("51234567".to_string())
        );
        assert_eq!(extract_security_code("code 1234567"), None);
        assert_eq!(extract_security_code("code 123456789"), None);
        assert_eq!(extract_security_code("code 1234abcd"), None);
    }
}
