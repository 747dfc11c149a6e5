//! RFC 4648 base32 (uppercase alphabet, no padding on output)
//!
//! Authenticator apps expect TOTP secrets in this form.

use data_encoding::BASE32_NOPAD;

/// Encode bytes as unpadded base32
pub fn encode(data: &[u8]) -> String {
    BASE32_NOPAD.encode(data)
}

/// Decode base32, accepting lowercase, spaces, dashes, and trailing `=` padding.
///
/// Returns `None` on any character outside the alphabet or a truncated group.
pub fn decode(input: &str) -> Option<Vec<u8>> {
    let normalized: String = input
        .trim_end_matches('=')
        .chars()
        .filter(|c| *c != ' ' && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    BASE32_NOPAD.decode(normalized.as_bytes()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 4648 section 10 vectors, padding stripped
    const VECTORS: &[(&str, &str)] = &[
        ("", ""),
        ("f", "MY"),
        ("fo", "MZXQ"),
        ("foo", "MZXW6"),
        ("foob", "MZXW6YQ"),
        ("fooba", "MZXW6YTB"),
        ("foobar", "MZXW6YTBOI"),
    ];

    #[test]
    fn test_rfc4648_encode() {
        for (plain, encoded) in VECTORS {
            assert_eq!(encode(plain.as_bytes()), *encoded, "encoding {:?}", plain);
        }
    }

    #[test]
    fn test_rfc4648_decode_with_padding() {
        assert_eq!(decode("MZXW6YQ=").unwrap(), b"foob");
        assert_eq!(decode("MZXW6YTBOI======").unwrap(), b"foobar");
    }

    #[test]
    fn test_decode_is_lenient_about_case_and_spacing() {
        assert_eq!(decode("mzxw 6ytb oi").unwrap(), b"foobar");
    }

    #[test]
    fn test_decode_rejects_foreign_characters() {
        assert!(decode("MZXW1").is_none());
        assert!(decode("MZ!W6").is_none());
        // Nine characters cannot come from whole bytes
        assert!(decode("MZXW6YTBO").is_none());
    }

    #[test]
    fn test_totp_sized_secret() {
        let secret = [0xABu8; 20];
        let encoded = encode(&secret);
        assert_eq!(encoded.len(), 32);
        assert_eq!(decode(&encoded).unwrap(), secret);
    }
}
