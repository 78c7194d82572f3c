//! Alphabet selection and segment counting for outbound text.
//!
//! smsd accepts either plain 7-bit text or UCS-2 (`Alphabet: UCS` header with
//! a UTF-16BE body). Text that is pure US-ASCII goes out in the default
//! alphabet; anything else is sent as UCS-2.

use std::fmt;

/// Characters in a single default-alphabet message.
const DEFAULT_SINGLE: usize = 160;
/// Characters per part once a default-alphabet message is concatenated.
const DEFAULT_MULTIPART: usize = 153;
/// Characters in a single UCS-2 message.
const UCS2_SINGLE: usize = 70;
/// Characters per part once a UCS-2 message is concatenated.
const UCS2_MULTIPART: usize = 67;

/// Character repertoire used for the spool file body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alphabet {
    /// 7-bit safe, one byte per character.
    Default,
    /// 16-bit big-endian.
    Ucs2,
}

impl Alphabet {
    /// Value for the spool `Alphabet:` header, if one is needed.
    #[must_use]
    pub fn header_tag(self) -> Option<&'static str> {
        match self {
            Self::Default => None,
            Self::Ucs2 => Some("UCS"),
        }
    }

    fn capacity(self) -> (usize, usize) {
        match self {
            Self::Default => (DEFAULT_SINGLE, DEFAULT_MULTIPART),
            Self::Ucs2 => (UCS2_SINGLE, UCS2_MULTIPART),
        }
    }
}

impl fmt::Display for Alphabet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::Ucs2 => f.write_str("ucs2"),
        }
    }
}

/// Text converted to the bytes that land in the spool file body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    pub bytes: Vec<u8>,
    pub alphabet: Alphabet,
    /// Number of transport parts, always at least 1.
    pub segment_count: usize,
}

/// Encode `text` for the spooler.
pub fn encode(text: &str) -> EncodedPayload {
    let length = text.chars().count();

    let (alphabet, bytes) = if text.is_ascii() {
        (Alphabet::Default, text.as_bytes().to_vec())
    } else {
        let bytes = text.encode_utf16().flat_map(u16::to_be_bytes).collect();
        (Alphabet::Ucs2, bytes)
    };

    EncodedPayload {
        bytes,
        alphabet,
        segment_count: segment_count(length, alphabet),
    }
}

/// Number of parts needed for `length` characters in `alphabet`.
pub fn segment_count(length: usize, alphabet: Alphabet) -> usize {
    let (single, multipart) = alphabet.capacity();
    if length <= single {
        1
    } else {
        length.div_ceil(multipart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_is_default_alphabet() {
        let p = encode("hello");
        assert_eq!(p.alphabet, Alphabet::Default);
        assert_eq!(p.bytes, b"hello");
        assert_eq!(p.segment_count, 1);
    }

    #[test]
    fn test_empty_text() {
        let p = encode("");
        assert_eq!(p.alphabet, Alphabet::Default);
        assert!(p.bytes.is_empty());
        assert_eq!(p.segment_count, 1);
    }

    #[test]
    fn test_default_segment_boundaries() {
        assert_eq!(encode(&"a".repeat(160)).segment_count, 1);
        assert_eq!(encode(&"a".repeat(161)).segment_count, 2);
        assert_eq!(encode(&"a".repeat(306)).segment_count, 2);
        assert_eq!(encode(&"a".repeat(307)).segment_count, 3);
    }

    #[test]
    fn test_default_multipart_is_ceiling() {
        for len in 161..=1000 {
            assert_eq!(
                segment_count(len, Alphabet::Default),
                (len + 152) / 153,
                "length {len}"
            );
        }
        for len in 161..=313 {
            assert!(segment_count(len, Alphabet::Default) >= 2);
        }
    }

    #[test]
    fn test_non_ascii_switches_to_ucs2() {
        let p = encode("héllo");
        assert_eq!(p.alphabet, Alphabet::Ucs2);
        assert_eq!(p.bytes, vec![0, b'h', 0, 0xE9, 0, b'l', 0, b'l', 0, b'o']);
        assert_eq!(p.segment_count, 1);
    }

    #[test]
    fn test_ucs2_segment_boundaries() {
        let seventy = format!("é{}", "a".repeat(69));
        assert_eq!(encode(&seventy).segment_count, 1);
        let seventy_one = format!("é{}", "a".repeat(70));
        assert_eq!(encode(&seventy_one).segment_count, 2);
        let long = format!("é{}", "a".repeat(134));
        assert_eq!(encode(&long).segment_count, 3);
    }

    #[test]
    fn test_ucs2_counts_chars_not_bytes() {
        // 70 two-byte characters still fit in one part.
        let p = encode(&"ж".repeat(70));
        assert_eq!(p.bytes.len(), 140);
        assert_eq!(p.segment_count, 1);
    }

    #[test]
    fn test_astral_char_uses_surrogate_pair() {
        let p = encode("😀");
        assert_eq!(p.alphabet, Alphabet::Ucs2);
        assert_eq!(p.bytes, vec![0xD8, 0x3D, 0xDE, 0x00]);
    }

    #[test]
    fn test_header_tag() {
        assert_eq!(Alphabet::Default.header_tag(), None);
        assert_eq!(Alphabet::Ucs2.header_tag(), Some("UCS"));
    }
}
