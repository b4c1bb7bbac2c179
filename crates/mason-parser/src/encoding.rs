//! Pluggable source text decoders.
//!
//! A [`Decoder`] turns encoded bytes into Unicode scalar values one code
//! point at a time. The source buffer drives decoding; it always advances
//! by the reported consumed count, even on error, so a single ill-formed
//! sequence cannot stall the pipeline. A consumed count of zero means end
//! of input.
//!
//! Registered decoders: `utf8`, `utf16`, `utf16be`, `utf32`, `utf32be`,
//! `euckr`. Names are matched case-insensitively with `-` and `_` stripped.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Why a byte sequence failed to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Ill-formed bytes for the encoding, or input ended mid-sequence.
    #[error("invalid byte sequence for the source encoding")]
    InvalidEncoding,
    /// The bytes decoded to a value outside the Unicode scalar range.
    #[error("decoded code point is not a valid character")]
    InvalidCharacter,
}

/// One decode step: the code point (or error) and how many bytes it spans.
pub type DecodeStep = (Result<char, DecodeError>, usize);

/// A source text decoder.
pub trait Decoder: Sync {
    /// Canonical lowercase name used by the registry.
    fn name(&self) -> &'static str;

    /// Decode one code point from the front of `bytes`.
    ///
    /// The consumed count is non-zero whenever `bytes` is non-empty.
    fn decode_one(&self, bytes: &[u8]) -> DecodeStep;

    /// Length of a byte-order mark at the start of `bytes`, 0 if absent.
    fn strip_preamble(&self, _bytes: &[u8]) -> usize {
        0
    }

    /// Decode a whole slice into UTF-8, substituting U+FFFD for errors.
    fn decode_lossy(&self, mut bytes: &[u8]) -> String {
        let mut out = String::with_capacity(bytes.len());
        while !bytes.is_empty() {
            let (result, consumed) = self.decode_one(bytes);
            if consumed == 0 {
                break;
            }
            out.push(result.unwrap_or(char::REPLACEMENT_CHARACTER));
            bytes = &bytes[consumed..];
        }
        out
    }
}

struct Utf8Decoder;

impl Decoder for Utf8Decoder {
    fn name(&self) -> &'static str {
        "utf8"
    }

    fn decode_one(&self, bytes: &[u8]) -> DecodeStep {
        let first = match bytes.first() {
            Some(&b) => b,
            None => return (Err(DecodeError::InvalidEncoding), 0),
        };

        let len = match first {
            0x00..=0x7F => return (Ok(first as char), 1),
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            // Stray continuation or invalid lead byte.
            _ => return (Err(DecodeError::InvalidEncoding), 1),
        };

        if bytes.len() < len {
            return (Err(DecodeError::InvalidEncoding), bytes.len());
        }

        let mut value = (first as u32) & (0x7F >> len);
        for &b in &bytes[1..len] {
            if b & 0xC0 != 0x80 {
                return (Err(DecodeError::InvalidEncoding), 1);
            }
            value = (value << 6) | (b & 0x3F) as u32;
        }

        match char::from_u32(value) {
            Some(ch) => (Ok(ch), len),
            None => (Err(DecodeError::InvalidCharacter), len),
        }
    }

    fn strip_preamble(&self, bytes: &[u8]) -> usize {
        if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
            3
        } else {
            0
        }
    }
}

struct Utf16Decoder {
    big_endian: bool,
}

impl Utf16Decoder {
    fn read_unit(&self, bytes: &[u8]) -> u16 {
        if self.big_endian {
            u16::from_be_bytes([bytes[0], bytes[1]])
        } else {
            u16::from_le_bytes([bytes[0], bytes[1]])
        }
    }
}

impl Decoder for Utf16Decoder {
    fn name(&self) -> &'static str {
        if self.big_endian {
            "utf16be"
        } else {
            "utf16"
        }
    }

    fn decode_one(&self, bytes: &[u8]) -> DecodeStep {
        if bytes.len() < 2 {
            return (Err(DecodeError::InvalidEncoding), bytes.len());
        }

        let high = self.read_unit(bytes);

        if (0xD800..=0xDBFF).contains(&high) {
            // High surrogate; a low surrogate must follow.
            if bytes.len() < 4 {
                return (Err(DecodeError::InvalidEncoding), bytes.len());
            }

            let low = self.read_unit(&bytes[2..]);
            if !(0xDC00..=0xDFFF).contains(&low) {
                return (Err(DecodeError::InvalidEncoding), 2);
            }

            let value = 0x10000 + (((high as u32 & 0x3FF) << 10) | (low as u32 & 0x3FF));
            match char::from_u32(value) {
                Some(ch) => (Ok(ch), 4),
                None => (Err(DecodeError::InvalidCharacter), 4),
            }
        } else if (0xDC00..=0xDFFF).contains(&high) {
            // Unpaired low surrogate.
            (Err(DecodeError::InvalidEncoding), 2)
        } else {
            (Ok(char::from_u32(high as u32).unwrap()), 2)
        }
    }

    fn strip_preamble(&self, bytes: &[u8]) -> usize {
        let bom: &[u8] = if self.big_endian {
            &[0xFE, 0xFF]
        } else {
            &[0xFF, 0xFE]
        };
        if bytes.starts_with(bom) {
            2
        } else {
            0
        }
    }
}

struct Utf32Decoder {
    big_endian: bool,
}

impl Decoder for Utf32Decoder {
    fn name(&self) -> &'static str {
        if self.big_endian {
            "utf32be"
        } else {
            "utf32"
        }
    }

    fn decode_one(&self, bytes: &[u8]) -> DecodeStep {
        if bytes.len() < 4 {
            return (Err(DecodeError::InvalidEncoding), bytes.len());
        }

        let value = if self.big_endian {
            u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
        } else {
            u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
        };

        match char::from_u32(value) {
            Some(ch) => (Ok(ch), 4),
            None => (Err(DecodeError::InvalidCharacter), 4),
        }
    }

    fn strip_preamble(&self, bytes: &[u8]) -> usize {
        let bom: &[u8] = if self.big_endian {
            &[0x00, 0x00, 0xFE, 0xFF]
        } else {
            &[0xFF, 0xFE, 0x00, 0x00]
        };
        if bytes.starts_with(bom) {
            4
        } else {
            0
        }
    }
}

/// EUC-KR (CP949). ASCII passes through; double-byte sequences go through
/// the encoding_rs table instead of a hand-rolled conversion table.
struct EucKrDecoder;

impl Decoder for EucKrDecoder {
    fn name(&self) -> &'static str {
        "euckr"
    }

    fn decode_one(&self, bytes: &[u8]) -> DecodeStep {
        let first = match bytes.first() {
            Some(&b) => b,
            None => return (Err(DecodeError::InvalidEncoding), 0),
        };

        if first < 0x80 {
            return (Ok(first as char), 1);
        }

        if bytes.len() < 2 {
            return (Err(DecodeError::InvalidEncoding), 1);
        }

        let (decoded, had_errors) = encoding_rs::EUC_KR.decode_without_bom_handling(&bytes[..2]);
        if had_errors {
            return (Err(DecodeError::InvalidEncoding), 2);
        }

        let mut chars = decoded.chars();
        match (chars.next(), chars.next()) {
            (Some(ch), None) => (Ok(ch), 2),
            _ => (Err(DecodeError::InvalidEncoding), 2),
        }
    }
}

static UTF8: Utf8Decoder = Utf8Decoder;
static UTF16: Utf16Decoder = Utf16Decoder { big_endian: false };
static UTF16BE: Utf16Decoder = Utf16Decoder { big_endian: true };
static UTF32: Utf32Decoder = Utf32Decoder { big_endian: false };
static UTF32BE: Utf32Decoder = Utf32Decoder { big_endian: true };
static EUCKR: EucKrDecoder = EucKrDecoder;

static REGISTRY: Lazy<FxHashMap<&'static str, &'static dyn Decoder>> = Lazy::new(|| {
    let mut map: FxHashMap<&'static str, &'static dyn Decoder> = FxHashMap::default();
    for decoder in [
        &UTF8 as &'static dyn Decoder,
        &UTF16,
        &UTF16BE,
        &UTF32,
        &UTF32BE,
        &EUCKR,
    ] {
        map.insert(decoder.name(), decoder);
    }
    map
});

/// Look up a decoder by name, ignoring case and `-`/`_` separators.
pub fn lookup(name: &str) -> Option<&'static dyn Decoder> {
    let canonical: String = name
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect();
    REGISTRY.get(canonical.as_str()).copied()
}

/// The UTF-8 decoder, the default source encoding.
pub fn utf8() -> &'static dyn Decoder {
    &UTF8
}

/// Names of all registered decoders.
pub fn names() -> Vec<&'static str> {
    let mut names: Vec<_> = REGISTRY.keys().copied().collect();
    names.sort_unstable();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_aliases() {
        assert!(lookup("utf8").is_some());
        assert!(lookup("UTF-8").is_some());
        assert!(lookup("Utf_16").is_some());
        assert!(lookup("EUC-KR").is_some());
        assert!(lookup("latin1").is_none());
    }

    #[test]
    fn test_utf8_ascii() {
        assert_eq!(utf8().decode_one(b"a"), (Ok('a'), 1));
    }

    #[test]
    fn test_utf8_multibyte() {
        // U+D55C, 한
        assert_eq!(utf8().decode_one("한".as_bytes()), (Ok('한'), 3));
        // U+1F600 needs four bytes
        assert_eq!(utf8().decode_one("😀".as_bytes()), (Ok('😀'), 4));
    }

    #[test]
    fn test_utf8_truncated() {
        let (result, consumed) = utf8().decode_one(&[0xE0, 0xA0]);
        assert_eq!(result, Err(DecodeError::InvalidEncoding));
        assert_eq!(consumed, 2);
    }

    #[test]
    fn test_utf8_stray_continuation() {
        let (result, consumed) = utf8().decode_one(&[0x80]);
        assert_eq!(result, Err(DecodeError::InvalidEncoding));
        assert_eq!(consumed, 1);
    }

    #[test]
    fn test_utf8_bom() {
        assert_eq!(utf8().strip_preamble(&[0xEF, 0xBB, 0xBF, b'a']), 3);
        assert_eq!(utf8().strip_preamble(b"abc"), 0);
    }

    #[test]
    fn test_utf16le_basic() {
        let decoder = lookup("utf16").unwrap();
        assert_eq!(decoder.decode_one(&[0x41, 0x00]), (Ok('A'), 2));
    }

    #[test]
    fn test_utf16le_surrogate_pair() {
        // U+1F600 = D83D DE00
        let decoder = lookup("utf16").unwrap();
        assert_eq!(decoder.decode_one(&[0x3D, 0xD8, 0x00, 0xDE]), (Ok('😀'), 4));
    }

    #[test]
    fn test_utf16le_lone_high_surrogate() {
        // A high surrogate with nothing after it consumes the 2 bytes.
        let decoder = lookup("utf16").unwrap();
        let (result, consumed) = decoder.decode_one(&[0x3D, 0xD8]);
        assert_eq!(result, Err(DecodeError::InvalidEncoding));
        assert_eq!(consumed, 2);
    }

    #[test]
    fn test_utf16le_high_surrogate_bad_pair() {
        let decoder = lookup("utf16").unwrap();
        let (result, consumed) = decoder.decode_one(&[0x3D, 0xD8, 0x41, 0x00]);
        assert_eq!(result, Err(DecodeError::InvalidEncoding));
        assert_eq!(consumed, 2);
    }

    #[test]
    fn test_utf16be_basic() {
        let decoder = lookup("utf16be").unwrap();
        assert_eq!(decoder.decode_one(&[0x00, 0x41]), (Ok('A'), 2));
    }

    #[test]
    fn test_utf32_range_check() {
        let decoder = lookup("utf32").unwrap();
        assert_eq!(decoder.decode_one(&[0x41, 0x00, 0x00, 0x00]), (Ok('A'), 4));
        let (result, consumed) = decoder.decode_one(&[0x00, 0x00, 0x11, 0x00]);
        assert_eq!(result, Err(DecodeError::InvalidCharacter));
        assert_eq!(consumed, 4);
    }

    #[test]
    fn test_euckr_ascii_and_hangul() {
        let decoder = lookup("euckr").unwrap();
        assert_eq!(decoder.decode_one(b"a"), (Ok('a'), 1));
        // 가 is B0 A1 in EUC-KR.
        assert_eq!(decoder.decode_one(&[0xB0, 0xA1]), (Ok('가'), 2));
    }

    #[test]
    fn test_euckr_truncated_pair() {
        let decoder = lookup("euckr").unwrap();
        let (result, consumed) = decoder.decode_one(&[0xB0]);
        assert_eq!(result, Err(DecodeError::InvalidEncoding));
        assert_eq!(consumed, 1);
    }

    #[test]
    fn test_decode_lossy_roundtrip() {
        // Character-preserving: decode then compare against the UTF-8 form.
        let decoder = lookup("utf16").unwrap();
        let text = "hello 한글";
        let bytes: Vec<u8> = text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        assert_eq!(decoder.decode_lossy(&bytes), text);
    }
}
