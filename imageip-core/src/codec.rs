//! Storage-safe text encoding for raw signatures.
//!
//! Signatures are stored as standard base-64 (padded, unwrapped) inside a
//! text metadata slot, conventionally the EXIF user comment. That slot starts
//! with an 8-byte character-code header; [`decode`] removes any such header
//! regardless of which one was used to write the field.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::{ImageIpError, Result};

/// Length of an EXIF user-comment character-code header.
pub const HEADER_LEN: usize = 8;

/// Character code declared at the start of a user-comment field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterCode {
    Ascii,
    Unicode,
    Jis,
    Undefined,
}

impl CharacterCode {
    const ALL: [CharacterCode; 4] = [
        CharacterCode::Ascii,
        CharacterCode::Unicode,
        CharacterCode::Jis,
        CharacterCode::Undefined,
    ];

    pub fn header(self) -> &'static [u8; HEADER_LEN] {
        match self {
            Self::Ascii => b"ASCII\0\0\0",
            Self::Unicode => b"UNICODE\0",
            Self::Jis => b"JIS\0\0\0\0\0",
            Self::Undefined => b"\0\0\0\0\0\0\0\0",
        }
    }

    /// Identify the header at the start of `field`, if any.
    pub fn detect(field: &[u8]) -> Option<Self> {
        let prefix = field.get(..HEADER_LEN)?;
        Self::ALL
            .into_iter()
            .find(|code| code.header().as_slice() == prefix)
    }
}

/// Encode raw signature bytes as padded standard base-64.
pub fn encode(raw: &[u8]) -> String {
    STANDARD.encode(raw)
}

/// Decode storage text back to raw signature bytes.
///
/// A leading character-code header and trailing NUL or whitespace padding
/// are removed before decoding.
pub fn decode(text: &str) -> Result<Vec<u8>> {
    let body = strip_header_text(text).trim_matches(|c: char| c == '\0' || c.is_whitespace());

    let raw = STANDARD.decode(body).map_err(|e| {
        ImageIpError::MalformedSignatureEncoding(format!("Invalid base64: {e}"))
    })?;

    if raw.is_empty() {
        return Err(ImageIpError::MalformedSignatureEncoding(
            "Signature decodes to zero bytes".into(),
        ));
    }

    Ok(raw)
}

/// Build raw user-comment bytes: header followed by the text.
///
/// `Unicode` fields are written as UTF-16LE.
pub fn frame(text: &str, code: CharacterCode) -> Vec<u8> {
    let mut field = code.header().to_vec();
    match code {
        CharacterCode::Unicode => field.extend(text.encode_utf16().flat_map(u16::to_le_bytes)),
        CharacterCode::Ascii | CharacterCode::Jis | CharacterCode::Undefined => {
            field.extend_from_slice(text.as_bytes())
        }
    }
    field
}

/// Extract the storage text from raw user-comment bytes.
///
/// `Unicode` bodies may be either byte order. Base-64 text is pure ASCII, so
/// the position of the zero bytes reveals which one was used.
pub fn unframe(field: &[u8]) -> Result<String> {
    let (code, body) = match CharacterCode::detect(field) {
        Some(code) => (code, &field[HEADER_LEN..]),
        None => (CharacterCode::Ascii, field),
    };

    match code {
        CharacterCode::Unicode => decode_utf16(body),
        CharacterCode::Ascii | CharacterCode::Jis | CharacterCode::Undefined => {
            String::from_utf8(body.to_vec()).map_err(|e| {
                ImageIpError::MalformedSignatureEncoding(format!("Field is not text: {e}"))
            })
        }
    }
}

/// Decode a raw user-comment field straight to signature bytes.
pub fn decode_field(field: &[u8]) -> Result<Vec<u8>> {
    decode(&unframe(field)?)
}

fn strip_header_text(text: &str) -> &str {
    CharacterCode::detect(text.as_bytes())
        .and_then(|_| text.get(HEADER_LEN..))
        .unwrap_or(text)
}

fn decode_utf16(body: &[u8]) -> Result<String> {
    let units = body.chunks_exact(2);
    if !units.remainder().is_empty() {
        return Err(ImageIpError::MalformedSignatureEncoding(
            "UTF-16 field has odd length".into(),
        ));
    }

    let big_endian = body.first() == Some(&0) && body.get(1) != Some(&0);
    let units = units.map(|pair| {
        let bytes = [pair[0], pair[1]];
        if big_endian {
            u16::from_be_bytes(bytes)
        } else {
            u16::from_le_bytes(bytes)
        }
    });

    char::decode_utf16(units)
        .collect::<std::result::Result<String, _>>()
        .map_err(|e| ImageIpError::MalformedSignatureEncoding(format!("Invalid UTF-16: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use sha3::{Digest, Sha3_256};

    /// Deterministic pseudo-random bytes: SHA3 in counter mode.
    fn pseudo_random_bytes(seed: u64, len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(len);
        let mut counter = 0u64;
        while out.len() < len {
            let mut hasher = Sha3_256::new();
            hasher.update(seed.to_le_bytes());
            hasher.update(counter.to_le_bytes());
            out.extend_from_slice(&hasher.finalize());
            counter += 1;
        }
        out.truncate(len);
        out
    }

    #[test]
    fn test_round_trip_random_lengths() {
        // Lengths from 1 byte up past 10 KB
        for i in 0..100u64 {
            let len = 1 + (i as usize * i as usize * 13) % 12_000;
            let raw = pseudo_random_bytes(i, len);
            let text = encode(&raw);
            assert!(!text.contains('\n'), "encoding must not wrap lines");
            assert_eq!(decode(&text).unwrap(), raw, "round trip failed for len {len}");
        }

        let large = pseudo_random_bytes(7, 10_241);
        assert_eq!(decode(&encode(&large)).unwrap(), large);
    }

    #[test]
    fn test_encode_known_value() {
        assert_eq!(encode(b"Hello, World!"), "SGVsbG8sIFdvcmxkIQ==");
    }

    #[test]
    fn test_empty_signature_rejected() {
        assert_eq!(encode(&[]), "");
        let err = decode("").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedSignatureEncoding);
    }

    #[test]
    fn test_invalid_base64_rejected() {
        for text in ["not base64!!", "SGV sbG8=", "@@@@", "ASCII\0\0\0%%%"] {
            let err = decode(text).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedSignatureEncoding, "{text:?}");
        }
    }

    #[test]
    fn test_decode_strips_text_headers() {
        let raw = pseudo_random_bytes(1, 64);
        let text = encode(&raw);
        for code in CharacterCode::ALL {
            let framed = format!(
                "{}{text}",
                std::str::from_utf8(code.header()).unwrap()
            );
            assert_eq!(decode(&framed).unwrap(), raw, "{code:?}");
        }
    }

    #[test]
    fn test_decode_trims_padding() {
        let raw = pseudo_random_bytes(2, 48);
        let padded = format!("  {}\0\0\n", encode(&raw));
        assert_eq!(decode(&padded).unwrap(), raw);
    }

    #[test]
    fn test_frame_and_decode_field() {
        let raw = pseudo_random_bytes(3, 100);
        let text = encode(&raw);
        for code in CharacterCode::ALL {
            let field = frame(&text, code);
            assert_eq!(&field[..HEADER_LEN], code.header());
            assert_eq!(decode_field(&field).unwrap(), raw, "{code:?}");
        }
    }

    #[test]
    fn test_unicode_big_endian_field() {
        let raw = pseudo_random_bytes(4, 20);
        let text = encode(&raw);
        let mut field = CharacterCode::Unicode.header().to_vec();
        field.extend(text.encode_utf16().flat_map(u16::to_be_bytes));
        assert_eq!(decode_field(&field).unwrap(), raw);
    }

    #[test]
    fn test_unheadered_field_is_ascii() {
        let raw = pseudo_random_bytes(5, 16);
        assert_eq!(decode_field(encode(&raw).as_bytes()).unwrap(), raw);
    }

    #[test]
    fn test_odd_unicode_field_rejected() {
        let mut field = CharacterCode::Unicode.header().to_vec();
        field.extend_from_slice(&[0x41, 0x00, 0x42]);
        let err = decode_field(&field).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedSignatureEncoding);
    }

    #[test]
    fn test_detect_requires_full_header() {
        assert_eq!(CharacterCode::detect(b"ASCII"), None);
        assert_eq!(CharacterCode::detect(b"ASCII\0\0\0abc"), Some(CharacterCode::Ascii));
        assert_eq!(CharacterCode::detect(b"SGVsbG8sIFdvcmxkIQ=="), None);
    }
}
