//! Metadata fields carrying attribution and signature inside an image.
//!
//! The fields mirror the EXIF tags the signature travels in:
//!
//! | Field          | EXIF tag               | Content                          |
//! |----------------|------------------------|----------------------------------|
//! | `artist`       | 0th `Artist`           | author                           |
//! | `copyright`    | 0th `Copyright`        | `©<year> <holder>.`              |
//! | `xp_author`    | 0th `XPAuthor`         | holder, UTF-16LE                 |
//! | `xp_keywords`  | 0th `XPKeywords`       | license identifier, UTF-16LE     |
//! | `xp_comment`   | 0th `XPComment`        | license URL, UTF-16LE            |
//! | `user_comment` | Exif `UserComment`     | framed signature text            |
//!
//! Reading and writing the container itself is left to the caller; this
//! module only builds and interprets the field values.

use serde::{Deserialize, Serialize};

use crate::attribution::{Attribution, License};
use crate::codec::{self, CharacterCode};
use crate::error::{ImageIpError, Result};

/// Field values written to, or read back from, an image's metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedFields {
    pub artist: String,
    pub copyright: String,
    pub xp_author: Vec<u8>,
    pub xp_keywords: Vec<u8>,
    pub xp_comment: Vec<u8>,
    /// Raw `UserComment` bytes including the character-code header.
    /// `None` when the image was never signed.
    pub user_comment: Option<Vec<u8>>,
}

impl EmbeddedFields {
    /// Build the fields for a signed image.
    pub fn new(attribution: &Attribution, storage_text: &str) -> Self {
        let mut fields = Self::unsigned(attribution);
        fields.user_comment = Some(codec::frame(storage_text, CharacterCode::Ascii));
        fields
    }

    /// Attribution fields without a signature.
    pub fn unsigned(attribution: &Attribution) -> Self {
        let license = attribution.license();
        Self {
            artist: attribution.author().to_string(),
            copyright: attribution.copyright_line(),
            xp_author: utf16le(attribution.copyright_holder()),
            xp_keywords: utf16le(&license.identifier()),
            xp_comment: license.url().map(utf16le).unwrap_or_default(),
            user_comment: None,
        }
    }

    /// Recover the attribution the fields describe.
    ///
    /// The holder comes from `XPAuthor`, the year from the copyright line.
    pub fn attribution(&self) -> Result<Attribution> {
        let holder = from_utf16le(&self.xp_author, "XPAuthor")?;
        let license: License = from_utf16le(&self.xp_keywords, "XPKeywords")?.parse()?;
        let year = parse_copyright_year(&self.copyright)?;

        if self.artist.trim().is_empty() || holder.trim().is_empty() {
            return Err(ImageIpError::InvalidAttribution(
                "Author or copyright holder missing".into(),
            ));
        }
        Ok(Attribution::new(&self.artist, holder, license, year))
    }

    /// Signature text from `UserComment`, header stripped.
    pub fn signature_text(&self) -> Result<String> {
        let field = self.user_comment.as_deref().ok_or_else(|| {
            ImageIpError::MalformedSignatureEncoding("No signature embedded".into())
        })?;
        codec::unframe(field)
    }

    pub fn is_signed(&self) -> bool {
        self.user_comment.is_some()
    }
}

fn utf16le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

/// XP tags are often NUL terminated.
fn from_utf16le(bytes: &[u8], tag: &str) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(ImageIpError::InvalidAttribution(format!(
            "{tag} has odd length {}",
            bytes.len()
        )));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let text = String::from_utf16(&units)
        .map_err(|_| ImageIpError::InvalidAttribution(format!("{tag} is not UTF-16")))?;
    Ok(text.trim_end_matches('\0').trim().to_string())
}

/// Accepts `©2024 Acme.` as well as `© 2024 Acme`. Years before 1 CE are
/// written with a leading `-`.
fn parse_copyright_year(copyright: &str) -> Result<i32> {
    let rest = copyright.trim_start().trim_start_matches('©').trim_start();
    let (sign, rest) = match rest.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", rest),
    };
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    format!("{sign}{digits}").parse().map_err(|_| {
        ImageIpError::InvalidAttribution(format!("No year in copyright line '{copyright}'"))
    })
}
