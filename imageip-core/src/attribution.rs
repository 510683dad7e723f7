//! Attribution metadata bound into every fingerprint.
//!
//! An [`Attribution`] is normalised when it is built, so two records that
//! differ only in incidental whitespace produce the same canonical text and
//! therefore the same fingerprint.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};

use serde::{Deserialize, Serialize};

use crate::error::{ImageIpError, Result};

/// Separates fields in the canonical text. Control characters are stripped
/// from field values, so it never appears inside one.
const FIELD_SEPARATOR: char = '\u{1f}';

/// Prefix used for licenses outside the closed set.
const CUSTOM_LICENSE_PREFIX: &str = "LicenseRef-";

/// License attached to a signed image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum License {
    AllRightsReserved,
    CcBy,
    CcBySa,
    CcByNd,
    CcByNc,
    CcByNcSa,
    CcByNcNd,
    Cc0,
    /// Free-form license text, identified as `LicenseRef-<text>`.
    Custom(String),
}

impl License {
    /// Every predefined license, in presentation order.
    pub const CHOICES: [License; 8] = [
        License::AllRightsReserved,
        License::CcBy,
        License::CcBySa,
        License::CcByNd,
        License::CcByNc,
        License::CcByNcSa,
        License::CcByNcNd,
        License::Cc0,
    ];

    /// Create a custom license from free-form text.
    pub fn custom(text: impl AsRef<str>) -> Self {
        Self::Custom(normalise(text.as_ref()))
    }

    /// Stable identifier used in the canonical attribution text.
    pub fn identifier(&self) -> String {
        match self {
            Self::Custom(text) => format!("{CUSTOM_LICENSE_PREFIX}{text}"),
            known => known.predefined_identifier().unwrap_or_default().to_string(),
        }
    }

    /// Human-readable label, as shown to users and written to image metadata.
    pub fn label(&self) -> &str {
        match self {
            Self::AllRightsReserved => "All rights reserved",
            Self::CcBy => "CC BY",
            Self::CcBySa => "CC BY-SA",
            Self::CcByNd => "CC BY-ND",
            Self::CcByNc => "CC BY-NC",
            Self::CcByNcSa => "CC BY-NC-SA",
            Self::CcByNcNd => "CC BY-NC-ND",
            Self::Cc0 => "CC0 (Public Domain)",
            Self::Custom(text) => text,
        }
    }

    /// Canonical deed URL, for Creative Commons licenses.
    pub fn url(&self) -> Option<&'static str> {
        match self {
            Self::CcBy => Some("https://creativecommons.org/licenses/by/4.0/"),
            Self::CcBySa => Some("https://creativecommons.org/licenses/by-sa/4.0/"),
            Self::CcByNd => Some("https://creativecommons.org/licenses/by-nd/4.0/"),
            Self::CcByNc => Some("https://creativecommons.org/licenses/by-nc/4.0/"),
            Self::CcByNcSa => Some("https://creativecommons.org/licenses/by-nc-sa/4.0/"),
            Self::CcByNcNd => Some("https://creativecommons.org/licenses/by-nc-nd/4.0/"),
            Self::Cc0 => Some("https://creativecommons.org/publicdomain/zero/1.0/"),
            Self::AllRightsReserved | Self::Custom(_) => None,
        }
    }

    fn predefined_identifier(&self) -> Option<&'static str> {
        match self {
            Self::AllRightsReserved => Some("All-Rights-Reserved"),
            Self::CcBy => Some("CC-BY-4.0"),
            Self::CcBySa => Some("CC-BY-SA-4.0"),
            Self::CcByNd => Some("CC-BY-ND-4.0"),
            Self::CcByNc => Some("CC-BY-NC-4.0"),
            Self::CcByNcSa => Some("CC-BY-NC-SA-4.0"),
            Self::CcByNcNd => Some("CC-BY-NC-ND-4.0"),
            Self::Cc0 => Some("CC0-1.0"),
            Self::Custom(_) => None,
        }
    }
}

impl FromStr for License {
    type Err = ImageIpError;

    /// Accepts identifiers (`CC-BY-4.0`), display labels (`CC BY`) and
    /// `LicenseRef-` prefixed custom text. Any other non-empty text becomes
    /// a custom license.
    fn from_str(s: &str) -> Result<Self> {
        let text = normalise(s);
        if text.is_empty() {
            return Err(ImageIpError::InvalidAttribution(
                "License must not be empty".into(),
            ));
        }

        if let Some(custom) = text.strip_prefix(CUSTOM_LICENSE_PREFIX) {
            return Ok(Self::custom(custom));
        }

        let known = Self::CHOICES.into_iter().find(|license| {
            license
                .predefined_identifier()
                .is_some_and(|id| id.eq_ignore_ascii_case(&text))
                || license.label().eq_ignore_ascii_case(&text)
        });

        Ok(known.unwrap_or(Self::Custom(text)))
    }
}

impl TryFrom<String> for License {
    type Error = ImageIpError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<License> for String {
    fn from(license: License) -> Self {
        license.identifier()
    }
}

impl fmt::Display for License {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier())
    }
}

/// Author, copyright holder, license and creation year of an image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "AttributionFields")]
pub struct Attribution {
    author: String,
    copyright_holder: String,
    license: License,
    year: i32,
}

#[derive(Deserialize)]
struct AttributionFields {
    author: String,
    copyright_holder: String,
    license: License,
    year: i32,
}

impl From<AttributionFields> for Attribution {
    fn from(fields: AttributionFields) -> Self {
        Self::new(
            fields.author,
            fields.copyright_holder,
            fields.license,
            fields.year,
        )
    }
}

impl Attribution {
    pub fn new(
        author: impl AsRef<str>,
        copyright_holder: impl AsRef<str>,
        license: License,
        year: i32,
    ) -> Self {
        let license = match license {
            License::Custom(text) => License::custom(text),
            known => known,
        };

        Self {
            author: normalise(author.as_ref()),
            copyright_holder: normalise(copyright_holder.as_ref()),
            license,
            year,
        }
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn copyright_holder(&self) -> &str {
        &self.copyright_holder
    }

    pub fn license(&self) -> &License {
        &self.license
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// Canonical, order-stable text mixed into the fingerprint.
    ///
    /// Format: `author=<a>␟copyright=<c>␟license=<id>␟year=<y>` where `␟` is
    /// U+001F.
    pub fn canonical_text(&self) -> String {
        format!(
            "author={}{sep}copyright={}{sep}license={}{sep}year={}",
            self.author,
            self.copyright_holder,
            self.license.identifier(),
            self.year,
            sep = FIELD_SEPARATOR,
        )
    }

    /// UTF-8 bytes of [`Attribution::canonical_text`].
    pub fn canonical_bytes(&self) -> Vec<u8> {
        self.canonical_text().into_bytes()
    }

    /// Copyright notice as written to image metadata, e.g. `©2024 Acme.`
    pub fn copyright_line(&self) -> String {
        format!("©{} {}.", self.year, self.copyright_holder)
    }

    /// Label used when tagging files that are not signed, e.g. `© 2024 Acme`.
    pub fn filesystem_label(&self) -> String {
        format!("© {} {}", self.year, self.copyright_holder)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ImageIpError::InvalidAttribution(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ImageIpError::InvalidAttribution(e.to_string()))
    }
}

/// Trim, collapse whitespace runs to a single space and drop control characters.
pub fn normalise(s: &str) -> String {
    s.split_whitespace()
        .map(|word| word.chars().filter(|c| !c.is_control()).collect::<String>())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Format of EXIF `DateTimeOriginal`, `DateTimeDigitized` and `DateTime`.
pub const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Creation year from EXIF date tags given in priority order, usually
/// `DateTimeOriginal`, `DateTimeDigitized`, then `DateTime`.
///
/// Absent and unparsable values are skipped. Trailing NULs, as written by
/// many cameras, are ignored.
pub fn creation_year<'a, I>(exif_dates: I) -> Option<i32>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    exif_dates.into_iter().flatten().find_map(|value| {
        let value = value.trim_end_matches('\0').trim();
        NaiveDateTime::parse_from_str(value, EXIF_DATE_FORMAT)
            .map(|date| date.year())
            .ok()
    })
}

/// Earliest year among a file's creation and modification times, for images
/// without usable date tags.
pub fn file_creation_year(metadata: &std::fs::Metadata) -> Option<i32> {
    [metadata.created().ok(), metadata.modified().ok()]
        .into_iter()
        .flatten()
        .min()
        .map(|time| DateTime::<Utc>::from(time).year())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Attribution {
        Attribution::new("A", "B", License::CcBy, 2024)
    }

    #[test]
    fn test_normalise_collapses_whitespace() {
        assert_eq!(normalise("  John \t  Doe\n"), "John Doe");
        assert_eq!(normalise("a\u{1f}b"), "ab");
        assert_eq!(normalise("   "), "");
    }

    #[test]
    fn test_canonical_text_format() {
        assert_eq!(
            sample().canonical_text(),
            "author=A\u{1f}copyright=B\u{1f}license=CC-BY-4.0\u{1f}year=2024"
        );
    }

    #[test]
    fn test_construction_normalises_fields() {
        let messy = Attribution::new("  A ", "B\n", License::CcBy, 2024);
        assert_eq!(messy, sample());
        assert_eq!(messy.canonical_bytes(), sample().canonical_bytes());
    }

    #[test]
    fn test_separator_cannot_be_injected() {
        // Shifting text between fields must not yield the same canonical text
        let a = Attribution::new("x\u{1f}copyright=y", "z", License::CcBy, 2024);
        let b = Attribution::new("x", "y\u{1f}z", License::CcBy, 2024);
        assert_ne!(a.canonical_text(), b.canonical_text());
        assert!(!a.author().contains(FIELD_SEPARATOR));
    }

    #[test]
    fn test_license_parses_identifiers_and_labels() {
        assert_eq!("CC-BY-4.0".parse::<License>().unwrap(), License::CcBy);
        assert_eq!("cc-by-sa-4.0".parse::<License>().unwrap(), License::CcBySa);
        assert_eq!("CC BY-NC-ND".parse::<License>().unwrap(), License::CcByNcNd);
        assert_eq!(
            "CC0 (Public Domain)".parse::<License>().unwrap(),
            License::Cc0
        );
        assert_eq!(
            "All rights reserved".parse::<License>().unwrap(),
            License::AllRightsReserved
        );
    }

    #[test]
    fn test_license_custom_round_trip() {
        let custom: License = "Studio  internal use".parse().unwrap();
        assert_eq!(custom, License::Custom("Studio internal use".into()));
        assert_eq!(custom.identifier(), "LicenseRef-Studio internal use");
        assert_eq!(custom.identifier().parse::<License>().unwrap(), custom);
    }

    #[test]
    fn test_custom_license_never_collides_with_predefined() {
        let custom = License::custom("CC-BY-4.0");
        assert_ne!(custom.identifier(), License::CcBy.identifier());
    }

    #[test]
    fn test_empty_license_rejected() {
        let err = " ".parse::<License>().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidAttribution);
    }

    #[test]
    fn test_license_urls() {
        assert_eq!(
            License::CcBy.url(),
            Some("https://creativecommons.org/licenses/by/4.0/")
        );
        assert_eq!(License::AllRightsReserved.url(), None);
        assert_eq!(License::custom("x").url(), None);
        assert_eq!(
            License::CHOICES.iter().filter(|l| l.url().is_some()).count(),
            7
        );
    }

    #[test]
    fn test_copyright_lines() {
        let attribution = Attribution::new("John Doe", "Acme Corp", License::CcBy, 2024);
        assert_eq!(attribution.copyright_line(), "©2024 Acme Corp.");
        assert_eq!(attribution.filesystem_label(), "© 2024 Acme Corp");
    }

    #[test]
    fn test_json_round_trip_normalises() {
        let json = r#"{"author":" A ","copyright_holder":"B","license":"CC BY","year":2024}"#;
        let parsed = Attribution::from_json(json).unwrap();
        assert_eq!(parsed, sample());

        let restored = Attribution::from_json(&parsed.to_json().unwrap()).unwrap();
        assert_eq!(restored, parsed);
    }

    #[test]
    fn test_creation_year_priority_order() {
        let year = creation_year([
            Some("2019:06:01 12:00:00"),
            Some("2020:01:01 00:00:00"),
            Some("2021:01:01 00:00:00"),
        ]);
        assert_eq!(year, Some(2019));

        let year = creation_year([
            None,
            Some("2020:01:01 00:00:00"),
            Some("2021:01:01 00:00:00"),
        ]);
        assert_eq!(year, Some(2020));

        let year = creation_year([None, None, Some("2021:12:31 23:59:59\0")]);
        assert_eq!(year, Some(2021));
    }

    #[test]
    fn test_creation_year_skips_malformed_dates() {
        let year = creation_year([
            Some("2019-06-01 12:00:00"),
            Some("    :  :     :  :  "),
            Some("2022:02:03 04:05:06"),
        ]);
        assert_eq!(year, Some(2022));

        assert_eq!(creation_year([Some("garbage"), Some(""), None]), None);
        assert_eq!(creation_year(std::iter::empty()), None);
    }

    #[test]
    fn test_file_creation_year() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let metadata = file.as_file().metadata().unwrap();
        let year = file_creation_year(&metadata).unwrap();
        assert!(year >= 2024, "{year}");
    }
}
