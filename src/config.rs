//! Projector configuration
//!
//! Settings can be loaded from TOML:
//!
//! ```toml
//! locale = "de-DE"
//! time_zone = "+01:00"
//!
//! [flags]
//! synchronize_on_documents = true
//! absent_is_empty = true
//!
//! [namespaces]
//! inv = "urn:example:invoice"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::error::{ProjectionError, Result};

/// Behaviour switches of a projector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionFlags {
    /// Serialize every dispatched call per document
    pub synchronize_on_documents: bool,
    /// `Display` of a projection renders the bound node as XML
    pub to_string_renders_xml: bool,
    /// List reads skip nodes with blank text and no attributes or child elements
    pub omit_empty_nodes: bool,
    /// Absent scalar reads yield the type's empty value instead of null
    pub absent_is_empty: bool,
}

/// Projector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectorConfig {
    /// Locale tag; its language selects the decimal separator
    pub locale: String,
    /// Offset applied to date-times read without one (`UTC`, `GMT`, `Z`, `±HH:MM`)
    pub time_zone: String,
    /// Behaviour switches
    pub flags: ProjectionFlags,
    /// Prefix to namespace URI bindings for name tests
    pub namespaces: BTreeMap<String, String>,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            locale: "en-US".to_string(),
            time_zone: "UTC".to_string(),
            flags: ProjectionFlags::default(),
            namespaces: BTreeMap::new(),
        }
    }
}

/// Languages writing a decimal comma
const COMMA_LANGUAGES: &[&str] = &[
    "bg", "cs", "da", "de", "el", "es", "fi", "fr", "hr", "hu", "id", "it", "lt", "lv", "nb",
    "nl", "no", "pl", "pt", "ro", "ru", "sk", "sl", "sr", "sv", "tr", "uk", "vi",
];

impl ProjectorConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ProjectionError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::parse_str(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn parse_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| ProjectionError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ProjectionError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let language = self.language();
        if language.is_empty() || !language.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ProjectionError::Config(format!(
                "Invalid locale '{}'",
                self.locale
            )));
        }

        self.time_zone_offset()?;

        for (prefix, uri) in &self.namespaces {
            if prefix.is_empty()
                || prefix.contains(':')
                || !prefix.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
            {
                return Err(ProjectionError::Config(format!(
                    "Invalid namespace prefix '{}'",
                    prefix
                )));
            }
            if prefix == "xmlns" {
                return Err(ProjectionError::Config(
                    "The 'xmlns' prefix cannot be rebound".to_string(),
                ));
            }
            if uri.is_empty() {
                return Err(ProjectionError::Config(format!(
                    "Namespace prefix '{}' is bound to an empty URI",
                    prefix
                )));
            }
        }

        Ok(())
    }

    /// Language part of the locale tag (`de` for `de-DE` or `de_DE`)
    pub fn language(&self) -> String {
        self.locale
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase()
    }

    /// Decimal separator used for float conversion
    pub fn decimal_separator(&self) -> char {
        if COMMA_LANGUAGES.contains(&self.language().as_str()) {
            ','
        } else {
            '.'
        }
    }

    /// The configured time zone as a fixed offset
    pub fn time_zone_offset(&self) -> Result<FixedOffset> {
        parse_time_zone(&self.time_zone).ok_or_else(|| {
            ProjectionError::Config(format!("Invalid time zone '{}'", self.time_zone))
        })
    }
}

/// Parse `UTC`, `GMT`, `Z` or a `±HH:MM` / `±HHMM` offset
pub fn parse_time_zone(text: &str) -> Option<FixedOffset> {
    let text = text.trim();
    if matches!(text.to_ascii_uppercase().as_str(), "UTC" | "GMT" | "Z") {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match text.as_bytes().first()? {
        b'+' => (1, &text[1..]),
        b'-' => (-1, &text[1..]),
        _ => return None,
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 => rest.split_at(2),
        None => (rest, "0"),
    };
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
