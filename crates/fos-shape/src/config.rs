//! Shaping configuration

use serde::{Deserialize, Serialize};

use crate::font::Tag;
use crate::script::{Direction, Language};
use crate::{Result, ShapeError};

/// Substitution features applied to every run
const HORIZONTAL_SUBSTITUTION: [&[u8; 4]; 7] = [b"ccmp", b"locl", b"rlig", b"rclt", b"calt", b"liga", b"clig"];
const VERTICAL_SUBSTITUTION: [&[u8; 4]; 9] =
    [b"ccmp", b"locl", b"rlig", b"rclt", b"calt", b"liga", b"clig", b"vert", b"vrt2"];
const HORIZONTAL_POSITIONING: [&[u8; 4]; 3] = [b"kern", b"mark", b"mkmk"];
const VERTICAL_POSITIONING: [&[u8; 4]; 3] = [b"vkrn", b"mark", b"mkmk"];

/// Shaping options loaded from TOML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapingConfig {
    /// OpenType features to enable or disable.
    ///
    /// Each string is a feature tag, optionally prefixed with `-` to disable
    /// a default feature. Examples: `"smcp"`, `"-liga"`.
    pub features: Vec<String>,
    /// Shape with the default glyph mapping when the font has no lookups for
    /// the run
    pub allow_fallback: bool,
    /// BCP 47 language used instead of the process locale
    pub language: Option<String>,
}

impl Default for ShapingConfig {
    fn default() -> Self {
        Self { features: Vec::new(), allow_fallback: true, language: None }
    }
}

impl ShapingConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every feature string is a valid tag
    pub fn validate(&self) -> Result<()> {
        self.parsed_features().map(|_| ())
    }

    /// Configured language, if any
    pub fn language(&self) -> Option<Language> {
        self.language.as_deref().map(Language::from_bcp47)
    }

    /// Ordered feature tags for a run in `direction`: the direction's
    /// defaults minus disabled features, then enabled extras
    pub fn resolved_features(&self, direction: Direction) -> Result<Vec<Tag>> {
        let parsed = self.parsed_features()?;
        let (substitution, positioning): (&[&[u8; 4]], &[&[u8; 4]]) = if direction.is_horizontal() {
            (&HORIZONTAL_SUBSTITUTION, &HORIZONTAL_POSITIONING)
        } else {
            (&VERTICAL_SUBSTITUTION, &VERTICAL_POSITIONING)
        };

        let disabled: Vec<Tag> = parsed.iter().filter(|(_, on)| !on).map(|&(tag, _)| tag).collect();
        let mut features: Vec<Tag> = substitution
            .iter()
            .chain(positioning)
            .map(|bytes| Tag::new(bytes))
            .filter(|tag| !disabled.contains(tag))
            .collect();
        for &(tag, enabled) in &parsed {
            if enabled && !features.contains(&tag) {
                features.push(tag);
            }
        }
        Ok(features)
    }

    fn parsed_features(&self) -> Result<Vec<(Tag, bool)>> {
        self.features.iter().map(|s| parse_feature(s)).collect()
    }
}

/// `"liga"` enables, `"-liga"` disables; `"+liga"` is accepted too
fn parse_feature(s: &str) -> Result<(Tag, bool)> {
    let (name, enabled) = match s.strip_prefix('-') {
        Some(rest) => (rest, false),
        None => (s.strip_prefix('+').unwrap_or(s), true),
    };
    let tag = Tag::parse(name).ok_or_else(|| ShapeError::InvalidFeature(s.to_string()))?;
    Ok((tag, enabled))
}
