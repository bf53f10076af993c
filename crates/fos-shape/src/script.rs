//! Segment properties
//!
//! Script, language and direction of a shaping run, plus the Unicode
//! lookups used to infer them from buffer contents.

use std::fmt;

use crate::font::Tag;

/// Create an OpenType tag value from 4 bytes
const fn tag(bytes: &[u8; 4]) -> u32 {
    ((bytes[0] as u32) << 24) |
    ((bytes[1] as u32) << 16) |
    ((bytes[2] as u32) << 8) |
    (bytes[3] as u32)
}

/// Scripts known to the shaper, keyed by their OpenType script tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u32)]
pub enum Script {
    /// Common (punctuation, digits, symbols) or unknown
    #[default]
    Common = tag(b"DFLT"),
    /// Combining marks that take the script of their base
    Inherited = tag(b"zinh"),
    Latin = tag(b"latn"),
    Greek = tag(b"grek"),
    Cyrillic = tag(b"cyrl"),
    Armenian = tag(b"armn"),
    Hebrew = tag(b"hebr"),
    Arabic = tag(b"arab"),
    Syriac = tag(b"syrc"),
    Thaana = tag(b"thaa"),
    Nko = tag(b"nko "),
    Devanagari = tag(b"deva"),
    Bengali = tag(b"beng"),
    Gurmukhi = tag(b"guru"),
    Gujarati = tag(b"gujr"),
    Oriya = tag(b"orya"),
    Tamil = tag(b"taml"),
    Telugu = tag(b"telu"),
    Kannada = tag(b"knda"),
    Malayalam = tag(b"mlym"),
    Sinhala = tag(b"sinh"),
    Thai = tag(b"thai"),
    Lao = tag(b"lao "),
    Tibetan = tag(b"tibt"),
    Myanmar = tag(b"mymr"),
    Georgian = tag(b"geor"),
    Hangul = tag(b"hang"),
    Ethiopic = tag(b"ethi"),
    Cherokee = tag(b"cher"),
    Khmer = tag(b"khmr"),
    Mongolian = tag(b"mong"),
    Hiragana = tag(b"hira"),
    Katakana = tag(b"kana"),
    Bopomofo = tag(b"bopo"),
    Han = tag(b"hani"),
    Yi = tag(b"yiii"),
}

impl Script {
    /// OpenType script tag
    pub fn tag(self) -> Tag {
        Tag::from_u32(self as u32)
    }

    /// Script of a Unicode codepoint
    pub fn of(c: char) -> Self {
        match c as u32 {
            0x0041..=0x005A | 0x0061..=0x007A |
            0x00C0..=0x00D6 | 0x00D8..=0x00F6 | 0x00F8..=0x024F |
            0x1E00..=0x1EFF | 0x2C60..=0x2C7F | 0xA720..=0xA7FF |
            0xAB30..=0xAB6F | 0xFB00..=0xFB06 => Script::Latin,

            0x0370..=0x03FF | 0x1F00..=0x1FFF => Script::Greek,
            0x0400..=0x052F | 0x2DE0..=0x2DFF | 0xA640..=0xA69F => Script::Cyrillic,
            0x0530..=0x058F | 0xFB13..=0xFB17 => Script::Armenian,
            0x0590..=0x05FF | 0xFB1D..=0xFB4F => Script::Hebrew,

            // Arabic-Indic digits and tatweel stay with Arabic
            0x0600..=0x06FF | 0x0750..=0x077F | 0x08A0..=0x08FF |
            0xFB50..=0xFDFF | 0xFE70..=0xFEFF => Script::Arabic,

            0x0700..=0x074F | 0x0860..=0x086F => Script::Syriac,
            0x0780..=0x07BF => Script::Thaana,
            0x07C0..=0x07FF => Script::Nko,
            0x0900..=0x097F | 0xA8E0..=0xA8FF => Script::Devanagari,
            0x0980..=0x09FF => Script::Bengali,
            0x0A00..=0x0A7F => Script::Gurmukhi,
            0x0A80..=0x0AFF => Script::Gujarati,
            0x0B00..=0x0B7F => Script::Oriya,
            0x0B80..=0x0BFF => Script::Tamil,
            0x0C00..=0x0C7F => Script::Telugu,
            0x0C80..=0x0CFF => Script::Kannada,
            0x0D00..=0x0D7F => Script::Malayalam,
            0x0D80..=0x0DFF => Script::Sinhala,
            0x0E00..=0x0E7F => Script::Thai,
            0x0E80..=0x0EFF => Script::Lao,
            0x0F00..=0x0FFF => Script::Tibetan,
            0x1000..=0x109F | 0xAA60..=0xAA7F => Script::Myanmar,
            0x10A0..=0x10FF | 0x2D00..=0x2D2F => Script::Georgian,

            0x1100..=0x11FF | 0x3130..=0x318F | 0xA960..=0xA97F |
            0xAC00..=0xD7AF | 0xD7B0..=0xD7FF => Script::Hangul,

            0x1200..=0x139F | 0x2D80..=0x2DDF | 0xAB00..=0xAB2F => Script::Ethiopic,
            0x13A0..=0x13FF | 0xAB70..=0xABBF => Script::Cherokee,
            0x1780..=0x17FF | 0x19E0..=0x19FF => Script::Khmer,
            0x1800..=0x18AF => Script::Mongolian,
            0x3041..=0x309F | 0x1B000..=0x1B0FF => Script::Hiragana,
            0x30A0..=0x30FF | 0x31F0..=0x31FF | 0xFF66..=0xFF9F => Script::Katakana,
            0x3100..=0x312F | 0x31A0..=0x31BF => Script::Bopomofo,

            0x2E80..=0x2FDF | 0x3400..=0x4DBF | 0x4E00..=0x9FFF |
            0xF900..=0xFAFF | 0x20000..=0x2FA1F => Script::Han,

            0xA000..=0xA4CF => Script::Yi,

            0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF |
            0x20D0..=0x20FF | 0xFE00..=0xFE0F | 0xFE20..=0xFE2F => Script::Inherited,

            _ => Script::Common,
        }
    }

    /// Whether the script is written right-to-left
    pub fn is_rtl(self) -> bool {
        matches!(self,
            Script::Arabic | Script::Hebrew | Script::Syriac |
            Script::Thaana | Script::Nko
        )
    }

    /// Common and Inherited carry no script of their own
    pub fn is_strong(self) -> bool {
        !matches!(self, Script::Common | Script::Inherited)
    }

    /// Most frequent strong script among `codepoints`.
    ///
    /// Returns `None` when there is no strong script or when two scripts tie
    /// for the highest count.
    pub fn dominant<I>(codepoints: I) -> Option<Script>
    where
        I: IntoIterator<Item = u32>,
    {
        let mut counts: Vec<(Script, usize)> = Vec::new();
        for script in codepoints
            .into_iter()
            .filter_map(char::from_u32)
            .map(Script::of)
            .filter(|s| s.is_strong())
        {
            match counts.iter_mut().find(|(s, _)| *s == script) {
                Some((_, n)) => *n += 1,
                None => counts.push((script, 1)),
            }
        }

        let best = counts.iter().map(|&(_, n)| n).max()?;
        let mut leaders = counts.iter().filter(|&&(_, n)| n == best);
        let (script, _) = *leaders.next()?;
        if leaders.next().is_some() {
            return None;
        }
        Some(script)
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.tag(), f)
    }
}

/// OpenType language system tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Language(pub u32);

impl Language {
    /// Default language system
    pub const DEFAULT: Language = Language(tag(b"dflt"));
    pub const ENGLISH: Language = Language(tag(b"ENG "));
    pub const GERMAN: Language = Language(tag(b"DEU "));
    pub const FRENCH: Language = Language(tag(b"FRA "));
    pub const DUTCH: Language = Language(tag(b"NLD "));
    pub const TURKISH: Language = Language(tag(b"TRK "));
    pub const ROMANIAN: Language = Language(tag(b"ROM "));
    pub const POLISH: Language = Language(tag(b"PLK "));
    pub const RUSSIAN: Language = Language(tag(b"RUS "));
    pub const SERBIAN: Language = Language(tag(b"SRB "));
    pub const GREEK: Language = Language(tag(b"ELL "));
    pub const ARABIC: Language = Language(tag(b"ARA "));
    pub const PERSIAN: Language = Language(tag(b"FAR "));
    pub const URDU: Language = Language(tag(b"URD "));
    pub const HEBREW: Language = Language(tag(b"IWR "));
    pub const HINDI: Language = Language(tag(b"HIN "));
    pub const THAI: Language = Language(tag(b"THA "));
    pub const CHINESE_SIMPLIFIED: Language = Language(tag(b"ZHS "));
    pub const CHINESE_TRADITIONAL: Language = Language(tag(b"ZHT "));
    pub const JAPANESE: Language = Language(tag(b"JAN "));
    pub const KOREAN: Language = Language(tag(b"KOR "));

    /// Map a BCP 47 language tag to its language system.
    ///
    /// Unknown languages map to [`Language::DEFAULT`].
    pub fn from_bcp47(bcp47: &str) -> Self {
        let mut subtags = bcp47.split(['-', '_']);
        let primary = subtags.next().unwrap_or_default().to_ascii_lowercase();
        let rest: Vec<String> = subtags.map(str::to_ascii_lowercase).collect();
        let has = |s: &str| rest.iter().any(|t| t == s);

        match primary.as_str() {
            "en" => Self::ENGLISH,
            "de" => Self::GERMAN,
            "fr" => Self::FRENCH,
            "nl" => Self::DUTCH,
            "tr" => Self::TURKISH,
            "ro" => Self::ROMANIAN,
            "pl" => Self::POLISH,
            "ru" => Self::RUSSIAN,
            "sr" => Self::SERBIAN,
            "el" => Self::GREEK,
            "ar" => Self::ARABIC,
            "fa" => Self::PERSIAN,
            "ur" => Self::URDU,
            "he" | "iw" => Self::HEBREW,
            "hi" => Self::HINDI,
            "th" => Self::THAI,
            "zh" => {
                if has("hant") || has("tw") || has("hk") || has("mo") {
                    Self::CHINESE_TRADITIONAL
                } else {
                    Self::CHINESE_SIMPLIFIED
                }
            }
            "ja" => Self::JAPANESE,
            "ko" => Self::KOREAN,
            _ => Self::DEFAULT,
        }
    }

    /// Language of the process locale (`LC_ALL`, `LC_CTYPE`, then `LANG`).
    ///
    /// Unset, `C` and `POSIX` locales map to [`Language::DEFAULT`].
    pub fn from_locale_env() -> Self {
        ["LC_ALL", "LC_CTYPE", "LANG"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|value| !value.is_empty())
            .map(|value| Self::from_locale(&value))
            .unwrap_or(Self::DEFAULT)
    }

    /// Language of a POSIX locale string such as `de_DE.UTF-8`
    pub fn from_locale(locale: &str) -> Self {
        let name = locale.split(['.', '@']).next().unwrap_or_default();
        match name {
            "" | "C" | "POSIX" => Self::DEFAULT,
            _ => Self::from_bcp47(name),
        }
    }

    /// OpenType language system tag
    pub fn tag(self) -> Tag {
        Tag::from_u32(self.0)
    }
}

impl Default for Language {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.tag(), f)
    }
}

/// Text direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    LeftToRight,
    RightToLeft,
    TopToBottom,
    BottomToTop,
}

impl Direction {
    /// Check if horizontal
    pub fn is_horizontal(self) -> bool {
        matches!(self, Direction::LeftToRight | Direction::RightToLeft)
    }

    /// Check if vertical
    pub fn is_vertical(self) -> bool {
        !self.is_horizontal()
    }

    /// Visual order runs against logical order (RTL and BTT)
    pub fn is_backward(self) -> bool {
        matches!(self, Direction::RightToLeft | Direction::BottomToTop)
    }

    /// Default horizontal direction of a script
    pub fn from_script(script: Script) -> Self {
        if script.is_rtl() {
            Direction::RightToLeft
        } else {
            Direction::LeftToRight
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::LeftToRight => "ltr",
            Direction::RightToLeft => "rtl",
            Direction::TopToBottom => "ttb",
            Direction::BottomToTop => "btt",
        })
    }
}

/// Segment properties of a shaping run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SegmentProperties {
    pub script: Script,
    pub language: Language,
    pub direction: Direction,
}

impl SegmentProperties {
    pub fn new(script: Script, language: Language, direction: Direction) -> Self {
        Self { script, language, direction }
    }
}

impl fmt::Display for SegmentProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.script, self.language, self.direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_detection() {
        assert_eq!(Script::of('A'), Script::Latin);
        assert_eq!(Script::of('é'), Script::Latin);
        assert_eq!(Script::of('ب'), Script::Arabic);
        assert_eq!(Script::of('ש'), Script::Hebrew);
        assert_eq!(Script::of('中'), Script::Han);
        assert_eq!(Script::of('カ'), Script::Katakana);
        assert_eq!(Script::of('한'), Script::Hangul);
        assert_eq!(Script::of('1'), Script::Common);
        assert_eq!(Script::of('\u{0301}'), Script::Inherited);
    }

    #[test]
    fn test_script_tags() {
        assert_eq!(Script::Latin.tag(), Tag::new(b"latn"));
        assert_eq!(Script::Common.tag(), Tag::new(b"DFLT"));
        assert_eq!(Script::Arabic.to_string(), "arab");
    }

    #[test]
    fn test_dominant_script() {
        let text = "abc مرحبا";
        assert_eq!(Script::dominant(text.chars().map(u32::from)), Some(Script::Arabic));
        assert_eq!(Script::dominant("12 + 3".chars().map(u32::from)), None);
        assert_eq!(Script::dominant("ab של".chars().map(u32::from)), None);
        assert_eq!(Script::dominant(std::iter::empty()), None);
    }

    #[test]
    fn test_language_from_bcp47() {
        assert_eq!(Language::from_bcp47("en-US"), Language::ENGLISH);
        assert_eq!(Language::from_bcp47("ar"), Language::ARABIC);
        assert_eq!(Language::from_bcp47("zh-Hant"), Language::CHINESE_TRADITIONAL);
        assert_eq!(Language::from_bcp47("zh-CN"), Language::CHINESE_SIMPLIFIED);
        assert_eq!(Language::from_bcp47("xx"), Language::DEFAULT);
    }

    #[test]
    fn test_language_from_locale() {
        assert_eq!(Language::from_locale("de_DE.UTF-8"), Language::GERMAN);
        assert_eq!(Language::from_locale("sr_RS@latin"), Language::SERBIAN);
        assert_eq!(Language::from_locale("C"), Language::DEFAULT);
        assert_eq!(Language::from_locale("POSIX"), Language::DEFAULT);
    }

    #[test]
    fn test_direction() {
        assert_eq!(Direction::from_script(Script::Latin), Direction::LeftToRight);
        assert_eq!(Direction::from_script(Script::Hebrew), Direction::RightToLeft);
        assert!(Direction::BottomToTop.is_backward());
        assert!(Direction::TopToBottom.is_vertical());
        assert!(!Direction::LeftToRight.is_backward());
    }
}
