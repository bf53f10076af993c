//! Font-table collaborators
//!
//! The shaping core never decodes font files itself; it asks a [`FontTables`]
//! implementation for cmap results, advances, metrics and lookups. Two
//! implementations ship with the crate: [`MemoryFont`] (pre-decoded tables)
//! and [`TtfFont`] (an OpenType file read through ttf-parser).

mod kerx;
mod layout;
mod memory;
mod reader;
mod ttf;

use std::collections::HashMap;
use std::fmt;

pub use memory::{MemoryFont, MemoryFontBuilder};
pub use reader::ReadError;
pub(crate) use reader::FontReader;
pub use ttf::TtfFont;

use crate::plan::StageKind;
use crate::script::{Direction, SegmentProperties};
use crate::Result;

/// Four-byte OpenType tag
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Tag(pub [u8; 4]);

impl Tag {
    pub const fn new(bytes: &[u8; 4]) -> Self {
        Self(*bytes)
    }

    pub const fn from_u32(value: u32) -> Self {
        Self(value.to_be_bytes())
    }

    pub const fn to_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Parse a tag of one to four printable ASCII characters, space padded
    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() || s.len() > 4 || !s.bytes().all(|b| (0x20..=0x7E).contains(&b)) {
            return None;
        }
        let mut bytes = [b' '; 4];
        bytes[..s.len()].copy_from_slice(s.as_bytes());
        Some(Self(bytes))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            let c = if (0x20..=0x7E).contains(&b) { b as char } else { '?' };
            fmt::Write::write_char(f, c)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({self})")
    }
}

/// Glyph identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct GlyphId(pub u32);

impl GlyphId {
    /// The `.notdef` glyph, used for unmapped codepoints
    pub const NOTDEF: GlyphId = GlyphId(0);
}

impl fmt::Display for GlyphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ink extents of one glyph in font units.
///
/// Y-up: `y_bearing` is the top of the ink and `height` is negative when the
/// ink extends downward from there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GlyphExtents {
    pub x_bearing: i32,
    pub y_bearing: i32,
    pub width: i32,
    pub height: i32,
}

/// Font-wide extents for one direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FontExtents {
    pub ascender: i32,
    /// Usually negative
    pub descender: i32,
    pub line_gap: i32,
}

/// Font metrics context read by the metrics calculator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FontMetrics {
    pub units_per_em: u32,
    pub ascender: i32,
    pub descender: i32,
    pub line_gap: i32,
}

impl FontMetrics {
    pub fn new(units_per_em: u32, extents: FontExtents) -> Self {
        Self {
            units_per_em: units_per_em.max(1),
            ascender: extents.ascender,
            descender: extents.descender,
            line_gap: extents.line_gap,
        }
    }

    /// Metrics of `font` for `direction`
    pub fn from_font<F: FontTables + ?Sized>(font: &F, direction: Direction) -> Self {
        Self::new(font.units_per_em(), font.font_extents(direction))
    }

    /// Line height (ascender - descender + line_gap)
    pub fn line_height(&self) -> i32 {
        self.ascender - self.descender + self.line_gap
    }
}

/// Source of per-glyph ink extents
pub trait ExtentsLookup {
    /// Ink extents of `glyph`, `None` for glyphs without ink
    fn glyph_extents(&self, glyph: GlyphId) -> Option<GlyphExtents>;
}

impl<T> ExtentsLookup for T
where
    T: Fn(GlyphId) -> Option<GlyphExtents>,
{
    fn glyph_extents(&self, glyph: GlyphId) -> Option<GlyphExtents> {
        self(glyph)
    }
}

/// Reference to one lookup of a font's substitution or positioning list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LookupRef {
    pub kind: StageKind,
    /// Feature the lookup was selected for
    pub feature: Tag,
    pub index: u16,
}

/// The font-table parser consumed by plans and the engine
pub trait FontTables: ExtentsLookup {
    /// Nominal glyph for a codepoint (cmap)
    fn glyph_id(&self, codepoint: u32) -> Option<GlyphId>;

    /// Number of glyphs in the font
    fn glyph_count(&self) -> u32;

    /// Native advance of `glyph` along `direction`, unsigned font units
    fn glyph_advance(&self, glyph: GlyphId, direction: Direction) -> i32;

    fn units_per_em(&self) -> u32;

    fn font_extents(&self, direction: Direction) -> FontExtents;

    /// Lookups for `features`, in feature order, that apply to `props`
    fn lookups(&self, props: &SegmentProperties, features: &[Tag]) -> Result<Vec<LookupRef>>;

    /// Resolve a lookup reference
    fn lookup(&self, lookup: LookupRef) -> Option<&Lookup>;
}

/// Positioning adjustment in font units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValueRecord {
    pub x_placement: i32,
    pub y_placement: i32,
    pub x_advance: i32,
    pub y_advance: i32,
}

impl ValueRecord {
    pub fn advance(x_advance: i32) -> Self {
        Self { x_advance, ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Class-based pair table: the first glyph must be covered, both glyphs are
/// classified and the pair value is read from a `class1 x class2` matrix.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassPairs<T> {
    pub coverage: Vec<GlyphId>,
    pub first_classes: HashMap<GlyphId, u16>,
    pub second_classes: HashMap<GlyphId, u16>,
    pub second_class_count: u16,
    /// Row-major by first class
    pub values: Vec<T>,
}

impl<T> ClassPairs<T> {
    pub fn get(&self, first: GlyphId, second: GlyphId) -> Option<&T> {
        self.coverage.binary_search(&first).ok()?;
        let c1 = self.first_classes.get(&first).copied().unwrap_or(0) as usize;
        let c2 = self.second_classes.get(&second).copied().unwrap_or(0) as usize;
        if c2 >= self.second_class_count as usize {
            return None;
        }
        self.values.get(c1 * self.second_class_count as usize + c2)
    }
}

/// Glyph pair values, listed pairs first then class tables in order
#[derive(Debug, Clone, PartialEq)]
pub struct PairTable<T> {
    pub pairs: HashMap<(GlyphId, GlyphId), T>,
    pub classes: Vec<ClassPairs<T>>,
}

impl<T> Default for PairTable<T> {
    fn default() -> Self {
        Self { pairs: HashMap::new(), classes: Vec::new() }
    }
}

impl<T> PairTable<T> {
    pub fn get(&self, first: GlyphId, second: GlyphId) -> Option<&T> {
        self.pairs
            .get(&(first, second))
            .or_else(|| self.classes.iter().find_map(|c| c.get(first, second)))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty() && self.classes.is_empty()
    }
}

/// A ligature candidate: components after the first glyph, and the result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ligature {
    pub components: Vec<GlyphId>,
    pub glyph: GlyphId,
}

/// One decoded lookup, as the engine applies it
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// One glyph to one glyph
    Single(HashMap<GlyphId, GlyphId>),
    /// One glyph to a sequence (decomposition)
    Multiple(HashMap<GlyphId, Vec<GlyphId>>),
    /// Sequences to one glyph, candidates keyed by first glyph in priority order
    Ligature(HashMap<GlyphId, Vec<Ligature>>),
    /// Per-glyph adjustment
    SingleAdjust(HashMap<GlyphId, ValueRecord>),
    /// Logical-order pair adjustment (first, second)
    PairAdjust(PairTable<(ValueRecord, ValueRecord)>),
    /// Visual-order pair kerning; cross-stream values shift the second glyph
    /// perpendicular to the run instead of changing the first glyph's advance
    Kerning { pairs: PairTable<i32>, cross_stream: bool },
}

impl Lookup {
    /// Stage kind this lookup belongs to
    pub fn kind(&self) -> StageKind {
        match self {
            Lookup::Single(_) | Lookup::Multiple(_) | Lookup::Ligature(_) => StageKind::Substitution,
            Lookup::SingleAdjust(_) | Lookup::PairAdjust(_) | Lookup::Kerning { .. } => {
                StageKind::Positioning
            }
        }
    }

    /// Largest glyph id the lookup can produce, for validation against the
    /// font's glyph count
    pub fn max_output_glyph(&self) -> Option<GlyphId> {
        match self {
            Lookup::Single(map) => map.values().copied().max(),
            Lookup::Multiple(map) => map.values().flatten().copied().max(),
            Lookup::Ligature(map) => map.values().flatten().map(|l| l.glyph).max(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_parse() {
        assert_eq!(Tag::parse("liga"), Some(Tag::new(b"liga")));
        assert_eq!(Tag::parse("nko"), Some(Tag::new(b"nko ")));
        assert_eq!(Tag::parse(""), None);
        assert_eq!(Tag::parse("toolong"), None);
        assert_eq!(Tag::new(b"kern").to_string(), "kern");
        assert_eq!(Tag::from_u32(Tag::new(b"GSUB").to_u32()), Tag::new(b"GSUB"));
    }

    #[test]
    fn test_class_pairs() {
        let table = ClassPairs {
            coverage: vec![GlyphId(1), GlyphId(2)],
            first_classes: HashMap::from([(GlyphId(2), 1)]),
            second_classes: HashMap::from([(GlyphId(5), 1)]),
            second_class_count: 2,
            values: vec![0, -10, 0, -20],
        };
        assert_eq!(table.get(GlyphId(1), GlyphId(5)), Some(&-10));
        assert_eq!(table.get(GlyphId(2), GlyphId(5)), Some(&-20));
        assert_eq!(table.get(GlyphId(2), GlyphId(9)), Some(&0));
        assert_eq!(table.get(GlyphId(3), GlyphId(5)), None);
    }

    #[test]
    fn test_font_metrics_line_height() {
        let metrics = FontMetrics::new(1000, FontExtents { ascender: 800, descender: -200, line_gap: 90 });
        assert_eq!(metrics.line_height(), 1090);
    }
}
