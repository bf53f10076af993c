//! In-memory font tables
//!
//! Holds already-decoded cmap, metrics and lookups. Used by hosts that parse
//! fonts themselves and by tests that need exact control over every table.

use std::collections::HashMap;

use super::{ExtentsLookup, FontExtents, FontTables, GlyphExtents, GlyphId, Lookup, LookupRef, Tag};
use crate::script::{Direction, Script, SegmentProperties};
use crate::{Result, ShapeError};

/// A lookup registered under a feature, optionally for one script only
#[derive(Debug, Clone)]
struct FeatureLookup {
    feature: Tag,
    script: Option<Script>,
    index: u16,
}

/// Pre-decoded font tables
#[derive(Debug, Clone)]
pub struct MemoryFont {
    units_per_em: u32,
    glyph_count: u32,
    cmap: HashMap<u32, GlyphId>,
    h_advances: HashMap<GlyphId, i32>,
    v_advances: HashMap<GlyphId, i32>,
    extents: HashMap<GlyphId, GlyphExtents>,
    h_extents: FontExtents,
    v_extents: FontExtents,
    lookups: Vec<Lookup>,
    features: Vec<FeatureLookup>,
}

impl MemoryFont {
    pub fn builder(units_per_em: u32) -> MemoryFontBuilder {
        MemoryFontBuilder::new(units_per_em)
    }
}

impl ExtentsLookup for MemoryFont {
    fn glyph_extents(&self, glyph: GlyphId) -> Option<GlyphExtents> {
        self.extents.get(&glyph).copied()
    }
}

impl FontTables for MemoryFont {
    fn glyph_id(&self, codepoint: u32) -> Option<GlyphId> {
        self.cmap.get(&codepoint).copied()
    }

    fn glyph_count(&self) -> u32 {
        self.glyph_count
    }

    fn glyph_advance(&self, glyph: GlyphId, direction: Direction) -> i32 {
        if direction.is_horizontal() {
            self.h_advances.get(&glyph).copied().unwrap_or(0)
        } else {
            // Missing vertical metrics fall back to one em
            self.v_advances.get(&glyph).copied().unwrap_or(self.units_per_em as i32)
        }
    }

    fn units_per_em(&self) -> u32 {
        self.units_per_em
    }

    fn font_extents(&self, direction: Direction) -> FontExtents {
        if direction.is_horizontal() { self.h_extents } else { self.v_extents }
    }

    fn lookups(&self, props: &SegmentProperties, features: &[Tag]) -> Result<Vec<LookupRef>> {
        let mut refs = Vec::new();
        for &feature in features {
            for entry in &self.features {
                if entry.feature != feature {
                    continue;
                }
                if entry.script.is_some_and(|script| script != props.script) {
                    continue;
                }
                let Some(lookup) = self.lookups.get(entry.index as usize) else {
                    return Err(ShapeError::MalformedFont(format!(
                        "feature '{}' references missing lookup {}",
                        feature, entry.index
                    )));
                };
                refs.push(LookupRef { kind: lookup.kind(), feature, index: entry.index });
            }
        }
        Ok(refs)
    }

    fn lookup(&self, lookup: LookupRef) -> Option<&Lookup> {
        self.lookups
            .get(lookup.index as usize)
            .filter(|l| l.kind() == lookup.kind)
    }
}

/// Builder for [`MemoryFont`]
#[derive(Debug, Clone)]
pub struct MemoryFontBuilder {
    font: MemoryFont,
    explicit_glyph_count: Option<u32>,
}

impl MemoryFontBuilder {
    /// New builder; font extents default to 0.8 em above and 0.2 em below
    /// the baseline horizontally, and half an em on each side vertically
    pub fn new(units_per_em: u32) -> Self {
        let upem = units_per_em.max(1);
        let em = upem as i32;
        Self {
            font: MemoryFont {
                units_per_em: upem,
                glyph_count: 0,
                cmap: HashMap::new(),
                h_advances: HashMap::new(),
                v_advances: HashMap::new(),
                extents: HashMap::new(),
                h_extents: FontExtents { ascender: em * 4 / 5, descender: -(em / 5), line_gap: 0 },
                v_extents: FontExtents { ascender: em / 2, descender: -(em / 2), line_gap: 0 },
                lookups: Vec::new(),
                features: Vec::new(),
            },
            explicit_glyph_count: None,
        }
    }

    /// Map `c` to `glyph` with a horizontal advance
    pub fn glyph(mut self, c: char, glyph: u32, advance: i32) -> Self {
        self.font.cmap.insert(c as u32, GlyphId(glyph));
        self.font.h_advances.insert(GlyphId(glyph), advance);
        self
    }

    /// Horizontal advance for a glyph not reached through the cmap
    pub fn advance(mut self, glyph: u32, advance: i32) -> Self {
        self.font.h_advances.insert(GlyphId(glyph), advance);
        self
    }

    pub fn vertical_advance(mut self, glyph: u32, advance: i32) -> Self {
        self.font.v_advances.insert(GlyphId(glyph), advance);
        self
    }

    pub fn extents(mut self, glyph: u32, extents: GlyphExtents) -> Self {
        self.font.extents.insert(GlyphId(glyph), extents);
        self
    }

    pub fn font_extents(mut self, extents: FontExtents) -> Self {
        self.font.h_extents = extents;
        self
    }

    pub fn vertical_font_extents(mut self, extents: FontExtents) -> Self {
        self.font.v_extents = extents;
        self
    }

    /// Fix the glyph count instead of deriving it from the referenced glyphs
    pub fn glyph_count(mut self, count: u32) -> Self {
        self.explicit_glyph_count = Some(count);
        self
    }

    /// Register `lookup` under `feature` for every script
    pub fn lookup(self, feature: &[u8; 4], lookup: Lookup) -> Self {
        self.register(Tag::new(feature), None, lookup)
    }

    /// Register `lookup` under `feature` for `script` only
    pub fn script_lookup(self, feature: &[u8; 4], script: Script, lookup: Lookup) -> Self {
        self.register(Tag::new(feature), Some(script), lookup)
    }

    /// Register the already added lookup `index` under another feature too,
    /// the way fonts share one lookup between `liga` and `clig`
    pub fn shared_lookup(mut self, feature: &[u8; 4], index: u16) -> Self {
        self.font.features.push(FeatureLookup { feature: Tag::new(feature), script: None, index });
        self
    }

    fn register(mut self, feature: Tag, script: Option<Script>, lookup: Lookup) -> Self {
        let index = self.font.lookups.len() as u16;
        self.font.lookups.push(lookup);
        self.font.features.push(FeatureLookup { feature, script, index });
        self
    }

    pub fn build(mut self) -> MemoryFont {
        self.font.glyph_count = match self.explicit_glyph_count {
            Some(count) => count,
            None => {
                let font = &self.font;
                font.cmap
                    .values()
                    .chain(font.h_advances.keys())
                    .chain(font.v_advances.keys())
                    .chain(font.extents.keys())
                    .copied()
                    .chain(font.lookups.iter().filter_map(Lookup::max_output_glyph))
                    .map(|g| g.0 + 1)
                    .max()
                    .unwrap_or(1)
            }
        };
        self.font
    }
}
