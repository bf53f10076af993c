//! OpenType font file through ttf-parser
//!
//! Metrics and cmap come from ttf-parser. GSUB, GPOS and `kerx` are decoded
//! by this crate's own readers from the raw tables. `kerx` kerning is only
//! used when the font has no GPOS table.

use ttf_parser::Face;
use tracing::debug;

use super::kerx::KerxTable;
use super::layout::LayoutTable;
use super::{ExtentsLookup, FontExtents, FontTables, GlyphExtents, GlyphId, Lookup, LookupRef, Tag};
use crate::plan::StageKind;
use crate::script::{Direction, SegmentProperties};
use crate::{Result, ShapeError};

const KERN: Tag = Tag::new(b"kern");
const VKRN: Tag = Tag::new(b"vkrn");

/// Parsed OpenType face
pub struct TtfFont<'a> {
    face: Face<'a>,
    gsub: Option<LayoutTable>,
    gpos: Option<LayoutTable>,
    kerx: Option<KerxTable>,
}

impl<'a> TtfFont<'a> {
    /// Parse face `index` of a font file or collection
    pub fn new(data: &'a [u8], index: u32) -> Result<Self> {
        let face = Face::parse(data, index)
            .map_err(|e| ShapeError::MalformedFont(format!("face {index}: {e}")))?;

        let raw = face.raw_face();
        let gsub = raw
            .table(ttf_parser::Tag::from_bytes(b"GSUB"))
            .map(|data| LayoutTable::parse(StageKind::Substitution, data))
            .transpose()?;
        let gpos = raw
            .table(ttf_parser::Tag::from_bytes(b"GPOS"))
            .map(|data| LayoutTable::parse(StageKind::Positioning, data))
            .transpose()?;
        let kerx = match raw.table(ttf_parser::Tag::from_bytes(b"kerx")) {
            Some(_) if gpos.is_some() => {
                debug!("kerx present alongside GPOS, ignored");
                None
            }
            Some(data) => Some(KerxTable::parse(data)?),
            None => None,
        };

        debug!(
            "font face {}: {} glyphs, upem {}, GSUB {}, GPOS {}, kerx {}",
            index,
            face.number_of_glyphs(),
            face.units_per_em(),
            gsub.is_some(),
            gpos.is_some(),
            kerx.is_some(),
        );

        Ok(Self { face, gsub, gpos, kerx })
    }

    /// Underlying ttf-parser face
    pub fn face(&self) -> &Face<'a> {
        &self.face
    }

    fn kerx_refs(&self, props: &SegmentProperties, features: &[Tag]) -> Vec<LookupRef> {
        let Some(kerx) = &self.kerx else {
            return Vec::new();
        };
        let wanted = if props.direction.is_horizontal() { KERN } else { VKRN };
        if !features.contains(&wanted) {
            return Vec::new();
        }
        let vertical = props.direction.is_vertical();
        kerx.subtables
            .iter()
            .enumerate()
            .filter(|(_, subtable)| subtable.vertical == vertical)
            .map(|(index, _)| LookupRef {
                kind: StageKind::Positioning,
                feature: wanted,
                index: index as u16,
            })
            .collect()
    }
}

impl ExtentsLookup for TtfFont<'_> {
    fn glyph_extents(&self, glyph: GlyphId) -> Option<GlyphExtents> {
        let id = ttf_parser::GlyphId(u16::try_from(glyph.0).ok()?);
        let bbox = self.face.glyph_bounding_box(id)?;
        Some(GlyphExtents {
            x_bearing: i32::from(bbox.x_min),
            y_bearing: i32::from(bbox.y_max),
            width: i32::from(bbox.x_max) - i32::from(bbox.x_min),
            height: i32::from(bbox.y_min) - i32::from(bbox.y_max),
        })
    }
}

impl FontTables for TtfFont<'_> {
    fn glyph_id(&self, codepoint: u32) -> Option<GlyphId> {
        let c = char::from_u32(codepoint)?;
        self.face.glyph_index(c).map(|id| GlyphId(u32::from(id.0)))
    }

    fn glyph_count(&self) -> u32 {
        u32::from(self.face.number_of_glyphs())
    }

    fn glyph_advance(&self, glyph: GlyphId, direction: Direction) -> i32 {
        let Ok(raw) = u16::try_from(glyph.0) else {
            return 0;
        };
        let id = ttf_parser::GlyphId(raw);
        if direction.is_horizontal() {
            self.face.glyph_hor_advance(id).map_or(0, i32::from)
        } else {
            // Without vmtx every glyph advances by the font height
            self.face.glyph_ver_advance(id).map_or_else(
                || {
                    let extents = self.font_extents(Direction::LeftToRight);
                    extents.ascender - extents.descender
                },
                i32::from,
            )
        }
    }

    fn units_per_em(&self) -> u32 {
        u32::from(self.face.units_per_em())
    }

    fn font_extents(&self, direction: Direction) -> FontExtents {
        let face = &self.face;
        if direction.is_horizontal() {
            return FontExtents {
                ascender: i32::from(face.ascender()),
                descender: i32::from(face.descender()),
                line_gap: i32::from(face.line_gap()),
            };
        }
        match face.vertical_ascender() {
            Some(ascender) => FontExtents {
                ascender: i32::from(ascender),
                descender: face.vertical_descender().map_or(0, i32::from),
                line_gap: face.vertical_line_gap().map_or(0, i32::from),
            },
            None => {
                let half = i32::from(face.units_per_em()) / 2;
                FontExtents { ascender: half, descender: -half, line_gap: 0 }
            }
        }
    }

    fn lookups(&self, props: &SegmentProperties, features: &[Tag]) -> Result<Vec<LookupRef>> {
        let mut refs = Vec::new();
        if let Some(gsub) = &self.gsub {
            refs.extend(gsub.lookup_refs(props, features));
        }
        match &self.gpos {
            Some(gpos) => refs.extend(gpos.lookup_refs(props, features)),
            None => refs.extend(self.kerx_refs(props, features)),
        }
        if refs.is_empty() && (self.gsub.is_some() || self.gpos.is_some()) {
            debug!("no layout lookups for {} in this font", props);
        }
        Ok(refs)
    }

    fn lookup(&self, lookup: LookupRef) -> Option<&Lookup> {
        match lookup.kind {
            StageKind::Substitution => self.gsub.as_ref()?.lookup(lookup.index),
            StageKind::Positioning => match &self.gpos {
                Some(gpos) => gpos.lookup(lookup.index),
                None => self
                    .kerx
                    .as_ref()?
                    .subtables
                    .get(lookup.index as usize)
                    .map(|subtable| &subtable.lookup),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_is_malformed() {
        let data = [0u8; 16];
        assert!(matches!(TtfFont::new(&data, 0), Err(ShapeError::MalformedFont(_))));
        assert!(matches!(TtfFont::new(b"", 0), Err(ShapeError::MalformedFont(_))));
    }
}
