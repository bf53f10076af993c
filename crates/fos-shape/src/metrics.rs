//! Aggregate extents of a shaped run
//!
//! Walks the glyphs with a pen starting at the origin, collects the ink
//! envelope at each pre-advance pen position and derives the advance box and
//! the margins between ink and advance box.

use tracing::trace;

use crate::fixed::F26Dot6;
use crate::font::{ExtentsLookup, FontMetrics};
use crate::glyph::GlyphBuffer;

/// Nominal box of the run: pen travel by line height
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdvanceBox {
    pub width: F26Dot6,
    pub height: F26Dot6,
}

/// Ink envelope, y-up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InkBox {
    pub min_x: F26Dot6,
    pub max_x: F26Dot6,
    pub min_y: F26Dot6,
    pub max_y: F26Dot6,
}

impl InkBox {
    pub fn width(&self) -> F26Dot6 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> F26Dot6 {
        self.max_y - self.min_y
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Slack between ink and advance box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Margins {
    /// Ascender minus ink top
    pub top: F26Dot6,
    /// Advance width minus ink right edge
    pub right: F26Dot6,
    /// (Descender - line gap) minus ink bottom
    pub bottom: F26Dot6,
    /// Negated ink left edge
    pub left: F26Dot6,
}

/// Extents of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AggregateExtents {
    /// Pen position after the last glyph
    pub pen_x: F26Dot6,
    pub pen_y: F26Dot6,
    pub advance_box: AdvanceBox,
    pub ink_box: InkBox,
    pub margins: Margins,
}

/// Computes [`AggregateExtents`], in font units or scaled
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCalculator {
    scale: Option<i64>,
}

impl MetricsCalculator {
    /// Outputs in font design units
    pub fn new() -> Self {
        Self { scale: None }
    }

    /// Outputs scaled by `scale / units_per_em` (e.g. pixels per em)
    pub fn with_scale(scale: i64) -> Self {
        Self { scale: Some(scale) }
    }

    pub fn scale(&self) -> Option<i64> {
        self.scale
    }

    pub fn compute_extents<L>(&self, glyphs: &GlyphBuffer, metrics: &FontMetrics, extents: &L) -> AggregateExtents
    where
        L: ExtentsLookup + ?Sized,
    {
        let mut pen = (0i64, 0i64);
        let mut ink: Option<(i64, i64, i64, i64)> = None;

        for record in glyphs {
            if let Some(e) = extents.glyph_extents(record.glyph_id) {
                let left = pen.0 + i64::from(record.x_offset) + i64::from(e.x_bearing);
                let right = left + i64::from(e.width);
                let top = pen.1 + i64::from(record.y_offset) + i64::from(e.y_bearing);
                let bottom = top + i64::from(e.height);

                let (x0, x1) = (left.min(right), left.max(right));
                let (y0, y1) = (top.min(bottom), top.max(bottom));
                ink = Some(match ink {
                    Some((min_x, max_x, min_y, max_y)) => {
                        (min_x.min(x0), max_x.max(x1), min_y.min(y0), max_y.max(y1))
                    }
                    None => (x0, x1, y0, y1),
                });
            }
            pen.0 += i64::from(record.x_advance);
            pen.1 += i64::from(record.y_advance);
        }

        let (min_x, max_x, min_y, max_y) = ink.unwrap_or_default();
        let line_height = i64::from(metrics.line_height());
        let (width, height) = if glyphs.segment_properties().direction.is_horizontal() {
            (pen.0, line_height)
        } else {
            (line_height, -pen.1)
        };

        trace!(
            "extents: pen ({}, {}), ink x {}..{} y {}..{}",
            pen.0, pen.1, min_x, max_x, min_y, max_y
        );

        let ascender = i64::from(metrics.ascender);
        let floor = i64::from(metrics.descender) - i64::from(metrics.line_gap);
        let out = |value: i64| self.convert(value, metrics.units_per_em);

        AggregateExtents {
            pen_x: out(pen.0),
            pen_y: out(pen.1),
            advance_box: AdvanceBox { width: out(width), height: out(height) },
            ink_box: InkBox { min_x: out(min_x), max_x: out(max_x), min_y: out(min_y), max_y: out(max_y) },
            margins: Margins {
                top: out(ascender - max_y),
                right: out(width - max_x),
                bottom: out(floor - min_y),
                left: out(-min_x),
            },
        }
    }

    fn convert(&self, value: i64, units_per_em: u32) -> F26Dot6 {
        match self.scale {
            Some(scale) => F26Dot6::scaled(value, scale, units_per_em),
            None => F26Dot6::from_i64(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::{FontExtents, GlyphExtents, GlyphId};
    use crate::glyph::{Completion, GlyphRecord};
    use crate::script::SegmentProperties;

    fn metrics() -> FontMetrics {
        FontMetrics::new(1000, FontExtents { ascender: 800, descender: -200, line_gap: 0 })
    }

    fn one_glyph() -> GlyphBuffer {
        let record = GlyphRecord { glyph_id: GlyphId(1), x_advance: 500, ..GlyphRecord::default() };
        GlyphBuffer::new(vec![record], SegmentProperties::default(), Completion::Complete)
    }

    fn extents(glyph: GlyphId) -> Option<GlyphExtents> {
        (glyph == GlyphId(1)).then_some(GlyphExtents { x_bearing: 10, y_bearing: 400, width: 480, height: -420 })
    }

    #[test]
    fn test_single_glyph_scaled() {
        let result = MetricsCalculator::with_scale(256).compute_extents(&one_glyph(), &metrics(), &extents);
        assert_eq!(result.advance_box.width, F26Dot6::from_i32(128));
        assert_eq!(result.advance_box.height, F26Dot6::from_i32(256));
        assert!((result.ink_box.width().to_f64() - 122.88).abs() < 0.5);
    }

    #[test]
    fn test_design_units_and_margins() {
        let result = MetricsCalculator::new().compute_extents(&one_glyph(), &metrics(), &extents);
        assert_eq!(result.pen_x, F26Dot6::from_i32(500));
        assert_eq!(result.ink_box.min_x, F26Dot6::from_i32(10));
        assert_eq!(result.ink_box.max_x, F26Dot6::from_i32(490));
        assert_eq!(result.ink_box.max_y, F26Dot6::from_i32(400));
        assert_eq!(result.ink_box.min_y, F26Dot6::from_i32(-20));
        assert_eq!(result.margins.top, F26Dot6::from_i32(400));
        assert_eq!(result.margins.right, F26Dot6::from_i32(10));
        assert_eq!(result.margins.bottom, F26Dot6::from_i32(-180));
        assert_eq!(result.margins.left, F26Dot6::from_i32(-10));
    }

    #[test]
    fn test_empty_buffer_has_degenerate_ink() {
        let empty = GlyphBuffer::new(Vec::new(), SegmentProperties::default(), Completion::Complete);
        let result = MetricsCalculator::with_scale(16).compute_extents(&empty, &metrics(), &extents);
        assert!(result.ink_box.is_empty());
        assert_eq!(result.advance_box.width, F26Dot6::ZERO);
    }

    #[test]
    fn test_glyph_without_ink_only_advances() {
        let space = GlyphRecord { glyph_id: GlyphId(2), x_advance: 250, ..GlyphRecord::default() };
        let glyph = GlyphRecord { glyph_id: GlyphId(1), x_advance: 500, ..GlyphRecord::default() };
        let glyphs = GlyphBuffer::new(vec![space, glyph], SegmentProperties::default(), Completion::Complete);
        let result = MetricsCalculator::new().compute_extents(&glyphs, &metrics(), &extents);
        assert_eq!(result.ink_box.min_x, F26Dot6::from_i32(260));
        assert_eq!(result.advance_box.width, F26Dot6::from_i32(750));
    }
}
