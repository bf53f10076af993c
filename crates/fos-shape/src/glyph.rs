//! Shaped glyph output

use std::fmt;

use crate::font::GlyphId;
use crate::script::SegmentProperties;
use crate::{Result, ShapeError};

/// One positioned glyph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GlyphRecord {
    pub glyph_id: GlyphId,
    /// Smallest source cluster merged into this glyph
    pub cluster: u32,
    /// Largest source cluster merged into this glyph
    pub cluster_end: u32,
    pub x_advance: i32,
    pub y_advance: i32,
    pub x_offset: i32,
    pub y_offset: i32,
}

impl fmt::Display for GlyphRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gid{}={}@{},{}+{}",
            self.glyph_id, self.cluster, self.x_advance, self.x_offset, self.y_offset
        )
    }
}

/// Whether every plan stage ran
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Completion {
    #[default]
    Complete,
    /// An observer stopped shaping before `stage` ran
    Aborted { stage: usize, description: String },
}

/// Output of one shaping call, in visual order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphBuffer {
    records: Vec<GlyphRecord>,
    props: SegmentProperties,
    completion: Completion,
}

impl GlyphBuffer {
    pub(crate) fn new(records: Vec<GlyphRecord>, props: SegmentProperties, completion: Completion) -> Self {
        Self { records, props, completion }
    }

    pub fn records(&self) -> &[GlyphRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GlyphRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Segment properties the buffer was shaped with
    pub fn segment_properties(&self) -> SegmentProperties {
        self.props
    }

    pub fn completion(&self) -> &Completion {
        &self.completion
    }

    pub fn is_partial(&self) -> bool {
        matches!(self.completion, Completion::Aborted { .. })
    }

    /// Total pen displacement (sum of advances)
    pub fn advance(&self) -> (i64, i64) {
        self.records.iter().fold((0, 0), |(x, y), r| {
            (x + i64::from(r.x_advance), y + i64::from(r.y_advance))
        })
    }

    /// The buffer itself if every stage ran, `AbortedByCallback` otherwise
    pub fn complete(self) -> Result<Self> {
        match self.completion {
            Completion::Complete => Ok(self),
            Completion::Aborted { stage, description } => {
                Err(ShapeError::AbortedByCallback { stage, description })
            }
        }
    }

    pub fn into_records(self) -> Vec<GlyphRecord> {
        self.records
    }
}

impl<'a> IntoIterator for &'a GlyphBuffer {
    type Item = &'a GlyphRecord;
    type IntoIter = std::slice::Iter<'a, GlyphRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl fmt::Display for GlyphBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, record) in self.records.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{record}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(glyph: u32, cluster: u32, x_advance: i32) -> GlyphRecord {
        GlyphRecord {
            glyph_id: GlyphId(glyph),
            cluster,
            cluster_end: cluster,
            x_advance,
            ..GlyphRecord::default()
        }
    }

    #[test]
    fn test_display_format() {
        let buffer = GlyphBuffer::new(
            vec![record(36, 0, 1200), GlyphRecord { y_offset: -5, ..record(72, 1, 600) }],
            SegmentProperties::default(),
            Completion::Complete,
        );
        assert_eq!(buffer.to_string(), "gid36=0@1200,0+0|gid72=1@600,0+-5");
        assert_eq!(buffer.advance(), (1800, 0));
    }

    #[test]
    fn test_complete_reports_abort() {
        let aborted = GlyphBuffer::new(
            vec![record(1, 0, 10)],
            SegmentProperties::default(),
            Completion::Aborted { stage: 1, description: "positioning 'kern'".into() },
        );
        assert!(aborted.is_partial());
        assert!(matches!(aborted.complete(), Err(ShapeError::AbortedByCallback { stage: 1, .. })));

        let done = GlyphBuffer::new(Vec::new(), SegmentProperties::default(), Completion::Complete);
        assert!(done.complete().is_ok());
    }
}
