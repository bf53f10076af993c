//! Codepoint buffer
//!
//! Input side of shaping: codepoints with cluster values and feature masks,
//! plus the segment properties (script, language, direction) of the run.

use std::ops::RangeBounds;

use bitflags::bitflags;
use tracing::debug;

use crate::config::ShapingConfig;
use crate::script::{Direction, Language, Script, SegmentProperties};
use crate::{Result, ShapeError};

const REPLACEMENT: u32 = 0xFFFD;

bitflags! {
    /// Per-glyph feature mask; a stage only touches glyphs whose mask
    /// intersects the stage's mask
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GlyphMask: u32 {
        /// Features that are always on (ccmp, locl, single adjustments)
        const GLOBAL = 1 << 0;
        const LIGATURES = 1 << 1;
        const KERNING = 1 << 2;
        const CONTEXTUAL = 1 << 3;
    }
}

impl Default for GlyphMask {
    fn default() -> Self {
        Self::all()
    }
}

/// One input codepoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodepointItem {
    pub codepoint: u32,
    /// Index into the source text
    pub cluster: u32,
    pub mask: GlyphMask,
}

/// Input buffer for one shaping call
#[derive(Debug, Clone, Default)]
pub struct CodepointBuffer {
    items: Vec<CodepointItem>,
    script: Option<Script>,
    language: Option<Language>,
    direction: Option<Direction>,
    finalized: bool,
}

impl CodepointBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { items: Vec::with_capacity(capacity), ..Self::default() }
    }

    /// Append one codepoint.
    ///
    /// `cluster` defaults to the insertion index. Explicit clusters must not
    /// decrease; invalid scalar values are replaced with U+FFFD.
    pub fn append(&mut self, codepoint: u32, cluster: Option<u32>) -> Result<()> {
        self.ensure_mutable("append")?;
        let cluster = cluster.unwrap_or(self.items.len() as u32);
        if let Some(last) = self.items.last() {
            if cluster < last.cluster {
                return Err(ShapeError::ClusterOrder { cluster, previous: last.cluster });
            }
        }
        let codepoint = if char::from_u32(codepoint).is_some() { codepoint } else { REPLACEMENT };
        self.items.push(CodepointItem { codepoint, cluster, mask: GlyphMask::default() });
        Ok(())
    }

    /// Append UTF-8 text; clusters are byte offsets, counted on from the
    /// last cluster already in the buffer
    pub fn push_str(&mut self, text: &str) -> Result<()> {
        self.ensure_mutable("push_str")?;
        let base = self.next_cluster();
        self.items.reserve(text.len());
        for (offset, c) in text.char_indices() {
            self.append(c as u32, Some(base + offset as u32))?;
        }
        Ok(())
    }

    /// Append UTF-16 text; clusters are code-unit offsets, lone surrogates
    /// become U+FFFD
    pub fn push_utf16(&mut self, text: &[u16]) -> Result<()> {
        self.ensure_mutable("push_utf16")?;
        let base = self.next_cluster();
        let mut offset = 0u32;
        for decoded in char::decode_utf16(text.iter().copied()) {
            let (codepoint, units) = match decoded {
                Ok(c) => (c as u32, c.len_utf16() as u32),
                Err(_) => (REPLACEMENT, 1),
            };
            self.append(codepoint, Some(base + offset))?;
            offset += units;
        }
        Ok(())
    }

    /// Append UTF-32 text; clusters are indices
    pub fn push_utf32(&mut self, text: &[u32]) -> Result<()> {
        self.ensure_mutable("push_utf32")?;
        let base = self.next_cluster();
        for (index, &codepoint) in text.iter().enumerate() {
            self.append(codepoint, Some(base + index as u32))?;
        }
        Ok(())
    }

    /// Enable or disable `mask` on every item whose cluster is in `clusters`
    pub fn set_mask_range<R>(&mut self, clusters: R, mask: GlyphMask, enabled: bool) -> Result<()>
    where
        R: RangeBounds<u32>,
    {
        self.ensure_mutable("set_mask_range")?;
        for item in self.items.iter_mut().filter(|item| clusters.contains(&item.cluster)) {
            item.mask.set(mask, enabled);
        }
        Ok(())
    }

    pub fn set_script(&mut self, script: Script) -> Result<()> {
        self.ensure_mutable("set_script")?;
        self.script = Some(script);
        Ok(())
    }

    pub fn set_language(&mut self, language: Language) -> Result<()> {
        self.ensure_mutable("set_language")?;
        self.language = Some(language);
        Ok(())
    }

    pub fn set_direction(&mut self, direction: Direction) -> Result<()> {
        self.ensure_mutable("set_direction")?;
        self.direction = Some(direction);
        Ok(())
    }

    /// Set all three segment properties at once
    pub fn set_segment_properties(&mut self, props: SegmentProperties) -> Result<()> {
        self.ensure_mutable("set_segment_properties")?;
        self.script = Some(props.script);
        self.language = Some(props.language);
        self.direction = Some(props.direction);
        Ok(())
    }

    /// Fill unset segment properties from the buffer contents and the
    /// process locale
    pub fn guess_segment_properties(&mut self) {
        self.guess_with_language(None);
    }

    /// Like [`guess_segment_properties`](Self::guess_segment_properties), with
    /// the configured language taking precedence over the process locale
    pub fn guess_segment_properties_with(&mut self, config: &ShapingConfig) {
        self.guess_with_language(config.language());
    }

    fn guess_with_language(&mut self, language: Option<Language>) {
        if self.finalized {
            debug!("guess_segment_properties on a finalized buffer ignored");
            return;
        }
        let mut ambiguous = false;
        if self.script.is_none() {
            let dominant = Script::dominant(self.items.iter().map(|item| item.codepoint));
            ambiguous = dominant.is_none();
            self.script = Some(dominant.unwrap_or(Script::Common));
        }
        if self.language.is_none() {
            self.language = Some(language.unwrap_or_else(Language::from_locale_env));
        }
        if self.direction.is_none() {
            self.direction = Some(match (ambiguous, self.script) {
                (false, Some(script)) => Direction::from_script(script),
                _ => Direction::LeftToRight,
            });
        }
        debug!(
            "guessed segment properties {}/{}/{}{}",
            self.script.unwrap_or_default(),
            self.language.unwrap_or_default(),
            self.direction.unwrap_or_default(),
            if ambiguous { " (ambiguous script)" } else { "" },
        );
    }

    /// Freeze the buffer; later mutation fails with `InvalidState`
    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn items(&self) -> &[CodepointItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn script(&self) -> Option<Script> {
        self.script
    }

    pub fn language(&self) -> Option<Language> {
        self.language
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    /// Segment properties, if all three are set
    pub fn segment_properties(&self) -> Option<SegmentProperties> {
        Some(SegmentProperties::new(self.script?, self.language?, self.direction?))
    }

    fn next_cluster(&self) -> u32 {
        self.items.last().map_or(0, |item| item.cluster + 1)
    }

    fn ensure_mutable(&self, operation: &str) -> Result<()> {
        if self.finalized {
            return Err(ShapeError::InvalidState(format!("{operation} on a finalized buffer")));
        }
        Ok(())
    }
}
