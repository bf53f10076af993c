//! fOS Shape - Text Shaping Core
//!
//! This crate turns a run of codepoints into positioned glyphs:
//! - Codepoint buffers with cluster mapping and segment properties
//! - Shaping plans compiled once per (font, script, language, direction)
//! - The shaping engine (substitution, RTL reordering, positioning)
//! - Glyph buffers and aggregate ink/advance extents
//!
//! Font tables are read through the [`FontTables`] trait. [`MemoryFont`] holds
//! pre-decoded tables, [`TtfFont`] reads an OpenType font file.

pub mod buffer;
pub mod config;
pub mod engine;
pub mod fixed;
pub mod font;
pub mod glyph;
pub mod metrics;
pub mod plan;
pub mod script;

pub use buffer::{CodepointBuffer, CodepointItem, GlyphMask};
pub use config::ShapingConfig;
pub use engine::{ShapingEngine, StageControl, StageInfo, StageObserver, TraceObserver};
pub use fixed::F26Dot6;
pub use font::{
    ExtentsLookup, FontExtents, FontMetrics, FontTables, GlyphExtents, GlyphId, Lookup,
    LookupRef, MemoryFont, Tag, TtfFont,
};
pub use glyph::{Completion, GlyphBuffer, GlyphRecord};
pub use metrics::{AdvanceBox, AggregateExtents, InkBox, Margins, MetricsCalculator};
pub use plan::{PlanCache, PlanStage, ShapingPlan, StageKind};
pub use script::{Direction, Language, Script, SegmentProperties};

/// Shaping error types
#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("no usable lookups for script {script} and fallback is disabled")]
    UnsupportedScript { script: Script },

    #[error("malformed font: {0}")]
    MalformedFont(String),

    #[error("shaping aborted by callback before stage {stage}: {description}")]
    AbortedByCallback { stage: usize, description: String },

    #[error("cluster {cluster} precedes previous cluster {previous}")]
    ClusterOrder { cluster: u32, previous: u32 },

    #[error("invalid feature tag: {0:?}")]
    InvalidFeature(String),

    #[error("invalid shaping config: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ShapeError>;
