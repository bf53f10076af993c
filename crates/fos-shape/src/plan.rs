//! Shaping plans
//!
//! A plan is the ordered list of lookup stages for one (font, script,
//! language, direction) combination. It is compiled once and shared
//! read-only by any number of shaping calls.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::buffer::GlyphMask;
use crate::config::ShapingConfig;
use crate::font::{FontTables, LookupRef, Tag};
use crate::script::SegmentProperties;
use crate::{Result, ShapeError};

/// Stage kind; all substitution stages run before all positioning stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageKind {
    Substitution,
    Positioning,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StageKind::Substitution => "substitution",
            StageKind::Positioning => "positioning",
        })
    }
}

/// One stage: the lookups of one feature, in lookup-list order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStage {
    pub kind: StageKind,
    pub feature: Tag,
    /// Glyphs whose mask misses this are left alone
    pub mask: GlyphMask,
    pub lookups: Vec<LookupRef>,
}

impl PlanStage {
    /// Human-readable stage description passed to stage observers
    pub fn description(&self) -> String {
        let indices: Vec<String> = self.lookups.iter().map(|l| l.index.to_string()).collect();
        format!("{} '{}' (lookups {})", self.kind, self.feature, indices.join(", "))
    }
}

/// Mask bit a feature is controlled by
fn feature_mask(feature: Tag) -> GlyphMask {
    match &feature.0 {
        b"liga" | b"clig" | b"rlig" | b"dlig" | b"hlig" => GlyphMask::LIGATURES,
        b"kern" | b"vkrn" | b"dist" => GlyphMask::KERNING,
        b"calt" | b"rclt" => GlyphMask::CONTEXTUAL,
        _ => GlyphMask::GLOBAL,
    }
}

/// Compiled, immutable stage list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapingPlan {
    props: SegmentProperties,
    features: Vec<Tag>,
    stages: Vec<PlanStage>,
}

impl ShapingPlan {
    /// Compile with the default configuration
    pub fn compile<F: FontTables + ?Sized>(font: &F, props: SegmentProperties) -> Result<Self> {
        Self::compile_with(font, props, &ShapingConfig::default())
    }

    /// Compile the stages of `font` for `props` and the configured features.
    ///
    /// A font with no lookups for the run yields a plan with no stages, which
    /// shapes with the default glyph mapping and native advances only. With
    /// fallback disabled that case is `UnsupportedScript` instead.
    pub fn compile_with<F: FontTables + ?Sized>(
        font: &F,
        props: SegmentProperties,
        config: &ShapingConfig,
    ) -> Result<Self> {
        let features = config.resolved_features(props.direction)?;
        let mut refs = font.lookups(&props, &features)?;

        if refs.is_empty() {
            if !config.allow_fallback {
                return Err(ShapeError::UnsupportedScript { script: props.script });
            }
            debug!("plan {}: no font lookups, default mapping only", props);
        }

        // Stable: keeps feature order within each kind
        refs.sort_by_key(|r| r.kind);

        // A lookup reached through several features runs once, in the
        // stage of the first feature that reaches it
        let mut seen = HashSet::new();
        let mut stages: Vec<PlanStage> = Vec::new();
        for lookup in refs {
            if !seen.insert((lookup.kind, lookup.index)) {
                continue;
            }
            match stages.last_mut() {
                Some(stage) if stage.kind == lookup.kind && stage.feature == lookup.feature => {
                    stage.lookups.push(lookup);
                }
                _ => stages.push(PlanStage {
                    kind: lookup.kind,
                    feature: lookup.feature,
                    mask: feature_mask(lookup.feature),
                    lookups: vec![lookup],
                }),
            }
        }
        for stage in &mut stages {
            stage.lookups.sort_by_key(|l| l.index);
        }

        debug!(
            "plan {}: {} stages ({} substitution, {} positioning)",
            props,
            stages.len(),
            stages.iter().filter(|s| s.kind == StageKind::Substitution).count(),
            stages.iter().filter(|s| s.kind == StageKind::Positioning).count(),
        );

        Ok(Self { props, features, stages })
    }

    pub fn segment_properties(&self) -> SegmentProperties {
        self.props
    }

    /// Feature tags the plan was compiled for
    pub fn features(&self) -> &[Tag] {
        &self.features
    }

    pub fn stages(&self) -> &[PlanStage] {
        &self.stages
    }

    /// Whether only the default glyph mapping applies
    pub fn is_fallback(&self) -> bool {
        self.stages.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PlanKey {
    font: u64,
    props: SegmentProperties,
    features: Vec<Tag>,
}

/// Memoized plans keyed by (caller font key, segment properties, features).
///
/// Concurrent misses for the same key may both compile; the first plan
/// inserted is kept and returned to both callers.
#[derive(Debug, Default)]
pub struct PlanCache {
    plans: RwLock<HashMap<PlanKey, Arc<ShapingPlan>>>,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached plan for the key, compiling it on a miss.
    ///
    /// `font_key` identifies `font` to the caller; two fonts must never share
    /// a key.
    pub fn get_or_compile<F: FontTables + ?Sized>(
        &self,
        font_key: u64,
        font: &F,
        props: SegmentProperties,
        config: &ShapingConfig,
    ) -> Result<Arc<ShapingPlan>> {
        let key = PlanKey { font: font_key, props, features: config.resolved_features(props.direction)? };
        if let Some(plan) = self.plans.read().get(&key) {
            return Ok(Arc::clone(plan));
        }

        let plan = Arc::new(ShapingPlan::compile_with(font, props, config)?);
        let mut plans = self.plans.write();
        let cached = plans.entry(key).or_insert(plan);
        Ok(Arc::clone(cached))
    }

    pub fn len(&self) -> usize {
        self.plans.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.read().is_empty()
    }

    pub fn clear(&self) {
        let mut plans = self.plans.write();
        if !plans.is_empty() {
            debug!("dropping {} cached shaping plans", plans.len());
        }
        plans.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::{GlyphId, Lookup, MemoryFont, ValueRecord};
    use crate::script::{Direction, Language, Script};

    fn single(from: u32, to: u32) -> Lookup {
        Lookup::Single(HashMap::from([(GlyphId(from), GlyphId(to))]))
    }

    fn font() -> MemoryFont {
        MemoryFont::builder(1000)
            .glyph('a', 1, 500)
            .lookup(b"kern", Lookup::SingleAdjust(HashMap::from([(GlyphId(1), ValueRecord::advance(-10))])))
            .lookup(b"liga", single(1, 2))
            .lookup(b"ccmp", single(1, 3))
            .lookup(b"liga", single(2, 4))
            .build()
    }

    fn latin() -> SegmentProperties {
        SegmentProperties::new(Script::Latin, Language::DEFAULT, Direction::LeftToRight)
    }

    #[test]
    fn test_substitution_before_positioning() {
        let plan = ShapingPlan::compile(&font(), latin()).unwrap();
        let order: Vec<(StageKind, String)> =
            plan.stages().iter().map(|s| (s.kind, s.feature.to_string())).collect();
        assert_eq!(
            order,
            vec![
                (StageKind::Substitution, "ccmp".to_string()),
                (StageKind::Substitution, "liga".to_string()),
                (StageKind::Positioning, "kern".to_string()),
            ]
        );
        assert_eq!(plan.stages()[1].lookups.len(), 2);
        assert_eq!(plan.stages()[1].mask, GlyphMask::LIGATURES);
        assert_eq!(plan.stages()[2].mask, GlyphMask::KERNING);
        assert_eq!(plan.stages()[1].description(), "substitution 'liga' (lookups 1, 3)");
    }

    #[test]
    fn test_shared_lookup_runs_once() {
        let font = MemoryFont::builder(1000)
            .glyph('a', 1, 500)
            .lookup(b"liga", single(1, 2))
            .shared_lookup(b"clig", 0)
            .lookup(b"clig", single(2, 3))
            .shared_lookup(b"rlig", 1)
            .build();
        let plan = ShapingPlan::compile(&font, latin()).unwrap();

        let stages: Vec<(String, Vec<u16>)> = plan
            .stages()
            .iter()
            .map(|s| (s.feature.to_string(), s.lookups.iter().map(|l| l.index).collect()))
            .collect();
        // Default order is rlig, then liga, then clig
        assert_eq!(
            stages,
            vec![("rlig".to_string(), vec![1]), ("liga".to_string(), vec![0])]
        );
    }

    #[test]
    fn test_compile_is_deterministic() {
        let font = font();
        let a = ShapingPlan::compile(&font, latin()).unwrap();
        let b = ShapingPlan::compile(&font, latin()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fallback_plan() {
        let font = MemoryFont::builder(1000).glyph('a', 1, 500).build();
        let plan = ShapingPlan::compile(&font, latin()).unwrap();
        assert!(plan.is_fallback());

        let strict = ShapingConfig { allow_fallback: false, ..ShapingConfig::default() };
        let err = ShapingPlan::compile_with(&font, latin(), &strict).unwrap_err();
        assert!(matches!(err, ShapeError::UnsupportedScript { script: Script::Latin }));
    }

    #[test]
    fn test_disabled_feature_has_no_stage() {
        let config = ShapingConfig { features: vec!["-liga".into()], ..ShapingConfig::default() };
        let plan = ShapingPlan::compile_with(&font(), latin(), &config).unwrap();
        assert!(plan.stages().iter().all(|s| s.feature != Tag::new(b"liga")));
    }

    #[test]
    fn test_cache_reuses_plans() {
        let font = font();
        let cache = PlanCache::new();
        let config = ShapingConfig::default();
        let a = cache.get_or_compile(7, &font, latin(), &config).unwrap();
        let b = cache.get_or_compile(7, &font, latin(), &config).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let rtl = SegmentProperties { direction: Direction::RightToLeft, ..latin() };
        cache.get_or_compile(7, &font, rtl, &config).unwrap();
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_shared_across_threads() {
        let font = font();
        let cache = PlanCache::new();
        let plans: Vec<Arc<ShapingPlan>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| cache.get_or_compile(1, &font, latin(), &ShapingConfig::default())))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect()
        });
        assert_eq!(cache.len(), 1);
        assert!(plans.windows(2).all(|w| w[0] == w[1]));
    }
}
