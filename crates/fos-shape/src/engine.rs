//! Shaping engine
//!
//! Applies a [`ShapingPlan`] to a [`CodepointBuffer`]:
//! 1. map codepoints to nominal glyphs, one glyph per item
//! 2. run substitution stages in logical order (merging/splitting clusters)
//! 3. resolve native advances, then reverse backward (RTL/BTT) runs
//! 4. run positioning stages on the visual order
//!
//! A [`StageObserver`] sees every stage before it runs and may stop shaping;
//! the glyphs shaped so far are returned, marked partial.

use std::collections::HashMap;

use tracing::{debug, debug_span, trace};

use crate::buffer::{CodepointBuffer, GlyphMask};
use crate::font::{FontTables, GlyphId, Ligature, Lookup, LookupRef, PairTable, Tag, ValueRecord};
use crate::glyph::{Completion, GlyphBuffer, GlyphRecord};
use crate::plan::{ShapingPlan, StageKind};
use crate::script::{Direction, SegmentProperties};
use crate::{Result, ShapeError};

/// Observer verdict for the stage about to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageControl {
    Continue,
    Stop,
}

/// Stage about to run
#[derive(Debug, Clone, Copy)]
pub struct StageInfo<'a> {
    /// Position in the plan, from 0
    pub index: usize,
    pub kind: StageKind,
    pub feature: Tag,
    pub description: &'a str,
    /// Glyphs in the buffer before the stage
    pub glyph_count: usize,
}

/// Per-call stage callback
pub trait StageObserver {
    fn on_stage(&mut self, stage: &StageInfo<'_>) -> StageControl;
}

impl<F> StageObserver for F
where
    F: FnMut(&StageInfo<'_>) -> StageControl,
{
    fn on_stage(&mut self, stage: &StageInfo<'_>) -> StageControl {
        self(stage)
    }
}

/// Logs every stage at debug level and never stops
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceObserver;

impl StageObserver for TraceObserver {
    fn on_stage(&mut self, stage: &StageInfo<'_>) -> StageControl {
        debug!(
            "stage {}: {} ({} glyphs)",
            stage.index, stage.description, stage.glyph_count
        );
        StageControl::Continue
    }
}

/// Glyph plus the feature mask of its source item(s)
#[derive(Debug, Clone, Copy)]
struct Slot {
    record: GlyphRecord,
    mask: GlyphMask,
}

/// Shapes buffers with one font
pub struct ShapingEngine<'f, F: FontTables + ?Sized> {
    font: &'f F,
}

impl<'f, F: FontTables + ?Sized> ShapingEngine<'f, F> {
    pub fn new(font: &'f F) -> Self {
        Self { font }
    }

    pub fn font(&self) -> &'f F {
        self.font
    }

    /// Shape `buffer` with every stage of `plan`
    pub fn shape(&self, plan: &ShapingPlan, buffer: CodepointBuffer) -> Result<GlyphBuffer> {
        let mut run_all = |_: &StageInfo<'_>| StageControl::Continue;
        self.shape_with_observer(plan, buffer, &mut run_all)
    }

    /// Shape `buffer`, asking `observer` before each stage.
    ///
    /// The buffer is finalized if it is not already. Its unset segment
    /// properties adopt the plan's; set properties that differ from the
    /// plan's are an `InvalidState` error.
    pub fn shape_with_observer(
        &self,
        plan: &ShapingPlan,
        mut buffer: CodepointBuffer,
        observer: &mut dyn StageObserver,
    ) -> Result<GlyphBuffer> {
        buffer.finalize();
        let props = resolve_properties(&buffer, plan)?;

        let span = debug_span!(
            "shape",
            script = %props.script,
            direction = %props.direction,
            items = buffer.len()
        );
        let _enter = span.enter();

        if buffer.is_empty() {
            return Ok(GlyphBuffer::new(Vec::new(), props, Completion::Complete));
        }

        let glyph_count = self.font.glyph_count();
        let mut slots = self.map_glyphs(&buffer, glyph_count)?;
        let mut completion = Completion::Complete;
        let mut reordered = false;

        for (index, stage) in plan.stages().iter().enumerate() {
            let description = stage.description();
            let info = StageInfo {
                index,
                kind: stage.kind,
                feature: stage.feature,
                description: &description,
                glyph_count: slots.len(),
            };
            if observer.on_stage(&info) == StageControl::Stop {
                debug!("stopped before stage {}: {}", index, description);
                completion = Completion::Aborted { stage: index, description };
                break;
            }

            if stage.kind == StageKind::Positioning && !reordered {
                self.finish_substitution(&mut slots, props.direction);
                reordered = true;
            }
            for &lookup_ref in &stage.lookups {
                let lookup = self.resolve(lookup_ref, glyph_count)?;
                match lookup {
                    Lookup::Single(map) => substitute_single(&mut slots, map, stage.mask),
                    Lookup::Multiple(map) => substitute_multiple(&mut slots, map, stage.mask),
                    Lookup::Ligature(map) => substitute_ligatures(&mut slots, map, stage.mask),
                    Lookup::SingleAdjust(map) => {
                        for slot in slots.iter_mut().filter(|s| s.mask.intersects(stage.mask)) {
                            if let Some(value) = map.get(&slot.record.glyph_id) {
                                apply_value(&mut slot.record, value, props.direction);
                            }
                        }
                    }
                    Lookup::PairAdjust(pairs) => {
                        adjust_pairs(&mut slots, pairs, stage.mask, props.direction)
                    }
                    Lookup::Kerning { pairs, cross_stream } => {
                        kern_pairs(&mut slots, pairs, *cross_stream, stage.mask, props.direction)
                    }
                }
            }
            debug!("stage {} done: {} ({} glyphs)", index, description, slots.len());
        }

        if !reordered {
            self.finish_substitution(&mut slots, props.direction);
        }

        let records = slots.into_iter().map(|slot| slot.record).collect();
        Ok(GlyphBuffer::new(records, props, completion))
    }

    /// Nominal glyph for every item, clusters copied 1:1
    fn map_glyphs(&self, buffer: &CodepointBuffer, glyph_count: u32) -> Result<Vec<Slot>> {
        buffer
            .items()
            .iter()
            .map(|item| {
                let glyph_id = self.font.glyph_id(item.codepoint).unwrap_or(GlyphId::NOTDEF);
                if glyph_id.0 >= glyph_count {
                    return Err(ShapeError::MalformedFont(format!(
                        "cmap maps U+{:04X} to glyph {} of {}",
                        item.codepoint, glyph_id, glyph_count
                    )));
                }
                Ok(Slot {
                    record: GlyphRecord {
                        glyph_id,
                        cluster: item.cluster,
                        cluster_end: item.cluster,
                        ..GlyphRecord::default()
                    },
                    mask: item.mask,
                })
            })
            .collect()
    }

    /// Look up a plan reference and check it against the font
    fn resolve(&self, lookup_ref: LookupRef, glyph_count: u32) -> Result<&'f Lookup> {
        let lookup = self.font.lookup(lookup_ref).ok_or_else(|| {
            ShapeError::MalformedFont(format!(
                "{} lookup {} for '{}' does not exist",
                lookup_ref.kind, lookup_ref.index, lookup_ref.feature
            ))
        })?;
        if lookup.kind() != lookup_ref.kind {
            return Err(ShapeError::MalformedFont(format!(
                "lookup {} for '{}' is not a {} lookup",
                lookup_ref.index, lookup_ref.feature, lookup_ref.kind
            )));
        }
        if let Some(glyph) = lookup.max_output_glyph().filter(|g| g.0 >= glyph_count) {
            return Err(ShapeError::MalformedFont(format!(
                "lookup {} produces glyph {} but the font has {} glyphs",
                lookup_ref.index, glyph, glyph_count
            )));
        }
        Ok(lookup)
    }

    /// Native advances, then logical-to-visual reversal for backward runs
    fn finish_substitution(&self, slots: &mut [Slot], direction: Direction) {
        for slot in slots.iter_mut() {
            let advance = self.font.glyph_advance(slot.record.glyph_id, direction);
            if direction.is_horizontal() {
                slot.record.x_advance = advance;
            } else {
                // y-up: vertical pens move down
                slot.record.y_advance = -advance;
            }
        }
        if direction.is_backward() {
            slots.reverse();
        }
    }
}

fn resolve_properties(buffer: &CodepointBuffer, plan: &ShapingPlan) -> Result<SegmentProperties> {
    let plan_props = plan.segment_properties();
    let mismatch = |what: &str, buffer: String, plan: String| {
        ShapeError::InvalidState(format!("buffer {what} {buffer} does not match plan {what} {plan}"))
    };
    if let Some(script) = buffer.script().filter(|&s| s != plan_props.script) {
        return Err(mismatch("script", script.to_string(), plan_props.script.to_string()));
    }
    if let Some(language) = buffer.language().filter(|&l| l != plan_props.language) {
        return Err(mismatch("language", language.to_string(), plan_props.language.to_string()));
    }
    if let Some(direction) = buffer.direction().filter(|&d| d != plan_props.direction) {
        return Err(mismatch("direction", direction.to_string(), plan_props.direction.to_string()));
    }
    Ok(plan_props)
}

fn substitute_single(
    slots: &mut [Slot],
    map: &HashMap<GlyphId, GlyphId>,
    mask: GlyphMask,
) {
    for slot in slots.iter_mut().filter(|s| s.mask.intersects(mask)) {
        if let Some(&glyph) = map.get(&slot.record.glyph_id) {
            trace!("single {} -> {}", slot.record.glyph_id, glyph);
            slot.record.glyph_id = glyph;
        }
    }
}

/// One glyph to a sequence; every output glyph keeps the source cluster.
/// An empty sequence deletes the glyph.
fn substitute_multiple(
    slots: &mut Vec<Slot>,
    map: &HashMap<GlyphId, Vec<GlyphId>>,
    mask: GlyphMask,
) {
    if !slots.iter().any(|s| s.mask.intersects(mask) && map.contains_key(&s.record.glyph_id)) {
        return;
    }
    let mut out = Vec::with_capacity(slots.len() + 4);
    for slot in slots.drain(..) {
        match map.get(&slot.record.glyph_id).filter(|_| slot.mask.intersects(mask)) {
            Some(sequence) => {
                trace!("multiple {} -> {:?}", slot.record.glyph_id, sequence);
                out.extend(sequence.iter().map(|&glyph_id| Slot {
                    record: GlyphRecord { glyph_id, ..slot.record },
                    ..slot
                }));
            }
            None => out.push(slot),
        }
    }
    *slots = out;
}

/// Sequences to one glyph; the ligature spans the clusters of its components
fn substitute_ligatures(
    slots: &mut Vec<Slot>,
    map: &HashMap<GlyphId, Vec<Ligature>>,
    mask: GlyphMask,
) {
    let mut out = Vec::with_capacity(slots.len());
    let mut i = 0;
    while i < slots.len() {
        let first = slots[i];
        let candidates = map
            .get(&first.record.glyph_id)
            .filter(|_| first.mask.intersects(mask));
        let matched = candidates.and_then(|candidates| {
            candidates.iter().find(|lig| {
                let rest = &slots[i + 1..];
                rest.len() >= lig.components.len()
                    && lig.components.iter().zip(rest).all(|(&component, slot)| {
                        slot.record.glyph_id == component && slot.mask.intersects(mask)
                    })
            })
        });

        match matched {
            Some(lig) => {
                let parts = &slots[i..=i + lig.components.len()];
                let cluster = parts.iter().map(|s| s.record.cluster).min().unwrap_or(first.record.cluster);
                let cluster_end = parts.iter().map(|s| s.record.cluster_end).max().unwrap_or(cluster);
                let merged = parts.iter().fold(GlyphMask::all(), |m, s| m & s.mask);
                trace!("ligature {} components -> {}", parts.len(), lig.glyph);
                out.push(Slot {
                    record: GlyphRecord { glyph_id: lig.glyph, cluster, cluster_end, ..first.record },
                    mask: merged,
                });
                i += parts.len();
            }
            None => {
                out.push(first);
                i += 1;
            }
        }
    }
    *slots = out;
}

/// Positioning value; advances only apply along the run direction
fn apply_value(record: &mut GlyphRecord, value: &ValueRecord, direction: Direction) {
    record.x_offset += value.x_placement;
    record.y_offset += value.y_placement;
    if direction.is_horizontal() {
        record.x_advance += value.x_advance;
    } else {
        record.y_advance -= value.y_advance;
    }
}

/// Visual indices in logical order
fn logical_order(len: usize, direction: Direction) -> Vec<usize> {
    if direction.is_backward() {
        (0..len).rev().collect()
    } else {
        (0..len).collect()
    }
}

/// Pair adjustment over logical neighbours
fn adjust_pairs(
    slots: &mut [Slot],
    pairs: &PairTable<(ValueRecord, ValueRecord)>,
    mask: GlyphMask,
    direction: Direction,
) {
    let order = logical_order(slots.len(), direction);
    let mut j = 0;
    while j + 1 < order.len() {
        let (a, b) = (order[j], order[j + 1]);
        let eligible = slots[a].mask.intersects(mask) && slots[b].mask.intersects(mask);
        let value = eligible
            .then(|| pairs.get(slots[a].record.glyph_id, slots[b].record.glyph_id))
            .flatten();
        match value {
            Some((first, second)) => {
                apply_value(&mut slots[a].record, first, direction);
                apply_value(&mut slots[b].record, second, direction);
                // A second glyph that was adjusted is not a pair start
                j += if second.is_empty() { 1 } else { 2 };
            }
            None => j += 1,
        }
    }
}

/// Kerning over visual neighbours
fn kern_pairs(
    slots: &mut [Slot],
    pairs: &PairTable<i32>,
    cross_stream: bool,
    mask: GlyphMask,
    direction: Direction,
) {
    for i in 1..slots.len() {
        let (left, right) = (slots[i - 1], slots[i]);
        if !left.mask.intersects(mask) || !right.mask.intersects(mask) {
            continue;
        }
        let Some(&value) = pairs.get(left.record.glyph_id, right.record.glyph_id) else {
            continue;
        };
        if value == 0 {
            continue;
        }
        match (cross_stream, direction.is_horizontal()) {
            (true, true) => slots[i].record.y_offset += value,
            (true, false) => slots[i].record.x_offset += value,
            (false, true) => slots[i - 1].record.x_advance += value,
            (false, false) => slots[i - 1].record.y_advance -= value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::MemoryFont;
    use crate::script::{Language, Script};

    fn props(direction: Direction) -> SegmentProperties {
        SegmentProperties::new(Script::Latin, Language::DEFAULT, direction)
    }

    fn buffer(text: &str) -> CodepointBuffer {
        let mut buffer = CodepointBuffer::new();
        buffer.push_str(text).unwrap();
        buffer
    }

    /// f=1 i=2 fi=3 V=4 A=5
    fn font() -> MemoryFont {
        MemoryFont::builder(1000)
            .glyph('f', 1, 300)
            .glyph('i', 2, 250)
            .advance(3, 520)
            .glyph('V', 4, 600)
            .glyph('A', 5, 650)
            .lookup(
                b"liga",
                Lookup::Ligature(HashMap::from([(
                    GlyphId(1),
                    vec![Ligature { components: vec![GlyphId(2)], glyph: GlyphId(3) }],
                )])),
            )
            .lookup(
                b"kern",
                Lookup::Kerning {
                    pairs: PairTable {
                        pairs: HashMap::from([((GlyphId(4), GlyphId(5)), -80)]),
                        classes: Vec::new(),
                    },
                    cross_stream: false,
                },
            )
            .build()
    }

    fn shape(font: &MemoryFont, text: &str, direction: Direction) -> GlyphBuffer {
        let plan = ShapingPlan::compile(font, props(direction)).unwrap();
        ShapingEngine::new(font).shape(&plan, buffer(text)).unwrap()
    }

    #[test]
    fn test_ligature_merges_clusters() {
        let glyphs = shape(&font(), "fif", Direction::LeftToRight);
        assert_eq!(glyphs.to_string(), "gid3=0@520,0+0|gid1=2@300,0+0");
        assert_eq!(glyphs.records()[0].cluster_end, 1);
    }

    #[test]
    fn test_ligature_respects_mask() {
        let font = font();
        let plan = ShapingPlan::compile(&font, props(Direction::LeftToRight)).unwrap();
        let mut input = buffer("fi");
        input.set_mask_range(1..=1, GlyphMask::LIGATURES, false).unwrap();
        let glyphs = ShapingEngine::new(&font).shape(&plan, input).unwrap();
        assert_eq!(glyphs.len(), 2);
    }

    #[test]
    fn test_kerning_applies_to_first_glyph() {
        let glyphs = shape(&font(), "VA", Direction::LeftToRight);
        assert_eq!(glyphs.records()[0].x_advance, 520);
        assert_eq!(glyphs.advance(), (1170, 0));
    }

    #[test]
    fn test_rtl_reverses_after_substitution() {
        let glyphs = shape(&font(), "fiV", Direction::RightToLeft);
        let ids: Vec<u32> = glyphs.iter().map(|g| g.glyph_id.0).collect();
        assert_eq!(ids, vec![4, 3]);
        let clusters: Vec<u32> = glyphs.iter().map(|g| g.cluster).collect();
        assert_eq!(clusters, vec![2, 0]);
    }

    #[test]
    fn test_vertical_advances_are_negative() {
        let glyphs = shape(&font(), "fi", Direction::TopToBottom);
        assert_eq!(glyphs.records()[0].y_advance, -1000);
        assert_eq!(glyphs.records()[0].x_advance, 0);
    }

    #[test]
    fn test_multiple_substitution_splits() {
        let font = MemoryFont::builder(1000)
            .glyph('x', 1, 100)
            .glyph('y', 4, 400)
            .advance(2, 200)
            .advance(3, 300)
            .lookup(b"ccmp", Lookup::Multiple(HashMap::from([(GlyphId(1), vec![GlyphId(2), GlyphId(3)])])))
            .build();
        let glyphs = shape(&font, "xy", Direction::LeftToRight);
        assert_eq!(glyphs.to_string(), "gid2=0@200,0+0|gid3=0@300,0+0|gid4=1@400,0+0");
    }

    #[test]
    fn test_pair_adjust_uses_logical_order_in_rtl() {
        let font = MemoryFont::builder(1000)
            .glyph('a', 1, 500)
            .glyph('b', 2, 500)
            .lookup(
                b"kern",
                Lookup::PairAdjust(PairTable {
                    pairs: HashMap::from([(
                        (GlyphId(1), GlyphId(2)),
                        (ValueRecord::advance(-30), ValueRecord::default()),
                    )]),
                    classes: Vec::new(),
                }),
            )
            .build();
        let glyphs = shape(&font, "ab", Direction::RightToLeft);
        // visual order is b, a; the logical first glyph is adjusted
        assert_eq!(glyphs.to_string(), "gid2=1@500,0+0|gid1=0@470,0+0");
    }

    #[test]
    fn test_cross_stream_kerning_offsets_second_glyph() {
        let font = MemoryFont::builder(1000)
            .glyph('a', 1, 500)
            .glyph('b', 2, 500)
            .lookup(
                b"kern",
                Lookup::Kerning {
                    pairs: PairTable { pairs: HashMap::from([((GlyphId(1), GlyphId(2)), 40)]), classes: Vec::new() },
                    cross_stream: true,
                },
            )
            .build();
        let glyphs = shape(&font, "ab", Direction::LeftToRight);
        assert_eq!(glyphs.to_string(), "gid1=0@500,0+0|gid2=1@500,0+40");
    }

    #[test]
    fn test_conflicting_buffer_properties() {
        let font = font();
        let plan = ShapingPlan::compile(&font, props(Direction::LeftToRight)).unwrap();
        let mut input = buffer("fi");
        input.set_direction(Direction::RightToLeft).unwrap();
        let err = ShapingEngine::new(&font).shape(&plan, input).unwrap_err();
        assert!(matches!(err, ShapeError::InvalidState(_)));
    }

    #[test]
    fn test_lookup_beyond_glyph_count_is_malformed() {
        let font = MemoryFont::builder(1000)
            .glyph('a', 1, 500)
            .glyph_count(2)
            .lookup(b"ccmp", Lookup::Single(HashMap::from([(GlyphId(1), GlyphId(9))])))
            .build();
        let plan = ShapingPlan::compile(&font, props(Direction::LeftToRight)).unwrap();
        let err = ShapingEngine::new(&font).shape(&plan, buffer("a")).unwrap_err();
        assert!(matches!(err, ShapeError::MalformedFont(_)));
        // the plan stays usable for other buffers that never reach the lookup
        let empty = ShapingEngine::new(&font).shape(&plan, CodepointBuffer::new()).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_observer_sees_every_stage() {
        let font = font();
        let plan = ShapingPlan::compile(&font, props(Direction::LeftToRight)).unwrap();
        let mut seen = Vec::new();
        let mut observer = |info: &StageInfo<'_>| {
            seen.push((info.index, info.feature.to_string()));
            StageControl::Continue
        };
        let glyphs = ShapingEngine::new(&font)
            .shape_with_observer(&plan, buffer("fiVA"), &mut observer)
            .unwrap();
        assert_eq!(glyphs.completion(), &Completion::Complete);
        assert_eq!(seen, vec![(0, "liga".to_string()), (1, "kern".to_string())]);

        let traced = ShapingEngine::new(&font)
            .shape_with_observer(&plan, buffer("fiVA"), &mut TraceObserver)
            .unwrap();
        assert_eq!(traced, glyphs);
    }
}
