//! Edge case tests for fos-shape
//!
//! Boundary conditions: empty input, unmapped codepoints, finalized buffers,
//! stopped shaping, broken fonts.

use std::collections::HashMap;

use fos_shape::font::{Ligature, PairTable};
use fos_shape::{
    CodepointBuffer, Completion, Direction, FontMetrics, FontTables, GlyphId, Language, Lookup,
    MemoryFont, MetricsCalculator, Script, SegmentProperties, ShapeError, ShapingEngine,
    ShapingPlan, StageControl, StageInfo, TtfFont,
};

fn latin(direction: Direction) -> SegmentProperties {
    SegmentProperties::new(Script::Latin, Language::DEFAULT, direction)
}

/// f=1 i=2 fi=3 V=4 A=5, with liga and kern stages
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
                    pairs: HashMap::from([((GlyphId(3), GlyphId(4)), -40)]),
                    classes: Vec::new(),
                },
                cross_stream: false,
            },
        )
        .build()
}

fn buffer(text: &str) -> CodepointBuffer {
    let mut buffer = CodepointBuffer::new();
    buffer.push_str(text).unwrap();
    buffer
}

// ============================================================================
// EMPTY INPUT
// ============================================================================

#[test]
fn test_empty_buffer_shapes_to_empty_run() {
    let font = font();
    let plan = ShapingPlan::compile(&font, latin(Direction::LeftToRight)).unwrap();
    let glyphs = ShapingEngine::new(&font).shape(&plan, CodepointBuffer::new()).unwrap();
    assert!(glyphs.is_empty());
    assert_eq!(glyphs.completion(), &Completion::Complete);

    let metrics = FontMetrics::from_font(&font, Direction::LeftToRight);
    let extents = MetricsCalculator::with_scale(256).compute_extents(&glyphs, &metrics, &font);
    assert!(extents.ink_box.is_empty());
    assert_eq!(extents.pen_x.to_bits(), 0);
}

#[test]
fn test_empty_buffer_never_reaches_observer() {
    let font = font();
    let plan = ShapingPlan::compile(&font, latin(Direction::LeftToRight)).unwrap();
    let mut calls = 0;
    let mut observer = |_: &StageInfo<'_>| {
        calls += 1;
        StageControl::Stop
    };
    let glyphs = ShapingEngine::new(&font)
        .shape_with_observer(&plan, CodepointBuffer::new(), &mut observer)
        .unwrap();
    assert!(!glyphs.is_partial());
    assert_eq!(calls, 0);
}

// ============================================================================
// UNMAPPED AND INVALID INPUT
// ============================================================================

#[test]
fn test_unmapped_codepoint_becomes_notdef() {
    let font = font();
    let plan = ShapingPlan::compile(&font, latin(Direction::LeftToRight)).unwrap();
    let glyphs = ShapingEngine::new(&font).shape(&plan, buffer("f?")).unwrap();
    assert_eq!(glyphs.records()[1].glyph_id, GlyphId::NOTDEF);
    assert_eq!(glyphs.records()[1].cluster, 1);
}

#[test]
fn test_lone_surrogates_shape_as_replacement() {
    let font = font();
    let plan = ShapingPlan::compile(&font, latin(Direction::LeftToRight)).unwrap();
    let mut input = CodepointBuffer::new();
    input.push_utf16(&[0xDC00, 0x0066]).unwrap();
    let glyphs = ShapingEngine::new(&font).shape(&plan, input).unwrap();
    assert_eq!(glyphs.len(), 2);
    assert_eq!(glyphs.records()[0].glyph_id, GlyphId::NOTDEF);
    assert_eq!(glyphs.records()[1].glyph_id, GlyphId(1));
}

#[test]
fn test_decreasing_cluster_is_rejected() {
    let mut input = CodepointBuffer::new();
    input.append('a' as u32, Some(3)).unwrap();
    assert!(matches!(
        input.append('b' as u32, Some(1)),
        Err(ShapeError::ClusterOrder { cluster: 1, previous: 3 })
    ));
    assert_eq!(input.len(), 1);
}

// ============================================================================
// FINALIZED BUFFERS
// ============================================================================

#[test]
fn test_mutation_after_finalize_fails() {
    let mut input = buffer("fi");
    input.finalize();
    assert!(matches!(input.push_utf32(&[0x41]), Err(ShapeError::InvalidState(_))));
    assert!(matches!(input.set_direction(Direction::RightToLeft), Err(ShapeError::InvalidState(_))));

    // inference is silent on a frozen buffer
    input.guess_segment_properties();
    assert_eq!(input.script(), None);
}

#[test]
fn test_finalized_buffer_still_shapes() {
    let font = font();
    let plan = ShapingPlan::compile(&font, latin(Direction::LeftToRight)).unwrap();
    let mut input = buffer("fi");
    input.finalize();
    let glyphs = ShapingEngine::new(&font).shape(&plan, input).unwrap();
    assert_eq!(glyphs.len(), 1);
}

// ============================================================================
// STOPPED SHAPING
// ============================================================================

#[test]
fn test_stop_on_second_stage_returns_partial_run() {
    let font = font();
    let plan = ShapingPlan::compile(&font, latin(Direction::LeftToRight)).unwrap();
    assert_eq!(plan.stages().len(), 2);

    let mut stop_second = |info: &StageInfo<'_>| {
        if info.index == 1 { StageControl::Stop } else { StageControl::Continue }
    };
    let glyphs = ShapingEngine::new(&font)
        .shape_with_observer(&plan, buffer("fiV"), &mut stop_second)
        .unwrap();

    // ligature applied, kerning not
    assert_eq!(glyphs.to_string(), "gid3=0@520,0+0|gid4=2@600,0+0");
    assert!(glyphs.is_partial());
    match glyphs.completion() {
        Completion::Aborted { stage, description } => {
            assert_eq!(*stage, 1);
            assert!(description.contains("kern"));
        }
        Completion::Complete => panic!("expected a partial run"),
    }
    assert!(matches!(glyphs.complete(), Err(ShapeError::AbortedByCallback { stage: 1, .. })));
}

#[test]
fn test_stop_before_first_stage_still_reorders() {
    let font = font();
    let plan = ShapingPlan::compile(&font, latin(Direction::RightToLeft)).unwrap();
    let mut stop = |_: &StageInfo<'_>| StageControl::Stop;
    let glyphs = ShapingEngine::new(&font)
        .shape_with_observer(&plan, buffer("fiV"), &mut stop)
        .unwrap();
    assert_eq!(glyphs.to_string(), "gid4=2@600,0+0|gid2=1@250,0+0|gid1=0@300,0+0");
}

// ============================================================================
// BROKEN FONTS
// ============================================================================

#[test]
fn test_cmap_beyond_glyph_count_is_malformed() {
    let font = MemoryFont::builder(1000).glyph('a', 7, 500).glyph_count(3).build();
    let plan = ShapingPlan::compile(&font, latin(Direction::LeftToRight)).unwrap();
    let err = ShapingEngine::new(&font).shape(&plan, buffer("a")).unwrap_err();
    assert!(matches!(err, ShapeError::MalformedFont(_)));
}

#[test]
fn test_truncated_font_file_is_malformed() {
    let mut data = b"OTTO".to_vec();
    data.extend_from_slice(&[0, 9, 0, 0]);
    assert!(matches!(TtfFont::new(&data, 0), Err(ShapeError::MalformedFont(_))));
}

#[test]
fn test_zero_units_per_em_is_clamped() {
    let font = MemoryFont::builder(0).glyph('a', 1, 1).build();
    assert_eq!(font.units_per_em(), 1);
    let metrics = FontMetrics::from_font(&font, Direction::LeftToRight);
    assert_eq!(metrics.units_per_em, 1);
}
