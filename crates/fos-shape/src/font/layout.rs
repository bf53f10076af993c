//! OpenType GSUB / GPOS reader
//!
//! Decodes the script list, feature list and lookup list of a layout table
//! into the engine's [`Lookup`] model. Supported: GSUB single (1), multiple (2)
//! and ligature (4); GPOS single (1) and pair (2) adjustment; extension
//! lookups of both. Lookups of any other type decode to `None` and are never
//! handed to a plan. Lookup flags are not interpreted (no GDEF glyph classes).

use std::collections::HashMap;

use tracing::debug;

use super::reader::{FontReader, ReadError};
use super::{ClassPairs, GlyphId, Ligature, Lookup, LookupRef, PairTable, Tag, ValueRecord};
use crate::plan::StageKind;
use crate::script::SegmentProperties;

const NO_REQUIRED_FEATURE: u16 = 0xFFFF;

/// Distinct 16-bit glyph ids; range tables listing more glyphs overlap
const MAX_RANGE_GLYPHS: usize = 0x1_0000;

/// Script tags tried in order when the run's own script is missing
const FALLBACK_SCRIPTS: [Tag; 3] = [Tag(*b"DFLT"), Tag(*b"dflt"), Tag(*b"latn")];

/// Decoded GSUB or GPOS table
#[derive(Debug, Clone)]
pub(crate) struct LayoutTable {
    kind: StageKind,
    scripts: Vec<ScriptRecord>,
    features: Vec<FeatureRecord>,
    lookups: Vec<Option<Lookup>>,
}

#[derive(Debug, Clone)]
struct ScriptRecord {
    tag: Tag,
    default_lang: Option<LangSys>,
    langs: Vec<(Tag, LangSys)>,
}

#[derive(Debug, Clone)]
struct LangSys {
    required: Option<u16>,
    features: Vec<u16>,
}

#[derive(Debug, Clone)]
struct FeatureRecord {
    tag: Tag,
    lookups: Vec<u16>,
}

fn table_name(kind: StageKind) -> &'static str {
    match kind {
        StageKind::Substitution => "GSUB",
        StageKind::Positioning => "GPOS",
    }
}

impl LayoutTable {
    /// Parse a GSUB (`Substitution`) or GPOS (`Positioning`) table
    pub fn parse(kind: StageKind, data: &[u8]) -> Result<Self, ReadError> {
        let table = table_name(kind);
        let mut reader = FontReader::new(table, data);

        let major = reader.read_u16()?;
        let minor = reader.read_u16()?;
        if major != 1 {
            return Err(ReadError::UnsupportedVersion {
                table,
                version: (u32::from(major) << 16) | u32::from(minor),
            });
        }

        let script_list = reader.read_u16()? as usize;
        let feature_list = reader.read_u16()? as usize;
        let lookup_list = reader.read_u16()? as usize;

        let scripts = parse_script_list(table, data, script_list)?;
        let features = parse_feature_list(table, data, feature_list)?;
        let lookups = parse_lookup_list(kind, data, lookup_list)?;

        debug!(
            "{}: {} scripts, {} features, {} lookups ({} supported)",
            table,
            scripts.len(),
            features.len(),
            lookups.len(),
            lookups.iter().filter(|l| l.is_some()).count(),
        );

        Ok(Self { kind, scripts, features, lookups })
    }

    /// Supported lookups of `features` for the run's script and language.
    ///
    /// The language system's required feature comes first, then each
    /// requested feature in request order.
    pub fn lookup_refs(&self, props: &SegmentProperties, features: &[Tag]) -> Vec<LookupRef> {
        let Some(script) = self.find_script(props.script.tag()) else {
            return Vec::new();
        };
        let lang_tag = props.language.tag();
        let lang = script
            .langs
            .iter()
            .find(|(tag, _)| *tag == lang_tag)
            .map(|(_, lang)| lang)
            .or(script.default_lang.as_ref());
        let Some(lang) = lang else {
            return Vec::new();
        };

        let mut refs = Vec::new();
        if let Some(required) = lang.required.and_then(|i| self.features.get(i as usize)) {
            self.push_feature_lookups(required, &mut refs);
        }
        for &wanted in features {
            for record in lang
                .features
                .iter()
                .filter_map(|&i| self.features.get(i as usize))
                .filter(|record| record.tag == wanted)
            {
                self.push_feature_lookups(record, &mut refs);
            }
        }
        refs
    }

    pub fn lookup(&self, index: u16) -> Option<&Lookup> {
        self.lookups.get(index as usize)?.as_ref()
    }

    fn push_feature_lookups(&self, feature: &FeatureRecord, refs: &mut Vec<LookupRef>) {
        for &index in &feature.lookups {
            if self.lookup(index).is_some() {
                refs.push(LookupRef { kind: self.kind, feature: feature.tag, index });
            }
        }
    }

    fn find_script(&self, tag: Tag) -> Option<&ScriptRecord> {
        std::iter::once(tag)
            .chain(FALLBACK_SCRIPTS)
            .find_map(|t| self.scripts.iter().find(|s| s.tag == t))
    }
}

fn parse_script_list(table: &'static str, data: &[u8], offset: usize) -> Result<Vec<ScriptRecord>, ReadError> {
    if offset == 0 {
        return Ok(Vec::new());
    }
    let mut reader = FontReader::at(table, data, offset)?;
    let base = reader.data();
    let count = reader.read_u16()?;

    let mut scripts = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let tag = reader.read_tag()?;
        let script_offset = reader.read_u16()? as usize;

        let mut script = FontReader::at(table, base, script_offset)?;
        let script_base = script.data();
        let default_offset = script.read_u16()? as usize;
        let lang_count = script.read_u16()?;

        let default_lang = if default_offset != 0 {
            Some(parse_lang_sys(table, script_base, default_offset)?)
        } else {
            None
        };
        let mut langs = Vec::with_capacity(lang_count as usize);
        for _ in 0..lang_count {
            let lang_tag = script.read_tag()?;
            let lang_offset = script.read_u16()? as usize;
            langs.push((lang_tag, parse_lang_sys(table, script_base, lang_offset)?));
        }

        scripts.push(ScriptRecord { tag, default_lang, langs });
    }
    Ok(scripts)
}

fn parse_lang_sys(table: &'static str, data: &[u8], offset: usize) -> Result<LangSys, ReadError> {
    let mut reader = FontReader::at(table, data, offset)?;
    let _lookup_order = reader.read_u16()?;
    let required = reader.read_u16()?;
    let count = reader.read_u16()? as usize;
    Ok(LangSys {
        required: (required != NO_REQUIRED_FEATURE).then_some(required),
        features: reader.read_u16_array(count)?,
    })
}

fn parse_feature_list(table: &'static str, data: &[u8], offset: usize) -> Result<Vec<FeatureRecord>, ReadError> {
    if offset == 0 {
        return Ok(Vec::new());
    }
    let mut reader = FontReader::at(table, data, offset)?;
    let base = reader.data();
    let count = reader.read_u16()?;

    let mut features = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let tag = reader.read_tag()?;
        let feature_offset = reader.read_u16()? as usize;
        let mut feature = FontReader::at(table, base, feature_offset)?;
        let _params = feature.read_u16()?;
        let lookup_count = feature.read_u16()? as usize;
        features.push(FeatureRecord { tag, lookups: feature.read_u16_array(lookup_count)? });
    }
    Ok(features)
}

fn parse_lookup_list(kind: StageKind, data: &[u8], offset: usize) -> Result<Vec<Option<Lookup>>, ReadError> {
    if offset == 0 {
        return Ok(Vec::new());
    }
    let table = table_name(kind);
    let mut reader = FontReader::at(table, data, offset)?;
    let base = reader.data();
    let count = reader.read_u16()? as usize;
    let offsets = reader.read_u16_array(count)?;

    offsets
        .into_iter()
        .enumerate()
        .map(|(index, lookup_offset)| parse_lookup(kind, base, lookup_offset as usize, index))
        .collect()
}

fn parse_lookup(kind: StageKind, data: &[u8], offset: usize, index: usize) -> Result<Option<Lookup>, ReadError> {
    let table = table_name(kind);
    let mut reader = FontReader::at(table, data, offset)?;
    let base = reader.data();
    let lookup_type = reader.read_u16()?;
    let _lookup_flag = reader.read_u16()?;
    let subtable_count = reader.read_u16()? as usize;
    let subtable_offsets = reader.read_u16_array(subtable_count)?;

    let extension_type = match kind {
        StageKind::Substitution => 7,
        StageKind::Positioning => 9,
    };

    let mut merged: Option<Lookup> = None;
    for subtable_offset in subtable_offsets {
        let mut subtable = FontReader::at(table, base, subtable_offset as usize)?.data();
        let mut actual_type = lookup_type;

        if lookup_type == extension_type {
            let mut ext = FontReader::new(table, subtable);
            let _format = ext.read_u16()?;
            actual_type = ext.read_u16()?;
            let ext_offset = ext.read_u32()? as usize;
            subtable = FontReader::at(table, subtable, ext_offset)?.data();
        }

        let decoded = match (kind, actual_type) {
            (StageKind::Substitution, 1) => parse_single_subst(table, subtable)?,
            (StageKind::Substitution, 2) => parse_multiple_subst(table, subtable)?,
            (StageKind::Substitution, 4) => parse_ligature_subst(table, subtable)?,
            (StageKind::Positioning, 1) => parse_single_pos(table, subtable)?,
            (StageKind::Positioning, 2) => parse_pair_pos(table, subtable)?,
            _ => {
                debug!("{} lookup {}: type {} not supported, skipped", table, index, actual_type);
                return Ok(None);
            }
        };

        match merged.as_mut() {
            Some(lookup) => merge_subtable(lookup, decoded),
            None => merged = Some(decoded),
        }
    }
    Ok(merged)
}

/// Fold a later subtable into a lookup; earlier subtables keep priority
fn merge_subtable(lookup: &mut Lookup, next: Lookup) {
    match (lookup, next) {
        (Lookup::Single(map), Lookup::Single(more)) => {
            for (k, v) in more {
                map.entry(k).or_insert(v);
            }
        }
        (Lookup::Multiple(map), Lookup::Multiple(more)) => {
            for (k, v) in more {
                map.entry(k).or_insert(v);
            }
        }
        (Lookup::Ligature(map), Lookup::Ligature(more)) => {
            for (k, v) in more {
                map.entry(k).or_default().extend(v);
            }
        }
        (Lookup::SingleAdjust(map), Lookup::SingleAdjust(more)) => {
            for (k, v) in more {
                map.entry(k).or_insert(v);
            }
        }
        (Lookup::PairAdjust(pairs), Lookup::PairAdjust(more)) => {
            for (k, v) in more.pairs {
                pairs.pairs.entry(k).or_insert(v);
            }
            pairs.classes.extend(more.classes);
        }
        // Subtables of one lookup share its type
        _ => {}
    }
}

/// Coverage table as glyphs in coverage-index order
fn parse_coverage(table: &'static str, data: &[u8], offset: usize) -> Result<Vec<GlyphId>, ReadError> {
    let mut reader = FontReader::at(table, data, offset)?;
    match reader.read_u16()? {
        1 => {
            let count = reader.read_u16()? as usize;
            Ok(reader
                .read_u16_array(count)?
                .into_iter()
                .map(|g| GlyphId(u32::from(g)))
                .collect())
        }
        2 => {
            let count = reader.read_u16()?;
            let mut indexed = Vec::new();
            for _ in 0..count {
                let start = reader.read_u16()?;
                let end = reader.read_u16()?;
                let start_index = reader.read_u16()?;
                if end < start {
                    return Err(reader.invalid("coverage range ends before it starts"));
                }
                if indexed.len() + usize::from(end - start) >= MAX_RANGE_GLYPHS {
                    return Err(reader.invalid("coverage ranges overlap"));
                }
                for (i, glyph) in (start..=end).enumerate() {
                    indexed.push((usize::from(start_index) + i, GlyphId(u32::from(glyph))));
                }
            }
            indexed.sort_by_key(|&(index, _)| index);
            Ok(indexed.into_iter().map(|(_, glyph)| glyph).collect())
        }
        _ => Err(reader.invalid("unknown coverage format")),
    }
}

/// Class definition table; unlisted glyphs are class 0
fn parse_class_def(table: &'static str, data: &[u8], offset: usize) -> Result<HashMap<GlyphId, u16>, ReadError> {
    let mut classes = HashMap::new();
    if offset == 0 {
        return Ok(classes);
    }
    let mut reader = FontReader::at(table, data, offset)?;
    match reader.read_u16()? {
        1 => {
            let start = reader.read_u16()?;
            let count = reader.read_u16()? as usize;
            for (i, class) in reader.read_u16_array(count)?.into_iter().enumerate() {
                if class != 0 {
                    classes.insert(GlyphId(u32::from(start) + i as u32), class);
                }
            }
        }
        2 => {
            let count = reader.read_u16()?;
            let mut listed = 0usize;
            for _ in 0..count {
                let start = reader.read_u16()?;
                let end = reader.read_u16()?;
                let class = reader.read_u16()?;
                listed += usize::from(end.saturating_sub(start)) + 1;
                if listed > MAX_RANGE_GLYPHS {
                    return Err(reader.invalid("class ranges overlap"));
                }
                if class != 0 {
                    for glyph in start..=end {
                        classes.insert(GlyphId(u32::from(glyph)), class);
                    }
                }
            }
        }
        _ => return Err(reader.invalid("unknown class definition format")),
    }
    Ok(classes)
}

fn parse_single_subst(table: &'static str, data: &[u8]) -> Result<Lookup, ReadError> {
    let mut reader = FontReader::new(table, data);
    let format = reader.read_u16()?;
    let coverage = parse_coverage(table, data, reader.read_u16()? as usize)?;

    let map = match format {
        1 => {
            let delta = reader.read_i16()?;
            coverage
                .into_iter()
                .map(|g| (g, GlyphId((g.0 as u16).wrapping_add(delta as u16).into())))
                .collect()
        }
        2 => {
            let count = reader.read_u16()? as usize;
            let substitutes = reader.read_u16_array(count)?;
            coverage
                .into_iter()
                .zip(substitutes)
                .map(|(g, s)| (g, GlyphId(u32::from(s))))
                .collect()
        }
        _ => return Err(reader.invalid("unknown single substitution format")),
    };
    Ok(Lookup::Single(map))
}

fn parse_multiple_subst(table: &'static str, data: &[u8]) -> Result<Lookup, ReadError> {
    let mut reader = FontReader::new(table, data);
    if reader.read_u16()? != 1 {
        return Err(reader.invalid("unknown multiple substitution format"));
    }
    let coverage = parse_coverage(table, data, reader.read_u16()? as usize)?;
    let count = reader.read_u16()? as usize;
    let offsets = reader.read_u16_array(count)?;

    let mut map = HashMap::new();
    for (glyph, offset) in coverage.into_iter().zip(offsets) {
        let mut sequence = FontReader::at(table, data, offset as usize)?;
        let len = sequence.read_u16()? as usize;
        let glyphs: Vec<GlyphId> = sequence
            .read_u16_array(len)?
            .into_iter()
            .map(|g| GlyphId(u32::from(g)))
            .collect();
        // An empty sequence deletes the glyph
        map.insert(glyph, glyphs);
    }
    Ok(Lookup::Multiple(map))
}

fn parse_ligature_subst(table: &'static str, data: &[u8]) -> Result<Lookup, ReadError> {
    let mut reader = FontReader::new(table, data);
    if reader.read_u16()? != 1 {
        return Err(reader.invalid("unknown ligature substitution format"));
    }
    let coverage = parse_coverage(table, data, reader.read_u16()? as usize)?;
    let count = reader.read_u16()? as usize;
    let set_offsets = reader.read_u16_array(count)?;

    let mut map = HashMap::new();
    for (first, set_offset) in coverage.into_iter().zip(set_offsets) {
        let mut set = FontReader::at(table, data, set_offset as usize)?;
        let set_base = set.data();
        let lig_count = set.read_u16()? as usize;

        let mut ligatures = Vec::with_capacity(lig_count);
        for lig_offset in set.read_u16_array(lig_count)? {
            let mut lig = FontReader::at(table, set_base, lig_offset as usize)?;
            let glyph = GlyphId(u32::from(lig.read_u16()?));
            let component_count = lig.read_u16()? as usize;
            if component_count == 0 {
                return Err(lig.invalid("ligature without components"));
            }
            let components = lig
                .read_u16_array(component_count - 1)?
                .into_iter()
                .map(|g| GlyphId(u32::from(g)))
                .collect();
            ligatures.push(Ligature { components, glyph });
        }
        map.insert(first, ligatures);
    }
    Ok(Lookup::Ligature(map))
}

/// Encoded size of a value record: one 16-bit field per format bit
fn value_record_size(format: u16) -> usize {
    (format & 0x00FF).count_ones() as usize * 2
}

fn parse_value_record(reader: &mut FontReader<'_>, format: u16) -> Result<ValueRecord, ReadError> {
    let mut record = ValueRecord::default();
    if format & 0x0001 != 0 { record.x_placement = reader.read_i16()?.into(); }
    if format & 0x0002 != 0 { record.y_placement = reader.read_i16()?.into(); }
    if format & 0x0004 != 0 { record.x_advance = reader.read_i16()?.into(); }
    if format & 0x0008 != 0 { record.y_advance = reader.read_i16()?.into(); }
    // Device and variation offsets are ignored
    for bit in [0x0010, 0x0020, 0x0040, 0x0080] {
        if format & bit != 0 {
            reader.skip(2)?;
        }
    }
    Ok(record)
}

fn parse_single_pos(table: &'static str, data: &[u8]) -> Result<Lookup, ReadError> {
    let mut reader = FontReader::new(table, data);
    let format = reader.read_u16()?;
    let coverage = parse_coverage(table, data, reader.read_u16()? as usize)?;
    let value_format = reader.read_u16()?;

    let map = match format {
        1 => {
            let value = parse_value_record(&mut reader, value_format)?;
            coverage.into_iter().map(|g| (g, value)).collect()
        }
        2 => {
            let count = reader.read_u16()? as usize;
            let mut values = Vec::with_capacity(count);
            for _ in 0..count {
                values.push(parse_value_record(&mut reader, value_format)?);
            }
            coverage.into_iter().zip(values).collect()
        }
        _ => return Err(reader.invalid("unknown single positioning format")),
    };
    Ok(Lookup::SingleAdjust(map))
}

fn parse_pair_pos(table: &'static str, data: &[u8]) -> Result<Lookup, ReadError> {
    let mut reader = FontReader::new(table, data);
    let format = reader.read_u16()?;
    let coverage = parse_coverage(table, data, reader.read_u16()? as usize)?;
    let format1 = reader.read_u16()?;
    let format2 = reader.read_u16()?;

    let mut pairs = PairTable::default();
    match format {
        1 => {
            let count = reader.read_u16()? as usize;
            let set_offsets = reader.read_u16_array(count)?;
            for (first, set_offset) in coverage.into_iter().zip(set_offsets) {
                let mut set = FontReader::at(table, data, set_offset as usize)?;
                let value_count = set.read_u16()?;
                for _ in 0..value_count {
                    let second = GlyphId(u32::from(set.read_u16()?));
                    let v1 = parse_value_record(&mut set, format1)?;
                    let v2 = parse_value_record(&mut set, format2)?;
                    pairs.pairs.entry((first, second)).or_insert((v1, v2));
                }
            }
        }
        2 => {
            let class_def1 = reader.read_u16()? as usize;
            let class_def2 = reader.read_u16()? as usize;
            let class1_count = reader.read_u16()? as usize;
            let class2_count = reader.read_u16()?;
            let cells = class1_count.saturating_mul(class2_count as usize);

            let record_size = value_record_size(format1) + value_record_size(format2);
            if record_size == 0 {
                debug!("{}: class pair subtable without values, skipped", table);
                return Ok(Lookup::PairAdjust(pairs));
            }
            if cells.saturating_mul(record_size) > reader.remaining() {
                return Err(reader.invalid("class pair matrix overruns the subtable"));
            }

            let mut values = Vec::with_capacity(cells);
            for _ in 0..cells {
                let v1 = parse_value_record(&mut reader, format1)?;
                let v2 = parse_value_record(&mut reader, format2)?;
                values.push((v1, v2));
            }

            let mut coverage = coverage;
            coverage.sort_unstable();
            coverage.dedup();
            pairs.classes.push(ClassPairs {
                coverage,
                first_classes: parse_class_def(table, data, class_def1)?,
                second_classes: parse_class_def(table, data, class_def2)?,
                second_class_count: class2_count,
                values,
            });
        }
        _ => return Err(reader.invalid("unknown pair positioning format")),
    }
    Ok(Lookup::PairAdjust(pairs))
}
