//! AAT `kerx` (extended kerning) reader
//!
//! Decodes format 0 (ordered pair list) and format 2 (class table) subtables
//! into [`Lookup::Kerning`]. State-machine (1), anchor (4) and two-level
//! array (6) subtables, and subtables with variation values, are skipped.

use std::collections::HashMap;

use tracing::debug;

use super::reader::{FontReader, ReadError};
use super::{ClassPairs, GlyphId, Lookup, PairTable};

const TABLE: &str = "kerx";

/// Coverage flags of a subtable header
const VERTICAL: u32 = 0x8000_0000;
const CROSS_STREAM: u32 = 0x4000_0000;
const VARIATION: u32 = 0x2000_0000;
const SUBTABLE_TYPE: u32 = 0x0000_00FF;

const HEADER_SIZE: usize = 12;

/// Decoded kerning subtable
#[derive(Debug, Clone)]
pub(crate) struct KerxSubtable {
    pub vertical: bool,
    pub lookup: Lookup,
}

/// Decoded `kerx` table
#[derive(Debug, Clone, Default)]
pub(crate) struct KerxTable {
    pub subtables: Vec<KerxSubtable>,
}

impl KerxTable {
    pub fn parse(data: &[u8]) -> Result<Self, ReadError> {
        let mut reader = FontReader::new(TABLE, data);
        let version = reader.read_u16()?;
        let _unused = reader.read_u16()?;
        if version < 2 {
            return Err(ReadError::UnsupportedVersion { table: TABLE, version: version.into() });
        }
        let count = reader.read_u32()?;

        let mut subtables = Vec::new();
        for index in 0..count {
            let start = reader.pos();
            let length = reader.read_u32()? as usize;
            let coverage = reader.read_u32()?;
            let _tuple_count = reader.read_u32()?;
            if length < HEADER_SIZE {
                return Err(reader.invalid("subtable shorter than its header"));
            }
            reader.skip(length - HEADER_SIZE)?;
            let subtable = &data[start..start + length];

            let format = coverage & SUBTABLE_TYPE;
            if coverage & VARIATION != 0 {
                debug!("kerx subtable {}: variation kerning skipped", index);
                continue;
            }
            let pairs = match format {
                0 => parse_format0(subtable)?,
                2 => parse_format2(subtable)?,
                _ => {
                    debug!("kerx subtable {}: format {} not supported, skipped", index, format);
                    continue;
                }
            };
            subtables.push(KerxSubtable {
                vertical: coverage & VERTICAL != 0,
                lookup: Lookup::Kerning { pairs, cross_stream: coverage & CROSS_STREAM != 0 },
            });
        }
        debug!("kerx: {} of {} subtables decoded", subtables.len(), count);
        Ok(Self { subtables })
    }
}

fn parse_format0(subtable: &[u8]) -> Result<PairTable<i32>, ReadError> {
    let mut reader = FontReader::at(TABLE, subtable, HEADER_SIZE)?;
    let pair_count = reader.read_u32()?;
    // searchRange, entrySelector, rangeShift
    reader.skip(12)?;

    let mut table = PairTable::default();
    for _ in 0..pair_count {
        let left = GlyphId(u32::from(reader.read_u16()?));
        let right = GlyphId(u32::from(reader.read_u16()?));
        let value = i32::from(reader.read_i16()?);
        table.pairs.entry((left, right)).or_insert(value);
    }
    Ok(table)
}

/// Class table: first glyph, then one class per consecutive glyph
fn parse_class_table(subtable: &[u8], offset: usize) -> Result<(u16, Vec<u16>), ReadError> {
    let mut reader = FontReader::at(TABLE, subtable, offset)?;
    let first_glyph = reader.read_u16()?;
    let count = reader.read_u16()? as usize;
    Ok((first_glyph, reader.read_u16_array(count)?))
}

fn parse_format2(subtable: &[u8]) -> Result<PairTable<i32>, ReadError> {
    let mut reader = FontReader::at(TABLE, subtable, HEADER_SIZE)?;
    let row_width = reader.read_u32()? as usize;
    let left_offset = reader.read_u32()? as usize;
    let right_offset = reader.read_u32()? as usize;
    let array_offset = reader.read_u32()? as usize;

    let (left_first, left_classes) = parse_class_table(subtable, left_offset)?;
    let (right_first, right_classes) = parse_class_table(subtable, right_offset)?;

    // Rows and columns starting past the end of the subtable only hold zero
    // cells; `ClassPairs::get` misses them, which kerns the same as zero.
    let available = subtable.len().saturating_sub(array_offset);
    let max_rows = if row_width == 0 { 1 } else { available.div_ceil(row_width) };
    let rows = left_classes
        .iter()
        .copied()
        .max()
        .map_or(0, |c| c as usize + 1)
        .min(max_rows);
    let columns = right_classes
        .iter()
        .copied()
        .max()
        .map_or(0, |c| c as usize + 1)
        .min(available / 2);
    if rows.saturating_mul(columns) > available {
        return Err(reader.invalid("kerning classes overrun the kerning array"));
    }

    // Cells outside the subtable read as zero kerning
    let cell = |row: usize, column: usize| -> i32 {
        let offset = array_offset + row * row_width + column * 2;
        subtable
            .get(offset..offset + 2)
            .map_or(0, |b| i32::from(i16::from_be_bytes([b[0], b[1]])))
    };

    let mut values = Vec::with_capacity(rows * columns);
    for row in 0..rows {
        for column in 0..columns {
            values.push(cell(row, column));
        }
    }

    let to_map = |first: u16, classes: &[u16]| -> HashMap<GlyphId, u16> {
        classes
            .iter()
            .enumerate()
            .filter(|&(_, &class)| class != 0)
            .map(|(i, &class)| (GlyphId(u32::from(first) + i as u32), class))
            .collect()
    };

    let mut table = PairTable::default();
    table.classes.push(ClassPairs {
        coverage: (0..left_classes.len() as u32)
            .map(|i| GlyphId(u32::from(left_first) + i))
            .collect(),
        first_classes: to_map(left_first, &left_classes),
        second_classes: to_map(right_first, &right_classes),
        second_class_count: columns as u16,
        values,
    });
    Ok(table)
}
