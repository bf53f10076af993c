//! Big-endian reader for raw font tables

use super::Tag;
use crate::ShapeError;

/// Table read failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    #[error("{table}: read of {len} bytes at offset {offset} past end ({size} bytes)")]
    OutOfBounds { table: &'static str, offset: usize, len: usize, size: usize },

    #[error("{table}: unsupported version {version}")]
    UnsupportedVersion { table: &'static str, version: u32 },

    #[error("{table}: {reason}")]
    Invalid { table: &'static str, reason: &'static str },
}

impl From<ReadError> for ShapeError {
    fn from(err: ReadError) -> Self {
        ShapeError::MalformedFont(err.to_string())
    }
}

/// Binary reader with bounds checking
#[derive(Debug, Clone)]
pub struct FontReader<'a> {
    table: &'static str,
    data: &'a [u8],
    pos: usize,
}

impl<'a> FontReader<'a> {
    /// Reader over `data`; `table` names the table in error messages
    pub fn new(table: &'static str, data: &'a [u8]) -> Self {
        Self { table, data, pos: 0 }
    }

    /// Reader over the sub-table at `offset` of `data`
    pub fn at(table: &'static str, data: &'a [u8], offset: usize) -> Result<Self, ReadError> {
        let sub = data.get(offset..).ok_or(ReadError::OutOfBounds {
            table,
            offset,
            len: 0,
            size: data.len(),
        })?;
        Ok(Self::new(table, sub))
    }

    /// Whole data this reader walks
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Bytes left after the current position
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn skip(&mut self, n: usize) -> Result<(), ReadError> {
        self.read_bytes(n).map(|_| ())
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], ReadError> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.data.len());
        let end = end.ok_or(ReadError::OutOfBounds {
            table: self.table,
            offset: self.pos,
            len: n,
            size: self.data.len(),
        })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn read_u16(&mut self) -> Result<u16, ReadError> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_i16(&mut self) -> Result<i16, ReadError> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32, ReadError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_tag(&mut self) -> Result<Tag, ReadError> {
        let b = self.read_bytes(4)?;
        Ok(Tag([b[0], b[1], b[2], b[3]]))
    }

    /// `count` big-endian u16 values
    pub fn read_u16_array(&mut self, count: usize) -> Result<Vec<u16>, ReadError> {
        (0..count).map(|_| self.read_u16()).collect()
    }

    pub fn invalid(&self, reason: &'static str) -> ReadError {
        ReadError::Invalid { table: self.table, reason }
    }
}
