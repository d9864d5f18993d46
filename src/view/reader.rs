//! Cursor-based little-endian reader over a `ByteSource`.
//!
//! ```text
//! pascal string:  [i32 char_count][char_count x u16 UTF-16LE]
//! array:          [u32 count][count x element]
//! ```

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::error::{RawError, Result};
use crate::loader::{Revision, VersionedRecord};
use crate::view::source::ByteSource;

/// Upper bound on pascal-string length in characters.
pub const MAX_STRING_CHARS: i32 = 1 << 20;

/// Default plausibility cap for count-prefixed arrays.
pub const DEFAULT_ARRAY_CAP: usize = 100_000;

/// What to do when a read runs past the end of the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    /// Short reads fail with `TruncatedRecord`.
    #[default]
    Strict,
    /// Missing bytes read as zero (file still being written).
    PermitMissing,
}

macro_rules! read_le {
    ($($name:ident => $ty:ty),* $(,)?) => {
        $(
            pub fn $name(&mut self) -> Result<$ty> {
                let mut bytes = [0u8; std::mem::size_of::<$ty>()];
                self.read_into(&mut bytes)?;
                Ok(<$ty>::from_le_bytes(bytes))
            }
        )*
    };
}

/// Sequential reader with a single cursor.
///
/// The reader tracks the record currently being decoded so that errors
/// name the record and revision they came from.
#[derive(Debug, Clone)]
pub struct RecordReader<'a> {
    source: &'a dyn ByteSource,
    pos: u64,
    mode: ReadMode,
    record: &'static str,
    revision: u32,
}

impl<'a> RecordReader<'a> {
    pub fn new(source: &'a dyn ByteSource) -> Self {
        Self::at_offset(source, 0)
    }

    pub fn at_offset(source: &'a dyn ByteSource, offset: u64) -> Self {
        Self {
            source,
            pos: offset,
            mode: ReadMode::Strict,
            record: "bytes",
            revision: Revision::NEWEST.get(),
        }
    }

    pub fn with_mode(mut self, mode: ReadMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> ReadMode {
        self.mode
    }

    pub fn source(&self) -> &'a dyn ByteSource {
        self.source
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn set_position(&mut self, pos: u64) {
        self.pos = pos;
    }

    /// Bytes left before the end of the source.
    pub fn remaining(&self) -> u64 {
        self.source.len().saturating_sub(self.pos)
    }

    pub fn prefers_large_reads(&self) -> bool {
        self.source.prefers_large_reads()
    }

    // ── Context ─────────────────────────────────────────────────────

    /// Enter a record; returns the previous context for `leave`.
    pub(crate) fn enter(&mut self, record: &'static str, revision: Revision) -> (&'static str, u32) {
        let prev = (self.record, self.revision);
        self.record = record;
        self.revision = revision.get();
        prev
    }

    pub(crate) fn leave(&mut self, prev: (&'static str, u32)) {
        self.record = prev.0;
        self.revision = prev.1;
    }

    /// `FormatUnsupported` naming the record being decoded.
    pub fn unsupported(&self, reason: impl Into<String>) -> RawError {
        RawError::unsupported(self.record, self.revision, reason)
    }

    // ── Raw bytes ───────────────────────────────────────────────────

    /// Fill `buf` from the cursor and advance by `buf.len()`.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<()> {
        let n = self.source.read_at(self.pos, buf);
        if n < buf.len() {
            match self.mode {
                ReadMode::Strict => {
                    return Err(RawError::TruncatedRecord {
                        record: self.record.to_string(),
                        offset: self.pos,
                        expected: buf.len(),
                        available: n,
                    })
                }
                ReadMode::PermitMissing => buf[n..].fill(0),
            }
        }
        self.pos += buf.len() as u64;
        Ok(())
    }

    /// `n` bytes at the cursor. Strict mode checks the length against the
    /// source before allocating.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        if self.mode == ReadMode::Strict && n as u64 > self.remaining() {
            return Err(self.truncated(n));
        }
        let mut out = vec![0u8; n];
        self.read_into(&mut out)?;
        Ok(out)
    }

    /// Borrow `n` bytes when the source is contiguous, copy otherwise.
    pub fn read_block(&mut self, n: usize) -> Result<Cow<'a, [u8]>> {
        if let Some(slice) = self.source.as_slice() {
            let start = self.pos as usize;
            if let Some(block) = start.checked_add(n).and_then(|end| slice.get(start..end)) {
                self.pos += n as u64;
                return Ok(Cow::Borrowed(block));
            }
        }
        self.read_bytes(n).map(Cow::Owned)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        let end = self.pos + n as u64;
        if self.mode == ReadMode::Strict && end > self.source.len() {
            return Err(self.truncated(n));
        }
        self.pos = end;
        Ok(())
    }

    fn truncated(&self, expected: usize) -> RawError {
        RawError::TruncatedRecord {
            record: self.record.to_string(),
            offset: self.pos,
            expected,
            available: self.remaining() as usize,
        }
    }

    // ── Scalars ─────────────────────────────────────────────────────

    read_le! {
        read_u8 => u8,
        read_i8 => i8,
        read_u16 => u16,
        read_i16 => i16,
        read_u32 => u32,
        read_i32 => i32,
        read_u64 => u64,
        read_i64 => i64,
        read_f32 => f32,
        read_f64 => f64,
    }

    // ── Strings ─────────────────────────────────────────────────────

    pub fn read_pascal_string(&mut self) -> Result<String> {
        let chars = self.read_i32()?;
        if chars < 0 {
            return Err(self.unsupported(format!("negative string length {}", chars)));
        }
        if chars > MAX_STRING_CHARS {
            return Err(self.unsupported(format!("string length {} is implausible", chars)));
        }
        let bytes = self.read_bytes(chars as usize * 2)?;
        Ok(decode_utf16le(&bytes))
    }

    /// Fixed-width UTF-16LE field, terminated by the first NUL.
    pub fn read_utf16_fixed(&mut self, byte_len: usize) -> Result<String> {
        let bytes = self.read_bytes(byte_len)?;
        Ok(decode_utf16le(&bytes))
    }

    /// Fixed-width single-byte field, terminated by the first NUL.
    pub fn read_ascii_fixed(&mut self, byte_len: usize) -> Result<String> {
        let bytes = self.read_bytes(byte_len)?;
        Ok(decode_ascii(&bytes))
    }

    // ── Arrays ──────────────────────────────────────────────────────

    /// u32 element count, rejected above `cap`.
    pub fn read_count(&mut self, cap: usize, what: &str) -> Result<usize> {
        let n = self.read_u32()? as usize;
        if n > cap {
            return Err(self.unsupported(format!("{} count {} exceeds {}", what, n, cap)));
        }
        Ok(n)
    }

    pub fn read_f64_array(&mut self) -> Result<Vec<f64>> {
        let n = self.read_count(DEFAULT_ARRAY_CAP, "f64 array")?;
        (0..n).map(|_| self.read_f64()).collect()
    }

    // ── Nested records ──────────────────────────────────────────────

    /// Decode one nested record at the cursor.
    pub fn read_record<T: VersionedRecord>(&mut self, revision: Revision) -> Result<T> {
        let prev = self.enter(T::NAME, revision);
        let result = T::decode(self, revision);
        self.leave(prev);
        result
    }

    pub fn read_records<T: VersionedRecord>(&mut self, count: usize, revision: Revision) -> Result<Vec<T>> {
        (0..count).map(|_| self.read_record(revision)).collect()
    }

    /// u32 count followed by that many records.
    pub fn read_array<T: VersionedRecord>(&mut self, revision: Revision) -> Result<Vec<T>> {
        let n = self.read_count(DEFAULT_ARRAY_CAP, T::NAME)?;
        self.read_records(n, revision)
    }
}

pub(crate) fn decode_utf16le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

pub(crate) fn decode_ascii(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
