//! Declarative field tables for fixed-layout records.
//!
//! A record is described once, as the ordered list of every field that
//! has ever appeared in it. Each field carries the revision it was
//! introduced in and, for legacy fields, the revision it was retired in.
//! Per-layout offset tables are computed from that list:
//!
//! ```text
//! field             kind   since  retired   v63  v64  v65
//! data_offset_32    u32    0      65        0    0    -
//! data_size         u32    65     -         -    -    0
//! trailer_offset    i32    0      -         4    4    4
//! ...
//! data_offset       u64    64     -         -    72   72
//! ```
//!
//! Fields absent at the active revision get an absent-rule applied after
//! decoding: explicit defaults first, then migrations from retired
//! legacy fields.

use std::fmt;

use crate::error::{RawError, Result};
use crate::generic::Value;
use crate::loader::layout::LayoutTable;
use crate::loader::revision::Revision;
use crate::view::reader::RecordReader;

// ── FieldKind ───────────────────────────────────────────────────────

/// Scalar kind (and so byte width) of one fixed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    /// Bytes that exist on disk but carry nothing we decode.
    Reserved(usize),
}

impl FieldKind {
    pub const fn size(self) -> usize {
        match self {
            FieldKind::U8 | FieldKind::I8 => 1,
            FieldKind::U16 | FieldKind::I16 => 2,
            FieldKind::U32 | FieldKind::I32 | FieldKind::F32 => 4,
            FieldKind::U64 | FieldKind::I64 | FieldKind::F64 => 8,
            FieldKind::Reserved(n) => n,
        }
    }

    /// Decode from exactly `self.size()` little-endian bytes.
    fn decode(self, b: &[u8]) -> Value {
        match self {
            FieldKind::U8 => Value::U8(b[0]),
            FieldKind::I8 => Value::I8(b[0] as i8),
            FieldKind::U16 => Value::U16(u16::from_le_bytes([b[0], b[1]])),
            FieldKind::I16 => Value::I16(i16::from_le_bytes([b[0], b[1]])),
            FieldKind::U32 => Value::U32(u32::from_le_bytes(b[..4].try_into().unwrap())),
            FieldKind::I32 => Value::I32(i32::from_le_bytes(b[..4].try_into().unwrap())),
            FieldKind::F32 => Value::F32(f32::from_le_bytes(b[..4].try_into().unwrap())),
            FieldKind::U64 => Value::U64(u64::from_le_bytes(b[..8].try_into().unwrap())),
            FieldKind::I64 => Value::I64(i64::from_le_bytes(b[..8].try_into().unwrap())),
            FieldKind::F64 => Value::F64(f64::from_le_bytes(b[..8].try_into().unwrap())),
            FieldKind::Reserved(_) => Value::Empty,
        }
    }
}

// ── FieldSpec ───────────────────────────────────────────────────────

/// What happens to a field that is not on disk at the active revision.
pub enum Absent<T> {
    /// Keep the canonical type's `Default` value.
    TypeDefault,
    /// Explicit default.
    Default(fn(&mut T)),
    /// Derive from a retired legacy field (already stored on `T`).
    Migrate { from: &'static str, apply: fn(&mut T) },
}

pub struct FieldSpec<T> {
    name: &'static str,
    kind: FieldKind,
    since: u32,
    retired: Option<u32>,
    store: Option<fn(&mut T, &Value)>,
    absent: Absent<T>,
}

impl<T> fmt::Debug for FieldSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("since", &self.since)
            .field("retired", &self.retired)
            .finish()
    }
}

impl<T> FieldSpec<T> {
    pub fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            since: 0,
            retired: None,
            store: None,
            absent: Absent::TypeDefault,
        }
    }

    pub fn reserved(len: usize) -> Self {
        Self::new("reserved", FieldKind::Reserved(len))
    }

    /// Present from `revision` on.
    pub fn since(mut self, revision: u32) -> Self {
        self.since = revision;
        self
    }

    /// Absent from `revision` on.
    pub fn retired_at(mut self, revision: u32) -> Self {
        self.retired = Some(revision);
        self
    }

    pub fn store(mut self, store: fn(&mut T, &Value)) -> Self {
        self.store = Some(store);
        self
    }

    pub fn default_with(mut self, apply: fn(&mut T)) -> Self {
        self.absent = Absent::Default(apply);
        self
    }

    pub fn migrate_from(mut self, legacy: &'static str, apply: fn(&mut T)) -> Self {
        self.absent = Absent::Migrate { from: legacy, apply };
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn is_present_at(&self, revision: u32) -> bool {
        revision >= self.since && self.retired.map_or(true, |r| revision < r)
    }
}

// ── RecordSchema ────────────────────────────────────────────────────

/// Field table plus precomputed offsets for every layout in the table.
#[derive(Debug)]
pub struct RecordSchema<T> {
    name: &'static str,
    layouts: LayoutTable,
    fields: Vec<FieldSpec<T>>,
    /// `offsets[layout][field]`: byte offset, or `None` when absent.
    offsets: Vec<Vec<Option<usize>>>,
}

impl<T: Default> RecordSchema<T> {
    pub fn new(name: &'static str, layouts: LayoutTable, fields: Vec<FieldSpec<T>>) -> Self {
        let offsets = layouts
            .entries()
            .iter()
            .map(|layout| {
                let mut at = 0usize;
                fields
                    .iter()
                    .map(|f| {
                        if f.is_present_at(layout.min_revision) {
                            let offset = at;
                            at += f.kind.size();
                            Some(offset)
                        } else {
                            None
                        }
                    })
                    .collect()
            })
            .collect();
        Self {
            name,
            layouts,
            fields,
            offsets,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn layouts(&self) -> &LayoutTable {
        &self.layouts
    }

    pub fn fields(&self) -> &[FieldSpec<T>] {
        &self.fields
    }

    /// Check that every layout's declared size equals the sum of its
    /// present fields, and that migrations name a retired field.
    pub fn validate(&self) -> Result<()> {
        for (layout, offsets) in self.layouts.entries().iter().zip(&self.offsets) {
            let total: usize = self
                .fields
                .iter()
                .zip(offsets)
                .filter(|(_, o)| o.is_some())
                .map(|(f, _)| f.kind.size())
                .sum();
            if total != layout.size {
                return Err(RawError::unsupported(
                    self.name,
                    layout.min_revision,
                    format!("fields sum to {} bytes, layout declares {}", total, layout.size),
                ));
            }
        }
        for field in &self.fields {
            if let Absent::Migrate { from, .. } = field.absent {
                let legacy = self.fields.iter().find(|f| f.name == from);
                if !legacy.is_some_and(|f| f.retired.is_some()) {
                    return Err(RawError::unsupported(
                        self.name,
                        field.since,
                        format!("{} migrates from unknown legacy field {}", field.name, from),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Byte offset of `field` at `revision`, if present.
    pub fn offset_of(&self, field: &str, revision: Revision) -> Option<usize> {
        let layout = self.layouts.select_index(revision).ok()?;
        let idx = self.fields.iter().position(|f| f.name == field)?;
        self.offsets[layout][idx]
    }

    pub fn size_at(&self, revision: Revision) -> Result<usize> {
        self.layouts.select(revision).map(|l| l.size)
    }

    /// Decode one record at the reader's cursor.
    ///
    /// The cursor ends exactly `size` bytes after where it started.
    pub fn decode(&self, reader: &mut RecordReader<'_>, revision: Revision) -> Result<T> {
        let layout_idx = self.layouts.select_index(revision)?;
        let size = self.layouts.entries()[layout_idx].size;
        let offsets = &self.offsets[layout_idx];
        let mut record = T::default();

        if reader.prefers_large_reads() {
            let block = reader.read_block(size)?;
            self.store_block(&mut record, &block, offsets);
        } else {
            let mut buf = [0u8; 8];
            for (field, offset) in self.fields.iter().zip(offsets) {
                if offset.is_none() {
                    continue;
                }
                match field.kind {
                    FieldKind::Reserved(n) => reader.skip(n)?,
                    kind => {
                        let bytes = &mut buf[..kind.size()];
                        reader.read_into(bytes)?;
                        if let Some(store) = field.store {
                            store(&mut record, &kind.decode(bytes));
                        }
                    }
                }
            }
        }

        self.apply_absent(&mut record, offsets);
        Ok(record)
    }

    /// Decode from a buffer holding exactly one record.
    pub fn decode_bytes(&self, bytes: &[u8], revision: Revision) -> Result<T> {
        let layout_idx = self.layouts.select_index(revision)?;
        let size = self.layouts.entries()[layout_idx].size;
        if bytes.len() < size {
            return Err(RawError::TruncatedRecord {
                record: self.name.to_string(),
                offset: 0,
                expected: size,
                available: bytes.len(),
            });
        }
        let offsets = &self.offsets[layout_idx];
        let mut record = T::default();
        self.store_block(&mut record, &bytes[..size], offsets);
        self.apply_absent(&mut record, offsets);
        Ok(record)
    }

    fn store_block(&self, record: &mut T, block: &[u8], offsets: &[Option<usize>]) {
        for (field, offset) in self.fields.iter().zip(offsets) {
            let (Some(at), Some(store)) = (offset, field.store) else {
                continue;
            };
            let width = field.kind.size();
            store(record, &field.kind.decode(&block[*at..*at + width]));
        }
    }

    fn apply_absent(&self, record: &mut T, offsets: &[Option<usize>]) {
        let absent = || self.fields.iter().zip(offsets).filter(|(_, o)| o.is_none());
        for (field, _) in absent() {
            if let Absent::Default(apply) = field.absent {
                apply(record);
            }
        }
        for (field, _) in absent() {
            if let Absent::Migrate { apply, .. } = field.absent {
                apply(record);
            }
        }
    }
}
