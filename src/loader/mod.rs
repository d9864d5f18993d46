//! Versioned record loading.
//!
//! Every record type has one canonical in-memory shape. The bytes that
//! produce it depend on the file's `Revision`: a `LayoutTable` picks the
//! active fixed size, and a `RecordSchema` maps on-disk fields onto the
//! canonical type, filling absent fields from defaults or legacy fields.
//! Composite records read their parts with nested `read_record` calls
//! and never seek backwards.

pub mod layout;
pub mod revision;
pub mod schema;

pub use layout::{Layout, LayoutTable};
pub use revision::Revision;
pub use schema::{Absent, FieldKind, FieldSpec, RecordSchema};

use crate::error::{RawError, Result};
use crate::view::reader::{ReadMode, RecordReader};
use crate::view::source::ByteSource;

/// A decoded value and the exact number of bytes it occupied.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub value: T,
    pub bytes_consumed: u64,
}

pub trait VersionedRecord: Sized {
    /// Record name used in errors and logs.
    const NAME: &'static str;

    /// Fixed layouts, or `None` when the size is only known after
    /// decoding (composites, self-described collections).
    fn layouts() -> Option<&'static LayoutTable>;

    /// Decode at the reader's cursor, leaving it just past the record.
    fn decode(reader: &mut RecordReader<'_>, revision: Revision) -> Result<Self>;

    fn fixed_size(revision: Revision) -> Result<Option<usize>> {
        match Self::layouts() {
            Some(table) => Ok(Some(table.select(revision)?.size)),
            None => Ok(None),
        }
    }

    /// Decode one record at `offset`.
    fn load(source: &dyn ByteSource, offset: u64, revision: Revision, mode: ReadMode) -> Result<Loaded<Self>> {
        if source.is_empty() {
            return Err(RawError::DataUnavailable(format!("no bytes for {}", Self::NAME)));
        }
        let mut reader = RecordReader::at_offset(source, offset).with_mode(mode);
        let value = reader.read_record::<Self>(revision)?;
        Ok(Loaded {
            value,
            bytes_consumed: reader.position() - offset,
        })
    }
}

/// Read `count` records laid out at a fixed `stride` starting at the
/// reader's cursor.
///
/// A record that fails with `FormatUnsupported` is skipped (logged,
/// `None` in its slot) and decoding resumes at the next stride. Any other
/// error stops the load. The cursor ends after the last slot.
pub fn load_sized_array<T: VersionedRecord>(
    reader: &mut RecordReader<'_>,
    count: usize,
    stride: usize,
    revision: Revision,
) -> Result<Vec<Option<T>>> {
    let base = reader.position();
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let start = base + (i * stride) as u64;
        reader.set_position(start);
        match reader.read_record::<T>(revision) {
            Ok(value) => out.push(Some(value)),
            Err(e @ RawError::FormatUnsupported { .. }) => {
                tracing::warn!(record = T::NAME, slot = i, error = %e, "skipping unsupported record");
                out.push(None);
            }
            Err(e) => return Err(e),
        }
    }
    reader.set_position(base + (count * stride) as u64);
    Ok(out)
}
