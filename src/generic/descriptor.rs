//! Runtime field descriptors for self-described records.
//!
//! On-disk descriptor block:
//!
//! ```text
//! [count: u32]
//! count x [type_tag: u32][size: i32][label: pascal string]
//! ```
//!
//! The stride of one record is the sum of every field's byte size.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{RawError, Result};
use crate::view::reader::RecordReader;

/// Maximum number of descriptors in one block.
pub const MAX_DESCRIPTORS: usize = 10_000;

/// Largest declared field size accepted (64 KiB).
pub const MAX_FIELD_SIZE: i32 = 64 * 1024;

// ── DataType ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Section separator; occupies no bytes.
    Empty,
    Char,
    TrueFalse,
    YesNo,
    OnOff,
    UChar,
    Short,
    UShort,
    Long,
    ULong,
    Float,
    Double,
    /// Single-byte text, NUL padded.
    CharString,
    /// UTF-16LE text, NUL padded.
    WideCharString,
}

impl DataType {
    pub fn from_tag(tag: u32) -> Option<Self> {
        Some(match tag {
            0 => DataType::Empty,
            1 => DataType::Char,
            2 => DataType::TrueFalse,
            3 => DataType::YesNo,
            4 => DataType::OnOff,
            5 => DataType::UChar,
            6 => DataType::Short,
            7 => DataType::UShort,
            8 => DataType::Long,
            9 => DataType::ULong,
            10 => DataType::Float,
            11 => DataType::Double,
            12 => DataType::CharString,
            13 => DataType::WideCharString,
            _ => return None,
        })
    }

    pub fn tag(self) -> u32 {
        self as u32
    }

    pub fn is_text(self) -> bool {
        matches!(self, DataType::CharString | DataType::WideCharString)
    }

    /// Bytes one field of this type occupies, given its declared size.
    pub fn byte_size(self, declared: usize) -> usize {
        match self {
            DataType::Empty => 0,
            DataType::Char
            | DataType::TrueFalse
            | DataType::YesNo
            | DataType::OnOff
            | DataType::UChar => 1,
            DataType::Short | DataType::UShort => 2,
            DataType::Long | DataType::ULong => {
                if declared == 8 {
                    8
                } else {
                    4
                }
            }
            DataType::Float => 4,
            DataType::Double => 8,
            DataType::CharString | DataType::WideCharString => declared,
        }
    }
}

// ── DataDescriptor ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataDescriptor {
    pub label: String,
    pub data_type: DataType,
    /// Declared size from the file.
    pub size: usize,
}

impl DataDescriptor {
    pub fn new(label: impl Into<String>, data_type: DataType, size: usize) -> Self {
        Self {
            label: label.into(),
            data_type,
            size,
        }
    }

    pub fn byte_size(&self) -> usize {
        self.data_type.byte_size(self.size)
    }

    /// Label with any trailing `:` and whitespace removed.
    pub fn key(&self) -> &str {
        self.label.trim_end().trim_end_matches(':').trim_end()
    }
}

// ── DataDescriptors ─────────────────────────────────────────────────

/// Ordered, immutable descriptor set. Clones share the same storage.
#[derive(Debug, Clone, PartialEq)]
pub struct DataDescriptors {
    fields: Arc<[DataDescriptor]>,
    stride: usize,
}

impl DataDescriptors {
    pub fn new(fields: Vec<DataDescriptor>) -> Self {
        let stride = fields.iter().map(DataDescriptor::byte_size).sum();
        Self {
            fields: fields.into(),
            stride,
        }
    }

    /// Read a descriptor block at the reader's cursor.
    pub fn load(reader: &mut RecordReader<'_>) -> Result<Self> {
        let count = reader.read_count(MAX_DESCRIPTORS, "descriptor")?;
        let mut fields = Vec::with_capacity(count);
        for i in 0..count {
            let tag = reader.read_u32()?;
            let size = reader.read_i32()?;
            let label = reader.read_pascal_string()?;
            let data_type = DataType::from_tag(tag).ok_or_else(|| {
                reader.unsupported(format!("descriptor {} ({}) has unknown type tag {}", i, label, tag))
            })?;
            if !(0..=MAX_FIELD_SIZE).contains(&size) {
                return Err(reader.unsupported(format!(
                    "descriptor {} ({}) has implausible size {}",
                    i, label, size
                )));
            }
            fields.push(DataDescriptor {
                label,
                data_type,
                size: size as usize,
            });
        }
        Ok(Self::new(fields))
    }

    /// Bytes per record.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&DataDescriptor> {
        self.fields.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataDescriptor> {
        self.fields.iter()
    }
}

/// Serialize a descriptor block (fixtures and round-trip tests).
pub fn encode_descriptors(fields: &[DataDescriptor]) -> Vec<u8> {
    let mut out = (fields.len() as u32).to_le_bytes().to_vec();
    for d in fields {
        out.extend_from_slice(&d.data_type.tag().to_le_bytes());
        out.extend_from_slice(&(d.size as i32).to_le_bytes());
        let units: Vec<u16> = d.label.encode_utf16().collect();
        out.extend_from_slice(&(units.len() as i32).to_le_bytes());
        for u in units {
            out.extend_from_slice(&u.to_le_bytes());
        }
    }
    out
}
