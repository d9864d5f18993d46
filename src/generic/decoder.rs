//! Decoder for blobs described by a `DataDescriptors` set.

use std::sync::Arc;

use crate::config::LoaderConfig;
use crate::error::{RawError, Result};
use crate::generic::descriptor::{DataDescriptors, DataType};
use crate::generic::value::Value;
use crate::view::reader::{decode_ascii, decode_utf16le, ReadMode, RecordReader};
use crate::view::source::ByteSource;
use crate::view::window::{ChunkWindow, DEFAULT_CHUNK_SIZE};

/// Decode one field from exactly `data_type.byte_size(declared)` bytes.
pub fn decode_field(data_type: DataType, bytes: &[u8]) -> Value {
    match data_type {
        DataType::Empty => Value::Empty,
        DataType::Char => Value::I8(bytes[0] as i8),
        DataType::TrueFalse | DataType::YesNo | DataType::OnOff => Value::Bool(bytes[0] != 0),
        DataType::UChar => Value::U8(bytes[0]),
        DataType::Short => Value::I16(i16::from_le_bytes([bytes[0], bytes[1]])),
        DataType::UShort => Value::U16(u16::from_le_bytes([bytes[0], bytes[1]])),
        DataType::Long if bytes.len() == 8 => Value::I64(i64::from_le_bytes(bytes.try_into().unwrap())),
        DataType::Long => Value::I32(i32::from_le_bytes(bytes[..4].try_into().unwrap())),
        DataType::ULong if bytes.len() == 8 => Value::U64(u64::from_le_bytes(bytes.try_into().unwrap())),
        DataType::ULong => Value::U32(u32::from_le_bytes(bytes[..4].try_into().unwrap())),
        DataType::Float => Value::F32(f32::from_le_bytes(bytes[..4].try_into().unwrap())),
        DataType::Double => Value::F64(f64::from_le_bytes(bytes[..8].try_into().unwrap())),
        DataType::CharString => Value::Text(decode_ascii(bytes)),
        DataType::WideCharString => Value::Text(decode_utf16le(bytes)),
    }
}

/// Descriptors plus precomputed per-field byte offsets.
///
/// Blobs are decoded on demand and never cached here.
#[derive(Debug, Clone)]
pub struct GenericDecoder {
    descriptors: DataDescriptors,
    offsets: Arc<[usize]>,
    chunk_size: usize,
}

impl GenericDecoder {
    pub fn new(descriptors: DataDescriptors) -> Self {
        let mut at = 0;
        let offsets: Vec<usize> = descriptors
            .iter()
            .map(|d| {
                let offset = at;
                at += d.byte_size();
                offset
            })
            .collect();
        Self {
            descriptors,
            offsets: offsets.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Decoder using the configured chunk window size.
    pub fn from_config(descriptors: DataDescriptors, config: &LoaderConfig) -> Self {
        Self::new(descriptors).with_chunk_size(config.chunk_size)
    }

    /// Window size used by `decode_range` on expensive sources.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn descriptors(&self) -> &DataDescriptors {
        &self.descriptors
    }

    pub fn stride(&self) -> usize {
        self.descriptors.stride()
    }

    pub fn field_count(&self) -> usize {
        self.descriptors.len()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.label.as_str()).collect()
    }

    /// Position of the field whose label matches, ignoring case and any
    /// trailing `:`.
    pub fn find_field(&self, label: &str) -> Option<usize> {
        let wanted = label.trim_end().trim_end_matches(':').trim_end();
        self.descriptors
            .iter()
            .position(|d| d.key().eq_ignore_ascii_case(wanted))
    }

    fn field_range(&self, index: usize) -> Result<(DataType, usize, usize)> {
        let desc = self.descriptors.get(index).ok_or(RawError::InconsistentIndex {
            what: "descriptor",
            index,
            len: self.descriptors.len(),
        })?;
        Ok((desc.data_type, self.offsets[index], desc.byte_size()))
    }

    fn check_blob(&self, blob: &[u8]) -> Result<()> {
        if blob.len() < self.stride() {
            return Err(RawError::TruncatedRecord {
                record: "generic blob".to_string(),
                offset: 0,
                expected: self.stride(),
                available: blob.len(),
            });
        }
        Ok(())
    }

    /// Field `index` of a captured blob.
    pub fn decode(&self, blob: &[u8], index: usize) -> Result<Value> {
        let (data_type, offset, width) = self.field_range(index)?;
        self.check_blob(blob)?;
        Ok(decode_field(data_type, &blob[offset..offset + width]))
    }

    /// Field `index` of the blob at `blob_base`, reading only that field.
    pub fn decode_at(&self, source: &dyn ByteSource, blob_base: u64, index: usize) -> Result<Value> {
        let (data_type, offset, width) = self.field_range(index)?;
        let mut reader = RecordReader::at_offset(source, blob_base + offset as u64);
        let bytes = reader.read_block(width)?;
        Ok(decode_field(data_type, &bytes))
    }

    /// Field by label; `Ok(None)` when no descriptor carries it.
    pub fn get(&self, blob: &[u8], label: &str) -> Result<Option<Value>> {
        match self.find_field(label) {
            Some(index) => self.decode(blob, index).map(Some),
            None => Ok(None),
        }
    }

    /// Every field of a blob, positionally.
    pub fn decode_values(&self, blob: &[u8]) -> Result<Vec<Value>> {
        self.check_blob(blob)?;
        Ok(self
            .descriptors
            .iter()
            .zip(self.offsets.iter())
            .map(|(d, &offset)| decode_field(d.data_type, &blob[offset..offset + d.byte_size()]))
            .collect())
    }

    /// Every field of a blob with its label.
    pub fn decode_all(&self, blob: &[u8]) -> Result<Vec<(String, Value)>> {
        let values = self.decode_values(blob)?;
        Ok(self
            .descriptors
            .iter()
            .map(|d| d.label.clone())
            .zip(values)
            .collect())
    }

    /// Decode `count` consecutive blobs at the reader's cursor.
    ///
    /// Sources that prefer large reads are walked through a `ChunkWindow`;
    /// others are read one blob at a time. Both give the same values.
    pub fn decode_range(&self, reader: &mut RecordReader<'_>, count: usize) -> Result<Vec<Vec<Value>>> {
        let stride = self.stride();
        let mut out = Vec::with_capacity(count);
        if !reader.prefers_large_reads() {
            for _ in 0..count {
                let blob = reader.read_block(stride)?;
                out.push(self.decode_values(&blob)?);
            }
            return Ok(out);
        }

        let mut window = ChunkWindow::with_chunk_size(reader.source(), self.chunk_size);
        let mut padded = Vec::new();
        for _ in 0..count {
            let at = reader.position();
            let bytes = window.slice(at, stride);
            let blob = if bytes.len() == stride {
                bytes
            } else if reader.mode() == ReadMode::PermitMissing {
                padded.clear();
                padded.extend_from_slice(bytes);
                padded.resize(stride, 0);
                &padded[..]
            } else {
                return Err(RawError::TruncatedRecord {
                    record: "generic blob".to_string(),
                    offset: at,
                    expected: stride,
                    available: bytes.len(),
                });
            };
            out.push(self.decode_values(blob)?);
            reader.set_position(at + stride as u64);
        }
        tracing::debug!(count, stride, refills = window.refills(), "decoded blob range");
        Ok(out)
    }
}
