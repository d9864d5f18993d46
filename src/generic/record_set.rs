//! Self-described collections: descriptors, a count, then blobs.
//!
//! ```text
//! [DataDescriptors][count: u32][count x blob(stride)]
//! ```

use std::sync::Arc;

use crate::error::{RawError, Result};
use crate::generic::decoder::GenericDecoder;
use crate::generic::descriptor::DataDescriptors;
use crate::generic::value::Value;
use crate::loader::{LayoutTable, Revision, VersionedRecord};
use crate::parallel::{ParallelRunner, SmallTask};
use crate::view::reader::{ReadMode, RecordReader};

/// Upper bound on blobs in one collection.
pub const MAX_RECORDS: usize = 10_000_000;

/// A captured self-described collection.
///
/// The blob bytes are copied out of the source once; individual blobs
/// are decoded on demand.
#[derive(Debug, Clone)]
pub struct GenericRecordSet {
    decoder: GenericDecoder,
    count: usize,
    bytes: Arc<[u8]>,
}

impl GenericRecordSet {
    pub fn new(decoder: GenericDecoder, count: usize, bytes: Arc<[u8]>) -> Result<Self> {
        let needed = count.checked_mul(decoder.stride()).unwrap_or(usize::MAX);
        if bytes.len() < needed {
            return Err(RawError::TruncatedRecord {
                record: Self::NAME.to_string(),
                offset: 0,
                expected: needed,
                available: bytes.len(),
            });
        }
        Ok(Self {
            decoder,
            count,
            bytes,
        })
    }

    pub fn decoder(&self) -> &GenericDecoder {
        &self.decoder
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Raw bytes of blob `index`.
    pub fn blob(&self, index: usize) -> Result<&[u8]> {
        if index >= self.count {
            return Err(RawError::InconsistentIndex {
                what: Self::NAME,
                index,
                len: self.count,
            });
        }
        let stride = self.decoder.stride();
        Ok(&self.bytes[index * stride..(index + 1) * stride])
    }

    /// Positional values of blob `index`.
    pub fn values(&self, index: usize) -> Result<Vec<Value>> {
        self.decoder.decode_values(self.blob(index)?)
    }

    pub fn decode_all(&self, index: usize) -> Result<Vec<(String, Value)>> {
        self.decoder.decode_all(self.blob(index)?)
    }

    /// One labelled field of blob `index`.
    pub fn get(&self, index: usize, label: &str) -> Result<Option<Value>> {
        self.decoder.get(self.blob(index)?, label)
    }

    /// Decode every blob through the task runner.
    pub fn decode_parallel(&self, runner: &ParallelRunner) -> Result<Vec<Vec<Value>>> {
        let mut tasks: Vec<DecodeTask<'_>> = (0..self.count)
            .map(|index| DecodeTask {
                set: self,
                index,
                out: Vec::new(),
            })
            .collect();
        runner.run(&mut tasks)?;
        Ok(tasks.into_iter().map(|t| t.out).collect())
    }
}

struct DecodeTask<'a> {
    set: &'a GenericRecordSet,
    index: usize,
    out: Vec<Value>,
}

impl SmallTask for DecodeTask<'_> {
    fn execute(&mut self) -> Result<()> {
        self.out = self.set.values(self.index)?;
        Ok(())
    }
}

impl VersionedRecord for GenericRecordSet {
    const NAME: &'static str = "GenericRecordSet";

    /// Stride comes from the descriptors in the file.
    fn layouts() -> Option<&'static LayoutTable> {
        None
    }

    fn decode(reader: &mut RecordReader<'_>, _revision: Revision) -> Result<Self> {
        let descriptors = DataDescriptors::load(reader)?;
        let count = reader.read_count(MAX_RECORDS, "record")?;
        let decoder = GenericDecoder::new(descriptors);
        let stride = decoder.stride();
        let mut count = count;
        if reader.mode() == ReadMode::PermitMissing && stride > 0 {
            let available = usize::try_from(reader.remaining() / stride as u64).unwrap_or(usize::MAX);
            if available < count {
                tracing::warn!(count, available, "record set truncated, keeping complete blobs");
                count = available;
            }
        }
        let len = count
            .checked_mul(stride)
            .ok_or_else(|| reader.unsupported(format!("record count {} overflows", count)))?;
        let bytes = reader.read_block(len)?;
        Self::new(decoder, count, Arc::from(&*bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generic::descriptor::{encode_descriptors, DataDescriptor, DataType};

    fn collection(values: &[(i32, f64)]) -> Vec<u8> {
        let mut bytes = encode_descriptors(&[
            DataDescriptor::new("a", DataType::Long, 4),
            DataDescriptor::new("b", DataType::Double, 8),
        ]);
        bytes.extend_from_slice(&(values.len() as u32).to_le_bytes());
        for (a, b) in values {
            bytes.extend_from_slice(&a.to_le_bytes());
            bytes.extend_from_slice(&b.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn test_load_positional_access() {
        let bytes = collection(&[(1, 0.5), (2, 1.5), (3, 2.5)]);
        let loaded = GenericRecordSet::load(&bytes, 0, Revision::NEWEST, ReadMode::Strict).unwrap();
        assert_eq!(loaded.bytes_consumed, bytes.len() as u64);

        let set = loaded.value;
        assert_eq!(set.len(), 3);
        assert_eq!(set.values(1).unwrap(), vec![Value::I32(2), Value::F64(1.5)]);
        assert_eq!(set.get(2, "B").unwrap(), Some(Value::F64(2.5)));
        assert_eq!(GenericRecordSet::fixed_size(Revision::NEWEST).unwrap(), None);

        let err = set.values(3).unwrap_err();
        assert_eq!(err.code(), "INCONSISTENT_INDEX");
    }

    #[test]
    fn test_parallel_decode_matches_sequential() {
        let values: Vec<(i32, f64)> = (0..64).map(|i| (i, i as f64 * 0.25)).collect();
        let bytes = collection(&values);
        let set = GenericRecordSet::load(&bytes, 0, Revision::NEWEST, ReadMode::Strict)
            .unwrap()
            .value;

        let parallel = set.decode_parallel(&ParallelRunner::new().with_max_workers(4)).unwrap();
        let sequential: Vec<Vec<Value>> = (0..set.len()).map(|i| set.values(i).unwrap()).collect();
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_truncated_collection() {
        let mut bytes = collection(&[(1, 0.5), (2, 1.5)]);
        bytes.truncate(bytes.len() - 3);
        let err = GenericRecordSet::load(&bytes, 0, Revision::NEWEST, ReadMode::Strict).unwrap_err();
        assert_eq!(err.code(), "TRUNCATED_RECORD");
    }

    fn wide_header(count: u32) -> Vec<u8> {
        let mut bytes = encode_descriptors(&[DataDescriptor::new("text", DataType::CharString, 65536)]);
        bytes.extend_from_slice(&count.to_le_bytes());
        bytes
    }

    #[test]
    fn test_corrupt_count_is_rejected_without_allocating() {
        let mut bytes = wide_header(i32::MAX as u32);
        bytes.extend_from_slice(&[0u8; 64]);
        let err = GenericRecordSet::load(&bytes, 0, Revision::NEWEST, ReadMode::Strict).unwrap_err();
        assert_eq!(err.code(), "FORMAT_UNSUPPORTED");

        let mut bytes = wide_header(5_000_000);
        bytes.extend_from_slice(&[0u8; 64]);
        let err = GenericRecordSet::load(&bytes, 0, Revision::NEWEST, ReadMode::Strict).unwrap_err();
        assert_eq!(err.code(), "TRUNCATED_RECORD");
    }

    #[test]
    fn test_permissive_count_keeps_complete_blobs() {
        let mut bytes = wide_header(5_000_000);
        bytes.extend_from_slice(&vec![b'x'; 65536 * 2 + 10]);
        let set = GenericRecordSet::load(&bytes, 0, Revision::NEWEST, ReadMode::PermitMissing)
            .unwrap()
            .value;
        assert_eq!(set.len(), 2);
    }
}
