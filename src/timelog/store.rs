//! Retention-time indexed log (status log, trailer-like blocks).
//!
//! ```text
//! [DataDescriptors]
//! [entry_count: i32]
//! entry_count x [retention_time: f32][blob: stride bytes]
//! ```

use std::sync::Arc;

use crate::config::LoaderConfig;
use crate::error::{RawError, Result};
use crate::generic::{DataDescriptors, GenericDecoder, Value};
use crate::timelog::index::SortedTimeIndex;
use crate::view::manager::ViewManager;
use crate::view::reader::{ReadMode, RecordReader};
use crate::view::source::ByteSource;

/// A raw log entry: its time and the captured blob.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedEntry {
    pub retention_time: f64,
    pub blob: Arc<[u8]>,
}

#[derive(Debug, Clone)]
pub struct TimedLog {
    decoder: GenericDecoder,
    raw: Vec<TimedEntry>,
    index: SortedTimeIndex,
    count_offset: u64,
    entries_offset: u64,
}

impl TimedLog {
    /// Load the block at `offset`.
    ///
    /// In `PermitMissing` mode only entries fully present in the source
    /// are loaded; the rest arrive through `refresh`.
    pub fn load(source: &dyn ByteSource, offset: u64, mode: ReadMode, tolerance: f64) -> Result<Self> {
        Self::load_parts(source, offset, mode, tolerance, GenericDecoder::new)
    }

    /// Load with the read mode, time tolerance and chunk size from `config`.
    pub fn load_with_config(source: &dyn ByteSource, offset: u64, config: &LoaderConfig) -> Result<Self> {
        Self::load_parts(source, offset, config.read_mode, config.time_tolerance, |d| {
            GenericDecoder::from_config(d, config)
        })
    }

    /// Load from the manager's current view in the manager's read mode.
    pub fn open(views: &ViewManager, offset: u64, config: &LoaderConfig) -> Result<Self> {
        let source = views.acquire()?;
        Self::load_parts(&*source, offset, views.read_mode(), config.time_tolerance, |d| {
            GenericDecoder::from_config(d, config)
        })
    }

    fn load_parts(
        source: &dyn ByteSource,
        offset: u64,
        mode: ReadMode,
        tolerance: f64,
        decoder: impl FnOnce(DataDescriptors) -> GenericDecoder,
    ) -> Result<Self> {
        if source.is_empty() {
            return Err(RawError::DataUnavailable("time log source is empty".into()));
        }
        let mut reader = RecordReader::at_offset(source, offset).with_mode(mode);
        let descriptors = DataDescriptors::load(&mut reader)?;
        let count_offset = reader.position();
        let count = read_count(&mut reader)?;
        let entries_offset = reader.position();

        let mut log = Self {
            decoder: decoder(descriptors),
            raw: Vec::new(),
            index: SortedTimeIndex::new(tolerance),
            count_offset,
            entries_offset,
        };
        let count = log.loadable(source, count, mode);
        log.append(&mut reader, count)?;
        tracing::debug!(entries = log.raw.len(), indexed = log.index.len(), "loaded time log");
        Ok(log)
    }

    /// Bytes per on-disk entry.
    fn entry_size(&self) -> usize {
        4 + self.decoder.stride()
    }

    /// Entries from the current raw count up to `count` that can be read.
    fn loadable(&self, source: &dyn ByteSource, count: usize, mode: ReadMode) -> usize {
        if mode == ReadMode::Strict {
            return count;
        }
        let start = self.entries_offset + (self.raw.len() * self.entry_size()) as u64;
        let available = source.len().saturating_sub(start) as usize / self.entry_size();
        count.min(self.raw.len() + available)
    }

    /// Read entries `raw.len()..count` at the reader's cursor.
    fn append(&mut self, reader: &mut RecordReader<'_>, count: usize) -> Result<usize> {
        let first = self.raw.len();
        if count <= first {
            return Ok(0);
        }
        let entry_size = self.entry_size();
        let stride = self.decoder.stride();
        let len = (count - first)
            .checked_mul(entry_size)
            .ok_or_else(|| reader.unsupported(format!("entry count {} overflows", count)))?;
        let block = reader.read_block(len)?;
        let mut added = Vec::with_capacity(count - first);
        for chunk in block.chunks_exact(entry_size) {
            let time = f32::from_le_bytes(chunk[..4].try_into().unwrap()) as f64;
            added.push(TimedEntry {
                retention_time: time,
                blob: Arc::from(&chunk[4..4 + stride]),
            });
        }
        self.index.extend(
            added
                .iter()
                .enumerate()
                .map(|(i, e)| (first + i, e.retention_time)),
        );
        let n = added.len();
        self.raw.extend(added);
        Ok(n)
    }

    pub fn decoder(&self) -> &GenericDecoder {
        &self.decoder
    }

    /// Raw entry count (file order, duplicates included).
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Distinct times in the sorted index.
    pub fn index_len(&self) -> usize {
        self.index.len()
    }

    pub fn index(&self) -> &SortedTimeIndex {
        &self.index
    }

    /// Entry closest in time; `None` when nothing is indexed.
    pub fn nearest(&self, time: f64) -> Option<&TimedEntry> {
        self.index.nearest(time).map(|i| &self.raw[i])
    }

    /// Entry at file position `index`. Never clamped.
    pub fn by_raw_index(&self, index: usize) -> Result<&TimedEntry> {
        self.raw.get(index).ok_or(RawError::InconsistentIndex {
            what: "time log",
            index,
            len: self.raw.len(),
        })
    }

    /// Indexed entries in ascending time.
    pub fn sorted(&self) -> impl Iterator<Item = &TimedEntry> + '_ {
        self.index.entries().iter().map(|e| &self.raw[e.raw_index])
    }

    /// Labelled values of one entry.
    pub fn decode(&self, entry: &TimedEntry) -> Result<Vec<(String, Value)>> {
        self.decoder.decode_all(&entry.blob)
    }

    /// One labelled field of one entry.
    pub fn field(&self, entry: &TimedEntry, label: &str) -> Result<Option<Value>> {
        self.decoder.get(&entry.blob, label)
    }

    pub fn clear(&mut self) {
        self.raw.clear();
        self.index.clear();
    }

    /// Pick up entries appended since the last load.
    ///
    /// Returns true when new entries were added. On failure the last good
    /// state is kept, unless the file has disappeared, in which case the
    /// log is cleared.
    pub fn refresh(&mut self, views: &ViewManager) -> bool {
        match self.try_refresh(views) {
            Ok(added) => added > 0,
            Err(e) => {
                if matches!(e, RawError::DataUnavailable(_)) && views.is_gone() {
                    tracing::warn!(path = %views.path().display(), "file gone, clearing time log");
                    self.clear();
                } else {
                    tracing::warn!(error = %e, "time log refresh failed, keeping previous entries");
                }
                false
            }
        }
    }

    fn try_refresh(&mut self, views: &ViewManager) -> Result<usize> {
        let source = views.reacquire()?;
        let mode = views.read_mode();
        let mut reader = RecordReader::at_offset(&*source, self.count_offset).with_mode(mode);
        let count = read_count(&mut reader)?;
        let count = self.loadable(&*source, count, mode);
        if count <= self.raw.len() {
            return Ok(0);
        }
        reader.set_position(self.entries_offset + (self.raw.len() * self.entry_size()) as u64);
        let added = self.append(&mut reader, count)?;
        tracing::debug!(added, total = self.raw.len(), "time log refreshed");
        Ok(added)
    }
}

fn read_count(reader: &mut RecordReader<'_>) -> Result<usize> {
    let count = reader.read_i32()?;
    if count < 0 {
        return Err(reader.unsupported(format!("negative entry count {}", count)));
    }
    Ok(count as usize)
}

/// Serialize a time-log block (fixtures and benches).
pub fn encode_time_log(descriptors: &[crate::generic::DataDescriptor], entries: &[(f32, Vec<u8>)]) -> Vec<u8> {
    let mut out = crate::generic::encode_descriptors(descriptors);
    out.extend_from_slice(&(entries.len() as i32).to_le_bytes());
    for (time, blob) in entries {
        out.extend_from_slice(&time.to_le_bytes());
        out.extend_from_slice(blob);
    }
    out
}
