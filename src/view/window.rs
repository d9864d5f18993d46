//! Buffered window for sequential access over an expensive source.

use crate::view::source::ByteSource;

/// Default refill size (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Holds one chunk of a source in memory and refills it when a request
/// falls outside. Requests larger than the chunk size get a buffer of
/// their own size.
#[derive(Debug)]
pub struct ChunkWindow<'a> {
    source: &'a dyn ByteSource,
    chunk_size: usize,
    start: u64,
    buf: Vec<u8>,
    refills: usize,
}

impl<'a> ChunkWindow<'a> {
    pub fn new(source: &'a dyn ByteSource) -> Self {
        Self::with_chunk_size(source, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(source: &'a dyn ByteSource, chunk_size: usize) -> Self {
        Self {
            source,
            chunk_size: chunk_size.max(1),
            start: 0,
            buf: Vec::new(),
            refills: 0,
        }
    }

    /// Bytes `[offset, offset + len)`. The returned slice is shorter than
    /// `len` only when the source ends first.
    pub fn slice(&mut self, offset: u64, len: usize) -> &[u8] {
        let end = offset + len as u64;
        let held_end = self.start + self.buf.len() as u64;
        if offset < self.start || end > held_end {
            self.refill(offset, len);
        }
        let from = (offset - self.start) as usize;
        let to = (from + len).min(self.buf.len());
        &self.buf[from.min(to)..to]
    }

    /// Number of times the window has been refilled from the source.
    pub fn refills(&self) -> usize {
        self.refills
    }

    fn refill(&mut self, offset: u64, len: usize) {
        let want = self.chunk_size.max(len);
        self.buf.resize(want, 0);
        let n = self.source.read_at(offset, &mut self.buf);
        self.buf.truncate(n);
        self.start = offset;
        self.refills += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::source::MemorySource;

    #[test]
    fn test_refills_only_when_leaving_window() {
        let src = MemorySource::new((0u8..100).collect::<Vec<_>>());
        let mut w = ChunkWindow::with_chunk_size(&src, 16);
        assert_eq!(w.slice(0, 4), &[0, 1, 2, 3]);
        assert_eq!(w.slice(12, 4), &[12, 13, 14, 15]);
        assert_eq!(w.refills(), 1);
        assert_eq!(w.slice(14, 4), &[14, 15, 16, 17]);
        assert_eq!(w.refills(), 2);
    }

    #[test]
    fn test_oversized_request_and_source_end() {
        let src = MemorySource::new((0u8..10).collect::<Vec<_>>());
        let mut w = ChunkWindow::with_chunk_size(&src, 4);
        assert_eq!(w.slice(0, 8).len(), 8);
        assert_eq!(w.slice(8, 4), &[8, 9]);
        assert!(w.slice(20, 4).is_empty());
    }
}
