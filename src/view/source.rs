//! Byte sources backing a `RecordReader`.
//!
//! A source is a read-only, randomly addressable run of bytes. Reads past
//! the end are short, never errors: the reader decides whether a short read
//! is a truncation or a zero-filled tail.

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{RawError, Result};

// ── Trait ───────────────────────────────────────────────────────────

pub trait ByteSource: Send + Sync + fmt::Debug {
    /// Total length in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy up to `buf.len()` bytes starting at `offset`. Returns the
    /// number of bytes copied (0 at or past the end).
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> usize;

    /// True when each `read_at` call is expensive enough that callers
    /// should fetch whole records or chunks at once.
    fn prefers_large_reads(&self) -> bool {
        false
    }

    /// Contiguous backing bytes, when the source has them.
    fn as_slice(&self) -> Option<&[u8]> {
        None
    }
}

/// Copy from an in-memory slice with short-read semantics.
#[inline]
pub(crate) fn copy_at(data: &[u8], offset: u64, buf: &mut [u8]) -> usize {
    if offset >= data.len() as u64 {
        return 0;
    }
    let start = offset as usize;
    let n = buf.len().min(data.len() - start);
    buf[..n].copy_from_slice(&data[start..start + n]);
    n
}

impl ByteSource for Vec<u8> {
    fn len(&self) -> u64 {
        Vec::len(self) as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> usize {
        copy_at(self, offset, buf)
    }

    fn as_slice(&self) -> Option<&[u8]> {
        Some(self.as_slice())
    }
}

impl ByteSource for &[u8] {
    fn len(&self) -> u64 {
        <[u8]>::len(self) as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> usize {
        copy_at(self, offset, buf)
    }

    fn as_slice(&self) -> Option<&[u8]> {
        Some(*self)
    }
}

// ── MemorySource ────────────────────────────────────────────────────

/// Shared in-memory bytes. Cloning is cheap.
#[derive(Clone)]
pub struct MemorySource {
    data: Arc<[u8]>,
}

impl MemorySource {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into() }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for MemorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySource")
            .field("len", &self.data.len())
            .finish()
    }
}

impl ByteSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> usize {
        copy_at(&self.data, offset, buf)
    }

    fn as_slice(&self) -> Option<&[u8]> {
        Some(&self.data[..])
    }
}

// ── FileSource ──────────────────────────────────────────────────────

/// Positioned reads through a plain file handle.
///
/// Every `read_at` is a seek plus a read under a lock, so this source
/// asks for large reads. Length is captured at open; reopen to observe
/// growth.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    file: Mutex<File>,
    len: u64,
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            RawError::DataUnavailable(format!("cannot open {}: {}", path.display(), e))
        })?;
        let len = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> usize {
        if offset >= self.len {
            return 0;
        }
        let want = buf.len().min((self.len - offset) as usize);
        let mut file = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = file.seek(SeekFrom::Start(offset)) {
            tracing::warn!(path = %self.path.display(), offset, error = %e, "seek failed");
            return 0;
        }
        let mut filled = 0;
        while filled < want {
            match file.read(&mut buf[filled..want]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), offset, error = %e, "read failed");
                    break;
                }
            }
        }
        filled
    }

    fn prefers_large_reads(&self) -> bool {
        true
    }
}

// ── SubRange ────────────────────────────────────────────────────────

/// A window `[start, start + len)` over another source.
///
/// Disjoint sub-ranges of one source can be handed to different threads.
#[derive(Debug, Clone)]
pub struct SubRange {
    inner: Arc<dyn ByteSource>,
    start: u64,
    len: u64,
}

impl SubRange {
    /// The window is clipped to the inner source's length.
    pub fn new(inner: Arc<dyn ByteSource>, start: u64, len: u64) -> Self {
        let total = inner.len();
        let start = start.min(total);
        let len = len.min(total - start);
        Self { inner, start, len }
    }

    pub fn start(&self) -> u64 {
        self.start
    }
}

impl ByteSource for SubRange {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> usize {
        if offset >= self.len {
            return 0;
        }
        let n = buf.len().min((self.len - offset) as usize);
        self.inner.read_at(self.start + offset, &mut buf[..n])
    }

    fn prefers_large_reads(&self) -> bool {
        self.inner.prefers_large_reads()
    }

    fn as_slice(&self) -> Option<&[u8]> {
        self.inner
            .as_slice()
            .map(|s| &s[self.start as usize..(self.start + self.len) as usize])
    }
}
