//! Read-only memory-mapped file view.

use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::error::{RawError, Result};
use crate::view::source::{copy_at, ByteSource};

/// A read-only mapping of a whole file.
///
/// The mapping is released when the view is dropped. Missing and empty
/// files are reported as `DataUnavailable` so live callers can retry.
#[derive(Debug)]
pub struct MappedView {
    path: PathBuf,
    mmap: Mmap,
}

impl MappedView {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            RawError::DataUnavailable(format!("cannot open {}: {}", path.display(), e))
        })?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Err(RawError::DataUnavailable(format!(
                "{} is empty",
                path.display()
            )));
        }
        // SAFETY: read-only map. Writers only ever append to the file, so
        // the mapped prefix is not modified underneath us.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| {
            RawError::DataUnavailable(format!("failed to map {}: {}", path.display(), e))
        })?;
        tracing::debug!(path = %path.display(), len, "mapped view");
        Ok(Self {
            path: path.to_path_buf(),
            mmap,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for MappedView {
    fn len(&self) -> u64 {
        self.mmap.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> usize {
        copy_at(&self.mmap, offset, buf)
    }

    fn prefers_large_reads(&self) -> bool {
        true
    }

    fn as_slice(&self) -> Option<&[u8]> {
        Some(&self.mmap[..])
    }
}
