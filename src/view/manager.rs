//! Owns the current view of one file and remaps it when the file grows.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::LoaderConfig;
use crate::error::{RawError, Result};
use crate::view::reader::ReadMode;
use crate::view::registry::{mapped_factory, SourceFactory};
use crate::view::source::{ByteSource, SubRange};

/// View lifecycle for one file.
///
/// `acquire` maps lazily and caches. `reacquire` remaps only if the file
/// on disk is now longer than the cached view. Dropping the manager (or
/// calling `release`) drops the cached view; readers still holding an
/// `Arc` keep their own mapping alive until they finish.
pub struct ViewManager {
    path: PathBuf,
    factory: SourceFactory,
    current: Mutex<Option<Arc<dyn ByteSource>>>,
    live: AtomicBool,
    closed_mode: ReadMode,
    mode_override: Option<ReadMode>,
}

impl std::fmt::Debug for ViewManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewManager")
            .field("path", &self.path)
            .field("live", &self.is_live())
            .field("acquired", &self.is_acquired())
            .finish()
    }
}

impl ViewManager {
    /// Manager backed by a memory-mapped view.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_factory(path, mapped_factory)
    }

    pub fn with_factory(path: impl Into<PathBuf>, factory: SourceFactory) -> Self {
        Self {
            path: path.into(),
            factory,
            current: Mutex::new(None),
            live: AtomicBool::new(false),
            closed_mode: ReadMode::Strict,
            mode_override: None,
        }
    }

    /// Mapped manager whose closed-file read mode comes from `config`.
    pub fn from_config(path: impl Into<PathBuf>, config: &LoaderConfig) -> Self {
        let mut views = Self::new(path);
        views.closed_mode = config.read_mode;
        views
    }

    /// Force a read mode regardless of the live flag.
    pub fn with_read_mode(mut self, mode: ReadMode) -> Self {
        self.mode_override = Some(mode);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mark the file as still being acquired.
    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::Release);
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Zero-fill for live files, the configured mode (strict by default)
    /// for closed ones, unless overridden.
    pub fn read_mode(&self) -> ReadMode {
        match self.mode_override {
            Some(mode) => mode,
            None if self.is_live() => ReadMode::PermitMissing,
            None => self.closed_mode,
        }
    }

    /// The file no longer exists on disk.
    pub fn is_gone(&self) -> bool {
        !self.path.exists()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<dyn ByteSource>>> {
        match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Current view, opening it on first use.
    pub fn acquire(&self) -> Result<Arc<dyn ByteSource>> {
        let mut slot = self.slot();
        if let Some(view) = slot.as_ref() {
            return Ok(Arc::clone(view));
        }
        let view = (self.factory)(&self.path)?;
        *slot = Some(Arc::clone(&view));
        Ok(view)
    }

    /// Remap if the file on disk has grown past the cached view.
    pub fn reacquire(&self) -> Result<Arc<dyn ByteSource>> {
        let on_disk = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                return Err(RawError::DataUnavailable(format!(
                    "cannot stat {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };
        let mut slot = self.slot();
        if let Some(view) = slot.as_ref() {
            if view.len() >= on_disk {
                return Ok(Arc::clone(view));
            }
            tracing::debug!(
                path = %self.path.display(),
                old_len = view.len(),
                new_len = on_disk,
                "file grew, remapping"
            );
        }
        let view = (self.factory)(&self.path)?;
        *slot = Some(Arc::clone(&view));
        Ok(view)
    }

    /// A window over the current view for one worker.
    pub fn sub_range(&self, start: u64, len: u64) -> Result<SubRange> {
        Ok(SubRange::new(self.acquire()?, start, len))
    }

    /// Drop the cached view.
    pub fn release(&self) {
        self.slot().take();
    }

    pub fn is_acquired(&self) -> bool {
        self.slot().is_some()
    }
}
