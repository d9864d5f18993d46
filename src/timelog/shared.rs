//! Thread-shared wrapper around [`TimedLog`].

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::Result;
use crate::timelog::store::{TimedEntry, TimedLog};
use crate::view::manager::ViewManager;

/// A [`TimedLog`] readable from many threads while one of them refreshes.
///
/// Lookups return owned entries so no lock is held by the caller.
#[derive(Debug, Clone)]
pub struct SharedTimedLog {
    inner: Arc<RwLock<TimedLog>>,
}

impl SharedTimedLog {
    pub fn new(log: TimedLog) -> Self {
        Self {
            inner: Arc::new(RwLock::new(log)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, TimedLog> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, TimedLog> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn nearest(&self, time: f64) -> Option<TimedEntry> {
        self.read().nearest(time).cloned()
    }

    pub fn by_raw_index(&self, index: usize) -> Result<TimedEntry> {
        self.read().by_raw_index(index).cloned()
    }

    /// Run `f` against the log under the read lock.
    pub fn with<R>(&self, f: impl FnOnce(&TimedLog) -> R) -> R {
        f(&self.read())
    }

    pub fn refresh(&self, views: &ViewManager) -> bool {
        self.write().refresh(views)
    }
}
