//! File-extension → source factory table.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{RawError, Result};
use crate::view::manager::ViewManager;
use crate::view::mapped::MappedView;
use crate::view::source::{ByteSource, FileSource};

/// Opens a byte source for a path.
pub type SourceFactory = fn(&Path) -> Result<Arc<dyn ByteSource>>;

pub(crate) fn mapped_factory(path: &Path) -> Result<Arc<dyn ByteSource>> {
    Ok(Arc::new(MappedView::open(path)?))
}

fn file_factory(path: &Path) -> Result<Arc<dyn ByteSource>> {
    Ok(Arc::new(FileSource::open(path)?))
}

/// Explicit table of known file kinds.
///
/// Built by the caller and passed where needed; there is no global
/// registration. Extensions are matched case-insensitively.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    factories: HashMap<String, SourceFactory>,
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut exts: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        exts.sort_unstable();
        f.debug_struct("SourceRegistry").field("extensions", &exts).finish()
    }
}

impl SourceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// `raw` → memory-mapped view.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("raw", mapped_factory);
        registry
    }

    /// Factory that reads through a plain file handle instead of a map.
    pub fn file_factory() -> SourceFactory {
        file_factory
    }

    pub fn register(&mut self, extension: &str, factory: SourceFactory) {
        self.factories.insert(extension.to_ascii_lowercase(), factory);
    }

    pub fn factory_for(&self, path: &Path) -> Result<SourceFactory> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        self.factories.get(&ext).copied().ok_or_else(|| {
            RawError::unsupported("file", 0, format!("no source registered for extension '{}'", ext))
        })
    }

    pub fn open(&self, path: &Path) -> Result<Arc<dyn ByteSource>> {
        (self.factory_for(path)?)(path)
    }

    /// A view manager using the registered factory for `path`.
    pub fn manager(&self, path: &Path) -> Result<ViewManager> {
        Ok(ViewManager::with_factory(path, self.factory_for(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_dispatch_by_extension() {
        let dir = TempDir::new().unwrap();
        let raw = dir.path().join("run.RAW");
        let dat = dir.path().join("run.dat");
        std::fs::write(&raw, [1u8, 2]).unwrap();
        std::fs::write(&dat, [3u8, 4, 5]).unwrap();

        let mut registry = SourceRegistry::with_defaults();
        registry.register("dat", SourceRegistry::file_factory());

        let src = registry.open(&raw).unwrap();
        assert_eq!(src.len(), 2);
        assert!(src.as_slice().is_some());

        let src = registry.open(&dat).unwrap();
        assert_eq!(src.len(), 3);
        assert!(src.as_slice().is_none());

        let err = registry.open(&dir.path().join("x.mzml")).unwrap_err();
        assert_eq!(err.code(), "FORMAT_UNSUPPORTED");
    }
}
