//! Loader configuration, persisted as `rawcore.json` next to the data.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_CAPACITY;
use crate::error::Result;
use crate::parallel::DEFAULT_MAX_WORKERS;
use crate::resource::TuningProfile;
use crate::timelog::DEFAULT_TIME_TOLERANCE;
use crate::view::reader::ReadMode;
use crate::view::window::DEFAULT_CHUNK_SIZE;

/// File name used by `read_from` / `write_to`.
pub const CONFIG_FILE: &str = "rawcore.json";

/// Tunables shared by the loader, task runner and caches.
///
/// Missing keys in a config file take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoaderConfig {
    /// Read mode for files that are not being acquired.
    pub read_mode: ReadMode,
    /// Chunk window size for buffered blob decoding.
    pub chunk_size: usize,
    pub max_workers: usize,
    pub batch_size_hint: usize,
    pub cache_capacity: usize,
    pub copy_on_hit: bool,
    /// Retention times closer than this are the same time.
    pub time_tolerance: f64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            read_mode: ReadMode::Strict,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_workers: DEFAULT_MAX_WORKERS,
            batch_size_hint: 0,
            cache_capacity: DEFAULT_CAPACITY,
            copy_on_hit: false,
            time_tolerance: DEFAULT_TIME_TOLERANCE,
        }
    }
}

impl LoaderConfig {
    /// Read config from `dir`. Returns None if the file doesn't exist.
    pub fn read_from(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(Some(config))
    }

    /// Write config to `dir`.
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        let path = dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(())
    }

    /// Defaults adjusted to the host machine.
    pub fn tuned() -> Self {
        Self::default().with_profile(&TuningProfile::detect())
    }

    pub fn with_profile(mut self, profile: &TuningProfile) -> Self {
        self.max_workers = profile.max_workers;
        self.chunk_size = profile.chunk_size;
        self.cache_capacity = profile.cache_capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(LoaderConfig::read_from(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let config = LoaderConfig {
            read_mode: ReadMode::PermitMissing,
            max_workers: 3,
            copy_on_hit: true,
            ..LoaderConfig::default()
        };
        config.write_to(dir.path()).unwrap();
        assert_eq!(LoaderConfig::read_from(dir.path()).unwrap(), Some(config));
    }

    #[test]
    fn test_partial_file_takes_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), r#"{ "read_mode": "permit_missing" }"#).unwrap();
        let config = LoaderConfig::read_from(dir.path()).unwrap().unwrap();
        assert_eq!(config.read_mode, ReadMode::PermitMissing);
        assert_eq!(config.max_workers, DEFAULT_MAX_WORKERS);
    }

    #[test]
    fn test_bad_json_is_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{ nope").unwrap();
        let err = LoaderConfig::read_from(dir.path()).unwrap_err();
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_profile_applies() {
        let profile = TuningProfile {
            max_workers: 2,
            chunk_size: 4096,
            cache_capacity: 7,
            memory_pressure: 0.0,
        };
        let config = LoaderConfig::default().with_profile(&profile);
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.cache_capacity, 7);
    }
}
