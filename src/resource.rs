//! Host-derived loader tuning.
//!
//! ```text
//! knob            rule
//! max_workers     cores, at most 12; halved when >90% of RAM is in use
//! chunk_size      0.1% of free RAM, within 256 KB ..= 8 MB
//! cache_capacity  4 below 4 GB of RAM, 10 below 16 GB, else 32
//! ```

use sysinfo::{MemoryRefreshKind, RefreshKind, System};

use crate::cache::DEFAULT_CAPACITY;
use crate::parallel::DEFAULT_MAX_WORKERS;
use crate::view::window::DEFAULT_CHUNK_SIZE;

const KB: usize = 1024;
const MB: usize = 1024 * KB;
const GB: u64 = 1024 * 1024 * 1024;

const CHUNK_MIN: usize = 256 * KB;
const CHUNK_MAX: usize = 8 * MB;

/// Loader parameters for one host.
#[derive(Debug, Clone)]
pub struct TuningProfile {
    /// Task runner workers, caller included.
    pub max_workers: usize,
    /// Refill size of the blob chunk window.
    pub chunk_size: usize,
    /// Entries kept by recency caches.
    pub cache_capacity: usize,
    /// Share of RAM in use, 0.0 ..= 1.0.
    pub memory_pressure: f64,
}

impl TuningProfile {
    /// Read RAM and core count from the running host.
    pub fn detect() -> Self {
        let mut sys = System::new_with_specifics(
            RefreshKind::new().with_memory(MemoryRefreshKind::everything()),
        );
        sys.refresh_memory();
        let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
        let profile = Self::for_host(sys.total_memory(), sys.available_memory(), cores);
        tracing::debug!(
            workers = profile.max_workers,
            chunk_size = profile.chunk_size,
            cache_capacity = profile.cache_capacity,
            "tuned loader for host"
        );
        profile
    }

    /// Profile for a host with `total` / `free` bytes of RAM and `cores`
    /// logical CPUs.
    pub fn for_host(total: u64, free: u64, cores: usize) -> Self {
        let memory_pressure = if total == 0 {
            1.0
        } else {
            (1.0 - free as f64 / total as f64).clamp(0.0, 1.0)
        };

        let mut max_workers = cores.clamp(1, DEFAULT_MAX_WORKERS);
        if memory_pressure > 0.9 {
            max_workers = (max_workers / 2).max(1);
        }

        let chunk_size = usize::try_from(free / 1000)
            .unwrap_or(CHUNK_MAX)
            .clamp(CHUNK_MIN, CHUNK_MAX);

        let cache_capacity = match total {
            t if t < 4 * GB => 4,
            t if t < 16 * GB => DEFAULT_CAPACITY,
            _ => 32,
        };

        Self {
            max_workers,
            chunk_size,
            cache_capacity,
            memory_pressure,
        }
    }
}

impl Default for TuningProfile {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            cache_capacity: DEFAULT_CAPACITY,
            memory_pressure: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gb(n: f64) -> u64 {
        (n * GB as f64) as u64
    }

    #[test]
    fn test_detect_is_within_bounds() {
        let profile = TuningProfile::detect();
        assert!((1..=DEFAULT_MAX_WORKERS).contains(&profile.max_workers));
        assert!((CHUNK_MIN..=CHUNK_MAX).contains(&profile.chunk_size));
    }

    #[test]
    fn test_small_host() {
        let profile = TuningProfile::for_host(gb(2.0), gb(0.24), 2);
        assert_eq!(profile.max_workers, 2);
        assert_eq!(profile.cache_capacity, 4);
        assert_eq!(profile.chunk_size, CHUNK_MIN);
    }

    #[test]
    fn test_many_cores_capped() {
        let profile = TuningProfile::for_host(gb(64.0), gb(48.0), 64);
        assert_eq!(profile.max_workers, DEFAULT_MAX_WORKERS);
        assert_eq!(profile.cache_capacity, 32);
        assert!(profile.chunk_size > CHUNK_MIN && profile.chunk_size <= CHUNK_MAX);
    }

    #[test]
    fn test_low_free_memory_halves_workers() {
        let profile = TuningProfile::for_host(gb(8.0), gb(0.4), 8);
        assert!(profile.memory_pressure > 0.9);
        assert_eq!(profile.max_workers, 4);
        assert_eq!(profile.cache_capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn test_unknown_memory_is_full_pressure() {
        let profile = TuningProfile::for_host(0, 0, 4);
        assert_eq!(profile.memory_pressure, 1.0);
        assert_eq!(profile.max_workers, 2);
    }
}
