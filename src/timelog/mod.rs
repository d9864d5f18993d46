//! Time-indexed logs: raw entries in file order plus a sorted,
//! de-duplicated retention-time index that grows while a file is written.

pub mod index;
pub mod shared;
pub mod store;

/// Retention times closer than this collapse into one index slot.
pub const DEFAULT_TIME_TOLERANCE: f64 = 1e-6;

pub use index::{IndexEntry, SortedTimeIndex};
pub use shared::SharedTimedLog;
pub use store::{encode_time_log, TimedEntry, TimedLog};
