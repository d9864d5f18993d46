//! rawcore: versioned binary record loading for instrument RAW files.
//!
//! Layers, leaves first:
//!
//! ```text
//! view       byte sources, mapped views, chunk windows, RecordReader
//! loader     Revision, LayoutTable, RecordSchema, VersionedRecord
//! records    ScanIndexEntry, Reaction, ScanEvent, RawFileInfo, RunHeader
//! generic    DataDescriptors + GenericDecoder (self-described blobs)
//! timelog    retention-time indexed log built from generic blobs
//! parallel   small-task runner
//! cache      bounded FIFO recency cache
//! ```
//!
//! All on-disk primitives are little-endian. Strings are i32-length-prefixed
//! UTF-16LE; arrays are u32-count-prefixed.

pub mod cache;
pub mod config;
pub mod error;
pub mod generic;
pub mod loader;
pub mod parallel;
pub mod records;
pub mod resource;
pub mod timelog;
pub mod view;

pub use cache::RecencyCache;
pub use config::LoaderConfig;
pub use error::{RawError, Result};
pub use generic::{DataDescriptor, DataDescriptors, DataType, GenericDecoder, GenericRecordSet, Value};
pub use loader::{LayoutTable, Loaded, Revision, VersionedRecord};
pub use parallel::{ParallelRunner, ProgressCounter, SmallTask};
pub use records::{RawFileInfo, Reaction, RunHeader, ScanEvent, ScanEventPreamble, ScanIndexEntry};
pub use timelog::{SharedTimedLog, TimedEntry, TimedLog};
pub use view::{ByteSource, MappedView, ReadMode, RecordReader, ViewManager};
