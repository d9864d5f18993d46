//! Byte access: sources, mapped views, chunk windows and the record reader.

pub mod manager;
pub mod mapped;
pub mod reader;
pub mod registry;
pub mod source;
pub mod window;

pub use manager::ViewManager;
pub use mapped::MappedView;
pub use reader::{ReadMode, RecordReader, DEFAULT_ARRAY_CAP, MAX_STRING_CHARS};
pub use registry::{SourceFactory, SourceRegistry};
pub use source::{ByteSource, FileSource, MemorySource, SubRange};
pub use window::{ChunkWindow, DEFAULT_CHUNK_SIZE};
