//! Self-described ("generic data") records.
//!
//! Extensible metadata logs (trailer extra, status log, tune data) carry
//! their schema in the file: a descriptor block lists each field's label,
//! type tag and size, and every record after it is a fixed-stride blob.

pub mod decoder;
pub mod descriptor;
pub mod marker;
pub mod record_set;
pub mod value;

pub use decoder::{decode_field, GenericDecoder};
pub use descriptor::{encode_descriptors, DataDescriptor, DataDescriptors, DataType};
pub use marker::{parse_marker, DecodedRecord};
pub use record_set::GenericRecordSet;
pub use value::Value;
