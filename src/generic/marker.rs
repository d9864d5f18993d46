//! Records that carry their own field-presence marker.
//!
//! ```text
//! [marker: pascal string]  e.g. "1||1"  -> fields 0 and 2 present
//! [present fields, packed in descriptor order]
//! ```
//!
//! Slot `i` of the `|`-separated marker is non-empty when field `i` is
//! present. Missing trailing slots mean absent. Absent fields occupy no
//! bytes and are reported as invalid, never as zero.

use crate::error::Result;
use crate::generic::decoder::{decode_field, GenericDecoder};
use crate::generic::value::Value;
use crate::view::reader::RecordReader;

/// Positional values with a validity flag per field.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    values: Vec<Value>,
    valid: Vec<bool>,
}

impl DecodedRecord {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_valid(&self, index: usize) -> bool {
        self.valid.get(index).copied().unwrap_or(false)
    }

    /// The value only when the field was present in this record.
    pub fn get(&self, index: usize) -> Option<&Value> {
        if self.is_valid(index) {
            self.values.get(index)
        } else {
            None
        }
    }

    pub fn validity(&self) -> &[bool] {
        &self.valid
    }

    pub fn present_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }
}

/// Presence flags for `field_count` fields from a marker string.
pub fn parse_marker(marker: &str, field_count: usize) -> Vec<bool> {
    let mut flags: Vec<bool> = marker
        .split('|')
        .take(field_count)
        .map(|slot| !slot.trim().is_empty())
        .collect();
    flags.resize(field_count, false);
    flags
}

impl GenericDecoder {
    /// Decode one marked record at the reader's cursor.
    pub fn decode_marked(&self, reader: &mut RecordReader<'_>) -> Result<DecodedRecord> {
        let marker = reader.read_pascal_string()?;
        let valid = parse_marker(&marker, self.field_count());
        let mut values = Vec::with_capacity(valid.len());
        for (desc, &present) in self.descriptors().iter().zip(&valid) {
            if present {
                let bytes = reader.read_block(desc.byte_size())?;
                values.push(decode_field(desc.data_type, &bytes));
            } else {
                values.push(Value::Empty);
            }
        }
        Ok(DecodedRecord { values, valid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generic::descriptor::{DataDescriptor, DataDescriptors, DataType};

    fn pascal(s: &str) -> Vec<u8> {
        let units: Vec<u16> = s.encode_utf16().collect();
        let mut out = (units.len() as i32).to_le_bytes().to_vec();
        for u in units {
            out.extend_from_slice(&u.to_le_bytes());
        }
        out
    }

    fn decoder() -> GenericDecoder {
        GenericDecoder::new(DataDescriptors::new(vec![
            DataDescriptor::new("count", DataType::Long, 4),
            DataDescriptor::new("ratio", DataType::Double, 8),
            DataDescriptor::new("level", DataType::Long, 4),
        ]))
    }

    #[test]
    fn test_parse_marker() {
        assert_eq!(parse_marker("1||1", 3), vec![true, false, true]);
        assert_eq!(parse_marker("1", 3), vec![true, false, false]);
        assert_eq!(parse_marker("", 2), vec![false, false]);
        assert_eq!(parse_marker("a|b|c|d", 2), vec![true, true]);
    }

    #[test]
    fn test_absent_field_is_not_zero() {
        let mut bytes = pascal("1||1");
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&5i32.to_le_bytes());

        let mut reader = RecordReader::new(&bytes);
        let rec = decoder().decode_marked(&mut reader).unwrap();
        assert_eq!(reader.position(), bytes.len() as u64);

        assert_eq!(rec.get(0), Some(&Value::I32(0)));
        assert!(rec.is_valid(0));
        assert_eq!(rec.get(1), None);
        assert!(!rec.is_valid(1));
        assert_eq!(rec.get(2), Some(&Value::I32(5)));
        assert_eq!(rec.present_count(), 2);
    }
}
