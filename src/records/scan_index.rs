//! Scan index entries: one fixed-size record per scan.
//!
//! ```text
//! offset  field                 <64    64     65+
//! 0       data_offset_32 (u32)  x      x      -
//! 0       data_size (u32)       -      -      x
//! 4       trailer_offset (i32)  x      x      x
//! 8       scan_event (u16)      x      x      x
//! 10      scan_segment (u16)    x      x      x
//! 12      scan_number (i32)     x      x      x
//! 16      packet_type (u32)     x      x      x
//! 20      number_packets (i32)  x      x      x
//! 24      6 x f64 stats         x      x      x
//! 72      data_offset (u64)     -      x      x
//! 80      cycle_number (i32)    -      -      x
//! 84      padding               -      -      x
//! size                          72     80     88
//! ```

use std::sync::OnceLock;

use serde::Serialize;

use crate::error::Result;
use crate::loader::{FieldKind, FieldSpec, LayoutTable, RecordSchema, Revision, VersionedRecord};
use crate::view::reader::RecordReader;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanIndexEntry {
    /// Offset of the scan's packet data in the data stream.
    pub data_offset: u64,
    /// Packet data size; 0 before revision 65.
    pub data_size: u32,
    pub trailer_offset: i32,
    pub scan_event: u16,
    pub scan_segment: u16,
    pub scan_number: i32,
    pub packet_type: u32,
    pub number_packets: i32,
    /// Retention time in minutes.
    pub start_time: f64,
    pub tic: f64,
    pub base_peak_intensity: f64,
    pub base_peak_mass: f64,
    pub low_mass: f64,
    pub high_mass: f64,
    /// 0 before revision 65.
    pub cycle_number: i32,
    #[serde(skip)]
    data_offset_32: u32,
}

type F = FieldSpec<ScanIndexEntry>;

fn schema() -> &'static RecordSchema<ScanIndexEntry> {
    static SCHEMA: OnceLock<RecordSchema<ScanIndexEntry>> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        RecordSchema::new(
            ScanIndexEntry::NAME,
            LayoutTable::new(ScanIndexEntry::NAME, &[(65, 88), (64, 80), (0, 72)]),
            vec![
                F::new("data_offset_32", FieldKind::U32)
                    .retired_at(65)
                    .store(|r, v| r.data_offset_32 = v.as_u32().unwrap_or_default()),
                F::new("data_size", FieldKind::U32)
                    .since(65)
                    .store(|r, v| r.data_size = v.as_u32().unwrap_or_default()),
                F::new("trailer_offset", FieldKind::I32)
                    .store(|r, v| r.trailer_offset = v.as_i32().unwrap_or_default()),
                F::new("scan_event", FieldKind::U16)
                    .store(|r, v| r.scan_event = v.as_u16().unwrap_or_default()),
                F::new("scan_segment", FieldKind::U16)
                    .store(|r, v| r.scan_segment = v.as_u16().unwrap_or_default()),
                F::new("scan_number", FieldKind::I32)
                    .store(|r, v| r.scan_number = v.as_i32().unwrap_or_default()),
                F::new("packet_type", FieldKind::U32)
                    .store(|r, v| r.packet_type = v.as_u32().unwrap_or_default()),
                F::new("number_packets", FieldKind::I32)
                    .store(|r, v| r.number_packets = v.as_i32().unwrap_or_default()),
                F::new("start_time", FieldKind::F64)
                    .store(|r, v| r.start_time = v.as_f64().unwrap_or_default()),
                F::new("tic", FieldKind::F64).store(|r, v| r.tic = v.as_f64().unwrap_or_default()),
                F::new("base_peak_intensity", FieldKind::F64)
                    .store(|r, v| r.base_peak_intensity = v.as_f64().unwrap_or_default()),
                F::new("base_peak_mass", FieldKind::F64)
                    .store(|r, v| r.base_peak_mass = v.as_f64().unwrap_or_default()),
                F::new("low_mass", FieldKind::F64)
                    .store(|r, v| r.low_mass = v.as_f64().unwrap_or_default()),
                F::new("high_mass", FieldKind::F64)
                    .store(|r, v| r.high_mass = v.as_f64().unwrap_or_default()),
                F::new("data_offset", FieldKind::U64)
                    .since(64)
                    .store(|r, v| r.data_offset = v.as_u64().unwrap_or_default())
                    .migrate_from("data_offset_32", |r| r.data_offset = u64::from(r.data_offset_32)),
                F::new("cycle_number", FieldKind::I32)
                    .since(65)
                    .store(|r, v| r.cycle_number = v.as_i32().unwrap_or_default()),
                F::reserved(4).since(65),
            ],
        )
    })
}

impl ScanIndexEntry {
    pub fn schema() -> &'static RecordSchema<ScanIndexEntry> {
        schema()
    }

    /// Packet type without the SI flag in the high word.
    pub fn scan_type(&self) -> u16 {
        (self.packet_type & 0xFFFF) as u16
    }
}

impl VersionedRecord for ScanIndexEntry {
    const NAME: &'static str = "ScanIndexEntry";

    fn layouts() -> Option<&'static LayoutTable> {
        Some(schema().layouts())
    }

    fn decode(reader: &mut RecordReader<'_>, revision: Revision) -> Result<Self> {
        schema().decode(reader, revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_sizes_are_consistent() {
        schema().validate().unwrap();
        assert_eq!(ScanIndexEntry::fixed_size(Revision::new(63)).unwrap(), Some(72));
        assert_eq!(ScanIndexEntry::fixed_size(Revision::new(64)).unwrap(), Some(80));
        assert_eq!(ScanIndexEntry::fixed_size(Revision::new(66)).unwrap(), Some(88));
    }

    #[test]
    fn test_field_offsets() {
        let s = schema();
        assert_eq!(s.offset_of("start_time", Revision::new(60)), Some(24));
        assert_eq!(s.offset_of("data_offset", Revision::new(64)), Some(72));
        assert_eq!(s.offset_of("data_offset", Revision::new(63)), None);
        assert_eq!(s.offset_of("data_size", Revision::new(65)), Some(0));
        assert_eq!(s.offset_of("cycle_number", Revision::new(65)), Some(80));
    }

    #[test]
    fn test_scan_type_masks_high_word() {
        let entry = ScanIndexEntry {
            packet_type: 0x0001_0015,
            ..Default::default()
        };
        assert_eq!(entry.scan_type(), 0x15);
    }
}
