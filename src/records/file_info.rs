//! File-level acquisition info and the virtual controller table.
//!
//! ```text
//! [AcquisitionPreamble]                 36 bytes
//! [64 x ControllerSlot]                 legacy, 12 bytes each
//! revision 64+:
//!   [data_addr_64: u64]
//!   [64 x ControllerSlot]               16 bytes each, replaces legacy
//! revision 65+:
//!   [blob_offset: i64][blob_size: u32]
//! [5 x pascal string]                   headings
//! [pascal string]                       computer name
//! ```

use std::sync::OnceLock;

use serde::Serialize;

use crate::error::Result;
use crate::loader::{FieldKind, FieldSpec, LayoutTable, RecordSchema, Revision, VersionedRecord};
use crate::view::reader::RecordReader;

/// Controller slots per table.
pub const CONTROLLER_SLOTS: usize = 64;

const HEADINGS: usize = 5;

// ── AcquisitionPreamble ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AcquisitionDate {
    pub year: u16,
    pub month: u16,
    pub day_of_week: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
    pub millisecond: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AcquisitionPreamble {
    pub method_present: bool,
    pub date: AcquisitionDate,
    pub in_acquisition: bool,
    pub data_addr_32: u32,
    pub n_controllers: u32,
    pub next_controller: u32,
}

type A = FieldSpec<AcquisitionPreamble>;

fn preamble_schema() -> &'static RecordSchema<AcquisitionPreamble> {
    static SCHEMA: OnceLock<RecordSchema<AcquisitionPreamble>> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        RecordSchema::new(
            AcquisitionPreamble::NAME,
            LayoutTable::new(AcquisitionPreamble::NAME, &[(0, 36)]),
            vec![
                A::new("method_present", FieldKind::U32)
                    .store(|r, v| r.method_present = v.as_bool().unwrap_or_default()),
                A::new("year", FieldKind::U16).store(|r, v| r.date.year = v.as_u16().unwrap_or_default()),
                A::new("month", FieldKind::U16).store(|r, v| r.date.month = v.as_u16().unwrap_or_default()),
                A::new("day_of_week", FieldKind::U16)
                    .store(|r, v| r.date.day_of_week = v.as_u16().unwrap_or_default()),
                A::new("day", FieldKind::U16).store(|r, v| r.date.day = v.as_u16().unwrap_or_default()),
                A::new("hour", FieldKind::U16).store(|r, v| r.date.hour = v.as_u16().unwrap_or_default()),
                A::new("minute", FieldKind::U16).store(|r, v| r.date.minute = v.as_u16().unwrap_or_default()),
                A::new("second", FieldKind::U16).store(|r, v| r.date.second = v.as_u16().unwrap_or_default()),
                A::new("millisecond", FieldKind::U16)
                    .store(|r, v| r.date.millisecond = v.as_u16().unwrap_or_default()),
                A::new("in_acquisition", FieldKind::U32)
                    .store(|r, v| r.in_acquisition = v.as_bool().unwrap_or_default()),
                A::new("data_addr_32", FieldKind::U32)
                    .store(|r, v| r.data_addr_32 = v.as_u32().unwrap_or_default()),
                A::new("n_controllers", FieldKind::U32)
                    .store(|r, v| r.n_controllers = v.as_u32().unwrap_or_default()),
                A::new("next_controller", FieldKind::U32)
                    .store(|r, v| r.next_controller = v.as_u32().unwrap_or_default()),
            ],
        )
    })
}

impl VersionedRecord for AcquisitionPreamble {
    const NAME: &'static str = "AcquisitionPreamble";

    fn layouts() -> Option<&'static LayoutTable> {
        Some(preamble_schema().layouts())
    }

    fn decode(reader: &mut RecordReader<'_>, revision: Revision) -> Result<Self> {
        preamble_schema().decode(reader, revision)
    }
}

// ── ControllerSlot ──────────────────────────────────────────────────

/// One virtual controller (MS, UV, analog...) and where its run header
/// lives. Device type -1 marks an unused slot.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ControllerSlot {
    pub device_type: i32,
    pub device_index: i32,
    pub offset: i64,
    #[serde(skip)]
    offset_32: i32,
}

type C = FieldSpec<ControllerSlot>;

fn slot_schema() -> &'static RecordSchema<ControllerSlot> {
    static SCHEMA: OnceLock<RecordSchema<ControllerSlot>> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        RecordSchema::new(
            ControllerSlot::NAME,
            LayoutTable::new(ControllerSlot::NAME, &[(64, 16), (0, 12)]),
            vec![
                C::new("device_type", FieldKind::I32)
                    .store(|r, v| r.device_type = v.as_i32().unwrap_or_default()),
                C::new("device_index", FieldKind::I32)
                    .store(|r, v| r.device_index = v.as_i32().unwrap_or_default()),
                C::new("offset_32", FieldKind::I32)
                    .retired_at(64)
                    .store(|r, v| r.offset_32 = v.as_i32().unwrap_or_default()),
                C::new("offset", FieldKind::I64)
                    .since(64)
                    .store(|r, v| r.offset = v.as_i64().unwrap_or_default())
                    .migrate_from("offset_32", |r| r.offset = i64::from(r.offset_32)),
            ],
        )
    })
}

impl PartialEq for ControllerSlot {
    fn eq(&self, other: &Self) -> bool {
        self.device_type == other.device_type
            && self.device_index == other.device_index
            && self.offset == other.offset
    }
}

impl Eq for ControllerSlot {}

impl ControllerSlot {
    pub fn new(device_type: i32, device_index: i32, offset: i64) -> Self {
        Self {
            device_type,
            device_index,
            offset,
            offset_32: 0,
        }
    }

    pub fn is_used(&self) -> bool {
        self.device_type >= 0
    }
}

impl VersionedRecord for ControllerSlot {
    const NAME: &'static str = "ControllerSlot";

    fn layouts() -> Option<&'static LayoutTable> {
        Some(slot_schema().layouts())
    }

    fn decode(reader: &mut RecordReader<'_>, revision: Revision) -> Result<Self> {
        slot_schema().decode(reader, revision)
    }
}

// ── RawFileInfo ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawFileInfo {
    pub preamble: AcquisitionPreamble,
    /// 64-bit data address; the 32-bit one widened before revision 64.
    pub data_addr: u64,
    /// Controller table with 64-bit offsets at every revision.
    pub controllers: Vec<ControllerSlot>,
    /// -1 when the file has no blob (always before revision 65).
    pub blob_offset: i64,
    pub blob_size: u32,
    pub headings: Vec<String>,
    pub computer_name: String,
}

impl RawFileInfo {
    pub fn acquisition_date(&self) -> &AcquisitionDate {
        &self.preamble.date
    }

    pub fn controller(&self, device_type: i32, device_index: i32) -> Option<&ControllerSlot> {
        self.controllers
            .iter()
            .find(|c| c.device_type == device_type && c.device_index == device_index)
    }

    /// Run header address of the first MS controller, falling back to the
    /// first used slot with a non-zero offset.
    pub fn run_header_addr(&self) -> Option<u64> {
        self.controllers
            .iter()
            .find(|c| c.device_type == 0 && c.offset > 0)
            .or_else(|| self.controllers.iter().find(|c| c.is_used() && c.offset > 0))
            .map(|c| c.offset as u64)
    }
}

impl VersionedRecord for RawFileInfo {
    const NAME: &'static str = "RawFileInfo";

    fn layouts() -> Option<&'static LayoutTable> {
        None
    }

    fn decode(reader: &mut RecordReader<'_>, revision: Revision) -> Result<Self> {
        let preamble = reader.read_record::<AcquisitionPreamble>(revision)?;

        // The legacy table is present at every revision, always in its
        // 32-bit shape.
        let legacy_rev = revision.min(Revision::new(Revision::FIRST_64BIT.get() - 1));
        let legacy = reader.read_records::<ControllerSlot>(CONTROLLER_SLOTS, legacy_rev)?;

        let mut info = RawFileInfo {
            data_addr: u64::from(preamble.data_addr_32),
            preamble,
            controllers: legacy,
            blob_offset: -1,
            blob_size: 0,
            headings: Vec::with_capacity(HEADINGS),
            computer_name: String::new(),
        };

        if revision.uses_64bit_addresses() {
            info.data_addr = reader.read_u64()?;
            info.controllers = reader.read_records::<ControllerSlot>(CONTROLLER_SLOTS, revision)?;
        }
        if revision.at_least(65) {
            info.blob_offset = reader.read_i64()?;
            info.blob_size = reader.read_u32()?;
        }

        for _ in 0..HEADINGS {
            info.headings.push(reader.read_pascal_string()?);
        }
        info.computer_name = reader.read_pascal_string()?;
        Ok(info)
    }
}

/// Serialize file info at `revision` (fixtures).
pub fn encode_file_info(info: &RawFileInfo, revision: Revision) -> Vec<u8> {
    let mut out = Vec::new();
    let p = &info.preamble;
    let d = &p.date;
    out.extend_from_slice(&(p.method_present as u32).to_le_bytes());
    for v in [d.year, d.month, d.day_of_week, d.day, d.hour, d.minute, d.second, d.millisecond] {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out.extend_from_slice(&(p.in_acquisition as u32).to_le_bytes());
    out.extend_from_slice(&p.data_addr_32.to_le_bytes());
    out.extend_from_slice(&p.n_controllers.to_le_bytes());
    out.extend_from_slice(&p.next_controller.to_le_bytes());

    let slot = |i: usize| info.controllers.get(i).copied().unwrap_or(ControllerSlot::new(-1, 0, 0));
    for i in 0..CONTROLLER_SLOTS {
        let c = slot(i);
        out.extend_from_slice(&c.device_type.to_le_bytes());
        out.extend_from_slice(&c.device_index.to_le_bytes());
        out.extend_from_slice(&(c.offset as i32).to_le_bytes());
    }
    if revision.uses_64bit_addresses() {
        out.extend_from_slice(&info.data_addr.to_le_bytes());
        for i in 0..CONTROLLER_SLOTS {
            let c = slot(i);
            out.extend_from_slice(&c.device_type.to_le_bytes());
            out.extend_from_slice(&c.device_index.to_le_bytes());
            out.extend_from_slice(&c.offset.to_le_bytes());
        }
    }
    if revision.at_least(65) {
        out.extend_from_slice(&info.blob_offset.to_le_bytes());
        out.extend_from_slice(&info.blob_size.to_le_bytes());
    }
    let empty = String::new();
    for s in (0..HEADINGS)
        .map(|i| info.headings.get(i).unwrap_or(&empty))
        .chain(std::iter::once(&info.computer_name))
    {
        let units: Vec<u16> = s.encode_utf16().collect();
        out.extend_from_slice(&(units.len() as i32).to_le_bytes());
        for u in units {
            out.extend_from_slice(&u.to_le_bytes());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::reader::ReadMode;

    fn sample(revision: Revision) -> RawFileInfo {
        let mut controllers = vec![ControllerSlot::new(-1, 0, 0); CONTROLLER_SLOTS];
        controllers[0] = ControllerSlot::new(3, 0, 9_000);
        controllers[1] = ControllerSlot::new(0, 0, 123_456);
        RawFileInfo {
            preamble: AcquisitionPreamble {
                method_present: true,
                date: AcquisitionDate {
                    year: 2021,
                    month: 6,
                    day_of_week: 2,
                    day: 15,
                    hour: 9,
                    minute: 30,
                    second: 5,
                    millisecond: 250,
                },
                in_acquisition: false,
                data_addr_32: 4096,
                n_controllers: 2,
                next_controller: 2,
            },
            data_addr: 4096,
            controllers,
            blob_offset: if revision.at_least(65) { 77_000 } else { -1 },
            blob_size: if revision.at_least(65) { 512 } else { 0 },
            headings: vec!["A".into(), "".into(), "Plate 3".into(), "".into(), "".into()],
            computer_name: "ORBI-01".into(),
        }
    }

    #[test]
    fn test_slot_layouts_validate() {
        slot_schema().validate().unwrap();
        preamble_schema().validate().unwrap();
    }

    #[test]
    fn test_round_trip_at_each_era() {
        for rev in [60u32, 64, 66] {
            let rev = Revision::new(rev);
            let info = sample(rev);
            let bytes = encode_file_info(&info, rev);
            let loaded = RawFileInfo::load(&bytes, 0, rev, ReadMode::Strict).unwrap();
            assert_eq!(loaded.bytes_consumed, bytes.len() as u64, "revision {}", rev);
            assert_eq!(loaded.value, info, "revision {}", rev);
        }
    }

    #[test]
    fn test_run_header_prefers_ms_controller() {
        let info = sample(Revision::new(64));
        assert_eq!(info.run_header_addr(), Some(123_456));
        assert_eq!(info.controller(3, 0).map(|c| c.offset), Some(9_000));
        assert_eq!(info.acquisition_date().year, 2021);
    }
}
