//! Per-controller run header: scan range, time/mass range and the
//! addresses of every other per-controller stream.
//!
//! ```text
//! [SampleInfo]                          88 bytes, every revision
//! revision < 64:
//!   [56 bytes unused]
//!   [sample tags: 88 + 40 + 320 bytes UTF-16]
//!   [13 x 520 bytes file names]
//!   [RunAddresses]                      56 bytes, 32-bit addresses
//! revision 64+:
//!   [variable area]                     size differs by instrument
//!   [RunAddresses]                      144 bytes, 148 at 66+
//! [8 x pascal string]                   device, model, serial, software, 4 tags
//! ```
//!
//! The 64-bit address block is found by scanning forward for the header's
//! own start offset, which the block repeats as `run_header_addr` and again
//! in the controller entry that follows it.

use std::sync::OnceLock;

use serde::Serialize;

use crate::error::Result;
use crate::loader::{FieldKind, FieldSpec, LayoutTable, RecordSchema, Revision, VersionedRecord};
use crate::view::reader::RecordReader;

/// How far past `SampleInfo` the address block may start.
const ADDRESS_SEARCH_SPAN: usize = 8192;

const LEGACY_GAP: usize = 56;
const LEGACY_TAG_BYTES: [usize; 3] = [88, 40, 320];
const LEGACY_FILE_NAMES: usize = 13;
const FILE_NAME_BYTES: usize = 520;
const TRAILING_STRINGS: usize = 8;

// ── SampleInfo ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SampleInfo {
    pub dataset_id: u32,
    pub first_scan: u32,
    pub last_scan: u32,
    pub status_log_length: u32,
    pub error_log_length: u32,
    pub flags: u32,
    pub scan_index_addr_32: u32,
    pub data_addr_32: u32,
    pub status_log_addr_32: u32,
    pub error_log_addr_32: u32,
    pub max_packet: i16,
    pub max_ion_current: f64,
    pub low_mass: f64,
    pub high_mass: f64,
    /// Minutes.
    pub start_time: f64,
    pub end_time: f64,
}

type S = FieldSpec<SampleInfo>;

fn sample_schema() -> &'static RecordSchema<SampleInfo> {
    static SCHEMA: OnceLock<RecordSchema<SampleInfo>> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        RecordSchema::new(
            SampleInfo::NAME,
            LayoutTable::new(SampleInfo::NAME, &[(0, 88)]),
            vec![
                S::reserved(4),
                S::new("dataset_id", FieldKind::U32).store(|r, v| r.dataset_id = v.as_u32().unwrap_or_default()),
                S::new("first_scan", FieldKind::U32).store(|r, v| r.first_scan = v.as_u32().unwrap_or_default()),
                S::new("last_scan", FieldKind::U32).store(|r, v| r.last_scan = v.as_u32().unwrap_or_default()),
                S::new("status_log_length", FieldKind::U32)
                    .store(|r, v| r.status_log_length = v.as_u32().unwrap_or_default()),
                S::new("error_log_length", FieldKind::U32)
                    .store(|r, v| r.error_log_length = v.as_u32().unwrap_or_default()),
                S::new("flags", FieldKind::U32).store(|r, v| r.flags = v.as_u32().unwrap_or_default()),
                S::new("scan_index_addr_32", FieldKind::U32)
                    .store(|r, v| r.scan_index_addr_32 = v.as_u32().unwrap_or_default()),
                S::new("data_addr_32", FieldKind::U32).store(|r, v| r.data_addr_32 = v.as_u32().unwrap_or_default()),
                S::new("status_log_addr_32", FieldKind::U32)
                    .store(|r, v| r.status_log_addr_32 = v.as_u32().unwrap_or_default()),
                S::new("error_log_addr_32", FieldKind::U32)
                    .store(|r, v| r.error_log_addr_32 = v.as_u32().unwrap_or_default()),
                S::new("max_packet", FieldKind::I16).store(|r, v| r.max_packet = v.as_i16().unwrap_or_default()),
                S::reserved(2),
                S::new("max_ion_current", FieldKind::F64)
                    .store(|r, v| r.max_ion_current = v.as_f64().unwrap_or_default()),
                S::new("low_mass", FieldKind::F64).store(|r, v| r.low_mass = v.as_f64().unwrap_or_default()),
                S::new("high_mass", FieldKind::F64).store(|r, v| r.high_mass = v.as_f64().unwrap_or_default()),
                S::new("start_time", FieldKind::F64).store(|r, v| r.start_time = v.as_f64().unwrap_or_default()),
                S::new("end_time", FieldKind::F64).store(|r, v| r.end_time = v.as_f64().unwrap_or_default()),
            ],
        )
    })
}

impl VersionedRecord for SampleInfo {
    const NAME: &'static str = "SampleInfo";

    fn layouts() -> Option<&'static LayoutTable> {
        Some(sample_schema().layouts())
    }

    fn decode(reader: &mut RecordReader<'_>, revision: Revision) -> Result<Self> {
        sample_schema().decode(reader, revision)
    }
}

// ── RunAddresses ────────────────────────────────────────────────────

/// Stream addresses, 64-bit at every revision.
///
/// Before revision 64 the trailer, parameter and run-header addresses
/// are widened from their 32-bit fields here; the scan index, data and
/// log addresses come from `SampleInfo`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunAddresses {
    pub scan_index_addr: u64,
    pub data_addr: u64,
    pub status_log_addr: u64,
    pub error_log_addr: u64,
    pub run_header_addr: u64,
    pub trailer_addr: u64,
    pub params_addr: u64,
    /// 0 from revision 64 on.
    pub segment_count: u32,
    /// 0 before revision 66.
    pub instrument_type: i32,
    #[serde(skip)]
    trailer_addr_32: u32,
    #[serde(skip)]
    params_addr_32: u32,
    #[serde(skip)]
    run_header_addr_32: u32,
}

impl PartialEq for RunAddresses {
    fn eq(&self, other: &Self) -> bool {
        self.scan_index_addr == other.scan_index_addr
            && self.data_addr == other.data_addr
            && self.status_log_addr == other.status_log_addr
            && self.error_log_addr == other.error_log_addr
            && self.run_header_addr == other.run_header_addr
            && self.trailer_addr == other.trailer_addr
            && self.params_addr == other.params_addr
            && self.segment_count == other.segment_count
            && self.instrument_type == other.instrument_type
    }
}

type R = FieldSpec<RunAddresses>;

fn address_schema() -> &'static RecordSchema<RunAddresses> {
    static SCHEMA: OnceLock<RecordSchema<RunAddresses>> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        RecordSchema::new(
            RunAddresses::NAME,
            LayoutTable::new(RunAddresses::NAME, &[(66, 148), (64, 144), (0, 56)]),
            vec![
                R::reserved(16).retired_at(64),
                R::new("trailer_addr_32", FieldKind::U32)
                    .retired_at(64)
                    .store(|r, v| r.trailer_addr_32 = v.as_u32().unwrap_or_default()),
                R::new("params_addr_32", FieldKind::U32)
                    .retired_at(64)
                    .store(|r, v| r.params_addr_32 = v.as_u32().unwrap_or_default()),
                R::reserved(8).retired_at(64),
                R::new("segment_count", FieldKind::U32)
                    .retired_at(64)
                    .store(|r, v| r.segment_count = v.as_u32().unwrap_or_default()),
                R::reserved(16).retired_at(64),
                R::new("run_header_addr_32", FieldKind::U32)
                    .retired_at(64)
                    .store(|r, v| r.run_header_addr_32 = v.as_u32().unwrap_or_default()),
                R::new("scan_index_addr", FieldKind::U64)
                    .since(64)
                    .store(|r, v| r.scan_index_addr = v.as_u64().unwrap_or_default()),
                R::new("data_addr", FieldKind::U64)
                    .since(64)
                    .store(|r, v| r.data_addr = v.as_u64().unwrap_or_default()),
                R::new("status_log_addr", FieldKind::U64)
                    .since(64)
                    .store(|r, v| r.status_log_addr = v.as_u64().unwrap_or_default()),
                R::new("error_log_addr", FieldKind::U64)
                    .since(64)
                    .store(|r, v| r.error_log_addr = v.as_u64().unwrap_or_default()),
                R::new("run_header_addr", FieldKind::U64)
                    .since(64)
                    .store(|r, v| r.run_header_addr = v.as_u64().unwrap_or_default())
                    .migrate_from("run_header_addr_32", |r| r.run_header_addr = u64::from(r.run_header_addr_32)),
                R::new("trailer_addr", FieldKind::U64)
                    .since(64)
                    .store(|r, v| r.trailer_addr = v.as_u64().unwrap_or_default())
                    .migrate_from("trailer_addr_32", |r| r.trailer_addr = u64::from(r.trailer_addr_32)),
                R::new("params_addr", FieldKind::U64)
                    .since(64)
                    .store(|r, v| r.params_addr = v.as_u64().unwrap_or_default())
                    .migrate_from("params_addr_32", |r| r.params_addr = u64::from(r.params_addr_32)),
                // Controller entry repeating this header's address.
                R::reserved(16).since(64),
                // Six (address, count) pairs for optional streams.
                R::reserved(72).since(64),
                R::new("instrument_type", FieldKind::I32)
                    .since(66)
                    .store(|r, v| r.instrument_type = v.as_i32().unwrap_or_default()),
            ],
        )
    })
}

impl RunAddresses {
    pub fn schema() -> &'static RecordSchema<RunAddresses> {
        address_schema()
    }

    /// Fill the addresses that only `SampleInfo` carries before revision 64.
    fn widen_from(&mut self, sample: &SampleInfo) {
        self.scan_index_addr = u64::from(sample.scan_index_addr_32);
        self.data_addr = u64::from(sample.data_addr_32);
        self.status_log_addr = u64::from(sample.status_log_addr_32);
        self.error_log_addr = u64::from(sample.error_log_addr_32);
    }
}

impl VersionedRecord for RunAddresses {
    const NAME: &'static str = "RunAddresses";

    fn layouts() -> Option<&'static LayoutTable> {
        Some(address_schema().layouts())
    }

    fn decode(reader: &mut RecordReader<'_>, revision: Revision) -> Result<Self> {
        address_schema().decode(reader, revision)
    }
}

// ── RunHeader ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunHeader {
    pub sample: SampleInfo,
    pub addresses: RunAddresses,
    pub sample_tags: [String; 3],
    pub device_name: String,
    pub model: String,
    pub serial_number: String,
    pub software_version: String,
}

impl RunHeader {
    pub fn first_scan(&self) -> u32 {
        self.sample.first_scan
    }

    pub fn last_scan(&self) -> u32 {
        self.sample.last_scan
    }

    pub fn scan_count(&self) -> u32 {
        if self.sample.last_scan >= self.sample.first_scan {
            self.sample.last_scan - self.sample.first_scan + 1
        } else {
            0
        }
    }

    pub fn scan_index_addr(&self) -> u64 {
        self.addresses.scan_index_addr
    }

    pub fn data_addr(&self) -> u64 {
        self.addresses.data_addr
    }

    pub fn trailer_addr(&self) -> u64 {
        self.addresses.trailer_addr
    }

    pub fn params_addr(&self) -> u64 {
        self.addresses.params_addr
    }

    pub fn instrument_type(&self) -> i32 {
        self.addresses.instrument_type
    }
}

impl VersionedRecord for RunHeader {
    const NAME: &'static str = "RunHeader";

    fn layouts() -> Option<&'static LayoutTable> {
        None
    }

    fn decode(reader: &mut RecordReader<'_>, revision: Revision) -> Result<Self> {
        let start = reader.position();
        let sample = reader.read_record::<SampleInfo>(revision)?;
        let mut header = RunHeader::default();

        if revision.uses_64bit_addresses() {
            let block = find_address_block(reader, start)?;
            reader.set_position(block);
            header.addresses = reader.read_record::<RunAddresses>(revision)?;
        } else {
            reader.skip(LEGACY_GAP)?;
            for (tag, len) in header.sample_tags.iter_mut().zip(LEGACY_TAG_BYTES) {
                *tag = reader.read_utf16_fixed(len)?;
            }
            reader.skip(LEGACY_FILE_NAMES * FILE_NAME_BYTES)?;
            header.addresses = reader.read_record::<RunAddresses>(revision)?;
            header.addresses.widen_from(&sample);
        }
        header.sample = sample;

        let strings = read_trailing_strings(reader);
        let text = |i: usize| strings.get(i).cloned().unwrap_or_default();
        header.device_name = text(0);
        header.model = text(1);
        header.serial_number = text(2);
        header.software_version = text(3);
        if revision.uses_64bit_addresses() {
            for (i, tag) in header.sample_tags.iter_mut().enumerate() {
                *tag = text(4 + i);
            }
        }
        Ok(header)
    }
}

/// The instrument strings closing the header. Older writers leave some
/// out, so reading stops at the first one that does not parse.
fn read_trailing_strings(reader: &mut RecordReader<'_>) -> Vec<String> {
    let mut out = Vec::with_capacity(TRAILING_STRINGS);
    for _ in 0..TRAILING_STRINGS {
        let at = reader.position();
        match reader.read_pascal_string() {
            Ok(s) => out.push(s),
            Err(e) => {
                tracing::debug!(offset = at, error = %e, "run header strings end early");
                reader.set_position(at);
                break;
            }
        }
    }
    out
}

/// Locate the 64-bit address block after `SampleInfo`.
///
/// A match for the header's own offset is tried as `run_header_addr`
/// (block + 32) and as the controller entry offset (block + 64), the
/// latter for writers that leave `run_header_addr` zero.
fn find_address_block(reader: &RecordReader<'_>, header_start: u64) -> Result<u64> {
    let from = reader.position();
    let source = reader.source();
    let file_size = source.len();
    let mut window = vec![0u8; ADDRESS_SEARCH_SPAN + 72];
    let n = source.read_at(from, &mut window);
    window.truncate(n);

    let target = header_start.to_le_bytes();
    let end = n.min(ADDRESS_SEARCH_SPAN);
    let mut pos = 0;
    while pos + 8 <= end {
        if window[pos..pos + 8] == target {
            if pos >= 32 && is_address_block(&window, pos - 32, file_size) {
                return Ok(from + (pos - 32) as u64);
            }
            if pos >= 64 && is_address_block_with_controller(&window, pos - 64, file_size) {
                return Ok(from + (pos - 64) as u64);
            }
        }
        pos += 4;
    }
    Err(reader.unsupported(format!(
        "no 64-bit address block naming offset {} within {} bytes",
        header_start, ADDRESS_SEARCH_SPAN
    )))
}

fn u64_at(buf: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(buf[at..at + 8].try_into().unwrap())
}

fn i32_at(buf: &[u8], at: usize) -> i32 {
    i32::from_le_bytes(buf[at..at + 4].try_into().unwrap())
}

fn is_address_block(buf: &[u8], at: usize, file_size: u64) -> bool {
    if at + 56 > buf.len() {
        return false;
    }
    let in_file = |addr: u64| addr > 0 && addr < file_size;
    in_file(u64_at(buf, at)) && in_file(u64_at(buf, at + 8))
}

fn is_address_block_with_controller(buf: &[u8], at: usize, file_size: u64) -> bool {
    if at + 72 > buf.len() {
        return false;
    }
    let in_file = |addr: u64| addr > 0 && addr < file_size;
    if !(in_file(u64_at(buf, at)) || in_file(u64_at(buf, at + 8))) {
        return false;
    }
    (0..=5).contains(&i32_at(buf, at + 56)) && (0..=7).contains(&i32_at(buf, at + 60))
}

/// Serialize a run header starting at file offset `start` (fixtures).
///
/// From revision 64 on, `gap` zero bytes stand in for the variable area
/// before the address block.
pub fn encode_run_header(header: &RunHeader, revision: Revision, start: u64, gap: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let s = &header.sample;
    out.extend_from_slice(&[0u8; 4]);
    for v in [
        s.dataset_id,
        s.first_scan,
        s.last_scan,
        s.status_log_length,
        s.error_log_length,
        s.flags,
        s.scan_index_addr_32,
        s.data_addr_32,
        s.status_log_addr_32,
        s.error_log_addr_32,
    ] {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out.extend_from_slice(&s.max_packet.to_le_bytes());
    out.extend_from_slice(&[0u8; 2]);
    for v in [s.max_ion_current, s.low_mass, s.high_mass, s.start_time, s.end_time] {
        out.extend_from_slice(&v.to_le_bytes());
    }

    let a = &header.addresses;
    if revision.uses_64bit_addresses() {
        out.resize(out.len() + gap, 0);
        for v in [
            a.scan_index_addr,
            a.data_addr,
            a.status_log_addr,
            a.error_log_addr,
            start,
            a.trailer_addr,
            a.params_addr,
        ] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&0i32.to_le_bytes());
        out.extend_from_slice(&0i32.to_le_bytes());
        out.extend_from_slice(&start.to_le_bytes());
        out.resize(out.len() + 72, 0);
        if revision.at_least(66) {
            out.extend_from_slice(&a.instrument_type.to_le_bytes());
        }
    } else {
        out.resize(out.len() + LEGACY_GAP, 0);
        for (tag, len) in header.sample_tags.iter().zip(LEGACY_TAG_BYTES) {
            let mut field: Vec<u8> = tag.encode_utf16().flat_map(u16::to_le_bytes).collect();
            field.resize(len, 0);
            out.extend_from_slice(&field);
        }
        out.resize(out.len() + LEGACY_FILE_NAMES * FILE_NAME_BYTES + 16, 0);
        out.extend_from_slice(&(a.trailer_addr as u32).to_le_bytes());
        out.extend_from_slice(&(a.params_addr as u32).to_le_bytes());
        out.extend_from_slice(&[0u8; 8]);
        out.extend_from_slice(&a.segment_count.to_le_bytes());
        out.extend_from_slice(&[0u8; 16]);
        out.extend_from_slice(&(start as u32).to_le_bytes());
    }

    let tags: &[String] = if revision.uses_64bit_addresses() {
        &header.sample_tags
    } else {
        &[]
    };
    let empty = String::new();
    let strings = [
        &header.device_name,
        &header.model,
        &header.serial_number,
        &header.software_version,
    ]
    .into_iter()
    .chain((0..4).map(|i| tags.get(i).unwrap_or(&empty)));
    for s in strings {
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

    /// Addresses stay below `FILE_LEN` so the wide block validates.
    const FILE_LEN: usize = 64 * 1024;

    fn header(revision: Revision, start: u64) -> RunHeader {
        let sample = SampleInfo {
            dataset_id: 1,
            first_scan: 1,
            last_scan: 2_400,
            scan_index_addr_32: 40_000,
            data_addr_32: 9_000,
            status_log_addr_32: 30_000,
            error_log_addr_32: 35_000,
            max_packet: 12,
            max_ion_current: 3.5e9,
            low_mass: 100.0,
            high_mass: 1_500.0,
            start_time: 0.01,
            end_time: 60.0,
            ..Default::default()
        };
        let addresses = RunAddresses {
            scan_index_addr: 40_000,
            data_addr: 9_000,
            status_log_addr: 30_000,
            error_log_addr: 35_000,
            run_header_addr: start,
            trailer_addr: 41_000,
            params_addr: 42_000,
            segment_count: if revision.uses_64bit_addresses() { 0 } else { 1 },
            instrument_type: if revision.at_least(66) { 3 } else { 0 },
            ..Default::default()
        };
        RunHeader {
            sample,
            addresses,
            sample_tags: ["Plate A".into(), "".into(), "QC run".into()],
            device_name: "Orbitrap".into(),
            model: "Exploris 480".into(),
            serial_number: "SN-0042".into(),
            software_version: "4.1".into(),
        }
    }

    #[test]
    fn test_layouts_validate() {
        sample_schema().validate().unwrap();
        address_schema().validate().unwrap();
        assert_eq!(SampleInfo::fixed_size(Revision::new(20)).unwrap(), Some(88));
        assert_eq!(RunAddresses::fixed_size(Revision::new(24)).unwrap(), Some(56));
        assert_eq!(RunAddresses::fixed_size(Revision::new(63)).unwrap(), Some(56));
        assert_eq!(RunAddresses::fixed_size(Revision::new(64)).unwrap(), Some(144));
        assert_eq!(RunAddresses::fixed_size(Revision::new(66)).unwrap(), Some(148));
    }

    #[test]
    fn test_field_offsets() {
        let s = address_schema();
        assert_eq!(s.offset_of("trailer_addr_32", Revision::new(63)), Some(16));
        assert_eq!(s.offset_of("run_header_addr_32", Revision::new(63)), Some(52));
        assert_eq!(s.offset_of("trailer_addr_32", Revision::new(64)), None);
        assert_eq!(s.offset_of("scan_index_addr", Revision::new(64)), Some(0));
        assert_eq!(s.offset_of("run_header_addr", Revision::new(64)), Some(32));
        assert_eq!(s.offset_of("instrument_type", Revision::new(65)), None);
        assert_eq!(s.offset_of("instrument_type", Revision::new(66)), Some(144));
        assert_eq!(sample_schema().offset_of("start_time", Revision::new(66)), Some(72));
    }

    #[test]
    fn test_legacy_addresses_widen() {
        let rev = Revision::new(50);
        let expected = header(rev, 1_024);
        let mut file = vec![0u8; 1_024];
        file.extend(encode_run_header(&expected, rev, 1_024, 0));

        let loaded = RunHeader::load(&file, 1_024, rev, ReadMode::Strict).unwrap();
        assert_eq!(loaded.bytes_consumed, (file.len() - 1_024) as u64);
        let h = loaded.value;
        assert_eq!(h, expected);
        assert_eq!(h.scan_index_addr(), 40_000);
        assert_eq!(h.addresses.run_header_addr, 1_024);
        assert_eq!(h.trailer_addr(), 41_000);
        assert_eq!(h.scan_count(), 2_400);
        assert_eq!(h.instrument_type(), 0);
    }

    #[test]
    fn test_wide_block_found_past_variable_area() {
        for rev in [64u32, 66] {
            let rev = Revision::new(rev);
            let expected = header(rev, 2_048);
            let mut file = vec![0u8; 2_048];
            file.extend(encode_run_header(&expected, rev, 2_048, 300));
            let header_end = file.len();
            file.resize(FILE_LEN, 0);

            let loaded = RunHeader::load(&file, 2_048, rev, ReadMode::Strict).unwrap();
            assert_eq!(loaded.bytes_consumed, (header_end - 2_048) as u64, "revision {}", rev);
            assert_eq!(loaded.value, expected, "revision {}", rev);
        }
    }

    #[test]
    fn test_wide_block_found_through_controller_entry() {
        let rev = Revision::new(65);
        let expected = header(rev, 4_096);
        let mut file = vec![0u8; 4_096];
        file.extend(encode_run_header(&expected, rev, 4_096, 40));
        // Writer left run_header_addr zero: block + 32 within the header.
        let run_header_addr_at = 4_096 + 88 + 40 + 32;
        file[run_header_addr_at..run_header_addr_at + 8].fill(0);
        file.resize(FILE_LEN, 0);

        let h = RunHeader::load(&file, 4_096, rev, ReadMode::Strict).unwrap().value;
        assert_eq!(h.scan_index_addr(), 40_000);
        assert_eq!(h.addresses.run_header_addr, 0);
        assert_eq!(h.params_addr(), 42_000);
        assert_eq!(h.device_name, "Orbitrap");
        assert_eq!(h.sample_tags[2], "QC run");
    }

    #[test]
    fn test_missing_block_is_unsupported() {
        let rev = Revision::new(65);
        let mut bytes = encode_run_header(&header(rev, 0), rev, 0, 0);
        bytes.truncate(88);
        bytes.resize(4_096, 0xFF);
        let err = RunHeader::load(&bytes, 0, rev, ReadMode::Strict).unwrap_err();
        assert_eq!(err.code(), "FORMAT_UNSUPPORTED");
    }
}
