//! Scan events: a fixed preamble followed by count-prefixed arrays.
//!
//! ```text
//! [ScanEventPreamble]                       41 / 80 / 120 / 128 / 132 bytes
//! [u32 n][n x Reaction]                     n <= 100
//! [u32 n][n x MassRange]                    mass ranges
//! [u32 n][n x f64]                          mass calibrators
//! [u32 n][n x f64]                          source fragmentations
//! [u32 n][n x MassRange]                    source fragmentation ranges
//! [pascal string]                           name, revision 65+
//! ```

use std::sync::OnceLock;

use serde::Serialize;

use crate::error::Result;
use crate::loader::{FieldKind, FieldSpec, LayoutTable, RecordSchema, Revision, VersionedRecord};
use crate::records::reaction::{Activation, Reaction};
use crate::view::reader::RecordReader;

const MAX_REACTIONS: usize = 100;
const MAX_RANGES: usize = 10_000;

// ── Enumerations ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Polarity {
    Negative,
    Positive,
    #[default]
    Unknown,
}

impl Polarity {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Polarity::Negative,
            1 => Polarity::Positive,
            _ => Polarity::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ScanMode {
    Centroid,
    Profile,
    #[default]
    Unknown,
}

impl ScanMode {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ScanMode::Centroid,
            1 => ScanMode::Profile,
            _ => ScanMode::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Analyzer {
    Itms,
    Tqms,
    Sqms,
    Tofms,
    Ftms,
    Sector,
    Any,
    Astms,
    #[default]
    Unset,
    Unknown(u8),
}

impl Analyzer {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Analyzer::Itms,
            1 => Analyzer::Tqms,
            2 => Analyzer::Sqms,
            3 => Analyzer::Tofms,
            4 => Analyzer::Ftms,
            5 => Analyzer::Sector,
            6 => Analyzer::Any,
            7 => Analyzer::Astms,
            n => Analyzer::Unknown(n),
        }
    }
}

// ── Preamble ────────────────────────────────────────────────────────

/// Fixed head of a scan event. Only the bytes with known meaning are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanEventPreamble {
    pub polarity: Polarity,
    pub scan_mode: ScanMode,
    pub ms_order: u8,
    pub scan_type: u8,
    pub dependent: bool,
    pub ionization: u8,
    pub analyzer: Analyzer,
}

type P = FieldSpec<ScanEventPreamble>;

fn preamble_schema() -> &'static RecordSchema<ScanEventPreamble> {
    static SCHEMA: OnceLock<RecordSchema<ScanEventPreamble>> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        RecordSchema::new(
            ScanEventPreamble::NAME,
            LayoutTable::new(
                ScanEventPreamble::NAME,
                &[(65, 132), (63, 128), (62, 120), (57, 80), (0, 41)],
            ),
            vec![
                P::reserved(4),
                P::new("polarity", FieldKind::U8)
                    .store(|r, v| r.polarity = Polarity::from_code(v.as_u8().unwrap_or(u8::MAX))),
                P::new("scan_data_type", FieldKind::U8)
                    .store(|r, v| r.scan_mode = ScanMode::from_code(v.as_u8().unwrap_or(u8::MAX))),
                P::new("ms_order", FieldKind::U8).store(|r, v| r.ms_order = v.as_u8().unwrap_or_default()),
                P::new("scan_type", FieldKind::U8).store(|r, v| r.scan_type = v.as_u8().unwrap_or_default()),
                P::reserved(2),
                P::new("dependent", FieldKind::U8).store(|r, v| r.dependent = v.as_bool().unwrap_or_default()),
                P::new("ionization", FieldKind::U8)
                    .store(|r, v| r.ionization = v.as_u8().unwrap_or_default()),
                P::reserved(28),
                P::new("analyzer", FieldKind::U8)
                    .store(|r, v| r.analyzer = Analyzer::from_code(v.as_u8().unwrap_or(u8::MAX))),
                P::reserved(39).since(57),
                P::reserved(40).since(62),
                P::reserved(8).since(63),
                P::reserved(4).since(65),
            ],
        )
    })
}

impl VersionedRecord for ScanEventPreamble {
    const NAME: &'static str = "ScanEventPreamble";

    fn layouts() -> Option<&'static LayoutTable> {
        Some(preamble_schema().layouts())
    }

    fn decode(reader: &mut RecordReader<'_>, revision: Revision) -> Result<Self> {
        preamble_schema().decode(reader, revision)
    }
}

// ── MassRange ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MassRange {
    pub low: f64,
    pub high: f64,
}

impl VersionedRecord for MassRange {
    const NAME: &'static str = "MassRange";

    fn layouts() -> Option<&'static LayoutTable> {
        static LAYOUTS: OnceLock<LayoutTable> = OnceLock::new();
        Some(LAYOUTS.get_or_init(|| LayoutTable::new(MassRange::NAME, &[(0, 16)])))
    }

    fn decode(reader: &mut RecordReader<'_>, _revision: Revision) -> Result<Self> {
        Ok(MassRange {
            low: reader.read_f64()?,
            high: reader.read_f64()?,
        })
    }
}

// ── ScanEvent ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanEvent {
    pub preamble: ScanEventPreamble,
    pub reactions: Vec<Reaction>,
    pub mass_ranges: Vec<MassRange>,
    pub mass_calibrators: Vec<f64>,
    pub source_fragmentations: Vec<f64>,
    pub source_fragmentation_mass_ranges: Vec<MassRange>,
    /// Empty before revision 65.
    pub name: String,
}

impl ScanEvent {
    /// Activation of the last reaction, if any.
    pub fn activation(&self) -> Option<Activation> {
        self.reactions.last().map(Reaction::activation)
    }

    /// MS order of the event (1 when the preamble has none).
    pub fn ms_level(&self) -> u8 {
        self.preamble.ms_order.max(1)
    }
}

fn read_doubles(reader: &mut RecordReader<'_>, what: &str) -> Result<Vec<f64>> {
    let n = reader.read_count(MAX_RANGES, what)?;
    (0..n).map(|_| reader.read_f64()).collect()
}

impl VersionedRecord for ScanEvent {
    const NAME: &'static str = "ScanEvent";

    fn layouts() -> Option<&'static LayoutTable> {
        None
    }

    fn decode(reader: &mut RecordReader<'_>, revision: Revision) -> Result<Self> {
        let preamble = reader.read_record::<ScanEventPreamble>(revision)?;

        let n = reader.read_count(MAX_REACTIONS, "reaction")?;
        let reactions = reader.read_records::<Reaction>(n, revision)?;

        let n = reader.read_count(MAX_RANGES, "mass range")?;
        let mass_ranges = reader.read_records::<MassRange>(n, revision)?;

        let mass_calibrators = read_doubles(reader, "mass calibrator")?;
        let source_fragmentations = read_doubles(reader, "source fragmentation")?;

        let n = reader.read_count(MAX_RANGES, "source fragmentation range")?;
        let source_fragmentation_mass_ranges = reader.read_records::<MassRange>(n, revision)?;

        let name = if revision.at_least(65) {
            reader.read_pascal_string()?
        } else {
            String::new()
        };

        Ok(ScanEvent {
            preamble,
            reactions,
            mass_ranges,
            mass_calibrators,
            source_fragmentations,
            source_fragmentation_mass_ranges,
            name,
        })
    }
}

/// Serialize a scan event at `revision` (fixtures and benches).
///
/// Unknown preamble bytes are written as zero.
pub fn encode_scan_event(event: &ScanEvent, revision: Revision) -> Result<Vec<u8>> {
    let size = preamble_schema().size_at(revision)?;
    let mut out = vec![0u8; size];
    let p = &event.preamble;
    out[4] = match p.polarity {
        Polarity::Negative => 0,
        Polarity::Positive => 1,
        Polarity::Unknown => 2,
    };
    out[5] = match p.scan_mode {
        ScanMode::Centroid => 0,
        ScanMode::Profile => 1,
        ScanMode::Unknown => 2,
    };
    out[6] = p.ms_order;
    out[7] = p.scan_type;
    out[10] = p.dependent as u8;
    out[11] = p.ionization;
    out[40] = match p.analyzer {
        Analyzer::Itms => 0,
        Analyzer::Tqms => 1,
        Analyzer::Sqms => 2,
        Analyzer::Tofms => 3,
        Analyzer::Ftms => 4,
        Analyzer::Sector => 5,
        Analyzer::Any => 6,
        Analyzer::Astms => 7,
        Analyzer::Unset => u8::MAX,
        Analyzer::Unknown(n) => n,
    };

    let rev = revision.get();
    out.extend_from_slice(&(event.reactions.len() as u32).to_le_bytes());
    for r in &event.reactions {
        for v in [r.precursor_mass, r.isolation_width, r.collision_energy] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        if rev >= 31 {
            out.extend_from_slice(&r.collision_energy_valid.to_le_bytes());
        }
        if (31..65).contains(&rev) {
            out.extend_from_slice(&[0u8; 4]);
        }
        if rev >= 65 {
            out.extend_from_slice(&(r.range_is_valid as i32).to_le_bytes());
            out.extend_from_slice(&r.first_precursor_mass.to_le_bytes());
            out.extend_from_slice(&r.last_precursor_mass.to_le_bytes());
        }
        if rev >= 66 {
            out.extend_from_slice(&r.isolation_width_offset.to_le_bytes());
        }
    }

    let ranges = |out: &mut Vec<u8>, ranges: &[MassRange]| {
        out.extend_from_slice(&(ranges.len() as u32).to_le_bytes());
        for r in ranges {
            out.extend_from_slice(&r.low.to_le_bytes());
            out.extend_from_slice(&r.high.to_le_bytes());
        }
    };
    let doubles = |out: &mut Vec<u8>, values: &[f64]| {
        out.extend_from_slice(&(values.len() as u32).to_le_bytes());
        for v in values {
            out.extend_from_slice(&v.to_le_bytes());
        }
    };
    ranges(&mut out, &event.mass_ranges);
    doubles(&mut out, &event.mass_calibrators);
    doubles(&mut out, &event.source_fragmentations);
    ranges(&mut out, &event.source_fragmentation_mass_ranges);

    if rev >= 65 {
        let units: Vec<u16> = event.name.encode_utf16().collect();
        out.extend_from_slice(&(units.len() as i32).to_le_bytes());
        for u in units {
            out.extend_from_slice(&u.to_le_bytes());
        }
    }
    Ok(out)
}
