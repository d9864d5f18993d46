//! Precursor reactions attached to a scan event.
//!
//! ```text
//! revision  size  adds
//! <31       24    precursor_mass, isolation_width, collision_energy
//! 31        32    collision_energy_valid (+4 padding)
//! 65        48    range_is_valid, first/last precursor mass (padding gone)
//! 66        56    isolation_width_offset
//! ```

use std::fmt;
use std::sync::OnceLock;

use serde::Serialize;

use crate::error::Result;
use crate::loader::{FieldKind, FieldSpec, LayoutTable, RecordSchema, Revision, VersionedRecord};
use crate::view::reader::RecordReader;

/// Dissociation method, packed into bits 1-8 of `collision_energy_valid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Activation {
    Cid,
    Mpd,
    Ecd,
    Pqd,
    Etd,
    Hcd,
    Any,
    Sa,
    Ptr,
    Netd,
    Nptr,
    Uvpd,
    Eid,
    Unknown(u8),
}

impl Activation {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Activation::Cid,
            1 => Activation::Mpd,
            2 => Activation::Ecd,
            3 => Activation::Pqd,
            4 => Activation::Etd,
            5 => Activation::Hcd,
            6 => Activation::Any,
            7 => Activation::Sa,
            8 => Activation::Ptr,
            9 => Activation::Netd,
            10 => Activation::Nptr,
            11 => Activation::Uvpd,
            12 => Activation::Eid,
            n => Activation::Unknown(n),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activation::Cid => write!(f, "CID"),
            Activation::Mpd => write!(f, "MPD"),
            Activation::Ecd => write!(f, "ECD"),
            Activation::Pqd => write!(f, "PQD"),
            Activation::Etd => write!(f, "ETD"),
            Activation::Hcd => write!(f, "HCD"),
            Activation::Any => write!(f, "Any"),
            Activation::Sa => write!(f, "SA"),
            Activation::Ptr => write!(f, "PTR"),
            Activation::Netd => write!(f, "NETD"),
            Activation::Nptr => write!(f, "NPTR"),
            Activation::Uvpd => write!(f, "UVPD"),
            Activation::Eid => write!(f, "EID"),
            Activation::Unknown(n) => write!(f, "Unknown({})", n),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Reaction {
    pub precursor_mass: f64,
    pub isolation_width: f64,
    pub collision_energy: f64,
    /// Bit 0: energy valid. Bits 1-8: activation code. 1 before revision 31.
    pub collision_energy_valid: u32,
    pub range_is_valid: bool,
    pub first_precursor_mass: f64,
    pub last_precursor_mass: f64,
    pub isolation_width_offset: f64,
}

impl Reaction {
    pub fn activation(&self) -> Activation {
        Activation::from_code(((self.collision_energy_valid >> 1) & 0xFF) as u8)
    }

    pub fn energy_is_valid(&self) -> bool {
        self.collision_energy_valid & 1 == 1
    }
}

type F = FieldSpec<Reaction>;

fn schema() -> &'static RecordSchema<Reaction> {
    static SCHEMA: OnceLock<RecordSchema<Reaction>> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        RecordSchema::new(
            Reaction::NAME,
            LayoutTable::new(Reaction::NAME, &[(66, 56), (65, 48), (31, 32), (0, 24)]),
            vec![
                F::new("precursor_mass", FieldKind::F64)
                    .store(|r, v| r.precursor_mass = v.as_f64().unwrap_or_default()),
                F::new("isolation_width", FieldKind::F64)
                    .store(|r, v| r.isolation_width = v.as_f64().unwrap_or_default()),
                F::new("collision_energy", FieldKind::F64)
                    .store(|r, v| r.collision_energy = v.as_f64().unwrap_or_default()),
                F::new("collision_energy_valid", FieldKind::U32)
                    .since(31)
                    .store(|r, v| r.collision_energy_valid = v.as_u32().unwrap_or_default())
                    .default_with(|r| r.collision_energy_valid = 1),
                F::reserved(4).since(31).retired_at(65),
                F::new("range_is_valid", FieldKind::I32)
                    .since(65)
                    .store(|r, v| r.range_is_valid = v.as_i32().is_some_and(|n| n > 0)),
                F::new("first_precursor_mass", FieldKind::F64)
                    .since(65)
                    .store(|r, v| r.first_precursor_mass = v.as_f64().unwrap_or_default()),
                F::new("last_precursor_mass", FieldKind::F64)
                    .since(65)
                    .store(|r, v| r.last_precursor_mass = v.as_f64().unwrap_or_default()),
                F::new("isolation_width_offset", FieldKind::F64)
                    .since(66)
                    .store(|r, v| r.isolation_width_offset = v.as_f64().unwrap_or_default()),
            ],
        )
    })
}

impl VersionedRecord for Reaction {
    const NAME: &'static str = "Reaction";

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
    fn test_layouts_validate() {
        schema().validate().unwrap();
        assert_eq!(Reaction::fixed_size(Revision::new(30)).unwrap(), Some(24));
        assert_eq!(Reaction::fixed_size(Revision::new(64)).unwrap(), Some(32));
        assert_eq!(Reaction::fixed_size(Revision::new(65)).unwrap(), Some(48));
        assert_eq!(Reaction::fixed_size(Revision::new(66)).unwrap(), Some(56));
    }

    #[test]
    fn test_activation_bits() {
        let hcd = Reaction {
            collision_energy_valid: (5 << 1) | 1,
            ..Default::default()
        };
        assert_eq!(hcd.activation(), Activation::Hcd);
        assert!(hcd.energy_is_valid());
        assert_eq!(hcd.activation().to_string(), "HCD");

        let odd = Reaction {
            collision_energy_valid: 40 << 1,
            ..Default::default()
        };
        assert_eq!(odd.activation(), Activation::Unknown(40));
        assert!(!odd.energy_is_valid());
    }

    #[test]
    fn test_v65_range_fields() {
        let mut bytes = Vec::new();
        for v in [500.25f64, 2.0, 35.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes.extend_from_slice(&((4u32 << 1) | 1).to_le_bytes());
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&499.0f64.to_le_bytes());
        bytes.extend_from_slice(&501.5f64.to_le_bytes());

        let r = schema().decode_bytes(&bytes, Revision::new(65)).unwrap();
        assert_eq!(r.precursor_mass, 500.25);
        assert_eq!(r.activation(), Activation::Etd);
        assert!(r.range_is_valid);
        assert_eq!(r.last_precursor_mass, 501.5);
        assert_eq!(r.isolation_width_offset, 0.0);
    }
}
