//! File format revision.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Format revision stamped once per file. Every record in the file uses
/// the layout active at this revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(u32);

impl Revision {
    /// Newest revision this crate knows layouts for.
    pub const NEWEST: Revision = Revision(66);

    /// First revision with 64-bit file addresses.
    pub const FIRST_64BIT: Revision = Revision(64);

    pub const fn new(value: u32) -> Self {
        Revision(value)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn at_least(self, value: u32) -> bool {
        self.0 >= value
    }

    pub const fn uses_64bit_addresses(self) -> bool {
        self.0 >= Self::FIRST_64BIT.0
    }

    pub const fn is_known(self) -> bool {
        self.0 <= Self::NEWEST.0
    }
}

impl From<u32> for Revision {
    fn from(value: u32) -> Self {
        Revision(value)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}
