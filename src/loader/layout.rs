//! Per-record layout tables.
//!
//! ```text
//! min_revision   size
//! 66             56      <- first entry with min <= file revision wins
//! 65             48
//! 31             32
//! 0              24
//! ```

use crate::error::{RawError, Result};
use crate::loader::revision::Revision;

/// One historical layout: active from `min_revision` (inclusive) until
/// the next newer entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub min_revision: u32,
    pub size: usize,
}

#[derive(Debug, Clone)]
pub struct LayoutTable {
    record: &'static str,
    /// Descending by `min_revision`.
    entries: Vec<Layout>,
    newest: Revision,
}

impl LayoutTable {
    /// Entries may be given in any order; they are kept descending.
    pub fn new(record: &'static str, entries: &[(u32, usize)]) -> Self {
        let mut entries: Vec<Layout> = entries
            .iter()
            .map(|&(min_revision, size)| Layout { min_revision, size })
            .collect();
        entries.sort_by(|a, b| b.min_revision.cmp(&a.min_revision));
        entries.dedup_by_key(|l| l.min_revision);
        Self {
            record,
            entries,
            newest: Revision::NEWEST,
        }
    }

    /// Override the newest supported revision (tests, future formats).
    pub fn with_newest(mut self, newest: Revision) -> Self {
        self.newest = newest;
        self
    }

    pub fn record(&self) -> &'static str {
        self.record
    }

    pub fn entries(&self) -> &[Layout] {
        &self.entries
    }

    /// Position of the active layout in `entries()`.
    pub fn select_index(&self, revision: Revision) -> Result<usize> {
        if revision > self.newest {
            return Err(RawError::unsupported(
                self.record,
                revision.get(),
                format!("newer than newest known revision {}", self.newest.get()),
            ));
        }
        self.entries
            .iter()
            .position(|l| l.min_revision <= revision.get())
            .ok_or_else(|| {
                let oldest = self.entries.last().map(|l| l.min_revision).unwrap_or(0);
                RawError::unsupported(
                    self.record,
                    revision.get(),
                    format!("older than oldest layout (revision {})", oldest),
                )
            })
    }

    pub fn select(&self, revision: Revision) -> Result<Layout> {
        self.select_index(revision).map(|i| self.entries[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_matching_threshold_wins() {
        let table = LayoutTable::new("Sample", &[(0, 10), (3, 14), (6, 20)]);
        assert_eq!(table.select(Revision::new(0)).unwrap().size, 10);
        assert_eq!(table.select(Revision::new(2)).unwrap().size, 10);
        assert_eq!(table.select(Revision::new(3)).unwrap().size, 14);
        assert_eq!(table.select(Revision::new(4)).unwrap().size, 14);
        assert_eq!(table.select(Revision::new(6)).unwrap().size, 20);
        assert_eq!(table.select(Revision::NEWEST).unwrap().size, 20);
    }

    #[test]
    fn test_out_of_range_revisions() {
        let table = LayoutTable::new("Sample", &[(31, 32), (65, 48)]);
        let err = table.select(Revision::new(30)).unwrap_err();
        assert_eq!(err.code(), "FORMAT_UNSUPPORTED");
        assert!(err.to_string().contains("Sample"));

        let err = table.select(Revision::new(67)).unwrap_err();
        assert!(err.to_string().contains("67"));

        let relaxed = table.with_newest(Revision::new(70));
        assert_eq!(relaxed.select(Revision::new(67)).unwrap().size, 48);
    }
}
