//! Sorted, de-duplicated retention-time index over a raw entry list.

/// One index slot: a distinct time and the raw entry that carries it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexEntry {
    pub time: f64,
    pub raw_index: usize,
}

/// Ascending time index with one slot per distinct time.
///
/// Built incrementally: entries arrive in file order and are appended,
/// collapsed into an existing slot, or inserted at their sorted position.
/// The last entry of each batch is held back unless its time is past the
/// current maximum; the next batch re-evaluates it first.
#[derive(Debug, Clone)]
pub struct SortedTimeIndex {
    entries: Vec<IndexEntry>,
    tolerance: f64,
    held_back: Option<IndexEntry>,
}

impl SortedTimeIndex {
    pub fn new(tolerance: f64) -> Self {
        Self {
            entries: Vec::new(),
            tolerance: tolerance.abs(),
            held_back: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Raw index of the final entry kept out of the index, if any.
    pub fn held_back(&self) -> Option<usize> {
        self.held_back.map(|e| e.raw_index)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.held_back = None;
    }

    fn max_time(&self) -> Option<f64> {
        self.entries.last().map(|e| e.time)
    }

    fn near(&self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.tolerance
    }

    /// Place one entry. Returns false when it collapsed into an existing
    /// slot.
    fn insert(&mut self, entry: IndexEntry) -> bool {
        let Some(max) = self.max_time() else {
            self.entries.push(entry);
            return true;
        };
        if self.near(entry.time, max) {
            return false;
        }
        if entry.time > max {
            self.entries.push(entry);
            return true;
        }
        let pos = self.entries.partition_point(|e| e.time < entry.time);
        let dup_below = pos > 0 && self.near(self.entries[pos - 1].time, entry.time);
        let dup_above = pos < self.entries.len() && self.near(self.entries[pos].time, entry.time);
        if dup_below || dup_above {
            return false;
        }
        self.entries.insert(pos, entry);
        true
    }

    /// Add a batch of `(raw_index, time)` pairs in file order.
    ///
    /// Non-finite times are never indexed.
    pub fn extend<I>(&mut self, batch: I)
    where
        I: IntoIterator<Item = (usize, f64)>,
    {
        if let Some(pending) = self.held_back.take() {
            self.insert(pending);
        }
        let mut batch = batch
            .into_iter()
            .filter(|&(_, time)| time.is_finite())
            .peekable();
        while let Some((raw_index, time)) = batch.next() {
            let entry = IndexEntry { time, raw_index };
            let is_final = batch.peek().is_none();
            if is_final && self.max_time().is_some_and(|max| time <= max) {
                self.held_back = Some(entry);
            } else {
                self.insert(entry);
            }
        }
    }

    /// Raw index of the entry closest to `time`.
    ///
    /// Between two slots the query goes to the upper one at or above the
    /// midpoint. Queries outside the range clamp to the first or last.
    pub fn nearest(&self, time: f64) -> Option<usize> {
        let first = self.entries.first()?;
        let pos = self.entries.partition_point(|e| e.time < time);
        if pos == 0 {
            return Some(first.raw_index);
        }
        if pos == self.entries.len() {
            return self.entries.last().map(|e| e.raw_index);
        }
        let lo = self.entries[pos - 1];
        let hi = self.entries[pos];
        let midpoint = (lo.time + hi.time) / 2.0;
        if time >= midpoint {
            Some(hi.raw_index)
        } else {
            Some(lo.raw_index)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(times: &[f64]) -> SortedTimeIndex {
        let mut index = SortedTimeIndex::new(1e-6);
        index.extend(times.iter().copied().enumerate());
        index
    }

    fn times(index: &SortedTimeIndex) -> Vec<f64> {
        index.entries().iter().map(|e| e.time).collect()
    }

    #[test]
    fn test_collapse_and_out_of_order_insert() {
        let index = build(&[1.0, 1.0, 2.0, 1.5, 3.0]);
        assert_eq!(times(&index), vec![1.0, 1.5, 2.0, 3.0]);
        assert_eq!(index.entries()[1].raw_index, 3);
        assert_eq!(index.held_back(), None);
    }

    #[test]
    fn test_out_of_order_duplicate_not_reinserted() {
        let index = build(&[1.0, 2.0, 3.0, 2.0000001, 4.0]);
        assert_eq!(times(&index), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(index.entries()[1].raw_index, 1);
    }

    #[test]
    fn test_final_entry_held_back_until_next_batch() {
        let mut index = build(&[1.0, 2.0, 3.0, 2.5]);
        assert_eq!(times(&index), vec![1.0, 2.0, 3.0]);
        assert_eq!(index.held_back(), Some(3));

        index.extend([(4, 4.0)]);
        assert_eq!(times(&index), vec![1.0, 2.0, 2.5, 3.0, 4.0]);
        assert_eq!(index.held_back(), None);
    }

    #[test]
    fn test_final_entry_equal_to_max_is_held_back() {
        let index = build(&[1.0, 2.0, 2.0]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.held_back(), Some(2));
    }

    #[test]
    fn test_nearest_midpoint_and_clamp() {
        let index = build(&[1.0, 2.0, 4.0]);
        assert_eq!(index.nearest(0.0), Some(0));
        assert_eq!(index.nearest(1.49), Some(0));
        assert_eq!(index.nearest(1.5), Some(1));
        assert_eq!(index.nearest(2.0), Some(1));
        assert_eq!(index.nearest(2.99), Some(1));
        assert_eq!(index.nearest(3.0), Some(2));
        assert_eq!(index.nearest(100.0), Some(2));
        assert_eq!(SortedTimeIndex::new(1e-6).nearest(1.0), None);
    }

    #[test]
    fn test_non_finite_times_are_skipped() {
        let index = build(&[1.0, f64::NAN, 2.0, f64::INFINITY, 3.0]);
        assert_eq!(times(&index), vec![1.0, 2.0, 3.0]);
        assert_eq!(index.nearest(2.1), Some(2));
        assert_eq!(index.nearest(0.0), Some(0));
        assert_eq!(index.nearest(9.0), Some(4));
    }
}
