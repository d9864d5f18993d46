//! Integration test: retention-time indexed logs.
//!
//! Validates that:
//! - File order is preserved in the raw list while the index is sorted
//!   and de-duplicated
//! - Nearest-time lookups always return a closest indexed entry
//! - A live file that grows is picked up by `refresh` with exactly the
//!   new entries, and a vanished file clears the log

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use proptest::prelude::*;
use rawcore::generic::{encode_descriptors, DataDescriptor, DataType, Value};
use rawcore::timelog::{encode_time_log, SortedTimeIndex};
use rawcore::{ReadMode, SharedTimedLog, TimedLog, ViewManager};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("rawcore=debug")
        .with_test_writer()
        .try_init();
}

fn fields() -> Vec<DataDescriptor> {
    vec![
        DataDescriptor::new("Vacuum (Torr):", DataType::Double, 8),
        DataDescriptor::new("Spray On:", DataType::OnOff, 1),
    ]
}

fn entry(time: f32, vacuum: f64) -> (f32, Vec<u8>) {
    let mut blob = vacuum.to_le_bytes().to_vec();
    blob.push(1);
    (time, blob)
}

fn write_log(path: &Path, entries: &[(f32, Vec<u8>)]) {
    std::fs::write(path, encode_time_log(&fields(), entries)).unwrap();
}

/// Append entries and bump the on-disk count, the way an instrument does.
fn append_entries(path: &Path, total: usize, extra: &[(f32, Vec<u8>)]) {
    let count_offset = encode_descriptors(&fields()).len() as u64;
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::End(0)).unwrap();
    for (time, blob) in extra {
        file.write_all(&time.to_le_bytes()).unwrap();
        file.write_all(blob).unwrap();
    }
    file.seek(SeekFrom::Start(count_offset)).unwrap();
    file.write_all(&(total as i32).to_le_bytes()).unwrap();
    file.sync_all().unwrap();
}

// ---------------------------------------------------------------------------
// Tests: Loading
// ---------------------------------------------------------------------------

#[test]
fn out_of_order_times_keep_file_order() {
    let entries: Vec<_> = [1.0f32, 1.0, 2.0, 1.5, 3.0]
        .iter()
        .enumerate()
        .map(|(i, &t)| entry(t, i as f64))
        .collect();
    let bytes = encode_time_log(&fields(), &entries);
    let log = TimedLog::load(&bytes, 0, ReadMode::Strict, 1e-6).unwrap();

    assert_eq!(log.len(), 5);
    assert_eq!(log.index_len(), 4);
    let third = log.by_raw_index(3).unwrap();
    assert_eq!(third.retention_time, 1.5);
    assert_eq!(log.field(third, "vacuum (torr)").unwrap(), Some(Value::F64(3.0)));
    assert_eq!(log.field(third, "Spray On").unwrap(), Some(Value::Bool(true)));

    // The first of the two 1.0 entries owns the slot.
    let first = log.nearest(0.9).unwrap();
    assert_eq!(log.field(first, "Vacuum (Torr)").unwrap(), Some(Value::F64(0.0)));
}

#[test]
fn log_at_nonzero_offset() {
    let mut bytes = vec![0xAA; 37];
    bytes.extend_from_slice(&encode_time_log(&fields(), &[entry(0.5, 1.0), entry(0.6, 2.0)]));
    let log = TimedLog::load(&bytes, 37, ReadMode::Strict, 1e-6).unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log.nearest(0.58).unwrap().retention_time, 0.6f32 as f64);
}

// ---------------------------------------------------------------------------
// Tests: Live refresh
// ---------------------------------------------------------------------------

#[test]
fn refresh_loads_exact_delta() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("status.log");
    let initial: Vec<_> = (0..4).map(|i| entry(i as f32, i as f64)).collect();
    write_log(&path, &initial);

    let views = ViewManager::new(&path);
    views.set_live(true);
    assert_eq!(views.read_mode(), ReadMode::PermitMissing);

    let source = views.acquire().unwrap();
    let mut log = TimedLog::load(&*source, 0, views.read_mode(), 1e-6).unwrap();
    drop(source);
    assert_eq!(log.len(), 4);

    // Nothing new yet.
    assert!(!log.refresh(&views));

    let extra: Vec<_> = (4..7).map(|i| entry(i as f32, i as f64 * 10.0)).collect();
    append_entries(&path, 7, &extra);
    assert!(log.refresh(&views));
    assert_eq!(log.len(), 7);
    assert_eq!(log.index_len(), 7);
    let last = log.nearest(100.0).unwrap();
    assert_eq!(last.retention_time, 6.0);
    assert_eq!(log.field(last, "Vacuum (Torr)").unwrap(), Some(Value::F64(60.0)));

    // Count bumped before the bytes land: only complete entries are taken.
    append_entries(&path, 9, &[entry(7.0, 70.0)]);
    assert!(log.refresh(&views));
    assert_eq!(log.len(), 8);
}

#[test]
fn refresh_after_file_removed_clears_log() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gone.log");
    write_log(&path, &[entry(1.0, 1.0), entry(2.0, 2.0)]);

    let views = ViewManager::new(&path);
    views.set_live(true);
    let source = views.acquire().unwrap();
    let mut log = TimedLog::load(&*source, 0, views.read_mode(), 1e-6).unwrap();
    drop(source);
    views.release();

    std::fs::remove_file(&path).unwrap();
    assert!(!log.refresh(&views));
    assert!(log.is_empty());
    assert!(log.nearest(1.0).is_none());
}

#[test]
fn shared_log_refreshes_under_write_lock() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shared.log");
    write_log(&path, &[entry(1.0, 1.0)]);

    let views = ViewManager::new(&path);
    views.set_live(true);
    let source = views.acquire().unwrap();
    let shared = SharedTimedLog::new(TimedLog::load(&*source, 0, views.read_mode(), 1e-6).unwrap());
    drop(source);

    append_entries(&path, 2, &[entry(2.0, 2.0)]);
    let reader = shared.clone();
    assert!(shared.refresh(&views));
    assert_eq!(reader.len(), 2);
    assert_eq!(reader.nearest(2.2).unwrap().retention_time, 2.0);
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn nearest_is_closest_indexed_time(
        times in prop::collection::vec(0u32..2_000, 1..200),
        query in -10.0f64..210.0,
    ) {
        let mut index = SortedTimeIndex::new(1e-6);
        index.extend(times.iter().map(|&t| t as f64 / 10.0).enumerate());

        let entries = index.entries();
        prop_assert!(entries.windows(2).all(|w| w[0].time < w[1].time));

        if let Some(raw) = index.nearest(query) {
            let found = times[raw] as f64 / 10.0;
            let best = entries
                .iter()
                .map(|e| (e.time - query).abs())
                .fold(f64::INFINITY, f64::min);
            prop_assert!((found - query).abs() <= best + 1e-9);
        } else {
            prop_assert!(entries.is_empty());
        }
    }

    #[test]
    fn every_time_but_held_back_is_indexed(times in prop::collection::vec(0u32..500, 1..100)) {
        let mut index = SortedTimeIndex::new(1e-6);
        index.extend(times.iter().map(|&t| t as f64).enumerate());
        let held = index.held_back();
        for (i, &t) in times.iter().enumerate() {
            if Some(i) == held {
                continue;
            }
            prop_assert!(index.entries().iter().any(|e| (e.time - t as f64).abs() <= 1e-6));
        }
    }
}
