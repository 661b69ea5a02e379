//! Idempotency Integration Tests
//!
//! Replaying batches against a cursor, including across a simulated restart
//! through the cursor store, must never announce a response twice.

use chatvoice::core::{detect_new, CursorStore, FailureGovernor, TimingEstimator};
use chatvoice::domain::{Cursor, OrderingMode, Record, Settings, Workspace};
use tempfile::TempDir;

fn record(id: i64, ts: &str) -> Record {
    Record {
        sequence_id: id,
        created_at: ts.to_string(),
        prompt: format!("prompt {}", id),
        response: format!(r#"{{"text": "response {}"}}"#, id),
        workspace: Workspace::default(),
    }
}

fn ids(records: &[chatvoice::core::NewResponse]) -> Vec<i64> {
    records.iter().map(|r| r.record.sequence_id).collect()
}

#[test]
fn test_replaying_batch_emits_nothing_new() {
    let batch = vec![
        record(5, "2024-01-01T00:00:05Z"),
        record(7, "2024-01-01T00:00:07Z"),
        record(6, "2024-01-01T00:00:06Z"),
    ];

    for mode in [OrderingMode::ById, OrderingMode::ByTimestamp, OrderingMode::ByBoth] {
        let first = detect_new(&batch, &Cursor::new(), mode, false);
        assert_eq!(first.new_records.len(), 3, "mode {}", mode);

        let second = detect_new(&batch, &first.cursor, mode, false);
        assert!(second.is_empty(), "mode {} re-emitted records", mode);
        assert_eq!(second.cursor, first.cursor);
    }
}

#[test]
fn test_out_of_order_batch_scenario() {
    let mut cursor = Cursor::new();
    cursor.advance(5, "T1");

    let batch = vec![record(5, "T1"), record(7, "T3"), record(6, "T2")];
    let detection = detect_new(&batch, &cursor, OrderingMode::ById, false);

    assert_eq!(ids(&detection.new_records), vec![7, 6]);
    assert_eq!(detection.cursor.highest_sequence_id, 7);
    assert_eq!(detection.cursor.latest_timestamp, "T3");
}

#[test]
fn test_first_run_advances_to_batch_maxima() {
    let batch = vec![record(3, "T3"), record(9, "T2"), record(4, "T8")];
    let detection = detect_new(&batch, &Cursor::new(), OrderingMode::ByBoth, true);

    assert!(detection.is_empty());
    assert_eq!(detection.cursor.highest_sequence_id, 9);
    assert_eq!(detection.cursor.latest_timestamp, "T8");
    assert!(detection.cursor.seen.is_empty());
}

#[test]
fn test_by_id_never_emits_old_ids_regardless_of_timestamp() {
    let mut cursor = Cursor::new();
    cursor.advance(10, "T1");

    let batch = vec![record(10, "T9"), record(2, "T9")];
    let detection = detect_new(&batch, &cursor, OrderingMode::ById, false);
    assert!(detection.is_empty());
}

#[test]
fn test_by_both_emits_when_either_check_is_new() {
    let mut cursor = Cursor::new();
    cursor.advance(10, "T5");

    let batch = vec![
        record(11, "T1"), // new by id only
        record(3, "T9"),  // new by timestamp only
        record(4, "T2"),  // new by neither
    ];
    let detection = detect_new(&batch, &cursor, OrderingMode::ByBoth, false);
    assert_eq!(ids(&detection.new_records), vec![11, 3]);
}

#[test]
fn test_no_duplicates_across_restart() {
    let temp = TempDir::new().unwrap();
    let store = CursorStore::new(temp.path().join("state.json"));
    let settings = Settings::default();

    let batch = vec![record(1, "T1"), record(2, "T2")];
    let detection = detect_new(&batch, &Cursor::new(), OrderingMode::ByTimestamp, false);
    assert_eq!(detection.new_records.len(), 2);
    store.save(&detection.cursor, &settings).unwrap();

    // New process: reload and see the same batch plus one new record
    let restored = store.load_cursor();
    let mut next = batch.clone();
    next.push(record(3, "T3"));
    let detection = detect_new(&next, &restored, OrderingMode::ByTimestamp, false);

    assert_eq!(ids(&detection.new_records), vec![3]);
}

#[test]
fn test_governor_trips_after_exact_threshold() {
    let mut governor = FailureGovernor::new(3);
    assert!(!governor.on_failure());
    assert!(!governor.on_failure());
    governor.on_success();
    assert!(!governor.on_failure());
    assert!(!governor.on_failure());
    assert!(governor.on_failure());
}

#[test]
fn test_estimator_documented_predictions() {
    let mut estimator = TimingEstimator::new();
    assert_eq!(estimator.predict(100), None);

    estimator.record(1000, 10.0);
    assert_eq!(estimator.predict(2000), Some(20.0));

    // Outside the recalibration band once samples exist
    assert!(!estimator.record(2000, 18.0));
    assert_eq!(estimator.len(), 1);

    for _ in 0..6 {
        assert!(estimator.record(3500, 35.0));
    }
    assert_eq!(estimator.len(), 5);
}
