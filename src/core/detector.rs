//! Incremental change detection over fetched chat batches.
//!
//! Two passes: the first computes batch extrema (used for first-run
//! baselining), the second decides novelty per record against the cursor as it
//! was before the batch arrived.

use crate::domain::{Cursor, OrderingMode, Record, RecordError, RecordIdentity};

/// A record that has not been observed before, with its decoded text
#[derive(Debug, Clone, PartialEq)]
pub struct NewResponse {
    pub record: Record,
    pub text: String,
}

/// A record whose payload could not be decoded
#[derive(Debug)]
pub struct MalformedRecord {
    pub identity: RecordIdentity,
    pub error: RecordError,
}

/// Result of running detection over one batch
#[derive(Debug)]
pub struct Detection {
    /// New records, in original batch order
    pub new_records: Vec<NewResponse>,

    /// Cursor after this batch
    pub cursor: Cursor,

    /// Records skipped because their payload was malformed
    pub malformed: Vec<MalformedRecord>,
}

impl Detection {
    pub fn is_empty(&self) -> bool {
        self.new_records.is_empty()
    }
}

/// Whether a record fails the ordering-based novelty check
fn is_stale(record: &Record, cursor: &Cursor, mode: OrderingMode) -> bool {
    let old_by_id = record.sequence_id <= cursor.highest_sequence_id;
    let old_by_time = record.created_at.as_str() <= cursor.latest_timestamp.as_str();

    match mode {
        OrderingMode::ById => old_by_id,
        OrderingMode::ByTimestamp => old_by_time,
        // Emitted when new by either criterion
        OrderingMode::ByBoth => old_by_id && old_by_time,
    }
}

/// Return the records in `records` that are new relative to `cursor`.
///
/// On a first run nothing is emitted; the cursor only absorbs the batch maxima.
pub fn detect_new(
    records: &[Record],
    cursor: &Cursor,
    mode: OrderingMode,
    first_run: bool,
) -> Detection {
    let mut batch_max_id = cursor.highest_sequence_id;
    let mut batch_max_ts = cursor.latest_timestamp.as_str();
    for record in records {
        batch_max_id = batch_max_id.max(record.sequence_id);
        if record.created_at.as_str() > batch_max_ts {
            batch_max_ts = &record.created_at;
        }
    }

    let mut updated = cursor.clone();

    if first_run {
        updated.advance(batch_max_id, batch_max_ts);
        tracing::debug!(
            "Baseline: highest chat ID {}, latest timestamp {:?}",
            updated.highest_sequence_id,
            updated.latest_timestamp
        );
        return Detection {
            new_records: Vec::new(),
            cursor: updated,
            malformed: Vec::new(),
        };
    }

    let mut new_records = Vec::new();
    let mut malformed = Vec::new();

    for record in records {
        if is_stale(record, cursor, mode) {
            continue;
        }

        let identity = record.identity();
        if updated.has_seen(&identity) {
            continue;
        }

        match record.response_text() {
            Ok(text) => {
                updated.advance(record.sequence_id, &record.created_at);
                updated.seen.insert(identity);
                new_records.push(NewResponse {
                    record: record.clone(),
                    text,
                });
            }
            Err(error) => {
                tracing::warn!("{}", error);
                malformed.push(MalformedRecord { identity, error });
            }
        }
    }

    Detection {
        new_records,
        cursor: updated,
        malformed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Workspace;

    fn record(id: i64, ts: &str) -> Record {
        Record {
            sequence_id: id,
            created_at: ts.to_string(),
            prompt: format!("prompt {}", id),
            response: format!("{{\"text\":\"reply {}\"}}", id),
            workspace: Workspace {
                slug: "ws".to_string(),
                name: "Workspace".to_string(),
            },
        }
    }

    fn cursor(id: i64, ts: &str) -> Cursor {
        Cursor {
            highest_sequence_id: id,
            latest_timestamp: ts.to_string(),
            ..Default::default()
        }
    }

    fn ids(detection: &Detection) -> Vec<i64> {
        detection
            .new_records
            .iter()
            .map(|r| r.record.sequence_id)
            .collect()
    }

    #[test]
    fn test_first_run_emits_nothing() {
        let batch = vec![record(3, "T3"), record(9, "T2"), record(4, "T9")];
        let detection = detect_new(&batch, &Cursor::new(), OrderingMode::ById, true);

        assert!(detection.is_empty());
        assert_eq!(detection.cursor.highest_sequence_id, 9);
        assert_eq!(detection.cursor.latest_timestamp, "T9");
        assert!(detection.cursor.seen.is_empty());
    }

    #[test]
    fn test_first_run_keeps_higher_cursor() {
        let batch = vec![record(3, "T3")];
        let detection = detect_new(&batch, &cursor(50, "T5"), OrderingMode::ById, true);

        assert_eq!(detection.cursor.highest_sequence_id, 50);
        assert_eq!(detection.cursor.latest_timestamp, "T5");
    }

    #[test]
    fn test_empty_batch_keeps_cursor() {
        let start = cursor(5, "T5");
        let detection = detect_new(&[], &start, OrderingMode::ByBoth, false);

        assert!(detection.is_empty());
        assert_eq!(detection.cursor, start);
    }

    #[test]
    fn test_by_id_uses_pre_batch_cursor() {
        let batch = vec![record(5, "T1"), record(7, "T3"), record(6, "T2")];
        let detection = detect_new(&batch, &cursor(5, "T1"), OrderingMode::ById, false);

        assert_eq!(ids(&detection), vec![7, 6]);
        assert_eq!(detection.cursor.highest_sequence_id, 7);
        assert_eq!(detection.cursor.latest_timestamp, "T3");
    }

    #[test]
    fn test_by_timestamp_ignores_id() {
        let batch = vec![record(1, "T9"), record(99, "T1")];
        let detection = detect_new(&batch, &cursor(50, "T5"), OrderingMode::ByTimestamp, false);

        assert_eq!(ids(&detection), vec![1]);
        // ID high-water mark does not move for a low-ID record
        assert_eq!(detection.cursor.highest_sequence_id, 50);
        assert_eq!(detection.cursor.latest_timestamp, "T9");
    }

    #[test]
    fn test_by_both_is_permissive() {
        let batch = vec![
            record(4, "T4"),  // old by both
            record(6, "T4"),  // new by id only
            record(3, "T7"),  // new by timestamp only
            record(8, "T8"),  // new by both
        ];
        let detection = detect_new(&batch, &cursor(5, "T5"), OrderingMode::ByBoth, false);

        assert_eq!(ids(&detection), vec![6, 3, 8]);
    }

    #[test]
    fn test_duplicate_identity_in_batch_emitted_once() {
        let batch = vec![record(6, "T6"), record(6, "T6")];
        let detection = detect_new(&batch, &cursor(5, "T5"), OrderingMode::ById, false);

        assert_eq!(ids(&detection), vec![6]);
    }

    #[test]
    fn test_malformed_payload_skipped_alone() {
        let mut bad = record(7, "T7");
        bad.response = "{broken".to_string();
        let batch = vec![record(6, "T6"), bad, record(8, "T8")];

        let detection = detect_new(&batch, &cursor(5, "T5"), OrderingMode::ById, false);

        assert_eq!(ids(&detection), vec![6, 8]);
        assert_eq!(detection.malformed.len(), 1);
        assert_eq!(detection.malformed[0].identity.as_str(), "ws:7");
        assert!(!detection.cursor.has_seen(&RecordIdentity::new("ws", 7)));
    }

    #[test]
    fn test_decoded_text_carried() {
        let batch = vec![record(6, "T6")];
        let detection = detect_new(&batch, &cursor(5, "T5"), OrderingMode::ById, false);

        assert_eq!(detection.new_records[0].text, "reply 6");
    }
}
