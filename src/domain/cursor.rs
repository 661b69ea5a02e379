//! High-water-mark state used to decide whether a record is new.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::record::RecordIdentity;

/// Strategy used to decide whether a record has been seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderingMode {
    /// Higher chat ID than the last seen
    #[serde(rename = "id")]
    ById,

    /// Newer creation timestamp than the last seen
    #[default]
    #[serde(rename = "timestamp")]
    ByTimestamp,

    /// New by either ID or timestamp
    #[serde(rename = "both")]
    ByBoth,
}

impl fmt::Display for OrderingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderingMode::ById => write!(f, "id"),
            OrderingMode::ByTimestamp => write!(f, "timestamp"),
            OrderingMode::ByBoth => write!(f, "both"),
        }
    }
}

impl FromStr for OrderingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "id" => Ok(OrderingMode::ById),
            "timestamp" => Ok(OrderingMode::ByTimestamp),
            "both" => Ok(OrderingMode::ByBoth),
            other => Err(format!("Unknown ordering mode: {}", other)),
        }
    }
}

/// Persisted novelty state.
///
/// `highest_sequence_id` and `latest_timestamp` never regress and `seen` only
/// grows, except through [`Cursor::reset`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(default)]
    pub highest_sequence_id: i64,

    #[serde(default)]
    pub latest_timestamp: String,

    #[serde(default)]
    pub seen: BTreeSet<RecordIdentity>,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the high-water marks if the given values exceed them
    pub fn advance(&mut self, sequence_id: i64, timestamp: &str) {
        if sequence_id > self.highest_sequence_id {
            self.highest_sequence_id = sequence_id;
        }
        if timestamp > self.latest_timestamp.as_str() {
            self.latest_timestamp = timestamp.to_string();
        }
    }

    pub fn has_seen(&self, identity: &RecordIdentity) -> bool {
        self.seen.contains(identity)
    }

    /// Whether nothing has been observed yet
    pub fn is_empty(&self) -> bool {
        self.highest_sequence_id == 0 && self.latest_timestamp.is_empty() && self.seen.is_empty()
    }

    /// Forget everything. Only ever triggered by an explicit user action.
    pub fn reset(&mut self) {
        self.highest_sequence_id = 0;
        self.latest_timestamp.clear();
        self.seen.clear();
    }
}
