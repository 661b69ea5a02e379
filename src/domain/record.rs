//! Chat records as returned by the chat-history endpoint.
//!
//! A record is immutable once fetched. Its identity (`group:sequence`) is what
//! the change detector uses for replay protection.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while reading a record's response payload
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Malformed response payload for {identity}: {source}")]
    MalformedPayload {
        identity: RecordIdentity,
        #[source]
        source: serde_json::Error,
    },
}

/// Workspace the chat turn belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    #[serde(default = "default_workspace_slug")]
    pub slug: String,

    #[serde(default = "default_workspace_name")]
    pub name: String,
}

fn default_workspace_slug() -> String {
    "unknown".to_string()
}

fn default_workspace_name() -> String {
    "Unknown Workspace".to_string()
}

impl Default for Workspace {
    fn default() -> Self {
        Self {
            slug: default_workspace_slug(),
            name: default_workspace_name(),
        }
    }
}

/// One chat turn (prompt + model response)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Monotonic chat ID assigned by the server
    #[serde(rename = "id", default)]
    pub sequence_id: i64,

    /// ISO 8601 creation time; compared lexicographically
    #[serde(rename = "createdAt", default)]
    pub created_at: String,

    /// The user's prompt
    #[serde(default)]
    pub prompt: String,

    /// JSON-encoded response payload (`{"text": "..."}`)
    #[serde(default = "default_payload")]
    pub response: String,

    #[serde(default)]
    pub workspace: Workspace,
}

fn default_payload() -> String {
    "{}".to_string()
}

/// Decoded response payload
#[derive(Debug, Deserialize)]
struct ResponsePayload {
    #[serde(default)]
    text: String,
}

impl Record {
    /// Key for grouping related chats (the workspace slug)
    pub fn group_key(&self) -> &str {
        &self.workspace.slug
    }

    /// Human-readable name of the source workspace
    pub fn source_name(&self) -> &str {
        &self.workspace.name
    }

    /// Identity used for set-membership dedup
    pub fn identity(&self) -> RecordIdentity {
        RecordIdentity::new(self.group_key(), self.sequence_id)
    }

    /// Parse the response payload and return the text to be spoken
    pub fn response_text(&self) -> Result<String, RecordError> {
        serde_json::from_str::<ResponsePayload>(&self.response)
            .map(|payload| payload.text)
            .map_err(|source| RecordError::MalformedPayload {
                identity: self.identity(),
                source,
            })
    }
}

/// `group_key:sequence_id`, unique per logical chat turn
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordIdentity(String);

impl RecordIdentity {
    pub fn new(group_key: &str, sequence_id: i64) -> Self {
        Self(format!("{}:{}", group_key, sequence_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse a `{ "chats": [...] }` response body.
///
/// Entries that fail to decode are skipped individually; the count of skipped
/// entries is returned alongside the records.
pub fn parse_chat_batch(body: &serde_json::Value) -> (Vec<Record>, usize) {
    let Some(chats) = body.get("chats").and_then(|c| c.as_array()) else {
        return (Vec::new(), 0);
    };

    let mut records = Vec::with_capacity(chats.len());
    let mut skipped = 0;

    for chat in chats {
        match serde_json::from_value::<Record>(chat.clone()) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!("Skipping undecodable chat entry: {}", e);
                skipped += 1;
            }
        }
    }

    (records, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity_format() {
        let record: Record = serde_json::from_value(json!({
            "id": 42,
            "workspace": { "slug": "research", "name": "Research" }
        }))
        .unwrap();

        assert_eq!(record.identity().as_str(), "research:42");
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let record: Record = serde_json::from_value(json!({})).unwrap();

        assert_eq!(record.sequence_id, 0);
        assert_eq!(record.created_at, "");
        assert_eq!(record.response, "{}");
        assert_eq!(record.group_key(), "unknown");
        assert_eq!(record.response_text().unwrap(), "");
    }

    #[test]
    fn test_response_text_parsing() {
        let record: Record = serde_json::from_value(json!({
            "id": 1,
            "response": "{\"text\":\"Hello there\",\"sources\":[]}"
        }))
        .unwrap();

        assert_eq!(record.response_text().unwrap(), "Hello there");
    }

    #[test]
    fn test_malformed_payload() {
        let record: Record = serde_json::from_value(json!({
            "id": 3,
            "response": "not json"
        }))
        .unwrap();

        let err = record.response_text().unwrap_err();
        assert!(err.to_string().contains("unknown:3"));
    }

    #[test]
    fn test_parse_batch_skips_bad_entries() {
        let body = json!({
            "chats": [
                { "id": 1, "createdAt": "2024-01-01T00:00:00Z" },
                { "id": "not-a-number" },
                { "id": 2, "createdAt": "2024-01-02T00:00:00Z" }
            ]
        });

        let (records, skipped) = parse_chat_batch(&body);
        assert_eq!(records.len(), 2);
        assert_eq!(skipped, 1);
        assert_eq!(records[1].sequence_id, 2);
    }

    #[test]
    fn test_parse_batch_without_chats() {
        let (records, skipped) = parse_chat_batch(&json!({ "error": "nope" }));
        assert!(records.is_empty());
        assert_eq!(skipped, 0);
    }
}
