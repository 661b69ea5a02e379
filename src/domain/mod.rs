//! Domain types for chatvoice.
//!
//! This module contains the core data structures:
//! - Record: One fetched chat turn and its identity
//! - Cursor: Persisted high-water marks and seen identities
//! - Settings: Runtime configuration owned by the poll loop

pub mod cursor;
pub mod record;
pub mod settings;

// Re-export commonly used types
pub use cursor::{Cursor, OrderingMode};
pub use record::{parse_chat_batch, Record, RecordError, RecordIdentity, Workspace};
pub use settings::{
    AudioRetention, ConfigError, DetectionSettings, PlaybackSettings, PlayerKind, Settings,
    SourceSettings, SynthesisSettings,
};
