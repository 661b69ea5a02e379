//! chatvoice - Speak new AnythingLLM responses with a cloned voice
//!
//! Polls the AnythingLLM chat history, detects responses that have not been
//! announced yet, synthesizes them with F5-TTS using a reference voice, and
//! plays the result.
//!
//! # Architecture
//!
//! The poll loop owns all mutable state:
//! - A persisted cursor decides which records are new
//! - Consecutive fetch failures are counted and stop the loop at a threshold
//! - At most one clip plays at a time; a new clip preempts the old one
//!
//! # Modules
//!
//! - `adapters`: External system integrations (AnythingLLM, F5-TTS)
//! - `core`: Detection, failure governor, timing estimator, cursor store, poll loop
//! - `domain`: Data structures (Record, Cursor, Settings)
//! - `playback`: Playback supervisor and artifact placement
//! - `voices`: Reference voice discovery
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Watch for new responses
//! chatvoice run --voice narrator.wav
//!
//! # Inspect the persisted cursor
//! chatvoice status
//!
//! # Forget everything seen so far
//! chatvoice reset --yes
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod playback;
pub mod voices;

// Re-export main types at crate root for convenience
pub use crate::core::{CursorStore, PollControl, PollLoop, StopReason};
pub use domain::{Cursor, OrderingMode, Record, Settings};
pub use playback::{PlayMode, PlaybackSupervisor};

pub use adapters::{AnythingLlmClient, ChatSource, F5TtsClient, Synthesizer};
