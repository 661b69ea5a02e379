//! Audio playback.
//!
//! - `supervisor`: single-slot, preempting playback of generated clips
//! - `artifact`: where a generated clip is copied before it is played

pub mod artifact;
pub mod supervisor;

pub use artifact::{artifact_slug, place_artifact, ArtifactPaths};
pub use supervisor::{
    default_player_commands, PlayMode, PlaybackError, PlaybackHandle, PlaybackStatus,
    PlaybackSupervisor,
};
