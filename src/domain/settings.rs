//! Runtime settings.
//!
//! A single `Settings` value is owned by the poll loop and passed into every
//! component call. The `detection` and `synthesis` sections are persisted with
//! the cursor; `source` and `playback` always come from configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::cursor::OrderingMode;

/// Settings validation errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("Check interval must be between 1 and 10 seconds, got {0}")]
    CheckInterval(u64),

    #[error("Failure threshold must be at least 1")]
    FailureThreshold,

    #[error("Cross-fade must be between 0.0 and 1.0, got {0}")]
    CrossFade(f64),

    #[error("NFE steps must be an even number between 4 and 64, got {0}")]
    NfeSteps(u32),

    #[error("Speed must be between 0.5 and 2.0, got {0}")]
    Speed(f64),

    #[error("Playback grace period must not exceed 1000ms, got {0}")]
    GracePeriod(u64),
}

/// Chat source polling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// AnythingLLM API root, e.g. `http://localhost:3001/api`
    pub base_url: String,

    pub check_interval_secs: u64,

    pub request_timeout_secs: u64,

    /// Log per-tick fetch details at info level
    pub show_checking: bool,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001/api".to_string(),
            check_interval_secs: 5,
            request_timeout_secs: 10,
            show_checking: false,
        }
    }
}

/// Change detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    pub ordering: OrderingMode,

    /// Consecutive fetch failures before the loop shuts down
    pub failure_threshold: u32,

    /// Announce records that arrived while the process was down instead of
    /// treating the first fetch as a baseline
    pub announce_backlog: bool,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            ordering: OrderingMode::default(),
            failure_threshold: 10,
            announce_backlog: false,
        }
    }
}

/// What happens to generated audio after playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioRetention {
    /// Overwrite a single scratch file
    #[default]
    Discard,

    /// Keep every clip under `saved/`
    Keep,
}

/// Speech synthesis tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisSettings {
    pub server_url: String,

    /// Name of the selected reference voice (audio file name)
    pub reference_voice: Option<String>,

    pub remove_silence: bool,

    pub cross_fade: f64,

    pub nfe_steps: u32,

    pub speed: f64,

    pub retention: AudioRetention,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:7860/".to_string(),
            reference_voice: None,
            remove_silence: false,
            cross_fade: 0.15,
            nfe_steps: 16,
            speed: 1.0,
            retention: AudioRetention::default(),
        }
    }
}

/// How generated audio is played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerKind {
    /// Supervised child process (preemptible)
    #[default]
    Internal,

    /// Hand off to the desktop's default media player
    System,
}

/// Playback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub player: PlayerKind,

    /// Wait after a graceful terminate before force-killing
    pub grace_ms: u64,

    /// Candidate player programs, tried in order; empty means platform default
    pub commands: Vec<String>,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            player: PlayerKind::default(),
            grace_ms: 500,
            commands: Vec::new(),
        }
    }
}

/// All runtime settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub source: SourceSettings,
    pub detection: DetectionSettings,
    pub synthesis: SynthesisSettings,
    pub playback: PlaybackSettings,
}

impl SourceSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let interval = self.check_interval_secs;
        if !(1..=10).contains(&interval) {
            return Err(ConfigError::CheckInterval(interval));
        }
        Ok(())
    }
}

impl DetectionSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::FailureThreshold);
        }
        Ok(())
    }
}

impl SynthesisSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.cross_fade) {
            return Err(ConfigError::CrossFade(self.cross_fade));
        }
        if !(4..=64).contains(&self.nfe_steps) || self.nfe_steps % 2 != 0 {
            return Err(ConfigError::NfeSteps(self.nfe_steps));
        }
        if !(0.5..=2.0).contains(&self.speed) {
            return Err(ConfigError::Speed(self.speed));
        }
        Ok(())
    }
}

impl PlaybackSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grace_ms > 1000 {
            return Err(ConfigError::GracePeriod(self.grace_ms));
        }
        Ok(())
    }
}

impl Settings {
    /// Check every value against its allowed range
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.source.validate()?;
        self.detection.validate()?;
        self.synthesis.validate()?;
        self.playback.validate()
    }
}
