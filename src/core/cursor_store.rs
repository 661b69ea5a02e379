//! Durable cursor + settings snapshot.
//!
//! Loading is fail-soft: a missing or unreadable file yields an empty cursor.
//! Saving writes a sibling temp file and renames it over the target while
//! holding an exclusive lock on `<file>.lock`, so a crash mid-write leaves the
//! previous state intact.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::domain::{Cursor, DetectionSettings, Settings, SynthesisSettings};

/// Current state file format version
pub const STATE_VERSION: u32 = 1;

/// Errors that can occur while persisting state
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// On-disk document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub version: u32,

    #[serde(default)]
    pub cursor: Cursor,

    /// Detection choices made interactively
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection: Option<DetectionSettings>,

    /// Synthesis tuning, including the selected reference voice
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesis: Option<SynthesisSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl PersistedState {
    /// Overlay the persisted sections onto configured settings
    ///
    /// A section with out-of-range values is ignored as a whole, so a state
    /// file edited by hand can never keep the monitor from starting.
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(detection) = &self.detection {
            match detection.validate() {
                Ok(()) => settings.detection = detection.clone(),
                Err(e) => tracing::warn!("Ignoring saved detection settings: {}", e),
            }
        }
        if let Some(synthesis) = &self.synthesis {
            match synthesis.validate() {
                Ok(()) => settings.synthesis = synthesis.clone(),
                Err(e) => tracing::warn!("Ignoring saved synthesis settings: {}", e),
            }
        }
    }
}

/// File-backed cursor store
#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default location (`$CHATVOICE_HOME/state.json`)
    pub fn open_default() -> anyhow::Result<Self> {
        Ok(Self::new(crate::config::paths::state_file()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// Load the persisted state, falling back to defaults on any error
    pub fn load(&self) -> PersistedState {
        match self.try_load() {
            Ok(Some(state)) => {
                tracing::info!(
                    "Loaded {} previously seen responses (highest chat ID {}, latest timestamp {:?})",
                    state.cursor.seen.len(),
                    state.cursor.highest_sequence_id,
                    state.cursor.latest_timestamp
                );
                state
            }
            Ok(None) => {
                tracing::debug!("No state file at {}", self.path.display());
                PersistedState::default()
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable state file: {}", e);
                PersistedState::default()
            }
        }
    }

    /// Load just the cursor (fail-soft)
    pub fn load_cursor(&self) -> Cursor {
        self.load().cursor
    }

    fn try_load(&self) -> Result<Option<PersistedState>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Atomically write the cursor and the persisted settings sections
    pub fn save(&self, cursor: &Cursor, settings: &Settings) -> Result<(), StoreError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| StoreError::Io { path, source }
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;

        let state = PersistedState {
            version: STATE_VERSION,
            cursor: cursor.clone(),
            detection: Some(settings.detection.clone()),
            synthesis: Some(settings.synthesis.clone()),
            last_updated: Some(Utc::now()),
        };
        let json = serde_json::to_string_pretty(&state)?;

        let lock_path = self.lock_path();
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(io_err(&lock_path))?;
        lock.lock_exclusive().map_err(io_err(&lock_path))?;

        let mut temp = NamedTempFile::new_in(&dir).map_err(io_err(&dir))?;
        temp.write_all(json.as_bytes()).map_err(io_err(temp.path()))?;
        temp.as_file().sync_all().map_err(io_err(temp.path()))?;
        temp.persist(&self.path)
            .map_err(|e| StoreError::Io {
                path: self.path.clone(),
                source: e.error,
            })?;

        // Lock is released when `lock` is dropped
        tracing::debug!("State saved to {}", self.path.display());
        Ok(())
    }

    /// Clear the cursor on disk, keeping persisted settings
    pub fn reset(&self, settings: &Settings) -> Result<(), StoreError> {
        self.save(&Cursor::new(), settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderingMode, RecordIdentity};
    use tempfile::TempDir;

    fn populated_cursor() -> Cursor {
        let mut cursor = Cursor::new();
        cursor.advance(12, "2024-06-01T12:00:00Z");
        cursor.seen.insert(RecordIdentity::new("ws", 12));
        cursor
    }

    #[test]
    fn test_missing_file_loads_default() {
        let temp = TempDir::new().unwrap();
        let store = CursorStore::new(temp.path().join("state.json"));

        let state = store.load();
        assert!(state.cursor.is_empty());
        assert!(state.detection.is_none());
    }

    #[test]
    fn test_corrupt_file_loads_default() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();

        let store = CursorStore::new(&path);
        assert_eq!(store.load_cursor(), Cursor::default());
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let store = CursorStore::new(temp.path().join("nested").join("state.json"));

        let mut settings = Settings::default();
        settings.detection.ordering = OrderingMode::ByBoth;
        settings.synthesis.reference_voice = Some("narrator.wav".to_string());

        store.save(&populated_cursor(), &settings).unwrap();

        let state = store.load();
        assert_eq!(state.version, STATE_VERSION);
        assert_eq!(state.cursor, populated_cursor());
        assert_eq!(state.detection.unwrap().ordering, OrderingMode::ByBoth);
        assert!(state.last_updated.is_some());

        // No temp files left behind
        let leftovers: Vec<_> = fs::read_dir(temp.path().join("nested"))
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|name| name != "state.json" && name != "state.json.lock")
            .collect();
        assert!(leftovers.is_empty(), "unexpected files: {:?}", leftovers);
    }

    #[test]
    fn test_apply_to_overrides_persisted_sections_only() {
        let mut persisted = Settings::default();
        persisted.detection.failure_threshold = 3;
        persisted.synthesis.speed = 1.25;
        persisted.source.check_interval_secs = 9;

        let temp = TempDir::new().unwrap();
        let store = CursorStore::new(temp.path().join("state.json"));
        store.save(&Cursor::new(), &persisted).unwrap();

        let mut configured = Settings::default();
        store.load().apply_to(&mut configured);

        assert_eq!(configured.detection.failure_threshold, 3);
        assert_eq!(configured.synthesis.speed, 1.25);
        // Source settings always come from configuration
        assert_eq!(configured.source.check_interval_secs, 5);
    }

    #[test]
    fn test_apply_to_ignores_out_of_range_sections() {
        let temp = TempDir::new().unwrap();
        let store = CursorStore::new(temp.path().join("state.json"));
        fs::write(
            store.path(),
            r#"{
                "version": 1,
                "cursor": {"highest_sequence_id": 4, "latest_timestamp": "T4", "seen": []},
                "detection": {"ordering": "id", "failure_threshold": 3},
                "synthesis": {"nfe_steps": 15, "speed": 1.25}
            }"#,
        )
        .unwrap();

        let mut configured = Settings::default();
        let persisted = store.load();
        persisted.apply_to(&mut configured);

        assert_eq!(persisted.cursor.highest_sequence_id, 4);
        assert_eq!(configured.detection.failure_threshold, 3);
        assert_eq!(configured.synthesis, SynthesisSettings::default());
        assert!(configured.validate().is_ok());
    }

    #[test]
    fn test_reset_clears_cursor() {
        let temp = TempDir::new().unwrap();
        let store = CursorStore::new(temp.path().join("state.json"));
        let settings = Settings::default();

        store.save(&populated_cursor(), &settings).unwrap();
        store.reset(&settings).unwrap();

        assert!(store.load_cursor().is_empty());
    }

    #[test]
    fn test_api_key_never_persisted() {
        let temp = TempDir::new().unwrap();
        let store = CursorStore::new(temp.path().join("state.json"));
        store.save(&Cursor::new(), &Settings::default()).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("api_key"));
        assert!(!raw.contains("base_url"));
    }
}
