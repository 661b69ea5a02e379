//! Canonical paths for chatvoice state.
//!
//! Single source of truth - import this instead of hardcoding paths.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chatvoice::config::paths;
//!
//! let state = paths::state_file()?;
//! let voices = paths::reference_dir()?;
//! ```
//!
//! ## Layout
//!
//! | Location | Purpose |
//! |----------|---------|
//! | `state.json` | Cursor and persisted settings |
//! | `reference/` | Reference voice clips with `.txt` transcripts |
//! | `saved/` | Clips kept under the `keep` retention policy |
//! | `anything_tts.wav` | Scratch clip overwritten for every response |

use std::path::{Path, PathBuf};

use anyhow::Result;

// ============================================================================
// File names (relative to the app home)
// ============================================================================

/// Persisted cursor and settings
pub const STATE_FILE: &str = "state.json";

/// Reference voice directory
pub const REFERENCE_DIR: &str = "reference";

/// Kept clips directory
pub const SAVED_DIR: &str = "saved";

/// Scratch playback clip
pub const PLAYBACK_FILE: &str = "anything_tts.wav";

/// Scratch clip used when `PLAYBACK_FILE` is not writable
pub const ALT_PLAYBACK_FILE: &str = "anything_tts02.wav";

// ============================================================================
// Resolved paths (functions - resolved at runtime)
// ============================================================================

/// Get the app home directory (~/.chatvoice or CHATVOICE_HOME)
pub fn app_home() -> Result<PathBuf> {
    Ok(crate::config::config()?.home.clone())
}

/// Get the state file path (~/.chatvoice/state.json)
pub fn state_file() -> Result<PathBuf> {
    Ok(app_home()?.join(STATE_FILE))
}

/// Get the reference voice directory (~/.chatvoice/reference/)
pub fn reference_dir() -> Result<PathBuf> {
    Ok(app_home()?.join(REFERENCE_DIR))
}

/// Get the kept clips directory (~/.chatvoice/saved/)
pub fn saved_dir() -> Result<PathBuf> {
    Ok(app_home()?.join(SAVED_DIR))
}

/// Scratch playback files under `home` (primary, alternate)
pub fn playback_files(home: &Path) -> (PathBuf, PathBuf) {
    (home.join(PLAYBACK_FILE), home.join(ALT_PLAYBACK_FILE))
}

/// Create the app home and its subdirectories if missing
pub fn ensure_dirs(home: &Path) -> Result<()> {
    std::fs::create_dir_all(home.join(REFERENCE_DIR))?;
    std::fs::create_dir_all(home.join(SAVED_DIR))?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_playback_files_are_siblings() {
        let (primary, alternate) = playback_files(Path::new("/data/.chatvoice"));
        assert_eq!(primary, PathBuf::from("/data/.chatvoice/anything_tts.wav"));
        assert_eq!(alternate, PathBuf::from("/data/.chatvoice/anything_tts02.wav"));
    }

    #[test]
    fn test_ensure_dirs_creates_layout() {
        let temp = TempDir::new().unwrap();
        let home = temp.path().join(".chatvoice");

        ensure_dirs(&home).unwrap();
        ensure_dirs(&home).unwrap();

        assert!(home.join(REFERENCE_DIR).is_dir());
        assert!(home.join(SAVED_DIR).is_dir());
    }
}
