//! Placement of generated audio before playback.
//!
//! Placement never fails: if the copy cannot be made, the synthesizer's own
//! output file is played instead.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::config::paths;
use crate::domain::AudioRetention;

/// Where generated clips go
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    /// Scratch file overwritten for every clip
    pub playback_file: PathBuf,

    /// Used when `playback_file` is not writable
    pub alt_playback_file: PathBuf,

    /// Directory for kept clips
    pub saved_dir: PathBuf,
}

impl ArtifactPaths {
    /// Layout under a single directory
    pub fn under(dir: &Path) -> Self {
        let (playback_file, alt_playback_file) = paths::playback_files(dir);
        Self {
            playback_file,
            alt_playback_file,
            saved_dir: dir.join(paths::SAVED_DIR),
        }
    }
}

/// File-name prefix derived from the prompt
pub fn artifact_slug(prompt: &str) -> String {
    let prefix: String = prompt.chars().take(30).collect();
    let cleaned: String = prefix
        .trim()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    let slug = cleaned.replace(' ', "_").to_lowercase();

    if slug.is_empty() {
        "ai_response".to_string()
    } else {
        slug
    }
}

fn copy_to(source: &Path, target: &Path) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(source, target)?;
    Ok(())
}

/// Copy to `primary`, falling back to `alternate` on permission errors
fn copy_with_fallback(source: &Path, primary: PathBuf, alternate: PathBuf) -> PathBuf {
    match copy_to(source, &primary) {
        Ok(()) => primary,
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            tracing::warn!(
                "Permission denied for {}, using {}",
                primary.display(),
                alternate.display()
            );
            match copy_to(source, &alternate) {
                Ok(()) => alternate,
                Err(e) => {
                    tracing::warn!("Error copying audio file: {}", e);
                    source.to_path_buf()
                }
            }
        }
        Err(e) => {
            tracing::warn!("Error copying audio file: {}", e);
            source.to_path_buf()
        }
    }
}

/// Place the synthesizer output according to the retention policy and return
/// the file to play
pub fn place_artifact(
    source: &Path,
    prompt: &str,
    retention: AudioRetention,
    paths: &ArtifactPaths,
) -> PathBuf {
    match retention {
        AudioRetention::Discard => copy_with_fallback(
            source,
            paths.playback_file.clone(),
            paths.alt_playback_file.clone(),
        ),
        AudioRetention::Keep => {
            let stem = format!("{}_{}", artifact_slug(prompt), Local::now().format("%Y%m%d_%H%M%S"));
            let placed = copy_with_fallback(
                source,
                paths.saved_dir.join(format!("{}.wav", stem)),
                paths.saved_dir.join(format!("{}_02.wav", stem)),
            );
            if placed.as_path() != source {
                tracing::info!("Saved audio file to: {}", placed.display());
            }
            placed
        }
    }
}
