//! Reference voices for speech synthesis.
//!
//! A reference voice is an audio clip plus a sibling `.txt` file holding the
//! exact words spoken in it, e.g. `narrator.wav` + `narrator.txt`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Audio extensions recognized as reference clips
pub const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "ogg", "flac"];

const README_NAME: &str = "README.txt";

const README_TEXT: &str = "\
Reference voices for chatvoice

Place an audio file and a transcript with the same name in this directory:

  narrator.wav   - 5 to 15 seconds of clear speech (wav, mp3, ogg or flac)
  narrator.txt   - the exact words spoken in narrator.wav

The synthesizer copies the voice characteristics of the selected clip.
Select a voice by file name with `synthesis.reference_voice` in
.chatvoice/config.yaml.
";

/// A usable reference clip with its transcript
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceVoice {
    /// Audio file name, e.g. `narrator.wav`
    pub name: String,
    pub audio_path: PathBuf,
    pub transcript_path: PathBuf,
    pub transcript: String,
}

/// Result of scanning a reference directory
#[derive(Debug, Default)]
pub struct VoiceScan {
    /// Clips with a non-empty transcript, sorted by name
    pub voices: Vec<ReferenceVoice>,

    /// Clips without a usable transcript
    pub missing_transcripts: Vec<PathBuf>,
}

fn read_transcript(audio_path: &Path) -> Option<(PathBuf, String)> {
    let transcript_path = audio_path.with_extension("txt");
    let text = std::fs::read_to_string(&transcript_path).ok()?;
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some((transcript_path, text.to_string()))
    }
}

/// Find all reference clips in `dir`
pub fn scan(dir: &Path) -> Result<VoiceScan> {
    let mut scan = VoiceScan::default();
    if !dir.is_dir() {
        return Ok(scan);
    }

    for ext in AUDIO_EXTENSIONS {
        let pattern = format!(
            "{}/*.{}",
            glob::Pattern::escape(&dir.to_string_lossy()),
            ext
        );

        for entry in glob::glob(&pattern).context("Invalid reference voice pattern")? {
            let audio_path = match entry {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!("Skipping unreadable reference entry: {}", e);
                    continue;
                }
            };

            let name = audio_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            match read_transcript(&audio_path) {
                Some((transcript_path, transcript)) => scan.voices.push(ReferenceVoice {
                    name,
                    audio_path,
                    transcript_path,
                    transcript,
                }),
                None => scan.missing_transcripts.push(audio_path),
            }
        }
    }

    scan.voices.sort_by(|a, b| a.name.cmp(&b.name));
    scan.missing_transcripts.sort();
    Ok(scan)
}

/// Resolve a reference voice by audio file name (or stem)
pub fn find(dir: &Path, name: &str) -> Result<Option<ReferenceVoice>> {
    let voices = scan(dir)?.voices;
    Ok(voices.into_iter().find(|voice| {
        voice.name == name
            || voice
                .audio_path
                .file_stem()
                .is_some_and(|stem| stem.to_string_lossy() == name)
    }))
}

/// Create `dir` and a README describing the expected layout
pub fn write_instructions(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let readme = dir.join(README_NAME);
    if !readme.exists() {
        std::fs::write(&readme, README_TEXT)
            .with_context(|| format!("Failed to write {}", readme.display()))?;
        tracing::info!("Created reference voice instructions at {}", readme.display());
    }
    Ok(readme)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path, content: &str) {
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_scan_pairs_audio_with_transcripts() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        touch(&dir.join("narrator.wav"), "RIFF");
        touch(&dir.join("narrator.txt"), "  The quick brown fox.\n");
        touch(&dir.join("alto.flac"), "fLaC");
        touch(&dir.join("alto.txt"), "Hello there.");
        touch(&dir.join("orphan.mp3"), "ID3");
        touch(&dir.join("empty.ogg"), "OggS");
        touch(&dir.join("empty.txt"), "   ");
        touch(&dir.join("notes.md"), "ignored");

        let scan = scan(dir).unwrap();

        let names: Vec<_> = scan.voices.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["alto.flac", "narrator.wav"]);
        assert_eq!(scan.voices[1].transcript, "The quick brown fox.");
        assert_eq!(scan.missing_transcripts.len(), 2);
    }

    #[test]
    fn test_scan_missing_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        let scan = scan(&temp.path().join("nope")).unwrap();
        assert!(scan.voices.is_empty());
        assert!(scan.missing_transcripts.is_empty());
    }

    #[test]
    fn test_find_by_name_or_stem() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("narrator.wav"), "RIFF");
        touch(&temp.path().join("narrator.txt"), "Hi.");

        assert!(find(temp.path(), "narrator.wav").unwrap().is_some());
        assert!(find(temp.path(), "narrator").unwrap().is_some());
        assert!(find(temp.path(), "other").unwrap().is_none());
    }

    #[test]
    fn test_write_instructions_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("reference");

        let readme = write_instructions(&dir).unwrap();
        std::fs::write(&readme, "custom").unwrap();
        write_instructions(&dir).unwrap();

        assert_eq!(std::fs::read_to_string(&readme).unwrap(), "custom");
    }
}
