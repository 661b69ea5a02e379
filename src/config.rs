//! Configuration for chatvoice.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (CHATVOICE_HOME, ANYTHINGLLM_BASE_URL, ANYTHINGLLM_API_KEY)
//! 2. Config file (.chatvoice/config.yaml)
//! 3. Defaults (~/.chatvoice)
//!
//! Settings chosen interactively are persisted with the cursor and layered on
//! top of these by the caller (see `CursorStore`).
//!
//! Config file discovery:
//! - Searches current directory and parents for .chatvoice/config.yaml
//! - `paths.home` in the config file is relative to the .chatvoice directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::domain::{DetectionSettings, PlaybackSettings, Settings, SourceSettings, SynthesisSettings};

pub mod paths;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub source: Option<SourceConfig>,
    #[serde(default)]
    pub detection: Option<DetectionSettings>,
    #[serde(default)]
    pub synthesis: Option<SynthesisSettings>,
    #[serde(default)]
    pub playback: Option<PlaybackSettings>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to the .chatvoice directory)
    pub home: Option<String>,
}

/// Source section: polling settings plus the credential
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(flatten)]
    pub settings: SourceSettings,
    pub api_key: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to the state directory
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Bearer credential for the chat source
    pub api_key: Option<String>,
    /// Settings before persisted overrides
    pub settings: Settings,
}

impl ResolvedConfig {
    /// API key with placeholder values treated as unset
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty() && *key != "your anythingllm api key")
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".chatvoice").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".chatvoice");

    let config_file = find_config_file();

    let (mut home, mut api_key, mut settings) = (default_home, None, Settings::default());

    if let Some(ref config_path) = config_file {
        let config = load_config_file(config_path)?;

        if let Some(ref home_path) = config.paths.home {
            let config_dir = config_path.parent().unwrap_or(Path::new("."));
            home = resolve_path(config_dir, home_path);
        }
        if let Some(source) = config.source {
            settings.source = source.settings;
            api_key = source.api_key;
        }
        if let Some(detection) = config.detection {
            settings.detection = detection;
        }
        if let Some(synthesis) = config.synthesis {
            settings.synthesis = synthesis;
        }
        if let Some(playback) = config.playback {
            settings.playback = playback;
        }
    }

    if let Ok(env_home) = std::env::var("CHATVOICE_HOME") {
        home = PathBuf::from(env_home);
    }
    if let Ok(base_url) = std::env::var("ANYTHINGLLM_BASE_URL") {
        settings.source.base_url = base_url;
    }
    if let Ok(key) = std::env::var("ANYTHINGLLM_API_KEY") {
        api_key = Some(key);
    }

    settings
        .validate()
        .context("Invalid settings in configuration")?;

    Ok(ResolvedConfig {
        home,
        config_file,
        api_key,
        settings,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
