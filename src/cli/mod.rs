//! Command-line interface for chatvoice.
//!
//! Provides commands for monitoring AnythingLLM, inspecting and resetting the
//! persisted cursor, managing reference voices, and test playback.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::adapters::{AnythingLlmClient, F5TtsClient};
use crate::config::{self, paths};
use crate::core::{CursorStore, LoopState, PersistedState, PollControl, PollLoop, StopReason};
use crate::domain::{AudioRetention, OrderingMode, Settings};
use crate::playback::{PlayMode, PlaybackStatus, PlaybackSupervisor};

pub mod voices;

/// chatvoice - Speak new AnythingLLM responses with a cloned voice
#[derive(Parser, Debug)]
#[command(name = "chatvoice")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch for new responses and speak them
    Run(RunArgs),

    /// Show the persisted cursor and settings
    Status,

    /// Forget all seen responses (next run re-baselines)
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },

    /// Manage reference voices
    Voices {
        #[command(subcommand)]
        command: voices::VoicesCommands,
    },

    /// Show resolved configuration (debug)
    Config,

    /// Play an audio file through the playback supervisor
    Play {
        /// Audio file to play
        file: PathBuf,
    },
}

/// Overrides for a monitoring session; chosen values are persisted
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Seconds between checks (1-10)
    #[arg(short, long)]
    pub interval: Option<u64>,

    /// Ordering used to detect new responses: id, timestamp or both
    #[arg(short, long)]
    pub ordering: Option<OrderingMode>,

    /// Reference voice (audio file name in the reference directory)
    #[arg(short, long)]
    pub voice: Option<String>,

    /// Consecutive fetch failures before stopping
    #[arg(long)]
    pub threshold: Option<u32>,

    /// Keep every generated clip under saved/
    #[arg(long)]
    pub keep_audio: bool,

    /// Speak responses that arrived while chatvoice was not running
    #[arg(long)]
    pub announce_backlog: bool,

    /// Log every check
    #[arg(long)]
    pub show_checking: bool,

    /// AnythingLLM API key
    #[arg(long, env = "ANYTHINGLLM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
}

impl RunArgs {
    /// Layer the command-line overrides onto `settings`
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(interval) = self.interval {
            settings.source.check_interval_secs = interval;
        }
        if let Some(ordering) = self.ordering {
            settings.detection.ordering = ordering;
        }
        if let Some(voice) = &self.voice {
            settings.synthesis.reference_voice = Some(voice.clone());
        }
        if let Some(threshold) = self.threshold {
            settings.detection.failure_threshold = threshold;
        }
        if self.keep_audio {
            settings.synthesis.retention = AudioRetention::Keep;
        }
        if self.announce_backlog {
            settings.detection.announce_backlog = true;
        }
        if self.show_checking {
            settings.source.show_checking = true;
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run(args) => run_monitor(args).await,
            Commands::Status => show_status().await,
            Commands::Reset { yes } => reset_cursor(yes).await,
            Commands::Voices { command } => voices::execute(command).await,
            Commands::Config => show_config().await,
            Commands::Play { file } => play_file(&file).await,
        }
    }
}

/// Configured settings with persisted choices layered on top
fn effective_settings(store: &CursorStore) -> Result<(Settings, PersistedState)> {
    let cfg = config::config()?;
    let persisted = store.load();
    let mut settings = cfg.settings.clone();
    persisted.apply_to(&mut settings);
    Ok((settings, persisted))
}

/// Poll until stopped
async fn run_monitor(args: RunArgs) -> Result<()> {
    let cfg = config::config()?;
    paths::ensure_dirs(&cfg.home).context("Failed to create chatvoice home")?;

    let store = CursorStore::open_default()?;
    let (mut settings, persisted) = effective_settings(&store)?;
    args.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    let api_key = args
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .or_else(|| cfg.api_key());
    if api_key.is_none() {
        tracing::warn!("No AnythingLLM API key set; requests will be unauthenticated");
    }

    let source = Arc::new(AnythingLlmClient::from_settings(&settings.source, api_key)?);
    let synthesizer = Arc::new(F5TtsClient::new(&settings.synthesis.server_url)?);

    if settings.synthesis.reference_voice.is_none() {
        println!(
            "⚠️  No reference voice selected. Add one to {} and pass --voice <name>",
            paths::reference_dir()?.display()
        );
    }

    let poll_loop = PollLoop::new(settings, persisted.cursor, store, source, synthesizer);
    let control = poll_loop.control();

    println!("🎧 Monitoring AnythingLLM for new responses");
    println!("   Commands: p = pause, r = resume, reset = reset cursor, s = status, q = quit");
    println!();

    {
        let control = control.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                control.stop();
            }
        });
    }
    spawn_input_reader(control);

    let reason = tokio::spawn(poll_loop.run())
        .await
        .context("Poll loop crashed")?;

    match reason {
        StopReason::Requested => {
            println!("🛑 Stopped");
            Ok(())
        }
        StopReason::FailureThreshold { consecutive } => {
            anyhow::bail!(
                "Stopped after {} consecutive failures reaching AnythingLLM",
                consecutive
            )
        }
    }
}

/// Read interactive commands from stdin on a plain thread.
///
/// A blocking stdin read would otherwise hold up runtime shutdown.
fn spawn_input_reader(control: PollControl) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if !handle_input(&control, line.trim()) {
                break;
            }
        }
    });
}

/// Apply one interactive command; returns false once the loop is gone
fn handle_input(control: &PollControl, input: &str) -> bool {
    match input {
        "" => true,
        "p" | "pause" => control.pause(),
        "r" | "resume" => control.resume(),
        "reset" => control.reset_cursor(),
        "s" | "status" => {
            print_snapshot(control);
            true
        }
        "q" | "quit" => {
            control.stop();
            false
        }
        other => {
            println!("Unknown command: {} (p, r, reset, s, q)", other);
            true
        }
    }
}

fn print_snapshot(control: &PollControl) {
    let snapshot = control.snapshot();
    let state = match snapshot.state {
        LoopState::Running if snapshot.first_run => "running (establishing baseline)",
        LoopState::Running => "running",
        LoopState::Paused => "paused",
        LoopState::Stopped => "stopped",
    };

    println!();
    println!("State:           {}", state);
    println!("Highest chat ID: {}", snapshot.highest_sequence_id);
    println!("Latest created:  {}", display_or_none(&snapshot.latest_timestamp));
    println!("Seen responses:  {}", snapshot.seen_count);
    println!(
        "Failures:        {}/{}",
        snapshot.consecutive_failures, snapshot.settings.detection.failure_threshold
    );
    println!("Timing samples:  {}", snapshot.timing_samples);
    println!();
}

fn display_or_none(value: &str) -> &str {
    if value.is_empty() {
        "(none)"
    } else {
        value
    }
}

/// Show the persisted cursor and settings
async fn show_status() -> Result<()> {
    let store = CursorStore::open_default()?;
    let (settings, state) = effective_settings(&store)?;
    let cursor = &state.cursor;

    println!();
    println!("chatvoice status");
    println!("══════════════════════════════════════════════════════════════");
    println!();
    println!("State file:      {}", store.path().display());
    if let Some(updated) = state.last_updated {
        println!("Last updated:    {}", updated.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!();
    println!("Cursor:");
    println!("  Highest chat ID: {}", cursor.highest_sequence_id);
    println!("  Latest created:  {}", display_or_none(&cursor.latest_timestamp));
    println!("  Seen responses:  {}", cursor.seen.len());
    println!();
    print_settings(&settings);

    Ok(())
}

fn print_settings(settings: &Settings) {
    println!("Detection:");
    println!("  Ordering:          {}", settings.detection.ordering);
    println!("  Failure threshold: {}", settings.detection.failure_threshold);
    println!("  Announce backlog:  {}", settings.detection.announce_backlog);
    println!();
    println!("Synthesis:");
    println!("  Server:          {}", settings.synthesis.server_url);
    println!(
        "  Reference voice: {}",
        settings
            .synthesis
            .reference_voice
            .as_deref()
            .unwrap_or("(not chosen)")
    );
    println!("  Remove silence:  {}", settings.synthesis.remove_silence);
    println!("  Cross-fade:      {}", settings.synthesis.cross_fade);
    println!("  NFE steps:       {}", settings.synthesis.nfe_steps);
    println!("  Speed:           {}", settings.synthesis.speed);
    println!("  Retention:       {:?}", settings.synthesis.retention);
    println!();
}

/// Explicitly clear the cursor
async fn reset_cursor(yes: bool) -> Result<()> {
    if !yes {
        anyhow::bail!("Refusing to reset without --yes; every response will be treated as unseen");
    }

    let store = CursorStore::open_default()?;
    let (settings, state) = effective_settings(&store)?;
    store.reset(&settings).context("Failed to reset state")?;

    println!(
        "✅ Cursor reset ({} seen responses forgotten)",
        state.cursor.seen.len()
    );
    Ok(())
}

/// Show resolved configuration
async fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("  chatvoice Configuration");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:             {}", cfg.home.display());
    println!("  State:            {}", paths::state_file()?.display());
    println!("  Reference voices: {}", paths::reference_dir()?.display());
    println!("  Saved clips:      {}", paths::saved_dir()?.display());
    println!();
    println!("Source:");
    println!("  Base URL:        {}", cfg.settings.source.base_url);
    println!(
        "  API key:         {}",
        if cfg.api_key().is_some() { "set" } else { "(not set)" }
    );
    println!("  Check interval:  {}s", cfg.settings.source.check_interval_secs);
    println!("  Request timeout: {}s", cfg.settings.source.request_timeout_secs);
    println!();
    print_settings(&cfg.settings);
    println!("Playback:");
    println!("  Player:   {:?}", cfg.settings.playback.player);
    println!("  Grace:    {}ms", cfg.settings.playback.grace_ms);
    if !cfg.settings.playback.commands.is_empty() {
        println!("  Commands: {}", cfg.settings.playback.commands.join(", "));
    }

    Ok(())
}

/// Play a file and wait; Ctrl+C stops it
async fn play_file(file: &Path) -> Result<()> {
    let cfg = config::config()?;
    let supervisor = PlaybackSupervisor::new(&cfg.settings.playback);

    let mut handle = supervisor.play(file, PlayMode::Background).await?;
    println!("▶️  Playing {}", file.display());

    let status = tokio::select! {
        status = handle.wait() => status,
        _ = tokio::signal::ctrl_c() => {
            supervisor.stop().await;
            PlaybackStatus::Preempted
        }
    };

    match status {
        PlaybackStatus::Failed(reason) => anyhow::bail!("Playback failed: {}", reason),
        PlaybackStatus::Preempted => println!("⏹️  Stopped"),
        _ => println!("✅ Done"),
    }
    Ok(())
}
