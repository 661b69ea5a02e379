//! The poll loop: fetch, detect, synthesize, play, persist.
//!
//! The loop owns the only authoritative copy of the settings and the cursor.
//! Other tasks steer it through a [`PollControl`] (commands over an mpsc
//! channel) and observe it through a [`LoopSnapshot`] published on a watch
//! channel. Commands are applied between ticks and cut the inter-tick sleep
//! short.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::{ChatSource, SynthesisRequest, Synthesizer};
use crate::config::paths;
use crate::domain::{AudioRetention, Cursor, Settings};
use crate::playback::{place_artifact, ArtifactPaths, PlayMode, PlaybackSupervisor};
use crate::voices::{self, ReferenceVoice};

use super::cursor_store::CursorStore;
use super::detector::{detect_new, NewResponse};
use super::estimator::{estimate_accuracy, TimingEstimator};
use super::governor::FailureGovernor;

/// Externally visible loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Paused,
    Stopped,
}

/// Why the loop exited
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Explicit stop command
    Requested,

    /// Too many consecutive fetch failures
    FailureThreshold { consecutive: u32 },
}

impl StopReason {
    /// Whether the process should exit with a failure status
    pub fn is_failure(&self) -> bool {
        matches!(self, StopReason::FailureThreshold { .. })
    }
}

/// Commands accepted by a running loop
#[derive(Debug, Clone)]
pub enum PollCommand {
    Pause,
    Resume,
    ResetCursor,
    Stop,
    UpdateSettings(Box<Settings>),
}

/// Read-only view of the loop, refreshed after every tick and command
#[derive(Debug, Clone)]
pub struct LoopSnapshot {
    pub state: LoopState,
    pub first_run: bool,
    pub highest_sequence_id: i64,
    pub latest_timestamp: String,
    pub seen_count: usize,
    pub consecutive_failures: u32,
    pub timing_samples: usize,
    pub settings: Settings,
}

/// Outcome of a single tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Paused; nothing fetched
    Paused,

    /// First run: cursor moved to the batch maxima, nothing announced
    Baseline,

    /// Fetched, nothing new
    Idle,

    /// This many new responses were announced
    Notified(usize),

    /// Fetch failed; `tripped` means the loop must stop
    FetchFailed { consecutive: u32, tripped: bool },
}

/// Handle for steering a running loop
#[derive(Debug, Clone)]
pub struct PollControl {
    commands: mpsc::UnboundedSender<PollCommand>,
    snapshot: watch::Receiver<LoopSnapshot>,
}

impl PollControl {
    fn send(&self, command: PollCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn pause(&self) -> bool {
        self.send(PollCommand::Pause)
    }

    pub fn resume(&self) -> bool {
        self.send(PollCommand::Resume)
    }

    /// Forget everything seen; the next tick re-baselines
    pub fn reset_cursor(&self) -> bool {
        self.send(PollCommand::ResetCursor)
    }

    pub fn stop(&self) -> bool {
        self.send(PollCommand::Stop)
    }

    pub fn update_settings(&self, settings: Settings) -> bool {
        self.send(PollCommand::UpdateSettings(Box::new(settings)))
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> LoopSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that is notified on every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<LoopSnapshot> {
        self.snapshot.clone()
    }
}

/// Polls the chat source and announces new responses
pub struct PollLoop {
    settings: Settings,
    cursor: Cursor,
    first_run: bool,
    state: LoopState,
    governor: FailureGovernor,
    estimator: TimingEstimator,
    store: CursorStore,
    source: Arc<dyn ChatSource>,
    synthesizer: Arc<dyn Synthesizer>,
    supervisor: Arc<PlaybackSupervisor>,
    voices_dir: PathBuf,
    voice: Option<ReferenceVoice>,
    artifacts: ArtifactPaths,
    /// Synthesizer output played in place because it could not be copied
    stray_clip: Option<PathBuf>,
    commands: mpsc::UnboundedReceiver<PollCommand>,
    command_tx: mpsc::UnboundedSender<PollCommand>,
    snapshot_tx: watch::Sender<LoopSnapshot>,
    snapshot_rx: watch::Receiver<LoopSnapshot>,
    exited: bool,
}

impl PollLoop {
    /// Create a loop over `cursor` and fully resolved `settings`.
    ///
    /// Clips, reference voices and the scratch playback file live next to the
    /// store's state file.
    pub fn new(
        settings: Settings,
        cursor: Cursor,
        store: CursorStore,
        source: Arc<dyn ChatSource>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        let home = match store.path().parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let first_run = !(settings.detection.announce_backlog && !cursor.is_empty());
        let governor = FailureGovernor::new(settings.detection.failure_threshold);
        let supervisor = Arc::new(PlaybackSupervisor::new(&settings.playback));
        let voices_dir = home.join(paths::REFERENCE_DIR);
        let voice = resolve_voice(&voices_dir, &settings);

        let (command_tx, commands) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(LoopSnapshot {
            state: LoopState::Running,
            first_run,
            highest_sequence_id: cursor.highest_sequence_id,
            latest_timestamp: cursor.latest_timestamp.clone(),
            seen_count: cursor.seen.len(),
            consecutive_failures: 0,
            timing_samples: 0,
            settings: settings.clone(),
        });

        Self {
            settings,
            cursor,
            first_run,
            state: LoopState::Running,
            governor,
            estimator: TimingEstimator::new(),
            store,
            source,
            synthesizer,
            supervisor,
            voices_dir,
            voice,
            artifacts: ArtifactPaths::under(&home),
            stray_clip: None,
            commands,
            command_tx,
            snapshot_tx,
            snapshot_rx,
            exited: false,
        }
    }

    pub fn control(&self) -> PollControl {
        PollControl {
            commands: self.command_tx.clone(),
            snapshot: self.snapshot_rx.clone(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn is_first_run(&self) -> bool {
        self.first_run
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(LoopSnapshot {
            state: self.state,
            first_run: self.first_run,
            highest_sequence_id: self.cursor.highest_sequence_id,
            latest_timestamp: self.cursor.latest_timestamp.clone(),
            seen_count: self.cursor.seen.len(),
            consecutive_failures: self.governor.consecutive(),
            timing_samples: self.estimator.len(),
            settings: self.settings.clone(),
        });
    }

    /// Write cursor + settings; failures leave in-memory state authoritative
    fn persist(&self) {
        if let Err(e) = self.store.save(&self.cursor, &self.settings) {
            error!("Failed to save state: {}", e);
        }
    }

    /// Run one fetch/detect/announce cycle
    #[instrument(skip(self), fields(source = %self.source.name()))]
    pub async fn tick(&mut self) -> TickOutcome {
        if self.state == LoopState::Paused {
            return TickOutcome::Paused;
        }

        if self.settings.source.show_checking {
            info!("Checking for new responses...");
        }

        let records = match self.source.fetch_batch().await {
            Ok(records) => {
                self.governor.on_success();
                records
            }
            Err(e) => {
                let tripped = self.governor.on_failure();
                let consecutive = self.governor.consecutive();
                if tripped {
                    error!(
                        "Error fetching responses ({}/{}), giving up: {:#}",
                        consecutive,
                        self.governor.threshold(),
                        e
                    );
                } else {
                    warn!(
                        "Error fetching responses ({}/{}): {:#}",
                        consecutive,
                        self.governor.threshold(),
                        e
                    );
                }
                self.publish();
                return TickOutcome::FetchFailed {
                    consecutive,
                    tripped,
                };
            }
        };

        if self.settings.source.show_checking {
            info!("Fetched {} chats", records.len());
        }

        let first_run = self.first_run;
        let detection = detect_new(
            &records,
            &self.cursor,
            self.settings.detection.ordering,
            first_run,
        );

        if !detection.malformed.is_empty() {
            debug!("{} malformed record(s) skipped", detection.malformed.len());
        }

        self.cursor = detection.cursor;

        if first_run {
            self.first_run = false;
            info!(
                "Baseline established at chat ID {} ({} chats); waiting for new responses",
                self.cursor.highest_sequence_id,
                records.len()
            );
            self.publish();
            return TickOutcome::Baseline;
        }

        if detection.new_records.is_empty() {
            debug!("No new responses");
            self.publish();
            return TickOutcome::Idle;
        }

        let count = detection.new_records.len();
        info!("Found {} new response(s)", count);
        for response in &detection.new_records {
            self.notify(response).await;
        }

        self.persist();
        self.publish();
        TickOutcome::Notified(count)
    }

    /// Announce one response: synthesize it and hand the clip to playback.
    ///
    /// Failures are logged and never retried.
    pub async fn notify(&mut self, response: &NewResponse) {
        let record = &response.record;
        info!(
            "New response #{} in {} ({}): {}",
            record.sequence_id,
            record.source_name(),
            record.created_at,
            preview(&record.prompt)
        );

        if response.text.trim().is_empty() {
            debug!("Response {} has no text to speak", record.identity());
            return;
        }

        let Some(voice) = self.voice.clone() else {
            warn!("No reference voice selected; skipping speech for this response");
            return;
        };

        let size = response.text.chars().count();
        let estimate = self.estimator.predict(size);
        if let Some(estimate) = estimate {
            info!("Estimated synthesis time: {:.1}s", estimate);
        }

        let request = SynthesisRequest {
            text: response.text.clone(),
            voice,
            settings: self.settings.synthesis.clone(),
        };

        let started = Instant::now();
        let generated = match self.synthesizer.synthesize(&request).await {
            Ok(path) => path,
            Err(e) => {
                warn!(
                    "Speech synthesis failed for {} after {:.1}s: {:#}",
                    record.identity(),
                    started.elapsed().as_secs_f64(),
                    e
                );
                return;
            }
        };
        let actual = started.elapsed().as_secs_f64();

        info!(
            "Synthesized {} words ({} characters) in {:.1}s",
            response.text.split_whitespace().count(),
            size,
            actual
        );
        if let Some(accuracy) = estimate.and_then(|est| estimate_accuracy(est, actual)) {
            info!("Estimate accuracy: {:.1}%", accuracy);
        }
        if self.estimator.record(size, actual) {
            debug!("Recorded timing sample ({} samples)", self.estimator.len());
        }

        // The scratch playback file is reused; the live clip must stop first
        self.supervisor.stop().await;
        self.discard_stray_clip();

        let retention = self.settings.synthesis.retention;
        let placed = place_artifact(&generated, &record.prompt, retention, &self.artifacts);
        if placed != generated {
            discard_scratch(&generated);
        } else if retention == AudioRetention::Discard {
            self.stray_clip = Some(generated);
        }

        match self.supervisor.play(&placed, PlayMode::Background).await {
            Ok(handle) => debug!("Playback {} started for {}", handle.id(), record.identity()),
            Err(e) => warn!("Playback failed for {}: {}", record.identity(), e),
        }
    }

    /// Remove a clip played in place once its playback has been stopped
    fn discard_stray_clip(&mut self) {
        if let Some(path) = self.stray_clip.take() {
            discard_scratch(&path);
        }
    }

    /// Apply a command; returns a stop reason when the loop must exit
    async fn handle_command(&mut self, command: PollCommand) -> Option<StopReason> {
        match command {
            PollCommand::Pause => {
                if self.state != LoopState::Paused {
                    info!("Polling paused");
                    self.state = LoopState::Paused;
                }
            }
            PollCommand::Resume => {
                if self.state == LoopState::Paused {
                    info!("Polling resumed");
                    self.state = LoopState::Running;
                }
            }
            PollCommand::ResetCursor => {
                self.cursor.reset();
                self.first_run = true;
                if let Err(e) = self.store.reset(&self.settings) {
                    error!("Failed to save reset state: {}", e);
                }
                info!("Cursor reset; the next check establishes a new baseline");
            }
            PollCommand::UpdateSettings(settings) => self.apply_settings(*settings).await,
            PollCommand::Stop => return Some(StopReason::Requested),
        }

        self.publish();
        None
    }

    async fn apply_settings(&mut self, settings: Settings) {
        if let Err(e) = settings.validate() {
            warn!("Rejected settings update: {}", e);
            return;
        }

        self.governor
            .set_threshold(settings.detection.failure_threshold);

        if settings.playback != self.settings.playback {
            self.supervisor.stop().await;
            self.supervisor = Arc::new(PlaybackSupervisor::new(&settings.playback));
        }

        let voice_changed =
            settings.synthesis.reference_voice != self.settings.synthesis.reference_voice;
        self.settings = settings;
        if voice_changed {
            self.voice = resolve_voice(&self.voices_dir, &self.settings);
        }

        info!("Settings updated");
        self.persist();
    }

    async fn shutdown(&mut self, reason: StopReason) -> StopReason {
        match &reason {
            StopReason::Requested => info!("Stopping"),
            StopReason::FailureThreshold { consecutive } => error!(
                "Stopping after {} consecutive fetch failures; is the server reachable?",
                consecutive
            ),
        }

        self.supervisor.stop().await;
        self.discard_stray_clip();
        self.persist();
        self.state = LoopState::Stopped;
        self.exited = true;
        self.publish();
        reason
    }

    /// Poll until stopped.
    ///
    /// State is persisted on every exit path. If the task panics, the drop
    /// guard makes a best-effort save.
    pub async fn run(mut self) -> StopReason {
        info!(
            "Monitoring {} every {}s ({} ordering)",
            self.source.name(),
            self.settings.source.check_interval_secs,
            self.settings.detection.ordering
        );
        if self.first_run {
            info!("Existing responses will be skipped");
        }

        loop {
            while let Ok(command) = self.commands.try_recv() {
                if let Some(reason) = self.handle_command(command).await {
                    return self.shutdown(reason).await;
                }
            }

            if let TickOutcome::FetchFailed {
                consecutive,
                tripped: true,
            } = self.tick().await
            {
                return self
                    .shutdown(StopReason::FailureThreshold { consecutive })
                    .await;
            }

            let interval = Duration::from_secs(self.settings.source.check_interval_secs);
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                Some(command) = self.commands.recv() => {
                    if let Some(reason) = self.handle_command(command).await {
                        return self.shutdown(reason).await;
                    }
                }
            }
        }
    }
}

impl Drop for PollLoop {
    fn drop(&mut self) {
        if !self.exited {
            error!("Poll loop exited unexpectedly; saving state");
            self.persist();
        }
    }
}

fn resolve_voice(dir: &Path, settings: &Settings) -> Option<ReferenceVoice> {
    let name = settings.synthesis.reference_voice.as_deref()?;
    match voices::find(dir, name) {
        Ok(Some(voice)) => {
            info!("Using reference voice {}", voice.name);
            Some(voice)
        }
        Ok(None) => {
            warn!(
                "Reference voice {} not found in {} (or it has no transcript)",
                name,
                dir.display()
            );
            None
        }
        Err(e) => {
            warn!("Failed to scan reference voices: {:#}", e);
            None
        }
    }
}

fn discard_scratch(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        debug!("Could not remove {}: {}", path.display(), e);
    }
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 60;
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(LIMIT).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
