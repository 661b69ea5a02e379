//! Single-slot audio playback supervisor.
//!
//! At most one playback is live at a time. `play` is serialized by an async
//! mutex: it takes the current handle out of the slot, stops it (graceful
//! terminate, bounded wait, force kill), and only then launches and registers
//! the next one. A handle that finishes on its own removes itself from the slot.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;

use crate::domain::{PlaybackSettings, PlayerKind};

/// Errors that can occur when starting playback
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Audio file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("No audio player available (tried: {0})")]
    NoBackend(String),

    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Whether `play` waits for the audio to finish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayMode {
    #[default]
    Background,
    Blocking,
}

/// Lifecycle of one playback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackStatus {
    Playing,
    Finished,
    Preempted,
    Failed(String),
}

impl PlaybackStatus {
    pub fn is_live(&self) -> bool {
        matches!(self, PlaybackStatus::Playing)
    }
}

/// Caller's view of a playback started by the supervisor
#[derive(Debug, Clone)]
pub struct PlaybackHandle {
    id: u64,
    path: PathBuf,
    status: watch::Receiver<PlaybackStatus>,
}

impl PlaybackHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status.borrow().clone()
    }

    pub fn is_live(&self) -> bool {
        self.status.borrow().is_live()
    }

    /// Wait until the playback leaves the `Playing` state
    pub async fn wait(&mut self) -> PlaybackStatus {
        loop {
            let current = self.status.borrow_and_update().clone();
            if !current.is_live() {
                return current;
            }
            if self.status.changed().await.is_err() {
                return self.status.borrow().clone();
            }
        }
    }
}

/// Supervisor-side record of the live playback
struct LiveSlot {
    id: u64,
    stop_tx: oneshot::Sender<()>,
    status_tx: Arc<watch::Sender<PlaybackStatus>>,
    task: JoinHandle<()>,
}

/// Owns the single live playback
pub struct PlaybackSupervisor {
    player: PlayerKind,
    commands: Vec<String>,
    grace: Duration,
    serial: Mutex<()>,
    slot: Arc<Mutex<Option<LiveSlot>>>,
    next_id: AtomicU64,
}

impl PlaybackSupervisor {
    pub fn new(settings: &PlaybackSettings) -> Self {
        let commands = if settings.commands.is_empty() {
            default_player_commands()
        } else {
            settings.commands.clone()
        };

        Self {
            player: settings.player,
            commands,
            grace: Duration::from_millis(settings.grace_ms.min(1000)),
            serial: Mutex::new(()),
            slot: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Stop whatever is playing, then start `path`
    pub async fn play(&self, path: &Path, mode: PlayMode) -> Result<PlaybackHandle, PlaybackError> {
        let _serial = self.serial.lock().await;

        self.preempt_current().await;

        if !path.exists() {
            return Err(PlaybackError::FileNotFound(path.to_path_buf()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut handle = match self.player {
            PlayerKind::System => {
                open_with_system_player(path).await?;
                let (_tx, status) = watch::channel(PlaybackStatus::Finished);
                PlaybackHandle {
                    id,
                    path: path.to_path_buf(),
                    status,
                }
            }
            PlayerKind::Internal => {
                let (program, child) = self.launch(path)?;
                tracing::debug!("Playback {} started with {}", id, program);

                let (status_tx, status) = watch::channel(PlaybackStatus::Playing);
                let status_tx = Arc::new(status_tx);
                let (stop_tx, stop_rx) = oneshot::channel();

                // Register before the supervisor can observe an early exit
                let mut slot = self.slot.lock().await;
                let task = tokio::spawn(supervise(
                    child,
                    stop_rx,
                    Arc::clone(&status_tx),
                    Arc::clone(&self.slot),
                    id,
                    self.grace,
                ));
                *slot = Some(LiveSlot {
                    id,
                    stop_tx,
                    status_tx,
                    task,
                });
                drop(slot);

                PlaybackHandle {
                    id,
                    path: path.to_path_buf(),
                    status,
                }
            }
        };

        drop(_serial);

        if mode == PlayMode::Blocking {
            handle.wait().await;
        }

        Ok(handle)
    }

    /// Stop the live playback, if any
    pub async fn stop(&self) {
        let _serial = self.serial.lock().await;
        self.preempt_current().await;
    }

    /// Whether a playback is currently live
    pub async fn is_playing(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// ID of the live playback, if any
    pub async fn current(&self) -> Option<u64> {
        self.slot.lock().await.as_ref().map(|live| live.id)
    }

    async fn preempt_current(&self) {
        let previous = self.slot.lock().await.take();
        let Some(live) = previous else {
            return;
        };

        tracing::info!("Stopping playback {} before starting the next one", live.id);

        // terminate + grace + kill, with headroom for the kill to be reaped
        let bound = self.grace * 2 + Duration::from_millis(250);
        await_stopped(live, bound).await;
    }

    fn launch(&self, path: &Path) -> Result<(String, Child), PlaybackError> {
        for program in &self.commands {
            let Some((binary, args)) = player_argv(program, path) else {
                continue;
            };

            let spawned = Command::new(binary)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn();

            match spawned {
                Ok(child) => return Ok((program.clone(), child)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => {
                    return Err(PlaybackError::Launch {
                        program: program.clone(),
                        source,
                    })
                }
            }
        }

        Err(PlaybackError::NoBackend(self.commands.join(", ")))
    }
}

/// Signal the live playback to stop and wait up to `bound` for it.
///
/// On timeout the supervising task is aborted, which drops (and kills) the
/// child, and the handle is marked preempted so it never outlives the slot.
async fn await_stopped(mut live: LiveSlot, bound: Duration) {
    let _ = live.stop_tx.send(());

    if tokio::time::timeout(bound, &mut live.task).await.is_err() {
        tracing::warn!("Playback {} did not confirm stop within {:?}", live.id, bound);
        live.task.abort();
        live.status_tx.send_replace(PlaybackStatus::Preempted);
    }
}

/// Split a player command into program and arguments for `path`.
///
/// `{file}` is replaced by the clip path; without it the path is appended as
/// the last argument. A single-quoted `'{file}'` is expanded PowerShell style,
/// with embedded quotes doubled.
fn player_argv(command: &str, path: &Path) -> Option<(String, Vec<OsString>)> {
    let mut parts = command.split_whitespace();
    let binary = parts.next()?.to_string();

    let raw = path.to_string_lossy();
    let quoted = format!("'{}'", raw.replace('\'', "''"));
    let mut substituted = false;

    let mut args: Vec<OsString> = parts
        .map(|part| {
            if part.contains(QUOTED_FILE_PLACEHOLDER) {
                substituted = true;
                OsString::from(part.replace(QUOTED_FILE_PLACEHOLDER, &quoted))
            } else if part.contains(FILE_PLACEHOLDER) {
                substituted = true;
                OsString::from(part.replace(FILE_PLACEHOLDER, &raw))
            } else {
                OsString::from(part)
            }
        })
        .collect();

    if !substituted {
        args.push(path.as_os_str().to_os_string());
    }
    Some((binary, args))
}

/// Own the child until it exits or a stop is requested
async fn supervise(
    mut child: Child,
    mut stop_rx: oneshot::Receiver<()>,
    status_tx: Arc<watch::Sender<PlaybackStatus>>,
    slot: Arc<Mutex<Option<LiveSlot>>>,
    id: u64,
    grace: Duration,
) {
    tokio::select! {
        exit = child.wait() => {
            {
                let mut guard = slot.lock().await;
                if guard.as_ref().map(|live| live.id) == Some(id) {
                    *guard = None;
                }
            }
            let status = match exit {
                Ok(code) if code.success() => PlaybackStatus::Finished,
                Ok(code) => PlaybackStatus::Failed(format!("player exited with {}", code)),
                Err(e) => PlaybackStatus::Failed(e.to_string()),
            };
            tracing::debug!("Playback {} ended: {:?}", id, status);
            status_tx.send_replace(status);
        }
        _ = &mut stop_rx => {
            terminate(&mut child, grace).await;
            status_tx.send_replace(PlaybackStatus::Preempted);
        }
    }
}

/// Graceful terminate, bounded wait, then force kill
async fn terminate(child: &mut Child, grace: Duration) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }

    #[cfg(unix)]
    if let Some(pid) = child.id() {
        let _ = Command::new("kill")
            .arg("-TERM")
            .arg(pid.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        if tokio::time::timeout(grace, child.wait()).await.is_ok() {
            return;
        }
    }

    #[cfg(not(unix))]
    let _ = grace;

    if let Err(e) = child.kill().await {
        tracing::warn!("Failed to kill audio player: {}", e);
    }
}

/// Hand the file to the desktop's default player; not supervised
async fn open_with_system_player(path: &Path) -> Result<(), PlaybackError> {
    let (program, mut command) = if cfg!(target_os = "windows") {
        let mut command = Command::new("cmd");
        command.args(["/C", "start", ""]);
        ("cmd /C start", command)
    } else if cfg!(target_os = "macos") {
        ("open", Command::new("open"))
    } else {
        ("xdg-open", Command::new("xdg-open"))
    };

    command
        .arg(path)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => PlaybackError::NoBackend(program.to_string()),
            _ => PlaybackError::Launch {
                program: program.to_string(),
                source,
            },
        })?;

    tracing::info!("Playing audio with system default media player");
    Ok(())
}

/// Placeholder for the clip path in a player command
pub const FILE_PLACEHOLDER: &str = "{file}";

const QUOTED_FILE_PLACEHOLDER: &str = "'{file}'";

/// Everything after `-Command` is joined into one script by PowerShell, so
/// the path is embedded in the script instead of passed as an argument
const WINDOWS_PLAYER: &str =
    "powershell -NoProfile -NonInteractive -Command (New-Object Media.SoundPlayer '{file}').PlaySync()";

/// Candidate players for the current platform
pub fn default_player_commands() -> Vec<String> {
    let players: &[&str] = if cfg!(target_os = "macos") {
        &["afplay"]
    } else if cfg!(target_os = "windows") {
        &[WINDOWS_PLAYER]
    } else {
        &["aplay", "paplay", "mpg123", "mpg321"]
    };
    players.iter().map(|p| p.to_string()).collect()
}
