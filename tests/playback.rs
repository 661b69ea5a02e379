//! Playback Supervisor Integration Tests
//!
//! Uses small shell scripts as stand-in audio players so preemption can be
//! observed without an audio device.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chatvoice::domain::{PlaybackSettings, PlayerKind};
use chatvoice::playback::{PlayMode, PlaybackStatus, PlaybackSupervisor};
use tempfile::TempDir;

/// Write an executable player script that ignores its file argument
fn player_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn clip(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"RIFF").unwrap();
    path
}

fn supervisor(player: &Path, grace_ms: u64) -> PlaybackSupervisor {
    PlaybackSupervisor::new(&PlaybackSettings {
        player: PlayerKind::Internal,
        grace_ms,
        commands: vec![player.display().to_string()],
    })
}

#[tokio::test]
async fn test_second_play_preempts_first() {
    let temp = TempDir::new().unwrap();
    let player = player_script(temp.path(), "slow_player", "sleep 5");
    let supervisor = supervisor(&player, 300);

    let a = clip(temp.path(), "a.wav");
    let b = clip(temp.path(), "b.wav");

    let mut first = supervisor.play(&a, PlayMode::Background).await.unwrap();
    assert!(first.is_live());
    assert_eq!(supervisor.current().await, Some(first.id()));

    let second = supervisor.play(&b, PlayMode::Background).await.unwrap();

    // The first handle left "live" before the second was registered
    assert!(!first.is_live());
    assert_eq!(first.wait().await, PlaybackStatus::Preempted);
    assert!(second.is_live());
    assert_eq!(supervisor.current().await, Some(second.id()));

    supervisor.stop().await;
}

#[tokio::test]
async fn test_concurrent_plays_leave_one_live_handle() {
    let temp = TempDir::new().unwrap();
    let player = player_script(temp.path(), "slow_player", "sleep 5");
    let supervisor = Arc::new(supervisor(&player, 200));

    let mut tasks = Vec::new();
    for i in 0..4 {
        let supervisor = Arc::clone(&supervisor);
        let path = clip(temp.path(), &format!("clip_{}.wav", i));
        tasks.push(tokio::spawn(async move {
            supervisor.play(&path, PlayMode::Background).await.unwrap()
        }));
    }

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap());
    }

    let live: Vec<_> = handles.iter().filter(|h| h.is_live()).collect();
    assert_eq!(live.len(), 1);
    assert_eq!(supervisor.current().await, Some(live[0].id()));

    supervisor.stop().await;
    assert!(!supervisor.is_playing().await);
}

#[tokio::test]
async fn test_stop_escalates_when_player_ignores_terminate() {
    let temp = TempDir::new().unwrap();
    let player = player_script(temp.path(), "stubborn_player", "trap '' TERM\nsleep 5");
    let supervisor = supervisor(&player, 200);
    let path = clip(temp.path(), "a.wav");

    let mut handle = supervisor.play(&path, PlayMode::Background).await.unwrap();
    // Give the shell time to install the trap
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    supervisor.stop().await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(handle.wait().await, PlaybackStatus::Preempted);
    assert!(!supervisor.is_playing().await);
}

#[tokio::test]
async fn test_blocking_play_waits_for_finish() {
    let temp = TempDir::new().unwrap();
    let player = player_script(temp.path(), "quick_player", "sleep 0.2");
    let supervisor = supervisor(&player, 200);
    let path = clip(temp.path(), "a.wav");

    let started = Instant::now();
    let handle = supervisor.play(&path, PlayMode::Blocking).await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(handle.status(), PlaybackStatus::Finished);
    assert!(!supervisor.is_playing().await);
}

#[tokio::test]
async fn test_failed_player_reported_on_handle() {
    let temp = TempDir::new().unwrap();
    let player = player_script(temp.path(), "broken_player", "exit 3");
    let supervisor = supervisor(&player, 200);
    let path = clip(temp.path(), "a.wav");

    let mut handle = supervisor.play(&path, PlayMode::Background).await.unwrap();

    match handle.wait().await {
        PlaybackStatus::Failed(reason) => assert!(reason.contains('3')),
        other => panic!("Expected failure, got {:?}", other),
    }
    assert!(!supervisor.is_playing().await);
}
