#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bevy::time::TimeUpdateStrategy;
use hideout_core::{TrackerApp, TrackerConfig};

/// Simulated wall time per frame.
pub const FRAME: Duration = Duration::from_millis(100);
pub const SYNC_TIMEOUT: Duration = Duration::from_secs(5);

static NEXT_DIR: AtomicUsize = AtomicUsize::new(0);

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Empty storage directory unique to this test.
pub fn scratch_dir(label: &str) -> PathBuf {
    let n = NEXT_DIR.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "hideout-it-{label}-{}-{n}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

pub fn test_config(storage_dir: &Path, snapshot: &str) -> Result<TrackerConfig> {
    let config = TrackerConfig::from_file(&fixture_path("test_tracker_config.json"))
        .context("loading test tracker config")?;
    Ok(config
        .with_storage_dir(storage_dir)
        .with_snapshot_path(fixture_path(snapshot)))
}

/// Boots a tracker on `storage_dir` and runs frames until hydration lands.
pub fn start_tracker(storage_dir: &Path) -> Result<TrackerApp> {
    start_tracker_with(test_config(storage_dir, "hideout_snapshot.json")?)
}

pub fn start_tracker_with(config: TrackerConfig) -> Result<TrackerApp> {
    let mut tracker = TrackerApp::from_config(Arc::new(config));
    tracker
        .app_mut()
        .insert_resource(TimeUpdateStrategy::ManualDuration(FRAME));

    for _ in 0..500 {
        tracker.update();
        if tracker.is_hydrated() {
            return Ok(tracker);
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    bail!("tracker never hydrated from {}", storage_dir_label(&tracker))
}

fn storage_dir_label(tracker: &TrackerApp) -> String {
    tracker
        .app()
        .world
        .resource::<hideout_core::TrackerConfigHandle>()
        .config()
        .storage_dir()
        .display()
        .to_string()
}

pub fn advance(tracker: &mut TrackerApp, frames: usize) {
    for _ in 0..frames {
        tracker.update();
    }
}

/// Runs frames until the debounce window has certainly elapsed, then waits
/// for the writer thread.
pub fn settle(tracker: &mut TrackerApp) -> Result<()> {
    advance(tracker, 5);
    if !tracker.sync_storage(SYNC_TIMEOUT) {
        bail!("storage writer did not settle");
    }
    Ok(())
}
