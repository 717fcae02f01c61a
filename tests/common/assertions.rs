//! Custom test assertions for pipeline tests

use reddit_relay::{Event, Stage};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use walkdir::WalkDir;

/// Everything below `root`, excluding `root` itself
pub fn leftover_entries(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.into_path())
        .collect()
}

/// Assert that no request left files or directories behind under `root`
pub fn assert_no_leftovers(root: &Path) {
    let leftovers = leftover_entries(root);
    assert!(leftovers.is_empty(), "temporary files left behind: {leftovers:?}");
}

/// Drain every event currently buffered in `events`
pub fn drain(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

/// Stages in the order they were entered
pub fn stages(events: &[Event]) -> Vec<Stage> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::StageChanged { stage, .. } => Some(*stage),
            _ => None,
        })
        .collect()
}
