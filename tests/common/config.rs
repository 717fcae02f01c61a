//! Test configuration helpers

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use reddit_relay::{Config, PipelineOrchestrator};

use super::fakes::{FakePlatform, FakeTool, RecordingChannel};

/// Configuration tuned for fast tests: tiny backoff, scratch files under `temp_dir`
pub fn test_config(temp_dir: &Path) -> Config {
    let mut config = Config::default();
    config.media.temp_dir = temp_dir.to_path_buf();
    config.media.resolve_timeout = Duration::from_secs(10);
    config.fetch.retry.initial_delay = Duration::from_millis(5);
    config.fetch.retry.jitter = false;
    config.delivery.retry.initial_delay = Duration::from_millis(5);
    config.delivery.retry.max_delay = Duration::from_millis(20);
    config.delivery.retry.jitter = false;
    config.delivery.send_timeout = Duration::from_secs(5);
    config.comments.fetch_timeout = Duration::from_millis(500);
    config
}

/// Everything a pipeline test needs to drive and inspect one orchestrator
pub struct Harness {
    /// Orchestrator under test
    pub relay: PipelineOrchestrator,
    /// Platform the orchestrator lists posts from
    pub platform: Arc<FakePlatform>,
    /// Media tool standing in for yt-dlp/ffmpeg
    pub tool: Arc<FakeTool>,
    /// Channel recording every send
    pub channel: Arc<RecordingChannel>,
}

/// Build an orchestrator over the given fakes
pub fn harness(
    config: Config,
    platform: FakePlatform,
    tool: FakeTool,
    channel: RecordingChannel,
) -> Harness {
    let platform = Arc::new(platform);
    let tool = Arc::new(tool);
    let channel = Arc::new(channel);
    let relay = PipelineOrchestrator::new(
        config,
        platform.clone(),
        tool.clone(),
        channel.clone(),
    )
    .expect("test config should be valid");

    Harness {
        relay,
        platform,
        tool,
        channel,
    }
}
