//! Configuration types for reddit-relay
//!
//! Loading configuration (files, environment, secrets) is the embedding application's job;
//! the pipeline consumes [`Config`] as a plain struct.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

const MIB: u64 = 1024 * 1024;

/// Candidate discovery settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum number of candidate posts scanned per request (default: 100)
    #[serde(default = "default_max_fetch_depth")]
    pub max_fetch_depth: usize,

    /// Posts requested per listing page (default: 100, platform maximum)
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Whether NSFW posts are eligible (default: false)
    #[serde(default)]
    pub allow_nsfw: bool,

    /// Posts scoring below this are skipped (default: no floor)
    #[serde(default = "default_min_score")]
    pub min_score: i64,

    /// Timeout for one listing request (default: 30 seconds)
    #[serde(default = "default_listing_timeout", with = "duration_serde")]
    pub listing_timeout: Duration,

    /// Retry policy for listing requests that time out or hit a server error
    /// (default: 2 retries, 1 second initial delay)
    #[serde(default = "default_listing_retry")]
    pub retry: RetryConfig,

    /// Base URL of the discussion platform (default: "https://www.reddit.com")
    #[serde(default = "default_reddit_base_url")]
    pub reddit_base_url: String,

    /// User agent sent with every platform request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_fetch_depth: default_max_fetch_depth(),
            page_size: default_page_size(),
            allow_nsfw: false,
            min_score: default_min_score(),
            listing_timeout: default_listing_timeout(),
            retry: default_listing_retry(),
            reddit_base_url: default_reddit_base_url(),
            user_agent: default_user_agent(),
        }
    }
}

/// How many images of a gallery post are resolved
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GalleryMode {
    /// As many images as the remaining quota allows (default)
    #[default]
    Quota,
    /// Only the first image
    First,
}

/// Media resolution settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Largest asset that may be handed to delivery (default: 50 MiB)
    #[serde(default = "default_size_ceiling")]
    pub per_asset_size_ceiling: u64,

    /// Raw downloads larger than this are abandoned before compression (default: 100 MiB)
    #[serde(default = "default_max_download_size")]
    pub max_download_size: u64,

    /// Number of re-encode attempts for oversized videos (default: 3)
    #[serde(default = "default_max_resolution_attempts")]
    pub max_resolution_attempts: u32,

    /// Candidates resolved in parallel within one request (default: 3)
    #[serde(default = "default_resolve_concurrency")]
    pub resolve_concurrency: usize,

    /// Wall-clock budget for resolving one post (default: 300 seconds)
    #[serde(default = "default_resolve_timeout", with = "duration_serde")]
    pub resolve_timeout: Duration,

    /// Highest video resolution requested from the downloader tool (default: 720)
    #[serde(default = "default_max_video_height")]
    pub max_video_height: u32,

    /// Gallery selection policy
    #[serde(default)]
    pub gallery_mode: GalleryMode,

    /// Parent directory for request workspaces (default: system temp dir)
    #[serde(default = "std::env::temp_dir")]
    pub temp_dir: PathBuf,

    /// Convert animated GIFs to MP4 before delivery (default: true)
    #[serde(default = "default_true")]
    pub convert_gifs: bool,

    /// Streamable video API base URL
    #[serde(default = "default_streamable_api_url")]
    pub streamable_api_url: String,

    /// Redgifs API base URL
    #[serde(default = "default_redgifs_api_url")]
    pub redgifs_api_url: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            per_asset_size_ceiling: default_size_ceiling(),
            max_download_size: default_max_download_size(),
            max_resolution_attempts: default_max_resolution_attempts(),
            resolve_concurrency: default_resolve_concurrency(),
            resolve_timeout: default_resolve_timeout(),
            max_video_height: default_max_video_height(),
            gallery_mode: GalleryMode::default(),
            temp_dir: std::env::temp_dir(),
            convert_gifs: true,
            streamable_api_url: default_streamable_api_url(),
            redgifs_api_url: default_redgifs_api_url(),
        }
    }
}

/// Retry configuration for transient listing and delivery failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Delivery settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Retry policy for rate limits and transient failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Images up to this size are sent as native photos (default: 10 MiB)
    #[serde(default = "default_photo_max_bytes")]
    pub photo_max_bytes: u64,

    /// Videos up to this size are sent inline; larger files go as documents (default: 50 MiB)
    #[serde(default = "default_inline_media_max_bytes")]
    pub inline_media_max_bytes: u64,

    /// Timeout for one send call (default: 120 seconds)
    #[serde(default = "default_send_timeout", with = "duration_serde")]
    pub send_timeout: Duration,

    /// Captions are truncated to this many characters (default: 1024)
    #[serde(default = "default_caption_max_chars")]
    pub caption_max_chars: usize,

    /// Telegram Bot API base URL
    #[serde(default = "default_telegram_api_url")]
    pub telegram_api_url: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            photo_max_bytes: default_photo_max_bytes(),
            inline_media_max_bytes: default_inline_media_max_bytes(),
            send_timeout: default_send_timeout(),
            caption_max_chars: default_caption_max_chars(),
            telegram_api_url: default_telegram_api_url(),
        }
    }
}

/// Comment excerpt settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommentConfig {
    /// Number of top comments attached when `-c` is given (default: 3)
    #[serde(default = "default_top_comment_count")]
    pub top_comment_count: usize,

    /// Timeout for the comment request (default: 15 seconds)
    #[serde(default = "default_comment_timeout", with = "duration_serde")]
    pub fetch_timeout: Duration,

    /// Comments containing any of these (case-insensitive) are skipped
    #[serde(default = "default_blocked_substrings")]
    pub blocked_substrings: Vec<String>,
}

impl Default for CommentConfig {
    fn default() -> Self {
        Self {
            top_comment_count: default_top_comment_count(),
            fetch_timeout: default_comment_timeout(),
            blocked_substrings: default_blocked_substrings(),
        }
    }
}

/// External tool paths (yt-dlp, ffmpeg)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    /// Path to ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Whether to search PATH for external binaries if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            ffmpeg_path: None,
            search_path: true,
        }
    }
}

/// Main configuration for the relay pipeline
///
/// Fields are organized into sub-configs, one per pipeline component:
/// - [`fetch`](FetchConfig): candidate discovery and filtering
/// - [`media`](MediaConfig): resolution, size ceiling, compression, concurrency
/// - [`delivery`](DeliveryConfig): send strategy thresholds and retry policy
/// - [`comments`](CommentConfig): comment excerpts
/// - [`tools`](ToolsConfig): external binaries
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Candidate discovery
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Media resolution
    #[serde(default)]
    pub media: MediaConfig,

    /// Delivery
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Comment excerpts
    #[serde(default)]
    pub comments: CommentConfig,

    /// External binaries
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Config {
    /// Check settings that would make the pipeline misbehave
    pub fn validate(&self) -> Result<()> {
        if self.fetch.max_fetch_depth == 0 {
            return Err(config_error("must be at least 1", "fetch.max_fetch_depth"));
        }
        if !(1..=100).contains(&self.fetch.page_size) {
            return Err(config_error("must be between 1 and 100", "fetch.page_size"));
        }
        if self.media.resolve_concurrency == 0 {
            return Err(config_error(
                "must be at least 1",
                "media.resolve_concurrency",
            ));
        }
        if self.media.per_asset_size_ceiling == 0 {
            return Err(config_error(
                "must be greater than zero",
                "media.per_asset_size_ceiling",
            ));
        }
        if self.media.max_download_size < self.media.per_asset_size_ceiling {
            return Err(config_error(
                "must not be smaller than media.per_asset_size_ceiling",
                "media.max_download_size",
            ));
        }
        if self.fetch.retry.backoff_multiplier < 1.0 {
            return Err(config_error(
                "must be at least 1.0",
                "fetch.retry.backoff_multiplier",
            ));
        }
        if self.delivery.retry.backoff_multiplier < 1.0 {
            return Err(config_error(
                "must be at least 1.0",
                "delivery.retry.backoff_multiplier",
            ));
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: format!("{key} {message}"),
        key: Some(key.to_string()),
    }
}

fn default_max_fetch_depth() -> usize {
    100
}

fn default_page_size() -> usize {
    100
}

fn default_min_score() -> i64 {
    i64::MIN
}

fn default_listing_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_reddit_base_url() -> String {
    "https://www.reddit.com".to_string()
}

fn default_user_agent() -> String {
    concat!("reddit-relay/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_size_ceiling() -> u64 {
    50 * MIB
}

fn default_max_download_size() -> u64 {
    100 * MIB
}

fn default_listing_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        max_delay: Duration::from_secs(10),
        ..RetryConfig::default()
    }
}

fn default_max_resolution_attempts() -> u32 {
    3
}

fn default_resolve_concurrency() -> usize {
    3
}

fn default_resolve_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_max_video_height() -> u32 {
    720
}

fn default_streamable_api_url() -> String {
    "https://api.streamable.com".to_string()
}

fn default_redgifs_api_url() -> String {
    "https://api.redgifs.com".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_photo_max_bytes() -> u64 {
    10 * MIB
}

fn default_inline_media_max_bytes() -> u64 {
    50 * MIB
}

fn default_send_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_caption_max_chars() -> usize {
    1024
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_top_comment_count() -> usize {
    3
}

fn default_comment_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_blocked_substrings() -> Vec<String> {
    [
        "http", "www", ".com", "[deleted]", "[removed]", "u/", "sauce", "source", "![gif]",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_true() -> bool {
    true
}

// Durations are stored as whole seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
