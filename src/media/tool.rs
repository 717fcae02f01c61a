//! External media tools (yt-dlp, ffmpeg)

use crate::config::ToolsConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Limits handed to the stream downloader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadLimits {
    /// Abort downloads larger than this many bytes
    pub max_size: u64,
    /// Highest vertical resolution to select
    pub max_height: u32,
    /// Wall-clock budget for the tool invocation
    pub timeout: Duration,
}

/// H.264/AAC encoder settings for one compression attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeProfile {
    /// Constant rate factor (higher is smaller)
    pub crf: u8,
    /// Output width cap in pixels; aspect ratio is preserved
    pub max_width: u32,
    /// Audio bitrate in kbit/s
    pub audio_kbps: u32,
    /// Video bitrate cap in kbit/s, if any
    pub max_kbps: Option<u32>,
}

impl EncodeProfile {
    /// Settings for the given 0-based attempt; each attempt is more aggressive
    pub fn for_attempt(attempt: u32) -> Self {
        let step = attempt.min(u8::MAX as u32) as u8;
        Self {
            crf: 28u8.saturating_add(step).min(32),
            max_width: 1280,
            audio_kbps: 96,
            max_kbps: (attempt > 0)
                .then(|| 2500u32.saturating_sub(attempt.saturating_mul(300)).max(1500)),
        }
    }
}

/// Black-box downloader/transcoder
///
/// Implementations must stop any child process when the returned future is dropped, so
/// that cancelling a request never leaves a subprocess behind.
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Download the best stream of `url` within `limits` into `dest_dir`
    ///
    /// Returns the path of the produced file, which lives inside `dest_dir`.
    async fn download_best(&self, url: &str, dest_dir: &Path, limits: &DownloadLimits)
    -> Result<PathBuf>;

    /// Re-encode `input` into `output` (MP4) with the given profile
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        profile: &EncodeProfile,
        timeout: Duration,
    ) -> Result<()>;

    /// Convert an animated image into an MP4 video
    async fn convert_animation(&self, input: &Path, output: &Path, timeout: Duration) -> Result<()>;

    /// Name of the implementation
    fn name(&self) -> &'static str;
}

/// [`MediaTool`] backed by the `yt-dlp` and `ffmpeg` binaries
///
/// # Examples
///
/// ```no_run
/// use reddit_relay::config::ToolsConfig;
/// use reddit_relay::media::CliMediaTool;
///
/// let tool = CliMediaTool::from_config(&ToolsConfig::default());
/// if !tool.has_downloader() {
///     eprintln!("yt-dlp not found, hosted videos will use their direct fallback");
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CliMediaTool {
    ytdlp_path: Option<PathBuf>,
    ffmpeg_path: Option<PathBuf>,
}

impl CliMediaTool {
    /// Create a tool with explicit binary paths
    pub fn new(ytdlp_path: Option<PathBuf>, ffmpeg_path: Option<PathBuf>) -> Self {
        Self {
            ytdlp_path,
            ffmpeg_path,
        }
    }

    /// Resolve binaries from configuration, falling back to a PATH search when allowed
    pub fn from_config(config: &ToolsConfig) -> Self {
        let locate = |explicit: &Option<PathBuf>, name: &str| {
            explicit
                .clone()
                .or_else(|| config.search_path.then(|| which::which(name).ok()).flatten())
        };
        let tool = Self::new(
            locate(&config.ytdlp_path, "yt-dlp"),
            locate(&config.ffmpeg_path, "ffmpeg"),
        );
        tracing::debug!(
            ytdlp = ?tool.ytdlp_path,
            ffmpeg = ?tool.ffmpeg_path,
            "media tools located"
        );
        tool
    }

    /// Whether a yt-dlp binary is available
    pub fn has_downloader(&self) -> bool {
        self.ytdlp_path.is_some()
    }

    /// Whether an ffmpeg binary is available
    pub fn has_encoder(&self) -> bool {
        self.ffmpeg_path.is_some()
    }

    fn ytdlp(&self) -> Result<&Path> {
        self.ytdlp_path
            .as_deref()
            .ok_or_else(|| Error::ExternalTool("yt-dlp binary not found".into()))
    }

    fn ffmpeg(&self) -> Result<&Path> {
        self.ffmpeg_path
            .as_deref()
            .ok_or_else(|| Error::ExternalTool("ffmpeg binary not found".into()))
    }
}

/// Run a binary to completion within `timeout`; the child is killed if the future is dropped
async fn run(
    binary: &Path,
    args: Vec<OsString>,
    timeout: Duration,
    operation: &'static str,
) -> Result<Output> {
    let tool = binary
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| binary.display().to_string());
    tracing::debug!(tool = %tool, ?args, "running external tool");

    let child = Command::new(binary)
        .args(&args)
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(timeout, child)
        .await
        .map_err(|_| Error::Timeout { operation, timeout })?
        .map_err(|e| Error::ExternalTool(format!("Failed to execute {}: {}", tool, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let last_line = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
        return Err(Error::ExternalTool(format!(
            "{} exited with {}: {}",
            tool, output.status, last_line
        )));
    }
    Ok(output)
}

/// Find the file a downloader produced in an otherwise empty directory
async fn produced_file(dir: &Path, stdout: &[u8]) -> Result<PathBuf> {
    let printed = String::from_utf8_lossy(stdout);
    if let Some(line) = printed.lines().rev().map(str::trim).find(|l| !l.is_empty()) {
        let candidate = PathBuf::from(line);
        if candidate.starts_with(dir) && tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return Ok(candidate);
        }
    }

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let partial = path
            .extension()
            .is_some_and(|ext| ext == "part" || ext == "ytdl");
        if entry.file_type().await?.is_file() && !partial {
            return Ok(path);
        }
    }
    Err(Error::ExternalTool("yt-dlp produced no file".into()))
}

#[async_trait]
impl MediaTool for CliMediaTool {
    async fn download_best(
        &self,
        url: &str,
        dest_dir: &Path,
        limits: &DownloadLimits,
    ) -> Result<PathBuf> {
        let height = limits.max_height;
        let format = format!("bv*[height<={height}]+ba/b[height<={height}]/bv*+ba/b");
        let template = dest_dir.join("%(id)s.%(ext)s");
        let args: Vec<OsString> = vec![
            "--no-playlist".into(),
            "--no-progress".into(),
            "--no-part".into(),
            "-f".into(),
            format.into(),
            "--max-filesize".into(),
            limits.max_size.to_string().into(),
            "--merge-output-format".into(),
            "mp4".into(),
            "-o".into(),
            template.into_os_string(),
            "--print".into(),
            "after_move:filepath".into(),
            url.into(),
        ];

        let output = run(self.ytdlp()?, args, limits.timeout, "yt-dlp download").await?;
        produced_file(dest_dir, &output.stdout).await
    }

    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        profile: &EncodeProfile,
        timeout: Duration,
    ) -> Result<()> {
        let mut args: Vec<OsString> = vec![
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            input.into(),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "veryfast".into(),
            "-crf".into(),
            profile.crf.to_string().into(),
            "-vf".into(),
            format!("scale='min({},iw)':-2", profile.max_width).into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
        ];
        if let Some(kbps) = profile.max_kbps {
            args.extend([
                "-maxrate".into(),
                format!("{kbps}k").into(),
                "-bufsize".into(),
                format!("{}k", kbps * 2).into(),
            ]);
        }
        args.extend([
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            format!("{}k", profile.audio_kbps).into(),
            "-movflags".into(),
            "+faststart".into(),
            output.into(),
        ]);

        run(self.ffmpeg()?, args, timeout, "ffmpeg transcode").await?;
        Ok(())
    }

    async fn convert_animation(
        &self,
        input: &Path,
        output: &Path,
        timeout: Duration,
    ) -> Result<()> {
        let args: Vec<OsString> = vec![
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            input.into(),
            "-movflags".into(),
            "+faststart".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-preset".into(),
            "ultrafast".into(),
            "-vf".into(),
            "scale=trunc(iw/2)*2:trunc(ih/2)*2".into(),
            "-f".into(),
            "mp4".into(),
            output.into(),
        ];

        run(self.ffmpeg()?, args, timeout, "ffmpeg convert").await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "cli-ytdlp-ffmpeg"
    }
}
