//! Media resolution
//!
//! [`MediaResolver`] turns a post's [`MediaDescriptor`] into local, deliverable
//! [`MediaAsset`]s. Each descriptor variant has one resolution routine. Every routine
//! enforces the per-asset size ceiling, and the whole resolution runs under a wall-clock
//! budget. All files are created inside the caller's workspace directory and are removed
//! as soon as they are no longer needed, including when resolution fails, times out or
//! is cancelled.

mod download;
mod gif_host;
mod tool;

pub use tool::{CliMediaTool, DownloadLimits, EncodeProfile, MediaTool};

use crate::config::{GalleryMode, MediaConfig};
use crate::error::{Error, ResolutionFailure};
use crate::types::{GifHost, MediaAsset, MediaDescriptor, MediaKind, PostId, RawPost};
use download::{FileKind, Fetched, scratch_file};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempPath;
use tracing::{debug, info, warn};

type Resolution<T> = std::result::Result<T, ResolutionFailure>;

/// Resolves post media into local files
pub struct MediaResolver {
    config: MediaConfig,
    http_client: reqwest::Client,
    tool: Arc<dyn MediaTool>,
}

impl MediaResolver {
    /// Create a resolver
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(
        config: MediaConfig,
        user_agent: &str,
        tool: Arc<dyn MediaTool>,
    ) -> crate::Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(config.resolve_timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
            tool,
        })
    }

    /// Settings in use
    pub fn config(&self) -> &MediaConfig {
        &self.config
    }

    /// Resolve a post's media into assets stored under `workspace`
    ///
    /// Galleries yield up to `quota` assets in gallery order (or only the first image,
    /// depending on [`GalleryMode`]); every other kind yields exactly one. Every returned
    /// asset is no larger than the configured ceiling.
    pub async fn resolve(
        &self,
        post: &RawPost,
        workspace: &Path,
        quota: usize,
    ) -> Resolution<Vec<MediaAsset>> {
        let Some(media) = &post.media else {
            return Err(ResolutionFailure::unsupported("post has no media"));
        };

        let budget = self.config.resolve_timeout;
        let result = tokio::time::timeout(budget, self.dispatch(&post.id, media, workspace, quota))
            .await
            .unwrap_or(Err(ResolutionFailure::FetchTimeout {
                timeout_secs: budget.as_secs(),
            }));

        match &result {
            Ok(assets) => info!(
                post_id = %post.id,
                media = media.tag(),
                assets = assets.len(),
                bytes = assets.iter().map(|a| a.size_bytes).sum::<u64>(),
                "media resolved"
            ),
            Err(failure) => warn!(
                post_id = %post.id,
                media = media.tag(),
                code = failure.code(),
                error = %failure,
                "media resolution failed"
            ),
        }
        result
    }

    async fn dispatch(
        &self,
        post_id: &PostId,
        media: &MediaDescriptor,
        workspace: &Path,
        quota: usize,
    ) -> Resolution<Vec<MediaAsset>> {
        match media {
            MediaDescriptor::DirectImage { url } => {
                Ok(vec![self.resolve_direct(post_id, url, workspace).await?])
            }
            MediaDescriptor::Gallery { urls } => {
                self.resolve_gallery(post_id, urls, workspace, quota).await
            }
            MediaDescriptor::HostedVideo { url, fallback_url } => Ok(vec![
                self.resolve_hosted_video(post_id, url, fallback_url.as_deref(), workspace)
                    .await?,
            ]),
            MediaDescriptor::ExternalGifHost { host, url } => {
                Ok(vec![self.resolve_gif_host(post_id, *host, url, workspace).await?])
            }
        }
    }

    async fn resolve_direct(
        &self,
        post_id: &PostId,
        url: &str,
        workspace: &Path,
    ) -> Resolution<MediaAsset> {
        let fetched = download::fetch(
            &self.http_client,
            url,
            workspace,
            post_id.as_str(),
            self.config.max_download_size,
        )
        .await?;
        self.normalize(post_id, fetched, workspace).await
    }

    async fn resolve_gallery(
        &self,
        post_id: &PostId,
        urls: &[String],
        workspace: &Path,
        quota: usize,
    ) -> Resolution<Vec<MediaAsset>> {
        let wanted = match self.config.gallery_mode {
            GalleryMode::Quota => quota.max(1),
            GalleryMode::First => 1,
        };

        let mut assets = Vec::new();
        let mut first_failure = None;
        for url in urls {
            if assets.len() >= wanted {
                break;
            }
            match self.resolve_direct(post_id, url, workspace).await {
                Ok(asset) => assets.push(asset),
                Err(failure) => {
                    debug!(post_id = %post_id, url, code = failure.code(), "gallery item skipped");
                    first_failure.get_or_insert(failure);
                }
            }
        }

        match (assets.is_empty(), first_failure) {
            (false, _) => Ok(assets),
            (true, Some(failure)) => Err(failure),
            (true, None) => Err(ResolutionFailure::unsupported("empty gallery")),
        }
    }

    async fn resolve_hosted_video(
        &self,
        post_id: &PostId,
        url: &str,
        fallback_url: Option<&str>,
        workspace: &Path,
    ) -> Resolution<MediaAsset> {
        let limits = DownloadLimits {
            max_size: self.config.max_download_size,
            max_height: self.config.max_video_height,
            timeout: self.config.resolve_timeout,
        };

        let downloaded = self.download_stream(post_id, url, workspace, &limits).await;

        let fetched = match (downloaded, fallback_url) {
            (Ok((path, size)), _) => Fetched {
                path,
                kind: FileKind::Video("mp4"),
                size,
            },
            (Err(failure), Some(fallback)) => {
                warn!(
                    post_id = %post_id,
                    tool = self.tool.name(),
                    error = %failure,
                    "stream download failed, using direct fallback"
                );
                download::fetch(
                    &self.http_client,
                    fallback,
                    workspace,
                    post_id.as_str(),
                    self.config.max_download_size,
                )
                .await?
            }
            (Err(failure), None) => return Err(failure),
        };

        self.normalize(post_id, fetched, workspace).await
    }

    /// Run the stream downloader in a scratch directory and adopt its output
    async fn download_stream(
        &self,
        post_id: &PostId,
        url: &str,
        workspace: &Path,
        limits: &DownloadLimits,
    ) -> Resolution<(TempPath, u64)> {
        let scratch = tempfile::Builder::new()
            .prefix("dl-")
            .tempdir_in(workspace)
            .map_err(Error::from)?;
        let produced = self.tool.download_best(url, scratch.path(), limits).await?;
        let ext = produced
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4")
            .to_string();
        let target = scratch_file(workspace, post_id.as_str(), &ext).map_err(Error::from)?;
        tokio::fs::rename(&produced, &target)
            .await
            .map_err(Error::from)?;
        let size = file_size(&target).await?;
        Ok((target, size))
    }

    async fn resolve_gif_host(
        &self,
        post_id: &PostId,
        host: GifHost,
        url: &str,
        workspace: &Path,
    ) -> Resolution<MediaAsset> {
        let direct = gif_host::direct_url(&self.http_client, &self.config, host, url).await?;
        debug!(post_id = %post_id, ?host, from = url, to = %direct, "gif host resolved");
        self.resolve_direct(post_id, &direct, workspace).await
    }

    /// Bring a downloaded file into its deliverable form
    async fn normalize(
        &self,
        post_id: &PostId,
        fetched: Fetched,
        workspace: &Path,
    ) -> Resolution<MediaAsset> {
        match fetched.kind {
            FileKind::Image(_) => {
                self.check_ceiling(fetched.size)?;
                Ok(MediaAsset::new(
                    MediaKind::Image,
                    fetched.path,
                    fetched.size,
                    post_id.clone(),
                ))
            }
            FileKind::Animation if self.config.convert_gifs => {
                let converted =
                    scratch_file(workspace, post_id.as_str(), "mp4").map_err(Error::from)?;
                self.tool
                    .convert_animation(&fetched.path, &converted, self.config.resolve_timeout)
                    .await?;
                let size = file_size(&converted).await?;
                drop(fetched);
                self.fit_video(post_id, converted, size, workspace).await
            }
            FileKind::Animation => {
                self.check_ceiling(fetched.size)?;
                Ok(MediaAsset::new(
                    MediaKind::Video,
                    fetched.path,
                    fetched.size,
                    post_id.clone(),
                ))
            }
            FileKind::Video(_) => {
                self.fit_video(post_id, fetched.path, fetched.size, workspace)
                    .await
            }
        }
    }

    fn check_ceiling(&self, size: u64) -> Resolution<()> {
        let ceiling = self.config.per_asset_size_ceiling;
        if size > ceiling {
            return Err(ResolutionFailure::TooLargeAfterCompression {
                size_bytes: size,
                ceiling_bytes: ceiling,
            });
        }
        Ok(())
    }

    /// Re-encode an oversized video until it fits under the ceiling
    ///
    /// Each attempt starts again from the original file with a more aggressive profile. An
    /// encoder error skips to the next profile; a timeout ends the ladder.
    async fn fit_video(
        &self,
        post_id: &PostId,
        source: TempPath,
        size: u64,
        workspace: &Path,
    ) -> Resolution<MediaAsset> {
        let ceiling = self.config.per_asset_size_ceiling;
        if size <= ceiling {
            return Ok(MediaAsset::new(MediaKind::Video, source, size, post_id.clone()));
        }

        let mut smallest = size;
        for attempt in 0..self.config.max_resolution_attempts {
            let profile = EncodeProfile::for_attempt(attempt);
            let output = scratch_file(workspace, post_id.as_str(), "mp4").map_err(Error::from)?;
            let encoded = self
                .tool
                .transcode(&source, &output, &profile, self.config.resolve_timeout)
                .await;
            match encoded {
                Ok(()) => {}
                Err(e @ (Error::Timeout { .. } | Error::Cancelled)) => return Err(e.into()),
                Err(e) => {
                    warn!(
                        post_id = %post_id,
                        attempt,
                        crf = profile.crf,
                        error = %e,
                        "re-encode failed, trying next profile"
                    );
                    continue;
                }
            }
            let encoded = file_size(&output).await?;

            debug!(
                post_id = %post_id,
                attempt,
                crf = profile.crf,
                max_kbps = ?profile.max_kbps,
                from = size,
                to = encoded,
                "video re-encoded"
            );

            if encoded > 0 && encoded <= ceiling {
                return Ok(MediaAsset::new(MediaKind::Video, output, encoded, post_id.clone()));
            }
            if encoded > 0 {
                smallest = smallest.min(encoded);
            }
        }

        Err(ResolutionFailure::TooLargeAfterCompression {
            size_bytes: smallest,
            ceiling_bytes: ceiling,
        })
    }
}

async fn file_size(path: &Path) -> crate::Result<u64> {
    Ok(tokio::fs::metadata(path).await?.len())
}
