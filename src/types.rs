//! Core types for reddit-relay

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tempfile::TempPath;

use crate::error::ItemFailure;

/// Smallest number of assets a request may ask for
pub const MIN_COUNT: u8 = 1;
/// Largest number of assets a request may ask for
pub const MAX_COUNT: u8 = 5;

/// Identifier of a post on the discussion platform (e.g. "1abcde")
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub String);

impl PostId {
    /// Create a new PostId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PostId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for PostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one pipeline run, unique within a process
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Destination chat on the messaging platform
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Time window for top listings
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFilter {
    /// All time
    All,
    /// Past year
    Year,
    /// Past month
    Month,
    /// Past week
    Week,
}

impl TimeFilter {
    /// Parse a command keyword (case-insensitive)
    pub fn from_keyword(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "all" => Some(TimeFilter::All),
            "year" => Some(TimeFilter::Year),
            "month" => Some(TimeFilter::Month),
            "week" => Some(TimeFilter::Week),
            _ => None,
        }
    }

    /// Value of the platform's `t` query parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFilter::All => "all",
            TimeFilter::Year => "year",
            TimeFilter::Month => "month",
            TimeFilter::Week => "week",
        }
    }
}

/// Kind of media the user asked for
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaTypeFilter {
    /// Images and galleries only
    Image,
    /// Videos and animations only
    Video,
    /// Anything resolvable (default)
    #[default]
    Any,
}

impl MediaTypeFilter {
    /// Parse a command keyword (case-insensitive); `Any` has no keyword
    pub fn from_keyword(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "image" => Some(MediaTypeFilter::Image),
            "video" => Some(MediaTypeFilter::Video),
            _ => None,
        }
    }

    /// Whether media of the given kind satisfies this filter
    pub fn accepts(&self, kind: MediaKind) -> bool {
        match self {
            MediaTypeFilter::Any => true,
            MediaTypeFilter::Image => kind == MediaKind::Image,
            MediaTypeFilter::Video => kind == MediaKind::Video,
        }
    }
}

/// Kind of a deliverable asset
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Still image
    Image,
    /// Video or converted animation
    Video,
}

/// Structured form of a fetch command
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Time window; `None` means the platform's default ("hot") ordering
    pub time_filter: Option<TimeFilter>,
    /// Subreddit names in command order, without duplicates (never empty)
    pub targets: Vec<String>,
    /// Search terms in command order, without duplicates
    pub search_terms: Vec<String>,
    /// Number of assets wanted, always within [`MIN_COUNT`]..=[`MAX_COUNT`]
    pub count: u8,
    /// Requested media kind
    pub media_type: MediaTypeFilter,
    /// Attach top comments to each delivery
    pub include_comments: bool,
}

impl FetchRequest {
    /// Create a request for the given targets with default options
    pub fn new(targets: Vec<String>) -> Self {
        Self {
            time_filter: None,
            targets,
            search_terms: Vec::new(),
            count: MIN_COUNT,
            media_type: MediaTypeFilter::Any,
            include_comments: false,
        }
    }

    /// Set the count, clamped into the allowed range
    pub fn with_count(mut self, count: u8) -> Self {
        self.count = count.clamp(MIN_COUNT, MAX_COUNT);
        self
    }

    /// Joined search query, if any terms were given
    pub fn query(&self) -> Option<String> {
        if self.search_terms.is_empty() {
            None
        } else {
            Some(self.search_terms.join(" "))
        }
    }
}

/// Third-party host serving short animated clips
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GifHost {
    /// imgur (`.gifv` pages)
    Imgur,
    /// streamable.com
    Streamable,
    /// redgifs.com
    Redgifs,
    /// Any other host linking straight to a clip
    Generic,
}

/// How a post presents its media
///
/// Closed set: each variant has exactly one resolution routine in
/// [`crate::media::MediaResolver`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaDescriptor {
    /// A single image file
    DirectImage {
        /// Image URL
        url: String,
    },
    /// Several images in display order
    Gallery {
        /// Image URLs in gallery order
        urls: Vec<String>,
    },
    /// Video served by the platform through a streaming manifest
    HostedVideo {
        /// Canonical video URL (handed to the downloader tool)
        url: String,
        /// Direct progressive MP4 used when the tool cannot retrieve the stream
        fallback_url: Option<String>,
    },
    /// Clip on an external gif host
    ExternalGifHost {
        /// Which host serves it
        host: GifHost,
        /// Link as posted (short link, page or direct file)
        url: String,
    },
}

impl MediaDescriptor {
    /// Kind of asset this media is expected to resolve to
    ///
    /// Direct GIF images are counted as video because they are delivered as MP4.
    pub fn expected_kind(&self) -> MediaKind {
        match self {
            MediaDescriptor::DirectImage { url } if path_has_extension(url, &["gif"]) => {
                MediaKind::Video
            }
            MediaDescriptor::DirectImage { .. } | MediaDescriptor::Gallery { .. } => {
                MediaKind::Image
            }
            MediaDescriptor::HostedVideo { .. } | MediaDescriptor::ExternalGifHost { .. } => {
                MediaKind::Video
            }
        }
    }

    /// URL used for duplicate detection
    pub fn primary_url(&self) -> &str {
        match self {
            MediaDescriptor::DirectImage { url }
            | MediaDescriptor::HostedVideo { url, .. }
            | MediaDescriptor::ExternalGifHost { url, .. } => url,
            MediaDescriptor::Gallery { urls } => urls.first().map(String::as_str).unwrap_or(""),
        }
    }

    /// Short tag for logs and events
    pub fn tag(&self) -> &'static str {
        match self {
            MediaDescriptor::DirectImage { .. } => "direct_image",
            MediaDescriptor::Gallery { .. } => "gallery",
            MediaDescriptor::HostedVideo { .. } => "hosted_video",
            MediaDescriptor::ExternalGifHost { .. } => "external_gif_host",
        }
    }
}

/// Whether the URL's path ends in one of the given extensions (case-insensitive)
pub(crate) fn path_has_extension(url: &str, extensions: &[&str]) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let Some((_, ext)) = path.rsplit_once('.') else {
        return false;
    };
    if ext.contains('/') {
        return false;
    }
    extensions.iter().any(|e| ext.eq_ignore_ascii_case(e))
}

/// A post as listed by the discussion platform
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawPost {
    /// Platform id
    pub id: PostId,
    /// Subreddit the post lives in
    pub subreddit: String,
    /// Post title
    pub title: String,
    /// Author name ("[deleted]" when gone)
    pub author: String,
    /// Platform-relative permalink
    pub permalink: String,
    /// Link the post points at
    pub url: String,
    /// Net score
    pub score: i64,
    /// Marked NSFW
    pub nsfw: bool,
    /// Removed by moderators or deleted by the author
    pub removed: bool,
    /// Number of comments
    pub num_comments: u64,
    /// Creation time
    pub created_utc: Option<DateTime<Utc>>,
    /// Media found on the post; `None` for text/link posts
    pub media: Option<MediaDescriptor>,
}

/// A resolved, deliverable media file
///
/// The file lives in the request's scratch directory and is removed when the asset is
/// dropped or explicitly [`delete`](Self::delete)d, so no asset outlives its request.
#[derive(Debug)]
pub struct MediaAsset {
    /// Image or video
    pub kind: MediaKind,
    /// Size of the file on disk
    pub size_bytes: u64,
    /// Post the media came from
    pub source_post_id: PostId,
    path: TempPath,
}

impl MediaAsset {
    pub(crate) fn new(kind: MediaKind, path: TempPath, size_bytes: u64, post_id: PostId) -> Self {
        Self {
            kind,
            size_bytes,
            source_post_id: post_id,
            path,
        }
    }

    /// Location of the file
    pub fn local_path(&self) -> &Path {
        &self.path
    }

    /// File name used for uploads
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}.bin", self.source_post_id))
    }

    /// Remove the file now, reporting failures instead of swallowing them on drop
    pub fn delete(self) -> std::io::Result<()> {
        self.path.close()
    }
}

/// A comment attached to a delivery
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentExcerpt {
    /// Comment author
    pub author: String,
    /// Comment text
    pub body: String,
    /// Net score
    pub score: i64,
}

/// A post whose media resolved, with its assets in display order
#[derive(Debug)]
pub struct ResolvedPost {
    /// The source post
    pub post: RawPost,
    /// One asset, or several for galleries
    pub assets: Vec<MediaAsset>,
}

/// How an asset was sent
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod {
    /// Native photo message
    Photo,
    /// Native inline video message
    Video,
    /// Generic file attachment
    Document,
}

/// Lifecycle stage of one request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Parsing the command
    Parsing,
    /// Listing candidate posts
    Fetching,
    /// Resolving candidate media
    Resolving,
    /// Sending assets
    Delivering,
    /// Finished (possibly with per-item failures)
    Completed,
    /// Aborted because the command was malformed
    Failed,
}

/// Event emitted during a request's lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Request moved to a new stage
    StageChanged {
        /// Request id
        request: RequestId,
        /// New stage
        stage: Stage,
    },

    /// A listed post was not considered (filtered out before resolution)
    CandidateSkipped {
        /// Request id
        request: RequestId,
        /// Skipped post
        post_id: PostId,
        /// Filter that rejected it
        reason: String,
    },

    /// A post's media resolved
    ItemResolved {
        /// Request id
        request: RequestId,
        /// Source post
        post_id: PostId,
        /// Number of assets produced
        assets: usize,
    },

    /// A post failed to resolve or an asset failed to deliver
    ItemFailed {
        /// Request id
        request: RequestId,
        /// Source post
        post_id: PostId,
        /// What went wrong
        failure: ItemFailure,
    },

    /// An asset was delivered
    ItemDelivered {
        /// Request id
        request: RequestId,
        /// Source post
        post_id: PostId,
        /// Delivery method used
        method: DeliveryMethod,
        /// Bytes sent
        size_bytes: u64,
    },

    /// Request finished
    Completed {
        /// Request id
        request: RequestId,
        /// Assets delivered
        delivered: usize,
        /// Items that failed
        failed: usize,
    },

    /// Request was cancelled before finishing
    Cancelled {
        /// Request id
        request: RequestId,
    },
}

/// One failed item in a batch summary
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    /// Source post
    pub post_id: PostId,
    /// Failure detail
    pub failure: ItemFailure,
}

/// Outcome of one request: what was delivered and what failed
///
/// A request with failed items still completes; only a malformed command fails it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Number of assets requested
    pub requested: usize,
    /// Number of assets delivered
    pub delivered: usize,
    /// Items that failed, in the order they failed
    pub failed: Vec<FailedItem>,
}

impl BatchSummary {
    pub(crate) fn record_failure(&mut self, post_id: PostId, failure: ItemFailure) {
        self.failed.push(FailedItem { post_id, failure });
    }

    /// Distinct failure codes in order of first occurrence
    pub fn reasons(&self) -> Vec<&'static str> {
        let mut reasons = Vec::new();
        for item in &self.failed {
            let code = item.failure.code();
            if !reasons.contains(&code) {
                reasons.push(code);
            }
        }
        reasons
    }

    /// Text reported to the user when the request finishes, if anything needs saying
    pub fn user_report(&self) -> Option<String> {
        let mut report = if self.delivered == 0 {
            "No posts found.".to_string()
        } else if self.delivered < self.requested {
            format!("Only {}/{} posts found.", self.delivered, self.requested)
        } else {
            return None;
        };

        let reasons = self.reasons();
        if !reasons.is_empty() {
            let shown: Vec<&str> = reasons.into_iter().take(3).collect();
            report.push_str(&format!(
                " {} item(s) failed: {}",
                self.failed.len(),
                shown.join(", ")
            ));
        }
        Some(report)
    }
}
