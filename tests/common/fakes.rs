//! In-memory stand-ins for the pipeline's collaborators

use async_trait::async_trait;
use reddit_relay::media::{DownloadLimits, EncodeProfile};
use reddit_relay::reddit::{ListingPage, ListingQuery};
use reddit_relay::{
    ChatId, CommentExcerpt, DeliveryMethod, DiscussionPlatform, Error, MediaAsset, MediaTool,
    MessagingChannel, PostId, RawPost, Result, SendError,
};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Serves fixed listings and comments, paging with post ids as cursors
#[derive(Default)]
pub struct FakePlatform {
    listings: HashMap<String, Vec<RawPost>>,
    comments: HashMap<PostId, Vec<CommentExcerpt>>,
    failing_comments: bool,
    queries: Mutex<Vec<ListingQuery>>,
}

impl FakePlatform {
    /// Empty platform: every subreddit lists nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `posts` for `subreddit`
    pub fn with_listing(mut self, subreddit: &str, posts: Vec<RawPost>) -> Self {
        self.listings.insert(subreddit.to_string(), posts);
        self
    }

    /// Serve `comments` for `post_id`
    pub fn with_comments(mut self, post_id: &str, comments: Vec<CommentExcerpt>) -> Self {
        self.comments.insert(PostId::new(post_id), comments);
        self
    }

    /// Make every comment request fail
    pub fn with_failing_comments(mut self) -> Self {
        self.failing_comments = true;
        self
    }

    /// Listing queries received so far
    pub fn queries(&self) -> Vec<ListingQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl DiscussionPlatform for FakePlatform {
    async fn list_posts(&self, query: &ListingQuery) -> Result<ListingPage> {
        self.queries.lock().unwrap().push(query.clone());

        let posts = self.listings.get(&query.subreddit).cloned().unwrap_or_default();
        let start = match &query.after {
            Some(after) => posts
                .iter()
                .position(|p| p.id.as_str() == after)
                .map_or(posts.len(), |i| i + 1),
            None => 0,
        };
        let page: Vec<RawPost> = posts.into_iter().skip(start).take(query.limit).collect();
        let after = (page.len() == query.limit)
            .then(|| page.last().map(|p| p.id.to_string()))
            .flatten();
        Ok(ListingPage { posts: page, after })
    }

    async fn list_top_comments(
        &self,
        post_id: &PostId,
        limit: usize,
    ) -> Result<Vec<CommentExcerpt>> {
        if self.failing_comments {
            return Err(Error::Platform {
                status: 503,
                message: "comments unavailable".into(),
            });
        }
        let mut comments = self.comments.get(post_id).cloned().unwrap_or_default();
        comments.truncate(limit);
        Ok(comments)
    }
}

/// What the fake downloader does for one URL
#[derive(Clone, Debug)]
pub enum StreamBehavior {
    /// Produce an MP4 of this many bytes
    Produce(usize),
    /// Fail like a missing or broken yt-dlp
    Fail,
    /// Write a partial file, then never finish
    Hang,
}

/// Media tool writing placeholder files instead of running yt-dlp/ffmpeg
///
/// Each transcode shrinks its input to a quarter; animations convert at half size.
#[derive(Default)]
pub struct FakeTool {
    streams: HashMap<String, StreamBehavior>,
    transcodes: AtomicUsize,
}

impl FakeTool {
    /// Tool without any known streams
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure what downloading `url` does
    pub fn with_stream(mut self, url: &str, behavior: StreamBehavior) -> Self {
        self.streams.insert(url.to_string(), behavior);
        self
    }

    /// Number of transcodes run so far
    pub fn transcodes(&self) -> usize {
        self.transcodes.load(Ordering::SeqCst)
    }
}

async fn write_bytes(path: &Path, len: usize) -> Result<()> {
    tokio::fs::write(path, vec![0u8; len]).await?;
    Ok(())
}

async fn len_of(path: &Path) -> Result<usize> {
    Ok(tokio::fs::metadata(path).await?.len() as usize)
}

#[async_trait]
impl MediaTool for FakeTool {
    async fn download_best(
        &self,
        url: &str,
        dest_dir: &Path,
        _limits: &DownloadLimits,
    ) -> Result<PathBuf> {
        let output = dest_dir.join("stream.mp4");
        match self.streams.get(url) {
            Some(StreamBehavior::Produce(len)) => {
                write_bytes(&output, *len).await?;
                Ok(output)
            }
            Some(StreamBehavior::Hang) => {
                write_bytes(&dest_dir.join("stream.mp4.part"), 4096).await?;
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(output)
            }
            Some(StreamBehavior::Fail) | None => {
                Err(Error::ExternalTool(format!("yt-dlp: no stream for {url}")))
            }
        }
    }

    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        _profile: &EncodeProfile,
        _timeout: Duration,
    ) -> Result<()> {
        self.transcodes.fetch_add(1, Ordering::SeqCst);
        let len = len_of(input).await?;
        write_bytes(output, len / 4).await
    }

    async fn convert_animation(
        &self,
        input: &Path,
        output: &Path,
        _timeout: Duration,
    ) -> Result<()> {
        let len = len_of(input).await?;
        write_bytes(output, len / 2).await
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// One media upload seen by [`RecordingChannel`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMedia {
    /// Destination chat
    pub chat: ChatId,
    /// Source post
    pub post_id: String,
    /// Upload method
    pub method: DeliveryMethod,
    /// Caption, if any
    pub caption: Option<String>,
    /// Bytes read from the asset's file at send time
    pub size_bytes: u64,
}

/// Messaging channel recording successful sends
///
/// Failures queued with [`RecordingChannel::fail_next`] are returned by the next media sends
/// before anything is recorded.
#[derive(Default)]
pub struct RecordingChannel {
    media: Mutex<Vec<SentMedia>>,
    texts: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<SendError>>,
    attempts: AtomicUsize,
}

impl RecordingChannel {
    /// Channel accepting everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue failures for the next media sends
    pub fn fail_next(self, failures: impl IntoIterator<Item = SendError>) -> Self {
        self.failures.lock().unwrap().extend(failures);
        self
    }

    /// Media delivered so far
    pub fn media(&self) -> Vec<SentMedia> {
        self.media.lock().unwrap().clone()
    }

    /// Post ids of delivered media, in delivery order
    pub fn delivered_posts(&self) -> Vec<String> {
        self.media().into_iter().map(|m| m.post_id).collect()
    }

    /// Text messages sent so far
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }

    /// Media send attempts, including failed ones
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessagingChannel for RecordingChannel {
    async fn send_media(
        &self,
        chat: &ChatId,
        asset: &MediaAsset,
        method: DeliveryMethod,
        caption: Option<&str>,
    ) -> std::result::Result<(), SendError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let queued = self.failures.lock().unwrap().pop_front();
        if let Some(failure) = queued {
            return Err(failure);
        }

        let size_bytes = tokio::fs::metadata(asset.local_path()).await?.len();
        self.media.lock().unwrap().push(SentMedia {
            chat: chat.clone(),
            post_id: asset.source_post_id.to_string(),
            method,
            caption: caption.map(str::to_string),
            size_bytes,
        });
        Ok(())
    }

    async fn send_text(&self, _chat: &ChatId, text: &str) -> std::result::Result<(), SendError> {
        self.texts.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
