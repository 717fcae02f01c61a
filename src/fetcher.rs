//! Candidate discovery and resolution
//!
//! [`PostFetcher::candidates`] pages through every target lazily, interleaving them one post
//! at a time, and yields only posts that pass the request's filters. [`PostFetcher::fetch`]
//! resolves those candidates with bounded concurrency while keeping discovery order, and
//! stops pulling candidates as soon as the requested number of assets is reached.

use crate::config::FetchConfig;
use crate::error::{Error, ItemFailure};
use crate::media::MediaResolver;
use crate::reddit::{DiscussionPlatform, ListingQuery};
use crate::retry::{RetryExit, with_retry};
use crate::types::{
    Event, FailedItem, FetchRequest, PostId, RawPost, RequestId, ResolvedPost, Stage,
};
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Why a listed post was not considered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Removed by moderators or deleted
    Removed,
    /// NSFW while NSFW posts are not allowed
    Nsfw,
    /// Score below the configured floor
    LowScore,
    /// Text or link post without media
    NoMedia,
    /// Media kind does not match the requested type
    MediaType,
    /// Same post or same media already seen in this request
    Duplicate,
}

impl SkipReason {
    /// Stable reason code
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Removed => "removed",
            SkipReason::Nsfw => "nsfw",
            SkipReason::LowScore => "low_score",
            SkipReason::NoMedia => "no_media",
            SkipReason::MediaType => "media_type",
            SkipReason::Duplicate => "duplicate",
        }
    }
}

/// Result of resolving candidates for one request
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Resolved posts in discovery order; their asset total never exceeds the request count
    pub resolved: Vec<ResolvedPost>,
    /// Candidates whose media failed to resolve
    pub failed: Vec<FailedItem>,
}

impl FetchOutcome {
    /// Total number of assets collected
    pub fn asset_count(&self) -> usize {
        self.resolved.iter().map(|r| r.assets.len()).sum()
    }
}

/// Finds and resolves candidate posts for a request
pub struct PostFetcher {
    config: FetchConfig,
    platform: Arc<dyn DiscussionPlatform>,
}

impl PostFetcher {
    /// Create a fetcher over a discussion platform
    pub fn new(config: FetchConfig, platform: Arc<dyn DiscussionPlatform>) -> Self {
        Self { config, platform }
    }

    /// Lazy, finite sequence of eligible posts in deterministic discovery order
    ///
    /// Targets are interleaved one post at a time in command order. Listing timeouts and
    /// server errors are retried per `FetchConfig::retry`; a target whose listing still
    /// fails is logged and dropped from the rotation. At most `max_fetch_depth` listed posts
    /// are examined in total, including the ones filtered out.
    pub fn candidates(
        &self,
        request: &FetchRequest,
        request_id: RequestId,
        events: broadcast::Sender<Event>,
    ) -> BoxStream<'static, RawPost> {
        let state = CandidateState {
            platform: Arc::clone(&self.platform),
            config: self.config.clone(),
            request: request.clone(),
            request_id,
            events,
            cursors: request
                .targets
                .iter()
                .map(|t| TargetCursor::new(t.clone()))
                .collect(),
            turn: 0,
            scanned: 0,
            seen_ids: HashSet::new(),
            seen_urls: HashSet::new(),
        };

        stream::unfold(state, |mut state| async move {
            let post = state.next_candidate().await?;
            Some((post, state))
        })
        .boxed()
    }

    /// Resolve candidates until `request.count` assets are collected or candidates run out
    ///
    /// Up to `resolve_concurrency` candidates are resolved at once; results are consumed in
    /// discovery order. Each resolution is given the number of assets still missing as its
    /// gallery quota. Failures are recorded and do not count toward the quota. Assets of
    /// the wrong kind are dropped silently, and surplus gallery images are discarded.
    pub async fn fetch(
        &self,
        request: &FetchRequest,
        resolver: &MediaResolver,
        workspace: &Path,
        request_id: RequestId,
        events: &broadcast::Sender<Event>,
    ) -> FetchOutcome {
        let quota = request.count as usize;
        let concurrency = resolver.config().resolve_concurrency.max(1);

        let remaining = &AtomicUsize::new(quota);

        let stage_events = events.clone();
        let mut resolving = false;
        let mut resolutions = self
            .candidates(request, request_id, events.clone())
            .inspect(move |_| {
                if !resolving {
                    resolving = true;
                    stage_events
                        .send(Event::StageChanged {
                            request: request_id,
                            stage: Stage::Resolving,
                        })
                        .ok();
                }
            })
            .map(|post| async move {
                // candidates started before earlier results land may see a stale budget
                let budget = remaining.load(Ordering::Relaxed).max(1);
                let result = resolver.resolve(&post, workspace, budget).await;
                (post, result)
            })
            .buffered(concurrency);

        let mut outcome = FetchOutcome::default();
        let mut collected = 0;

        while collected < quota {
            let Some((post, result)) = resolutions.next().await else {
                debug!(request = %request_id, collected, quota, "candidates exhausted");
                break;
            };

            match result {
                Ok(mut assets) => {
                    assets.retain(|asset| request.media_type.accepts(asset.kind));
                    if assets.is_empty() {
                        debug!(post_id = %post.id, "resolved media has the wrong type");
                        emit_skip(events, request_id, &post.id, SkipReason::MediaType);
                        continue;
                    }
                    assets.truncate(quota - collected);
                    collected += assets.len();
                    remaining.store(quota - collected, Ordering::Relaxed);
                    events
                        .send(Event::ItemResolved {
                            request: request_id,
                            post_id: post.id.clone(),
                            assets: assets.len(),
                        })
                        .ok();
                    outcome.resolved.push(ResolvedPost { post, assets });
                }
                Err(failure) => {
                    let failure = ItemFailure::Resolution(failure);
                    events
                        .send(Event::ItemFailed {
                            request: request_id,
                            post_id: post.id.clone(),
                            failure: failure.clone(),
                        })
                        .ok();
                    outcome.failed.push(FailedItem {
                        post_id: post.id,
                        failure,
                    });
                }
            }
        }

        outcome
    }
}

fn emit_skip(
    events: &broadcast::Sender<Event>,
    request: RequestId,
    post_id: &PostId,
    reason: SkipReason,
) {
    events
        .send(Event::CandidateSkipped {
            request,
            post_id: post_id.clone(),
            reason: reason.as_str().to_string(),
        })
        .ok();
}

struct TargetCursor {
    subreddit: String,
    after: Option<String>,
    buffer: VecDeque<RawPost>,
    exhausted: bool,
}

impl TargetCursor {
    fn new(subreddit: String) -> Self {
        Self {
            subreddit,
            after: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }
}

struct CandidateState {
    platform: Arc<dyn DiscussionPlatform>,
    config: FetchConfig,
    request: FetchRequest,
    request_id: RequestId,
    events: broadcast::Sender<Event>,
    cursors: Vec<TargetCursor>,
    turn: usize,
    scanned: usize,
    seen_ids: HashSet<PostId>,
    seen_urls: HashSet<String>,
}

impl CandidateState {
    async fn next_candidate(&mut self) -> Option<RawPost> {
        loop {
            if self.scanned >= self.config.max_fetch_depth {
                debug!(request = %self.request_id, scanned = self.scanned, "fetch depth reached");
                return None;
            }
            let post = self.next_listed().await?;
            self.scanned += 1;

            match self.check(&post) {
                Ok(()) => return Some(post),
                Err(reason) => {
                    debug!(post_id = %post.id, reason = reason.as_str(), "candidate skipped");
                    emit_skip(&self.events, self.request_id, &post.id, reason);
                }
            }
        }
    }

    /// Next listed post in round-robin order, paging lazily
    async fn next_listed(&mut self) -> Option<RawPost> {
        let targets = self.cursors.len();
        for _ in 0..targets {
            let index = self.turn % targets;
            self.turn = self.turn.wrapping_add(1);

            if self.cursors[index].buffer.is_empty() && !self.cursors[index].exhausted {
                self.fill(index).await;
            }
            if let Some(post) = self.cursors[index].buffer.pop_front() {
                return Some(post);
            }
        }
        None
    }

    async fn fill(&mut self, index: usize) {
        let cursor = &self.cursors[index];
        let query = ListingQuery {
            subreddit: cursor.subreddit.clone(),
            time_filter: self.request.time_filter,
            search: self.request.query(),
            limit: self.config.page_size,
            after: cursor.after.clone(),
        };

        let platform = &self.platform;
        let query = &query;
        let listing_timeout = self.config.listing_timeout;
        let page = with_retry(&self.config.retry, || async move {
            tokio::time::timeout(listing_timeout, platform.list_posts(query))
                .await
                .unwrap_or_else(|_| {
                    Err(Error::Timeout {
                        operation: "listing",
                        timeout: listing_timeout,
                    })
                })
        })
        .await;

        let cursor = &mut self.cursors[index];
        match page {
            Ok(page) => {
                debug!(
                    subreddit = %cursor.subreddit,
                    posts = page.posts.len(),
                    "listing page received"
                );
                cursor.exhausted = page.after.is_none() || page.posts.is_empty();
                cursor.after = page.after;
                cursor.buffer.extend(page.posts);
            }
            Err(RetryExit::Permanent(e)) => {
                warn!(subreddit = %cursor.subreddit, error = %e, "listing failed, dropping target");
                cursor.exhausted = true;
            }
            Err(RetryExit::Exhausted {
                attempts,
                last_error,
            }) => {
                warn!(
                    subreddit = %cursor.subreddit,
                    attempts,
                    error = %last_error,
                    "listing kept failing, dropping target"
                );
                cursor.exhausted = true;
            }
        }
    }

    fn check(&mut self, post: &RawPost) -> Result<(), SkipReason> {
        if post.removed {
            return Err(SkipReason::Removed);
        }
        if post.nsfw && !self.config.allow_nsfw {
            return Err(SkipReason::Nsfw);
        }
        if post.score < self.config.min_score {
            return Err(SkipReason::LowScore);
        }
        let Some(media) = &post.media else {
            return Err(SkipReason::NoMedia);
        };
        if !self.request.media_type.accepts(media.expected_kind()) {
            return Err(SkipReason::MediaType);
        }
        if !self.seen_ids.insert(post.id.clone()) {
            return Err(SkipReason::Duplicate);
        }
        if !self.seen_urls.insert(media.primary_url().to_string()) {
            return Err(SkipReason::Duplicate);
        }
        Ok(())
    }
}
