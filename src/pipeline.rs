//! Request orchestration
//!
//! One call to [`PipelineOrchestrator::run`] handles one fetch command end to end:
//!
//! ```text
//! Parsing -> Fetching -> Resolving -> Delivering -> Completed
//!    |
//!    +-> Failed (malformed command or no scratch directory)
//! ```
//!
//! Per-item failures after parsing are collected into the returned [`BatchSummary`]; they
//! never fail the request. A request that cannot get a scratch directory also ends in
//! `Failed`. Every file a request creates lives in one scratch directory
//! that is removed when the request ends, including on cancellation.

use crate::command;
use crate::comments::CommentFetcher;
use crate::config::Config;
use crate::delivery::{DeliveryDispatcher, MessagingChannel, TelegramChannel};
use crate::error::{Error, ItemFailure, Result};
use crate::fetcher::PostFetcher;
use crate::media::{CliMediaTool, MediaResolver, MediaTool};
use crate::reddit::{DiscussionPlatform, RedditClient};
use crate::types::{BatchSummary, ChatId, Event, FetchRequest, RequestId, Stage};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const WORKSPACE_FAILED: &str = "Something went wrong on my side, please try again later.";

/// Runs fetch commands through the whole pipeline
///
/// Requests are independent: the orchestrator holds no per-request state, so one instance
/// can serve many concurrent requests.
pub struct PipelineOrchestrator {
    config: Config,
    fetcher: PostFetcher,
    resolver: MediaResolver,
    comments: CommentFetcher,
    dispatcher: DeliveryDispatcher,
    event_tx: broadcast::Sender<Event>,
    next_request: AtomicU64,
}

impl PipelineOrchestrator {
    /// Create an orchestrator from its collaborators
    ///
    /// # Errors
    /// Returns error if the configuration is invalid or an HTTP client cannot be created
    pub fn new(
        config: Config,
        platform: Arc<dyn DiscussionPlatform>,
        tool: Arc<dyn MediaTool>,
        channel: Arc<dyn MessagingChannel>,
    ) -> Result<Self> {
        config.validate()?;

        let resolver = MediaResolver::new(config.media.clone(), &config.fetch.user_agent, tool)?;
        let fetcher = PostFetcher::new(config.fetch.clone(), Arc::clone(&platform));
        let comments = CommentFetcher::new(config.comments.clone(), platform);
        let dispatcher = DeliveryDispatcher::new(config.delivery.clone(), channel);

        // Buffer lets slow subscribers lag without blocking requests
        let (event_tx, _rx) = broadcast::channel(1000);

        Ok(Self {
            config,
            fetcher,
            resolver,
            comments,
            dispatcher,
            event_tx,
            next_request: AtomicU64::new(1),
        })
    }

    /// Create an orchestrator wired to the public platform API, local tools and Telegram
    ///
    /// # Errors
    /// Returns error if the configuration is invalid or an HTTP client cannot be created
    pub fn connect(config: Config, bot_token: &str) -> Result<Self> {
        let platform: Arc<dyn DiscussionPlatform> = Arc::new(RedditClient::new(&config.fetch)?);
        let tool = CliMediaTool::from_config(&config.tools);
        info!(
            media_tool = tool.name(),
            downloader = tool.has_downloader(),
            encoder = tool.has_encoder(),
            "media tool initialized"
        );
        let channel: Arc<dyn MessagingChannel> =
            Arc::new(TelegramChannel::new(bot_token, &config.delivery)?);
        Self::new(config, platform, Arc::new(tool), channel)
    }

    /// Subscribe to lifecycle events of all requests
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Settings in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle one fetch command for `chat`
    ///
    /// Returns the batch summary, [`Error::Parse`] for a malformed command (after telling
    /// the user how to use the command) or [`Error::Cancelled`] when `cancel` fires first.
    pub async fn run(
        &self,
        chat: &ChatId,
        raw_command: &str,
        cancel: &CancellationToken,
    ) -> Result<BatchSummary> {
        let request_id = RequestId(self.next_request.fetch_add(1, Ordering::Relaxed));
        self.stage(request_id, Stage::Parsing);

        let request = match command::parse(raw_command) {
            Ok(request) => request,
            Err(e) => {
                warn!(request = %request_id, error = %e, command = raw_command, "command rejected");
                self.stage(request_id, Stage::Failed);
                if let Err(failure) = self.dispatcher.notify(chat, &e.user_message()).await {
                    warn!(request = %request_id, error = %failure, "could not send usage message");
                }
                return Err(Error::Parse(e));
            }
        };

        info!(
            request = %request_id,
            targets = ?request.targets,
            count = request.count,
            media_type = ?request.media_type,
            "request accepted"
        );

        let workspace = match self.create_workspace().await {
            Ok(workspace) => workspace,
            Err(e) => {
                warn!(
                    request = %request_id,
                    temp_dir = %self.config.media.temp_dir.display(),
                    error = %e,
                    "cannot create request workspace"
                );
                self.stage(request_id, Stage::Failed);
                if let Err(failure) = self.dispatcher.notify(chat, WORKSPACE_FAILED).await {
                    warn!(
                        request = %request_id,
                        error = %failure,
                        "could not send failure message"
                    );
                }
                return Err(e);
            }
        };

        let finished = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            summary = self.execute(request_id, chat, &request, workspace.path()) => Some(summary),
        };

        let workspace_path = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            warn!(
                request = %request_id,
                path = %workspace_path.display(),
                error = %e,
                "failed to remove workspace"
            );
        }

        match finished {
            Some(summary) => Ok(summary),
            None => {
                info!(request = %request_id, "request cancelled");
                self.event_tx
                    .send(Event::Cancelled {
                        request: request_id,
                    })
                    .ok();
                Err(Error::Cancelled)
            }
        }
    }

    async fn create_workspace(&self) -> Result<tempfile::TempDir> {
        tokio::fs::create_dir_all(&self.config.media.temp_dir).await?;
        let workspace = tempfile::Builder::new()
            .prefix("reddit-relay-")
            .tempdir_in(&self.config.media.temp_dir)?;
        Ok(workspace)
    }

    async fn execute(
        &self,
        request_id: RequestId,
        chat: &ChatId,
        request: &FetchRequest,
        workspace: &Path,
    ) -> BatchSummary {
        self.stage(request_id, Stage::Fetching);
        let outcome = self
            .fetcher
            .fetch(request, &self.resolver, workspace, request_id, &self.event_tx)
            .await;

        let mut summary = BatchSummary {
            requested: request.count as usize,
            delivered: 0,
            failed: outcome.failed,
        };

        self.stage(request_id, Stage::Delivering);
        for resolved in outcome.resolved {
            let post_id = resolved.post.id;
            let comments = if request.include_comments {
                self.comments
                    .fetch_top(&post_id, self.comments.default_count())
                    .await
            } else {
                Vec::new()
            };

            for (index, asset) in resolved.assets.into_iter().enumerate() {
                // comments go with the first asset of a post only
                let caption_comments = if index == 0 { comments.as_slice() } else { &[] };
                match self.dispatcher.deliver(chat, asset, caption_comments).await {
                    Ok(delivered) => {
                        summary.delivered += 1;
                        self.event_tx
                            .send(Event::ItemDelivered {
                                request: request_id,
                                post_id: post_id.clone(),
                                method: delivered.method,
                                size_bytes: delivered.size_bytes,
                            })
                            .ok();
                    }
                    Err(failure) => {
                        let failure = ItemFailure::Delivery(failure);
                        self.event_tx
                            .send(Event::ItemFailed {
                                request: request_id,
                                post_id: post_id.clone(),
                                failure: failure.clone(),
                            })
                            .ok();
                        summary.record_failure(post_id.clone(), failure);
                    }
                }
            }
        }

        self.stage(request_id, Stage::Completed);
        info!(
            request = %request_id,
            delivered = summary.delivered,
            requested = summary.requested,
            failed = summary.failed.len(),
            reasons = ?summary.reasons(),
            "request completed"
        );
        self.event_tx
            .send(Event::Completed {
                request: request_id,
                delivered: summary.delivered,
                failed: summary.failed.len(),
            })
            .ok();

        if let Some(report) = summary.user_report()
            && let Err(failure) = self.dispatcher.notify(chat, &report).await
        {
            warn!(request = %request_id, error = %failure, "could not send summary");
        }

        summary
    }

    fn stage(&self, request: RequestId, stage: Stage) {
        tracing::debug!(request = %request, ?stage, "stage changed");
        self.event_tx
            .send(Event::StageChanged { request, stage })
            .ok();
    }
}
