//! Delivery of resolved assets
//!
//! [`DeliveryDispatcher`] picks how each asset is sent, renders the comment caption, and
//! drives a [`MessagingChannel`] through the retry loop. Whatever the outcome, the asset's
//! file is deleted once delivery is over.

mod telegram;

pub use telegram::TelegramChannel;

use crate::config::DeliveryConfig;
use crate::error::{DeliveryFailure, SendError};
use crate::retry::{RetryExit, with_retry};
use crate::types::{ChatId, CommentExcerpt, DeliveryMethod, MediaAsset, MediaKind};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Outbound messaging platform
///
/// One call is one attempt. Implementations classify failures as rate limits, permanent
/// rejections or transient errors and leave retrying to the dispatcher.
#[async_trait]
pub trait MessagingChannel: Send + Sync {
    /// Send a media file with the given method and optional caption
    async fn send_media(
        &self,
        chat: &ChatId,
        asset: &MediaAsset,
        method: DeliveryMethod,
        caption: Option<&str>,
    ) -> Result<(), SendError>;

    /// Send a plain text message
    async fn send_text(&self, chat: &ChatId, text: &str) -> Result<(), SendError>;

    /// Name of the implementation
    fn name(&self) -> &'static str;
}

/// A successful delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivered {
    /// How the asset was sent
    pub method: DeliveryMethod,
    /// Size of the sent file
    pub size_bytes: u64,
    /// Attempts it took
    pub attempts: u32,
}

/// Outcome of delivering one asset
pub type DeliveryResult = Result<Delivered, DeliveryFailure>;

/// Sends assets to a chat with retry and cleanup
pub struct DeliveryDispatcher {
    config: DeliveryConfig,
    channel: Arc<dyn MessagingChannel>,
}

impl DeliveryDispatcher {
    /// Create a dispatcher over a messaging channel
    pub fn new(config: DeliveryConfig, channel: Arc<dyn MessagingChannel>) -> Self {
        Self { config, channel }
    }

    /// Delivery method for an asset, by kind and size
    pub fn choose_method(&self, asset: &MediaAsset) -> DeliveryMethod {
        match asset.kind {
            MediaKind::Image if asset.size_bytes <= self.config.photo_max_bytes => {
                DeliveryMethod::Photo
            }
            MediaKind::Video if asset.size_bytes <= self.config.inline_media_max_bytes => {
                DeliveryMethod::Video
            }
            _ => DeliveryMethod::Document,
        }
    }

    /// Caption made of comment excerpts, truncated to the configured length
    pub fn caption(&self, comments: &[CommentExcerpt]) -> Option<String> {
        if comments.is_empty() {
            return None;
        }
        let text = comments
            .iter()
            .map(|c| format!("💬 {}", c.body.trim()))
            .collect::<Vec<_>>()
            .join("\n");
        Some(truncate_chars(&text, self.config.caption_max_chars))
    }

    /// Deliver one asset, retrying rate limits and transient failures
    ///
    /// The asset's file is removed afterwards, whether delivery succeeded or failed.
    pub async fn deliver(
        &self,
        chat: &ChatId,
        asset: MediaAsset,
        comments: &[CommentExcerpt],
    ) -> DeliveryResult {
        let method = self.choose_method(&asset);
        let caption = self.caption(comments);
        let post_id = asset.source_post_id.clone();
        let size_bytes = asset.size_bytes;

        let mut attempts = 0u32;
        let outcome = with_retry(&self.config.retry, || {
            attempts += 1;
            self.attempt_media(chat, &asset, method, caption.as_deref())
        })
        .await;

        if let Err(e) = asset.delete() {
            warn!(post_id = %post_id, error = %e, "failed to remove delivered file");
        }

        match outcome {
            Ok(()) => {
                info!(post_id = %post_id, ?method, size_bytes, attempts, "asset delivered");
                Ok(Delivered {
                    method,
                    size_bytes,
                    attempts,
                })
            }
            Err(exit) => {
                let failure = failure_from(exit);
                warn!(
                    post_id = %post_id,
                    ?method,
                    code = failure.code(),
                    error = %failure,
                    "delivery failed"
                );
                Err(failure)
            }
        }
    }

    /// Send a text notice (usage help, batch summary) with the same retry policy
    pub async fn notify(&self, chat: &ChatId, text: &str) -> Result<(), DeliveryFailure> {
        with_retry(&self.config.retry, || self.attempt_text(chat, text))
            .await
            .map_err(failure_from)
    }

    async fn attempt_media(
        &self,
        chat: &ChatId,
        asset: &MediaAsset,
        method: DeliveryMethod,
        caption: Option<&str>,
    ) -> Result<(), SendError> {
        let timeout = self.config.send_timeout;
        tokio::time::timeout(timeout, self.channel.send_media(chat, asset, method, caption))
            .await
            .unwrap_or_else(|_| Err(send_timed_out(timeout)))
    }

    async fn attempt_text(&self, chat: &ChatId, text: &str) -> Result<(), SendError> {
        let timeout = self.config.send_timeout;
        tokio::time::timeout(timeout, self.channel.send_text(chat, text))
            .await
            .unwrap_or_else(|_| Err(send_timed_out(timeout)))
    }
}

fn send_timed_out(timeout: std::time::Duration) -> SendError {
    SendError::Transient(format!("send timed out after {timeout:?}"))
}

fn failure_from(exit: RetryExit<SendError>) -> DeliveryFailure {
    match exit {
        RetryExit::Permanent(SendError::Rejected(reason)) => DeliveryFailure::Rejected { reason },
        RetryExit::Permanent(other) => DeliveryFailure::Rejected {
            reason: other.to_string(),
        },
        RetryExit::Exhausted {
            attempts,
            last_error,
        } => DeliveryFailure::ExhaustedRetries {
            attempts,
            last_error: last_error.to_string(),
        },
    }
}

/// Cut `text` to at most `max` characters, marking the cut with an ellipsis
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use std::collections::VecDeque;
    use std::io::Write;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays scripted send results and records what was sent
    #[derive(Default)]
    struct ScriptedChannel {
        results: Mutex<VecDeque<Result<(), SendError>>>,
        sent: Mutex<Vec<(DeliveryMethod, Option<String>)>>,
    }

    impl ScriptedChannel {
        fn with(results: Vec<Result<(), SendError>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
                ..Default::default()
            })
        }
    }

    #[async_trait]
    impl MessagingChannel for ScriptedChannel {
        async fn send_media(
            &self,
            _chat: &ChatId,
            asset: &MediaAsset,
            method: DeliveryMethod,
            caption: Option<&str>,
        ) -> Result<(), SendError> {
            assert!(asset.local_path().exists(), "file must exist while sending");
            self.sent
                .lock()
                .unwrap()
                .push((method, caption.map(str::to_string)));
            self.results.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }

        async fn send_text(&self, _chat: &ChatId, _text: &str) -> Result<(), SendError> {
            self.results.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn fast_config() -> DeliveryConfig {
        DeliveryConfig {
            retry: RetryConfig {
                max_attempts: 2,
                initial_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(20),
                backoff_multiplier: 2.0,
                jitter: false,
            },
            photo_max_bytes: 100,
            inline_media_max_bytes: 1_000,
            ..Default::default()
        }
    }

    fn asset(
        dir: &std::path::Path,
        kind: MediaKind,
        size: u64,
    ) -> (MediaAsset, std::path::PathBuf) {
        let mut file = tempfile::NamedTempFile::new_in(dir).unwrap();
        file.write_all(b"data").unwrap();
        let path = file.path().to_path_buf();
        (MediaAsset::new(kind, file.into_temp_path(), size, "p1".into()), path)
    }

    fn comment(body: &str) -> CommentExcerpt {
        CommentExcerpt {
            author: "a".into(),
            body: body.into(),
            score: 1,
        }
    }

    #[test]
    fn method_follows_kind_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = DeliveryDispatcher::new(fast_config(), ScriptedChannel::with(vec![]));
        let cases = [
            (MediaKind::Image, 100, DeliveryMethod::Photo),
            (MediaKind::Image, 101, DeliveryMethod::Document),
            (MediaKind::Video, 1_000, DeliveryMethod::Video),
            (MediaKind::Video, 1_001, DeliveryMethod::Document),
        ];
        for (kind, size, expected) in cases {
            let (asset, _) = asset(dir.path(), kind, size);
            assert_eq!(dispatcher.choose_method(&asset), expected, "{kind:?} {size}");
        }
    }

    #[test]
    fn caption_lists_comments_and_truncates() {
        let mut config = fast_config();
        config.caption_max_chars = 12;
        let dispatcher = DeliveryDispatcher::new(config, ScriptedChannel::with(vec![]));

        assert_eq!(dispatcher.caption(&[]), None);
        assert_eq!(
            dispatcher.caption(&[comment("hi"), comment(" yo ")]).as_deref(),
            Some("💬 hi\n💬 yo")
        );
        let long = dispatcher.caption(&[comment("abcdefghijklmnop")]).unwrap();
        assert_eq!(long.chars().count(), 12);
        assert!(long.ends_with('…'));
    }

    #[tokio::test]
    async fn success_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let channel = ScriptedChannel::with(vec![Ok(())]);
        let dispatcher = DeliveryDispatcher::new(fast_config(), channel.clone());
        let (asset, path) = asset(dir.path(), MediaKind::Image, 50);

        let delivered = dispatcher
            .deliver(&ChatId(1), asset, &[comment("wow")])
            .await
            .unwrap();

        assert_eq!(delivered.method, DeliveryMethod::Photo);
        assert_eq!(delivered.attempts, 1);
        assert!(!path.exists());
        let sent = channel.sent.lock().unwrap().clone();
        assert_eq!(sent, vec![(DeliveryMethod::Photo, Some("💬 wow".to_string()))]);
    }

    #[tokio::test]
    async fn rate_limit_then_success() {
        let dir = tempfile::tempdir().unwrap();
        let channel = ScriptedChannel::with(vec![
            Err(SendError::RateLimited {
                retry_after: Duration::from_millis(10),
            }),
            Err(SendError::Transient("502".into())),
            Ok(()),
        ]);
        let dispatcher = DeliveryDispatcher::new(fast_config(), channel);
        let (asset, _) = asset(dir.path(), MediaKind::Video, 500);

        let delivered = dispatcher.deliver(&ChatId(1), asset, &[]).await.unwrap();
        assert_eq!(delivered.attempts, 3);
        assert_eq!(delivered.method, DeliveryMethod::Video);
    }

    #[tokio::test]
    async fn rejection_is_terminal_and_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let channel = ScriptedChannel::with(vec![Err(SendError::Rejected("policy".into()))]);
        let dispatcher = DeliveryDispatcher::new(fast_config(), channel.clone());
        let (asset, path) = asset(dir.path(), MediaKind::Image, 50);

        let failure = dispatcher.deliver(&ChatId(1), asset, &[]).await.unwrap_err();
        assert_eq!(
            failure,
            DeliveryFailure::Rejected {
                reason: "policy".into()
            }
        );
        assert_eq!(channel.sent.lock().unwrap().len(), 1);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn transient_failures_exhaust_budget() {
        let dir = tempfile::tempdir().unwrap();
        let channel = ScriptedChannel::with(vec![
            Err(SendError::Transient("a".into())),
            Err(SendError::Transient("b".into())),
            Err(SendError::Transient("c".into())),
            Ok(()),
        ]);
        let dispatcher = DeliveryDispatcher::new(fast_config(), channel.clone());
        let (asset, path) = asset(dir.path(), MediaKind::Image, 50);

        let failure = dispatcher.deliver(&ChatId(1), asset, &[]).await.unwrap_err();
        match failure {
            DeliveryFailure::ExhaustedRetries {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains('c'));
            }
            other => panic!("unexpected failure: {other:?}"),
        }
        assert_eq!(channel.sent.lock().unwrap().len(), 3);
        assert!(!path.exists());
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        assert_eq!(truncate_chars("ééééé", 3), "éé…");
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
