//! Top comment excerpts

use crate::config::CommentConfig;
use crate::reddit::DiscussionPlatform;
use crate::types::{CommentExcerpt, PostId};
use std::sync::Arc;
use tracing::{debug, warn};

/// Comments requested from the platform per post; hygiene filtering drops some of them
const SCAN_WINDOW: usize = 25;

/// Fetches the best comments of a post
///
/// Never fails: any platform error or timeout yields an empty list, so comments can only
/// ever add to a delivery.
pub struct CommentFetcher {
    config: CommentConfig,
    platform: Arc<dyn DiscussionPlatform>,
}

impl CommentFetcher {
    /// Create a comment fetcher
    pub fn new(config: CommentConfig, platform: Arc<dyn DiscussionPlatform>) -> Self {
        Self { config, platform }
    }

    /// Number of comments attached when none is given explicitly
    pub fn default_count(&self) -> usize {
        self.config.top_comment_count
    }

    /// Up to `n` comments, highest score first; equal scores keep platform order
    pub async fn fetch_top(&self, post_id: &PostId, n: usize) -> Vec<CommentExcerpt> {
        if n == 0 {
            return Vec::new();
        }

        let listed = tokio::time::timeout(
            self.config.fetch_timeout,
            self.platform.list_top_comments(post_id, SCAN_WINDOW.max(n)),
        )
        .await;

        let mut comments = match listed {
            Ok(Ok(comments)) => comments,
            Ok(Err(e)) => {
                warn!(post_id = %post_id, error = %e, "comment fetch failed, continuing without");
                return Vec::new();
            }
            Err(_) => {
                warn!(
                    post_id = %post_id,
                    timeout_secs = self.config.fetch_timeout.as_secs(),
                    "comment fetch timed out, continuing without"
                );
                return Vec::new();
            }
        };

        comments.retain(|c| self.is_presentable(c));
        // stable sort keeps platform order among equal scores
        comments.sort_by(|a, b| b.score.cmp(&a.score));
        comments.truncate(n);

        debug!(post_id = %post_id, count = comments.len(), "comments selected");
        comments
    }

    fn is_presentable(&self, comment: &CommentExcerpt) -> bool {
        let body = comment.body.trim();
        if body.is_empty() {
            return false;
        }
        let lowered = body.to_lowercase();
        !self
            .config
            .blocked_substrings
            .iter()
            .any(|blocked| lowered.contains(&blocked.to_lowercase()))
    }
}
