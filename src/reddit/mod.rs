//! Discussion-platform collaborator
//!
//! The pipeline only sees the [`DiscussionPlatform`] trait. [`RedditClient`] implements it
//! against the platform's public JSON endpoints; tests substitute in-memory fakes.

mod client;
pub(crate) mod listing;

pub use client::RedditClient;

use crate::error::Result;
use crate::types::{CommentExcerpt, PostId, RawPost, TimeFilter};
use async_trait::async_trait;

/// One page request against a single subreddit
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingQuery {
    /// Subreddit name (without `r/`)
    pub subreddit: String,
    /// Time window; `None` selects the "hot" ordering
    pub time_filter: Option<TimeFilter>,
    /// Search query; `None` lists the subreddit instead of searching it
    pub search: Option<String>,
    /// Posts per page
    pub limit: usize,
    /// Pagination cursor returned by the previous page
    pub after: Option<String>,
}

/// One page of posts
#[derive(Debug, Default)]
pub struct ListingPage {
    /// Posts in platform order
    pub posts: Vec<RawPost>,
    /// Cursor for the next page; `None` when the listing is exhausted
    pub after: Option<String>,
}

/// Read access to the discussion platform
#[async_trait]
pub trait DiscussionPlatform: Send + Sync {
    /// Fetch one page of posts for a subreddit
    async fn list_posts(&self, query: &ListingQuery) -> Result<ListingPage>;

    /// Fetch up to `limit` top-level comments of a post, best first
    async fn list_top_comments(&self, post_id: &PostId, limit: usize)
    -> Result<Vec<CommentExcerpt>>;
}
