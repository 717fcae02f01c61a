//! Public JSON API client

use super::listing::{CommentData, Listing, PostData};
use super::{DiscussionPlatform, ListingPage, ListingQuery};
use crate::config::FetchConfig;
use crate::error::{Error, Result};
use crate::types::{CommentExcerpt, PostId};
use async_trait::async_trait;
use serde::de::{DeserializeOwned, IgnoredAny};
use tracing::debug;
use url::Url;

/// Read-only client for the platform's public `.json` endpoints
///
/// Cheap to clone; one instance is shared by every request.
#[derive(Clone, Debug)]
pub struct RedditClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl RedditClient {
    /// Create a client from fetch settings
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.listing_timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.reddit_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build the listing or search URL for a query
    ///
    /// With a time filter the "top" sort for that window is used, without one the
    /// "hot" listing (or relevance search over all time).
    pub fn listing_url(&self, query: &ListingQuery) -> Result<Url> {
        let sub = &query.subreddit;
        let mut url = match &query.search {
            Some(_) => self.url(&format!("/r/{sub}/search.json"))?,
            None if query.time_filter.is_some() => self.url(&format!("/r/{sub}/top.json"))?,
            None => self.url(&format!("/r/{sub}/hot.json"))?,
        };

        {
            let mut pairs = url.query_pairs_mut();
            if let Some(search) = &query.search {
                pairs
                    .append_pair("q", search)
                    .append_pair("restrict_sr", "1")
                    .append_pair(
                        "sort",
                        if query.time_filter.is_some() {
                            "top"
                        } else {
                            "relevance"
                        },
                    );
            }
            if query.search.is_some() || query.time_filter.is_some() {
                let window = query.time_filter.map(|t| t.as_str()).unwrap_or("all");
                pairs.append_pair("t", window);
            }
            pairs
                .append_pair("limit", &query.limit.to_string())
                .append_pair("raw_json", "1");
            if let Some(after) = &query.after {
                pairs.append_pair("after", after);
            }
        }
        Ok(url)
    }

    fn url(&self, path: &str) -> Result<Url> {
        let raw = format!("{}{}", self.base_url, path);
        Url::parse(&raw).map_err(|e| Error::Other(format!("Invalid platform URL '{raw}': {e}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, what: &str) -> Result<T> {
        debug!(%url, "platform request");
        let response = self.http_client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(Error::Platform {
                status: response.status().as_u16(),
                message: what.to_string(),
            });
        }

        // Redirects to the login or search page come back as HTML
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl DiscussionPlatform for RedditClient {
    async fn list_posts(&self, query: &ListingQuery) -> Result<ListingPage> {
        let url = self.listing_url(query)?;
        let listing: Listing<PostData> = self
            .get_json(url, &format!("listing r/{}", query.subreddit))
            .await?;

        let posts: Vec<_> = listing
            .data
            .children
            .into_iter()
            .filter(|thing| thing.kind == "t3")
            .map(|thing| thing.data.into_raw_post())
            .collect();

        debug!(
            subreddit = %query.subreddit,
            posts = posts.len(),
            has_more = listing.data.after.is_some(),
            "listing page fetched"
        );

        Ok(ListingPage {
            posts,
            after: listing.data.after,
        })
    }

    async fn list_top_comments(
        &self,
        post_id: &PostId,
        limit: usize,
    ) -> Result<Vec<CommentExcerpt>> {
        let mut url = self.url(&format!("/comments/{post_id}.json"))?;
        url.query_pairs_mut()
            .append_pair("sort", "top")
            .append_pair("depth", "1")
            .append_pair("limit", &limit.to_string())
            .append_pair("raw_json", "1");

        let (_post, comments): (Listing<IgnoredAny>, Listing<CommentData>) = self
            .get_json(url, &format!("comments for {post_id}"))
            .await?;

        Ok(comments
            .data
            .children
            .into_iter()
            .filter(|thing| thing.kind == "t1")
            .filter_map(|thing| thing.data.into_excerpt())
            .take(limit)
            .collect())
    }
}
