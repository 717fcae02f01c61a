//! Post builders and a mock media host

use reddit_relay::{CommentExcerpt, MediaDescriptor, PostId, RawPost};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A listed post without media
pub fn text_post(id: &str, subreddit: &str) -> RawPost {
    RawPost {
        id: PostId::new(id),
        subreddit: subreddit.to_string(),
        title: format!("post {id}"),
        author: "someone".to_string(),
        permalink: format!("/r/{subreddit}/comments/{id}/"),
        url: format!("https://www.reddit.com/r/{subreddit}/comments/{id}/"),
        score: 100,
        nsfw: false,
        removed: false,
        num_comments: 10,
        created_utc: None,
        media: None,
    }
}

/// A post linking straight to one image
pub fn image_post(id: &str, subreddit: &str, url: &str) -> RawPost {
    RawPost {
        url: url.to_string(),
        media: Some(MediaDescriptor::DirectImage {
            url: url.to_string(),
        }),
        ..text_post(id, subreddit)
    }
}

/// A gallery post with images in the given order
pub fn gallery_post(id: &str, subreddit: &str, urls: &[String]) -> RawPost {
    RawPost {
        media: Some(MediaDescriptor::Gallery {
            urls: urls.to_vec(),
        }),
        ..text_post(id, subreddit)
    }
}

/// A platform-hosted video post
pub fn video_post(id: &str, subreddit: &str, url: &str, fallback_url: Option<&str>) -> RawPost {
    RawPost {
        url: url.to_string(),
        media: Some(MediaDescriptor::HostedVideo {
            url: url.to_string(),
            fallback_url: fallback_url.map(str::to_string),
        }),
        ..text_post(id, subreddit)
    }
}

/// A comment excerpt
pub fn comment(author: &str, body: &str, score: i64) -> CommentExcerpt {
    CommentExcerpt {
        author: author.to_string(),
        body: body.to_string(),
        score,
    }
}

/// Mock host serving media files at fixed paths
pub struct MediaHost {
    server: MockServer,
}

impl MediaHost {
    /// Start an empty host
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Absolute URL for `file_path`
    pub fn url(&self, file_path: &str) -> String {
        format!("{}{}", self.server.uri(), file_path)
    }

    /// Serve a JPEG of `len` bytes at `file_path` and return its URL
    pub async fn jpeg(&self, file_path: &str, len: usize) -> String {
        self.serve(file_path, len, "image/jpeg").await
    }

    /// Serve a GIF of `len` bytes at `file_path` and return its URL
    pub async fn gif(&self, file_path: &str, len: usize) -> String {
        self.serve(file_path, len, "image/gif").await
    }

    /// Serve an MP4 of `len` bytes at `file_path` and return its URL
    pub async fn mp4(&self, file_path: &str, len: usize) -> String {
        self.serve(file_path, len, "video/mp4").await
    }

    /// Answer `file_path` with 404 and return its URL
    pub async fn missing(&self, file_path: &str) -> String {
        Mock::given(method("GET"))
            .and(path(file_path))
            .respond_with(ResponseTemplate::new(404))
            .mount(&self.server)
            .await;
        self.url(file_path)
    }

    async fn serve(&self, file_path: &str, len: usize, mime: &str) -> String {
        Mock::given(method("GET"))
            .and(path(file_path))
            .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0xAB; len], mime))
            .mount(&self.server)
            .await;
        self.url(file_path)
    }
}
