//! Wire models for the public JSON listings and media classification

use crate::types::{
    CommentExcerpt, GifHost, MediaDescriptor, PostId, RawPost, path_has_extension,
};
use chrono::DateTime;
use serde::Deserialize;
use std::collections::HashMap;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];
const CLIP_EXTENSIONS: &[&str] = &["mp4", "webm", "gifv"];

/// `{"kind": "Listing", "data": {...}}`
#[derive(Debug, Deserialize)]
pub(crate) struct Listing<T> {
    pub data: ListingData<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListingData<T> {
    #[serde(default = "Vec::new")]
    pub children: Vec<Thing<T>>,
    #[serde(default)]
    pub after: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Thing<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct PostData {
    pub id: String,
    pub subreddit: String,
    pub title: String,
    pub author: String,
    pub permalink: String,
    pub url: Option<String>,
    pub domain: String,
    pub selftext: String,
    pub score: i64,
    pub over_18: bool,
    pub num_comments: u64,
    pub created_utc: Option<f64>,
    pub removed_by_category: Option<String>,
    pub is_video: bool,
    pub is_gallery: bool,
    pub post_hint: Option<String>,
    pub gallery_data: Option<GalleryData>,
    pub media_metadata: Option<HashMap<String, GalleryItemMeta>>,
    pub secure_media: Option<EmbeddedMedia>,
    pub media: Option<EmbeddedMedia>,
    pub crosspost_parent_list: Option<Vec<PostData>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct GalleryData {
    pub items: Vec<GalleryItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct GalleryItem {
    pub media_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct GalleryItemMeta {
    pub status: Option<String>,
    /// "Image" or "AnimatedImage"
    pub e: Option<String>,
    pub s: Option<GallerySource>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct GallerySource {
    pub u: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct EmbeddedMedia {
    pub reddit_video: Option<RedditVideo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RedditVideo {
    pub fallback_url: Option<String>,
}

/// Comment payload; `more` stubs deserialize with empty fields
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct CommentData {
    pub author: Option<String>,
    pub body: Option<String>,
    pub score: i64,
    pub stickied: bool,
}

impl PostData {
    fn is_removed(&self) -> bool {
        self.removed_by_category.is_some()
            || matches!(self.selftext.as_str(), "[removed]" | "[deleted]")
    }

    fn hosted_video_fallback(&self) -> Option<String> {
        let own = [&self.secure_media, &self.media]
            .into_iter()
            .flatten()
            .filter_map(|m| m.reddit_video.as_ref())
            .find_map(|v| v.fallback_url.clone());
        own.or_else(|| {
            self.crosspost_parent_list
                .iter()
                .flatten()
                .find_map(PostData::hosted_video_fallback)
        })
    }

    fn gallery_urls(&self) -> Vec<String> {
        let (Some(gallery), Some(metadata)) = (&self.gallery_data, &self.media_metadata) else {
            return Vec::new();
        };
        gallery
            .items
            .iter()
            .filter_map(|item| metadata.get(&item.media_id))
            .filter(|meta| meta.status.as_deref().is_none_or(|s| s == "valid"))
            .filter(|meta| meta.e.as_deref() == Some("Image"))
            .filter_map(|meta| meta.s.as_ref()?.u.as_deref())
            .map(|u| u.replace("&amp;", "&"))
            .collect()
    }

    /// Work out how this post presents its media, if it has any
    pub(crate) fn classify(&self) -> Option<MediaDescriptor> {
        if self.is_gallery {
            let urls = self.gallery_urls();
            return (!urls.is_empty()).then_some(MediaDescriptor::Gallery { urls });
        }

        let url = self.url.as_deref()?;
        let host = host_of(url).unwrap_or_default();

        if self.is_video || host == "v.redd.it" {
            return Some(MediaDescriptor::HostedVideo {
                url: url.to_string(),
                fallback_url: self.hosted_video_fallback(),
            });
        }

        if let Some(gif_host) = gif_host_for(&host, url) {
            return Some(MediaDescriptor::ExternalGifHost {
                host: gif_host,
                url: url.to_string(),
            });
        }

        if path_has_extension(url, IMAGE_EXTENSIONS)
            || host == "i.redd.it"
            || self.post_hint.as_deref() == Some("image")
        {
            return Some(MediaDescriptor::DirectImage {
                url: url.to_string(),
            });
        }

        None
    }

    pub(crate) fn into_raw_post(self) -> RawPost {
        let media = self.classify();
        let removed = self.is_removed();
        RawPost {
            id: PostId(self.id),
            subreddit: self.subreddit,
            title: self.title,
            author: self.author,
            permalink: self.permalink,
            url: self.url.unwrap_or_default(),
            score: self.score,
            nsfw: self.over_18,
            removed,
            num_comments: self.num_comments,
            created_utc: self
                .created_utc
                .and_then(|secs| DateTime::from_timestamp(secs as i64, 0)),
            media,
        }
    }
}

impl CommentData {
    pub(crate) fn into_excerpt(self) -> Option<CommentExcerpt> {
        if self.stickied {
            return None;
        }
        Some(CommentExcerpt {
            author: self.author?,
            body: self.body?,
            score: self.score,
        })
    }
}

fn host_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

fn gif_host_for(host: &str, url: &str) -> Option<GifHost> {
    let on = |domain: &str| host == domain || host.ends_with(&format!(".{domain}"));
    if on("imgur.com") && path_has_extension(url, &["gifv", "mp4"]) {
        Some(GifHost::Imgur)
    } else if on("streamable.com") {
        Some(GifHost::Streamable)
    } else if on("redgifs.com") {
        Some(GifHost::Redgifs)
    } else if path_has_extension(url, CLIP_EXTENSIONS) {
        Some(GifHost::Generic)
    } else {
        None
    }
}
