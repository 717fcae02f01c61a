//! Direct clip URLs for external gif hosts

use crate::config::MediaConfig;
use crate::error::{Error, ResolutionFailure};
use crate::types::GifHost;
use serde::Deserialize;
use url::Url;

#[derive(Debug, Deserialize)]
struct StreamableVideo {
    #[serde(default)]
    files: std::collections::HashMap<String, StreamableFile>,
}

#[derive(Debug, Deserialize)]
struct StreamableFile {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RedgifsToken {
    token: String,
}

#[derive(Debug, Deserialize)]
struct RedgifsGif {
    gif: RedgifsItem,
}

#[derive(Debug, Deserialize)]
struct RedgifsItem {
    urls: RedgifsUrls,
}

#[derive(Debug, Deserialize)]
struct RedgifsUrls {
    hd: Option<String>,
    sd: Option<String>,
}

/// Turn a gif-host link into a URL that serves the media file itself
///
/// Generic hosts are returned unchanged; the download follows their redirects and the
/// response's content type decides what the file is.
pub(crate) async fn direct_url(
    client: &reqwest::Client,
    config: &MediaConfig,
    host: GifHost,
    url: &str,
) -> std::result::Result<String, ResolutionFailure> {
    match host {
        GifHost::Imgur => Ok(imgur_mp4(url)),
        GifHost::Streamable => streamable(client, config, url).await,
        GifHost::Redgifs => redgifs(client, config, url).await,
        GifHost::Generic => Ok(url.to_string()),
    }
}

fn imgur_mp4(url: &str) -> String {
    match url.split_once(".gifv") {
        Some((base, rest)) => format!("{base}.mp4{rest}"),
        None => url.to_string(),
    }
}

/// Last non-empty path segment (`https://streamable.com/abcd` -> `abcd`)
fn slug(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.rev().find(|s| !s.is_empty())?;
    let stem = segment.split('.').next().unwrap_or(segment);
    (!stem.is_empty()).then(|| stem.to_string())
}

fn complete_scheme(url: String) -> String {
    if url.starts_with("//") {
        format!("https:{url}")
    } else {
        url
    }
}

async fn get_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
    what: &str,
) -> std::result::Result<T, ResolutionFailure> {
    let response = request.send().await.map_err(Error::from)?;
    if !response.status().is_success() {
        return Err(ResolutionFailure::unavailable(format!(
            "{what} returned {}",
            response.status()
        )));
    }
    let body = response.bytes().await.map_err(Error::from)?;
    serde_json::from_slice(&body)
        .map_err(|e| ResolutionFailure::unavailable(format!("{what} sent unexpected data: {e}")))
}

async fn streamable(
    client: &reqwest::Client,
    config: &MediaConfig,
    url: &str,
) -> std::result::Result<String, ResolutionFailure> {
    let code = slug(url).ok_or_else(|| ResolutionFailure::unsupported(url))?;
    let api = format!("{}/videos/{code}", config.streamable_api_url.trim_end_matches('/'));
    let video: StreamableVideo = get_json(client.get(&api), "streamable").await?;

    ["mp4", "mp4-mobile"]
        .iter()
        .find_map(|key| video.files.get(*key)?.url.clone())
        .map(complete_scheme)
        .ok_or_else(|| ResolutionFailure::unavailable(format!("streamable has no mp4 for {code}")))
}

async fn redgifs(
    client: &reqwest::Client,
    config: &MediaConfig,
    url: &str,
) -> std::result::Result<String, ResolutionFailure> {
    let id = slug(url)
        .map(|s| s.to_ascii_lowercase())
        .ok_or_else(|| ResolutionFailure::unsupported(url))?;
    let api = config.redgifs_api_url.trim_end_matches('/');

    let auth: RedgifsToken =
        get_json(client.get(format!("{api}/v2/auth/temporary")), "redgifs auth").await?;
    let gif: RedgifsGif = get_json(
        client
            .get(format!("{api}/v2/gifs/{id}"))
            .bearer_auth(&auth.token),
        "redgifs",
    )
    .await?;

    gif.gif
        .urls
        .hd
        .or(gif.gif.urls.sd)
        .ok_or_else(|| ResolutionFailure::unavailable(format!("redgifs has no video for {id}")))
}
