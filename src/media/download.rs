//! Direct HTTP downloads with type and size validation

use crate::error::{Error, ResolutionFailure};
use crate::types::path_has_extension;
use reqwest::header::CONTENT_TYPE;
use std::path::Path;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

/// What a downloaded file turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileKind {
    /// Still image with the given file extension
    Image(&'static str),
    /// Animated GIF
    Animation,
    /// Video with the given file extension
    Video(&'static str),
}

impl FileKind {
    /// Classify by content type, falling back to the URL's extension
    pub(crate) fn detect(content_type: Option<&str>, url: &str) -> Option<Self> {
        let mime = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase());

        match mime.as_deref() {
            Some("image/jpeg" | "image/jpg") => return Some(FileKind::Image("jpg")),
            Some("image/png") => return Some(FileKind::Image("png")),
            Some("image/webp") => return Some(FileKind::Image("webp")),
            Some("image/gif") => return Some(FileKind::Animation),
            Some("video/mp4") => return Some(FileKind::Video("mp4")),
            Some("video/webm") => return Some(FileKind::Video("webm")),
            Some("video/quicktime") => return Some(FileKind::Video("mov")),
            _ => {}
        }

        if path_has_extension(url, &["jpg", "jpeg"]) {
            Some(FileKind::Image("jpg"))
        } else if path_has_extension(url, &["png"]) {
            Some(FileKind::Image("png"))
        } else if path_has_extension(url, &["webp"]) {
            Some(FileKind::Image("webp"))
        } else if path_has_extension(url, &["gif"]) {
            Some(FileKind::Animation)
        } else if path_has_extension(url, &["mp4"]) {
            Some(FileKind::Video("mp4"))
        } else if path_has_extension(url, &["webm"]) {
            Some(FileKind::Video("webm"))
        } else {
            None
        }
    }

    pub(crate) fn extension(&self) -> &'static str {
        match self {
            FileKind::Image(ext) | FileKind::Video(ext) => ext,
            FileKind::Animation => "gif",
        }
    }
}

/// A fully downloaded file, deleted when dropped
#[derive(Debug)]
pub(crate) struct Fetched {
    pub path: TempPath,
    pub kind: FileKind,
    pub size: u64,
}

/// Create an empty scratch file `<stem>-XXXX.<ext>` in `dir`
pub(crate) fn scratch_file(dir: &Path, stem: &str, ext: &str) -> std::io::Result<TempPath> {
    let suffix = format!(".{ext}");
    Ok(tempfile::Builder::new()
        .prefix(&format!("{stem}-"))
        .suffix(&suffix)
        .tempfile_in(dir)?
        .into_temp_path())
}

/// Download `url` into `dir`, rejecting unsupported types and anything over `max_bytes`
///
/// Nothing is left on disk when this returns an error.
pub(crate) async fn fetch(
    client: &reqwest::Client,
    url: &str,
    dir: &Path,
    stem: &str,
    max_bytes: u64,
) -> std::result::Result<Fetched, ResolutionFailure> {
    let mut response = client.get(url).send().await.map_err(Error::from)?;

    let status = response.status();
    if !status.is_success() {
        return Err(ResolutionFailure::unavailable(format!("HTTP {status} for {url}")));
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    // Classify by the final URL so redirecting short links get the real extension
    let final_url = response.url().to_string();
    let kind = FileKind::detect(content_type.as_deref(), &final_url).ok_or_else(|| {
        ResolutionFailure::unsupported(content_type.clone().unwrap_or_else(|| final_url.clone()))
    })?;

    if let Some(length) = response.content_length()
        && length > max_bytes
    {
        return Err(ResolutionFailure::TooLargeAfterCompression {
            size_bytes: length,
            ceiling_bytes: max_bytes,
        });
    }

    let path = scratch_file(dir, stem, kind.extension()).map_err(Error::from)?;
    let mut file = tokio::fs::File::create(&path).await.map_err(Error::from)?;
    let mut size: u64 = 0;

    while let Some(chunk) = response.chunk().await.map_err(Error::from)? {
        size += chunk.len() as u64;
        if size > max_bytes {
            return Err(ResolutionFailure::TooLargeAfterCompression {
                size_bytes: size,
                ceiling_bytes: max_bytes,
            });
        }
        file.write_all(&chunk).await.map_err(Error::from)?;
    }
    file.flush().await.map_err(Error::from)?;

    if size == 0 {
        return Err(ResolutionFailure::unavailable(format!("empty response from {url}")));
    }

    tracing::debug!(url, size, ?kind, "media downloaded");
    Ok(Fetched { path, kind, size })
}
