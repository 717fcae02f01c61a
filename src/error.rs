//! Error types for reddit-relay
//!
//! This module provides the error taxonomy for the relay pipeline:
//! - [`Error`], the crate-wide error for infrastructure failures (network, I/O, tools, config)
//! - [`ParseError`], the only failure that aborts a request
//! - [`ResolutionFailure`] and [`DeliveryFailure`], terminal per-item outcomes that are
//!   aggregated into a batch summary instead of aborting the batch
//! - [`SendError`], the transient/permanent signal returned by a messaging channel

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for reddit-relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for reddit-relay
///
/// Every external call (HTTP, subprocess, filesystem) is converted into one of these
/// variants before it reaches pipeline code.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "media.resolve_concurrency")
        key: Option<String>,
    },

    /// The command could not be parsed
    #[error("invalid command: {0}")]
    Parse(#[from] ParseError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The discussion platform or a media host answered with an error status
    #[error("platform returned {status}: {message}")]
    Platform {
        /// HTTP status code
        status: u16,
        /// Short description of what was requested
        message: String,
    },

    /// External tool execution failed (yt-dlp, ffmpeg)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// An operation exceeded its time budget
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// Operation that timed out
        operation: &'static str,
        /// Budget that was exceeded
        timeout: Duration,
    },

    /// Operation not supported (missing binary, unknown media host, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The request was cancelled before it completed
    #[error("request cancelled")]
    Cancelled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Usage text shown to the user when a command cannot be parsed
pub const USAGE_MESSAGE: &str = "Usage: /r [all/year/month/week] <subreddit[,subreddit...]> \
[term(s)] [count 1-5] [image/video] [-c]\n\n\
Flags:\n  -c  Include top comments\n\n\
Example: /r week cats,aww orange 3 video -c";

/// Failure to turn a command string into a [`crate::types::FetchRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The command had no arguments at all
    #[error("no arguments given")]
    EmptyCommand,

    /// No token could be identified as a subreddit list
    #[error("no subreddit given")]
    NoTargets,
}

impl ParseError {
    /// Message sent back to the user when this error aborts a request
    pub fn user_message(&self) -> String {
        match self {
            ParseError::EmptyCommand => USAGE_MESSAGE.to_string(),
            ParseError::NoTargets => {
                format!("Please specify at least one valid subreddit.\n\n{USAGE_MESSAGE}")
            }
        }
    }
}

/// Terminal outcome of resolving one post's media
///
/// Failures never carry a partially written file: the resolver deletes every temporary
/// file from the failed attempt before returning one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ResolutionFailure {
    /// Neither the content type nor the file extension describes supported media
    #[error("unsupported format: {detail}")]
    UnsupportedFormat {
        /// What was found instead (content type, extension or host)
        detail: String,
    },

    /// The file could not be brought under the size ceiling
    #[error("too large after compression: {size_bytes} bytes exceeds {ceiling_bytes} bytes")]
    TooLargeAfterCompression {
        /// Size of the smallest file produced
        size_bytes: u64,
        /// Configured per-asset ceiling
        ceiling_bytes: u64,
    },

    /// Resolution did not finish within its wall-clock budget
    #[error("resolution timed out after {timeout_secs}s")]
    FetchTimeout {
        /// Budget in seconds
        timeout_secs: u64,
    },

    /// The media could not be retrieved (dead link, host error, tool failure)
    #[error("source unavailable: {reason}")]
    SourceUnavailable {
        /// Why the source could not be retrieved
        reason: String,
    },
}

impl ResolutionFailure {
    /// Stable machine-readable reason code
    pub fn code(&self) -> &'static str {
        match self {
            ResolutionFailure::UnsupportedFormat { .. } => "unsupported_format",
            ResolutionFailure::TooLargeAfterCompression { .. } => "too_large_after_compression",
            ResolutionFailure::FetchTimeout { .. } => "fetch_timeout",
            ResolutionFailure::SourceUnavailable { .. } => "source_unavailable",
        }
    }

    pub(crate) fn unavailable(reason: impl Into<String>) -> Self {
        ResolutionFailure::SourceUnavailable {
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(detail: impl Into<String>) -> Self {
        ResolutionFailure::UnsupportedFormat {
            detail: detail.into(),
        }
    }
}

impl From<Error> for ResolutionFailure {
    fn from(err: Error) -> Self {
        match err {
            Error::Timeout { timeout, .. } => ResolutionFailure::FetchTimeout {
                timeout_secs: timeout.as_secs(),
            },
            Error::Network(e) if e.is_timeout() => ResolutionFailure::FetchTimeout {
                timeout_secs: 0,
            },
            Error::NotSupported(detail) => ResolutionFailure::UnsupportedFormat { detail },
            other => ResolutionFailure::SourceUnavailable {
                reason: other.to_string(),
            },
        }
    }
}

/// Terminal outcome of delivering one asset
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum DeliveryFailure {
    /// The messaging platform permanently refused the item (content policy, bad file)
    #[error("rejected: {reason}")]
    Rejected {
        /// Reason reported by the platform
        reason: String,
    },

    /// Every attempt in the retry budget failed transiently
    #[error("gave up after {attempts} attempts: {last_error}")]
    ExhaustedRetries {
        /// Number of attempts made
        attempts: u32,
        /// Error from the final attempt
        last_error: String,
    },
}

impl DeliveryFailure {
    /// Stable machine-readable reason code
    pub fn code(&self) -> &'static str {
        match self {
            DeliveryFailure::Rejected { .. } => "rejected",
            DeliveryFailure::ExhaustedRetries { .. } => "exhausted_retries",
        }
    }
}

/// Error signal from a messaging channel send
///
/// `RateLimited` and `Transient` are retried by the dispatcher and never surface to the user
/// directly; `Rejected` is terminal for the item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The platform asked us to slow down for the given interval
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Interval requested by the platform
        retry_after: Duration,
    },

    /// Permanent refusal of this item
    #[error("rejected: {0}")]
    Rejected(String),

    /// Network hiccup, timeout or server-side error
    #[error("transient failure: {0}")]
    Transient(String),
}

impl From<reqwest::Error> for SendError {
    fn from(e: reqwest::Error) -> Self {
        // request URLs can carry credentials (the Bot API puts the token in the path)
        SendError::Transient(e.without_url().to_string())
    }
}

impl From<std::io::Error> for SendError {
    fn from(e: std::io::Error) -> Self {
        SendError::Rejected(format!("cannot read upload: {e}"))
    }
}

/// Per-item failure recorded in a batch summary
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum ItemFailure {
    /// Media resolution failed
    #[error("{0}")]
    Resolution(ResolutionFailure),
    /// Delivery failed
    #[error("{0}")]
    Delivery(DeliveryFailure),
}

impl ItemFailure {
    /// Reason code of the underlying failure
    pub fn code(&self) -> &'static str {
        match self {
            ItemFailure::Resolution(f) => f.code(),
            ItemFailure::Delivery(f) => f.code(),
        }
    }
}
