//! # reddit-relay
//!
//! Fetches media posts from subreddits, turns them into files a chat can accept and relays them.
//!
//! ## Design Philosophy
//!
//! reddit-relay is designed to be:
//! - **Failure tolerant** - One dead link or oversized video never sinks a batch
//! - **Sensible defaults** - Works out of the box with zero configuration
//! - **Library-first** - No bot runtime, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use reddit_relay::{ChatId, Config, PipelineOrchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let relay = PipelineOrchestrator::connect(Config::default(), "123456:bot-token")?;
//!
//!     // Subscribe to events
//!     let mut events = relay.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let cancel = CancellationToken::new();
//!     tokio::spawn(reddit_relay::cancel_on_shutdown(cancel.clone()));
//!
//!     let summary = relay.run(&ChatId(42), "/r week earthporn 3 -c", &cancel).await?;
//!     println!("delivered {}/{}", summary.delivered, summary.requested);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Fetch command parsing
pub mod command;
/// Top comment excerpts
pub mod comments;
/// Configuration types
pub mod config;
/// Delivery to the messaging endpoint
pub mod delivery;
/// Error types
pub mod error;
/// Candidate discovery and resolution
pub mod fetcher;
/// Media resolution and normalization
pub mod media;
/// Request orchestration
pub mod pipeline;
/// Discussion platform access
pub mod reddit;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use comments::CommentFetcher;
pub use config::{
    CommentConfig, Config, DeliveryConfig, FetchConfig, GalleryMode, MediaConfig, RetryConfig,
    ToolsConfig,
};
pub use delivery::{DeliveryDispatcher, MessagingChannel, TelegramChannel};
pub use error::{
    DeliveryFailure, Error, ItemFailure, ParseError, ResolutionFailure, Result, SendError,
};
pub use fetcher::PostFetcher;
pub use media::{CliMediaTool, MediaResolver, MediaTool};
pub use pipeline::PipelineOrchestrator;
pub use reddit::{DiscussionPlatform, RedditClient};
pub use types::{
    BatchSummary, ChatId, CommentExcerpt, DeliveryMethod, Event, FetchRequest, MediaAsset,
    MediaDescriptor, MediaKind, MediaTypeFilter, PostId, RawPost, RequestId, Stage, TimeFilter,
};

use tokio_util::sync::CancellationToken;

/// Cancel `token` once the process is asked to stop.
///
/// Every request running with this token stops and removes its temporary files.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn cancel_on_shutdown(token: CancellationToken) {
    tokio::select! {
        _ = wait_for_signal() => token.cancel(),
        _ = token.cancelled() => {}
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM, cancelling requests"),
                _ = sigint.recv() => tracing::info!("Received SIGINT, cancelling requests"),
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(
                error = %e,
                "Could not register SIGTERM handler, waiting for SIGINT only"
            );
            sigint.recv().await;
            tracing::info!("Received SIGINT, cancelling requests");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(
                error = %e,
                "Could not register SIGINT handler, waiting for SIGTERM only"
            );
            sigterm.recv().await;
            tracing::info!("Received SIGTERM, cancelling requests");
        }
        (Err(e), Err(_)) => {
            tracing::error!(
                error = %e,
                "Could not register any signal handlers, using ctrl_c fallback"
            );
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C, cancelling requests"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
