//! Backoff for flaky remote calls
//!
//! Listing requests and delivery sends go through [`with_retry`]. Each attempt ends in
//! success, a permanent failure, or a transient one. Transient failures sleep and try
//! again until `max_attempts` retries are spent. A rate-limited send carries the wait the
//! platform asked for, and that wait is used instead of the computed backoff.
//!
//! # Example
//!
//! ```no_run
//! use reddit_relay::retry::{RetryExit, with_retry};
//! use reddit_relay::config::RetryConfig;
//! use reddit_relay::SendError;
//!
//! # async fn example() {
//! let config = RetryConfig::default();
//! match with_retry(&config, || async { Ok::<_, SendError>(()) }).await {
//!     Ok(()) => {}
//!     Err(RetryExit::Permanent(e)) => eprintln!("refused: {e}"),
//!     Err(RetryExit::Exhausted { attempts, last_error }) => {
//!         eprintln!("gave up after {attempts} attempts: {last_error}")
//!     }
//! }
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, SendError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Classifies a failure as worth another attempt or not
pub trait IsRetryable {
    /// True when the same call may succeed if repeated
    fn is_retryable(&self) -> bool;

    /// Wait requested by the remote side before the next attempt, if any
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            // 429 and 5xx from the listing endpoints clear up on their own
            Error::Platform { status, .. } => *status == 429 || *status >= 500,
            Error::Timeout { .. } => true,
            Error::Config { .. }
            | Error::Parse(_)
            | Error::Serialization(_)
            | Error::ExternalTool(_)
            | Error::NotSupported(_)
            | Error::Cancelled
            | Error::Other(_) => false,
        }
    }
}

impl IsRetryable for SendError {
    fn is_retryable(&self) -> bool {
        !matches!(self, SendError::Rejected(_))
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            SendError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

/// Why a retried operation stopped without succeeding
#[derive(Debug)]
pub enum RetryExit<E> {
    /// The operation failed with a non-retryable error
    Permanent(E),
    /// Every attempt failed transiently
    Exhausted {
        /// Attempts made, including the first
        attempts: u32,
        /// Error from the final attempt
        last_error: E,
    },
}

/// Attempt counter and backoff delay for one retried operation
#[derive(Debug, Clone)]
pub struct RetryState {
    attempt: u32,
    delay: Duration,
}

impl RetryState {
    /// Fresh state before the first attempt
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            attempt: 0,
            delay: config.initial_delay,
        }
    }

    /// Attempts made so far
    pub fn attempts(&self) -> u32 {
        self.attempt + 1
    }

    /// Record a transient failure and return how long to wait before the next attempt
    ///
    /// Returns `None` when the retry budget is spent. A `hint` from the remote side is
    /// honored as-is and leaves the backoff untouched. Otherwise the current delay is used
    /// (jittered if configured) and multiplied for the next round, up to `max_delay`.
    pub fn next_wait(&mut self, config: &RetryConfig, hint: Option<Duration>) -> Option<Duration> {
        if self.attempt >= config.max_attempts {
            return None;
        }
        self.attempt += 1;

        if let Some(wait) = hint {
            return Some(wait);
        }

        let current = self.delay;
        self.delay = current
            .mul_f64(config.backoff_multiplier)
            .min(config.max_delay);
        Some(if config.jitter {
            add_jitter(current)
        } else {
            current
        })
    }
}

/// Run `operation` until it succeeds, fails permanently or the retry budget is spent
///
/// Waits between attempts come from [`RetryState::next_wait`]. The error of the final
/// attempt is handed back inside [`RetryExit`] so callers can map it to their own
/// failure codes.
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, RetryExit<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut state = RetryState::new(config);

    loop {
        let e = match operation().await {
            Ok(value) => {
                if state.attempts() > 1 {
                    tracing::info!(attempts = state.attempts(), "call recovered after retrying");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !e.is_retryable() {
            tracing::debug!(error = %e, "call failed permanently");
            return Err(RetryExit::Permanent(e));
        }

        let Some(wait) = state.next_wait(config, e.retry_after()) else {
            tracing::warn!(error = %e, attempts = state.attempts(), "retry budget spent");
            return Err(RetryExit::Exhausted {
                attempts: state.attempts(),
                last_error: e,
            });
        };

        tracing::warn!(
            error = %e,
            retry = state.attempts() - 1,
            max_retries = config.max_attempts,
            wait_ms = wait.as_millis() as u64,
            "call failed, backing off"
        );
        tokio::time::sleep(wait).await;
    }
}

/// Stretch `delay` by a random factor in `[1, 2]`
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(1.0..=2.0);
    delay.mul_f64(factor)
}
