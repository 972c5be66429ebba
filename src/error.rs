//! Error handling types and utilities.

use std::time::Duration;

/// A specialized Result type for convenience paths (config file loading).
///
/// This is an alias for `anyhow::Result` with context added via `.context()` and
/// `.with_context()` methods.
pub type Result<T> = anyhow::Result<T>;

/// Failure reported by the remote record store.
///
/// The store must let callers tell "nothing there" apart from "try again later";
/// the retry and degrade policy depends on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The looked-up entity does not exist.
    #[error("record not found")]
    NotFound,
    /// The store rejected the request because the caller exceeded its request rate.
    #[error("rate limited by remote store")]
    RateLimited { retry_after: Option<Duration> },
    /// Network failure, 5xx or any other condition worth retrying.
    #[error("transient remote failure: {0}")]
    Transient(String),
    /// The call did not complete within the configured request timeout.
    #[error("remote call timed out")]
    Timeout,
}

impl RemoteError {
    /// Whether the call that produced this error should be attempted again.
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::NotFound)
    }
}

/// Invalid resolver configuration. Raised at construction, never at query time.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("threshold must lie in [0, 1), got {0}")]
    Threshold(f64),
    #[error("weight `{name}` must be finite and non-negative, got {value}")]
    Weight { name: &'static str, value: f64 },
    #[error("weight `{0}` must be positive")]
    ZeroPrimaryWeight(&'static str),
    #[error("`{name}` must be at least {min}, got {value}")]
    TooSmall {
        name: &'static str,
        min: u64,
        value: u64,
    },
    #[error("`{name}` must be at most {max}, got {value}")]
    TooLarge {
        name: &'static str,
        max: u64,
        value: u64,
    },
    #[error("rate limit `{0}` must be finite and positive")]
    RateLimit(&'static str),
    #[error("stop word list `{0}` contains an empty or multi-word entry")]
    StopWord(&'static str),
}

/// Error surfaced by a resolution call.
///
/// Per-candidate failures are absorbed inside the pipeline; only these reach the caller.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The primary search failed after exhausting its retries; there is nothing to rank.
    #[error("primary search failed after {attempts} attempt(s): {source}")]
    PrimarySearch {
        attempts: u32,
        #[source]
        source: RemoteError,
    },
    /// The caller abandoned the resolution before it completed.
    #[error("resolution cancelled")]
    Cancelled,
    #[error(transparent)]
    Config(#[from] ConfigError),
}
