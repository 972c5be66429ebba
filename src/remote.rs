//! Remote-call policy: request pacing, per-call timeout and retry with backoff.
//!
//! A [`RemoteCaller`] is created for one resolution and dropped with it, so its
//! token bucket never carries state from one query into the next.

use crate::config::{RateLimitConfig, ResolverConfig, RetryConfig};
use crate::error::RemoteError;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep, timeout};

const MAX_PACER_WAIT: Duration = Duration::from_secs(1);

/// Token bucket pacing the remote calls of a single resolution.
#[derive(Debug)]
pub struct RequestPacer {
    config: RateLimitConfig,
    bucket: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RequestPacer {
    /// Build a pacer. A rate that could never refill is replaced by the default one.
    pub fn new(config: RateLimitConfig) -> Self {
        let config = if config.capacity.is_finite()
            && config.capacity >= 1.0
            && config.refill_per_sec.is_finite()
            && config.refill_per_sec > 0.0
        {
            config
        } else {
            tracing::warn!("Ignoring unusable request rate {:?}; using the default", config);
            RateLimitConfig::default()
        };
        let bucket = Bucket {
            tokens: config.capacity,
            last_refill: Instant::now(),
        };
        Self {
            config,
            bucket: Mutex::new(bucket),
        }
    }

    /// Wait until a request may be sent.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                bucket.last_refill = now;
                bucket.tokens =
                    (bucket.tokens + elapsed * self.config.refill_per_sec).min(self.config.capacity);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::try_from_secs_f64((1.0 - bucket.tokens) / self.config.refill_per_sec)
                    .map_or(MAX_PACER_WAIT, |wait| wait.min(MAX_PACER_WAIT))
            };
            tracing::trace!("Request pacer waiting {:?}", wait);
            sleep(wait).await;
        }
    }
}

/// Outcome of a call that exhausted its attempts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{error} (after {attempts} attempt(s))")]
pub struct CallFailure {
    pub attempts: u32,
    pub error: RemoteError,
}

/// Applies pacing, timeout and retry to every remote call of one resolution.
#[derive(Debug)]
pub struct RemoteCaller {
    pacer: Option<RequestPacer>,
    retry: RetryConfig,
    request_timeout: Duration,
}

impl RemoteCaller {
    pub fn new(config: &ResolverConfig) -> Self {
        Self {
            pacer: config.rate_limit.clone().map(RequestPacer::new),
            retry: config.retry.clone(),
            request_timeout: config.request_timeout(),
        }
    }

    /// Run `call` until it succeeds, fails with a non-retryable error, or runs out of attempts.
    ///
    /// `what` names the call in logs.
    pub async fn call<T, F, Fut>(&self, what: &str, mut call: F) -> Result<T, CallFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut attempt = 1;
        loop {
            if let Some(pacer) = &self.pacer {
                pacer.acquire().await;
            }

            let error = match timeout(self.request_timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(error)) => error,
                Err(_) => RemoteError::Timeout,
            };

            if !error.is_retryable() || attempt >= self.retry.max_attempts {
                return Err(CallFailure {
                    attempts: attempt,
                    error,
                });
            }

            let backoff = match &error {
                RemoteError::RateLimited {
                    retry_after: Some(after),
                } => (*after).max(self.retry.backoff_for_attempt(attempt)),
                _ => self.retry.backoff_for_attempt(attempt),
            };
            tracing::warn!(
                "{} failed (attempt {}/{}): {}; retrying in {:?}",
                what,
                attempt,
                self.retry.max_attempts,
                error,
                backoff
            );
            sleep(backoff).await;
            attempt += 1;
        }
    }
}
