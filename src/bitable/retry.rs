//! Bounded retry with doubling backoff.
//!
//! Every outbound call goes through one [`RetryPolicy`]. An attempt succeeds
//! only when the transport succeeds AND the HTTP status is 200; everything
//! else (429, 5xx, 4xx, connection errors) is retried the same way.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::debug;

/// Attempts per call used by all production call sites.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Sleep before the second attempt; doubles after every failure.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Why a single attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    /// The request never produced a response.
    Transport(String),
    /// A response arrived with a status other than 200.
    Status(u16),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(message) => write!(f, "{message}"),
            Self::Status(code) => write!(f, "HTTP status {code}"),
        }
    }
}

/// Transport-level failure after the retry budget is spent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("retries exhausted after {attempts} attempt(s), last failure: {last}")]
    RetryExhausted { attempts: u32, last: AttemptFailure },
}

/// Attempt count and backoff schedule for outbound calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy {
    /// Policy with the default one-second base delay.
    ///
    /// `max_attempts` of zero is treated as one.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: DEFAULT_BASE_DELAY,
        }
    }

    /// Override the base delay (tests use `Duration::ZERO`).
    #[must_use]
    pub const fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Sleep after the failed attempt with 0-based index `attempt`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1_u32 << attempt.min(16))
    }

    /// Drive `attempt` until it succeeds or the attempt budget is spent.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::RetryExhausted`] carrying the last failure.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptFailure>>,
    {
        let mut last = AttemptFailure::Transport("no attempt made".into());

        for n in 0..self.max_attempts {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(failure) => {
                    debug!(attempt = n + 1, max = self.max_attempts, %failure, "attempt failed");
                    last = failure;
                }
            }

            if n + 1 < self.max_attempts {
                tokio::time::sleep(self.delay_for(n)).await;
            }
        }

        Err(TransportError::RetryExhausted {
            attempts: self.max_attempts,
            last,
        })
    }

    /// Send an HTTP request built fresh for every attempt.
    ///
    /// Non-200 responses are dropped, which releases the connection.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::RetryExhausted`] when no attempt got a 200.
    pub async fn send<B>(&self, build: B) -> Result<Response, TransportError>
    where
        B: Fn() -> RequestBuilder,
    {
        self.run(|| {
            let request = build();
            async move {
                match request.send().await {
                    Ok(response) if response.status() == StatusCode::OK => Ok(response),
                    Ok(response) => Err(AttemptFailure::Status(response.status().as_u16())),
                    Err(e) => Err(AttemptFailure::Transport(e.to_string())),
                }
            }
        })
        .await
    }
}
