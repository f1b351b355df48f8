//! Caller-side reconnect policy.
//!
//! Sessions never retry on their own; this helper drives
//! [`ConnectionSession::start`] with a fixed delay ladder.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::session::{ConnectionSession, SessionError, SessionResult};

/// Delay ladder for reconnect attempts.
const RECONNECT_DELAYS_MS: [u64; 4] = [1_000, 2_000, 5_000, 10_000];

/// Upper bound for any single delay.
const MAX_RECONNECT_DELAY_MS: u64 = 30_000;

/// How often and how patiently to retry `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delays between attempts; the last one repeats.
    pub delays: Vec<Duration>,
    pub max_delay: Duration,
    /// Total attempts including the first.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            delays: RECONNECT_DELAYS_MS
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            max_delay: Duration::from_millis(MAX_RECONNECT_DELAY_MS),
            max_attempts: crate::config::DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl BackoffPolicy {
    /// Default ladder with a custom attempt bound.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based).
    #[must_use]
    pub fn delay(&self, retry: usize) -> Duration {
        self.delays
            .get(retry)
            .or(self.delays.last())
            .copied()
            .unwrap_or_default()
            .min(self.max_delay)
    }
}

/// Calls `session.start` until it succeeds, fails permanently, runs out of
/// attempts or `cancel` fires.
///
/// # Errors
///
/// Returns the first non-retryable error, or the last retryable one once
/// the attempts are exhausted. Cancellation during a delay returns the
/// error of the attempt before it.
pub async fn start_with_backoff(
    session: &ConnectionSession,
    policy: &BackoffPolicy,
    cancel: &CancellationToken,
) -> SessionResult<()> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let err: SessionError = match session.start(cancel).await {
            Ok(()) => return Ok(()),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => e,
        };

        if attempt >= attempts {
            log::warn!("[Session] Giving up after {} attempt(s): {}", attempt, err);
            return Err(err);
        }

        let delay = policy.delay(attempt as usize - 1);
        log::info!(
            "[Session] Retrying start (attempt {}/{}) after {}ms: {}",
            attempt + 1,
            attempts,
            delay.as_millis(),
            err
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(err),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}
