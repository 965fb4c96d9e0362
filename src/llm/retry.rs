//! Exponential backoff for provider calls that failed transiently.

use std::future::Future;
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use tracing::{debug, warn};

use crate::error::ProviderError;

/// Total attempts per call, including the first.
pub const MAX_ATTEMPTS: u32 = 3;

/// How many times to try a call and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl RetryPolicy {
    /// A single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
        }
    }
}

/// Run `call` until it succeeds, fails with a non-transient [`ProviderError`],
/// or `policy.max_attempts` is reached. The last error is returned unchanged.
pub async fn retry_transient<T, F, Fut>(policy: &RetryPolicy, mut call: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut backoff = policy.backoff();
    let max_attempts = policy.max_attempts.max(1);

    let mut attempt = 1;
    loop {
        let err = match call().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        if !err.kind.is_transient() {
            debug!("{} failed with {}, not retrying", err.vendor, err.kind);
            return Err(err);
        }
        if attempt >= max_attempts {
            warn!(
                "{} still failing after {} attempts: {}",
                err.vendor, attempt, err.detail
            );
            return Err(err);
        }

        let wait = backoff.next_backoff().unwrap_or(policy.max_interval);
        warn!(
            "{} call {}/{} failed ({}), retrying in {:.1}s",
            err.vendor,
            attempt,
            max_attempts,
            err.kind,
            wait.as_secs_f32()
        );
        tokio::time::sleep(wait).await;
        attempt += 1;
    }
}
