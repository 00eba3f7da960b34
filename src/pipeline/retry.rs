use std::future::Future;
use std::time::Duration;

use log::warn;
use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, Result};

/// Bounded retry strategy applied around remote calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Pause before the second attempt
    pub delay: Duration,
    /// Growth factor of the pause between consecutive attempts (1.0 keeps it fixed)
    pub backoff_multiplier: f64,
    /// Upper bound for the pause
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
            backoff_multiplier: 1.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    #[cfg(test)]
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            ..Self::default()
        }
    }

    fn next_delay(&self, current: Duration) -> Duration {
        if self.backoff_multiplier <= 1.0 {
            return current;
        }
        // Non-finite or overflowing products saturate at the cap
        Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff_multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Runs `op` until it succeeds, fails with a non-transient error, or the
/// policy's attempts are used up.
///
/// Exhausting the attempts yields a single `RetriesExhausted` error wrapping
/// the last failure. Cancellation is observed while an attempt is in flight
/// and while waiting between attempts.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.delay;
    let mut attempt = 0;

    loop {
        attempt += 1;

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(PipelineError::Cancelled),
            outcome = op() => outcome,
        };

        let error = match outcome {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => e,
        };

        if attempt >= max_attempts {
            return Err(PipelineError::RetriesExhausted {
                operation: operation.to_string(),
                attempts: attempt,
                source: Box::new(error),
            });
        }

        warn!(
            "{operation} failed ({error}), retrying in {}ms ({attempt}/{max_attempts})...",
            delay.as_millis()
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(PipelineError::Cancelled),
            () = tokio::time::sleep(delay) => {}
        }

        delay = policy.next_delay(delay);
    }
}
