use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tokio::time::timeout;
use tracing::debug;
use tracing::warn;

use crate::BackoffPolicy;
use crate::Result;
use crate::SystemError;

/// Retries `task` while it fails with a retryable contention error.
///
/// Each attempt is bounded by `policy.timeout()`. Between attempts the delay
/// doubles from `base_delay_ms` up to `max_delay_ms`, with up to 50% jitter so
/// that writers losing the same lock do not retry in lockstep. Non-retryable
/// errors and the last failure are returned as they are.
pub async fn retry_on_contention<F, Fut, R>(
    policy: &BackoffPolicy,
    mut task: F,
) -> Result<R>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let max_delay = Duration::from_millis(policy.max_delay_ms);
    let mut delay = Duration::from_millis(policy.base_delay_ms);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let outcome = match timeout(policy.timeout(), task()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(attempt, "attempt timed out after {:?}", policy.timeout());
                Err(SystemError::Timeout(policy.timeout()).into())
            }
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                let pause = delay + jitter(delay);
                debug!(attempt, ?pause, "contention, retrying: {}", e);
                sleep(pause).await;
                delay = (delay * 2).min(max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    warn!("giving up after {} attempts: {}", attempt, e);
                }
                return Err(e);
            }
        }
    }
}

fn jitter(delay: Duration) -> Duration {
    let bound = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX) / 2;
    if bound == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=bound))
}
