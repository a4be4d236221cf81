//! A standalone exponential-backoff helper, generalized from the
//! attempt-capped retry decorators wrapped around LLM and event-store
//! calls upstream: `stop_after_attempt(N)` becomes `max_attempts`,
//! `wait_exponential(multiplier, min, max)` becomes `multiplier`/
//! `min_delay`/`max_delay` below.

use log::warn;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub multiplier: f64,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, multiplier: f64, min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            multiplier,
            min_delay,
            max_delay,
        }
    }

    /// The delay before the `attempt`th retry (1-indexed: the delay awaited
    /// after the first failed attempt is `delay_for_attempt(1)`).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.min_delay.as_secs_f64() * self.multiplier.powi(attempt as i32 - 1);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }
}

/// Calls `op` until it returns `Ok`, up to `policy.max_attempts` times,
/// sleeping `policy.delay_for_attempt(n)` between attempts. Returns the
/// last error if every attempt fails. `op` receives the 1-indexed attempt
/// number so callers can thread it into an `attempt` counter.
pub async fn retry<T, E, F, Fut>(policy: RetryPolicy, description: &str, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.max_attempts {
                    return Err(err);
                }
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    "{description} failed on attempt {attempt}/{}: {err}. Retrying in {:.1}s",
                    policy.max_attempts,
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
