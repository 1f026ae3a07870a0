//! Exponential backoff
//!
//! Retries an async operation with a growing pause between attempts. Each pause
//! is `multiplier` times the previous one, capped at `max_interval`, and the
//! whole retry loop gives up once `max_elapsed` has passed since the first
//! attempt.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Backoff policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoff {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
    pub max_elapsed: Duration,
}

impl ExponentialBackoff {
    /// Policy used when fetching a freshly claimed job
    ///
    /// The job board may need a moment before a claimed job can be served.
    pub fn job_fetch() -> Self {
        Self {
            max_interval: Duration::from_secs(10),
            max_elapsed: Duration::from_secs(60),
            ..Self::default()
        }
    }

    /// Runs `op` until it succeeds or the elapsed budget is spent
    ///
    /// Returns the last error when giving up.
    pub async fn retry<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let start = Instant::now();
        let mut interval = self.initial_interval;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let elapsed = start.elapsed();
            if elapsed >= self.max_elapsed {
                debug!(attempt, ?elapsed, "Giving up after error: {}", err);
                return Err(err);
            }

            let delay = interval.min(self.max_elapsed - elapsed);
            debug!(attempt, ?delay, "Retrying after error: {}", err);
            tokio::time::sleep(delay).await;

            interval = interval.mul_f64(self.multiplier).min(self.max_interval);
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            max_interval: Duration::from_secs(60),
            max_elapsed: Duration::from_secs(15 * 60),
        }
    }
}
