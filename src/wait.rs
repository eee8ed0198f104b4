//! Fixed-interval polling and retries.
//!
//! Every wait in a session is sleep-then-recheck. There is no push channel
//! from the relay, so this is the only way either side learns about the
//! other's progress. Waits are unbounded unless a maximum is configured.

use crate::error::TransferError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_retry2::strategy::FixedInterval;
use tokio_retry2::{Retry, RetryError};
use tracing::warn;

/// Tracks how long a wait has been running against an optional limit.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    max_wait: Option<Duration>,
}

impl Deadline {
    pub fn start(max_wait: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            max_wait,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Errors once the limit has passed.
    pub fn check(&self, what: &str) -> Result<(), TransferError> {
        match self.max_wait {
            Some(max) if self.elapsed() >= max => Err(TransferError::WaitTimedOut {
                what: what.to_string(),
                waited: self.elapsed(),
            }),
            _ => Ok(()),
        }
    }
}

/// Calls `check` every `interval` until it returns true.
///
/// The first check happens immediately. With `max_wait` set, gives up with
/// [`TransferError::WaitTimedOut`] once that much time has passed.
pub async fn poll_until<F, Fut>(
    what: &str,
    interval: Duration,
    max_wait: Option<Duration>,
    mut check: F,
) -> Result<(), TransferError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Deadline::start(max_wait);
    loop {
        if check().await {
            return Ok(());
        }
        deadline.check(what)?;
        tokio::time::sleep(interval).await;
    }
}

/// Runs `op` up to `attempts` times with `delay` between failures.
///
/// `op` receives the 1-based attempt number. The last error is returned once
/// the budget is spent.
pub async fn retry_fixed<T, F, Fut>(
    what: &str,
    attempts: usize,
    delay: Duration,
    mut op: F,
) -> Result<T, TransferError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, TransferError>>,
{
    let strategy = FixedInterval::new(delay).take(attempts.saturating_sub(1));
    let mut attempt = 0usize;

    Retry::spawn(strategy, || {
        attempt += 1;
        let current = attempt;
        let pending = op(current);
        async move {
            match pending.await {
                Ok(value) => Ok(value),
                Err(e) => {
                    warn!("{} attempt {}/{} failed: {}", what, current, attempts, e);
                    RetryError::to_transient(e)
                }
            }
        }
    })
    .await
}
