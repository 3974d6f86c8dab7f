//! Bounded retry with exponential backoff.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::twcommon::error::{AppError, Result};

/// Retry budget applied to each fetch inside the worker pool.
pub const DEFAULT_RETRY_TIMES: u32 = 3;

/// Error wrapper that lets an operation opt out of further attempts.
#[derive(Debug)]
pub enum RetryError {
    /// Do not retry, surface the error immediately.
    Stop(AppError),
    /// Worth another attempt after backing off.
    Transient(AppError),
}

impl From<AppError> for RetryError {
    fn from(err: AppError) -> Self {
        if err.is_retryable() {
            RetryError::Transient(err)
        } else {
            RetryError::Stop(err)
        }
    }
}

/// Run `operation` up to `attempts` times (the first call included),
/// sleeping `sleep` before the second attempt and doubling the pause after
/// every further failure. The backoff pause aborts early when `cancel`
/// fires, surfacing `AppError::Cancelled`.
pub async fn retry<F>(
    attempts: u32,
    sleep: Duration,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<()>
where
    F: std::ops::AsyncFnMut() -> std::result::Result<(), RetryError>,
{
    let mut remaining = attempts.max(1);
    let mut pause = sleep;

    loop {
        match operation().await {
            Ok(()) => return Ok(()),
            Err(RetryError::Stop(err)) => return Err(err),
            Err(RetryError::Transient(err)) => {
                remaining -= 1;
                if remaining == 0 {
                    return Err(err);
                }

                warn!(
                    attempts_left = remaining,
                    pause_ms = pause.as_millis() as u64,
                    error = %err,
                    "retrying after failure"
                );

                tokio::select! {
                    _ = cancel.cancelled() => return Err(AppError::Cancelled),
                    _ = tokio::time::sleep(pause) => {}
                }

                pause *= 2;
            }
        }
    }
}
