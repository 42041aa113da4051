// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bounded retry with cancellation.
//!
//! Every side-effectful sink call goes through [`retry`] instead of
//! open-coding the loop at each call site. The policy is a fixed-interval
//! bounded budget; the shutdown watch channel aborts a sleeping retry
//! immediately.
//!
//! # Example
//!
//! ```
//! use cdc_bridge::resilience::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::sink();
//! assert_eq!(policy.max_attempts, 100);
//! assert_eq!(policy.interval, Duration::from_secs(1));
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::sink::SinkError;

/// Retry budget for a class of sink calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub interval: Duration,
}

impl RetryPolicy {
    /// The budget for sink statements and buffer flushes.
    #[must_use]
    pub fn sink() -> Self {
        Self {
            max_attempts: 100,
            interval: Duration::from_secs(1),
        }
    }

    #[must_use]
    pub fn new(max_attempts: usize, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::sink()
    }
}

/// Run `op` until it succeeds, the attempt budget is spent, or the shutdown
/// signal fires.
///
/// A success after one or more failures is logged with the attempt count.
/// Cancellation surfaces as [`EngineError::Cancelled`] (`"abort retrying"`)
/// and is terminal for the operation.
pub async fn retry<F, Fut, T>(
    operation: &str,
    policy: &RetryPolicy,
    shutdown: &mut watch::Receiver<bool>,
    mut op: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SinkError>>,
{
    for attempt in 1..=policy.max_attempts {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation, attempts = attempt, "succeeded after retries");
                }
                return Ok(value);
            }
            Err(err) => {
                if attempt == policy.max_attempts {
                    warn!(operation, attempts = attempt, error = %err, "retry budget spent");
                    return Err(err.into());
                }
                warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %err,
                    retry_in = ?policy.interval,
                    "sink call failed, retrying"
                );

                tokio::select! {
                    _ = shutdown_signalled(shutdown) => return Err(EngineError::Cancelled),
                    _ = sleep(policy.interval) => {}
                }
            }
        }
    }

    unreachable!("retry loop covers the full attempt budget")
}

/// Resolves when the shutdown flag flips to true; never resolves if the
/// sender goes away without signalling.
async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
