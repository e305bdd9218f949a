//! Timeout and bounded retry with exponential backoff for external calls.
//!
//! Every call to an embedding provider, vector store or completion model goes
//! through [`RetryPolicy::run`]. Each attempt gets its own timeout; transient
//! failures ([`RagError::is_transient`]) are retried with exponential backoff,
//! everything else propagates immediately.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{RagError, Result};

/// Retry and timeout settings applied at every external call site.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    pub max_backoff_ms: u64,
    /// Factor applied to the delay after each retry.
    pub multiplier: f64,
    /// Per-attempt timeout, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
            multiplier: 2.0,
            timeout_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries, with the given per-attempt timeout.
    pub fn no_retry(timeout: Duration) -> Self {
        Self { max_retries: 0, timeout_ms: timeout.as_millis() as u64, ..Self::default() }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay before retry number `retry` (zero-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(retry as i32);
        let millis = (self.initial_backoff_ms as f64 * factor).min(self.max_backoff_ms as f64);
        Duration::from_millis(millis as u64)
    }

    /// Check the policy for nonsensical values.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(RagError::ConfigError("retry timeout_ms must be greater than zero".into()));
        }
        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            return Err(RagError::ConfigError(format!(
                "retry multiplier ({}) must be at least 1.0",
                self.multiplier
            )));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(RagError::ConfigError(format!(
                "initial_backoff_ms ({}) must not exceed max_backoff_ms ({})",
                self.initial_backoff_ms, self.max_backoff_ms
            )));
        }
        Ok(())
    }

    /// Run `call` under this policy.
    ///
    /// `call` is invoked once per attempt. Each attempt is bounded by the
    /// per-attempt timeout; a timeout counts as a transient failure.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let timeout = self.timeout();
        let mut retry = 0;
        loop {
            let outcome = match tokio::time::timeout(timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(RagError::Timeout { operation: operation.to_string(), after: timeout }),
            };

            match outcome {
                Ok(value) => {
                    if retry > 0 {
                        debug!(operation, attempts = retry + 1, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && retry < self.max_retries => {
                    let delay = self.backoff(retry);
                    warn!(operation, attempt = retry + 1, delay_ms = delay.as_millis() as u64, error = %e, "transient failure, retrying");
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
