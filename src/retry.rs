//! Bounded retry with linear backoff for store calls.

use std::thread;
use std::time::Duration;

use crate::error::StoreResult;
use crate::models::RunStatistics;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before attempt `attempt + 1`, after `attempt` failures.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Run `op` against `store` up to `max_attempts` times.
    ///
    /// Every failed attempt increments `stats.retries`. A stale-schema
    /// failure rebuilds the store client before the next attempt. The last
    /// error is returned once attempts are exhausted.
    pub fn run<S, T, F>(
        &self,
        operation: &str,
        store: &mut S,
        stats: &mut RunStatistics,
        mut op: F,
    ) -> StoreResult<T>
    where
        S: Store + ?Sized,
        F: FnMut(&mut S) -> StoreResult<T>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(store) {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(operation, attempt, "store call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    stats.retries += 1;
                    if attempt >= self.max_attempts {
                        tracing::error!(
                            operation,
                            attempt,
                            kind = %err.kind,
                            error = %err.message,
                            "store call failed, attempts exhausted"
                        );
                        return Err(err);
                    }

                    if err.is_stale_schema() {
                        tracing::warn!(operation, attempt, "stale schema cache, rebuilding store client");
                        match store.reconnect() {
                            Ok(()) => stats.reconnects += 1,
                            Err(e) => tracing::warn!(operation, error = %e, "reconnect failed"),
                        }
                    }

                    let delay = self.delay_after(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        kind = %err.kind,
                        backoff_ms = delay.as_millis() as u64,
                        error = %err.message,
                        "store call failed, will retry after backoff"
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                }
            }
        }
    }
}
