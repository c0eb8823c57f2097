use crate::core::errors::{Result, SchedulerError};
use futures::future::BoxFuture;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use super::base::PartialState;

/// Run one step action up to `retries + 1` times.
///
/// Each attempt is bounded by `limit`; a timed out attempt counts as a
/// failed one. The error of the last attempt is returned.
pub(crate) async fn run_attempts<'a, F>(
    step: &str,
    operation: &str,
    retries: u32,
    wait: Duration,
    limit: Option<Duration>,
    mut attempt: F,
) -> Result<PartialState>
where
    F: FnMut() -> BoxFuture<'a, anyhow::Result<PartialState>>,
{
    let mut attempt_number: u32 = 1;
    loop {
        let outcome = match limit {
            Some(limit) => match timeout(limit, attempt()).await {
                Ok(outcome) => outcome.map_err(|e| SchedulerError::step_failed(step, e)),
                Err(_) => Err(SchedulerError::timeout_after(operation, limit)),
            },
            None => attempt()
                .await
                .map_err(|e| SchedulerError::step_failed(step, e)),
        };

        match outcome {
            Ok(partial) => {
                if attempt_number > 1 {
                    debug!(step, operation, attempt = attempt_number, "attempt succeeded");
                }
                return Ok(partial);
            }
            Err(e) if attempt_number <= retries => {
                warn!(
                    step,
                    operation,
                    attempt = attempt_number,
                    max_attempts = retries.saturating_add(1),
                    error = %e,
                    "attempt failed, retrying"
                );
                if !wait.is_zero() {
                    sleep(wait).await;
                }
                attempt_number += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
