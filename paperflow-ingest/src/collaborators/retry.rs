//! Deadline-bounded collaborator calls
//!
//! Every call runs under `tokio::time::timeout`; on deadline the future is
//! dropped, so nothing keeps running in the background. Retryable failures
//! (network, API status, timeout) are retried with exponential backoff.
//!
//! **Backoff Strategy:**
//! - Initial delay: 250ms
//! - Max delay: 2000ms
//! - Multiplier: 2.0

use crate::types::CollaboratorError;
use paperflow_common::config::CollaboratorConfig;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// Deadline and retry budget of a collaborator call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallPolicy {
    /// Per-attempt deadline
    pub deadline: Duration,
    /// Attempts after the first one
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(30),
            max_retries: 2,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_millis(2000),
        }
    }
}

impl CallPolicy {
    pub fn from_config(config: &CollaboratorConfig) -> Self {
        Self {
            deadline: Duration::from_secs(config.timeout_secs.max(1)),
            max_retries: config.max_retries,
            ..Self::default()
        }
    }
}

/// Run `operation` under the policy's deadline, retrying retryable errors
///
/// # Arguments
/// * `name` - Collaborator name for logging
/// * `policy` - Deadline and retry budget
/// * `operation` - Closure producing a fresh attempt
pub async fn call_with_deadline<F, Fut, T>(
    name: &str,
    policy: &CallPolicy,
    mut operation: F,
) -> Result<T, CollaboratorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CollaboratorError>>,
{
    let mut attempt: u32 = 0;
    let mut backoff = policy.initial_backoff;

    loop {
        attempt += 1;

        let outcome = match timeout(policy.deadline, operation()).await {
            Ok(result) => result,
            Err(_) => Err(CollaboratorError::Timeout(policy.deadline)),
        };

        match outcome {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(collaborator = name, attempt, "Collaborator call succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_retryable() && attempt <= policy.max_retries => {
                tracing::warn!(
                    collaborator = name,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "Collaborator call failed, retrying"
                );
                sleep(backoff).await;
                backoff = (backoff * 2).min(policy.max_backoff);
            }
            Err(err) => {
                tracing::debug!(collaborator = name, attempt, error = %err, "Collaborator call gave up");
                return Err(err);
            }
        }
    }
}
