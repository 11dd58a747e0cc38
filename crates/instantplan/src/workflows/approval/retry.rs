use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::domain::{PipelineStep, SubmissionId};

/// Classifies collaborator errors the pipeline may retry.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Timeout and bounded exponential backoff applied to every collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub call_timeout: Duration,
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            call_timeout: Duration::from_secs(5),
        }
    }
}

/// Why a retried call did not produce a value.
#[derive(Debug)]
pub(crate) enum CallError<E> {
    /// The collaborator returned an error that must not be retried.
    Rejected(E),
    Exhausted { attempts: u32, cause: String },
    Cancelled,
}

pub(crate) async fn call_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    step: PipelineStep,
    submission: &SubmissionId,
    cancel: &CancellationToken,
    mut call: F,
) -> Result<T, CallError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + fmt::Display,
{
    let attempts = policy.max_attempts.max(1);
    let mut cause = String::new();

    for attempt in 1..=attempts {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CallError::Cancelled),
            outcome = tokio::time::timeout(policy.call_timeout, call()) => outcome,
        };

        match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) if !err.is_retryable() => return Err(CallError::Rejected(err)),
            Ok(Err(err)) => cause = err.to_string(),
            Err(_) => {
                cause = format!(
                    "timed out after {}ms",
                    policy.call_timeout.as_millis()
                )
            }
        }

        warn!(%submission, %step, attempt, max_attempts = attempts, %cause, "collaborator call failed");

        if attempt < attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CallError::Cancelled),
                _ = tokio::time::sleep(policy.backoff_for(attempt)) => {}
            }
        }
    }

    Err(CallError::Exhausted { attempts, cause })
}
