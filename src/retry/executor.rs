//! Retry executor for remote platform calls.
//!
//! Wraps an arbitrary asynchronous operation, classifies each failure, and
//! re-runs it according to the shared [`RetryPolicy`]. Attempts are strictly
//! sequential. There is no overall deadline: `max_attempts` together with
//! `max_delay_ms` bounds the total wait.

use std::error::Error as StdError;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::debug;

use super::events::{RetryEvent, RetrySink, TracingSink};
use super::RetryPolicy;
use crate::error::{classify_owned, classify_panic, ClassifiedError};

tokio::task_local! {
    /// Set while a retried operation is running on the current task.
    static RETRY_SCOPE: ();
}

/// Runs remote operations under a retry policy, reporting every attempt to a
/// [`RetrySink`].
///
/// Cheap to clone; the policy and sink are shared.
#[derive(Clone)]
pub struct RetryExecutor {
    policy: Arc<RetryPolicy>,
    sink: Arc<dyn RetrySink>,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RetryExecutor {
    /// Creates an executor that reports to `tracing`.
    pub fn new(policy: Arc<RetryPolicy>) -> Self {
        Self::with_sink(policy, Arc::new(TracingSink))
    }

    /// Creates an executor with a custom telemetry sink.
    pub fn with_sink(policy: Arc<RetryPolicy>, sink: Arc<dyn RetrySink>) -> Self {
        Self { policy, sink }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Executes `operation` until it succeeds, fails with a classification
    /// the policy does not retry, or runs out of attempts.
    ///
    /// A panic inside the operation is caught and classified as a
    /// non-retryable `Unknown` failure.
    ///
    /// Calling `execute` from inside an operation that is itself being
    /// retried does not stack a second retry loop: the inner operation runs
    /// exactly once and its failure propagates to the outer loop.
    pub async fn execute<T, E, F, Fut>(
        &self,
        label: &str,
        mut operation: F,
    ) -> Result<T, ClassifiedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError + Send + Sync + 'static,
    {
        if RETRY_SCOPE.try_with(|_| ()).is_ok() {
            debug!(operation = label, "already inside a retried operation, running once");
            return self.run_attempts(label, &mut operation, 1).await;
        }

        let max_attempts = self.policy.max_attempts();
        RETRY_SCOPE
            .scope((), self.run_attempts(label, &mut operation, max_attempts))
            .await
    }

    async fn run_attempts<T, E, F, Fut>(
        &self,
        label: &str,
        operation: &mut F,
        max_attempts: u32,
    ) -> Result<T, ClassifiedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError + Send + Sync + 'static,
    {
        let mut attempt: u32 = 0;

        loop {
            self.sink.record(&RetryEvent::AttemptStarted {
                label: label.to_string(),
                attempt: attempt + 1,
                max_attempts,
            });

            let started = Instant::now();
            let outcome = AssertUnwindSafe(async { operation().await })
                .catch_unwind()
                .await;

            let error = match outcome {
                Ok(Ok(value)) => {
                    self.sink.record(&RetryEvent::AttemptSucceeded {
                        label: label.to_string(),
                        attempt: attempt + 1,
                        max_attempts,
                        elapsed: started.elapsed(),
                    });
                    return Ok(value);
                }
                Ok(Err(fault)) => classify_owned(fault),
                Err(payload) => classify_panic(payload),
            };

            self.sink.record(&RetryEvent::AttemptFailed {
                label: label.to_string(),
                attempt: attempt + 1,
                max_attempts,
                kind: error.kind,
                retryable: error.is_retryable,
                message: error.message.clone(),
            });

            if attempt + 1 >= max_attempts || !self.policy.should_retry(attempt, &error) {
                self.sink.record(&RetryEvent::GaveUp {
                    label: label.to_string(),
                    attempts: attempt + 1,
                    max_attempts,
                    kind: error.kind,
                });
                return Err(error);
            }

            let delay = self.policy.delay_for(attempt, &error);
            self.sink.record(&RetryEvent::RetryScheduled {
                label: label.to_string(),
                attempt: attempt + 1,
                max_attempts,
                kind: error.kind,
                delay,
            });
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Executes `operation` under `policy`, reporting to `tracing`.
pub async fn with_retry<T, E, F, Fut>(
    policy: Arc<RetryPolicy>,
    label: &str,
    operation: F,
) -> Result<T, ClassifiedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: StdError + Send + Sync + 'static,
{
    RetryExecutor::new(policy).execute(label, operation).await
}
