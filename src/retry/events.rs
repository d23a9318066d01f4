//! Retry telemetry.
//!
//! The executor reports every attempt to a [`RetrySink`]. This is the only
//! place retry telemetry originates.

use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::ErrorKind;

/// Event emitted by the retry executor. Attempt numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryEvent {
    /// An attempt is about to run.
    AttemptStarted {
        label: String,
        attempt: u32,
        max_attempts: u32,
    },
    /// The attempt succeeded.
    AttemptSucceeded {
        label: String,
        attempt: u32,
        max_attempts: u32,
        elapsed: Duration,
    },
    /// The attempt failed and was classified.
    AttemptFailed {
        label: String,
        attempt: u32,
        max_attempts: u32,
        kind: ErrorKind,
        retryable: bool,
        message: String,
    },
    /// Another attempt will run after `delay`.
    RetryScheduled {
        label: String,
        attempt: u32,
        max_attempts: u32,
        kind: ErrorKind,
        delay: Duration,
    },
    /// No further attempt will run; the last classification is returned.
    GaveUp {
        label: String,
        attempts: u32,
        max_attempts: u32,
        kind: ErrorKind,
    },
}

impl RetryEvent {
    pub fn label(&self) -> &str {
        match self {
            RetryEvent::AttemptStarted { label, .. }
            | RetryEvent::AttemptSucceeded { label, .. }
            | RetryEvent::AttemptFailed { label, .. }
            | RetryEvent::RetryScheduled { label, .. }
            | RetryEvent::GaveUp { label, .. } => label,
        }
    }
}

/// Receiver of retry telemetry.
pub trait RetrySink: Send + Sync {
    fn record(&self, event: &RetryEvent);
}

/// Sink that forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl RetrySink for TracingSink {
    fn record(&self, event: &RetryEvent) {
        match event {
            RetryEvent::AttemptStarted {
                label,
                attempt,
                max_attempts,
            } => debug!(operation = %label, attempt, max_attempts, "attempt started"),
            RetryEvent::AttemptSucceeded {
                label,
                attempt,
                max_attempts,
                elapsed,
            } => {
                if *attempt > 1 {
                    info!(
                        operation = %label,
                        attempt,
                        max_attempts,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "operation succeeded after retry"
                    );
                } else {
                    debug!(
                        operation = %label,
                        attempt,
                        max_attempts,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "operation succeeded"
                    );
                }
            }
            RetryEvent::AttemptFailed {
                label,
                attempt,
                max_attempts,
                kind,
                retryable,
                message,
            } => warn!(
                operation = %label,
                attempt,
                max_attempts,
                kind = %kind,
                retryable,
                error = %message,
                "attempt failed"
            ),
            RetryEvent::RetryScheduled {
                label,
                attempt,
                max_attempts,
                kind,
                delay,
            } => warn!(
                operation = %label,
                attempt,
                max_attempts,
                kind = %kind,
                delay_ms = delay.as_millis() as u64,
                "retrying after delay"
            ),
            RetryEvent::GaveUp {
                label,
                attempts,
                max_attempts,
                kind,
            } => error!(
                operation = %label,
                attempts,
                max_attempts,
                kind = %kind,
                "operation failed"
            ),
        }
    }
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<RetryEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events.
    pub fn events(&self) -> Vec<RetryEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Number of retries that were scheduled.
    pub fn retries(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, RetryEvent::RetryScheduled { .. }))
            .count()
    }

    /// Number of attempts that were started.
    pub fn attempts(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, RetryEvent::AttemptStarted { .. }))
            .count()
    }
}

impl RetrySink for MemorySink {
    fn record(&self, event: &RetryEvent) {
        let mut events = self
            .events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        events.push(event.clone());
    }
}
