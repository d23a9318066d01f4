//! Error classifier for remote-call faults
//!
//! Maps any fault surfaced by the remote-call layer onto a [`ClassifiedError`].
//! Classification is total: a fixed list of fault-shape probes is tried in
//! priority order over the fault's source chain, and whatever none of them
//! recognises becomes a non-retryable [`ErrorKind::Unknown`].
//!
//! Probe order:
//! 1. remote-API-declared status ([`ApiFault`])
//! 2. transport fault carrying an HTTP status ([`reqwest::Error`])
//! 3. low-level network failure (I/O error kinds, connect/timeout flags, and
//!    message tokens such as "connection reset")

use std::any::Any;
use std::error::Error as StdError;
use std::io;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::debug;

use super::{ClassifiedError, ErrorKind, OpaqueFault};
use crate::platform::ApiFault;

/// Upper bound applied to rate-limit wait hints.
const MAX_RETRY_AFTER_MS: u64 = 24 * 60 * 60 * 1000;

static DEFAULT_CLASSIFIER: LazyLock<ErrorClassifier> = LazyLock::new(ErrorClassifier::new);

/// A message pattern identifying a low-level network failure.
#[derive(Debug)]
pub struct ErrorPattern {
    /// The compiled regex pattern.
    regex: Regex,
    /// A human-readable description of what this pattern detects.
    description: String,
}

impl ErrorPattern {
    /// Creates a new error pattern.
    ///
    /// # Panics
    /// Panics if the regex pattern is invalid.
    pub fn new(pattern: &str, description: impl Into<String>) -> Self {
        Self {
            regex: Regex::new(pattern).expect("Invalid regex pattern"),
            description: description.into(),
        }
    }

    /// Checks if this pattern matches the given text.
    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// Classifies remote-call faults into [`ClassifiedError`]s.
#[derive(Debug)]
pub struct ErrorClassifier {
    network_patterns: Vec<ErrorPattern>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorClassifier {
    /// Creates a classifier with the built-in network failure tokens.
    pub fn new() -> Self {
        Self {
            network_patterns: Self::default_patterns(),
        }
    }

    /// Creates a classifier with custom network failure patterns.
    pub fn with_patterns(patterns: Vec<ErrorPattern>) -> Self {
        Self {
            network_patterns: patterns,
        }
    }

    fn default_patterns() -> Vec<ErrorPattern> {
        vec![
            ErrorPattern::new(r"(?i)\beconnreset\b|connection\s+(was\s+)?reset", "Connection reset"),
            ErrorPattern::new(
                r"(?i)\benotfound\b|\beai_again\b|host\s+not\s+found|name\s+or\s+service\s+not\s+known|failed\s+to\s+lookup\s+address|dns\s+error",
                "Host not found",
            ),
            ErrorPattern::new(r"(?i)\betimedout\b|timed?\s*out", "Timed out"),
            ErrorPattern::new(r"(?i)\beconnrefused\b|connection\s+refused", "Connection refused"),
        ]
    }

    /// Adds a custom network failure pattern.
    pub fn add_pattern(&mut self, pattern: ErrorPattern) {
        self.network_patterns.push(pattern);
    }

    /// Returns the number of network failure patterns configured.
    pub fn pattern_count(&self) -> usize {
        self.network_patterns.len()
    }

    /// Classifies a borrowed fault. The result carries no cause; see
    /// [`ErrorClassifier::classify_owned`] to keep the original fault.
    pub fn classify(&self, fault: &(dyn StdError + 'static)) -> ClassifiedError {
        if let Some(classified) = fault.downcast_ref::<ClassifiedError>() {
            return classified.clone();
        }

        let chain: Vec<&(dyn StdError + 'static)> =
            std::iter::successors(Some(fault), |&e| e.source()).collect();

        chain
            .iter()
            .find_map(|e| probe_api_status(*e))
            .or_else(|| chain.iter().find_map(|e| probe_transport_status(*e)))
            .or_else(|| self.probe_network(&chain))
            .unwrap_or_else(|| {
                ClassifiedError::new(ErrorKind::Unknown, fault.to_string()).retryable(false)
            })
    }

    /// Classifies an owned fault and attaches it as the cause.
    pub fn classify_owned<E>(&self, fault: E) -> ClassifiedError
    where
        E: StdError + Send + Sync + 'static,
    {
        let classified = self.classify(&fault);
        if (&fault as &(dyn StdError + 'static)).is::<ClassifiedError>() {
            return classified;
        }
        classified.with_cause(Arc::new(fault))
    }

    fn probe_network(&self, chain: &[&(dyn StdError + 'static)]) -> Option<ClassifiedError> {
        let message = chain[0].to_string();

        for err in chain {
            if let Some(io_err) = err.downcast_ref::<io::Error>() {
                if is_network_io_kind(io_err.kind()) {
                    return Some(network_error(message));
                }
            }
            if let Some(req_err) = err.downcast_ref::<reqwest::Error>() {
                if req_err.is_timeout() || req_err.is_connect() {
                    return Some(network_error(message));
                }
            }
        }

        let matched = chain.iter().find_map(|err| {
            let text = err.to_string();
            self.network_patterns.iter().find(|p| p.matches(&text))
        })?;
        debug!(pattern = %matched.description, "network failure recognised by message");
        Some(network_error(message))
    }
}

/// Classifies a fault with the default classifier.
pub fn classify(fault: &(dyn StdError + 'static)) -> ClassifiedError {
    DEFAULT_CLASSIFIER.classify(fault)
}

/// Classifies an owned fault with the default classifier, keeping it as the cause.
pub fn classify_owned<E>(fault: E) -> ClassifiedError
where
    E: StdError + Send + Sync + 'static,
{
    DEFAULT_CLASSIFIER.classify_owned(fault)
}

/// Classifies a panic payload caught from a wrapped operation.
///
/// Panics are never retried.
pub fn classify_panic(payload: Box<dyn Any + Send>) -> ClassifiedError {
    let description = if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "operation panicked with a non-string payload".to_string()
    };

    let fault = OpaqueFault::new(format!("panic: {}", description));
    ClassifiedError::new(ErrorKind::Unknown, fault.to_string())
        .retryable(false)
        .with_cause(Arc::new(fault))
}

/// Maps a remote-API status code to a classification.
pub fn classify_api_status(
    status: u16,
    message: impl Into<String>,
    retry_after_secs: Option<f64>,
) -> ClassifiedError {
    let message = message.into();
    let classified = match status {
        401 => ClassifiedError::new(ErrorKind::AuthenticationError, message),
        403 => ClassifiedError::new(ErrorKind::PermissionDenied, message),
        404 => ClassifiedError::new(ErrorKind::NotFound, message),
        400 => ClassifiedError::new(ErrorKind::InvalidParameters, message),
        429 => {
            let err = ClassifiedError::new(ErrorKind::RateLimited, message).retryable(true);
            match retry_after_secs.and_then(secs_to_millis) {
                Some(ms) => err.with_retry_after_ms(ms),
                None => err,
            }
        }
        500 | 502 | 503 | 504 => {
            ClassifiedError::new(ErrorKind::NetworkError, message).retryable(true)
        }
        other => ClassifiedError::new(ErrorKind::Unknown, message).retryable(other >= 500),
    };
    classified.with_status(status)
}

fn probe_api_status(err: &(dyn StdError + 'static)) -> Option<ClassifiedError> {
    let fault = err.downcast_ref::<ApiFault>()?;
    Some(classify_api_status(
        fault.status,
        fault.message.clone(),
        fault.retry_after_secs,
    ))
}

fn probe_transport_status(err: &(dyn StdError + 'static)) -> Option<ClassifiedError> {
    let req_err = err.downcast_ref::<reqwest::Error>()?;
    let status = req_err.status()?.as_u16();
    let classified = if status >= 500 {
        ClassifiedError::new(ErrorKind::NetworkError, req_err.to_string()).retryable(true)
    } else {
        ClassifiedError::new(ErrorKind::Unknown, req_err.to_string()).retryable(false)
    };
    Some(classified.with_status(status))
}

fn network_error(message: String) -> ClassifiedError {
    ClassifiedError::new(ErrorKind::NetworkError, message).retryable(true)
}

fn is_network_io_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::TimedOut
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::AddrNotAvailable
    )
}

fn secs_to_millis(secs: f64) -> Option<u64> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    let ms = (secs * 1000.0).round();
    Some(if ms >= MAX_RETRY_AFTER_MS as f64 {
        MAX_RETRY_AFTER_MS
    } else {
        ms as u64
    })
}
