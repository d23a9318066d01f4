//! Error classification types for the resilient dispatch layer
//!
//! Every failure surfaced by a remote call is mapped into a [`ClassifiedError`]
//! carrying one of a closed set of [`ErrorKind`]s, a retryability flag, and,
//! for rate limits, the wait the remote side asked for.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// The kind of a classified failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The remote API rejected the call because of a rate limit (HTTP 429).
    RateLimited,
    /// The credentials are valid but lack permission (HTTP 403).
    PermissionDenied,
    /// The referenced resource does not exist (HTTP 404).
    NotFound,
    /// Transport failure or transient server-side failure (HTTP 5xx).
    NetworkError,
    /// The credentials were rejected (HTTP 401).
    AuthenticationError,
    /// The request was malformed or failed local validation (HTTP 400).
    InvalidParameters,
    /// Anything that could not be identified.
    Unknown,
}

impl ErrorKind {
    /// All kinds, in declaration order.
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::RateLimited,
        ErrorKind::PermissionDenied,
        ErrorKind::NotFound,
        ErrorKind::NetworkError,
        ErrorKind::AuthenticationError,
        ErrorKind::InvalidParameters,
        ErrorKind::Unknown,
    ];

    /// Whether failures of this kind are retryable by default.
    ///
    /// Only rate limits and network errors are. `Unknown` never is.
    pub fn is_retryable_by_default(self) -> bool {
        matches!(self, ErrorKind::RateLimited | ErrorKind::NetworkError)
    }

    /// The set of kinds retryable by default.
    pub fn default_retryable() -> HashSet<ErrorKind> {
        Self::ALL
            .into_iter()
            .filter(|kind| kind.is_retryable_by_default())
            .collect()
    }

    /// Stable snake_case name, as used in configuration and tool output.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::NotFound => "not_found",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::AuthenticationError => "authentication_error",
            ErrorKind::InvalidParameters => "invalid_parameters",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stand-in cause for failures that were not error values at all, such as a
/// panic payload escaping a wrapped operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpaqueFault {
    /// Best-effort description of what was observed.
    pub description: String,
}

impl OpaqueFault {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

impl fmt::Display for OpaqueFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized fault: {}", self.description)
    }
}

impl std::error::Error for OpaqueFault {}

/// Shared handle to the fault a classification was derived from.
pub type FaultCause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// A failure mapped onto an [`ErrorKind`] with its retry metadata.
///
/// `retry_after_ms` is only ever set for [`ErrorKind::RateLimited`], and only
/// when the remote fault carried an explicit wait hint.
#[derive(Clone)]
pub struct ClassifiedError {
    /// The kind of failure.
    pub kind: ErrorKind,
    /// Human-readable error message.
    pub message: String,
    /// Whether the orchestrator may retry this failure.
    pub is_retryable: bool,
    /// Explicit wait requested by the remote side, in milliseconds.
    pub retry_after_ms: Option<u64>,
    /// HTTP status code of the underlying fault, if any.
    pub status_code: Option<u16>,
    /// The original fault.
    pub cause: Option<FaultCause>,
}

impl ClassifiedError {
    /// Creates a classified error with the kind's default retryability.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            is_retryable: kind.is_retryable_by_default(),
            retry_after_ms: None,
            status_code: None,
            cause: None,
        }
    }

    /// Overrides the retryability flag.
    pub fn retryable(mut self, retryable: bool) -> Self {
        self.is_retryable = retryable;
        self
    }

    /// Records the remote wait hint. Ignored for anything but rate limits.
    pub fn with_retry_after_ms(mut self, retry_after_ms: u64) -> Self {
        if self.kind == ErrorKind::RateLimited {
            self.retry_after_ms = Some(retry_after_ms);
        }
        self
    }

    /// Records the HTTP status code of the underlying fault.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    /// Attaches the original fault.
    pub fn with_cause(mut self, cause: FaultCause) -> Self {
        self.cause = Some(cause);
        self
    }

    /// Shorthand for an `InvalidParameters` failure raised before any remote call.
    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParameters, message)
    }

    /// The JSON shape returned to the host for a failed invocation.
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = serde_json::json!({
            "kind": self.kind,
            "message": self.message,
            "retryable": self.is_retryable,
        });
        if let Some(ms) = self.retry_after_ms {
            value["retryAfterMs"] = ms.into();
        }
        if let Some(status) = self.status_code {
            value["statusCode"] = status.into();
        }
        value
    }
}

impl fmt::Debug for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifiedError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("is_retryable", &self.is_retryable)
            .field("retry_after_ms", &self.retry_after_ms)
            .field("status_code", &self.status_code)
            .field("cause", &self.cause.as_ref().map(|c| c.to_string()))
            .finish()
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ClassifiedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}
