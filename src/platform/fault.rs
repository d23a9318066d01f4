//! Fault types surfaced by the remote platform client.

use std::fmt;

use serde::Deserialize;
use thiserror::Error;

/// A failure declared by the remote API itself: a non-success HTTP status,
/// optionally with a platform error code and a rate-limit wait hint.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiFault {
    /// HTTP status code of the response.
    pub status: u16,
    /// Platform-specific JSON error code, when the body carried one.
    pub code: Option<u64>,
    /// Error message from the body, or the status reason.
    pub message: String,
    /// Explicit wait requested by the server, in seconds.
    pub retry_after_secs: Option<f64>,
}

impl ApiFault {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            code: None,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn with_code(mut self, code: u64) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_retry_after(mut self, secs: f64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }

    /// Builds a fault from a response status, body and `Retry-After` header.
    ///
    /// The body's `retry_after` wins over the header. Bodies that are not the
    /// platform's JSON error shape fall back to the raw text.
    pub fn from_response(status: u16, body: &str, retry_after_header: Option<&str>) -> Self {
        #[derive(Deserialize)]
        struct ErrorBody {
            #[serde(default)]
            code: Option<u64>,
            #[serde(default)]
            message: Option<String>,
            #[serde(default)]
            retry_after: Option<f64>,
        }

        let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
        let header_hint = retry_after_header.and_then(|h| h.trim().parse::<f64>().ok());

        let message = parsed
            .as_ref()
            .and_then(|b| b.message.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    format!("HTTP {}", status)
                } else {
                    trimmed.chars().take(200).collect()
                }
            });

        Self {
            status,
            code: parsed.as_ref().and_then(|b| b.code),
            message,
            retry_after_secs: parsed.and_then(|b| b.retry_after).or(header_hint),
        }
    }
}

impl fmt::Display for ApiFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (HTTP {}, code {})", self.message, self.status, code),
            None => write!(f, "{} (HTTP {})", self.message, self.status),
        }
    }
}

impl std::error::Error for ApiFault {}

/// Error returned by a single remote platform call.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The API answered with a failure status.
    #[error("{0}")]
    Api(#[from] ApiFault),
    /// The request never produced a usable response.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The response body did not have the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
    /// Local failure while building the request.
    #[error("{0}")]
    Request(String),
}
