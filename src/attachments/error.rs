use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::size::format_bytes;
use super::{MAX_ALT_TEXT_CHARS, MAX_ATTACHMENTS, MAX_NAME_CHARS};
use crate::error::{classify_api_status, ClassifiedError, ErrorKind};

/// Failures raised while validating or resolving attachments.
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("too many attachments: {count} given, at most {MAX_ATTACHMENTS} allowed")]
    TooMany { count: usize },

    #[error("attachment {} ({name}): {source}", .index + 1)]
    Item {
        index: usize,
        name: String,
        #[source]
        source: Box<AttachmentError>,
    },

    #[error("attachment name is required")]
    MissingName,

    #[error("attachment name is {len} characters, at most {MAX_NAME_CHARS} allowed")]
    NameTooLong { len: usize },

    #[error("invalid attachment name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("exactly one of inlineData, remoteUrl or localPath must be set, none given")]
    NoSource,

    #[error("exactly one of inlineData, remoteUrl or localPath must be set, {count} given")]
    MultipleSources { count: usize },

    #[error("alt text is {len} characters, at most {MAX_ALT_TEXT_CHARS} allowed")]
    AltTextTooLong { len: usize },

    #[error("invalid base64 data: {0}")]
    InvalidBase64(String),

    #[error("attachment data is empty")]
    EmptyData,

    #[error("invalid URL {0}")]
    InvalidUrl(String),

    #[error("unsupported URL scheme '{0}', only http and https are allowed")]
    UnsupportedScheme(String),

    #[error("timed out after {timeout:?} fetching {url}")]
    FetchTimeout { url: String, timeout: Duration },

    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("fetching {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error(
        "remote file declares {} which exceeds the maximum of {}",
        format_bytes(*declared),
        format_bytes(*max)
    )]
    DeclaredTooLarge { declared: u64, max: u64 },

    #[error(
        "attachment size {} exceeds the maximum of {}",
        format_bytes(*actual),
        format_bytes(*max)
    )]
    TooLarge { actual: u64, max: u64 },

    #[error("path '{0}' is not allowed: home shortcuts and parent-directory segments are rejected")]
    PathTraversal(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("'{0}' is not a regular file")]
    NotAFile(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl AttachmentError {
    /// Wraps `self` with the position and name of the descriptor it came from.
    pub fn at(self, index: usize, name: impl Into<String>) -> Self {
        AttachmentError::Item {
            index,
            name: name.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, unwrapping any descriptor context.
    pub fn root(&self) -> &AttachmentError {
        match self {
            AttachmentError::Item { source, .. } => source.root(),
            other => other,
        }
    }

    /// Position of the offending descriptor, when known.
    pub fn index(&self) -> Option<usize> {
        match self {
            AttachmentError::Item { index, .. } => Some(*index),
            _ => None,
        }
    }
}

impl From<AttachmentError> for ClassifiedError {
    fn from(err: AttachmentError) -> Self {
        let message = err.to_string();
        let classified = match err.root() {
            AttachmentError::Fetch { .. } | AttachmentError::FetchTimeout { .. } => {
                ClassifiedError::new(ErrorKind::NetworkError, message)
            }
            AttachmentError::HttpStatus { status, .. } => {
                classify_api_status(*status, message, None)
            }
            AttachmentError::FileNotFound(_) => ClassifiedError::new(ErrorKind::NotFound, message),
            AttachmentError::Io { .. } => ClassifiedError::new(ErrorKind::Unknown, message),
            _ => ClassifiedError::invalid_parameters(message),
        };
        classified.with_cause(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_message_is_one_based() {
        let err = AttachmentError::EmptyData.at(2, "c.txt");
        assert_eq!(err.to_string(), "attachment 3 (c.txt): attachment data is empty");
        assert_eq!(err.index(), Some(2));
        assert!(matches!(err.root(), AttachmentError::EmptyData));
    }

    #[test]
    fn test_too_large_message_has_both_sizes() {
        let err = AttachmentError::TooLarge {
            actual: 10_000_000,
            max: 8_388_608,
        };
        let msg = err.to_string();
        assert!(msg.contains("9.54 MB"), "{msg}");
        assert!(msg.contains("8.00 MB"), "{msg}");
    }

    #[test]
    fn test_classification_of_validation_errors() {
        let classified: ClassifiedError = AttachmentError::NoSource.at(0, "a.txt").into();
        assert_eq!(classified.kind, ErrorKind::InvalidParameters);
        assert!(!classified.is_retryable);
        assert!(classified.message.contains("a.txt"));
        assert!(classified.cause.is_some());
    }

    #[test]
    fn test_classification_of_io_errors() {
        let missing: ClassifiedError = AttachmentError::FileNotFound("/x".into()).into();
        assert_eq!(missing.kind, ErrorKind::NotFound);

        let timeout: ClassifiedError = AttachmentError::FetchTimeout {
            url: "https://x/y.png".into(),
            timeout: Duration::from_secs(30),
        }
        .into();
        assert_eq!(timeout.kind, ErrorKind::NetworkError);
        assert!(timeout.is_retryable);
        assert!(timeout.message.contains("timed out after 30s"));

        let gone: ClassifiedError = AttachmentError::HttpStatus {
            url: "https://x/y.png".into(),
            status: 404,
        }
        .into();
        assert_eq!(gone.kind, ErrorKind::NotFound);
        assert_eq!(gone.status_code, Some(404));
    }
}
