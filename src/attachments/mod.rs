//! Attachment ingestion.
//!
//! Turns untrusted attachment descriptors into validated, size-bounded byte
//! buffers ready to be embedded in an outgoing message. Each descriptor
//! names exactly one source:
//!
//! - `inlineData`: base64 text, optionally a `data:` URL
//! - `remoteUrl`: an http(s) URL fetched with a bounded timeout
//! - `localPath`: a regular file on the local filesystem
//!
//! A batch is all-or-nothing. Every descriptor is validated before any of
//! them performs I/O, resolution then fans out concurrently, and the first
//! failure by descriptor position fails the whole batch.

pub mod error;
pub mod resolve;
pub mod size;
pub mod validate;

use std::time::Duration;

use futures::future::join_all;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use error::AttachmentError;
pub use size::format_bytes;
pub use validate::{validate_descriptor, AttachmentSource, ValidatedAttachment};

/// Maximum size of a single resolved attachment (8 MiB).
pub const MAX_ATTACHMENT_BYTES: u64 = 8_388_608;

/// Timeout for fetching a remote attachment.
pub const FETCH_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Maximum number of attachments on one message.
pub const MAX_ATTACHMENTS: usize = 10;

pub const MAX_NAME_CHARS: usize = 100;
pub const MAX_ALT_TEXT_CHARS: usize = 1024;

/// An attachment as supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentDescriptor {
    /// File name shown in the channel.
    #[serde(default)]
    #[schemars(description = "File name shown in the channel, at most 100 characters")]
    pub name: String,

    #[serde(default, alias = "data", skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Base64 file content, optionally as a data: URL")]
    pub inline_data: Option<String>,

    #[serde(default, alias = "url", skip_serializing_if = "Option::is_none")]
    #[schemars(description = "http(s) URL to download the file from")]
    pub remote_url: Option<String>,

    #[serde(default, alias = "path", skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Path of a local file to attach")]
    pub local_path: Option<String>,

    #[serde(default, alias = "description", skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Alt text for the attachment, at most 1024 characters")]
    pub alt_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Hide the attachment behind a spoiler")]
    pub spoiler: Option<bool>,
}

impl AttachmentDescriptor {
    pub fn inline(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inline_data: Some(data.into()),
            ..Default::default()
        }
    }

    pub fn remote(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            remote_url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn local(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            local_path: Some(path.into()),
            ..Default::default()
        }
    }
}

/// An attachment whose bytes are in memory and within limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAttachment {
    pub display_name: String,
    pub bytes: Vec<u8>,
    pub alt_text: Option<String>,
}

impl ResolvedAttachment {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn summary(&self) -> AttachmentSummary {
        AttachmentSummary {
            display_name: self.display_name.clone(),
            size: self.bytes.len() as u64,
            alt_text: self.alt_text.clone(),
        }
    }
}

/// Byte-free view of a resolved attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentSummary {
    pub display_name: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
}

/// Resolves attachment batches.
#[derive(Debug, Clone)]
pub struct AttachmentPipeline {
    client: reqwest::Client,
    fetch_timeout: Duration,
    max_bytes: u64,
}

impl Default for AttachmentPipeline {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl AttachmentPipeline {
    /// Creates a pipeline that downloads remote attachments with `client`.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            fetch_timeout: FETCH_TIMEOUT,
            max_bytes: MAX_ATTACHMENT_BYTES,
        }
    }

    /// Overrides the remote fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Validates and resolves a batch of descriptors.
    ///
    /// Returns the resolved attachments in input order, or the error of the
    /// lowest-positioned descriptor that failed. Buffers resolved before a
    /// failure are dropped.
    pub async fn process(
        &self,
        descriptors: &[AttachmentDescriptor],
    ) -> Result<Vec<ResolvedAttachment>, AttachmentError> {
        if descriptors.len() > MAX_ATTACHMENTS {
            warn!(count = descriptors.len(), "too many attachments");
            return Err(AttachmentError::TooMany {
                count: descriptors.len(),
            });
        }

        let validated = descriptors
            .iter()
            .enumerate()
            .map(|(index, descriptor)| {
                validate_descriptor(descriptor).map_err(|e| {
                    warn!(index, name = %descriptor.name, error = %e, "attachment rejected");
                    e.at(index, &descriptor.name)
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(count = validated.len(), "resolving attachments");

        let results = join_all(
            validated
                .iter()
                .enumerate()
                .map(|(index, attachment)| self.resolve_one(index, attachment)),
        )
        .await;

        results.into_iter().collect()
    }

    async fn resolve_one(
        &self,
        index: usize,
        attachment: &ValidatedAttachment,
    ) -> Result<ResolvedAttachment, AttachmentError> {
        debug!(
            index,
            name = %attachment.name,
            source = attachment.source.kind(),
            "resolving attachment"
        );

        let bytes = match &attachment.source {
            AttachmentSource::Inline(data) => resolve::decode_inline(data),
            AttachmentSource::Remote(url) => {
                resolve::fetch_remote(&self.client, url, self.max_bytes, self.fetch_timeout).await
            }
            AttachmentSource::Local(path) => resolve::read_local(path, self.max_bytes).await,
        }
        .and_then(|bytes| {
            let actual = bytes.len() as u64;
            if actual > self.max_bytes {
                Err(AttachmentError::TooLarge {
                    actual,
                    max: self.max_bytes,
                })
            } else {
                Ok(bytes)
            }
        })
        .map_err(|e| {
            warn!(index, name = %attachment.name, error = %e, "attachment failed");
            e.at(index, &attachment.name)
        })?;

        debug!(index, name = %attachment.name, size = bytes.len(), "attachment resolved");

        Ok(ResolvedAttachment {
            display_name: attachment.display_name(),
            bytes,
            alt_text: attachment.alt_text.clone(),
        })
    }
}

/// Resolves a batch with a default pipeline.
pub async fn process_attachments(
    descriptors: &[AttachmentDescriptor],
) -> Result<Vec<ResolvedAttachment>, AttachmentError> {
    AttachmentPipeline::default().process(descriptors).await
}
