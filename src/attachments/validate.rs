//! Descriptor validation. Nothing here touches the network or filesystem.

use super::{AttachmentDescriptor, AttachmentError, MAX_ALT_TEXT_CHARS, MAX_NAME_CHARS};

/// Characters that may not appear in an attachment name.
const RESERVED_NAME_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Where a validated attachment's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentSource {
    /// Base64 text, optionally with a `data:` URL prefix.
    Inline(String),
    /// An http(s) URL.
    Remote(String),
    /// A filesystem path without traversal segments.
    Local(String),
}

impl AttachmentSource {
    pub fn kind(&self) -> &'static str {
        match self {
            AttachmentSource::Inline(_) => "inline",
            AttachmentSource::Remote(_) => "url",
            AttachmentSource::Local(_) => "path",
        }
    }
}

/// A descriptor that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedAttachment {
    pub name: String,
    pub source: AttachmentSource,
    pub alt_text: Option<String>,
    pub spoiler: bool,
}

impl ValidatedAttachment {
    /// The name sent to the platform: prefixed with `SPOILER_` when marked
    /// as a spoiler.
    pub fn display_name(&self) -> String {
        if self.spoiler {
            format!("SPOILER_{}", self.name)
        } else {
            self.name.clone()
        }
    }
}

/// Validates a single descriptor.
pub fn validate_descriptor(
    descriptor: &AttachmentDescriptor,
) -> Result<ValidatedAttachment, AttachmentError> {
    validate_name(&descriptor.name)?;

    let mut sources = Vec::with_capacity(1);
    if let Some(data) = &descriptor.inline_data {
        sources.push(AttachmentSource::Inline(data.clone()));
    }
    if let Some(url) = &descriptor.remote_url {
        sources.push(AttachmentSource::Remote(url.clone()));
    }
    if let Some(path) = &descriptor.local_path {
        sources.push(AttachmentSource::Local(path.clone()));
    }

    let source = match sources.len() {
        0 => return Err(AttachmentError::NoSource),
        1 => sources.remove(0),
        count => return Err(AttachmentError::MultipleSources { count }),
    };

    match &source {
        AttachmentSource::Remote(url) => validate_url(url)?,
        AttachmentSource::Local(path) => validate_local_path(path)?,
        AttachmentSource::Inline(_) => {}
    }

    if let Some(alt) = &descriptor.alt_text {
        let len = alt.chars().count();
        if len > MAX_ALT_TEXT_CHARS {
            return Err(AttachmentError::AltTextTooLong { len });
        }
    }

    Ok(ValidatedAttachment {
        name: descriptor.name.clone(),
        source,
        alt_text: descriptor.alt_text.clone(),
        spoiler: descriptor.spoiler.unwrap_or(false),
    })
}

fn validate_name(name: &str) -> Result<(), AttachmentError> {
    if name.trim().is_empty() {
        return Err(AttachmentError::MissingName);
    }

    let len = name.chars().count();
    if len > MAX_NAME_CHARS {
        return Err(AttachmentError::NameTooLong { len });
    }

    if name == "." || name == ".." {
        return Err(AttachmentError::InvalidName {
            name: name.to_string(),
            reason: "reserved name".to_string(),
        });
    }

    if let Some(ch) = name
        .chars()
        .find(|c| RESERVED_NAME_CHARS.contains(c) || c.is_ascii_control())
    {
        return Err(AttachmentError::InvalidName {
            name: name.to_string(),
            reason: format!("contains reserved character {:?}", ch),
        });
    }

    Ok(())
}

fn validate_url(url: &str) -> Result<(), AttachmentError> {
    let parsed =
        reqwest::Url::parse(url).map_err(|e| AttachmentError::InvalidUrl(format!("{url}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(AttachmentError::UnsupportedScheme(other.to_string())),
    }
}

/// Rejects `~` shorthand and any `..` segment, with either separator.
fn validate_local_path(path: &str) -> Result<(), AttachmentError> {
    if path.trim().is_empty() {
        return Err(AttachmentError::PathTraversal(path.to_string()));
    }
    if path.starts_with('~') {
        return Err(AttachmentError::PathTraversal(path.to_string()));
    }
    if path.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(AttachmentError::PathTraversal(path.to_string()));
    }
    Ok(())
}
