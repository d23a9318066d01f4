//! Byte resolution for each attachment source.

use std::io;
use std::time::Duration;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use tracing::debug;

use super::AttachmentError;

/// Standard alphabet, with or without trailing `=` padding.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decodes inline base64 data. Anything up to and including the first comma
/// is discarded, so `data:image/png;base64,...` URLs are accepted as-is.
pub fn decode_inline(data: &str) -> Result<Vec<u8>, AttachmentError> {
    let payload = match data.split_once(',') {
        Some((_, rest)) => rest,
        None => data,
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(AttachmentError::EmptyData);
    }

    let bytes = LENIENT
        .decode(compact.as_bytes())
        .map_err(|e| AttachmentError::InvalidBase64(e.to_string()))?;
    if bytes.is_empty() {
        return Err(AttachmentError::EmptyData);
    }
    Ok(bytes)
}

/// Downloads `url`, enforcing `max_bytes` and the overall `timeout`.
pub async fn fetch_remote(
    client: &reqwest::Client,
    url: &str,
    max_bytes: u64,
    timeout: Duration,
) -> Result<Vec<u8>, AttachmentError> {
    match tokio::time::timeout(timeout, download(client, url, max_bytes)).await {
        Ok(result) => result,
        Err(_) => Err(AttachmentError::FetchTimeout {
            url: url.to_string(),
            timeout,
        }),
    }
}

async fn download(
    client: &reqwest::Client,
    url: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, AttachmentError> {
    let fetch_err = |source| AttachmentError::Fetch {
        url: url.to_string(),
        source,
    };

    let mut response = client.get(url).send().await.map_err(fetch_err)?;

    let status = response.status();
    if !status.is_success() {
        return Err(AttachmentError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let declared = response.content_length();
    if let Some(declared) = declared {
        if declared > max_bytes {
            return Err(AttachmentError::DeclaredTooLarge {
                declared,
                max: max_bytes,
            });
        }
    }
    debug!(url, declared_length = ?declared, "downloading attachment");

    let mut body = Vec::with_capacity(declared.unwrap_or(0) as usize);
    while let Some(chunk) = response.chunk().await.map_err(fetch_err)? {
        let total = (body.len() + chunk.len()) as u64;
        if total > max_bytes {
            return Err(AttachmentError::TooLarge {
                actual: total,
                max: max_bytes,
            });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Reads a local regular file, checking its size before reading.
pub async fn read_local(path: &str, max_bytes: u64) -> Result<Vec<u8>, AttachmentError> {
    let io_err = |source: io::Error| match source.kind() {
        io::ErrorKind::NotFound => AttachmentError::FileNotFound(path.to_string()),
        _ => AttachmentError::Io {
            path: path.to_string(),
            source,
        },
    };

    let metadata = tokio::fs::metadata(path).await.map_err(io_err)?;
    if !metadata.is_file() {
        return Err(AttachmentError::NotAFile(path.to_string()));
    }
    if metadata.len() > max_bytes {
        return Err(AttachmentError::TooLarge {
            actual: metadata.len(),
            max: max_bytes,
        });
    }

    debug!(path, size = metadata.len(), "reading attachment");
    tokio::fs::read(path).await.map_err(io_err)
}
