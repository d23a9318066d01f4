//! Tool implementations.
//!
//! Each tool validates its flat parameters, resolves attachments where it
//! sends files, and then makes exactly one retried facade call per remote
//! operation. Everything a tool returns on failure is a [`ClassifiedError`].

pub mod channels;
pub mod members;
pub mod messages;
pub mod reactions;

use std::sync::Arc;

use crate::attachments::AttachmentPipeline;
use crate::error::ClassifiedError;
use crate::platform::ChatPlatform;
use crate::retry::RetryExecutor;

pub use channels::{CreateChannelRequest, DeleteChannelRequest, GetChannelRequest, ListChannelsRequest};
pub use members::{GetMemberRequest, ListMembersRequest};
pub use messages::{
    DeleteMessageRequest, EditMessageRequest, ReadMessagesRequest, SendDirectMessageRequest,
    SendMessageRequest,
};
pub use reactions::ReactionRequest;

/// Everything a tool needs to reach the platform.
#[derive(Clone)]
pub struct ToolContext {
    pub platform: Arc<dyn ChatPlatform>,
    pub retry: RetryExecutor,
    pub attachments: AttachmentPipeline,
}

impl ToolContext {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        retry: RetryExecutor,
        attachments: AttachmentPipeline,
    ) -> Self {
        Self {
            platform,
            retry,
            attachments,
        }
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("retry", &self.retry)
            .field("attachments", &self.attachments)
            .finish_non_exhaustive()
    }
}

/// Result of a tool before it is rendered for the host.
pub type ToolResult<T> = Result<T, ClassifiedError>;

fn require_text(field: &str, value: &str, max_chars: usize) -> ToolResult<()> {
    let len = value.chars().count();
    if value.trim().is_empty() {
        return Err(ClassifiedError::invalid_parameters(format!(
            "{field} must not be empty"
        )));
    }
    if len > max_chars {
        return Err(ClassifiedError::invalid_parameters(format!(
            "{field} is {len} characters, at most {max_chars} allowed"
        )));
    }
    Ok(())
}
