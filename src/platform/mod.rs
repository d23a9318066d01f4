//! Remote operation facade for the chat platform.
//!
//! Every method of [`ChatPlatform`] performs exactly one network call and
//! either returns a flat projection of the platform object or a
//! [`PlatformError`]. Retrying is the caller's concern.

pub mod discord;
pub mod fault;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::attachments::ResolvedAttachment;
use crate::error::ClassifiedError;

pub use discord::{DiscordClient, DEFAULT_API_BASE};
pub use fault::{ApiFault, PlatformError};

/// Maximum message length in characters.
pub const MAX_CONTENT_CHARS: usize = 2000;
/// Bounds for the number of messages fetched in one read.
pub const READ_LIMIT_RANGE: (u16, u16) = (1, 100);
/// Bounds for the number of members fetched in one listing.
pub const MEMBER_LIMIT_RANGE: (u16, u16) = (1, 1000);

/// Kind of a channel, as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Text,
    DirectMessage,
    Voice,
    GroupDirectMessage,
    Category,
    Announcement,
    Thread,
    Stage,
    Forum,
    Other,
}

impl ChannelKind {
    /// Maps the platform's numeric channel type.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ChannelKind::Text,
            1 => ChannelKind::DirectMessage,
            2 => ChannelKind::Voice,
            3 => ChannelKind::GroupDirectMessage,
            4 => ChannelKind::Category,
            5 => ChannelKind::Announcement,
            10..=12 => ChannelKind::Thread,
            13 => ChannelKind::Stage,
            15 => ChannelKind::Forum,
            _ => ChannelKind::Other,
        }
    }

    /// The numeric type used when creating a channel of this kind.
    pub fn code(self) -> Option<u8> {
        match self {
            ChannelKind::Text => Some(0),
            ChannelKind::Voice => Some(2),
            ChannelKind::Category => Some(4),
            ChannelKind::Announcement => Some(5),
            ChannelKind::Stage => Some(13),
            ChannelKind::Forum => Some(15),
            _ => None,
        }
    }
}

/// A file attached to a message that was read back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRef {
    pub filename: String,
    pub url: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionCount {
    pub emoji: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
    pub id: String,
    pub channel_id: String,
    pub author_id: String,
    pub author_name: String,
    pub author_is_bot: bool,
    pub content: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reactions: Vec<ReactionCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub kind: ChannelKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    /// Usernames of the recipients, for direct-message channels.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSummary {
    pub user_id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    pub roles: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<String>,
    pub bot: bool,
}

/// Confirmation of a sent or edited message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    pub id: String,
    pub channel_id: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

/// A message to send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub content: Option<String>,
    pub reply_to: Option<String>,
    pub attachments: Vec<ResolvedAttachment>,
}

/// A channel to create in a guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChannel {
    pub name: String,
    pub kind: ChannelKind,
    pub topic: Option<String>,
    pub parent_id: Option<String>,
}

/// Operations against the chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn send_message(
        &self,
        channel_id: &str,
        message: &OutgoingMessage,
    ) -> Result<SentMessage, PlatformError>;

    /// Newest-first messages, optionally only those before `before`.
    async fn read_messages(
        &self,
        channel_id: &str,
        limit: u16,
        before: Option<&str>,
    ) -> Result<Vec<MessageSummary>, PlatformError>;

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<SentMessage, PlatformError>;

    async fn delete_message(&self, channel_id: &str, message_id: &str)
        -> Result<(), PlatformError>;

    async fn list_channels(&self, guild_id: &str) -> Result<Vec<ChannelSummary>, PlatformError>;

    async fn get_channel(&self, channel_id: &str) -> Result<ChannelSummary, PlatformError>;

    async fn create_channel(
        &self,
        guild_id: &str,
        channel: &NewChannel,
    ) -> Result<ChannelSummary, PlatformError>;

    async fn delete_channel(&self, channel_id: &str) -> Result<(), PlatformError>;

    /// Reacts as the bot user.
    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), PlatformError>;

    /// Removes the bot user's own reaction.
    async fn remove_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), PlatformError>;

    async fn list_members(
        &self,
        guild_id: &str,
        limit: u16,
        after: Option<&str>,
    ) -> Result<Vec<MemberSummary>, PlatformError>;

    async fn get_member(&self, guild_id: &str, user_id: &str)
        -> Result<MemberSummary, PlatformError>;

    /// Opens (or reuses) the direct-message channel with a user.
    async fn open_direct_channel(&self, user_id: &str) -> Result<ChannelSummary, PlatformError>;
}

/// Checks that `value` looks like a platform snowflake id.
pub fn check_snowflake(field: &str, value: &str) -> Result<(), ClassifiedError> {
    let well_formed = (15..=21).contains(&value.len()) && value.bytes().all(|b| b.is_ascii_digit());
    if well_formed {
        Ok(())
    } else {
        Err(ClassifiedError::invalid_parameters(format!(
            "{field} must be a numeric id, got '{value}'"
        )))
    }
}

/// Checks message content against the length limit. Content may only be
/// empty when attachments are sent.
pub fn check_content(content: Option<&str>, attachment_count: usize) -> Result<(), ClassifiedError> {
    let content = content.unwrap_or_default();
    if content.trim().is_empty() && attachment_count == 0 {
        return Err(ClassifiedError::invalid_parameters(
            "message must have content or at least one attachment",
        ));
    }
    let len = content.chars().count();
    if len > MAX_CONTENT_CHARS {
        return Err(ClassifiedError::invalid_parameters(format!(
            "message content is {len} characters, at most {MAX_CONTENT_CHARS} allowed"
        )));
    }
    Ok(())
}

/// Clamps a requested page size into `range`, using `default` when absent.
pub fn clamp_limit(requested: Option<u32>, default: u16, range: (u16, u16)) -> u16 {
    match requested {
        Some(n) => n.clamp(range.0 as u32, range.1 as u32) as u16,
        None => default,
    }
}
