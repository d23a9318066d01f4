//! Discord REST API (v10) implementation of [`ChatPlatform`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{
    ApiFault, AttachmentRef, ChannelKind, ChannelSummary, ChatPlatform, MemberSummary,
    MessageSummary, NewChannel, OutgoingMessage, PlatformError, ReactionCount, SentMessage,
};

/// Default API root.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

const USER_AGENT: &str = concat!("DiscordBot (guildrelay, ", env!("CARGO_PKG_VERSION"), ")");

/// Discord bot client.
#[derive(Clone)]
pub struct DiscordClient {
    http: Client,
    api_base: Url,
    token: String,
}

impl std::fmt::Debug for DiscordClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordClient")
            .field("api_base", &self.api_base.as_str())
            .field("token", &"<redacted>")
            .finish()
    }
}

impl DiscordClient {
    /// Creates a client authenticating with a bot `token`.
    pub fn new(
        token: impl Into<String>,
        api_base: &str,
        request_timeout: Duration,
    ) -> Result<Self, PlatformError> {
        let api_base = Url::parse(api_base)
            .map_err(|e| PlatformError::Request(format!("invalid API base '{api_base}': {e}")))?;
        if api_base.cannot_be_a_base() {
            return Err(PlatformError::Request(format!(
                "invalid API base '{api_base}'"
            )));
        }

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            http,
            api_base,
            token: token.into(),
        })
    }

    /// The HTTP client, shared with attachment downloads.
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Builds an endpoint URL. Each segment is percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.token))
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, PlatformError> {
        let response = self.authorized(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();
        let fault = ApiFault::from_response(status.as_u16(), &body, retry_after.as_deref());
        debug!(status = fault.status, code = ?fault.code, "API call failed");
        Err(fault.into())
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, PlatformError> {
        let response = self.execute(request).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn fire(&self, request: RequestBuilder) -> Result<(), PlatformError> {
        self.execute(request).await.map(|_| ())
    }
}

#[async_trait]
impl ChatPlatform for DiscordClient {
    async fn send_message(
        &self,
        channel_id: &str,
        message: &OutgoingMessage,
    ) -> Result<SentMessage, PlatformError> {
        let mut payload = json!({});
        if let Some(content) = &message.content {
            payload["content"] = content.clone().into();
        }
        if let Some(reply_to) = &message.reply_to {
            payload["message_reference"] = json!({ "message_id": reply_to });
        }

        let url = self.endpoint(&["channels", channel_id, "messages"]);
        let request = if message.attachments.is_empty() {
            self.http.post(url).json(&payload)
        } else {
            let metadata: Vec<Value> = message
                .attachments
                .iter()
                .enumerate()
                .map(|(index, attachment)| {
                    let mut entry = json!({ "id": index, "filename": attachment.display_name });
                    if let Some(alt) = &attachment.alt_text {
                        entry["description"] = alt.clone().into();
                    }
                    entry
                })
                .collect();
            payload["attachments"] = Value::Array(metadata);

            let mut form = Form::new().text("payload_json", payload.to_string());
            for (index, attachment) in message.attachments.iter().enumerate() {
                let part = Part::bytes(attachment.bytes.clone())
                    .file_name(attachment.display_name.clone());
                form = form.part(format!("files[{index}]"), part);
            }
            self.http.post(url).multipart(form)
        };

        let raw: RawMessage = self.fetch(request).await?;
        Ok(raw.into_sent())
    }

    async fn read_messages(
        &self,
        channel_id: &str,
        limit: u16,
        before: Option<&str>,
    ) -> Result<Vec<MessageSummary>, PlatformError> {
        let mut request = self
            .http
            .get(self.endpoint(&["channels", channel_id, "messages"]))
            .query(&[("limit", limit.to_string())]);
        if let Some(before) = before {
            request = request.query(&[("before", before)]);
        }

        let raw: Vec<RawMessage> = self.fetch(request).await?;
        Ok(raw.into_iter().map(RawMessage::into_summary).collect())
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<SentMessage, PlatformError> {
        let request = self
            .http
            .patch(self.endpoint(&["channels", channel_id, "messages", message_id]))
            .json(&json!({ "content": content }));
        let raw: RawMessage = self.fetch(request).await?;
        Ok(raw.into_sent())
    }

    async fn delete_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<(), PlatformError> {
        let url = self.endpoint(&["channels", channel_id, "messages", message_id]);
        self.fire(self.http.delete(url)).await
    }

    async fn list_channels(&self, guild_id: &str) -> Result<Vec<ChannelSummary>, PlatformError> {
        let request = self.http.get(self.endpoint(&["guilds", guild_id, "channels"]));
        let mut raw: Vec<RawChannel> = self.fetch(request).await?;
        raw.sort_by_key(|c| c.position.unwrap_or_default());
        Ok(raw.into_iter().map(RawChannel::into_summary).collect())
    }

    async fn get_channel(&self, channel_id: &str) -> Result<ChannelSummary, PlatformError> {
        let raw: RawChannel = self
            .fetch(self.http.get(self.endpoint(&["channels", channel_id])))
            .await?;
        Ok(raw.into_summary())
    }

    async fn create_channel(
        &self,
        guild_id: &str,
        channel: &NewChannel,
    ) -> Result<ChannelSummary, PlatformError> {
        let code = channel.kind.code().ok_or_else(|| {
            PlatformError::Request(format!(
                "channels of kind {:?} cannot be created in a guild",
                channel.kind
            ))
        })?;

        let mut payload = json!({ "name": channel.name, "type": code });
        if let Some(topic) = &channel.topic {
            payload["topic"] = topic.clone().into();
        }
        if let Some(parent_id) = &channel.parent_id {
            payload["parent_id"] = parent_id.clone().into();
        }

        let request = self
            .http
            .post(self.endpoint(&["guilds", guild_id, "channels"]))
            .json(&payload);
        let raw: RawChannel = self.fetch(request).await?;
        Ok(raw.into_summary())
    }

    async fn delete_channel(&self, channel_id: &str) -> Result<(), PlatformError> {
        self.fire(self.http.delete(self.endpoint(&["channels", channel_id])))
            .await
    }

    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), PlatformError> {
        let url = self.endpoint(&[
            "channels",
            channel_id,
            "messages",
            message_id,
            "reactions",
            emoji,
            "@me",
        ]);
        self.fire(self.http.put(url).header(reqwest::header::CONTENT_LENGTH, "0"))
            .await
    }

    async fn remove_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), PlatformError> {
        let url = self.endpoint(&[
            "channels",
            channel_id,
            "messages",
            message_id,
            "reactions",
            emoji,
            "@me",
        ]);
        self.fire(self.http.delete(url)).await
    }

    async fn list_members(
        &self,
        guild_id: &str,
        limit: u16,
        after: Option<&str>,
    ) -> Result<Vec<MemberSummary>, PlatformError> {
        let mut request = self
            .http
            .get(self.endpoint(&["guilds", guild_id, "members"]))
            .query(&[("limit", limit.to_string())]);
        if let Some(after) = after {
            request = request.query(&[("after", after)]);
        }

        let raw: Vec<RawMember> = self.fetch(request).await?;
        Ok(raw.into_iter().map(RawMember::into_summary).collect())
    }

    async fn get_member(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<MemberSummary, PlatformError> {
        let raw: RawMember = self
            .fetch(
                self.http
                    .get(self.endpoint(&["guilds", guild_id, "members", user_id])),
            )
            .await?;
        Ok(raw.into_summary())
    }

    async fn open_direct_channel(&self, user_id: &str) -> Result<ChannelSummary, PlatformError> {
        let request = self
            .http
            .post(self.endpoint(&["users", "@me", "channels"]))
            .json(&json!({ "recipient_id": user_id }));
        let raw: RawChannel = self.fetch(request).await?;
        Ok(raw.into_summary())
    }
}

// Wire shapes. Only the fields that are projected are declared.

#[derive(Debug, Deserialize)]
struct RawUser {
    id: String,
    username: String,
    #[serde(default)]
    global_name: Option<String>,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct RawAttachment {
    filename: String,
    url: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEmoji {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawReaction {
    count: u64,
    emoji: RawEmoji,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    id: String,
    channel_id: String,
    author: RawUser,
    #[serde(default)]
    content: String,
    timestamp: String,
    #[serde(default)]
    edited_timestamp: Option<String>,
    #[serde(default)]
    attachments: Vec<RawAttachment>,
    #[serde(default)]
    reactions: Vec<RawReaction>,
}

impl RawMessage {
    fn into_sent(self) -> SentMessage {
        SentMessage {
            id: self.id,
            channel_id: self.channel_id,
            timestamp: self.timestamp,
            attachments: self.attachments.into_iter().map(|a| a.filename).collect(),
        }
    }

    fn into_summary(self) -> MessageSummary {
        MessageSummary {
            id: self.id,
            channel_id: self.channel_id,
            author_name: self
                .author
                .global_name
                .unwrap_or_else(|| self.author.username.clone()),
            author_id: self.author.id,
            author_is_bot: self.author.bot,
            content: self.content,
            timestamp: self.timestamp,
            edited_timestamp: self.edited_timestamp,
            attachments: self
                .attachments
                .into_iter()
                .map(|a| AttachmentRef {
                    filename: a.filename,
                    url: a.url,
                    size: a.size,
                    description: a.description,
                })
                .collect(),
            reactions: self
                .reactions
                .into_iter()
                .map(|r| ReactionCount {
                    emoji: match (r.emoji.id, r.emoji.name) {
                        (Some(id), Some(name)) => format!("{name}:{id}"),
                        (None, Some(name)) => name,
                        (Some(id), None) => id,
                        (None, None) => String::new(),
                    },
                    count: r.count,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawChannel {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    guild_id: Option<String>,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    position: Option<i64>,
    #[serde(default)]
    recipients: Vec<RawUser>,
}

impl RawChannel {
    fn into_summary(self) -> ChannelSummary {
        ChannelSummary {
            id: self.id,
            name: self.name,
            kind: ChannelKind::from_code(self.kind),
            guild_id: self.guild_id,
            topic: self.topic,
            parent_id: self.parent_id,
            position: self.position,
            recipients: self.recipients.into_iter().map(|u| u.username).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawMember {
    #[serde(default)]
    user: Option<RawUser>,
    #[serde(default)]
    nick: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    joined_at: Option<String>,
}

impl RawMember {
    fn into_summary(self) -> MemberSummary {
        let (user_id, username, display_name, bot) = match self.user {
            Some(user) => (user.id, user.username, user.global_name, user.bot),
            None => (String::new(), String::new(), None, false),
        };
        MemberSummary {
            user_id,
            username,
            display_name,
            nickname: self.nick,
            roles: self.roles,
            joined_at: self.joined_at,
            bot,
        }
    }
}
