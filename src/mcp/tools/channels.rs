use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::{require_text, ToolContext, ToolResult};
use crate::error::ClassifiedError;
use crate::platform::{check_snowflake, ChannelKind, ChannelSummary, NewChannel};

const MAX_CHANNEL_NAME_CHARS: usize = 100;
const MAX_TOPIC_CHARS: usize = 1024;

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListChannelsRequest {
    #[schemars(description = "ID of the guild (server)")]
    pub guild_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetChannelRequest {
    pub channel_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateChannelRequest {
    #[schemars(description = "ID of the guild (server) to create the channel in")]
    pub guild_id: String,
    #[schemars(description = "Channel name, 1-100 characters")]
    pub name: String,
    #[schemars(description = "Kind of channel (default text)")]
    #[serde(default)]
    pub kind: Option<ChannelKind>,
    #[serde(default)]
    pub topic: Option<String>,
    #[schemars(description = "ID of the category to place the channel under")]
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteChannelRequest {
    pub channel_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListChannelsResponse {
    pub guild_id: String,
    pub count: usize,
    pub channels: Vec<ChannelSummary>,
}

pub async fn list_channels(
    ctx: &ToolContext,
    req: ListChannelsRequest,
) -> ToolResult<ListChannelsResponse> {
    check_snowflake("guildId", &req.guild_id)?;

    let channels = ctx
        .retry
        .execute("list_channels", || ctx.platform.list_channels(&req.guild_id))
        .await?;

    Ok(ListChannelsResponse {
        guild_id: req.guild_id,
        count: channels.len(),
        channels,
    })
}

pub async fn get_channel(ctx: &ToolContext, req: GetChannelRequest) -> ToolResult<ChannelSummary> {
    check_snowflake("channelId", &req.channel_id)?;

    ctx.retry
        .execute("get_channel", || ctx.platform.get_channel(&req.channel_id))
        .await
}

pub async fn create_channel(
    ctx: &ToolContext,
    req: CreateChannelRequest,
) -> ToolResult<ChannelSummary> {
    check_snowflake("guildId", &req.guild_id)?;
    require_text("name", &req.name, MAX_CHANNEL_NAME_CHARS)?;
    if let Some(topic) = &req.topic {
        require_text("topic", topic, MAX_TOPIC_CHARS)?;
    }
    if let Some(parent_id) = &req.parent_id {
        check_snowflake("parentId", parent_id)?;
    }

    let kind = req.kind.unwrap_or(ChannelKind::Text);
    if kind.code().is_none() {
        return Err(ClassifiedError::invalid_parameters(format!(
            "channels of kind '{}' cannot be created in a guild",
            serde_json::to_value(kind)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default()
        )));
    }

    let new = NewChannel {
        name: req.name.trim().to_string(),
        kind,
        topic: req.topic,
        parent_id: req.parent_id,
    };

    let created = ctx
        .retry
        .execute("create_channel", || {
            ctx.platform.create_channel(&req.guild_id, &new)
        })
        .await?;

    info!(guild_id = %req.guild_id, channel_id = %created.id, "channel created");
    Ok(created)
}

pub async fn delete_channel(ctx: &ToolContext, req: DeleteChannelRequest) -> ToolResult<Value> {
    check_snowflake("channelId", &req.channel_id)?;

    ctx.retry
        .execute("delete_channel", || {
            ctx.platform.delete_channel(&req.channel_id)
        })
        .await?;

    info!(channel_id = %req.channel_id, "channel deleted");
    Ok(json!({ "deleted": true, "channelId": req.channel_id }))
}
