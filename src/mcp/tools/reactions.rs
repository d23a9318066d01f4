use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{ToolContext, ToolResult};
use crate::error::ClassifiedError;
use crate::platform::check_snowflake;

/// Parameters shared by the add and remove reaction tools.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReactionRequest {
    pub channel_id: String,
    pub message_id: String,
    #[schemars(
        description = "Unicode emoji (e.g. \"👍\") or custom emoji as name:id (e.g. \"party:123456789012345678\")"
    )]
    pub emoji: String,
}

impl ReactionRequest {
    fn validate(&self) -> ToolResult<String> {
        check_snowflake("channelId", &self.channel_id)?;
        check_snowflake("messageId", &self.message_id)?;
        normalize_emoji(&self.emoji)
    }
}

/// Accepts a unicode emoji, `name:id`, or the `<:name:id>` / `<a:name:id>`
/// mention form, and returns the form used in reaction routes.
fn normalize_emoji(raw: &str) -> ToolResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ClassifiedError::invalid_parameters("emoji must not be empty"));
    }

    let inner = trimmed
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .map(|s| s.strip_prefix("a:").unwrap_or(s))
        .map(|s| s.strip_prefix(':').unwrap_or(s));

    let candidate = inner.unwrap_or(trimmed);
    match candidate.split_once(':') {
        Some((name, id)) => {
            if name.is_empty() || check_snowflake("emoji id", id).is_err() {
                return Err(ClassifiedError::invalid_parameters(format!(
                    "custom emoji must look like name:id, got '{raw}'"
                )));
            }
            Ok(format!("{name}:{id}"))
        }
        None if inner.is_some() => Err(ClassifiedError::invalid_parameters(format!(
            "custom emoji must look like name:id, got '{raw}'"
        ))),
        None => Ok(candidate.to_string()),
    }
}

pub async fn add_reaction(ctx: &ToolContext, req: ReactionRequest) -> ToolResult<Value> {
    let emoji = req.validate()?;

    ctx.retry
        .execute("add_reaction", || {
            ctx.platform
                .add_reaction(&req.channel_id, &req.message_id, &emoji)
        })
        .await?;

    Ok(json!({ "added": true, "messageId": req.message_id, "emoji": emoji }))
}

pub async fn remove_reaction(ctx: &ToolContext, req: ReactionRequest) -> ToolResult<Value> {
    let emoji = req.validate()?;

    ctx.retry
        .execute("remove_reaction", || {
            ctx.platform
                .remove_reaction(&req.channel_id, &req.message_id, &emoji)
        })
        .await?;

    Ok(json!({ "removed": true, "messageId": req.message_id, "emoji": emoji }))
}
