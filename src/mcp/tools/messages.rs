// Message tools: send, read, edit, delete and direct messages

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::{ToolContext, ToolResult};
use crate::attachments::{AttachmentDescriptor, ResolvedAttachment};
use crate::error::ClassifiedError;
use crate::platform::{
    check_content, check_snowflake, clamp_limit, MessageSummary, OutgoingMessage, SentMessage,
    READ_LIMIT_RANGE,
};

/// Messages returned by `read_messages` when no limit is given.
pub const DEFAULT_READ_LIMIT: u16 = 50;

/// Request parameters for the send_message tool.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[schemars(description = "ID of the channel to post in")]
    pub channel_id: String,
    #[schemars(description = "Message text, at most 2000 characters")]
    #[serde(default)]
    pub content: Option<String>,
    #[schemars(description = "ID of a message in the same channel to reply to")]
    #[serde(default)]
    pub reply_to: Option<String>,
    #[schemars(description = "Files to attach, at most 10")]
    #[serde(default)]
    pub attachments: Vec<AttachmentDescriptor>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadMessagesRequest {
    #[schemars(description = "ID of the channel to read from")]
    pub channel_id: String,
    #[schemars(description = "Number of messages to return, 1-100 (default 50)")]
    #[serde(default)]
    pub limit: Option<u32>,
    #[schemars(description = "Only return messages older than this message ID")]
    #[serde(default)]
    pub before: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EditMessageRequest {
    pub channel_id: String,
    pub message_id: String,
    #[schemars(description = "New message text, at most 2000 characters")]
    pub content: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMessageRequest {
    pub channel_id: String,
    pub message_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendDirectMessageRequest {
    #[schemars(description = "ID of the user to message")]
    pub user_id: String,
    #[schemars(description = "Message text, at most 2000 characters")]
    #[serde(default)]
    pub content: Option<String>,
    #[schemars(description = "Files to attach, at most 10")]
    #[serde(default)]
    pub attachments: Vec<AttachmentDescriptor>,
}

/// Result of `read_messages`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadMessagesResponse {
    pub channel_id: String,
    pub count: usize,
    pub messages: Vec<MessageSummary>,
}

/// Result of `send_direct_message`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessageResponse {
    pub user_id: String,
    pub channel_id: String,
    pub message: SentMessage,
}

async fn resolve_attachments(
    ctx: &ToolContext,
    descriptors: &[AttachmentDescriptor],
) -> ToolResult<Vec<ResolvedAttachment>> {
    if descriptors.is_empty() {
        return Ok(Vec::new());
    }
    ctx.attachments
        .process(descriptors)
        .await
        .map_err(ClassifiedError::from)
}

pub async fn send_message(ctx: &ToolContext, req: SendMessageRequest) -> ToolResult<SentMessage> {
    check_snowflake("channelId", &req.channel_id)?;
    if let Some(reply_to) = &req.reply_to {
        check_snowflake("replyTo", reply_to)?;
    }
    check_content(req.content.as_deref(), req.attachments.len())?;

    let message = OutgoingMessage {
        content: req.content,
        reply_to: req.reply_to,
        attachments: resolve_attachments(ctx, &req.attachments).await?,
    };

    let sent = ctx
        .retry
        .execute("send_message", || {
            ctx.platform.send_message(&req.channel_id, &message)
        })
        .await?;

    info!(
        channel_id = %sent.channel_id,
        message_id = %sent.id,
        attachments = sent.attachments.len(),
        "message sent"
    );
    Ok(sent)
}

pub async fn read_messages(
    ctx: &ToolContext,
    req: ReadMessagesRequest,
) -> ToolResult<ReadMessagesResponse> {
    check_snowflake("channelId", &req.channel_id)?;
    if let Some(before) = &req.before {
        check_snowflake("before", before)?;
    }
    let limit = clamp_limit(req.limit, DEFAULT_READ_LIMIT, READ_LIMIT_RANGE);

    let messages = ctx
        .retry
        .execute("read_messages", || {
            ctx.platform
                .read_messages(&req.channel_id, limit, req.before.as_deref())
        })
        .await?;

    Ok(ReadMessagesResponse {
        channel_id: req.channel_id,
        count: messages.len(),
        messages,
    })
}

pub async fn edit_message(ctx: &ToolContext, req: EditMessageRequest) -> ToolResult<SentMessage> {
    check_snowflake("channelId", &req.channel_id)?;
    check_snowflake("messageId", &req.message_id)?;
    check_content(Some(&req.content), 0)?;

    ctx.retry
        .execute("edit_message", || {
            ctx.platform
                .edit_message(&req.channel_id, &req.message_id, &req.content)
        })
        .await
}

pub async fn delete_message(ctx: &ToolContext, req: DeleteMessageRequest) -> ToolResult<Value> {
    check_snowflake("channelId", &req.channel_id)?;
    check_snowflake("messageId", &req.message_id)?;

    ctx.retry
        .execute("delete_message", || {
            ctx.platform.delete_message(&req.channel_id, &req.message_id)
        })
        .await?;

    Ok(json!({ "deleted": true, "channelId": req.channel_id, "messageId": req.message_id }))
}

/// Opens the DM channel and sends into it. The two remote calls are retried
/// independently, so a failed send never reopens the channel.
pub async fn send_direct_message(
    ctx: &ToolContext,
    req: SendDirectMessageRequest,
) -> ToolResult<DirectMessageResponse> {
    check_snowflake("userId", &req.user_id)?;
    check_content(req.content.as_deref(), req.attachments.len())?;

    let message = OutgoingMessage {
        content: req.content,
        reply_to: None,
        attachments: resolve_attachments(ctx, &req.attachments).await?,
    };

    let channel = ctx
        .retry
        .execute("open_direct_channel", || {
            ctx.platform.open_direct_channel(&req.user_id)
        })
        .await?;

    let sent = ctx
        .retry
        .execute("send_direct_message", || {
            ctx.platform.send_message(&channel.id, &message)
        })
        .await?;

    Ok(DirectMessageResponse {
        user_id: req.user_id,
        channel_id: channel.id,
        message: sent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::mcp::tools::testing::{context, FakePlatform, CHANNEL, DM_CHANNEL, MESSAGE, USER};
    use crate::platform::ApiFault;
    use std::sync::Arc;

    fn send_request(content: Option<&str>) -> SendMessageRequest {
        SendMessageRequest {
            channel_id: CHANNEL.to_string(),
            content: content.map(str::to_string),
            reply_to: None,
            attachments: vec![],
        }
    }

    #[test]
    fn test_send_request_accepts_camel_case() {
        let req: SendMessageRequest = serde_json::from_value(json!({
            "channelId": CHANNEL,
            "content": "hi",
            "attachments": [{"name": "a.txt", "inlineData": "aGVsbG8="}]
        }))
        .unwrap();
        assert_eq!(req.channel_id, CHANNEL);
        assert_eq!(req.attachments.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_message_with_inline_attachment() {
        let platform = Arc::new(FakePlatform::default());
        let (ctx, _) = context(platform.clone());

        let mut req = send_request(None);
        req.attachments = vec![AttachmentDescriptor {
            spoiler: Some(true),
            ..AttachmentDescriptor::inline("a.txt", "aGVsbG8=")
        }];

        let sent = send_message(&ctx, req).await.unwrap();
        assert_eq!(sent.attachments, vec!["SPOILER_a.txt"]);

        let sent_messages = platform.sent.lock().unwrap();
        let (channel, message) = &sent_messages[0];
        assert_eq!(channel, CHANNEL);
        assert_eq!(message.attachments[0].bytes, b"hello");
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_message_validates_before_calling() {
        let platform = Arc::new(FakePlatform::default());
        let (ctx, _) = context(platform.clone());

        let err = send_message(&ctx, send_request(Some(""))).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParameters);

        let mut bad_channel = send_request(Some("hi"));
        bad_channel.channel_id = "general".to_string();
        let err = send_message(&ctx, bad_channel).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParameters);

        assert!(platform.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_attachment_aborts_send() {
        let platform = Arc::new(FakePlatform::default());
        let (ctx, _) = context(platform.clone());

        let mut req = send_request(Some("see attached"));
        req.attachments = vec![
            AttachmentDescriptor::inline("a.txt", "aGVsbG8="),
            AttachmentDescriptor::local("b.txt", "../etc/passwd"),
        ];

        let err = send_message(&ctx, req).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParameters);
        assert!(err.message.contains("b.txt"));
        assert!(platform.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_message_retries_transient_failure() {
        let platform = Arc::new(FakePlatform::failing_with(vec![ApiFault::new(
            502,
            "Bad Gateway",
        )]));
        let (ctx, sink) = context(platform.clone());

        let sent = send_message(&ctx, send_request(Some("hi"))).await.unwrap();
        assert_eq!(sent.id, MESSAGE);
        assert_eq!(platform.calls(), vec!["send_message", "send_message"]);
        assert_eq!(sink.retries(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_messages_clamps_limit() {
        let platform = Arc::new(FakePlatform::default());
        let (ctx, _) = context(platform.clone());

        let response = read_messages(
            &ctx,
            ReadMessagesRequest {
                channel_id: CHANNEL.to_string(),
                limit: Some(500),
                before: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(response.count, 1);
        assert_eq!(platform.calls(), vec!["read_messages:100"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_message_not_found_is_not_retried() {
        let platform = Arc::new(FakePlatform::failing_with(vec![ApiFault::new(
            404,
            "Unknown Message",
        )]));
        let (ctx, sink) = context(platform.clone());

        let err = edit_message(
            &ctx,
            EditMessageRequest {
                channel_id: CHANNEL.to_string(),
                message_id: MESSAGE.to_string(),
                content: "fixed typo".to_string(),
            },
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.status_code, Some(404));
        assert_eq!(sink.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_message_ack() {
        let platform = Arc::new(FakePlatform::default());
        let (ctx, _) = context(platform);

        let ack = delete_message(
            &ctx,
            DeleteMessageRequest {
                channel_id: CHANNEL.to_string(),
                message_id: MESSAGE.to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(ack["deleted"], true);
        assert_eq!(ack["messageId"], MESSAGE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_message_wraps_each_call() {
        let platform = Arc::new(FakePlatform::default());
        let (ctx, sink) = context(platform.clone());

        let response = send_direct_message(
            &ctx,
            SendDirectMessageRequest {
                user_id: USER.to_string(),
                content: Some("hello".to_string()),
                attachments: vec![],
            },
        )
        .await
        .unwrap();

        assert_eq!(response.channel_id, DM_CHANNEL);
        assert_eq!(platform.calls(), vec!["open_direct_channel", "send_message"]);
        let labels: Vec<String> = sink
            .events()
            .iter()
            .map(|e| e.label().to_string())
            .collect();
        assert!(labels.contains(&"open_direct_channel".to_string()));
        assert!(labels.contains(&"send_direct_message".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_message_forbidden() {
        let platform = Arc::new(FakePlatform::failing_with(vec![ApiFault::new(
            403,
            "Cannot send messages to this user",
        )
        .with_code(50007)]));
        let (ctx, _) = context(platform.clone());

        let err = send_direct_message(
            &ctx,
            SendDirectMessageRequest {
                user_id: USER.to_string(),
                content: Some("hello".to_string()),
                attachments: vec![],
            },
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind, ErrorKind::PermissionDenied);
        assert_eq!(platform.calls(), vec!["open_direct_channel"]);
    }
}
