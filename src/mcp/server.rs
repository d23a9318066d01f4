// MCP server exposing the chat platform operations as tools

use std::future::Future;
use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo};
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use super::tools::{self, *};
use crate::attachments::AttachmentPipeline;
use crate::config::{ConfigError, RelayConfig};
use crate::error::ClassifiedError;
use crate::platform::{ChatPlatform, DiscordClient, PlatformError};
use crate::retry::RetryExecutor;

/// Name reported to MCP clients.
pub const SERVER_NAME: &str = "guildrelay";

const INSTRUCTIONS: &str = "Tools for reading and writing a Discord-style chat platform: \
messages (with file attachments), channels, reactions, members and direct messages. \
Ids are numeric strings. Failed calls return a JSON object with a `kind` such as \
rate_limited, permission_denied or not_found; transient failures are already retried.";

/// Errors raised while building the server.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to create platform client: {0}")]
    Platform(#[from] PlatformError),
}

/// The MCP server.
///
/// Cloning is cheap: the platform client and retry policy are shared.
#[derive(Clone)]
pub struct RelayMcpServer {
    context: ToolContext,
    tool_router: ToolRouter<Self>,
}

impl RelayMcpServer {
    pub fn new(context: ToolContext) -> Self {
        Self {
            context,
            tool_router: Self::tool_router(),
        }
    }

    /// Builds a server talking to the configured platform endpoint.
    pub fn from_config(config: &RelayConfig) -> Result<Self, StartupError> {
        let client = DiscordClient::new(
            config.token()?,
            &config.discord.api_base,
            config.discord.request_timeout(),
        )?;
        let attachments = AttachmentPipeline::new(client.http().clone());
        let retry = RetryExecutor::new(config.retry_policy()?);
        let platform: Arc<dyn ChatPlatform> = Arc::new(client);

        Ok(Self::new(ToolContext::new(platform, retry, attachments)))
    }

    pub fn context(&self) -> &ToolContext {
        &self.context
    }

    /// Runs a tool and renders its outcome for the host.
    async fn respond<T, Fut>(&self, tool: &str, call: Fut) -> Result<CallToolResult, McpError>
    where
        T: Serialize,
        Fut: Future<Output = Result<T, ClassifiedError>>,
    {
        match call.await {
            Ok(value) => Ok(success(&value)),
            Err(err) => {
                warn!(tool, kind = %err.kind, error = %err.message, "tool call failed");
                Ok(failure(&err))
            }
        }
    }
}

fn success<T: Serialize>(value: &T) -> CallToolResult {
    match serde_json::to_string_pretty(value) {
        Ok(text) => CallToolResult::success(vec![Content::text(text)]),
        Err(e) => failure(&ClassifiedError::new(
            crate::error::ErrorKind::Unknown,
            format!("failed to render result: {e}"),
        )),
    }
}

fn failure(err: &ClassifiedError) -> CallToolResult {
    let body = serde_json::to_string_pretty(&err.to_json()).unwrap_or_else(|_| err.to_string());
    CallToolResult::error(vec![Content::text(body)])
}

impl std::fmt::Debug for RelayMcpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayMcpServer")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

#[tool_router]
impl RelayMcpServer {
    // === Messages ===

    #[tool(description = "Send a message to a channel. Supports replies and up to 10 attachments given as inline base64 data, an http(s) URL or a local file path.")]
    async fn send_message(
        &self,
        Parameters(req): Parameters<SendMessageRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.respond("send_message", tools::messages::send_message(&self.context, req))
            .await
    }

    #[tool(description = "Read recent messages from a channel, newest first.")]
    async fn read_messages(
        &self,
        Parameters(req): Parameters<ReadMessagesRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.respond("read_messages", tools::messages::read_messages(&self.context, req))
            .await
    }

    #[tool(description = "Replace the text of a message sent by the bot.")]
    async fn edit_message(
        &self,
        Parameters(req): Parameters<EditMessageRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.respond("edit_message", tools::messages::edit_message(&self.context, req))
            .await
    }

    #[tool(description = "Delete a message.")]
    async fn delete_message(
        &self,
        Parameters(req): Parameters<DeleteMessageRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.respond(
            "delete_message",
            tools::messages::delete_message(&self.context, req),
        )
        .await
    }

    #[tool(description = "Send a direct message to a user, opening the DM channel if needed.")]
    async fn send_direct_message(
        &self,
        Parameters(req): Parameters<SendDirectMessageRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.respond(
            "send_direct_message",
            tools::messages::send_direct_message(&self.context, req),
        )
        .await
    }

    // === Channels ===

    #[tool(description = "List the channels of a guild.")]
    async fn list_channels(
        &self,
        Parameters(req): Parameters<ListChannelsRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.respond("list_channels", tools::channels::list_channels(&self.context, req))
            .await
    }

    #[tool(description = "Get details of a single channel.")]
    async fn get_channel(
        &self,
        Parameters(req): Parameters<GetChannelRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.respond("get_channel", tools::channels::get_channel(&self.context, req))
            .await
    }

    #[tool(description = "Create a channel in a guild.")]
    async fn create_channel(
        &self,
        Parameters(req): Parameters<CreateChannelRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.respond(
            "create_channel",
            tools::channels::create_channel(&self.context, req),
        )
        .await
    }

    #[tool(description = "Delete a channel. This cannot be undone.")]
    async fn delete_channel(
        &self,
        Parameters(req): Parameters<DeleteChannelRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.respond(
            "delete_channel",
            tools::channels::delete_channel(&self.context, req),
        )
        .await
    }

    // === Reactions ===

    #[tool(description = "Add a reaction to a message as the bot.")]
    async fn add_reaction(
        &self,
        Parameters(req): Parameters<ReactionRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.respond("add_reaction", tools::reactions::add_reaction(&self.context, req))
            .await
    }

    #[tool(description = "Remove the bot's own reaction from a message.")]
    async fn remove_reaction(
        &self,
        Parameters(req): Parameters<ReactionRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.respond(
            "remove_reaction",
            tools::reactions::remove_reaction(&self.context, req),
        )
        .await
    }

    // === Members ===

    #[tool(description = "List members of a guild, ordered by user id.")]
    async fn list_members(
        &self,
        Parameters(req): Parameters<ListMembersRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.respond("list_members", tools::members::list_members(&self.context, req))
            .await
    }

    #[tool(description = "Get a single guild member.")]
    async fn get_member(
        &self,
        Parameters(req): Parameters<GetMemberRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.respond("get_member", tools::members::get_member(&self.context, req))
            .await
    }
}

#[tool_handler]
impl ServerHandler for RelayMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                title: Some("Guild Relay".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::tools::testing::{context, FakePlatform, CHANNEL, GUILD};
    use crate::platform::ApiFault;

    fn server(platform: FakePlatform) -> RelayMcpServer {
        let (ctx, _) = context(Arc::new(platform));
        RelayMcpServer::new(ctx)
    }

    fn text(result: &CallToolResult) -> String {
        result
            .content
            .iter()
            .filter_map(|c| c.as_text().map(|t| t.text.clone()))
            .collect()
    }

    #[test]
    fn test_server_handler_get_info() {
        let info = server(FakePlatform::default()).get_info();

        assert_eq!(info.server_info.name, "guildrelay");
        assert_eq!(info.server_info.version, env!("CARGO_PKG_VERSION"));
        assert!(info.capabilities.tools.is_some());
        assert!(info.capabilities.resources.is_none());
        assert!(info.instructions.unwrap().contains("rate_limited"));
    }

    #[test]
    fn test_all_tools_registered() {
        let server = server(FakePlatform::default());
        let mut names: Vec<String> = server
            .tool_router
            .list_all()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        names.sort();

        assert_eq!(
            names,
            vec![
                "add_reaction",
                "create_channel",
                "delete_channel",
                "delete_message",
                "edit_message",
                "get_channel",
                "get_member",
                "list_channels",
                "list_members",
                "read_messages",
                "remove_reaction",
                "send_direct_message",
                "send_message",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_renders_json() {
        let server = server(FakePlatform::default());
        let result = server
            .list_channels(Parameters(ListChannelsRequest {
                guild_id: GUILD.to_string(),
            }))
            .await
            .unwrap();

        assert_ne!(result.is_error, Some(true));
        let body: serde_json::Value = serde_json::from_str(&text(&result)).unwrap();
        assert_eq!(body["count"], 1);
        assert_eq!(body["channels"][0]["id"], CHANNEL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_renders_classified_error() {
        let server = server(FakePlatform::failing_with(vec![ApiFault::new(
            404,
            "Unknown Channel",
        )
        .with_code(10003)]));
        let result = server
            .get_channel(Parameters(GetChannelRequest {
                channel_id: CHANNEL.to_string(),
            }))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(true));
        let body: serde_json::Value = serde_json::from_str(&text(&result)).unwrap();
        assert_eq!(body["kind"], "not_found");
        assert_eq!(body["retryable"], false);
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_failure_is_tool_error() {
        let server = server(FakePlatform::default());
        let result = server
            .get_channel(Parameters(GetChannelRequest {
                channel_id: "not-an-id".to_string(),
            }))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(true));
        assert!(text(&result).contains("invalid_parameters"));
    }
}
