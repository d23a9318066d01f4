use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{ToolContext, ToolResult};
use crate::platform::{check_snowflake, clamp_limit, MemberSummary, MEMBER_LIMIT_RANGE};

pub const DEFAULT_MEMBER_LIMIT: u16 = 100;

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListMembersRequest {
    pub guild_id: String,
    #[schemars(description = "Number of members to return, 1-1000 (default 100)")]
    #[serde(default)]
    pub limit: Option<u32>,
    #[schemars(description = "Only return members whose user ID is greater than this")]
    #[serde(default)]
    pub after: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetMemberRequest {
    pub guild_id: String,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMembersResponse {
    pub guild_id: String,
    pub count: usize,
    pub members: Vec<MemberSummary>,
}

pub async fn list_members(
    ctx: &ToolContext,
    req: ListMembersRequest,
) -> ToolResult<ListMembersResponse> {
    check_snowflake("guildId", &req.guild_id)?;
    if let Some(after) = &req.after {
        check_snowflake("after", after)?;
    }
    let limit = clamp_limit(req.limit, DEFAULT_MEMBER_LIMIT, MEMBER_LIMIT_RANGE);

    let members = ctx
        .retry
        .execute("list_members", || {
            ctx.platform
                .list_members(&req.guild_id, limit, req.after.as_deref())
        })
        .await?;

    Ok(ListMembersResponse {
        guild_id: req.guild_id,
        count: members.len(),
        members,
    })
}

pub async fn get_member(ctx: &ToolContext, req: GetMemberRequest) -> ToolResult<MemberSummary> {
    check_snowflake("guildId", &req.guild_id)?;
    check_snowflake("userId", &req.user_id)?;

    ctx.retry
        .execute("get_member", || {
            ctx.platform.get_member(&req.guild_id, &req.user_id)
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::mcp::tools::testing::{context, FakePlatform, GUILD, USER};
    use crate::platform::ApiFault;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_list_members_default_limit() {
        let platform = Arc::new(FakePlatform::default());
        let (ctx, _) = context(platform.clone());

        let response = list_members(
            &ctx,
            ListMembersRequest {
                guild_id: GUILD.to_string(),
                limit: None,
                after: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(response.count, 1);
        assert_eq!(platform.calls(), vec!["list_members:100"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_members_rejects_bad_cursor() {
        let platform = Arc::new(FakePlatform::default());
        let (ctx, _) = context(platform.clone());

        let err = list_members(
            &ctx,
            ListMembersRequest {
                guild_id: GUILD.to_string(),
                limit: Some(10),
                after: Some("alice".to_string()),
            },
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind, ErrorKind::InvalidParameters);
        assert!(platform.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_member_unauthorized() {
        let platform = Arc::new(FakePlatform::failing_with(vec![ApiFault::new(
            401,
            "401: Unauthorized",
        )]));
        let (ctx, sink) = context(platform);

        let err = get_member(
            &ctx,
            GetMemberRequest {
                guild_id: GUILD.to_string(),
                user_id: USER.to_string(),
            },
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind, ErrorKind::AuthenticationError);
        assert_eq!(sink.attempts(), 1);
    }
}
