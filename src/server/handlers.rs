use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::info;

use super::SharedState;
use crate::error::{AppError, AppResult, McpError, McpResult};
use crate::interview::ChatEvent;
use crate::ratelimit::EndpointClass;
use crate::storage::Stage;

/// Caller key used when a call carries neither identity nor token.
const ANONYMOUS_CALLER: &str = "anonymous";

/// What a tool call produced.
pub enum ToolOutput {
    /// A complete JSON result.
    Json(Value),
    /// Incremental chat events; the last one is terminal.
    Stream(mpsc::Receiver<ChatEvent>),
}

impl std::fmt::Debug for ToolOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolOutput::Json(value) => f.debug_tuple("Json").field(value).finish(),
            ToolOutput::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Rate-limit class of a tool.
pub fn endpoint_class(tool_name: &str) -> EndpointClass {
    match tool_name {
        "interview_start" | "interview_chat" | "interview_chat_stream" | "respondent_start"
        | "respondent_chat" | "respondent_chat_stream" => EndpointClass::Chat,
        "interview_run_stage" | "campaign_analyze" | "respondent_complete" => {
            EndpointClass::Analysis
        }
        _ => EndpointClass::Default,
    }
}

/// Rate-limit key of a call.
///
/// Server-minted tokens come first so a respondent cannot shed its ceiling by
/// adding a fresh `user_id`. Owner calls fall back to `user_id`, which the
/// host asserts after authenticating the caller; this server does not verify
/// it, so the ceiling is only as strong as the host's identity.
pub fn caller_key(arguments: Option<&Value>) -> String {
    ["token", "campaign_token", "user_id"]
        .iter()
        .find_map(|key| {
            arguments
                .and_then(|args| args.get(*key))
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(|s| format!("{}:{}", key, s))
        })
        .unwrap_or_else(|| ANONYMOUS_CALLER.to_string())
}

/// Route tool calls to appropriate handlers
pub async fn handle_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<ToolOutput> {
    info!(tool = %tool_name, "Routing tool call");

    if !is_known_tool(tool_name) {
        return Err(McpError::UnknownTool {
            tool_name: tool_name.to_string(),
        });
    }
    state
        .rate_limiter
        .check(&caller_key(arguments.as_ref()), endpoint_class(tool_name))
        .await?;

    let value = match tool_name {
        // Owner session operations
        "interview_create_session" => handle_create_session(state, arguments).await,
        "interview_list_sessions" => handle_list_sessions(state, arguments).await,
        "interview_get_session" => handle_get_session(state, arguments).await,
        "interview_get_transcript" => handle_get_transcript(state, arguments).await,
        "interview_set_visibility" => handle_set_visibility(state, arguments).await,
        "interview_delete_session" => handle_delete_session(state, arguments).await,
        "interview_start" => handle_start(state, arguments).await,
        "interview_chat" => handle_chat(state, arguments).await,
        "interview_chat_stream" => return handle_chat_stream(state, arguments).await,
        "interview_run_stage" => handle_run_stage(state, arguments).await,
        "interview_get_results" => handle_get_results(state, arguments).await,
        "interview_create_share_link" => handle_create_share_link(state, arguments).await,
        // Campaign operations
        "campaign_create" => handle_campaign_create(state, arguments).await,
        "campaign_join" => handle_campaign_join(state, arguments).await,
        "campaign_aggregate" => handle_campaign_aggregate(state, arguments).await,
        "campaign_analyze" => handle_campaign_analyze(state, arguments).await,
        "campaign_export" => handle_campaign_export(state, arguments).await,
        "campaign_respondents" => handle_campaign_respondents(state, arguments).await,
        // Token-holder operations
        "respondent_session" => handle_respondent_session(state, arguments).await,
        "respondent_start" => handle_respondent_start(state, arguments).await,
        "respondent_chat" => handle_respondent_chat(state, arguments).await,
        "respondent_chat_stream" => return handle_respondent_chat_stream(state, arguments).await,
        "respondent_complete" => handle_respondent_complete(state, arguments).await,
        "respondent_feedback" => handle_respondent_feedback(state, arguments).await,
        _ => Err(McpError::UnknownTool {
            tool_name: tool_name.to_string(),
        }),
    }?;

    Ok(ToolOutput::Json(value))
}

/// Names of every routed tool, in listing order.
pub const TOOL_NAMES: &[&str] = &[
    "interview_create_session",
    "interview_list_sessions",
    "interview_get_session",
    "interview_get_transcript",
    "interview_set_visibility",
    "interview_delete_session",
    "interview_start",
    "interview_chat",
    "interview_chat_stream",
    "interview_run_stage",
    "interview_get_results",
    "interview_create_share_link",
    "campaign_create",
    "campaign_join",
    "campaign_aggregate",
    "campaign_analyze",
    "campaign_export",
    "campaign_respondents",
    "respondent_session",
    "respondent_start",
    "respondent_chat",
    "respondent_chat_stream",
    "respondent_complete",
    "respondent_feedback",
];

fn is_known_tool(tool_name: &str) -> bool {
    TOOL_NAMES.contains(&tool_name)
}

// ============================================================================
// Parameter types
// ============================================================================

#[derive(Debug, Deserialize)]
struct OwnerParams {
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionParams {
    #[serde(default)]
    user_id: Option<String>,
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateSessionParams {
    #[serde(default)]
    user_id: Option<String>,
    theme: String,
    #[serde(default)]
    is_public: bool,
}

#[derive(Debug, Deserialize)]
struct VisibilityParams {
    #[serde(default)]
    user_id: Option<String>,
    session_id: String,
    is_public: bool,
}

#[derive(Debug, Deserialize)]
struct ChatParams {
    #[serde(default)]
    user_id: Option<String>,
    session_id: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct StageParams {
    #[serde(default)]
    user_id: Option<String>,
    session_id: String,
    stage: Stage,
}

#[derive(Debug, Deserialize)]
struct CampaignParams {
    #[serde(default)]
    user_id: Option<String>,
    campaign_id: String,
}

#[derive(Debug, Deserialize)]
struct JoinParams {
    campaign_token: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenParams {
    token: String,
}

#[derive(Debug, Deserialize)]
struct TokenChatParams {
    token: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct FeedbackParams {
    token: String,
    feedback: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Deleted {
    deleted: bool,
    session_id: String,
}

// ============================================================================
// Owner session handlers
// ============================================================================

async fn handle_create_session(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "interview_create_session",
        arguments,
        |p: CreateSessionParams| async move {
            state
                .interviews
                .create_session(p.user_id.as_deref(), &p.theme, p.is_public)
                .await
        },
    )
    .await
}

async fn handle_list_sessions(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    // Listing takes no required arguments; an absent object means no identity.
    let arguments = arguments.or_else(|| Some(Value::Object(Default::default())));
    execute_handler(
        "interview_list_sessions",
        arguments,
        |p: OwnerParams| async move { state.interviews.list_sessions(p.user_id.as_deref()).await },
    )
    .await
}

async fn handle_get_session(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "interview_get_session",
        arguments,
        |p: SessionParams| async move {
            state
                .interviews
                .get_session(p.user_id.as_deref(), &p.session_id)
                .await
        },
    )
    .await
}

async fn handle_get_transcript(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "interview_get_transcript",
        arguments,
        |p: SessionParams| async move {
            state
                .interviews
                .get_transcript(p.user_id.as_deref(), &p.session_id)
                .await
        },
    )
    .await
}

async fn handle_set_visibility(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "interview_set_visibility",
        arguments,
        |p: VisibilityParams| async move {
            state
                .interviews
                .set_visibility(p.user_id.as_deref(), &p.session_id, p.is_public)
                .await
        },
    )
    .await
}

async fn handle_delete_session(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "interview_delete_session",
        arguments,
        |p: SessionParams| async move {
            state
                .interviews
                .delete_session(p.user_id.as_deref(), &p.session_id)
                .await?;
            Ok::<_, AppError>(Deleted {
                deleted: true,
                session_id: p.session_id,
            })
        },
    )
    .await
}

async fn handle_start(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("interview_start", arguments, |p: SessionParams| async move {
        state
            .interviews
            .start_interview(p.user_id.as_deref(), &p.session_id)
            .await
    })
    .await
}

async fn handle_chat(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("interview_chat", arguments, |p: ChatParams| async move {
        state
            .interviews
            .chat(p.user_id.as_deref(), &p.session_id, &p.message)
            .await
    })
    .await
}

async fn handle_chat_stream(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<ToolOutput> {
    let p: ChatParams = parse_arguments("interview_chat_stream", arguments)?;
    let events = state
        .interviews
        .chat_stream(p.user_id.as_deref(), &p.session_id, &p.message)
        .await?;
    Ok(ToolOutput::Stream(events))
}

async fn handle_run_stage(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("interview_run_stage", arguments, |p: StageParams| async move {
        state
            .interviews
            .run_stage(p.user_id.as_deref(), &p.session_id, p.stage)
            .await
    })
    .await
}

async fn handle_get_results(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "interview_get_results",
        arguments,
        |p: SessionParams| async move {
            state
                .interviews
                .get_results(p.user_id.as_deref(), &p.session_id)
                .await
        },
    )
    .await
}

async fn handle_create_share_link(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler(
        "interview_create_share_link",
        arguments,
        |p: SessionParams| async move {
            state
                .interviews
                .create_share_link(p.user_id.as_deref(), &p.session_id)
                .await
        },
    )
    .await
}

// ============================================================================
// Campaign handlers
// ============================================================================

async fn handle_campaign_create(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("campaign_create", arguments, |p: SessionParams| async move {
        state
            .campaigns
            .create_campaign(p.user_id.as_deref(), &p.session_id)
            .await
    })
    .await
}

async fn handle_campaign_join(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("campaign_join", arguments, |p: JoinParams| async move {
        state
            .campaigns
            .join_campaign(&p.campaign_token, p.name.as_deref())
            .await
    })
    .await
}

async fn handle_campaign_aggregate(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler(
        "campaign_aggregate",
        arguments,
        |p: CampaignParams| async move {
            state
                .campaigns
                .campaign_aggregate(p.user_id.as_deref(), &p.campaign_id)
                .await
        },
    )
    .await
}

async fn handle_campaign_analyze(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("campaign_analyze", arguments, |p: CampaignParams| async move {
        state
            .campaigns
            .campaign_analyze(p.user_id.as_deref(), &p.campaign_id)
            .await
    })
    .await
}

async fn handle_campaign_export(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("campaign_export", arguments, |p: CampaignParams| async move {
        state
            .campaigns
            .campaign_export(p.user_id.as_deref(), &p.campaign_id)
            .await
    })
    .await
}

async fn handle_campaign_respondents(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler(
        "campaign_respondents",
        arguments,
        |p: CampaignParams| async move {
            state
                .campaigns
                .campaign_respondents(p.user_id.as_deref(), &p.campaign_id)
                .await
        },
    )
    .await
}

// ============================================================================
// Token-holder handlers
// ============================================================================

async fn handle_respondent_session(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler("respondent_session", arguments, |p: TokenParams| async move {
        state.respondents.session(&p.token).await
    })
    .await
}

async fn handle_respondent_start(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("respondent_start", arguments, |p: TokenParams| async move {
        state.respondents.start(&p.token).await
    })
    .await
}

async fn handle_respondent_chat(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("respondent_chat", arguments, |p: TokenChatParams| async move {
        state.respondents.chat(&p.token, &p.message).await
    })
    .await
}

async fn handle_respondent_chat_stream(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<ToolOutput> {
    let p: TokenChatParams = parse_arguments("respondent_chat_stream", arguments)?;
    let events = state.respondents.chat_stream(&p.token, &p.message).await?;
    Ok(ToolOutput::Stream(events))
}

async fn handle_respondent_complete(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler("respondent_complete", arguments, |p: TokenParams| async move {
        state.respondents.complete(&p.token).await
    })
    .await
}

async fn handle_respondent_feedback(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler(
        "respondent_feedback",
        arguments,
        |p: FeedbackParams| async move { state.respondents.feedback(&p.token, &p.feedback).await },
    )
    .await
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<T> {
    match arguments {
        Some(args) => serde_json::from_value(args).map_err(|e| McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: e.to_string(),
        }),
        None => Err(McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: "Missing arguments".to_string(),
        }),
    }
}

/// Parse typed arguments, run the operation, serialize its result.
async fn execute_handler<P, R, F, Fut>(
    tool_name: &str,
    arguments: Option<Value>,
    operation: F,
) -> McpResult<Value>
where
    P: serde::de::DeserializeOwned,
    R: Serialize,
    F: FnOnce(P) -> Fut,
    Fut: std::future::Future<Output = AppResult<R>>,
{
    let params: P = parse_arguments(tool_name, arguments)?;
    let result = operation(params).await?;
    serde_json::to_value(result).map_err(McpError::Json)
}
