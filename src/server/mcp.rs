//! MCP protocol implementation for JSON-RPC 2.0 communication.
//!
//! This module provides the core MCP server implementation including:
//! - JSON-RPC 2.0 request/response handling
//! - Tool definitions and schemas
//! - Stdio-based server communication, with `interview/stream`
//!   notifications for streamed chat turns

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{handle_tool_call, SharedState, ToolOutput};
use crate::error::McpError;
use crate::interview::ChatEvent;

#[cfg(test)]
#[path = "mcp_tests.rs"]
mod mcp_tests;

/// Notification method carrying streamed chat events.
pub const STREAM_METHOD: &str = "interview/stream";

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request identifier (None for notifications).
    pub id: Option<Value>,
    /// The method name to invoke.
    pub method: String,
    /// Optional parameters for the method.
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Request identifier (null if unknown).
    pub id: Value,
    /// The result on success (mutually exclusive with error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure (mutually exclusive with result).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    /// Error code (negative for predefined errors).
    pub code: i32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Server-to-client JSON-RPC notification.
#[derive(Debug, Serialize)]
pub struct JsonRpcNotification {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Notification method.
    pub method: String,
    /// Notification payload.
    pub params: Value,
}

/// MCP server information returned during initialization.
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    /// The server name identifier.
    pub name: String,
    /// The server version string.
    pub version: String,
}

/// MCP server capabilities advertised to clients.
#[derive(Debug, Serialize)]
pub struct Capabilities {
    /// Tool-related capabilities.
    pub tools: ToolCapabilities,
}

/// Tool-specific capabilities.
#[derive(Debug, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change dynamically.
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Result of the MCP initialize handshake.
#[derive(Debug, Serialize)]
pub struct InitializeResult {
    /// The MCP protocol version supported.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Server capabilities.
    pub capabilities: Capabilities,
    /// Server identification information.
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

/// MCP tool definition with JSON Schema.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    /// Unique tool name (used in tool calls).
    pub name: String,
    /// Human-readable description of the tool.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Parameters for a tools/call request.
#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    /// The name of the tool to invoke.
    pub name: String,
    /// Optional arguments for the tool.
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// Content item within a tool result.
#[derive(Debug, Serialize)]
pub struct ToolResultContent {
    /// The content type (e.g., "text").
    #[serde(rename = "type")]
    pub content_type: String,
    /// The text content of the result.
    pub text: String,
}

/// Result of a tool invocation.
#[derive(Debug, Serialize)]
pub struct ToolCallResult {
    /// The result content items.
    pub content: Vec<ToolResultContent>,
    /// Whether the result represents an error.
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolCallResult {
    fn text(text: String, is_error: bool) -> Self {
        Self {
            content: vec![ToolResultContent {
                content_type: "text".to_string(),
                text,
            }],
            is_error: is_error.then_some(true),
        }
    }
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

impl JsonRpcNotification {
    /// One streamed chat event for the request `request_id`.
    pub fn stream_event(request_id: &Option<Value>, event: &ChatEvent) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: STREAM_METHOD.to_string(),
            params: json!({
                "requestId": request_id.clone().unwrap_or(Value::Null),
                "event": event,
            }),
        }
    }
}

/// Tool error body: `{"error": {"kind": ..., "message": ...}}`.
pub fn error_payload(err: &McpError) -> Value {
    json!({
        "error": {
            "kind": err.kind(),
            "message": err.to_string(),
        }
    })
}

fn is_client_error(err: &McpError) -> bool {
    match err {
        McpError::Execution { source } => source.is_client_error(),
        McpError::Json(_) => false,
        _ => true,
    }
}

/// MCP Server running over stdio.
pub struct McpServer {
    /// Shared application state.
    state: SharedState,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Run the server using async stdio
    pub async fn run(&self) -> io::Result<()> {
        info!("Depth interview server starting...");
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Serve newline-delimited JSON-RPC from `reader` until EOF.
    ///
    /// Requests are handled one at a time; a streamed tool call writes its
    /// notifications before its response.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            // EOF reached
            if bytes_read == 0 {
                info!("EOF received, shutting down");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            debug!(request = %trimmed, "Received request");

            let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
                Ok(request) => self.handle_request(request, &mut writer).await?,
                Err(e) => {
                    error!(error = %e, "Failed to parse request");
                    Some(JsonRpcResponse::error(
                        None,
                        -32700,
                        format!("Parse error: {}", e),
                    ))
                }
            };

            // Only send response if not a notification (per JSON-RPC 2.0 spec)
            if let Some(response) = response {
                write_message(&mut writer, &response).await?;
            }
        }

        Ok(())
    }

    /// Handle a single JSON-RPC request.
    /// Returns None for notifications (requests without id).
    async fn handle_request<W>(
        &self,
        request: JsonRpcRequest,
        writer: &mut W,
    ) -> io::Result<Option<JsonRpcResponse>>
    where
        W: AsyncWrite + Unpin,
    {
        let is_notification = request.id.is_none();

        let response = match request.method.as_str() {
            "initialize" => Some(self.handle_initialize(request.id)),
            "initialized" | "notifications/initialized" | "notifications/cancelled" => {
                debug!(method = %request.method, "Received notification");
                None
            }
            "tools/list" => Some(self.handle_tools_list(request.id)),
            "tools/call" => Some(
                self.handle_tool_call(request.id, request.params, writer)
                    .await?,
            ),
            "ping" => Some(JsonRpcResponse::success(
                request.id,
                Value::Object(Default::default()),
            )),
            method => {
                if is_notification {
                    debug!(method = %method, "Unknown notification, ignoring");
                    None
                } else {
                    error!(method = %method, "Unknown method");
                    Some(JsonRpcResponse::error(
                        request.id,
                        -32601,
                        format!("Method not found: {}", method),
                    ))
                }
            }
        };
        Ok(response)
    }

    /// Handle initialize request
    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling initialize request");

        let result = InitializeResult {
            protocol_version: "2024-11-05".to_string(),
            capabilities: Capabilities {
                tools: ToolCapabilities {
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: "depth-interview".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        match serde_json::to_value(result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize initialize result");
                JsonRpcResponse::error(id, -32603, format!("Internal error: {}", e))
            }
        }
    }

    /// Handle tools/list request
    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling tools/list request");
        JsonRpcResponse::success(id, json!({ "tools": tool_definitions() }))
    }

    /// Handle tools/call request
    async fn handle_tool_call<W>(
        &self,
        id: Option<Value>,
        params: Option<Value>,
        writer: &mut W,
    ) -> io::Result<JsonRpcResponse>
    where
        W: AsyncWrite + Unpin,
    {
        let params: ToolCallParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(p) => p,
                Err(e) => {
                    return Ok(JsonRpcResponse::error(
                        id,
                        -32602,
                        format!("Invalid params: {}", e),
                    ));
                }
            },
            None => {
                return Ok(JsonRpcResponse::error(id, -32602, "Missing params"));
            }
        };

        info!(tool = %params.name, "Handling tool call");

        let tool_result = match handle_tool_call(&self.state, &params.name, params.arguments).await
        {
            Ok(ToolOutput::Json(result)) => match serde_json::to_string_pretty(&result) {
                Ok(text) => ToolCallResult::text(text, false),
                Err(e) => {
                    error!(error = %e, "Failed to serialize tool result");
                    ToolCallResult::text(error_payload(&McpError::Json(e)).to_string(), true)
                }
            },
            Ok(ToolOutput::Stream(events)) => {
                let terminal = forward_stream(&id, events, writer).await?;
                let is_error = matches!(terminal, ChatEvent::Error { .. });
                ToolCallResult::text(serde_json::to_string_pretty(&terminal)?, is_error)
            }
            Err(e) => {
                if is_client_error(&e) {
                    warn!(tool = %params.name, error = %e, "Tool call rejected");
                } else {
                    error!(tool = %params.name, error = %e, "Tool call failed");
                }
                ToolCallResult::text(error_payload(&e).to_string(), true)
            }
        };

        Ok(match serde_json::to_value(tool_result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize tool call result");
                JsonRpcResponse::error(id, -32603, format!("Internal error: {}", e))
            }
        })
    }
}

/// Write every event as a notification and return the terminal one.
async fn forward_stream<W>(
    id: &Option<Value>,
    mut events: mpsc::Receiver<ChatEvent>,
    writer: &mut W,
) -> io::Result<ChatEvent>
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = events.recv().await {
        write_message(writer, &JsonRpcNotification::stream_event(id, &event)).await?;
        if event.is_terminal() {
            return Ok(event);
        }
    }
    Ok(ChatEvent::Error {
        error: "Stream closed unexpectedly".to_string(),
    })
}

async fn write_message<W, T>(writer: &mut W, message: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let json = serde_json::to_string(message)?;
    debug!(message = %json, "Sending message");
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

// ============================================================================
// Tool definitions
// ============================================================================

fn tool(name: &str, description: &str, properties: Value, required: &[&str]) -> Tool {
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false
        }),
    }
}

fn user_id() -> Value {
    json!({
        "type": "string",
        "description": "Identity of the calling owner"
    })
}

fn session_id() -> Value {
    json!({
        "type": "string",
        "description": "Interview session ID"
    })
}

fn campaign_id() -> Value {
    json!({
        "type": "string",
        "description": "Campaign ID"
    })
}

fn share_token() -> Value {
    json!({
        "type": "string",
        "description": "Share token of a shared or campaign respondent session"
    })
}

fn message() -> Value {
    json!({
        "type": "string",
        "maxLength": 4000,
        "description": "The user's answer"
    })
}

fn owner_session_tool(name: &str, description: &str) -> Tool {
    tool(
        name,
        description,
        json!({ "user_id": user_id(), "session_id": session_id() }),
        &["session_id"],
    )
}

fn campaign_tool(name: &str, description: &str) -> Tool {
    tool(
        name,
        description,
        json!({ "user_id": user_id(), "campaign_id": campaign_id() }),
        &["campaign_id"],
    )
}

fn token_tool(name: &str, description: &str) -> Tool {
    tool(name, description, json!({ "token": share_token() }), &["token"])
}

/// Every tool exposed over MCP, in listing order.
pub fn tool_definitions() -> Vec<Tool> {
    vec![
        // Owner session tools
        tool(
            "interview_create_session",
            "Create a self-interview session on a theme.",
            json!({
                "user_id": user_id(),
                "theme": {
                    "type": "string",
                    "maxLength": 500,
                    "description": "What the interview is about"
                },
                "is_public": {
                    "type": "boolean",
                    "description": "Whether anyone may read the session and its results"
                }
            }),
            &["theme"],
        ),
        tool(
            "interview_list_sessions",
            "List the caller's sessions, newest first.",
            json!({ "user_id": user_id() }),
            &[],
        ),
        owner_session_tool("interview_get_session", "Get one session."),
        owner_session_tool(
            "interview_get_transcript",
            "Get the full transcript of a session in order.",
        ),
        tool(
            "interview_set_visibility",
            "Make a session public or private.",
            json!({
                "user_id": user_id(),
                "session_id": session_id(),
                "is_public": { "type": "boolean" }
            }),
            &["session_id", "is_public"],
        ),
        owner_session_tool(
            "interview_delete_session",
            "Delete a session with its transcript and results.",
        ),
        owner_session_tool(
            "interview_start",
            "Produce the interviewer's opening question. Returns the existing one if the interview already started.",
        ),
        tool(
            "interview_chat",
            "Answer the interviewer and get the next question with quick-reply choices.",
            json!({
                "user_id": user_id(),
                "session_id": session_id(),
                "message": message()
            }),
            &["session_id", "message"],
        ),
        tool(
            "interview_chat_stream",
            "Streamed interview_chat. Emits interview/stream notifications (meta, delta, done or error) before the final result.",
            json!({
                "user_id": user_id(),
                "session_id": session_id(),
                "message": message()
            }),
            &["session_id", "message"],
        ),
        tool(
            "interview_run_stage",
            "Run one analysis stage over the session and store its result.",
            json!({
                "user_id": user_id(),
                "session_id": session_id(),
                "stage": {
                    "type": "string",
                    "enum": ["facts", "hypotheses", "prd", "spec", "readiness"],
                    "description": "Pipeline stage to run"
                }
            }),
            &["session_id", "stage"],
        ),
        owner_session_tool(
            "interview_get_results",
            "Get every stored analysis result of a session.",
        ),
        owner_session_tool(
            "interview_create_share_link",
            "Create a respondent session on the same theme and return its share token.",
        ),
        // Campaign tools
        owner_session_tool(
            "campaign_create",
            "Create a campaign from an owned session, or return the existing one.",
        ),
        tool(
            "campaign_join",
            "Join a campaign as a respondent and get a personal session token.",
            json!({
                "campaign_token": {
                    "type": "string",
                    "description": "Share token of the campaign"
                },
                "name": {
                    "type": "string",
                    "maxLength": 100,
                    "description": "Optional respondent display name"
                }
            }),
            &["campaign_token"],
        ),
        campaign_tool(
            "campaign_aggregate",
            "Aggregate facts across completed respondent sessions.",
        ),
        campaign_tool(
            "campaign_analyze",
            "Run the cross-respondent analysis and store it on the owner session.",
        ),
        campaign_tool(
            "campaign_export",
            "Export the campaign with its aggregate, cross-analysis and respondents.",
        ),
        campaign_tool(
            "campaign_respondents",
            "List respondent sessions of a campaign.",
        ),
        // Token-holder tools
        token_tool("respondent_session", "Get the respondent's session and transcript."),
        token_tool("respondent_start", "Start or resume the respondent interview."),
        tool(
            "respondent_chat",
            "Answer the interviewer as a respondent.",
            json!({ "token": share_token(), "message": message() }),
            &["token", "message"],
        ),
        tool(
            "respondent_chat_stream",
            "Streamed respondent_chat. Emits interview/stream notifications before the final result.",
            json!({ "token": share_token(), "message": message() }),
            &["token", "message"],
        ),
        token_tool(
            "respondent_complete",
            "Finish the interview: extract facts if needed and close the session.",
        ),
        tool(
            "respondent_feedback",
            "Leave free-text feedback and close the session.",
            json!({
                "token": share_token(),
                "feedback": {
                    "type": "string",
                    "maxLength": 2000
                }
            }),
            &["token", "feedback"],
        ),
    ]
}
