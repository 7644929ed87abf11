use serde::{Deserialize, Serialize};

use crate::storage::{Role, Turn};

/// Message in a model conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

/// Message role. System instructions travel separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl Message {
    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

impl From<&Turn> for Message {
    fn from(turn: &Turn) -> Self {
        match turn.role {
            Role::User => Message::user(turn.content.clone()),
            Role::Assistant => Message::assistant(turn.content.clone()),
        }
    }
}

/// What the engine asks the gateway to generate.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Stage-specific instruction.
    pub system: String,
    /// Ordered turn history.
    pub messages: Vec<Message>,
    /// Output token budget.
    pub max_tokens: u32,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, messages: Vec<Message>, max_tokens: u32) -> Self {
        Self {
            system: system.into(),
            messages,
            max_tokens,
        }
    }

    /// Wire body for the messages endpoint.
    pub(crate) fn to_wire(&self, model: &str, stream: bool) -> MessagesRequest {
        MessagesRequest {
            model: model.to_string(),
            system: self.system.clone(),
            messages: self.messages.clone(),
            max_tokens: self.max_tokens,
            stream,
        }
    }
}

/// Request body of `POST /v1/messages`
#[derive(Debug, Clone, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub stream: bool,
}

/// Atomic response of `POST /v1/messages`
#[derive(Debug, Clone, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// One block of model output
#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// Token usage information
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: Option<u32>,
    #[serde(default)]
    pub output_tokens: Option<u32>,
}

impl MessagesResponse {
    /// Concatenated text of all text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Result of an atomic generation.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub stop_reason: Option<String>,
    pub usage: Option<Usage>,
}

/// One item of an incremental generation.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Next piece of generated text.
    Delta(String),
    /// Terminal success; nothing follows.
    Done,
}

/// Server-sent event payloads of a streamed generation
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart,
    ContentBlockStart,
    ContentBlockDelta { delta: Delta },
    ContentBlockStop,
    MessageDelta,
    MessageStop,
    Ping,
    Error { error: ApiErrorBody },
    #[serde(other)]
    Unknown,
}

/// Incremental content of a block
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

/// Error object carried by an `error` event
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// OAuth refresh-token grant response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}
