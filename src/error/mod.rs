use serde::Serialize;
use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Precondition failed: {message}")]
    PreconditionFailed { message: String },

    #[error("Resource exhausted: {message}")]
    ResourceExhausted { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Discriminant of the error taxonomy exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthenticated,
    Forbidden,
    NotFound,
    ValidationFailed,
    PreconditionFailed,
    ResourceExhausted,
    UpstreamTransport,
    Internal,
}

impl AppError {
    /// Build a not-found error for a session id.
    pub fn session_not_found(id: impl Into<String>) -> Self {
        AppError::NotFound {
            resource: "Session",
            id: id.into(),
        }
    }

    /// Build a not-found error for a campaign id or token.
    pub fn campaign_not_found(id: impl Into<String>) -> Self {
        AppError::NotFound {
            resource: "Campaign",
            id: id.into(),
        }
    }

    /// Build a precondition failure.
    pub fn precondition(message: impl Into<String>) -> Self {
        AppError::PreconditionFailed {
            message: message.into(),
        }
    }

    /// Classify this error within the caller-facing taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Unauthenticated => ErrorKind::Unauthenticated,
            AppError::Forbidden { .. } => ErrorKind::Forbidden,
            AppError::NotFound { .. } => ErrorKind::NotFound,
            AppError::ValidationFailed { .. } => ErrorKind::ValidationFailed,
            AppError::PreconditionFailed { .. } => ErrorKind::PreconditionFailed,
            AppError::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            AppError::Gateway(_) => ErrorKind::UpstreamTransport,
            AppError::Config { .. } | AppError::Storage(_) | AppError::Internal { .. } => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether the failure is attributable to the caller (4xx-equivalent).
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::UpstreamTransport | ErrorKind::Internal
        )
    }
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Language-model gateway errors
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Gateway unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Authentication failed: {message}")]
    AuthExpired { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl GatewayError {
    /// Transport-level failures worth another attempt. Malformed payloads and
    /// client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Timeout { .. } | GatewayError::Http(_) => true,
            GatewayError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// MCP protocol errors
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    #[error("Invalid parameters for {tool_name}: {message}")]
    InvalidParameters { tool_name: String, message: String },

    #[error("{source}")]
    Execution {
        #[source]
        source: AppError,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<AppError> for McpError {
    fn from(err: AppError) -> Self {
        McpError::Execution { source: err }
    }
}

impl McpError {
    /// Taxonomy kind reported in tool error payloads.
    pub fn kind(&self) -> ErrorKind {
        match self {
            McpError::Execution { source } => source.kind(),
            McpError::Json(_) => ErrorKind::Internal,
            _ => ErrorKind::ValidationFailed,
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;
