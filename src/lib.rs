//! # Depth Interview
//!
//! An interview pipeline engine: an AI interviewer runs a short depth
//! interview with a session owner or an invited respondent, and the
//! transcript is refined through a fixed chain of analysis stages.
//!
//! ## Pipeline
//!
//! ```text
//! transcript → facts → hypotheses → PRD → spec → readiness checklist
//!
//! campaign respondents ─┬→ aggregate (counts, pain points, keywords)
//!                       └→ cross-analysis (model) → export
//! ```
//!
//! ## Architecture
//!
//! ```text
//! MCP Client → MCP Server (stdio) → services → Gateway (HTTP, SSE)
//!                                      ↓
//!                                SQLite (State)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use depth_interview::{AppState, Config, McpServer};
//! use depth_interview::cache::{ExpiringStore, InMemoryStore};
//! use depth_interview::gateway::GatewayClient;
//! use depth_interview::storage::SqliteStorage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let store: Arc<dyn ExpiringStore> = Arc::new(InMemoryStore::default());
//!     let storage = SqliteStorage::new(&config.database).await?;
//!     let gateway = GatewayClient::new(&config.gateway, config.request.clone(), store.clone())?;
//!     let state = Arc::new(AppState::new(config, storage, gateway, store));
//!     McpServer::new(state).run().await?;
//!     Ok(())
//! }
//! ```

/// Analysis stages: payload types, output parsing and the stage runner.
pub mod analysis;
/// Expiring key/value store for counters and credentials.
pub mod cache;
/// Campaigns: respondent fan-out, aggregation, cross-analysis and export.
pub mod campaign;
/// Configuration loaded from the environment.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Language-model gateway client with atomic and streamed delivery.
pub mod gateway;
/// Sessions, conversation turns and the session state machine.
pub mod interview;
/// Interviewer and stage prompts.
pub mod prompts;
/// Per-caller request ceilings.
pub mod ratelimit;
/// MCP server implementation and request handling.
pub mod server;
/// SQLite storage layer for persistence.
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use server::{AppState, McpServer, SharedState};
