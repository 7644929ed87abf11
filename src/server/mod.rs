//! Server module for MCP protocol handling.
//!
//! This module provides:
//! - MCP server implementation over stdio
//! - Tool call handlers, routing and per-caller rate limiting
//! - Shared application state management

mod handlers;
mod mcp;

pub use handlers::*;
pub use mcp::*;

use std::sync::Arc;

use crate::cache::ExpiringStore;
use crate::campaign::CampaignService;
use crate::config::Config;
use crate::gateway::GatewayClient;
use crate::interview::{EngineCore, InterviewService, RespondentService};
use crate::ratelimit::RateLimiter;
use crate::storage::SqliteStorage;

/// Application state shared across handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// SQLite storage backend.
    pub storage: SqliteStorage,
    /// Language-model gateway.
    pub gateway: GatewayClient,
    /// Owner-side session operations.
    pub interviews: InterviewService,
    /// Token-holder operations.
    pub respondents: RespondentService,
    /// Campaign lifecycle and aggregation.
    pub campaigns: CampaignService,
    /// Per-caller request ceilings.
    pub rate_limiter: RateLimiter,
}

impl AppState {
    /// Create new application state.
    ///
    /// `store` backs the rate limiter; pass the same store the gateway was
    /// built with so all expiring state lives in one place.
    pub fn new(
        config: Config,
        storage: SqliteStorage,
        gateway: GatewayClient,
        store: Arc<dyn ExpiringStore>,
    ) -> Self {
        tracing::info!(
            model = %gateway.model(),
            session_quota = config.interview.session_quota,
            locale = %config.interview.default_locale,
            "AppState initializing"
        );

        let core = EngineCore::new(storage.clone(), gateway.clone(), config.interview.clone());
        let rate_limiter = RateLimiter::new(store, config.rate_limit.clone());

        Self {
            interviews: InterviewService::new(core.clone()),
            respondents: RespondentService::new(core.clone()),
            campaigns: CampaignService::new(core),
            rate_limiter,
            config,
            storage,
            gateway,
        }
    }
}

/// Shared application state handle.
pub type SharedState = Arc<AppState>;
