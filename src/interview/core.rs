//! Core infrastructure shared by the interview, analysis and campaign services.
//!
//! [`EngineCore`] bundles the store, the gateway client and the interview
//! settings, and resolves the caller's access to a session.

use tracing::debug;

use crate::config::InterviewConfig;
use crate::error::{AppError, AppResult};
use crate::gateway::GatewayClient;
use crate::storage::{Session, SqliteStorage, Storage};

/// How a caller reached a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Owner-only operation.
    Write,
    /// Owner, or anyone when the session is public.
    Read,
}

/// Dependencies composed into every service.
#[derive(Clone)]
pub struct EngineCore {
    storage: SqliteStorage,
    gateway: GatewayClient,
    settings: InterviewConfig,
}

impl EngineCore {
    pub fn new(storage: SqliteStorage, gateway: GatewayClient, settings: InterviewConfig) -> Self {
        Self {
            storage,
            gateway,
            settings,
        }
    }

    #[inline]
    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    #[inline]
    pub fn gateway(&self) -> &GatewayClient {
        &self.gateway
    }

    #[inline]
    pub fn settings(&self) -> &InterviewConfig {
        &self.settings
    }

    /// Load a session or fail with `NotFound`.
    pub async fn load_session(&self, session_id: &str) -> AppResult<Session> {
        self.storage
            .get_session(session_id)
            .await?
            .ok_or_else(|| AppError::session_not_found(session_id))
    }

    /// Resolve identity, then the session, then the caller's right to it.
    pub async fn authorize(
        &self,
        user_id: Option<&str>,
        session_id: &str,
        access: Access,
    ) -> AppResult<Session> {
        let user_id = caller_identity(user_id)?;
        let session = self.load_session(session_id).await?;

        let allowed = session.is_owned_by(user_id)
            || (access == Access::Read && session.is_public);
        if !allowed {
            debug!(session_id = %session_id, "Caller does not own session");
            return Err(AppError::Forbidden {
                message: format!("Not allowed to access session {}", session_id),
            });
        }
        Ok(session)
    }

    /// Resolve a session from its share token. Token possession is the
    /// authorization.
    pub async fn session_by_token(&self, token: &str) -> AppResult<Session> {
        self.storage
            .get_session_by_token(token)
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource: "Share token",
                id: token.to_string(),
            })
    }
}

/// The caller's user id, or `Unauthenticated` when absent or blank.
pub fn caller_identity(user_id: Option<&str>) -> AppResult<&str> {
    user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(AppError::Unauthenticated)
}
