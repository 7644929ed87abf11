//! Owner-side session operations.
//!
//! Every operation resolves the caller first: no identity is
//! `Unauthenticated`, a missing session `NotFound`, someone else's session
//! `Forbidden` (reads are also open when the session is public).

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

use super::conversation::{Audience, ChatReply, Conversation, StartReply};
use super::core::{caller_identity, Access, EngineCore};
use super::stream::ChatEvent;
use super::validation::{Validator, MESSAGE_MAX_CHARS, THEME_MAX_CHARS};
use crate::analysis::{StagePayload, StageRunner};
use crate::error::{AppError, AppResult};
use crate::storage::{AnalysisRecord, Session, Stage, Storage, Turn};

/// Share link handed to a respondent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareLink {
    pub session_id: String,
    pub share_token: String,
    pub theme: String,
}

#[derive(Clone)]
pub struct InterviewService {
    core: EngineCore,
    conversation: Conversation,
    runner: StageRunner,
}

impl InterviewService {
    pub fn new(core: EngineCore) -> Self {
        Self {
            conversation: Conversation::new(core.clone()),
            runner: StageRunner::new(core.clone()),
            core,
        }
    }

    /// Create a self-interview for the caller.
    pub async fn create_session(
        &self,
        user_id: Option<&str>,
        theme: &str,
        is_public: bool,
    ) -> AppResult<Session> {
        let user_id = caller_identity(user_id)?;
        Validator::new()
            .text("theme", theme, THEME_MAX_CHARS)
            .finish()?;
        self.ensure_quota(user_id).await?;

        let session = Session::new(theme.trim(), user_id).with_public(is_public);
        self.core.storage().create_session(&session).await?;
        info!(session_id = %session.id, "Session created");
        Ok(session)
    }

    pub async fn list_sessions(&self, user_id: Option<&str>) -> AppResult<Vec<Session>> {
        let user_id = caller_identity(user_id)?;
        Ok(self.core.storage().list_sessions_by_owner(user_id).await?)
    }

    pub async fn get_session(&self, user_id: Option<&str>, session_id: &str) -> AppResult<Session> {
        self.core.authorize(user_id, session_id, Access::Read).await
    }

    pub async fn get_transcript(
        &self,
        user_id: Option<&str>,
        session_id: &str,
    ) -> AppResult<Vec<Turn>> {
        let session = self.core.authorize(user_id, session_id, Access::Read).await?;
        Ok(self.core.storage().get_turns(&session.id).await?)
    }

    pub async fn set_visibility(
        &self,
        user_id: Option<&str>,
        session_id: &str,
        is_public: bool,
    ) -> AppResult<Session> {
        let session = self.core.authorize(user_id, session_id, Access::Write).await?;
        self.core.storage().set_visibility(&session.id, is_public).await?;
        self.core.load_session(&session.id).await
    }

    /// Delete a session together with its turns and results.
    pub async fn delete_session(&self, user_id: Option<&str>, session_id: &str) -> AppResult<()> {
        let session = self.core.authorize(user_id, session_id, Access::Write).await?;
        self.core.storage().delete_session(&session.id).await?;
        info!(session_id = %session_id, "Session deleted");
        Ok(())
    }

    pub async fn start_interview(
        &self,
        user_id: Option<&str>,
        session_id: &str,
    ) -> AppResult<StartReply> {
        let session = self.core.authorize(user_id, session_id, Access::Write).await?;
        self.conversation.start(&session, Audience::Owner).await
    }

    pub async fn chat(
        &self,
        user_id: Option<&str>,
        session_id: &str,
        message: &str,
    ) -> AppResult<ChatReply> {
        Validator::new()
            .text("message", message, MESSAGE_MAX_CHARS)
            .finish()?;
        let session = self.core.authorize(user_id, session_id, Access::Write).await?;
        self.conversation
            .reply(&session, message, Audience::Owner)
            .await
    }

    pub async fn chat_stream(
        &self,
        user_id: Option<&str>,
        session_id: &str,
        message: &str,
    ) -> AppResult<mpsc::Receiver<ChatEvent>> {
        Validator::new()
            .text("message", message, MESSAGE_MAX_CHARS)
            .finish()?;
        let session = self.core.authorize(user_id, session_id, Access::Write).await?;
        self.conversation
            .reply_stream(&session, message, Audience::Owner)
            .await
    }

    /// Run one session-level analysis stage.
    pub async fn run_stage(
        &self,
        user_id: Option<&str>,
        session_id: &str,
        stage: Stage,
    ) -> AppResult<StagePayload> {
        if stage == Stage::CampaignAnalytics {
            return Err(AppError::ValidationFailed {
                message: "campaign_analytics is produced by campaign analysis".to_string(),
            });
        }
        let session = self.core.authorize(user_id, session_id, Access::Write).await?;
        self.runner.run(&session, stage).await
    }

    /// Stored results of a session in pipeline order.
    pub async fn get_results(
        &self,
        user_id: Option<&str>,
        session_id: &str,
    ) -> AppResult<Vec<AnalysisRecord>> {
        let session = self.core.authorize(user_id, session_id, Access::Read).await?;
        Ok(self.core.storage().get_results(&session.id).await?)
    }

    /// Spawn a shared session on the same theme that a respondent can join
    /// with the returned token.
    pub async fn create_share_link(
        &self,
        user_id: Option<&str>,
        session_id: &str,
    ) -> AppResult<ShareLink> {
        let source = self.core.authorize(user_id, session_id, Access::Write).await?;
        let owner = source.user_id.clone().ok_or(AppError::Unauthenticated)?;
        self.ensure_quota(&owner).await?;

        let shared = Session::shared(source.theme.clone(), owner);
        self.core.storage().create_session(&shared).await?;
        let share_token = shared.share_token.clone().ok_or_else(|| AppError::Internal {
            message: "Shared session was created without a token".to_string(),
        })?;

        info!(session_id = %shared.id, source_session_id = %source.id, "Share link created");
        Ok(ShareLink {
            session_id: shared.id,
            share_token,
            theme: shared.theme,
        })
    }

    async fn ensure_quota(&self, user_id: &str) -> AppResult<()> {
        let quota = self.core.settings().session_quota;
        let owned = self.core.storage().count_sessions_by_owner(user_id).await?;
        if owned >= u64::from(quota) {
            return Err(AppError::ResourceExhausted {
                message: format!("Session limit of {} reached", quota),
            });
        }
        Ok(())
    }
}
