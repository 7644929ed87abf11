//! Token-holder operations on shared and campaign sessions.
//!
//! No identity is involved: possessing the session's share token is the
//! authorization.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

use super::conversation::{Audience, ChatReply, Conversation, StartReply};
use super::core::EngineCore;
use super::stream::ChatEvent;
use super::validation::{Validator, FEEDBACK_MAX_CHARS, MESSAGE_MAX_CHARS};
use crate::analysis::StageRunner;
use crate::error::AppResult;
use crate::storage::{Session, SessionStatus, Stage, Storage, Turn};

/// What a respondent sees of their session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondentView {
    pub session_id: String,
    pub theme: String,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub respondent_name: Option<String>,
    pub messages: Vec<Turn>,
}

/// Session state after a respondent finished.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReply {
    pub session_id: String,
    pub status: SessionStatus,
    pub facts_extracted: bool,
}

#[derive(Clone)]
pub struct RespondentService {
    core: EngineCore,
    conversation: Conversation,
    runner: StageRunner,
}

impl RespondentService {
    pub fn new(core: EngineCore) -> Self {
        Self {
            conversation: Conversation::new(core.clone()),
            runner: StageRunner::new(core.clone()),
            core,
        }
    }

    pub async fn session(&self, token: &str) -> AppResult<RespondentView> {
        let session = self.core.session_by_token(token).await?;
        let messages = self.core.storage().get_turns(&session.id).await?;
        Ok(RespondentView {
            session_id: session.id,
            theme: session.theme,
            status: session.status,
            respondent_name: session.respondent_name,
            messages,
        })
    }

    pub async fn start(&self, token: &str) -> AppResult<StartReply> {
        let session = self.core.session_by_token(token).await?;
        self.conversation.start(&session, Audience::Respondent).await
    }

    pub async fn chat(&self, token: &str, message: &str) -> AppResult<ChatReply> {
        Validator::new()
            .text("message", message, MESSAGE_MAX_CHARS)
            .finish()?;
        let session = self.core.session_by_token(token).await?;
        self.conversation
            .reply(&session, message, Audience::Respondent)
            .await
    }

    pub async fn chat_stream(
        &self,
        token: &str,
        message: &str,
    ) -> AppResult<mpsc::Receiver<ChatEvent>> {
        Validator::new()
            .text("message", message, MESSAGE_MAX_CHARS)
            .finish()?;
        let session = self.core.session_by_token(token).await?;
        self.conversation
            .reply_stream(&session, message, Audience::Respondent)
            .await
    }

    /// Extract facts if the respondent said anything and none exist yet,
    /// then close the session.
    pub async fn complete(&self, token: &str) -> AppResult<CompletionReply> {
        let session = self.core.session_by_token(token).await?;

        let has_facts = self
            .core
            .storage()
            .get_result(&session.id, Stage::Facts)
            .await?
            .is_some();
        if session.status.is_terminal() {
            return Ok(CompletionReply {
                session_id: session.id,
                status: session.status,
                facts_extracted: has_facts,
            });
        }

        let mut facts_extracted = has_facts;
        if !has_facts {
            let user_turns = self.core.storage().count_user_turns(&session.id).await?;
            if user_turns > 0 {
                self.runner.run(&session, Stage::Facts).await?;
                facts_extracted = true;
            }
        }

        let session = self.finish(&session.id, None).await?;
        info!(session_id = %session.id, facts_extracted, "Respondent completed interview");
        Ok(CompletionReply {
            session_id: session.id,
            status: session.status,
            facts_extracted,
        })
    }

    /// Store free-text feedback and close the session.
    pub async fn feedback(&self, token: &str, feedback: &str) -> AppResult<Session> {
        Validator::new()
            .text("feedback", feedback, FEEDBACK_MAX_CHARS)
            .finish()?;
        let session = self.core.session_by_token(token).await?;
        let session = self.finish(&session.id, Some(feedback.trim())).await?;
        info!(session_id = %session.id, "Respondent feedback stored");
        Ok(session)
    }

    async fn finish(&self, session_id: &str, feedback: Option<&str>) -> AppResult<Session> {
        let storage = self.core.storage();
        if let Some(feedback) = feedback {
            storage.set_feedback(session_id, feedback).await?;
        }
        storage
            .advance_status(session_id, SessionStatus::RespondentDone)
            .await?;
        self.core.load_session(session_id).await
    }
}
