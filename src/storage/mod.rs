//! Storage layer for interview persistence.
//!
//! This module provides SQLite-based storage for sessions, their transcripts,
//! per-stage analysis results and campaigns.

mod sqlite;


pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;

/// One interview instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique session identifier.
    pub id: String,
    /// Problem theme the interview explores (1-500 chars).
    pub theme: String,
    /// Pipeline status.
    pub status: SessionStatus,
    /// How the session came to exist.
    pub mode: SessionMode,
    /// Token granting respondent access, unique when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_token: Option<String>,
    /// Owning user, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Parent campaign; set iff `mode` is `campaign_respondent`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    /// Display name a respondent chose.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub respondent_name: Option<String>,
    /// Free-text feedback left by a respondent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub respondent_feedback: Option<String>,
    /// Whether non-owners may read the session.
    pub is_public: bool,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Status of a session along the interview/analysis pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Conversation in progress.
    #[default]
    Interviewing,
    /// Facts extracted.
    Analyzed,
    /// Hypotheses generated.
    Hypothesized,
    /// PRD generated.
    PrdGenerated,
    /// Implementation spec generated.
    SpecGenerated,
    /// Readiness checklist generated.
    ReadinessChecked,
    /// Respondent finished; terminal.
    RespondentDone,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Interviewing => "interviewing",
            SessionStatus::Analyzed => "analyzed",
            SessionStatus::Hypothesized => "hypothesized",
            SessionStatus::PrdGenerated => "prd_generated",
            SessionStatus::SpecGenerated => "spec_generated",
            SessionStatus::ReadinessChecked => "readiness_checked",
            SessionStatus::RespondentDone => "respondent_done",
        }
    }

    /// Position along the pipeline.
    pub fn rank(&self) -> u8 {
        match self {
            SessionStatus::Interviewing => 0,
            SessionStatus::Analyzed => 1,
            SessionStatus::Hypothesized => 2,
            SessionStatus::PrdGenerated => 3,
            SessionStatus::SpecGenerated => 4,
            SessionStatus::ReadinessChecked => 5,
            SessionStatus::RespondentDone => 6,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "interviewing" => Ok(SessionStatus::Interviewing),
            "analyzed" => Ok(SessionStatus::Analyzed),
            "hypothesized" => Ok(SessionStatus::Hypothesized),
            "prd_generated" => Ok(SessionStatus::PrdGenerated),
            "spec_generated" => Ok(SessionStatus::SpecGenerated),
            "readiness_checked" => Ok(SessionStatus::ReadinessChecked),
            "respondent_done" => Ok(SessionStatus::RespondentDone),
            _ => Err(format!("Unknown session status: {}", s)),
        }
    }
}

/// Origin of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Owner interviews themself.
    #[default]
    #[serde(rename = "self")]
    SelfInterview,
    /// Respondent reached through an owner's share link.
    Shared,
    /// Respondent who joined a campaign.
    CampaignRespondent,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::SelfInterview => "self",
            SessionMode::Shared => "shared",
            SessionMode::CampaignRespondent => "campaign_respondent",
        }
    }
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "self" => Ok(SessionMode::SelfInterview),
            "shared" => Ok(SessionMode::Shared),
            "campaign_respondent" => Ok(SessionMode::CampaignRespondent),
            _ => Err(format!("Unknown session mode: {}", s)),
        }
    }
}

/// Speaker of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// One message of a session transcript. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    /// Store-assigned sequence; strictly increasing in insertion order.
    pub id: i64,
    /// Parent session ID.
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Analysis pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Facts,
    Hypotheses,
    Prd,
    Spec,
    Readiness,
    CampaignAnalytics,
}

impl Stage {
    /// Every stage, in pipeline order.
    pub const ALL: [Stage; 6] = [
        Stage::Facts,
        Stage::Hypotheses,
        Stage::Prd,
        Stage::Spec,
        Stage::Readiness,
        Stage::CampaignAnalytics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Facts => "facts",
            Stage::Hypotheses => "hypotheses",
            Stage::Prd => "prd",
            Stage::Spec => "spec",
            Stage::Readiness => "readiness",
            Stage::CampaignAnalytics => "campaign_analytics",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "facts" => Ok(Stage::Facts),
            "hypotheses" => Ok(Stage::Hypotheses),
            "prd" => Ok(Stage::Prd),
            "spec" => Ok(Stage::Spec),
            "readiness" => Ok(Stage::Readiness),
            "campaign_analytics" => Ok(Stage::CampaignAnalytics),
            _ => Err(format!("Unknown stage: {}", s)),
        }
    }
}

/// Persisted output of one stage for one session. At most one per
/// (session, stage).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub session_id: String,
    pub stage: Stage,
    /// Stage payload exactly as returned to callers.
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A theme shared by many respondent sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub theme: String,
    /// Session that spawned the campaign; its owner administers it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_session_id: Option<String>,
    pub share_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Generate an unguessable share token.
pub fn new_share_token() -> String {
    Uuid::new_v4().simple().to_string()
}

impl Session {
    fn base(theme: impl Into<String>, mode: SessionMode) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            theme: theme.into(),
            status: SessionStatus::Interviewing,
            mode,
            share_token: None,
            user_id: None,
            campaign_id: None,
            respondent_name: None,
            respondent_feedback: None,
            is_public: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// A self-interview owned by `user_id`.
    pub fn new(theme: impl Into<String>, user_id: impl Into<String>) -> Self {
        let mut session = Self::base(theme, SessionMode::SelfInterview);
        session.user_id = Some(user_id.into());
        session
    }

    /// A session an owner hands out through a share link.
    pub fn shared(theme: impl Into<String>, owner_id: impl Into<String>) -> Self {
        let mut session = Self::base(theme, SessionMode::Shared);
        session.user_id = Some(owner_id.into());
        session.share_token = Some(new_share_token());
        session
    }

    /// A respondent session inside a campaign.
    pub fn campaign_respondent(campaign: &Campaign, respondent_name: Option<String>) -> Self {
        let mut session = Self::base(campaign.theme.clone(), SessionMode::CampaignRespondent);
        session.campaign_id = Some(campaign.id.clone());
        session.share_token = Some(new_share_token());
        session.respondent_name = respondent_name;
        session
    }

    /// Mark as publicly readable.
    pub fn with_public(mut self, is_public: bool) -> Self {
        self.is_public = is_public;
        self
    }

    /// Whether `user_id` owns this session.
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id.as_deref() == Some(user_id)
    }
}

impl AnalysisRecord {
    pub fn new(session_id: impl Into<String>, stage: Stage, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            stage,
            payload,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Campaign {
    /// A campaign spawned from `owner_session`, inheriting its theme.
    pub fn from_session(owner_session: &Session) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            theme: owner_session.theme.clone(),
            owner_session_id: Some(owner_session.id.clone()),
            share_token: new_share_token(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Storage trait for database operations.
///
/// Access is scoped by session id only; authorization happens above this
/// layer.
#[async_trait]
pub trait Storage: Send + Sync {
    // Session operations

    /// Create a new session.
    async fn create_session(&self, session: &Session) -> StorageResult<()>;
    /// Get a session by ID.
    async fn get_session(&self, id: &str) -> StorageResult<Option<Session>>;
    /// Get a session by its share token.
    async fn get_session_by_token(&self, token: &str) -> StorageResult<Option<Session>>;
    /// Move a session's status to `next` only if that ranks above the stored
    /// status. Returns whether the row changed.
    async fn advance_status(&self, id: &str, next: SessionStatus) -> StorageResult<bool>;
    /// Set the public-read flag.
    async fn set_visibility(&self, id: &str, is_public: bool) -> StorageResult<()>;
    /// Store respondent feedback.
    async fn set_feedback(&self, id: &str, feedback: &str) -> StorageResult<()>;
    /// Delete a session with its turns and analysis results.
    async fn delete_session(&self, id: &str) -> StorageResult<()>;
    /// Sessions owned by a user, newest first.
    async fn list_sessions_by_owner(&self, user_id: &str) -> StorageResult<Vec<Session>>;
    /// Number of sessions owned by a user.
    async fn count_sessions_by_owner(&self, user_id: &str) -> StorageResult<u64>;
    /// Respondent sessions of a campaign, oldest first.
    async fn list_campaign_sessions(&self, campaign_id: &str) -> StorageResult<Vec<Session>>;

    // Turn operations

    /// Append a turn and return it with its assigned sequence.
    async fn append_turn(&self, session_id: &str, role: Role, content: &str)
        -> StorageResult<Turn>;
    /// Full transcript in insertion order.
    async fn get_turns(&self, session_id: &str) -> StorageResult<Vec<Turn>>;
    /// Number of user turns in a session.
    async fn count_user_turns(&self, session_id: &str) -> StorageResult<u64>;

    // Analysis result operations

    /// Insert or replace the result for (session, stage).
    async fn upsert_result(&self, record: &AnalysisRecord) -> StorageResult<()>;
    /// Get the result for (session, stage).
    async fn get_result(&self, session_id: &str, stage: Stage)
        -> StorageResult<Option<AnalysisRecord>>;
    /// All results of a session in pipeline order.
    async fn get_results(&self, session_id: &str) -> StorageResult<Vec<AnalysisRecord>>;

    // Campaign operations

    /// Create a new campaign.
    async fn create_campaign(&self, campaign: &Campaign) -> StorageResult<()>;
    /// Get a campaign by ID.
    async fn get_campaign(&self, id: &str) -> StorageResult<Option<Campaign>>;
    /// Get a campaign by its share token.
    async fn get_campaign_by_token(&self, token: &str) -> StorageResult<Option<Campaign>>;
    /// Get the campaign spawned by a session.
    async fn get_campaign_by_owner_session(
        &self,
        session_id: &str,
    ) -> StorageResult<Option<Campaign>>;
}
