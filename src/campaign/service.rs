use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::aggregate::{aggregate, analysis_input, CampaignAggregate};
use crate::analysis::{Fact, StagePayload, StageRunner};
use crate::error::{AppError, AppResult};
use crate::interview::{caller_identity, non_blank, Access, EngineCore, Validator, NAME_MAX_CHARS};
use crate::storage::{Campaign, Session, SessionStatus, Stage, Storage};

/// Name shown for respondents who did not give one.
pub const ANONYMOUS: &str = "anonymous";

/// Outcome of `create_campaign`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignCreated {
    pub campaign: Campaign,
    /// False when the session already had a campaign.
    pub created: bool,
}

/// Respondent session handed out by `join_campaign`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedCampaign {
    pub campaign_id: String,
    pub session_id: String,
    pub share_token: String,
    pub theme: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondentSummary {
    pub session_id: String,
    pub name: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One member session in an export.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondentRecord {
    pub session_id: String,
    pub name: String,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    pub facts: Vec<Fact>,
}

/// Downloadable snapshot of a campaign.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignExport {
    pub campaign: Campaign,
    pub aggregate: CampaignAggregate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cross_analysis: Option<StagePayload>,
    pub respondents: Vec<RespondentRecord>,
    pub exported_at: DateTime<Utc>,
}

/// Campaign lifecycle, aggregation and export.
///
/// Administrative operations are authorized through the campaign's owner
/// session; the unchecked variants ([`aggregate`](Self::aggregate),
/// [`export`](Self::export)) serve local operator tooling.
#[derive(Clone)]
pub struct CampaignService {
    core: EngineCore,
    runner: StageRunner,
}

impl CampaignService {
    pub fn new(core: EngineCore) -> Self {
        Self {
            runner: StageRunner::new(core.clone()),
            core,
        }
    }

    /// Create the campaign of an owned session, or return the existing one.
    pub async fn create_campaign(
        &self,
        user_id: Option<&str>,
        session_id: &str,
    ) -> AppResult<CampaignCreated> {
        let session = self.core.authorize(user_id, session_id, Access::Write).await?;
        let storage = self.core.storage();

        if let Some(campaign) = storage.get_campaign_by_owner_session(&session.id).await? {
            return Ok(CampaignCreated {
                campaign,
                created: false,
            });
        }

        let campaign = Campaign::from_session(&session);
        storage.create_campaign(&campaign).await?;
        info!(campaign_id = %campaign.id, session_id = %session.id, "Campaign created");
        Ok(CampaignCreated {
            campaign,
            created: true,
        })
    }

    /// Spawn a respondent session inside the campaign behind `campaign_token`.
    pub async fn join_campaign(
        &self,
        campaign_token: &str,
        name: Option<&str>,
    ) -> AppResult<JoinedCampaign> {
        Validator::new()
            .optional_text("name", name, NAME_MAX_CHARS)
            .finish()?;
        let campaign = self
            .core
            .storage()
            .get_campaign_by_token(campaign_token)
            .await?
            .ok_or_else(|| AppError::campaign_not_found(campaign_token))?;

        let session = Session::campaign_respondent(&campaign, non_blank(name));
        self.core.storage().create_session(&session).await?;
        let share_token = session.share_token.clone().ok_or_else(|| AppError::Internal {
            message: "Respondent session was created without a token".to_string(),
        })?;

        info!(campaign_id = %campaign.id, session_id = %session.id, "Respondent joined campaign");
        Ok(JoinedCampaign {
            campaign_id: campaign.id,
            session_id: session.id,
            share_token,
            theme: session.theme,
        })
    }

    pub async fn campaign_aggregate(
        &self,
        user_id: Option<&str>,
        campaign_id: &str,
    ) -> AppResult<CampaignAggregate> {
        let campaign = self.authorize(user_id, campaign_id).await?.0;
        self.aggregate(&campaign.id).await
    }

    /// Ask the model for cross-respondent patterns and store them as the
    /// owner session's `campaign_analytics` result.
    pub async fn campaign_analyze(
        &self,
        user_id: Option<&str>,
        campaign_id: &str,
    ) -> AppResult<StagePayload> {
        let (campaign, owner_session) = self.authorize(user_id, campaign_id).await?;
        let summary = self.aggregate(&campaign.id).await?;
        if summary.completed_sessions == 0 {
            return Err(AppError::precondition(
                "campaign_analytics requires at least one completed respondent",
            ));
        }

        let input = analysis_input(&campaign.theme, &summary);
        let input = serde_json::to_string_pretty(&input).map_err(|e| AppError::Internal {
            message: format!("Failed to serialize campaign input: {}", e),
        })?;
        info!(
            campaign_id = %campaign.id,
            completed = summary.completed_sessions,
            "Running campaign cross-analysis"
        );
        self.runner
            .run_with_input(&owner_session, Stage::CampaignAnalytics, input)
            .await
    }

    pub async fn campaign_export(
        &self,
        user_id: Option<&str>,
        campaign_id: &str,
    ) -> AppResult<CampaignExport> {
        let campaign = self.authorize(user_id, campaign_id).await?.0;
        self.export(&campaign.id).await
    }

    pub async fn campaign_respondents(
        &self,
        user_id: Option<&str>,
        campaign_id: &str,
    ) -> AppResult<Vec<RespondentSummary>> {
        let campaign = self.authorize(user_id, campaign_id).await?.0;
        let sessions = self.core.storage().list_campaign_sessions(&campaign.id).await?;
        Ok(sessions
            .into_iter()
            .map(|s| RespondentSummary {
                session_id: s.id,
                name: display_name(s.respondent_name.as_deref()),
                status: s.status,
                created_at: s.created_at,
                updated_at: s.updated_at,
            })
            .collect())
    }

    /// Aggregate without an ownership check.
    pub async fn aggregate(&self, campaign_id: &str) -> AppResult<CampaignAggregate> {
        let storage = self.core.storage();
        let campaign = storage
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| AppError::campaign_not_found(campaign_id))?;
        let sessions = storage.list_campaign_sessions(&campaign.id).await?;

        let mut completed = Vec::new();
        for session in sessions.iter().filter(|s| s.status == SessionStatus::RespondentDone) {
            completed.push(self.facts_of(&session.id).await?);
        }

        Ok(aggregate(sessions.len() as u64, &completed))
    }

    /// Export without an ownership check.
    pub async fn export(&self, campaign_id: &str) -> AppResult<CampaignExport> {
        let storage = self.core.storage();
        let campaign = storage
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| AppError::campaign_not_found(campaign_id))?;

        let sessions = storage.list_campaign_sessions(&campaign.id).await?;
        let mut respondents = Vec::with_capacity(sessions.len());
        let mut completed = Vec::new();
        for session in sessions.iter() {
            let facts = self.facts_of(&session.id).await?;
            if session.status == SessionStatus::RespondentDone {
                completed.push(facts.clone());
            }
            respondents.push(RespondentRecord {
                session_id: session.id.clone(),
                name: display_name(session.respondent_name.as_deref()),
                status: session.status,
                feedback: session.respondent_feedback.clone(),
                facts,
            });
        }

        let cross_analysis = match &campaign.owner_session_id {
            Some(owner) => self.runner.load(owner, Stage::CampaignAnalytics).await?,
            None => None,
        };

        info!(campaign_id = %campaign.id, respondents = respondents.len(), "Campaign exported");
        Ok(CampaignExport {
            aggregate: aggregate(sessions.len() as u64, &completed),
            campaign,
            cross_analysis,
            respondents,
            exported_at: Utc::now(),
        })
    }

    async fn facts_of(&self, session_id: &str) -> AppResult<Vec<Fact>> {
        Ok(self
            .runner
            .load(session_id, Stage::Facts)
            .await?
            .map(StagePayload::into_facts)
            .unwrap_or_default())
    }

    /// Resolve the campaign and check the caller owns its owner session.
    async fn authorize(
        &self,
        user_id: Option<&str>,
        campaign_id: &str,
    ) -> AppResult<(Campaign, Session)> {
        caller_identity(user_id)?;
        let campaign = self
            .core
            .storage()
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| AppError::campaign_not_found(campaign_id))?;

        let owner_session_id = campaign.owner_session_id.clone().ok_or_else(|| {
            AppError::Forbidden {
                message: format!("Campaign {} has no owner session", campaign_id),
            }
        })?;
        let session = self
            .core
            .authorize(user_id, &owner_session_id, Access::Write)
            .await?;
        Ok((campaign, session))
    }
}

fn display_name(name: Option<&str>) -> String {
    non_blank(name).unwrap_or_else(|| ANONYMOUS.to_string())
}
