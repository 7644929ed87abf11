use std::time::Instant;
use tracing::{debug, info};

use super::parser::parse_payload;
use super::payload::StagePayload;
use crate::error::{AppError, AppResult};
use crate::gateway::{GenerationRequest, Message};
use crate::interview::state::status_after;
use crate::interview::EngineCore;
use crate::prompts::stage_instruction;
use crate::storage::{AnalysisRecord, Role, Session, Stage, Storage};

/// Output budget of one stage invocation.
pub fn max_tokens(stage: Stage) -> u32 {
    match stage {
        Stage::Prd | Stage::Spec => 8192,
        Stage::Facts | Stage::Hypotheses | Stage::Readiness | Stage::CampaignAnalytics => 4096,
    }
}

/// Generic driver for every analysis stage.
///
/// Checks the stage precondition, asks the gateway, reads the reply into a
/// [`StagePayload`] (never failing on malformed output), upserts it for
/// (session, stage) and advances the session status.
#[derive(Clone)]
pub struct StageRunner {
    core: EngineCore,
}

impl StageRunner {
    pub fn new(core: EngineCore) -> Self {
        Self { core }
    }

    /// Run a session-level stage with input assembled from the session.
    pub async fn run(&self, session: &Session, stage: Stage) -> AppResult<StagePayload> {
        let input = self.stage_input(session, stage).await?;
        self.run_with_input(session, stage, input).await
    }

    /// Run `stage` against prepared input and persist the outcome on `session`.
    pub async fn run_with_input(
        &self,
        session: &Session,
        stage: Stage,
        input: String,
    ) -> AppResult<StagePayload> {
        let locale = self.core.settings().default_locale;
        let request = GenerationRequest::new(
            stage_instruction(stage, locale),
            vec![Message::user(input)],
            max_tokens(stage),
        );

        info!(session_id = %session.id, stage = %stage, "Running analysis stage");
        let start = Instant::now();

        let generation = self.core.gateway().complete(request).await?;
        let payload = parse_payload(stage, &generation.text);

        let value = serde_json::to_value(&payload).map_err(|e| AppError::Internal {
            message: format!("Failed to serialize {} payload: {}", stage, e),
        })?;
        self.core
            .storage()
            .upsert_result(&AnalysisRecord::new(session.id.clone(), stage, value))
            .await?;

        if let Some(next) = status_after(stage) {
            self.core.storage().advance_status(&session.id, next).await?;
        }

        info!(
            session_id = %session.id,
            stage = %stage,
            latency_ms = start.elapsed().as_millis(),
            fallback = matches!(payload, StagePayload::Raw { .. }),
            "Analysis stage completed"
        );
        Ok(payload)
    }

    /// Stored payload of `stage`, if any.
    pub async fn load(&self, session_id: &str, stage: Stage) -> AppResult<Option<StagePayload>> {
        let record = self.core.storage().get_result(session_id, stage).await?;
        Ok(record.and_then(|r| StagePayload::from_stored(stage, &r.payload)))
    }

    /// Stage input, or `PreconditionFailed` when a prerequisite is missing.
    async fn stage_input(&self, session: &Session, stage: Stage) -> AppResult<String> {
        let mut input = format!("Theme: {}\n", session.theme);

        match stage {
            Stage::Facts => {
                let turns = self.core.storage().get_turns(&session.id).await?;
                if !turns.iter().any(|t| t.role == Role::User) {
                    return Err(AppError::precondition(
                        "facts requires at least one user turn",
                    ));
                }
                input.push_str("\nTranscript:\n");
                for turn in &turns {
                    input.push_str(&format!("[{}] {}\n", turn.role, turn.content));
                }
            }
            Stage::Hypotheses => {
                self.append_prior(&mut input, session, stage, Stage::Facts).await?;
            }
            Stage::Prd => {
                self.append_prior(&mut input, session, stage, Stage::Facts).await?;
                self.append_prior(&mut input, session, stage, Stage::Hypotheses)
                    .await?;
            }
            Stage::Spec => {
                self.append_prior(&mut input, session, stage, Stage::Prd).await?;
            }
            Stage::Readiness => {
                self.append_prior(&mut input, session, stage, Stage::Spec).await?;
                if let Some(prd) = self.core.storage().get_result(&session.id, Stage::Prd).await? {
                    input.push_str(&format!("\nprd:\n{}\n", prd.payload));
                }
            }
            Stage::CampaignAnalytics => {
                return Err(AppError::precondition(
                    "campaign_analytics runs on campaign aggregates, not a single session",
                ));
            }
        }

        debug!(session_id = %session.id, stage = %stage, chars = input.len(), "Stage input assembled");
        Ok(input)
    }

    async fn append_prior(
        &self,
        input: &mut String,
        session: &Session,
        stage: Stage,
        required: Stage,
    ) -> AppResult<()> {
        let record = self
            .core
            .storage()
            .get_result(&session.id, required)
            .await?
            .ok_or_else(|| {
                AppError::precondition(format!("{} requires {} results", stage, required))
            })?;
        input.push_str(&format!("\n{}:\n{}\n", required, record.payload));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_budgets() {
        assert_eq!(max_tokens(Stage::Facts), 4096);
        assert_eq!(max_tokens(Stage::Prd), 8192);
        assert_eq!(max_tokens(Stage::Spec), 8192);
        assert_eq!(max_tokens(Stage::CampaignAnalytics), 4096);
    }
}
