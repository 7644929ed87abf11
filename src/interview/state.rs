//! Session status transitions.
//!
//! ```text
//! interviewing → analyzed → hypothesized → prd_generated → spec_generated → readiness_checked
//!       └──────────────┴───────────┴──────────────┴───────────────┴──────────────┴──→ respondent_done
//! ```
//!
//! Status only moves forward; `respondent_done` is terminal.

use crate::error::{AppError, AppResult};
use crate::storage::{Session, SessionStatus, Stage};

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::RespondentDone)
    }

    /// Whether moving to `next` is a forward step.
    pub fn can_advance_to(&self, next: SessionStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

/// Status a session reaches once `stage` succeeds. Campaign analytics does
/// not move the owner session.
pub fn status_after(stage: Stage) -> Option<SessionStatus> {
    match stage {
        Stage::Facts => Some(SessionStatus::Analyzed),
        Stage::Hypotheses => Some(SessionStatus::Hypothesized),
        Stage::Prd => Some(SessionStatus::PrdGenerated),
        Stage::Spec => Some(SessionStatus::SpecGenerated),
        Stage::Readiness => Some(SessionStatus::ReadinessChecked),
        Stage::CampaignAnalytics => None,
    }
}

/// Fail unless the session still accepts chat turns.
pub fn ensure_accepts_chat(session: &Session) -> AppResult<()> {
    if session.status.is_terminal() {
        return Err(AppError::precondition(format!(
            "Session {} is finished and accepts no more messages",
            session.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_only() {
        assert!(SessionStatus::Interviewing.can_advance_to(SessionStatus::Analyzed));
        assert!(SessionStatus::Interviewing.can_advance_to(SessionStatus::ReadinessChecked));
        assert!(!SessionStatus::PrdGenerated.can_advance_to(SessionStatus::Analyzed));
        assert!(!SessionStatus::Analyzed.can_advance_to(SessionStatus::Analyzed));
    }

    #[test]
    fn test_respondent_done_reachable_and_terminal() {
        for status in [
            SessionStatus::Interviewing,
            SessionStatus::Analyzed,
            SessionStatus::ReadinessChecked,
        ] {
            assert!(status.can_advance_to(SessionStatus::RespondentDone));
        }
        assert!(SessionStatus::RespondentDone.is_terminal());
        assert!(!SessionStatus::RespondentDone.can_advance_to(SessionStatus::ReadinessChecked));
    }

    #[test]
    fn test_status_after_stage() {
        assert_eq!(status_after(Stage::Facts), Some(SessionStatus::Analyzed));
        assert_eq!(
            status_after(Stage::Readiness),
            Some(SessionStatus::ReadinessChecked)
        );
        assert_eq!(status_after(Stage::CampaignAnalytics), None);
    }

    #[test]
    fn test_terminal_session_rejects_chat() {
        let mut session = Session::new("theme", "u");
        assert!(ensure_accepts_chat(&session).is_ok());
        session.status = SessionStatus::RespondentDone;
        assert!(matches!(
            ensure_accepts_chat(&session),
            Err(AppError::PreconditionFailed { .. })
        ));
    }
}
