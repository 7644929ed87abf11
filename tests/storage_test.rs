//! Integration tests for SQLite storage layer
//!
//! Tests database operations using an in-memory SQLite database.

use serde_json::json;

use depth_interview::config::DatabaseConfig;
use depth_interview::error::StorageError;
use depth_interview::storage::{
    AnalysisRecord, Campaign, Role, Session, SessionStatus, SqliteStorage, Stage, Storage,
};

/// Create an in-memory storage instance for testing
async fn create_test_storage() -> SqliteStorage {
    SqliteStorage::new_in_memory()
        .await
        .expect("Failed to create in-memory storage")
}

#[cfg(test)]
mod session_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get_session() {
        let storage = create_test_storage().await;

        let session = Session::new("Password resets", "user-1").with_public(true);
        storage.create_session(&session).await.unwrap();

        let retrieved = storage.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(retrieved.id, session.id);
        assert_eq!(retrieved.theme, "Password resets");
        assert_eq!(retrieved.status, SessionStatus::Interviewing);
        assert_eq!(retrieved.user_id.as_deref(), Some("user-1"));
        assert!(retrieved.is_public);
        assert!(retrieved.share_token.is_none());
    }

    #[tokio::test]
    async fn test_get_missing_session() {
        let storage = create_test_storage().await;
        assert!(storage.get_session("nope").await.unwrap().is_none());
        assert!(storage.get_session_by_token("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_session_by_token() {
        let storage = create_test_storage().await;

        let session = Session::shared("Onboarding", "owner-1");
        storage.create_session(&session).await.unwrap();

        let token = session.share_token.clone().unwrap();
        let retrieved = storage.get_session_by_token(&token).await.unwrap().unwrap();
        assert_eq!(retrieved.id, session.id);
    }

    #[tokio::test]
    async fn test_set_visibility_and_feedback() {
        let storage = create_test_storage().await;

        let session = Session::shared("Onboarding", "owner-1");
        storage.create_session(&session).await.unwrap();

        storage.set_visibility(&session.id, true).await.unwrap();
        storage.set_feedback(&session.id, "Thanks").await.unwrap();

        let retrieved = storage.get_session(&session.id).await.unwrap().unwrap();
        assert!(retrieved.is_public);
        assert_eq!(retrieved.respondent_feedback.as_deref(), Some("Thanks"));
        assert_eq!(retrieved.status, SessionStatus::Interviewing);

        let err = storage.set_visibility("missing", true).await.unwrap_err();
        assert!(matches!(err, StorageError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_advance_status_is_forward_only() {
        let storage = create_test_storage().await;

        let session = Session::new("Onboarding", "owner-1");
        storage.create_session(&session).await.unwrap();

        assert!(storage
            .advance_status(&session.id, SessionStatus::Hypothesized)
            .await
            .unwrap());
        // A stale lower-ranked write leaves the stored status alone.
        assert!(!storage
            .advance_status(&session.id, SessionStatus::Analyzed)
            .await
            .unwrap());
        assert!(!storage
            .advance_status(&session.id, SessionStatus::Hypothesized)
            .await
            .unwrap());

        let retrieved = storage.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(retrieved.status, SessionStatus::Hypothesized);

        assert!(storage
            .advance_status(&session.id, SessionStatus::RespondentDone)
            .await
            .unwrap());
        assert!(!storage
            .advance_status(&session.id, SessionStatus::ReadinessChecked)
            .await
            .unwrap());
        let retrieved = storage.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(retrieved.status, SessionStatus::RespondentDone);
    }

    #[tokio::test]
    async fn test_status_and_visibility_updates_do_not_clobber() {
        let storage = create_test_storage().await;

        let session = Session::new("Onboarding", "owner-1");
        storage.create_session(&session).await.unwrap();

        storage.set_visibility(&session.id, true).await.unwrap();
        storage
            .advance_status(&session.id, SessionStatus::Analyzed)
            .await
            .unwrap();

        let retrieved = storage.get_session(&session.id).await.unwrap().unwrap();
        assert!(retrieved.is_public);
        assert_eq!(retrieved.status, SessionStatus::Analyzed);
    }

    #[tokio::test]
    async fn test_advance_status_missing_session() {
        let storage = create_test_storage().await;

        let err = storage
            .advance_status("missing", SessionStatus::Analyzed)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_and_count_by_owner() {
        let storage = create_test_storage().await;

        for theme in ["a", "b", "c"] {
            storage
                .create_session(&Session::new(theme, "user-1"))
                .await
                .unwrap();
        }
        storage
            .create_session(&Session::new("other", "user-2"))
            .await
            .unwrap();

        assert_eq!(storage.count_sessions_by_owner("user-1").await.unwrap(), 3);
        assert_eq!(storage.list_sessions_by_owner("user-1").await.unwrap().len(), 3);
        assert_eq!(storage.count_sessions_by_owner("nobody").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_session_cascades() {
        let storage = create_test_storage().await;

        let session = Session::new("theme", "user-1");
        storage.create_session(&session).await.unwrap();
        storage
            .append_turn(&session.id, Role::User, "hello")
            .await
            .unwrap();
        storage
            .upsert_result(&AnalysisRecord::new(
                &session.id,
                Stage::Facts,
                json!({"facts": []}),
            ))
            .await
            .unwrap();

        storage.delete_session(&session.id).await.unwrap();

        assert!(storage.get_session(&session.id).await.unwrap().is_none());
        assert!(storage.get_turns(&session.id).await.unwrap().is_empty());
        assert!(storage.get_results(&session.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_backed_storage() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("nested").join("interviews.db"),
            max_connections: 2,
        };

        let storage = SqliteStorage::new(&config).await.unwrap();
        let session = Session::new("persisted", "user-1");
        storage.create_session(&session).await.unwrap();

        let reopened = SqliteStorage::new(&config).await.unwrap();
        assert!(reopened.get_session(&session.id).await.unwrap().is_some());
    }
}

#[cfg(test)]
mod turn_tests {
    use super::*;

    #[tokio::test]
    async fn test_turns_keep_insertion_order() {
        let storage = create_test_storage().await;

        let session = Session::new("theme", "user-1");
        storage.create_session(&session).await.unwrap();

        storage
            .append_turn(&session.id, Role::Assistant, "What happened?")
            .await
            .unwrap();
        storage
            .append_turn(&session.id, Role::User, "I forgot my password")
            .await
            .unwrap();
        storage
            .append_turn(&session.id, Role::Assistant, "How often?")
            .await
            .unwrap();
        storage
            .append_turn(&session.id, Role::User, "Monthly")
            .await
            .unwrap();

        let turns = storage.get_turns(&session.id).await.unwrap();
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![
                "What happened?",
                "I forgot my password",
                "How often?",
                "Monthly"
            ]
        );
        assert!(turns.windows(2).all(|w| w[0].id < w[1].id));
        assert_eq!(storage.count_user_turns(&session.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_turn_for_missing_session_fails() {
        let storage = create_test_storage().await;
        let result = storage.append_turn("missing", Role::User, "hi").await;
        assert!(result.is_err());
    }
}

#[cfg(test)]
mod result_tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_replaces_payload_and_keeps_created_at() {
        let storage = create_test_storage().await;

        let session = Session::new("theme", "user-1");
        storage.create_session(&session).await.unwrap();

        let first = AnalysisRecord::new(&session.id, Stage::Facts, json!({"facts": [1]}));
        storage.upsert_result(&first).await.unwrap();

        let second = AnalysisRecord::new(&session.id, Stage::Facts, json!({"facts": [2]}));
        storage.upsert_result(&second).await.unwrap();

        let results = storage.get_results(&session.id).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].payload, json!({"facts": [2]}));
        assert_eq!(results[0].created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_results_in_pipeline_order() {
        let storage = create_test_storage().await;

        let session = Session::new("theme", "user-1");
        storage.create_session(&session).await.unwrap();

        for stage in [Stage::Prd, Stage::Facts, Stage::Hypotheses] {
            storage
                .upsert_result(&AnalysisRecord::new(&session.id, stage, json!({})))
                .await
                .unwrap();
        }

        let stages: Vec<Stage> = storage
            .get_results(&session.id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.stage)
            .collect();
        assert_eq!(stages, vec![Stage::Facts, Stage::Hypotheses, Stage::Prd]);

        assert!(storage
            .get_result(&session.id, Stage::Spec)
            .await
            .unwrap()
            .is_none());
    }
}

#[cfg(test)]
mod campaign_tests {
    use super::*;

    #[tokio::test]
    async fn test_campaign_lookups() {
        let storage = create_test_storage().await;

        let owner = Session::new("Expense reports", "owner-1");
        storage.create_session(&owner).await.unwrap();
        let campaign = Campaign::from_session(&owner);
        storage.create_campaign(&campaign).await.unwrap();

        let by_id = storage.get_campaign(&campaign.id).await.unwrap().unwrap();
        assert_eq!(by_id.theme, "Expense reports");
        let by_token = storage
            .get_campaign_by_token(&campaign.share_token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_token.id, campaign.id);
        let by_owner = storage
            .get_campaign_by_owner_session(&owner.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_owner.id, campaign.id);
    }

    #[tokio::test]
    async fn test_campaign_sessions_oldest_first() {
        let storage = create_test_storage().await;

        let owner = Session::new("Expense reports", "owner-1");
        storage.create_session(&owner).await.unwrap();
        let campaign = Campaign::from_session(&owner);
        storage.create_campaign(&campaign).await.unwrap();

        let first = Session::campaign_respondent(&campaign, Some("Aki".to_string()));
        storage.create_session(&first).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = Session::campaign_respondent(&campaign, None);
        storage.create_session(&second).await.unwrap();

        let members = storage.list_campaign_sessions(&campaign.id).await.unwrap();
        let ids: Vec<&str> = members.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);
        assert_eq!(members[0].respondent_name.as_deref(), Some("Aki"));
    }

    #[tokio::test]
    async fn test_deleting_owner_session_detaches_campaign() {
        let storage = create_test_storage().await;

        let owner = Session::new("Expense reports", "owner-1");
        storage.create_session(&owner).await.unwrap();
        let campaign = Campaign::from_session(&owner);
        storage.create_campaign(&campaign).await.unwrap();

        storage.delete_session(&owner.id).await.unwrap();

        let campaign = storage.get_campaign(&campaign.id).await.unwrap().unwrap();
        assert!(campaign.owner_session_id.is_none());
    }
}
