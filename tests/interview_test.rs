//! Integration tests for owner and respondent interview flows
//!
//! Services run against in-memory SQLite and a wiremock gateway.

mod common;

use serde_json::json;
use wiremock::{
    matchers::{method, path},
    Mock, ResponseTemplate,
};

use common::*;
use depth_interview::analysis::{FactType, StagePayload};
use depth_interview::config::InterviewConfig;
use depth_interview::error::{AppError, ErrorKind};
use depth_interview::interview::ChatEvent;
use depth_interview::prompts::{default_choices, Locale};
use depth_interview::storage::{Role, SessionStatus, Stage, Storage};

const OPENING: &str = "Welcome! What slows down onboarding?\n[CHOICES]\nDocs\nSetup\n[/CHOICES]";

#[cfg(test)]
mod start_tests {
    use super::*;

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let h = harness().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(text_response(OPENING))
            .expect(1)
            .mount(&h.server)
            .await;

        let session = h
            .interviews
            .create_session(Some(OWNER), "onboarding friction", false)
            .await
            .unwrap();

        let first = h
            .interviews
            .start_interview(Some(OWNER), &session.id)
            .await
            .unwrap();
        assert!(!first.already_started);
        assert_eq!(first.message, "Welcome! What slows down onboarding?");
        assert_eq!(first.choices, vec!["Docs", "Setup"]);
        assert_eq!(first.turn_count, 0);

        let turns = h.storage.get_turns(&session.id).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::Assistant);

        let second = h
            .interviews
            .start_interview(Some(OWNER), &session.id)
            .await
            .unwrap();
        assert!(second.already_started);
        assert_eq!(second.message, first.message);
        assert_eq!(second.choices, default_choices(Locale::Ja));
        assert_eq!(h.storage.get_turns(&session.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_start_failure_writes_nothing() {
        let h = harness().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&h.server)
            .await;

        let session = h
            .interviews
            .create_session(Some(OWNER), "onboarding friction", false)
            .await
            .unwrap();
        let err = h
            .interviews
            .start_interview(Some(OWNER), &session.id)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UpstreamTransport);
        assert!(h.storage.get_turns(&session.id).await.unwrap().is_empty());
    }
}

#[cfg(test)]
mod chat_tests {
    use super::*;

    #[tokio::test]
    async fn test_eighth_turn_forces_readiness() {
        let h = harness().await;
        mock_chat(&h.server, "Tell me more.\n[CHOICES]\nSure\n[/CHOICES]").await;

        let session = h
            .interviews
            .create_session(Some(OWNER), "onboarding friction", false)
            .await
            .unwrap();

        for turn in 1..=8u64 {
            let reply = h
                .interviews
                .chat(Some(OWNER), &session.id, &format!("answer {}", turn))
                .await
                .unwrap();
            assert_eq!(reply.turn_count, turn);
            assert_eq!(reply.reply, "Tell me more.");
            assert_eq!(reply.choices, vec!["Sure"]);
            assert!(reply.is_complete.is_none());
            assert_eq!(
                reply.ready_for_analysis,
                Some(turn == 8),
                "readiness at turn {}",
                turn
            );
        }

        assert_eq!(h.storage.count_user_turns(&session.id).await.unwrap(), 8);
        assert_eq!(h.storage.get_turns(&session.id).await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_sentinel_marks_ready_and_is_hidden() {
        let h = harness().await;
        mock_chat(&h.server, "Thank you for your time! [INTERVIEW_COMPLETE]").await;

        let session = h
            .interviews
            .create_session(Some(OWNER), "onboarding friction", false)
            .await
            .unwrap();
        let reply = h
            .interviews
            .chat(Some(OWNER), &session.id, "That's all")
            .await
            .unwrap();

        assert_eq!(reply.ready_for_analysis, Some(true));
        assert_eq!(reply.reply, "Thank you for your time!");
        assert_eq!(reply.choices, default_choices(Locale::Ja));

        let turns = h.storage.get_turns(&session.id).await.unwrap();
        assert!(!turns[1].content.contains("[INTERVIEW_COMPLETE]"));
    }

    #[tokio::test]
    async fn test_failed_reply_keeps_user_turn() {
        let h = harness().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad"))
            .mount(&h.server)
            .await;

        let session = h
            .interviews
            .create_session(Some(OWNER), "onboarding friction", false)
            .await
            .unwrap();
        let result = h.interviews.chat(Some(OWNER), &session.id, "hello").await;

        assert!(matches!(result, Err(AppError::Gateway(_))));
        let turns = h.storage.get_turns(&session.id).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_oversized_message_rejected_before_lookup() {
        let h = harness().await;
        let message = "x".repeat(4001);

        let err = h
            .interviews
            .chat(Some(OWNER), "missing-session", &message)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    }
}

#[cfg(test)]
mod stream_tests {
    use super::*;

    async fn collect(mut rx: tokio::sync::mpsc::Receiver<ChatEvent>) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_stream_commits_after_done() {
        let h = harness().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(sse_response(
                &["Great. ", "How often?\n[CHO", "ICES]\nDaily\n[/CHOICES]"],
                true,
            ))
            .mount(&h.server)
            .await;

        let session = h
            .interviews
            .create_session(Some(OWNER), "onboarding friction", false)
            .await
            .unwrap();
        let events = collect(
            h.interviews
                .chat_stream(Some(OWNER), &session.id, "It takes days")
                .await
                .unwrap(),
        )
        .await;

        assert_eq!(events.first(), Some(&ChatEvent::Meta { turn_count: 1 }));
        let visible: String = events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::Delta { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert!(visible.starts_with("Great. How often?"));
        assert!(!visible.contains("[CHO"));

        match events.last() {
            Some(ChatEvent::Done {
                ready_for_analysis,
                is_complete,
                turn_count,
                choices,
            }) => {
                assert_eq!(*ready_for_analysis, Some(false));
                assert!(is_complete.is_none());
                assert_eq!(*turn_count, 1);
                assert_eq!(choices, &vec!["Daily".to_string()]);
            }
            other => panic!("Expected done event, got {:?}", other),
        }

        let turns = h.storage.get_turns(&session.id).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].content, "Great. How often?");
    }

    #[tokio::test]
    async fn test_interrupted_stream_persists_no_reply() {
        let h = harness().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(sse_response(&["Half an ans"], false))
            .mount(&h.server)
            .await;

        let session = h
            .interviews
            .create_session(Some(OWNER), "onboarding friction", false)
            .await
            .unwrap();
        let events = collect(
            h.interviews
                .chat_stream(Some(OWNER), &session.id, "It takes days")
                .await
                .unwrap(),
        )
        .await;

        assert!(matches!(events.last(), Some(ChatEvent::Error { .. })));
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

        let turns = h.storage.get_turns(&session.id).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_upstream_refusal_arrives_as_event() {
        let h = harness().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&h.server)
            .await;

        let session = h
            .interviews
            .create_session(Some(OWNER), "onboarding friction", false)
            .await
            .unwrap();
        let events = collect(
            h.interviews
                .chat_stream(Some(OWNER), &session.id, "hello")
                .await
                .unwrap(),
        )
        .await;

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ChatEvent::Meta { turn_count: 1 }));
        assert!(matches!(events[1], ChatEvent::Error { .. }));
    }

    #[tokio::test]
    async fn test_dropped_consumer_still_commits() {
        let h = harness().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(sse_response(&["Noted. ", "Anything else?"], true))
            .mount(&h.server)
            .await;

        let session = h
            .interviews
            .create_session(Some(OWNER), "onboarding friction", false)
            .await
            .unwrap();
        let rx = h
            .interviews
            .chat_stream(Some(OWNER), &session.id, "hello")
            .await
            .unwrap();
        drop(rx);

        let mut persisted = false;
        for _ in 0..100 {
            if h.storage.get_turns(&session.id).await.unwrap().len() == 2 {
                persisted = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(persisted, "assistant turn should be stored after disconnect");
    }
}

#[cfg(test)]
mod stage_tests {
    use super::*;

    #[tokio::test]
    async fn test_hypotheses_without_facts_fails() {
        let h = harness().await;
        let session = h
            .interviews
            .create_session(Some(OWNER), "onboarding friction", false)
            .await
            .unwrap();

        let err = h
            .interviews
            .run_stage(Some(OWNER), &session.id, Stage::Hypotheses)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert!(h.storage.get_results(&session.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_facts_without_user_turns_fails() {
        let h = harness().await;
        let session = h
            .interviews
            .create_session(Some(OWNER), "onboarding friction", false)
            .await
            .unwrap();

        let err = h
            .interviews
            .run_stage(Some(OWNER), &session.id, Stage::Facts)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    }

    #[tokio::test]
    async fn test_campaign_stage_is_not_a_session_stage() {
        let h = harness().await;
        let session = h
            .interviews
            .create_session(Some(OWNER), "onboarding friction", false)
            .await
            .unwrap();

        let err = h
            .interviews
            .run_stage(Some(OWNER), &session.id, Stage::CampaignAnalytics)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    }

    #[tokio::test]
    async fn test_facts_then_hypotheses_advance_status() {
        let h = harness().await;
        mock_chat(&h.server, "How often does that happen?").await;
        mock_analysis(
            &h.server,
            &facts_reply(json!([
                {"id": "F1", "type": "pain", "content": "Setup takes days", "evidence": "It takes days", "severity": "high"}
            ])),
            1,
        )
        .await;
        mock_analysis(
            &h.server,
            r#"{"hypotheses": [{"id": "H1", "title": "Setup is manual", "description": "No automation", "supportingFacts": ["F1"], "counterEvidence": "", "validationMethod": "Time it"}]}"#,
            1,
        )
        .await;

        let session = h
            .interviews
            .create_session(Some(OWNER), "onboarding friction", false)
            .await
            .unwrap();
        h.interviews
            .chat(Some(OWNER), &session.id, "It takes days")
            .await
            .unwrap();

        let facts = h
            .interviews
            .run_stage(Some(OWNER), &session.id, Stage::Facts)
            .await
            .unwrap();
        match &facts {
            StagePayload::Facts(facts) => {
                assert_eq!(facts.len(), 1);
                assert_eq!(facts[0].fact_type, FactType::Pain);
                assert_eq!(facts[0].severity.as_deref(), Some("high"));
            }
            other => panic!("Expected facts, got {:?}", other),
        }
        let status = h
            .interviews
            .get_session(Some(OWNER), &session.id)
            .await
            .unwrap()
            .status;
        assert_eq!(status, SessionStatus::Analyzed);

        let hypotheses = h
            .interviews
            .run_stage(Some(OWNER), &session.id, Stage::Hypotheses)
            .await
            .unwrap();
        assert!(matches!(hypotheses, StagePayload::Hypotheses(ref list) if list.len() == 1));

        let session = h
            .interviews
            .get_session(Some(OWNER), &session.id)
            .await
            .unwrap();
        assert_eq!(session.status, SessionStatus::Hypothesized);

        let results = h
            .interviews
            .get_results(Some(OWNER), &session.id)
            .await
            .unwrap();
        let stages: Vec<Stage> = results.iter().map(|r| r.stage).collect();
        assert_eq!(stages, vec![Stage::Facts, Stage::Hypotheses]);
        assert_eq!(results[0].payload["facts"][0]["type"], "pain");
    }

    #[tokio::test]
    async fn test_stage_run_keeps_visibility_and_never_regresses() {
        let h = harness().await;
        mock_chat(&h.server, "Go on.").await;
        mock_analysis(
            &h.server,
            &facts_reply(json!([{"id": "F1", "type": "fact", "content": "Uses a wiki", "evidence": ""}])),
            2,
        )
        .await;

        let session = h
            .interviews
            .create_session(Some(OWNER), "onboarding friction", false)
            .await
            .unwrap();
        h.interviews
            .chat(Some(OWNER), &session.id, "We use a wiki")
            .await
            .unwrap();
        h.interviews
            .set_visibility(Some(OWNER), &session.id, true)
            .await
            .unwrap();
        h.storage
            .advance_status(&session.id, SessionStatus::PrdGenerated)
            .await
            .unwrap();

        // Rerunning facts on a later-stage session stores the result only.
        h.interviews
            .run_stage(Some(OWNER), &session.id, Stage::Facts)
            .await
            .unwrap();

        let session = h
            .interviews
            .get_session(Some(OWNER), &session.id)
            .await
            .unwrap();
        assert!(session.is_public);
        assert_eq!(session.status, SessionStatus::PrdGenerated);
    }

    #[tokio::test]
    async fn test_unparseable_reply_falls_back_and_rerun_replaces() {
        let h = harness().await;
        mock_chat(&h.server, "Go on.").await;
        mock_analysis(&h.server, "I could not find any structure here.", 1).await;
        mock_analysis(
            &h.server,
            &facts_reply(json!([{"id": "F1", "type": "fact", "content": "Uses a wiki", "evidence": ""}])),
            1,
        )
        .await;

        let session = h
            .interviews
            .create_session(Some(OWNER), "onboarding friction", false)
            .await
            .unwrap();
        h.interviews
            .chat(Some(OWNER), &session.id, "We use a wiki")
            .await
            .unwrap();

        let fallback = h
            .interviews
            .run_stage(Some(OWNER), &session.id, Stage::Facts)
            .await
            .unwrap();
        match fallback {
            StagePayload::Facts(facts) => {
                assert_eq!(facts.len(), 1);
                assert_eq!(facts[0].id, "F1");
                assert_eq!(facts[0].content, "I could not find any structure here.");
            }
            other => panic!("Expected fallback facts, got {:?}", other),
        }

        h.interviews
            .run_stage(Some(OWNER), &session.id, Stage::Facts)
            .await
            .unwrap();
        let results = h.storage.get_results(&session.id).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].payload["facts"][0]["content"], "Uses a wiki");
    }
}

#[cfg(test)]
mod access_tests {
    use super::*;

    #[tokio::test]
    async fn test_identity_and_ownership() {
        let h = harness().await;
        let session = h
            .interviews
            .create_session(Some(OWNER), "onboarding friction", false)
            .await
            .unwrap();

        let err = h.interviews.get_session(None, &session.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);

        let err = h
            .interviews
            .get_session(Some("intruder"), &session.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = h
            .interviews
            .get_session(Some(OWNER), "missing")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_blank_identity_is_unauthenticated() {
        let h = harness().await;

        let err = h
            .interviews
            .create_session(Some("  "), "onboarding friction", false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);

        let err = h.interviews.list_sessions(Some("")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
        assert!(h.storage.list_sessions_by_owner("  ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_public_sessions_are_read_only_for_others() {
        let h = harness().await;
        let session = h
            .interviews
            .create_session(Some(OWNER), "onboarding friction", true)
            .await
            .unwrap();

        assert!(h
            .interviews
            .get_transcript(Some("reader"), &session.id)
            .await
            .is_ok());
        let err = h
            .interviews
            .delete_session(Some("reader"), &session.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let private = h
            .interviews
            .set_visibility(Some(OWNER), &session.id, false)
            .await
            .unwrap();
        assert!(!private.is_public);
        let err = h
            .interviews
            .get_transcript(Some("reader"), &session.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn test_theme_validation() {
        let h = harness().await;

        let err = h
            .interviews
            .create_session(Some(OWNER), "   ", false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);

        let err = h
            .interviews
            .create_session(Some(OWNER), &"あ".repeat(501), false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);

        assert!(h
            .interviews
            .create_session(Some(OWNER), &"あ".repeat(500), false)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_session_quota() {
        let h = harness_with(InterviewConfig {
            session_quota: 2,
            ..InterviewConfig::default()
        })
        .await;

        let first = h
            .interviews
            .create_session(Some(OWNER), "one", false)
            .await
            .unwrap();
        h.interviews
            .create_share_link(Some(OWNER), &first.id)
            .await
            .unwrap();

        let err = h
            .interviews
            .create_session(Some(OWNER), "three", false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
        assert!(h
            .interviews
            .create_session(Some("someone-else"), "three", false)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_delete_removes_everything() {
        let h = harness().await;
        mock_chat(&h.server, "Go on.").await;
        let session = h
            .interviews
            .create_session(Some(OWNER), "onboarding friction", false)
            .await
            .unwrap();
        h.interviews
            .chat(Some(OWNER), &session.id, "hello")
            .await
            .unwrap();

        h.interviews
            .delete_session(Some(OWNER), &session.id)
            .await
            .unwrap();
        assert!(h.interviews.list_sessions(Some(OWNER)).await.unwrap().is_empty());
        assert!(h.storage.get_turns(&session.id).await.unwrap().is_empty());
    }
}

#[cfg(test)]
mod respondent_tests {
    use super::*;

    #[tokio::test]
    async fn test_shared_session_completes_on_eighth_turn() {
        let h = harness().await;
        mock_chat(&h.server, "And then?").await;

        let source = h
            .interviews
            .create_session(Some(OWNER), "onboarding friction", false)
            .await
            .unwrap();
        let link = h
            .interviews
            .create_share_link(Some(OWNER), &source.id)
            .await
            .unwrap();
        assert_ne!(link.session_id, source.id);
        assert_eq!(link.theme, "onboarding friction");

        for turn in 1..=8u64 {
            let reply = h
                .respondents
                .chat(&link.share_token, &format!("answer {}", turn))
                .await
                .unwrap();
            assert!(reply.ready_for_analysis.is_none());
            assert_eq!(reply.is_complete, Some(turn == 8));
            assert!(reply.choices.is_empty());
        }

        let view = h.respondents.session(&link.share_token).await.unwrap();
        assert_eq!(view.messages.len(), 16);
        assert_eq!(view.status, SessionStatus::Interviewing);
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let h = harness().await;
        let err = h.respondents.session("no-such-token").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_complete_extracts_facts_once() {
        let h = harness().await;
        mock_chat(&h.server, "Thanks!").await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(text_response(&facts_reply(json!([
                {"id": "F1", "type": "workaround", "content": "uses sticky notes", "evidence": ""}
            ]))))
            .expect(1)
            .mount(&h.server)
            .await;

        let source = h
            .interviews
            .create_session(Some(OWNER), "passwords", false)
            .await
            .unwrap();
        let link = h
            .interviews
            .create_share_link(Some(OWNER), &source.id)
            .await
            .unwrap();
        h.respondents
            .chat(&link.share_token, "I write them down")
            .await
            .unwrap();

        let done = h.respondents.complete(&link.share_token).await.unwrap();
        assert!(done.facts_extracted);
        assert_eq!(done.status, SessionStatus::RespondentDone);

        let again = h.respondents.complete(&link.share_token).await.unwrap();
        assert!(again.facts_extracted);
        assert_eq!(again.status, SessionStatus::RespondentDone);

        let err = h
            .respondents
            .chat(&link.share_token, "one more thing")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    }

    #[tokio::test]
    async fn test_complete_without_answers_skips_facts() {
        let h = harness().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(text_response("unused"))
            .expect(0)
            .mount(&h.server)
            .await;

        let source = h
            .interviews
            .create_session(Some(OWNER), "passwords", false)
            .await
            .unwrap();
        let link = h
            .interviews
            .create_share_link(Some(OWNER), &source.id)
            .await
            .unwrap();

        let done = h.respondents.complete(&link.share_token).await.unwrap();
        assert!(!done.facts_extracted);
        assert_eq!(done.status, SessionStatus::RespondentDone);
    }

    #[tokio::test]
    async fn test_feedback_closes_session() {
        let h = harness().await;
        let source = h
            .interviews
            .create_session(Some(OWNER), "passwords", false)
            .await
            .unwrap();
        let link = h
            .interviews
            .create_share_link(Some(OWNER), &source.id)
            .await
            .unwrap();

        let err = h
            .respondents
            .feedback(&link.share_token, &"x".repeat(2001))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);

        let session = h
            .respondents
            .feedback(&link.share_token, "  Nice questions  ")
            .await
            .unwrap();
        assert_eq!(session.status, SessionStatus::RespondentDone);
        assert_eq!(session.respondent_feedback.as_deref(), Some("Nice questions"));
    }
}
