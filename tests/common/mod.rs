//! Shared fixtures: in-memory storage plus a gateway pointed at wiremock.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::{
    matchers::{body_partial_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

use depth_interview::cache::InMemoryStore;
use depth_interview::campaign::CampaignService;
use depth_interview::config::{AuthConfig, GatewayConfig, InterviewConfig, RequestConfig};
use depth_interview::gateway::GatewayClient;
use depth_interview::interview::{
    EngineCore, InterviewService, RespondentService, CHAT_MAX_TOKENS,
};
use depth_interview::storage::SqliteStorage;

pub const OWNER: &str = "owner-1";

pub struct Harness {
    pub server: MockServer,
    pub storage: SqliteStorage,
    pub interviews: InterviewService,
    pub respondents: RespondentService,
    pub campaigns: CampaignService,
}

pub async fn harness() -> Harness {
    harness_with(InterviewConfig::default()).await
}

pub async fn harness_with(settings: InterviewConfig) -> Harness {
    let server = MockServer::start().await;
    let storage = SqliteStorage::new_in_memory()
        .await
        .expect("Failed to create in-memory storage");

    let gateway_config = GatewayConfig {
        base_url: server.uri(),
        model: "test-model".to_string(),
        api_version: "2023-06-01".to_string(),
        auth: AuthConfig::ApiKey("test-api-key".to_string()),
    };
    let request_config = RequestConfig {
        timeout_ms: 5000,
        max_retries: 0,
        retry_delay_ms: 10,
    };
    let gateway = GatewayClient::new(
        &gateway_config,
        request_config,
        Arc::new(InMemoryStore::default()),
    )
    .expect("Failed to create gateway client");

    let core = EngineCore::new(storage.clone(), gateway, settings);
    Harness {
        server,
        storage,
        interviews: InterviewService::new(core.clone()),
        respondents: RespondentService::new(core.clone()),
        campaigns: CampaignService::new(core),
    }
}

pub fn text_response(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "msg_1",
        "content": [{"type": "text", "text": text}],
        "stop_reason": "end_turn"
    }))
}

pub fn sse_response(deltas: &[&str], stop: bool) -> ResponseTemplate {
    let mut body = String::new();
    for delta in deltas {
        let event = json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "text_delta", "text": delta}
        });
        body.push_str(&format!("event: content_block_delta\ndata: {}\n\n", event));
    }
    if stop {
        body.push_str("event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n");
    }
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

/// Answer every interviewer (chat-sized) request with `text`.
pub async fn mock_chat(server: &MockServer, text: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_partial_json(json!({ "max_tokens": CHAT_MAX_TOKENS, "stream": false })))
        .respond_with(text_response(text))
        .mount(server)
        .await;
}

/// Answer the next `times` analysis-sized requests with `text`.
pub async fn mock_analysis(server: &MockServer, text: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_partial_json(json!({ "stream": false })))
        .respond_with(text_response(text))
        .up_to_n_times(times)
        .mount(server)
        .await;
}

pub fn facts_reply(facts: Value) -> String {
    format!(
        "Here is what I found:\n```json\n{}\n```",
        json!({ "facts": facts })
    )
}
