//! Unit tests for gateway wire types.

use super::*;
use crate::storage::{Role, Turn};
use chrono::Utc;
use serde_json::json;

#[test]
fn test_message_constructors() {
    let msg = Message::user("Hello");
    assert_eq!(msg.role, MessageRole::User);
    assert_eq!(msg.content, "Hello");

    let msg = Message::assistant("Hi there");
    assert_eq!(msg.role, MessageRole::Assistant);
}

#[test]
fn test_message_from_turn() {
    let turn = Turn {
        id: 3,
        session_id: "s".to_string(),
        role: Role::Assistant,
        content: "What slows you down?".to_string(),
        created_at: Utc::now(),
    };
    let msg = Message::from(&turn);
    assert_eq!(msg, Message::assistant("What slows you down?"));
}

#[test]
fn test_wire_request_shape() {
    let request = GenerationRequest::new("be brief", vec![Message::user("hi")], 1024);
    let wire = serde_json::to_value(request.to_wire("test-model", true)).unwrap();
    assert_eq!(
        wire,
        json!({
            "model": "test-model",
            "system": "be brief",
            "messages": [{"role": "user", "content": "hi"}],
            "max_tokens": 1024,
            "stream": true
        })
    );
}

#[test]
fn test_response_text_joins_text_blocks() {
    let response: MessagesResponse = serde_json::from_value(json!({
        "id": "msg_1",
        "content": [
            {"type": "text", "text": "Hello "},
            {"type": "tool_use", "id": "t1"},
            {"type": "text", "text": "world"}
        ],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 12, "output_tokens": 3}
    }))
    .unwrap();
    assert_eq!(response.text(), "Hello world");
    assert_eq!(response.stop_reason.as_deref(), Some("end_turn"));
    assert_eq!(response.usage.unwrap().output_tokens, Some(3));
}

#[test]
fn test_response_minimal() {
    let response: MessagesResponse =
        serde_json::from_value(json!({"content": []})).unwrap();
    assert_eq!(response.text(), "");
    assert!(response.usage.is_none());
}

#[test]
fn test_token_response() {
    let token: TokenResponse =
        serde_json::from_value(json!({"access_token": "at", "expires_in": 3600})).unwrap();
    assert_eq!(token.access_token, "at");
    assert_eq!(token.expires_in, Some(3600));
    assert!(token.refresh_token.is_none());
}
