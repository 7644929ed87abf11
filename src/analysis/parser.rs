//! Tolerant extraction of stage payloads from free-form model replies.
//!
//! Parsing never fails: a reply that carries no readable structure becomes
//! [`StagePayload::fallback`].

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use super::payload::{body_key, StagePayload};
use crate::storage::Stage;

/// Opening brackets tried before giving up on a reply.
const MAX_CANDIDATES: usize = 16;

/// Find the first balanced `{...}` or `[...]` block that is valid JSON.
///
/// Brackets inside string literals are ignored, so prose such as
/// `Here you go: {"a": "}"}` or a fenced code block is handled. At most
/// [`MAX_CANDIDATES`] opening brackets are tried, which bounds the scan to a
/// fixed number of passes over the reply.
pub fn extract_structured_block(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut start = 0;

    for _ in 0..MAX_CANDIDATES {
        let offset = bytes[start..].iter().position(|b| *b == b'{' || *b == b'[')?;
        let open = start + offset;
        if let Some(close) = balanced_end(bytes, open) {
            let candidate = &text[open..=close];
            if serde_json::from_str::<Value>(candidate).is_ok() {
                return Some(candidate);
            }
        }
        start = open + 1;
    }
    None
}

/// Index of the bracket closing the one at `open`, if the nesting balances.
fn balanced_end(bytes: &[u8], open: usize) -> Option<usize> {
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.pop() != Some(b) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a stage payload out of `reply`, degrading to the stage fallback.
pub fn parse_payload(stage: Stage, reply: &str) -> StagePayload {
    let parsed = extract_structured_block(reply)
        .ok_or_else(|| "no JSON block found".to_string())
        .and_then(|block| {
            let value: Value = serde_json::from_str(block).map_err(|e| e.to_string())?;
            read_payload(stage, value).map_err(|e| e.to_string())
        });

    match parsed {
        Ok(payload) => payload,
        Err(reason) => {
            warn!(
                stage = %stage,
                reason = %reason,
                preview = %reply.chars().take(100).collect::<String>(),
                "Stage reply did not match schema, storing fallback"
            );
            StagePayload::fallback(stage, reply)
        }
    }
}

/// Strictly read `value` as the payload of `stage`.
///
/// Accepts the keyed wrapper (`{"facts": [...]}`) as well as the bare body
/// (`[...]` for list stages, the document itself for the others).
fn read_payload(stage: Stage, value: Value) -> Result<StagePayload, serde_json::Error> {
    let body = unwrap_key(stage, value);
    Ok(match stage {
        Stage::Facts => StagePayload::Facts(non_empty(from(body)?)?),
        Stage::Hypotheses => StagePayload::Hypotheses(non_empty(from(body)?)?),
        Stage::Prd => StagePayload::Prd(from(body)?),
        Stage::Spec => StagePayload::Spec(from(body)?),
        Stage::Readiness => {
            let body = match body {
                Value::Array(categories) => serde_json::json!({ "categories": categories }),
                other => other,
            };
            StagePayload::Readiness(from(body)?)
        }
        Stage::CampaignAnalytics => StagePayload::CampaignAnalytics(from(body)?),
    })
}

fn unwrap_key(stage: Stage, value: Value) -> Value {
    match value {
        Value::Object(mut obj) if obj.contains_key(body_key(stage)) => obj
            .remove(body_key(stage))
            .unwrap_or(Value::Null),
        other => other,
    }
}

fn from<T: DeserializeOwned>(value: Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(value)
}

fn non_empty<T>(items: Vec<T>) -> Result<Vec<T>, serde_json::Error> {
    if items.is_empty() {
        return Err(serde::de::Error::custom("empty list"));
    }
    Ok(items)
}
