//! Tagged events of a streamed chat turn.
//!
//! A stream is `meta`, zero or more `delta`, then exactly one of `done` or
//! `error`.

use serde::Serialize;

use crate::prompts::{CHOICES_OPEN, COMPLETION_SENTINEL};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ChatEvent {
    Meta {
        turn_count: u64,
    },
    Delta {
        text: String,
    },
    Done {
        #[serde(skip_serializing_if = "Option::is_none")]
        ready_for_analysis: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_complete: Option<bool>,
        turn_count: u64,
        choices: Vec<String>,
    },
    Error {
        error: String,
    },
}

impl ChatEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatEvent::Done { .. } | ChatEvent::Error { .. })
    }
}

/// Tracks how much of a growing reply is safe to show.
///
/// The choice block and the completion sentinel are control markup, so
/// text from `[CHOICES]` on is withheld, the sentinel is dropped, and a tail
/// that could still become either marker is held back until it resolves.
#[derive(Debug, Default)]
pub struct VisibleText {
    raw: String,
    emitted: usize,
}

impl VisibleText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delta and return the newly visible text, if any.
    pub fn push(&mut self, delta: &str) -> Option<String> {
        self.raw.push_str(delta);
        let visible = visible_prefix(&self.raw);
        let fresh = visible.get(self.emitted..).filter(|s| !s.is_empty())?.to_string();
        self.emitted = visible.len();
        Some(fresh)
    }

    /// Everything received so far.
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

fn visible_prefix(raw: &str) -> String {
    let body = match raw.find(CHOICES_OPEN) {
        Some(pos) => &raw[..pos],
        None => raw,
    };
    let cleaned = body.replace(COMPLETION_SENTINEL, "");
    let hold = [CHOICES_OPEN, COMPLETION_SENTINEL]
        .iter()
        .map(|marker| pending_marker_len(&cleaned, marker))
        .max()
        .unwrap_or(0);
    cleaned[..cleaned.len() - hold].to_string()
}

/// Length of the longest proper prefix of `marker` that `text` ends with.
fn pending_marker_len(text: &str, marker: &str) -> usize {
    (1..marker.len())
        .rev()
        .find(|&k| text.ends_with(&marker[..k]))
        .unwrap_or(0)
}
