//! Quick-reply extraction from interviewer replies.

use crate::prompts::{default_choices, Locale, CHOICES_CLOSE, CHOICES_OPEN};

/// What to offer when a reply carries no usable choice block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceFallback {
    Empty,
    Localized(Locale),
}

impl ChoiceFallback {
    pub fn choices(&self) -> Vec<String> {
        match self {
            ChoiceFallback::Empty => Vec::new(),
            ChoiceFallback::Localized(locale) => default_choices(*locale),
        }
    }
}

/// A reply split into the human-facing text and its quick replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedReply {
    pub text: String,
    pub choices: Vec<String>,
}

/// Split a `[CHOICES] ... [/CHOICES]` block off `reply`. Never fails.
///
/// An unterminated block is cut from the text and treated as absent.
pub fn extract_choices(reply: &str, fallback: ChoiceFallback) -> ExtractedReply {
    let Some(open) = reply.find(CHOICES_OPEN) else {
        return ExtractedReply {
            text: reply.trim().to_string(),
            choices: fallback.choices(),
        };
    };

    let inner_start = open + CHOICES_OPEN.len();
    let Some(close_offset) = reply[inner_start..].find(CHOICES_CLOSE) else {
        return ExtractedReply {
            text: reply[..open].trim().to_string(),
            choices: fallback.choices(),
        };
    };
    let close = inner_start + close_offset;

    let choices: Vec<String> = reply[inner_start..close]
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    let before = reply[..open].trim_end();
    let after = reply[close + CHOICES_CLOSE.len()..].trim_start();
    let text = match (before.is_empty(), after.is_empty()) {
        (_, true) => before.to_string(),
        (true, false) => after.to_string(),
        (false, false) => format!("{}\n{}", before, after),
    };

    ExtractedReply {
        text: text.trim().to_string(),
        choices: if choices.is_empty() {
            fallback.choices()
        } else {
            choices
        },
    }
}
