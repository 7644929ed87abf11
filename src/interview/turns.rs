//! Turn-count policy and chat request assembly.

use crate::gateway::{GenerationRequest, Message};
use crate::prompts::{closing_instruction, interviewer_prompt, Locale, COMPLETION_SENTINEL};
use crate::storage::Turn;

/// User turn from which the interviewer is asked to wrap up.
pub const CLOSING_TURN: u64 = 5;

/// User turn at which the interview is complete regardless of the sentinel.
pub const FORCED_COMPLETION_TURN: u64 = 8;

/// Output budget of one interviewer reply.
pub const CHAT_MAX_TOKENS: u32 = 1024;

pub fn needs_closing(user_turns: u64) -> bool {
    user_turns >= CLOSING_TURN
}

/// Whether the interview can close after this reply.
pub fn is_ready(raw_reply: &str, user_turns: u64) -> bool {
    raw_reply.contains(COMPLETION_SENTINEL) || user_turns >= FORCED_COMPLETION_TURN
}

/// Remove the completion marker from the visible reply.
pub fn strip_sentinel(text: &str) -> String {
    text.replace(COMPLETION_SENTINEL, "").trim().to_string()
}

/// Build the interviewer request for the given history.
pub fn chat_request(theme: &str, locale: Locale, history: &[Turn], user_turns: u64) -> GenerationRequest {
    let mut system = interviewer_prompt(theme, locale);
    if needs_closing(user_turns) {
        system.push_str("\n\n");
        system.push_str(&closing_instruction(locale));
    }
    let messages = history.iter().map(Message::from).collect();
    GenerationRequest::new(system, messages, CHAT_MAX_TOKENS)
}
