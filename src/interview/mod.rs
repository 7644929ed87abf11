//! Interview engine.
//!
//! - [`InterviewService`]: owner operations (sessions, chat, stages, sharing)
//! - [`RespondentService`]: share-token operations
//! - [`Conversation`]: turn-taking with the interviewer, atomic or streamed
//!
//! Services share [`EngineCore`] for storage, gateway and settings.

mod choices;
mod conversation;
mod core;
mod respondent;
mod session;
pub mod state;
mod stream;
mod turns;
mod validation;

pub use choices::{extract_choices, ChoiceFallback, ExtractedReply};
pub use conversation::{Audience, ChatReply, Conversation, StartReply};
pub use self::core::{caller_identity, Access, EngineCore};
pub use respondent::{CompletionReply, RespondentService, RespondentView};
pub use session::{InterviewService, ShareLink};
pub use stream::{ChatEvent, VisibleText};
pub use turns::{
    chat_request, is_ready, needs_closing, strip_sentinel, CHAT_MAX_TOKENS, CLOSING_TURN,
    FORCED_COMPLETION_TURN,
};
pub use validation::{
    non_blank, Validator, FEEDBACK_MAX_CHARS, MESSAGE_MAX_CHARS, NAME_MAX_CHARS, THEME_MAX_CHARS,
};
