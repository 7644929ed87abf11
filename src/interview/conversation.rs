//! Turn-taking with the interviewer, shared by owner and respondent flows.

use serde::Serialize;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::choices::{extract_choices, ChoiceFallback};
use super::core::EngineCore;
use super::state::ensure_accepts_chat;
use super::stream::{ChatEvent, VisibleText};
use super::turns::{chat_request, is_ready, strip_sentinel, CHAT_MAX_TOKENS};
use crate::error::AppResult;
use crate::gateway::{GenerationRequest, Message, StreamChunk};
use crate::prompts::{interviewer_prompt, opening_request};
use crate::storage::{Role, Session, Storage};

/// Buffered events between the stream task and its consumer.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Who is talking to the interviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// The session owner; gets default quick replies and `readyForAnalysis`.
    Owner,
    /// A share/campaign token holder; gets `isComplete` and no default replies.
    Respondent,
}

/// Result of starting an interview.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartReply {
    pub already_started: bool,
    pub message: String,
    pub choices: Vec<String>,
    pub turn_count: u64,
}

/// Result of one atomic chat turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub reply: String,
    pub choices: Vec<String>,
    pub turn_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_for_analysis: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_complete: Option<bool>,
}

/// Assistant reply after markup was removed.
struct Finished {
    text: String,
    choices: Vec<String>,
    ready: bool,
}

/// Interviewer turn-taking over a session's transcript.
#[derive(Clone)]
pub struct Conversation {
    core: EngineCore,
}

impl Conversation {
    pub fn new(core: EngineCore) -> Self {
        Self { core }
    }

    fn fallback(&self, audience: Audience) -> ChoiceFallback {
        match audience {
            Audience::Owner => ChoiceFallback::Localized(self.core.settings().default_locale),
            Audience::Respondent => ChoiceFallback::Empty,
        }
    }

    /// Produce the opening question unless the interviewer already spoke.
    pub async fn start(&self, session: &Session, audience: Audience) -> AppResult<StartReply> {
        ensure_accepts_chat(session)?;
        let storage = self.core.storage();
        let turns = storage.get_turns(&session.id).await?;
        let user_turns = turns.iter().filter(|t| t.role == Role::User).count() as u64;

        if let Some(last) = turns.iter().rev().find(|t| t.role == Role::Assistant) {
            debug!(session_id = %session.id, "Interview already started");
            return Ok(StartReply {
                already_started: true,
                message: last.content.clone(),
                choices: self.fallback(audience).choices(),
                turn_count: user_turns,
            });
        }

        let locale = self.core.settings().default_locale;
        let mut messages: Vec<Message> = turns.iter().map(Message::from).collect();
        messages.push(Message::user(opening_request(locale)));
        let request = GenerationRequest::new(
            interviewer_prompt(&session.theme, locale),
            messages,
            CHAT_MAX_TOKENS,
        );

        let generation = self.core.gateway().complete(request).await?;
        let extracted = extract_choices(&generation.text, self.fallback(audience));
        let text = strip_sentinel(&extracted.text);
        storage
            .append_turn(&session.id, Role::Assistant, &text)
            .await?;

        info!(session_id = %session.id, "Interview started");
        Ok(StartReply {
            already_started: false,
            message: text,
            choices: extracted.choices,
            turn_count: user_turns,
        })
    }

    /// Persist the user's message, then generate and persist the reply.
    ///
    /// The user turn survives a failed generation, so the session can resume.
    pub async fn reply(
        &self,
        session: &Session,
        message: &str,
        audience: Audience,
    ) -> AppResult<ChatReply> {
        let (request, user_turns) = self.record_user_turn(session, message).await?;

        let start = Instant::now();
        let generation = self.core.gateway().complete(request).await?;
        let finished = self.finish(session, &generation.text, user_turns, audience).await?;

        info!(
            session_id = %session.id,
            turn_count = user_turns,
            ready = finished.ready,
            latency_ms = start.elapsed().as_millis(),
            "Chat turn completed"
        );

        let (ready_for_analysis, is_complete) = completion_flags(audience, finished.ready);
        Ok(ChatReply {
            reply: finished.text,
            choices: finished.choices,
            turn_count: user_turns,
            ready_for_analysis,
            is_complete,
        })
    }

    /// Streamed variant of [`reply`](Self::reply).
    ///
    /// Validation and precondition failures are returned directly. After
    /// that every outcome, upstream failures included, arrives as an event.
    /// The assistant turn is written only once the upstream finishes; a
    /// consumer that goes away stops receiving deltas but the turn is still
    /// completed and stored.
    pub async fn reply_stream(
        &self,
        session: &Session,
        message: &str,
        audience: Audience,
    ) -> AppResult<mpsc::Receiver<ChatEvent>> {
        let (request, user_turns) = self.record_user_turn(session, message).await?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let _ = tx
            .send(ChatEvent::Meta {
                turn_count: user_turns,
            })
            .await;

        let this = self.clone();
        let session = session.clone();
        tokio::spawn(async move {
            this.drive_stream(session, request, user_turns, audience, tx)
                .await;
        });

        Ok(rx)
    }

    async fn drive_stream(
        &self,
        session: Session,
        request: GenerationRequest,
        user_turns: u64,
        audience: Audience,
        tx: mpsc::Sender<ChatEvent>,
    ) {
        let start = Instant::now();
        let mut connected = true;

        let mut upstream = match self.core.gateway().stream(request).await {
            Ok(rx) => rx,
            Err(e) => {
                error!(session_id = %session.id, error = %e, "Failed to open chat stream");
                let _ = tx.send(ChatEvent::Error { error: e.to_string() }).await;
                return;
            }
        };

        let mut text = VisibleText::new();
        let terminal = loop {
            match upstream.recv().await {
                Some(Ok(StreamChunk::Delta(delta))) => {
                    if let Some(fresh) = text.push(&delta) {
                        if connected && tx.send(ChatEvent::Delta { text: fresh }).await.is_err() {
                            debug!(session_id = %session.id, "Stream consumer disconnected");
                            connected = false;
                        }
                    }
                }
                Some(Ok(StreamChunk::Done)) => {
                    break match self.finish(&session, text.raw(), user_turns, audience).await {
                        Ok(finished) => {
                            info!(
                                session_id = %session.id,
                                turn_count = user_turns,
                                ready = finished.ready,
                                latency_ms = start.elapsed().as_millis(),
                                "Streamed chat turn completed"
                            );
                            let (ready_for_analysis, is_complete) =
                                completion_flags(audience, finished.ready);
                            ChatEvent::Done {
                                ready_for_analysis,
                                is_complete,
                                turn_count: user_turns,
                                choices: finished.choices,
                            }
                        }
                        Err(e) => ChatEvent::Error { error: e.to_string() },
                    };
                }
                Some(Err(e)) => {
                    warn!(session_id = %session.id, error = %e, "Chat stream failed, reply discarded");
                    break ChatEvent::Error { error: e.to_string() };
                }
                None => {
                    break ChatEvent::Error {
                        error: "Stream closed unexpectedly".to_string(),
                    };
                }
            }
        };

        if connected {
            let _ = tx.send(terminal).await;
        }
    }

    async fn record_user_turn(
        &self,
        session: &Session,
        message: &str,
    ) -> AppResult<(GenerationRequest, u64)> {
        ensure_accepts_chat(session)?;
        let storage = self.core.storage();
        storage
            .append_turn(&session.id, Role::User, message.trim())
            .await?;

        let history = storage.get_turns(&session.id).await?;
        let user_turns = history.iter().filter(|t| t.role == Role::User).count() as u64;
        let request = chat_request(
            &session.theme,
            self.core.settings().default_locale,
            &history,
            user_turns,
        );
        Ok((request, user_turns))
    }

    async fn finish(
        &self,
        session: &Session,
        raw: &str,
        user_turns: u64,
        audience: Audience,
    ) -> AppResult<Finished> {
        let ready = is_ready(raw, user_turns);
        let extracted = extract_choices(raw, self.fallback(audience));
        let text = strip_sentinel(&extracted.text);
        self.core
            .storage()
            .append_turn(&session.id, Role::Assistant, &text)
            .await?;
        Ok(Finished {
            text,
            choices: extracted.choices,
            ready,
        })
    }
}

fn completion_flags(audience: Audience, ready: bool) -> (Option<bool>, Option<bool>) {
    match audience {
        Audience::Owner => (Some(ready), None),
        Audience::Respondent => (None, Some(ready)),
    }
}
