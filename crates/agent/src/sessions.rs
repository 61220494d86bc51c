//! Live conversations keyed by session id.
//!
//! Turns for one session run one at a time behind that session's lock, so a
//! turn never starts while the previous one is still waiting on an authority.
//! The cancel flag sits outside the lock and can be raised mid-call.
//! Conversations that ended are kept for a retention window so late cancels
//! and state reads still resolve, then swept when the next session opens.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use deploydesk_core::domain::session::SessionId;
use deploydesk_core::errors::ApplicationError;
use deploydesk_core::flows::{Conversation, DialogueState, TurnEvent};
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::conversation::TurnParser;
use crate::render::TurnReply;
use crate::runtime::{CancelFlag, DialogueRuntime};

pub const DEFAULT_ENDED_SESSION_RETENTION: Duration = Duration::from_secs(15 * 60);

struct SessionHandle {
    conversation: Mutex<Conversation>,
    cancel: CancelFlag,
    ended_at: std::sync::Mutex<Option<Instant>>,
}

impl SessionHandle {
    fn mark_if_ended(&self, reply: &TurnReply) {
        if !reply.next_state.is_terminal() {
            return;
        }
        if let Ok(mut ended_at) = self.ended_at.lock() {
            ended_at.get_or_insert_with(Instant::now);
        }
    }

    fn expired(&self, retention: Duration) -> bool {
        self.ended_at
            .lock()
            .ok()
            .and_then(|ended_at| *ended_at)
            .is_some_and(|ended_at| ended_at.elapsed() >= retention)
    }
}

pub struct SessionRegistry {
    runtime: Arc<DialogueRuntime>,
    parser: TurnParser,
    sessions: RwLock<HashMap<SessionId, Arc<SessionHandle>>>,
    retention: Duration,
}

impl SessionRegistry {
    pub fn new(runtime: Arc<DialogueRuntime>) -> Self {
        Self::with_retention(runtime, DEFAULT_ENDED_SESSION_RETENTION)
    }

    /// Ended conversations older than `retention` are dropped on the next open.
    pub fn with_retention(runtime: Arc<DialogueRuntime>, retention: Duration) -> Self {
        Self {
            runtime,
            parser: TurnParser::new(),
            sessions: RwLock::new(HashMap::new()),
            retention,
        }
    }

    pub fn runtime(&self) -> &DialogueRuntime {
        &self.runtime
    }

    /// Starts a fresh conversation and returns its greeting.
    pub async fn open(&self, correlation_id: &str) -> TurnReply {
        let session_id = SessionId::generate();
        let conversation = Conversation::new(session_id.clone());
        let reply = self.runtime.open(&conversation);

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, handle| !handle.expired(self.retention));
        let swept = before - sessions.len();
        sessions.insert(
            session_id.clone(),
            Arc::new(SessionHandle {
                conversation: Mutex::new(conversation),
                cancel: CancelFlag::default(),
                ended_at: std::sync::Mutex::new(None),
            }),
        );
        drop(sessions);

        info!(
            event_name = "dialogue.session.opened",
            correlation_id,
            session_id = %session_id,
            swept_ended_sessions = swept,
            "session opened"
        );
        reply
    }

    pub async fn submit(
        &self,
        session_id: &SessionId,
        event: TurnEvent,
        correlation_id: &str,
    ) -> Result<TurnReply, ApplicationError> {
        let handle = self.handle(session_id).await?;
        if event == TurnEvent::CancelRequested {
            handle.cancel.raise();
        }

        let mut conversation = handle.conversation.lock().await;
        let reply = self
            .runtime
            .handle_turn(&mut conversation, event, &handle.cancel, correlation_id)
            .await?;
        handle.mark_if_ended(&reply);
        Ok(reply)
    }

    /// Reads a free-text message and runs the resulting event, if any.
    pub async fn submit_text(
        &self,
        session_id: &SessionId,
        text: &str,
        correlation_id: &str,
    ) -> Result<TurnReply, ApplicationError> {
        let handle = self.handle(session_id).await?;
        let mut conversation = handle.conversation.lock().await;
        let parsed = self.parser.parse(text, conversation.state());

        let Some(event) = parsed.event else {
            let prompt = parsed
                .clarification_prompt
                .unwrap_or_else(|| "Could you rephrase that?".to_string());
            return Ok(self.runtime.renderer().clarification(
                session_id,
                conversation.state(),
                prompt,
            ));
        };

        if event == TurnEvent::CancelRequested {
            handle.cancel.raise();
        }
        let reply = self
            .runtime
            .handle_turn(&mut conversation, event, &handle.cancel, correlation_id)
            .await?;
        handle.mark_if_ended(&reply);
        Ok(reply)
    }

    /// Raises the abort flag without waiting for an in-flight turn, then
    /// records the cancellation once the session is free.
    pub async fn cancel(
        &self,
        session_id: &SessionId,
        correlation_id: &str,
    ) -> Result<TurnReply, ApplicationError> {
        self.submit(session_id, TurnEvent::CancelRequested, correlation_id).await
    }

    pub async fn state(&self, session_id: &SessionId) -> Result<DialogueState, ApplicationError> {
        let handle = self.handle(session_id).await?;
        let conversation = handle.conversation.lock().await;
        Ok(conversation.state())
    }

    pub async fn close(&self, session_id: &SessionId) -> bool {
        let removed = self.sessions.write().await.remove(session_id);
        if let Some(handle) = removed.as_ref() {
            handle.cancel.raise();
        }
        removed.is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    async fn handle(&self, session_id: &SessionId) -> Result<Arc<SessionHandle>, ApplicationError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| ApplicationError::SessionNotFound(session_id.to_string()))
    }
}
