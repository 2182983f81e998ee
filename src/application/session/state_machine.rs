//! Conversation state machine.
//!
//! Drives one connection's conversation through
//! `Idle → Active → Ending → Ended → Idle`, performing the storage and
//! responder calls each transition needs and emitting the resulting frames.
//!
//! Every transition runs with the connection's transition lock held, so
//! transitions of one connection never interleave. `start` additionally
//! holds a per-user lock, which keeps two connections of the same user from
//! both opening a conversation. Closing is guarded in storage
//! (`close_if_open`), so an `end` racing a timeout on another connection
//! still closes the conversation once.

use std::collections::HashMap;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::domain::conversation::{
    Closure, Conversation, Message, Persona, ScenarioTag, Sender, SessionPhase,
};
use crate::domain::foundation::{ConversationId, DomainError, StateMachine, Timestamp, UserId};
use crate::ports::{ConversationRepository, ReplyRequest, Responder, ResponderError};

use super::connection::{ActiveConversation, Connection, ConversationSlot};
use super::errors::SessionError;
use super::protocol::ServerMessage;

const START_FAILED: &str = "Failed to start conversation";
const MESSAGE_FAILED: &str = "Failed to process message";
const END_FAILED: &str = "Failed to end conversation";
const SWEEP_FAILED: &str = "Failed to sweep abandoned conversations";

const ALREADY_ACTIVE: &str = "You already have an active conversation. Please end it first.";
const NO_ACTIVE: &str = "No active conversation";
const ALREADY_ENDED: &str = "Conversation has already ended";
const EMPTY_CONTENT: &str = "Message content must not be empty";

/// Why a conversation is being finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The user sent `end`.
    Requested,
    /// The inactivity reaper fired.
    Inactivity,
}

impl EndReason {
    fn failure_context(self) -> &'static str {
        match self {
            EndReason::Requested => END_FAILED,
            EndReason::Inactivity => "Failed to end inactive conversation",
        }
    }
}

/// Performs conversation transitions for connections.
pub struct ConversationStateMachine {
    repository: Arc<dyn ConversationRepository>,
    responder: Arc<dyn Responder>,
    collaborator_timeout: Duration,
    start_locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl ConversationStateMachine {
    pub fn new(
        repository: Arc<dyn ConversationRepository>,
        responder: Arc<dyn Responder>,
        collaborator_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            responder,
            collaborator_timeout,
            start_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn repository(&self) -> &Arc<dyn ConversationRepository> {
        &self.repository
    }

    // === Transitions ===

    /// `Idle --start--> Active`.
    ///
    /// Any conversation the user still has open (from an earlier connection)
    /// is auto-closed first.
    pub async fn start(
        &self,
        conn: &Connection,
        scenario: Option<ScenarioTag>,
    ) -> Result<(), SessionError> {
        let mut slot = conn.lock_slot().await;
        if !slot.phase.can_start() {
            return Err(SessionError::state(ALREADY_ACTIVE));
        }

        let user_lock = self.start_lock(conn.user_id()).await;
        let result = {
            let _held = user_lock.lock().await;
            self.open_conversation(conn, &mut slot, scenario).await
        };
        self.release_start_lock(conn.user_id(), user_lock).await;
        result
    }

    /// `Active --message--> Active`.
    pub async fn user_message(&self, conn: &Connection, content: String) -> Result<(), SessionError> {
        if content.trim().is_empty() {
            return Err(SessionError::protocol(EMPTY_CONTENT));
        }

        let mut slot = conn.lock_slot().await;
        if !slot.phase.accepts_user_input() {
            return Err(SessionError::state(NO_ACTIVE));
        }
        let active = active_conversation(&slot)?;

        let stored = self
            .storage(MESSAGE_FAILED, self.repository.find_by_id(&active.id))
            .await?;
        match stored {
            None => {
                self.detach(conn, &mut slot).await;
                return Err(SessionError::state("Conversation not found"));
            }
            Some(conversation) if conversation.user_id() != conn.user_id() => {
                tracing::error!(
                    connection_id = %conn.id(),
                    user_id = %conn.user_id(),
                    conversation_id = %active.id,
                    owner = %conversation.user_id(),
                    "Connection bound to a conversation of another user"
                );
                self.detach(conn, &mut slot).await;
                return Err(SessionError::invariant("conversation owner mismatch"));
            }
            Some(conversation) if !conversation.is_open() => {
                self.detach(conn, &mut slot).await;
                return Err(SessionError::state(ALREADY_ENDED));
            }
            Some(_) => {}
        }

        let mut history = self
            .storage(MESSAGE_FAILED, self.repository.list_messages(&active.id))
            .await?;
        let user_message = self
            .append(&mut slot, Sender::User, &content, MESSAGE_FAILED)
            .await?;
        history.push(user_message);

        conn.send(ServerMessage::ai_typing(true));
        let reply = self
            .respond(
                MESSAGE_FAILED,
                self.responder.generate(ReplyRequest {
                    user_message: content,
                    history,
                    scenario: active.scenario.clone(),
                }),
            )
            .await;
        conn.send(ServerMessage::ai_typing(false));
        let reply = reply?;

        let reply = self
            .append(&mut slot, Sender::Responder, &reply, MESSAGE_FAILED)
            .await?;
        conn.send(ServerMessage::ai_message(&reply.content, &reply.timestamp));

        tracing::debug!(
            connection_id = %conn.id(),
            conversation_id = %active.id,
            "Exchange completed"
        );
        Ok(())
    }

    /// `Active --end--> Ended → Idle`.
    pub async fn end(&self, conn: &Connection) -> Result<(), SessionError> {
        let mut slot = conn.lock_slot().await;
        if slot.phase != SessionPhase::Active {
            return Err(SessionError::state(NO_ACTIVE));
        }
        if self.finish(conn, &mut slot, EndReason::Requested).await? {
            Ok(())
        } else {
            Err(SessionError::state(ALREADY_ENDED))
        }
    }

    /// `Active --timeout--> Ended → Idle`, if the connection has been idle
    /// longer than `idle_threshold`.
    ///
    /// Returns whether this call ended the conversation. Re-checks phase
    /// and idleness under the transition lock, so overlapping sweeps and a
    /// concurrent `end` make it a no-op.
    pub async fn timeout(
        &self,
        conn: &Connection,
        idle_threshold: Duration,
    ) -> Result<bool, SessionError> {
        let mut slot = conn.lock_slot().await;
        if slot.phase != SessionPhase::Active {
            return Ok(false);
        }
        if conn.idle_for().await <= idle_threshold {
            return Ok(false);
        }
        self.finish(conn, &mut slot, EndReason::Inactivity).await
    }

    /// Ends `id` through `conn` if that is the conversation it is in,
    /// exactly as an `end` frame would. Returns false when it is not.
    pub async fn end_if_bound(
        &self,
        conn: &Connection,
        id: &ConversationId,
    ) -> Result<bool, SessionError> {
        let mut slot = conn.lock_slot().await;
        let bound = slot.phase == SessionPhase::Active
            && slot.conversation.as_ref().is_some_and(|c| c.id == *id);
        if !bound {
            return Ok(false);
        }
        if self.finish(conn, &mut slot, EndReason::Requested).await? {
            Ok(true)
        } else {
            Err(SessionError::state(ALREADY_ENDED))
        }
    }

    /// Summarizes and closes a conversation no live connection is in.
    ///
    /// No frames are sent and no closing line is added.
    pub async fn end_detached(&self, conversation: &Conversation) -> Result<(), SessionError> {
        if !conversation.is_open() {
            return Err(SessionError::state(ALREADY_ENDED));
        }
        let id = conversation.id();

        let transcript = self
            .storage(END_FAILED, self.repository.list_messages(&id))
            .await?;
        let summary = self
            .respond(END_FAILED, self.responder.summarize(&transcript))
            .await?;
        let closed = self
            .storage(
                END_FAILED,
                self.repository
                    .close_if_open(&id, Timestamp::now(), &Closure::Completed(summary)),
            )
            .await?;
        if !closed {
            return Err(SessionError::state(ALREADY_ENDED));
        }

        tracing::info!(
            user_id = %conversation.user_id(),
            conversation_id = %id,
            message_count = transcript.len(),
            "Conversation ended outside a session"
        );
        Ok(())
    }

    /// Open conversations with no message since `cutoff`, oldest first.
    pub async fn idle_open_conversations(
        &self,
        cutoff: Timestamp,
        limit: u32,
    ) -> Result<Vec<Conversation>, SessionError> {
        self.storage(SWEEP_FAILED, self.repository.list_idle_open(cutoff, limit))
            .await
    }

    /// Closes a conversation left open with no session attached.
    pub async fn close_abandoned(&self, id: &ConversationId) -> Result<bool, SessionError> {
        self.storage(
            SWEEP_FAILED,
            self.repository
                .close_if_open(id, Timestamp::now(), &Closure::Abandoned),
        )
        .await
    }

    // === Steps ===

    async fn open_conversation(
        &self,
        conn: &Connection,
        slot: &mut ConversationSlot,
        scenario: Option<ScenarioTag>,
    ) -> Result<(), SessionError> {
        let user_id = conn.user_id();
        let now = Timestamp::now();

        if let Some(stale) = self
            .storage(START_FAILED, self.repository.find_open_for_user(user_id))
            .await?
        {
            let closed = self
                .storage(
                    START_FAILED,
                    self.repository
                        .close_if_open(&stale.id(), now, &Closure::AutoClosed),
                )
                .await?;
            if closed {
                tracing::info!(
                    user_id = %user_id,
                    conversation_id = %stale.id(),
                    "Auto-closed conversation left open by an earlier session"
                );
            }
        }

        let next_phase = slot
            .phase
            .transition_to(SessionPhase::Active)
            .map_err(|e| SessionError::invariant(e.to_string()))?;

        let conversation = Conversation::start(user_id.clone(), scenario.clone(), now);
        self.storage(START_FAILED, self.repository.create(&conversation))
            .await?;

        // Stored before the slot or the client learn of the conversation.
        let opening = Message::from_responder(
            conversation.id(),
            Persona::for_scenario(scenario.as_ref()).opening_line(),
            Timestamp::now_after(Some(&now)),
        );
        if let Err(error) = self
            .storage(START_FAILED, self.repository.append_message(&opening))
            .await
        {
            self.abort_start(&conversation).await;
            return Err(error);
        }

        slot.phase = next_phase;
        slot.conversation = Some(ActiveConversation {
            id: conversation.id(),
            scenario: scenario.clone(),
            last_message_at: Some(opening.timestamp),
            closing_sent: false,
        });
        conn.publish_conversation(Some(conversation.id())).await;
        conn.touch_activity().await;

        conn.send(ServerMessage::conversation_started(
            conversation.id(),
            scenario.as_ref().map(ScenarioTag::as_str),
        ));
        conn.send(ServerMessage::ai_message(&opening.content, &opening.timestamp));

        tracing::info!(
            user_id = %user_id,
            connection_id = %conn.id(),
            conversation_id = %conversation.id(),
            scenario = scenario.as_ref().map(ScenarioTag::as_str).unwrap_or("none"),
            "Conversation started"
        );
        Ok(())
    }

    /// Closes a row whose opening line could not be stored.
    ///
    /// Best effort: if this fails too, the next `start` auto-closes it.
    async fn abort_start(&self, conversation: &Conversation) {
        let closed = self
            .storage(
                START_FAILED,
                self.repository.close_if_open(
                    &conversation.id(),
                    Timestamp::now(),
                    &Closure::StartAborted,
                ),
            )
            .await;
        if let Err(e) = closed {
            tracing::warn!(
                user_id = %conversation.user_id(),
                conversation_id = %conversation.id(),
                error = %e,
                "Could not close conversation after failed start"
            );
        }
    }

    /// Closing line, summary, guarded close, final frame.
    ///
    /// Returns false when the conversation turned out to be closed already;
    /// the slot is released either way.
    async fn finish(
        &self,
        conn: &Connection,
        slot: &mut ConversationSlot,
        reason: EndReason,
    ) -> Result<bool, SessionError> {
        let context = reason.failure_context();
        let active = active_conversation(slot)?;

        let stored = self
            .storage(context, self.repository.find_by_id(&active.id))
            .await?;
        if !stored.as_ref().is_some_and(Conversation::is_open) {
            self.detach(conn, slot).await;
            return Ok(false);
        }

        let mut slot = EndingGuard::enter(slot)?;

        if !active.closing_sent {
            let closing = Persona::for_scenario(active.scenario.as_ref()).closing_line();
            let closing = self
                .append(&mut slot, Sender::Responder, closing, context)
                .await?;
            if let Some(current) = slot.conversation.as_mut() {
                current.closing_sent = true;
            }
            conn.send(ServerMessage::ai_message(&closing.content, &closing.timestamp));
        }

        let transcript = self
            .storage(context, self.repository.list_messages(&active.id))
            .await?;
        let summary = self
            .respond(context, self.responder.summarize(&transcript))
            .await?;

        let closure = match reason {
            EndReason::Requested => Closure::Completed(summary.clone()),
            EndReason::Inactivity => Closure::TimedOut(summary.clone()),
        };
        let closed = self
            .storage(
                context,
                self.repository
                    .close_if_open(&active.id, Timestamp::now(), &closure),
            )
            .await?;

        slot.complete();
        conn.publish_conversation(None).await;

        if !closed {
            tracing::info!(
                connection_id = %conn.id(),
                conversation_id = %active.id,
                "Conversation was closed elsewhere before this end completed"
            );
            return Ok(false);
        }

        let frame = match reason {
            EndReason::Requested => ServerMessage::conversation_ended(
                summary.summary,
                summary.feedback,
                transcript.len(),
            ),
            EndReason::Inactivity => {
                ServerMessage::conversation_timeout(summary.summary, summary.feedback)
            }
        };
        conn.send(frame);

        tracing::info!(
            user_id = %conn.user_id(),
            connection_id = %conn.id(),
            conversation_id = %active.id,
            reason = ?reason,
            message_count = transcript.len(),
            "Conversation ended"
        );
        Ok(true)
    }

    /// Persists a message stamped strictly after the previous one.
    async fn append(
        &self,
        slot: &mut ConversationSlot,
        sender: Sender,
        content: &str,
        context: &'static str,
    ) -> Result<Message, SessionError> {
        let active = slot
            .conversation
            .as_mut()
            .ok_or_else(|| SessionError::invariant("no conversation bound to slot"))?;

        let timestamp = Timestamp::now_after(active.last_message_at.as_ref());
        let message = Message::new(active.id, sender, content, timestamp);
        self.storage(context, self.repository.append_message(&message))
            .await?;
        active.last_message_at = Some(timestamp);
        Ok(message)
    }

    /// Drops a conversation the slot can no longer use.
    async fn detach(&self, conn: &Connection, slot: &mut ConversationSlot) {
        slot.reset();
        conn.publish_conversation(None).await;
    }

    // === Collaborator calls ===

    async fn storage<T>(
        &self,
        context: &'static str,
        call: impl Future<Output = Result<T, DomainError>>,
    ) -> Result<T, SessionError> {
        match tokio::time::timeout(self.collaborator_timeout, call).await {
            Ok(result) => result.map_err(|e| SessionError::from_storage(context, e)),
            Err(_) => Err(self.timed_out(context, "storage")),
        }
    }

    async fn respond<T>(
        &self,
        context: &'static str,
        call: impl Future<Output = Result<T, ResponderError>>,
    ) -> Result<T, SessionError> {
        match tokio::time::timeout(self.collaborator_timeout, call).await {
            Ok(result) => result.map_err(|e| SessionError::from_responder(context, e)),
            Err(_) => Err(self.timed_out(context, self.responder.name())),
        }
    }

    fn timed_out(&self, context: &'static str, collaborator: &str) -> SessionError {
        SessionError::collaborator(
            context,
            format!(
                "{} call timed out after {}ms",
                collaborator,
                self.collaborator_timeout.as_millis()
            ),
        )
    }

    // === Per-user start locks ===

    async fn start_lock(&self, user_id: &UserId) -> Arc<Mutex<()>> {
        self.start_locks
            .lock()
            .await
            .entry(user_id.clone())
            .or_default()
            .clone()
    }

    async fn release_start_lock(&self, user_id: &UserId, lock: Arc<Mutex<()>>) {
        let mut locks = self.start_locks.lock().await;
        // Only the map and this caller hold it: nobody else is waiting.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(user_id);
        }
    }
}

fn active_conversation(slot: &ConversationSlot) -> Result<ActiveConversation, SessionError> {
    slot.conversation
        .clone()
        .ok_or_else(|| SessionError::invariant("active phase without a conversation"))
}

/// Holds a slot in `Ending`. Unless completed, dropping it (on error or
/// cancellation) puts the slot back to `Active`.
struct EndingGuard<'a> {
    slot: &'a mut ConversationSlot,
    completed: bool,
}

impl<'a> EndingGuard<'a> {
    fn enter(slot: &'a mut ConversationSlot) -> Result<Self, SessionError> {
        slot.phase = slot
            .phase
            .transition_to(SessionPhase::Ending)
            .map_err(|e| SessionError::invariant(e.to_string()))?;
        Ok(Self {
            slot,
            completed: false,
        })
    }

    /// `Ending → Ended → Idle`.
    fn complete(&mut self) {
        self.slot.phase = SessionPhase::Ended;
        self.slot.reset();
        self.completed = true;
    }
}

impl Deref for EndingGuard<'_> {
    type Target = ConversationSlot;

    fn deref(&self) -> &ConversationSlot {
        self.slot
    }
}

impl DerefMut for EndingGuard<'_> {
    fn deref_mut(&mut self) -> &mut ConversationSlot {
        self.slot
    }
}

impl Drop for EndingGuard<'_> {
    fn drop(&mut self) {
        if !self.completed && self.slot.phase == SessionPhase::Ending {
            self.slot.phase = SessionPhase::Active;
        }
    }
}
