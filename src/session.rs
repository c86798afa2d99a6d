//! Per-conversation session state.
//!
//! Sessions are ephemeral: created on first contact, mutated on every step,
//! reset when an add/remove cycle completes or the operator returns to the
//! menu. They never survive a restart. The store hands out one lock per
//! conversation so two messages for the same conversation can never observe
//! a half-updated pending action (messages for different conversations
//! interleave freely).

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::gateway::ConversationId;

/// The free-text mode a conversation is in after choosing Add or Remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    Add,
    Remove,
}

/// Menu position of a conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MenuState {
    #[default]
    MenuShown,
    AwaitingPersonForGenerate,
    AwaitingPersonForView,
    ViewingPersonOptions,
    AwaitingFreeText(PendingAction),
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    pub state: MenuState,
    /// Person the conversation is working on. Always set while a free-text
    /// action is pending.
    pub person: Option<i64>,
}

impl Session {
    /// Back to the main menu with nothing selected.
    pub fn reset(&mut self) {
        *self = Session::default();
    }

    pub fn pending_action(&self) -> Option<PendingAction> {
        match self.state {
            MenuState::AwaitingFreeText(action) => Some(action),
            _ => None,
        }
    }
}

/// Process-wide map from conversation id to its session.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<ConversationId, Arc<Mutex<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The session for a conversation, created on first use. Callers hold
    /// the returned lock for the whole handler run.
    pub fn session(&self, conversation: ConversationId) -> Arc<Mutex<Session>> {
        self.sessions.entry(conversation).or_default().clone()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
