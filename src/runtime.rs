//! Runtime for executing conversations
//!
//! The [`SessionRegistry`] holds at most one live conversation per user. Each
//! user's slot sits behind its own async mutex, so two updates from the same
//! user never interleave while different users proceed in parallel. The
//! [`ConversationRuntime`] drives a locked slot through the state machine.

mod executor;
mod lanes;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::ConversationRuntime;
pub use lanes::LaneManager;
pub use traits::*;

use crate::messenger::{ChatId, MessageRef, Reply, UserId};
use crate::state_machine::Conversation;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// One user's slot in the registry
#[derive(Debug, Default)]
pub struct Session {
    conversation: Option<Conversation>,
}

impl Session {
    pub fn conversation(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.conversation.is_some()
    }

    pub(crate) fn conversation_mut(&mut self) -> Option<&mut Conversation> {
        self.conversation.as_mut()
    }

    /// Install `conversation`, returning the one it replaces
    pub(crate) fn install(&mut self, conversation: Conversation) -> Option<Conversation> {
        self.conversation.replace(conversation)
    }

    pub(crate) fn take(&mut self) -> Option<Conversation> {
        self.conversation.take()
    }
}

/// Exclusive access to a user's slot
pub type SessionGuard = OwnedMutexGuard<Session>;

/// Per-user conversation slots
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<UserId, Arc<Mutex<Session>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock a user's slot, creating it on first use. Waits while another
    /// update for the same user holds it.
    pub async fn lock(&self, user_id: UserId) -> SessionGuard {
        let existing = self.sessions.read().await.get(&user_id).cloned();
        let slot = match existing {
            Some(slot) => slot,
            None => self
                .sessions
                .write()
                .await
                .entry(user_id)
                .or_default()
                .clone(),
        };
        slot.lock_owned().await
    }

    /// Snapshot of a user's active conversation
    #[allow(dead_code)] // Used by tests
    pub async fn get(&self, user_id: UserId) -> Option<Conversation> {
        let slot = self.sessions.read().await.get(&user_id).cloned()?;
        let session = slot.lock().await;
        session.conversation().cloned()
    }

    /// Number of users with a live conversation. Slots busy handling an
    /// update are counted as active.
    pub async fn active_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .filter(|slot| slot.try_lock().map_or(true, |session| session.is_active()))
            .count()
    }

    /// Remove conversations idle for at least `max_idle` and drop empty slots
    /// nobody is waiting on. Slots locked by an in-flight update are skipped.
    pub async fn reap_idle(&self, max_idle: Duration) -> Vec<Conversation> {
        let mut expired = Vec::new();
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, slot| {
            let Ok(mut session) = slot.try_lock() else {
                return true;
            };
            let idle = session
                .conversation()
                .is_some_and(|c| c.last_activity.elapsed() >= max_idle);
            if idle {
                if let Some(conversation) = session.take() {
                    expired.push(conversation);
                }
            }
            session.is_active() || Arc::strong_count(slot) > 1
        });
        expired
    }
}

/// Destination for the replies produced by one inbound update. The first
/// reply to a button press replaces the pressed message; later ones are sent
/// as new messages.
#[derive(Debug)]
pub struct Outbox {
    chat_id: ChatId,
    edit_target: Option<MessageRef>,
    delivered: usize,
}

impl Outbox {
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            edit_target: None,
            delivered: 0,
        }
    }

    pub fn editing(chat_id: ChatId, message: Option<MessageRef>) -> Self {
        Self {
            chat_id,
            edit_target: message,
            delivered: 0,
        }
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    /// Replies successfully handed to the transport
    #[allow(dead_code)] // Used by tests
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    pub async fn deliver<M: Messenger + ?Sized>(&mut self, messenger: &M, reply: Reply) {
        let result = match self.edit_target.take() {
            Some(message) => messenger.edit_or_replace(message, &reply).await,
            None => messenger.send(self.chat_id, &reply).await,
        };
        match result {
            Ok(_) => self.delivered += 1,
            Err(e) => {
                tracing::warn!(chat_id = %self.chat_id, error = %e, "Failed to deliver reply");
            }
        }
    }
}

/// Periodically expire idle conversations and tell their users
pub fn spawn_reaper<C, M>(
    registry: Arc<SessionRegistry>,
    runtime: ConversationRuntime<C, M>,
    max_idle: Duration,
    sweep_every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    C: CatalogStore + 'static,
    M: Messenger + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(?max_idle, ?sweep_every, "Idle reaper started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let expired = registry.reap_idle(max_idle).await;
                    if !expired.is_empty() {
                        tracing::info!(count = expired.len(), "Reaped idle conversations");
                        runtime.notify_expired(expired).await;
                    }
                }
            }
        }

        tracing::info!("Idle reaper stopped");
    })
}
