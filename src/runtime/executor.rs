//! Conversation runtime executor

use super::traits::{CatalogError, CatalogStore, Messenger};
use super::{Outbox, Session};

use crate::db::NewItem;
use crate::messenger::{ChatId, Reply, UserId};
use crate::render;
use crate::state_machine::{
    enter, prompt, transition, Applied, Commit, CommitOutcome, ConvContext, Conversation, Effect,
    Event, FlowEntry, PromptKind,
};
use std::sync::Arc;

/// Drives conversations held in registry slots. Generic over the store and
/// transport so tests can substitute recording mocks.
pub struct ConversationRuntime<C, M>
where
    C: CatalogStore + 'static,
    M: Messenger + 'static,
{
    catalog: Arc<C>,
    messenger: Arc<M>,
}

impl<C, M> Clone for ConversationRuntime<C, M>
where
    C: CatalogStore + 'static,
    M: Messenger + 'static,
{
    fn clone(&self) -> Self {
        Self {
            catalog: self.catalog.clone(),
            messenger: self.messenger.clone(),
        }
    }
}

impl<C, M> ConversationRuntime<C, M>
where
    C: CatalogStore + 'static,
    M: Messenger + 'static,
{
    pub fn new(catalog: Arc<C>, messenger: Arc<M>) -> Self {
        Self { catalog, messenger }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn messenger(&self) -> &M {
        &self.messenger
    }

    /// Install a fresh conversation in `session` and send its first prompt.
    /// Any active conversation is discarded without writing anything and is
    /// returned.
    pub async fn start(
        &self,
        session: &mut Session,
        user_id: UserId,
        chat_id: ChatId,
        entry: FlowEntry,
        outbox: &mut Outbox,
    ) -> Option<Conversation> {
        let kind = entry.kind();
        let result = enter(entry);
        let conversation = Conversation::new(user_id, chat_id, kind, result.new_state);
        let write_key = conversation.write_key.clone();
        let superseded = session.install(conversation);

        match &superseded {
            Some(old) => tracing::info!(
                user_id = %user_id,
                old_flow = %old.flow,
                old_state = old.state.name(),
                flow = %kind,
                "Superseding active conversation"
            ),
            None => tracing::info!(user_id = %user_id, flow = %kind, "Starting conversation"),
        }

        let context = ConvContext::new(user_id);
        for effect in result.effects {
            // Entry effects are prompts only
            let _ = self.execute_effect(effect, &context, &write_key, outbox).await;
        }

        superseded
    }

    /// Feed `event` to the user's active conversation. Returns the
    /// conversation if it is still live afterwards; a finished conversation
    /// is removed from `session`.
    pub async fn advance(
        &self,
        session: &mut Session,
        event: Event,
        outbox: &mut Outbox,
    ) -> Option<Conversation> {
        let Some(conversation) = session.conversation_mut() else {
            tracing::debug!(chat_id = %outbox.chat_id(), "No active conversation to advance");
            return None;
        };
        conversation.touch();
        let context = ConvContext::new(conversation.user_id);

        // Commits feed their outcome back in, so process events in a loop
        let mut events_to_process = vec![event];

        while let Some(current_event) = events_to_process.pop() {
            let result = match transition(&conversation.state, &context, current_event) {
                Ok(r) => r,
                Err(e) if e.is_user_error() => {
                    // State is unchanged; explain and ask again
                    let notice = format!("⚠️ {e}");
                    let reply = match prompt(&conversation.state, Some(&notice)) {
                        Some(Effect::Prompt { text, kind }) => self.prompt_reply(text, kind).await,
                        _ => Reply::text(notice),
                    };
                    outbox.deliver(self.messenger.as_ref(), reply).await;
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        user_id = %context.user_id,
                        state = conversation.state.name(),
                        error = %e,
                        "Transition rejected"
                    );
                    break;
                }
            };

            let old_state = std::mem::replace(&mut conversation.state, result.new_state);
            tracing::debug!(
                user_id = %context.user_id,
                from = old_state.name(),
                to = conversation.state.name(),
                "State transition"
            );

            for effect in result.effects {
                let generated = self
                    .execute_effect(effect, &context, &conversation.write_key, outbox)
                    .await;
                if let Some(generated_event) = generated {
                    events_to_process.push(generated_event);
                }
            }
        }

        if conversation.state.is_terminal() {
            tracing::info!(
                user_id = %context.user_id,
                flow = %conversation.flow,
                state = ?conversation.state,
                "Conversation finished"
            );
            session.take();
            None
        } else {
            Some(conversation.clone())
        }
    }

    /// Cancel the active conversation, if any. Returns whether one existed.
    pub async fn cancel(&self, session: &mut Session, outbox: &mut Outbox) -> bool {
        if !session.is_active() {
            return false;
        }
        self.advance(session, Event::Cancel, outbox).await;
        true
    }

    /// Tell users whose conversations the reaper removed
    pub async fn notify_expired(&self, expired: Vec<Conversation>) {
        for conversation in expired {
            tracing::info!(
                user_id = %conversation.user_id,
                flow = %conversation.flow,
                state = conversation.state.name(),
                "Conversation expired"
            );
            let reply = render::expired(conversation.flow);
            if let Err(e) = self.messenger.send(conversation.chat_id, &reply).await {
                tracing::warn!(user_id = %conversation.user_id, error = %e, "Failed to send expiry notice");
            }
        }
    }

    async fn execute_effect(
        &self,
        effect: Effect,
        context: &ConvContext,
        write_key: &str,
        outbox: &mut Outbox,
    ) -> Option<Event> {
        match effect {
            Effect::Prompt { text, kind } => {
                let reply = self.prompt_reply(text, kind).await;
                outbox.deliver(self.messenger.as_ref(), reply).await;
                None
            }

            Effect::Notify { text } => {
                outbox.deliver(self.messenger.as_ref(), Reply::text(text)).await;
                None
            }

            Effect::Commit(commit) => {
                let outcome = self.run_commit(commit, context, write_key).await;
                Some(Event::CommitFinished(outcome))
            }
        }
    }

    async fn prompt_reply(&self, text: String, kind: PromptKind) -> Reply {
        match kind {
            PromptKind::Text => render::prompt(text),
            PromptKind::Fields => render::field_choice(text),
            PromptKind::Categories => match self.catalog.list_categories().await {
                Ok(categories) => render::category_choice(text, &categories),
                Err(e) => {
                    tracing::warn!(error = %e, "Could not load categories for prompt");
                    render::prompt(format!(
                        "{text}\n⚠️ Categories could not be loaded. Send any message to retry, or /cancel."
                    ))
                }
            },
        }
    }

    /// Apply `commit` under `write_key`. Replaying an insert with the same
    /// key returns what the earlier attempt stored, so a commit whose
    /// outcome was lost to a timeout can be retried safely.
    async fn run_commit(
        &self,
        commit: Commit,
        context: &ConvContext,
        write_key: &str,
    ) -> CommitOutcome {
        let result = match commit {
            Commit::InsertItem {
                name,
                price,
                category,
                create_category,
            } => self
                .catalog
                .insert_item(NewItem {
                    id: write_key.to_string(),
                    name,
                    price,
                    category,
                    create_category,
                    added_at: context.now,
                })
                .await
                .map(Applied::Item),
            Commit::UpdateItem { item_id, update } => self
                .catalog
                .update_item(&item_id, update)
                .await
                .map(Applied::Item),
            Commit::InsertCategory { name } => self
                .catalog
                .insert_category(write_key, &name)
                .await
                .map(Applied::Category),
        };

        match result {
            Ok(applied) => {
                tracing::info!(user_id = %context.user_id, ?applied, "Commit applied");
                CommitOutcome::Applied(applied)
            }
            Err(e) => {
                tracing::info!(user_id = %context.user_id, error = %e, "Commit refused");
                match e {
                    CatalogError::NotFound(_) => CommitOutcome::NotFound,
                    CatalogError::Conflict(name) => CommitOutcome::Conflict(name),
                    CatalogError::UnknownCategory(name) => CommitOutcome::UnknownCategory(name),
                    CatalogError::Invalid(reason) => CommitOutcome::Rejected(reason),
                    CatalogError::Unavailable(_) => CommitOutcome::Unavailable,
                }
            }
        }
    }
}
