//! Update routing
//!
//! Every inbound update is resolved in a fixed order while holding the user's
//! registry slot:
//!
//! 1. Flow entry (privileged): starts a conversation, superseding any active one
//! 2. Cancel: ends the active conversation
//! 3. Active conversation: the update is fed to the state machine
//! 4. Everything else is a stateless action (menus, listings, admin views)

mod actions;
mod payload;

pub use payload::{fits, Action, Listing};

use crate::messenger::{Reply, Update, UpdateKind, UserId};
use crate::render;
use crate::runtime::{
    AccessPolicy, CatalogError, CatalogStore, ConversationRuntime, Messenger, Outbox,
    SessionGuard, SessionRegistry, UpdateHandler,
};
use crate::state_machine::{Event, FlowEntry, FlowKind};
use async_trait::async_trait;
use std::sync::Arc;

/// How an update was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    FlowStarted(FlowKind),
    /// Input went to the active conversation; `active` tells whether it is
    /// still running afterwards
    FlowAdvanced { active: bool },
    FlowCancelled,
    NothingToCancel,
    Stateless,
    /// Privileged action refused; nothing changed
    Denied,
    /// Edit target missing; nothing changed
    NotFound,
    /// Store failed before anything changed
    Unavailable,
}

/// What the user asked for, independent of how they asked
#[derive(Debug, Clone, PartialEq, Eq)]
enum Intent {
    Action(Action),
    Search(String),
    /// `/add <name> <price> <category...>`
    DirectAdd(Vec<String>),
    Help,
    UnknownCommand(String),
    Text(String),
}

impl Intent {
    fn from_command(name: &str, args: Vec<String>) -> Self {
        match name {
            "start" | "menu" => Intent::Action(Action::Menu),
            "admin" => Intent::Action(Action::Admin),
            "stats" => Intent::Action(Action::Stats),
            "cancel" => Intent::Action(Action::Cancel),
            "help" => Intent::Help,
            "search" if args.is_empty() => Intent::Action(Action::SearchPrompt),
            "search" => Intent::Search(args.join(" ")),
            "add" if args.is_empty() => Intent::Action(Action::AddItem),
            "add" => Intent::DirectAdd(args),
            "addcategory" => Intent::Action(Action::AddCategory),
            other => Intent::UnknownCommand(other.to_string()),
        }
    }

    fn flow_entry(&self) -> Option<&Action> {
        match self {
            Intent::Action(action) if action.is_flow_entry() => Some(action),
            _ => None,
        }
    }

    fn is_cancel(&self) -> bool {
        matches!(self, Intent::Action(Action::Cancel))
    }
}

/// Routes updates to the registry, the state machine or stateless handlers
pub struct Dispatcher<C, M, P>
where
    C: CatalogStore + 'static,
    M: Messenger + 'static,
    P: AccessPolicy,
{
    registry: Arc<SessionRegistry>,
    runtime: ConversationRuntime<C, M>,
    policy: P,
}

impl<C, M, P> Dispatcher<C, M, P>
where
    C: CatalogStore + 'static,
    M: Messenger + 'static,
    P: AccessPolicy,
{
    pub fn new(
        registry: Arc<SessionRegistry>,
        runtime: ConversationRuntime<C, M>,
        policy: P,
    ) -> Self {
        Self {
            registry,
            runtime,
            policy,
        }
    }

    pub async fn dispatch(&self, update: Update) -> Route {
        let Update {
            user_id,
            chat_id,
            kind,
        } = update;

        let (intent, event, mut outbox) = match kind {
            UpdateKind::Button {
                payload,
                callback_id,
                message,
            } => {
                if let Some(callback_id) = callback_id {
                    if let Err(e) = self.runtime.messenger().acknowledge(&callback_id).await {
                        tracing::debug!(error = %e, "Failed to acknowledge button press");
                    }
                }
                let action = Action::parse(&payload);
                (
                    Intent::Action(action.clone()),
                    Event::Button(action),
                    Outbox::editing(chat_id, message),
                )
            }
            UpdateKind::Command { name, args } => {
                let event = if name == "cancel" {
                    Event::Cancel
                } else {
                    Event::Command(name.clone())
                };
                (
                    Intent::from_command(&name, args),
                    event,
                    Outbox::new(chat_id),
                )
            }
            UpdateKind::Text(text) => (
                Intent::Text(text.clone()),
                Event::Text(text),
                Outbox::new(chat_id),
            ),
        };

        let mut session = self.registry.lock(user_id).await;

        let route = if let Some(entry) = intent.flow_entry() {
            self.enter_flow(&mut session, user_id, entry, &mut outbox)
                .await
        } else if intent.is_cancel() {
            if self.runtime.cancel(&mut session, &mut outbox).await {
                Route::FlowCancelled
            } else {
                outbox
                    .deliver(
                        self.runtime.messenger(),
                        render::with_menu("Nothing to cancel."),
                    )
                    .await;
                Route::NothingToCancel
            }
        } else if session.is_active() {
            let live = self.runtime.advance(&mut session, event, &mut outbox).await;
            Route::FlowAdvanced {
                active: live.is_some(),
            }
        } else {
            // Stateless work does not need the slot
            drop(session);
            self.run_stateless(user_id, intent, &mut outbox).await
        };

        tracing::debug!(user_id = %user_id, ?route, "Update routed");
        route
    }

    async fn enter_flow(
        &self,
        session: &mut SessionGuard,
        user_id: UserId,
        action: &Action,
        outbox: &mut Outbox,
    ) -> Route {
        if !self.policy.is_privileged(user_id) {
            tracing::info!(user_id = %user_id, action = %action.payload(), "Privileged flow refused");
            self.deny(outbox).await;
            return Route::Denied;
        }

        let entry = match action {
            Action::AddItem => FlowEntry::AddItem,
            Action::AddCategory => FlowEntry::AddCategory,
            Action::EditItem(item_id) => match self.runtime.catalog().get_item(item_id).await {
                Ok(item) => FlowEntry::EditItem {
                    item_id: item.id,
                    item_name: item.name,
                },
                Err(CatalogError::NotFound(_)) => {
                    outbox
                        .deliver(
                            self.runtime.messenger(),
                            Reply::text("⚠️ That item no longer exists."),
                        )
                        .await;
                    return Route::NotFound;
                }
                Err(e) => {
                    self.report_unavailable(&e, outbox).await;
                    return Route::Unavailable;
                }
            },
            _ => return Route::Stateless,
        };

        let kind = entry.kind();
        self.runtime
            .start(session, user_id, outbox.chat_id(), entry, outbox)
            .await;
        Route::FlowStarted(kind)
    }

    async fn deny(&self, outbox: &mut Outbox) {
        outbox
            .deliver(
                self.runtime.messenger(),
                Reply::text("⛔ You are not authorized to do that."),
            )
            .await;
    }

    async fn report_unavailable(&self, error: &CatalogError, outbox: &mut Outbox) {
        tracing::warn!(error = %error, "Catalog unavailable for request");
        outbox
            .deliver(
                self.runtime.messenger(),
                Reply::text("⚠️ The catalog is temporarily unavailable. Please try again."),
            )
            .await;
    }
}

#[async_trait]
impl<C, M, P> UpdateHandler for Dispatcher<C, M, P>
where
    C: CatalogStore + 'static,
    M: Messenger + 'static,
    P: AccessPolicy,
{
    async fn handle(&self, update: Update) {
        self.dispatch(update).await;
    }
}
