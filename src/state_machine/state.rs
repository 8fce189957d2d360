//! Conversation state types

use super::effect::Commit;
use crate::messenger::{ChatId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::time::Instant;

/// The three guided flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    AddItem,
    EditItem,
    AddCategory,
}

impl FlowKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FlowKind::AddItem => "add_item",
            FlowKind::EditItem => "edit_item",
            FlowKind::AddCategory => "add_category",
        }
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a flow is entered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEntry {
    AddItem,
    /// The target was confirmed to exist when the flow started
    EditItem { item_id: String, item_name: String },
    AddCategory,
}

impl FlowEntry {
    pub fn kind(&self) -> FlowKind {
        match self {
            FlowEntry::AddItem => FlowKind::AddItem,
            FlowEntry::EditItem { .. } => FlowKind::EditItem,
            FlowEntry::AddCategory => FlowKind::AddCategory,
        }
    }
}

/// What a new category name will be attached to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryTarget {
    /// Add-Item: the item being collected
    NewItem { name: String, price: Decimal },
    /// Edit-Item: the item being edited
    ExistingItem { item_id: String, item_name: String },
}

/// How a finished conversation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowOutcome {
    Committed,
    Cancelled,
    /// The edit target vanished before commit
    NotFound,
}

/// Kind of input a state waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedInput {
    Text,
    Button,
    Nothing,
}

/// Conversation state. Each waiting state carries exactly the fields the flow
/// has collected so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvState {
    // Add-Item
    AwaitName,
    AwaitPrice {
        name: String,
    },
    AwaitCategory {
        name: String,
        price: Decimal,
    },

    /// Shared by Add-Item and Edit-Item after "new category" was chosen
    AwaitNewCategoryName {
        target: CategoryTarget,
    },

    // Edit-Item
    AwaitFieldChoice {
        item_id: String,
        item_name: String,
    },
    AwaitNewValue {
        item_id: String,
        item_name: String,
        field: crate::db::ItemField,
    },

    // Add-Category
    AwaitCategoryName,

    /// Store mutation in flight; `resume` is restored when the commit can be
    /// retried (conflict, unknown category, store unavailable)
    Committing {
        commit: Commit,
        resume: Box<ConvState>,
    },

    /// Terminal: the registry drops the conversation
    Finished {
        outcome: FlowOutcome,
    },
}

impl ConvState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConvState::Finished { .. })
    }

    pub fn expected_input(&self) -> ExpectedInput {
        match self {
            ConvState::AwaitName
            | ConvState::AwaitPrice { .. }
            | ConvState::AwaitNewCategoryName { .. }
            | ConvState::AwaitCategoryName => ExpectedInput::Text,
            ConvState::AwaitNewValue { field, .. } => {
                if *field == crate::db::ItemField::Category {
                    ExpectedInput::Button
                } else {
                    ExpectedInput::Text
                }
            }
            ConvState::AwaitCategory { .. } | ConvState::AwaitFieldChoice { .. } => {
                ExpectedInput::Button
            }
            ConvState::Committing { .. } | ConvState::Finished { .. } => ExpectedInput::Nothing,
        }
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            ConvState::AwaitName => "await_name",
            ConvState::AwaitPrice { .. } => "await_price",
            ConvState::AwaitCategory { .. } => "await_category",
            ConvState::AwaitNewCategoryName { .. } => "await_new_category_name",
            ConvState::AwaitFieldChoice { .. } => "await_field_choice",
            ConvState::AwaitNewValue { .. } => "await_new_value",
            ConvState::AwaitCategoryName => "await_category_name",
            ConvState::Committing { .. } => "committing",
            ConvState::Finished { .. } => "finished",
        }
    }
}

/// Live per-user flow instance
#[derive(Debug, Clone)]
pub struct Conversation {
    /// Fresh per flow instance; keys the flow's single store write so a
    /// retried commit cannot apply twice
    pub write_key: String,
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub flow: FlowKind,
    pub state: ConvState,
    pub started_at: DateTime<Utc>,
    pub last_activity: Instant,
}

impl Conversation {
    pub fn new(user_id: UserId, chat_id: ChatId, flow: FlowKind, state: ConvState) -> Self {
        Self {
            write_key: uuid::Uuid::new_v4().to_string(),
            user_id,
            chat_id,
            flow,
            state,
            started_at: Utc::now(),
            last_activity: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

/// Per-transition context
#[derive(Debug, Clone)]
pub struct ConvContext {
    pub user_id: UserId,
    /// Timestamp stamped on items created by this transition
    pub now: DateTime<Utc>,
}

impl ConvContext {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            now: Utc::now(),
        }
    }
}
