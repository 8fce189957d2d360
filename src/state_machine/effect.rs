//! Effects produced by state transitions

use crate::db::ItemUpdate;
use rust_decimal::Decimal;

/// Store mutation for a fully collected flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Commit {
    InsertItem {
        name: String,
        price: Decimal,
        category: String,
        create_category: bool,
    },
    UpdateItem {
        item_id: String,
        update: ItemUpdate,
    },
    InsertCategory {
        name: String,
    },
}

/// Keyboard that accompanies a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Free-text answer; only a cancel button
    Text,
    /// One button per existing category plus "new category"
    Categories,
    /// One button per editable field
    Fields,
}

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Ask for the next input
    Prompt { text: String, kind: PromptKind },

    /// Plain message, no keyboard
    Notify { text: String },

    /// Run a store mutation; yields `Event::CommitFinished`
    Commit(Commit),
}

impl Effect {
    pub fn prompt(text: impl Into<String>, kind: PromptKind) -> Self {
        Effect::Prompt {
            text: text.into(),
            kind,
        }
    }

    pub fn notify(text: impl Into<String>) -> Self {
        Effect::Notify { text: text.into() }
    }
}
