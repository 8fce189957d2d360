//! Events that can occur in a conversation

use crate::db::{Category, Item};
use crate::dispatcher::Action;

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // User events
    Text(String),
    Button(Action),
    /// Any `/command` other than cancel while a flow is active
    Command(String),
    Cancel,

    // Store events
    CommitFinished(CommitOutcome),
}

/// What the store did with a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied(Applied),
    /// Edit target no longer exists
    NotFound,
    /// Category name already taken
    Conflict(String),
    /// Picked category no longer exists
    UnknownCategory(String),
    /// Store-side validation refused the values
    Rejected(String),
    /// Store I/O failed; the step can be retried
    Unavailable,
}

/// Record written by a successful commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Item(Item),
    Category(Category),
}
