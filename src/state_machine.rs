//! Conversation state machine
//!
//! Pure transitions over [`ConvState`]; the runtime executes the returned
//! effects and feeds store results back in as events.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::{Commit, Effect, PromptKind};
pub use event::{Applied, CommitOutcome, Event};
pub use state::{ConvContext, ConvState, Conversation, FlowEntry, FlowKind};
pub use transition::{
    enter, parse_price, prompt, transition, validate_category_name, validate_item_name,
};
