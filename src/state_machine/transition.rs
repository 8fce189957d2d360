//! Pure state transition function
//!
//! Given a state and an event, decide the next state and the effects the
//! runtime must execute. No I/O happens here; store lookups and message
//! delivery are effects.

use super::effect::{Commit, PromptKind};
use super::event::{Applied, CommitOutcome};
use super::state::{CategoryTarget, ExpectedInput, FlowEntry, FlowOutcome};
use super::{ConvContext, ConvState, Effect, Event};
use crate::db::{ItemField, ItemUpdate};
use crate::dispatcher::Action;
use crate::render::format_price;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

pub const MAX_ITEM_NAME_CHARS: usize = 64;
/// Keeps `pick:<name>` and `cat:<name>` payloads under the transport limit
pub const MAX_CATEGORY_NAME_BYTES: usize = 48;
pub const MAX_PRICE_UNITS: u32 = 1_000_000_000;
const MAX_PRICE_SCALE: u32 = 2;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConvState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConvState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Input that fails a field rule. The message is shown to the user verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Name cannot be empty.")]
    EmptyName,
    #[error("Name is too long (max {max} characters).")]
    NameTooLong { max: usize },
    #[error("'{0}' is not a valid price. Send a number like 9.99.")]
    InvalidPrice(String),
    #[error("Price cannot be negative.")]
    NegativePrice,
    #[error("Price can have at most 2 decimal places.")]
    PriceTooPrecise,
    #[error("Price is too large.")]
    PriceTooLarge,
    #[error("Category name cannot be empty.")]
    EmptyCategory,
    #[error("Category name is too long (max {max} bytes).")]
    CategoryTooLong { max: usize },
}

/// Errors that can occur during transition
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("{}", .expected.hint())]
    UnexpectedInput { expected: ExpectedInput },
    #[error("/{0} is not available right now. Finish this step or /cancel.")]
    CommandInFlow(String),
    #[error("Still saving, please wait.")]
    CommitInProgress,
    #[error("Conversation already finished")]
    Finished,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

impl TransitionError {
    /// Errors the user caused; the runtime answers with a re-prompt
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            TransitionError::Validation(_)
                | TransitionError::UnexpectedInput { .. }
                | TransitionError::CommandInFlow(_)
        )
    }
}

impl ExpectedInput {
    pub fn hint(self) -> &'static str {
        match self {
            ExpectedInput::Text => "Please send a text reply, or /cancel.",
            ExpectedInput::Button => "Please use the buttons below, or /cancel.",
            ExpectedInput::Nothing => "Nothing is expected right now.",
        }
    }
}

/// Initial state and prompt for a flow
pub fn enter(entry: FlowEntry) -> TransitionResult {
    let state = match entry {
        FlowEntry::AddItem => ConvState::AwaitName,
        FlowEntry::EditItem { item_id, item_name } => {
            ConvState::AwaitFieldChoice { item_id, item_name }
        }
        FlowEntry::AddCategory => ConvState::AwaitCategoryName,
    };
    let effects = prompt(&state, None);
    TransitionResult::new(state).with_effects(effects)
}

/// Pure transition function
pub fn transition(
    state: &ConvState,
    context: &ConvContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Terminal and in-flight states
        // ============================================================
        (ConvState::Finished { .. }, _) => Err(TransitionError::Finished),

        (ConvState::Committing { commit, resume }, Event::CommitFinished(outcome)) => {
            Ok(after_commit(commit, resume, outcome))
        }

        (ConvState::Committing { .. }, _) => Err(TransitionError::CommitInProgress),

        (_, Event::CommitFinished(_)) => Err(TransitionError::InvalidTransition(
            "commit result without a pending commit".to_string(),
        )),

        // ============================================================
        // Cancellation: valid from every waiting state, writes nothing
        // ============================================================
        (_, Event::Cancel | Event::Button(Action::Cancel)) => Ok(TransitionResult::new(
            ConvState::Finished {
                outcome: FlowOutcome::Cancelled,
            },
        )
        .with_effect(Effect::notify("❌ Cancelled. Nothing was saved."))),

        (_, Event::Command(name)) => Err(TransitionError::CommandInFlow(name)),

        // ============================================================
        // Add-Item
        // ============================================================
        (ConvState::AwaitName, Event::Text(text)) => {
            let name = validate_item_name(&text)?;
            Ok(advance_to(ConvState::AwaitPrice { name }))
        }

        (ConvState::AwaitPrice { name }, Event::Text(text)) => {
            let price = parse_price(&text)?;
            Ok(advance_to(ConvState::AwaitCategory {
                name: name.clone(),
                price,
            }))
        }

        (ConvState::AwaitCategory { name, price }, Event::Button(Action::PickCategory(category))) => {
            Ok(commit(
                Commit::InsertItem {
                    name: name.clone(),
                    price: *price,
                    category,
                    create_category: false,
                },
                state,
            ))
        }

        (ConvState::AwaitCategory { name, price }, Event::Button(Action::NewCategory)) => {
            Ok(advance_to(ConvState::AwaitNewCategoryName {
                target: CategoryTarget::NewItem {
                    name: name.clone(),
                    price: *price,
                },
            }))
        }

        (ConvState::AwaitNewCategoryName { target }, Event::Text(text)) => {
            let category = validate_category_name(&text)?;
            let pending = match target {
                CategoryTarget::NewItem { name, price } => Commit::InsertItem {
                    name: name.clone(),
                    price: *price,
                    category,
                    create_category: true,
                },
                CategoryTarget::ExistingItem { item_id, .. } => Commit::UpdateItem {
                    item_id: item_id.clone(),
                    update: ItemUpdate::Category {
                        name: category,
                        create: true,
                    },
                },
            };
            Ok(commit(pending, state))
        }

        // ============================================================
        // Edit-Item
        // ============================================================
        (ConvState::AwaitFieldChoice { item_id, item_name }, Event::Button(Action::Field(field))) => {
            Ok(advance_to(ConvState::AwaitNewValue {
                item_id: item_id.clone(),
                item_name: item_name.clone(),
                field,
            }))
        }

        (
            ConvState::AwaitNewValue {
                item_id,
                field: ItemField::Name,
                ..
            },
            Event::Text(text),
        ) => {
            let name = validate_item_name(&text)?;
            Ok(commit(
                Commit::UpdateItem {
                    item_id: item_id.clone(),
                    update: ItemUpdate::Name(name),
                },
                state,
            ))
        }

        (
            ConvState::AwaitNewValue {
                item_id,
                field: ItemField::Price,
                ..
            },
            Event::Text(text),
        ) => {
            let price = parse_price(&text)?;
            Ok(commit(
                Commit::UpdateItem {
                    item_id: item_id.clone(),
                    update: ItemUpdate::Price(price),
                },
                state,
            ))
        }

        (
            ConvState::AwaitNewValue {
                item_id,
                field: ItemField::Category,
                ..
            },
            Event::Button(Action::PickCategory(category)),
        ) => Ok(commit(
            Commit::UpdateItem {
                item_id: item_id.clone(),
                update: ItemUpdate::Category {
                    name: category,
                    create: false,
                },
            },
            state,
        )),

        (
            ConvState::AwaitNewValue {
                item_id,
                item_name,
                field: ItemField::Category,
            },
            Event::Button(Action::NewCategory),
        ) => Ok(advance_to(ConvState::AwaitNewCategoryName {
            target: CategoryTarget::ExistingItem {
                item_id: item_id.clone(),
                item_name: item_name.clone(),
            },
        })),

        // ============================================================
        // Add-Category
        // ============================================================
        (ConvState::AwaitCategoryName, Event::Text(text)) => {
            let name = validate_category_name(&text)?;
            Ok(commit(Commit::InsertCategory { name }, state))
        }

        // Everything else leaves the state untouched
        (state, event) => {
            tracing::debug!(
                user_id = %context.user_id,
                state = state.name(),
                ?event,
                "Input not accepted in this state"
            );
            Err(TransitionError::UnexpectedInput {
                expected: state.expected_input(),
            })
        }
    }
}

/// Prompt for the input `state` waits for, prefixed by `notice` if given
pub fn prompt(state: &ConvState, notice: Option<&str>) -> Option<Effect> {
    let (text, kind) = match state {
        ConvState::AwaitName => ("📝 Send the item name.".to_string(), PromptKind::Text),
        ConvState::AwaitPrice { name } => (
            format!("💰 Price for '{name}'? (e.g. 9.99)"),
            PromptKind::Text,
        ),
        ConvState::AwaitCategory { name, .. } => (
            format!("📂 Pick a category for '{name}'."),
            PromptKind::Categories,
        ),
        ConvState::AwaitNewCategoryName { .. } | ConvState::AwaitCategoryName => (
            "🆕 Send the new category name.".to_string(),
            PromptKind::Text,
        ),
        ConvState::AwaitFieldChoice { item_name, .. } => (
            format!("✏️ Editing '{item_name}'. What should change?"),
            PromptKind::Fields,
        ),
        ConvState::AwaitNewValue {
            item_name, field, ..
        } => match field {
            ItemField::Name => (
                format!("Send the new name for '{item_name}'."),
                PromptKind::Text,
            ),
            ItemField::Price => (
                format!("Send the new price for '{item_name}'."),
                PromptKind::Text,
            ),
            ItemField::Category => (
                format!("Pick the new category for '{item_name}'."),
                PromptKind::Categories,
            ),
        },
        ConvState::Committing { .. } | ConvState::Finished { .. } => return None,
    };

    let text = match notice {
        Some(notice) => format!("{notice}\n{text}"),
        None => text,
    };
    Some(Effect::prompt(text, kind))
}

fn advance_to(state: ConvState) -> TransitionResult {
    let effects = prompt(&state, None);
    TransitionResult::new(state).with_effects(effects)
}

fn commit(pending: Commit, resume: &ConvState) -> TransitionResult {
    TransitionResult::new(ConvState::Committing {
        commit: pending.clone(),
        resume: Box::new(resume.clone()),
    })
    .with_effect(Effect::Commit(pending))
}

fn after_commit(pending: &Commit, resume: &ConvState, outcome: CommitOutcome) -> TransitionResult {
    let retry = |notice: String| {
        let state = resume.clone();
        let effects = prompt(&state, Some(&notice));
        TransitionResult::new(state).with_effects(effects)
    };

    match outcome {
        CommitOutcome::Applied(applied) => TransitionResult::new(ConvState::Finished {
            outcome: FlowOutcome::Committed,
        })
        .with_effect(Effect::notify(committed_text(pending, &applied))),

        CommitOutcome::NotFound => TransitionResult::new(ConvState::Finished {
            outcome: FlowOutcome::NotFound,
        })
        .with_effect(Effect::notify(
            "⚠️ That item no longer exists. Nothing was changed.",
        )),

        CommitOutcome::Conflict(name) => retry(format!("⚠️ Category '{name}' already exists.")),
        CommitOutcome::UnknownCategory(name) => {
            retry(format!("⚠️ Category '{name}' no longer exists."))
        }
        CommitOutcome::Rejected(reason) => retry(format!("⚠️ {reason}")),
        CommitOutcome::Unavailable => retry(
            "⚠️ The catalog is temporarily unavailable. Please try again.".to_string(),
        ),
    }
}

fn committed_text(pending: &Commit, applied: &Applied) -> String {
    match (pending, applied) {
        (Commit::InsertItem { .. }, Applied::Item(item)) => format!(
            "✅ Added '{}' ({}) to {}.",
            item.name,
            format_price(item.price),
            item.category
        ),
        (Commit::UpdateItem { update, .. }, Applied::Item(item)) => {
            let value = match update.field() {
                ItemField::Name => item.name.clone(),
                ItemField::Price => format_price(item.price),
                ItemField::Category => item.category.clone(),
            };
            format!("✅ Updated '{}': {} is now {value}.", item.name, update.field())
        }
        (_, Applied::Category(category)) => {
            format!("✅ Category '{}' created.", category.name)
        }
        (Commit::InsertCategory { .. }, Applied::Item(item)) => {
            format!("✅ Saved '{}'.", item.name)
        }
    }
}

// ============================================================
// Field rules, shared with the one-shot `/add` command
// ============================================================

pub fn validate_item_name(input: &str) -> Result<String, ValidationError> {
    let name = input.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if name.chars().count() > MAX_ITEM_NAME_CHARS {
        return Err(ValidationError::NameTooLong {
            max: MAX_ITEM_NAME_CHARS,
        });
    }
    Ok(name.to_string())
}

pub fn validate_category_name(input: &str) -> Result<String, ValidationError> {
    let name = input.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyCategory);
    }
    if name.len() > MAX_CATEGORY_NAME_BYTES {
        return Err(ValidationError::CategoryTooLong {
            max: MAX_CATEGORY_NAME_BYTES,
        });
    }
    Ok(name.to_string())
}

/// Parse a user-typed price: optional leading `$`, non-negative, at most two
/// decimal places.
pub fn parse_price(input: &str) -> Result<Decimal, ValidationError> {
    let trimmed = input.trim();
    let digits = trimmed.strip_prefix('$').unwrap_or(trimmed).trim();
    let price = Decimal::from_str(digits)
        .map_err(|_| ValidationError::InvalidPrice(trimmed.to_string()))?;

    if price.is_zero() {
        return Ok(Decimal::ZERO);
    }
    if price.is_sign_negative() {
        return Err(ValidationError::NegativePrice);
    }
    if price.normalize().scale() > MAX_PRICE_SCALE {
        return Err(ValidationError::PriceTooPrecise);
    }
    if price > Decimal::from(MAX_PRICE_UNITS) {
        return Err(ValidationError::PriceTooLarge);
    }
    if price.scale() > MAX_PRICE_SCALE {
        return Ok(price.normalize());
    }
    Ok(price)
}
