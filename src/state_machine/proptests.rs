//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::state::*;
use super::transition::*;
use super::*;
use crate::db::{Item, ItemField, ItemUpdate};
use crate::dispatcher::Action;
use crate::messenger::UserId;
use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context() -> ConvContext {
    ConvContext::new(UserId(42))
}

fn placeholder_item() -> Item {
    Item {
        id: "item-1".to_string(),
        name: "Widget".to_string(),
        price: Decimal::new(999, 2),
        category: "Electronics".to_string(),
        added_at: Utc::now(),
    }
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_price() -> impl Strategy<Value = Decimal> {
    (0i64..100_000, 0u32..=2).prop_map(|(units, scale)| Decimal::new(units, scale))
}

fn arb_field() -> impl Strategy<Value = ItemField> {
    prop_oneof![
        Just(ItemField::Name),
        Just(ItemField::Price),
        Just(ItemField::Category),
    ]
}

fn arb_target() -> impl Strategy<Value = CategoryTarget> {
    prop_oneof![
        ("[A-Za-z]{1,12}", arb_price())
            .prop_map(|(name, price)| CategoryTarget::NewItem { name, price }),
        ("[a-f0-9]{8}", "[A-Za-z]{1,12}").prop_map(|(item_id, item_name)| {
            CategoryTarget::ExistingItem { item_id, item_name }
        }),
    ]
}

fn arb_waiting_state() -> impl Strategy<Value = ConvState> {
    prop_oneof![
        Just(ConvState::AwaitName),
        "[A-Za-z]{1,12}".prop_map(|name| ConvState::AwaitPrice { name }),
        ("[A-Za-z]{1,12}", arb_price())
            .prop_map(|(name, price)| ConvState::AwaitCategory { name, price }),
        arb_target().prop_map(|target| ConvState::AwaitNewCategoryName { target }),
        ("[a-f0-9]{8}", "[A-Za-z]{1,12}")
            .prop_map(|(item_id, item_name)| ConvState::AwaitFieldChoice { item_id, item_name }),
        ("[a-f0-9]{8}", "[A-Za-z]{1,12}", arb_field()).prop_map(|(item_id, item_name, field)| {
            ConvState::AwaitNewValue {
                item_id,
                item_name,
                field,
            }
        }),
        Just(ConvState::AwaitCategoryName),
    ]
}

fn arb_committing_state() -> impl Strategy<Value = ConvState> {
    arb_waiting_state().prop_map(|resume| ConvState::Committing {
        commit: Commit::InsertCategory {
            name: "Toys".to_string(),
        },
        resume: Box::new(resume),
    })
}

fn arb_text() -> impl Strategy<Value = String> {
    prop_oneof![
        "[A-Za-z ]{0,20}",
        "\\$?[0-9]{1,6}(\\.[0-9]{1,3})?",
        "-[0-9]{1,3}",
        "[a-z]{70,80}",
    ]
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        Just(Action::Menu),
        Just(Action::List),
        Just(Action::NewCategory),
        "[A-Za-z]{1,12}".prop_map(Action::PickCategory),
        arb_field().prop_map(Action::Field),
        "[a-z]{1,8}".prop_map(Action::Unrecognized),
    ]
}

fn arb_user_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        4 => arb_text().prop_map(Event::Text),
        4 => arb_action().prop_map(Event::Button),
        1 => "[a-z]{1,8}".prop_map(Event::Command),
        1 => Just(Event::Cancel),
    ]
}

fn arb_retry_outcome() -> impl Strategy<Value = CommitOutcome> {
    prop_oneof![
        "[A-Za-z]{1,12}".prop_map(CommitOutcome::Conflict),
        "[A-Za-z]{1,12}".prop_map(CommitOutcome::UnknownCategory),
        "[A-Za-z ]{1,20}".prop_map(CommitOutcome::Rejected),
        Just(CommitOutcome::Unavailable),
    ]
}

// ============================================================================
// State Validity Checkers
// ============================================================================

fn is_waiting(state: &ConvState) -> bool {
    !matches!(
        state,
        ConvState::Committing { .. } | ConvState::Finished { .. }
    )
}

fn is_valid_state(state: &ConvState) -> bool {
    match state {
        ConvState::Committing { resume, .. } => is_waiting(resume),
        ConvState::AwaitPrice { name } | ConvState::AwaitCategory { name, .. } => {
            !name.is_empty() && name.chars().count() <= MAX_ITEM_NAME_CHARS
        }
        _ => true,
    }
}

fn effects_are_valid(effects: &[Effect], new_state: &ConvState) -> bool {
    let commits = effects
        .iter()
        .filter(|e| matches!(e, Effect::Commit(_)))
        .count();

    // A commit effect appears exactly when entering Committing
    match new_state {
        ConvState::Committing { .. } => commits == 1 && effects.len() == 1,
        _ => commits == 0,
    }
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Invariant 1: valid state and effects after any user-driven sequence
    #[test]
    fn prop_transitions_preserve_validity(
        start in arb_waiting_state(),
        events in proptest::collection::vec(arb_user_event(), 0..20)
    ) {
        let mut state = start;
        let ctx = test_context();

        for event in events {
            match transition(&state, &ctx, event) {
                Ok(result) => {
                    state = result.new_state;
                    prop_assert!(is_valid_state(&state), "Invalid state: {:?}", state);
                    prop_assert!(
                        effects_are_valid(&result.effects, &state),
                        "Invalid effects for state {:?}: {:?}",
                        state,
                        result.effects
                    );
                }
                Err(_) => { /* State is unchanged on error */ }
            }
        }
    }

    // Invariant 2: cancel from any waiting state finishes without writes
    #[test]
    fn prop_cancel_always_finishes(state in arb_waiting_state()) {
        let result = transition(&state, &test_context(), Event::Cancel);
        prop_assert!(result.is_ok(), "Cancel failed: {:?}", result);
        let result = result.unwrap();
        prop_assert_eq!(
            result.new_state,
            ConvState::Finished { outcome: FlowOutcome::Cancelled }
        );
        prop_assert!(!result.effects.iter().any(|e| matches!(e, Effect::Commit(_))));
    }

    // Invariant 3: terminal state accepts nothing
    #[test]
    fn prop_finished_rejects_everything(event in arb_user_event()) {
        for outcome in [FlowOutcome::Committed, FlowOutcome::Cancelled, FlowOutcome::NotFound] {
            let result = transition(
                &ConvState::Finished { outcome },
                &test_context(),
                event.clone(),
            );
            prop_assert!(matches!(result, Err(TransitionError::Finished)));
        }
    }

    // Invariant 4: nothing but a commit result moves a committing state
    #[test]
    fn prop_committing_ignores_user_events(
        state in arb_committing_state(),
        event in arb_user_event()
    ) {
        let result = transition(&state, &test_context(), event);
        prop_assert!(matches!(result, Err(TransitionError::CommitInProgress)));
    }

    // Invariant 5: retryable commit failures restore the saved step
    #[test]
    fn prop_retryable_outcome_resumes(
        state in arb_committing_state(),
        outcome in arb_retry_outcome()
    ) {
        let ConvState::Committing { resume, .. } = &state else {
            unreachable!()
        };
        let expected = (**resume).clone();
        let result = transition(&state, &test_context(), Event::CommitFinished(outcome)).unwrap();
        prop_assert_eq!(result.new_state, expected);
        let reprompted = matches!(result.effects.as_slice(), [Effect::Prompt { .. }]);
        prop_assert!(reprompted, "retry must re-prompt the resumed step");
    }

    // Invariant 6: rejected prices never advance
    #[test]
    fn prop_invalid_price_never_advances(
        name in "[A-Za-z]{1,12}",
        input in prop_oneof!["-[1-9][0-9]{0,3}(\\.[0-9]{1,2})?", "[0-9]{1,3}\\.[0-9]{2}[1-9]", "[a-z]{1,8}"]
    ) {
        let state = ConvState::AwaitPrice { name };
        let result = transition(&state, &test_context(), Event::Text(input.clone()));
        prop_assert!(
            matches!(result, Err(TransitionError::Validation(_))),
            "Price {:?} was accepted", input
        );
    }

    // Invariant 7: accepted prices carry at most two decimals and are non-negative
    #[test]
    fn prop_accepted_price_is_well_formed(input in "\\$?[0-9]{1,9}(\\.[0-9]{1,4})?") {
        if let Ok(price) = parse_price(&input) {
            prop_assert!(!price.is_sign_negative());
            prop_assert!(price.scale() <= 2);
        }
    }

    // Invariant 8: every waiting state has a prompt
    #[test]
    fn prop_waiting_states_prompt(state in arb_waiting_state()) {
        prop_assert!(prompt(&state, None).is_some());
        prop_assert_ne!(state.expected_input(), ExpectedInput::Nothing);
    }

    // Invariant 9: a successful commit always terminates the flow
    #[test]
    fn prop_applied_finishes(state in arb_committing_state()) {
        let outcome = CommitOutcome::Applied(Applied::Item(placeholder_item()));
        let result = transition(&state, &test_context(), Event::CommitFinished(outcome)).unwrap();
        prop_assert_eq!(
            result.new_state,
            ConvState::Finished { outcome: FlowOutcome::Committed }
        );
    }

    // Invariant 10: edits only touch the chosen field
    #[test]
    fn prop_edit_commits_chosen_field(
        item_id in "[a-f0-9]{8}",
        field in prop_oneof![Just(ItemField::Name), Just(ItemField::Price)]
    ) {
        let ctx = test_context();
        let state = ConvState::AwaitFieldChoice { item_id: item_id.clone(), item_name: "Widget".to_string() };
        let result = transition(&state, &ctx, Event::Button(Action::Field(field))).unwrap();
        let input = match field {
            ItemField::Price => "5",
            _ => "Gadget",
        };
        let result = transition(&result.new_state, &ctx, Event::Text(input.to_string())).unwrap();
        match result.effects.as_slice() {
            [Effect::Commit(Commit::UpdateItem { item_id: id, update })] => {
                prop_assert_eq!(id, &item_id);
                prop_assert_eq!(update.field(), field);
                if let ItemUpdate::Name(name) = update {
                    prop_assert_eq!(name, "Gadget");
                }
            }
            other => prop_assert!(false, "unexpected effects {:?}", other),
        }
    }
}
