//! Property-based tests for offer negotiation invariants
//!
//! Decisions arrive in arbitrary order, confirmations arrive in arbitrary
//! order and may repeat, and drafts carry arbitrary time values. Each
//! property checks an outcome that must hold for every such ordering.

use offer_exchange::item::{BorrowResource, ItemDetails};
use offer_exchange::{
    Collaborators, Confirmation, Decision, EngineConfig, InMemoryCatalog, InMemoryDirectory,
    OfferDraft, OfferError, OfferItem, OfferItemKey, OfferKey, OfferService, OfferStatus,
    RecordingSink, ResourceKey, Target, TimeStamp, UserKey,
};
use proptest::prelude::*;
use std::sync::Arc;

// PROPERTY TEST STRATEGIES

/// Strategy to generate a participant count and, per participant, whether
/// they accept, in a shuffled voting order
fn votes_strategy() -> impl Strategy<Value = Vec<(usize, bool)>> {
    (2usize..=5).prop_flat_map(|n| {
        prop::collection::vec(prop::bool::weighted(0.8), n).prop_flat_map(|accepts| {
            let votes: Vec<(usize, bool)> = accepts.into_iter().enumerate().collect();
            Just(votes).prop_shuffle()
        })
    })
}

/// Strategy to generate a sequence of borrow confirmations, repeats allowed
fn confirmations_strategy() -> impl Strategy<Value = Vec<Confirmation>> {
    prop::collection::vec(
        prop::sample::select(Confirmation::ALL.to_vec()),
        0..12,
    )
}

/// Strategy to generate a time value that may be negative
fn time_value_strategy() -> impl Strategy<Value = i64> {
    -10_000i64..10_000
}

// HELPERS

fn service() -> anyhow::Result<OfferService> {
    let db = sled::Config::new().temporary(true).open()?;
    Ok(OfferService::new(
        Arc::new(db),
        Collaborators::new(
            Arc::new(InMemoryDirectory::new()),
            Arc::new(InMemoryCatalog::new()),
            Arc::new(RecordingSink::new()),
        ),
        EngineConfig::default(),
    )?)
}

fn participant(index: usize) -> UserKey {
    UserKey::new(format!("user_{index}"))
}

/// A ring of resource transfers so that acceptance never completes the
/// offer on its own
fn ring_draft(n: usize) -> OfferDraft {
    let mut draft = OfferDraft::new().set_author(participant(0));
    for i in 0..n {
        draft = draft.transfer_resource(
            Target::User(participant(i)),
            Target::User(participant((i + 1) % n)),
            format!("resource_{i}"),
        );
    }
    draft
}

fn fresh_loan() -> OfferItem {
    OfferItem::new(
        OfferItemKey::new("item_loan"),
        OfferKey::new("offer_loan"),
        Target::user("lender"),
        Target::user("borrower"),
        ItemDetails::BorrowResource(BorrowResource {
            resource: ResourceKey::new("ladder"),
            duration_secs: 3600,
            item_taken: false,
            item_given: false,
            item_returned_back: false,
            item_received_back: false,
        }),
    )
}

// UNANIMITY

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// The offer is accepted exactly when everyone accepted, and declined as
    /// soon as anyone declined
    #[test]
    fn unanimity_decides_the_offer(votes in votes_strategy()) {
        let service = service().unwrap();
        let n = votes.len();
        let offer_key = service.submit_offer(ring_draft(n)).unwrap().offer.key;

        let mut declined = false;
        for (cast, (index, accepts)) in votes.iter().enumerate() {
            let decision = if *accepts { Decision::Accepted } else { Decision::Declined };
            let result = service.record_decision(&offer_key, &participant(*index), decision);

            if declined {
                prop_assert!(matches!(result, Err(OfferError::OfferNotPending(OfferStatus::Declined))));
                continue;
            }
            let view = result.unwrap();
            if !accepts {
                declined = true;
                prop_assert_eq!(view.offer.status, OfferStatus::Declined);
            } else if cast + 1 == n {
                prop_assert_eq!(view.offer.status, OfferStatus::Accepted);
            } else {
                prop_assert_eq!(view.offer.status, OfferStatus::Pending);
            }
        }

        let expected = if votes.iter().all(|(_, accepts)| *accepts) {
            OfferStatus::Accepted
        } else {
            OfferStatus::Declined
        };
        prop_assert_eq!(service.get_offer(&offer_key).unwrap().offer.status, expected);
    }
}

// BORROW QUADRUPLE

proptest! {
    /// A loan is complete iff all four confirmations were applied, and
    /// applying one twice leaves the item as applying it once
    #[test]
    fn loan_completes_only_with_all_four_flags(confirmations in confirmations_strategy()) {
        let mut item = fresh_loan();
        let mut seen = Vec::new();

        for confirmation in &confirmations {
            let changed = item.apply_confirmation(*confirmation).unwrap();
            prop_assert_eq!(changed, !seen.contains(confirmation));
            if changed {
                seen.push(*confirmation);
            }
        }

        prop_assert_eq!(item.is_completed(), seen.len() == Confirmation::ALL.len());
        for confirmation in Confirmation::ALL {
            prop_assert_eq!(item.is_confirmed(confirmation).unwrap(), seen.contains(&confirmation));
        }
    }
}

// SUBMIT VALIDATION

proptest! {
    /// Any negative time value is rejected with its item index; otherwise
    /// the draft validates
    #[test]
    fn negative_time_values_are_caught(
        credit in time_value_strategy(),
        service_len in time_value_strategy(),
        loan_len in time_value_strategy(),
    ) {
        let draft = OfferDraft::new()
            .set_author("alice")
            .transfer_credits(Target::user("alice"), Target::user("bob"), credit)
            .provide_service(Target::user("bob"), Target::user("alice"), "lesson", service_len)
            .borrow_resource(Target::user("alice"), Target::user("bob"), "ladder", loan_len);

        let first_negative = [credit, service_len, loan_len]
            .iter()
            .position(|value| *value < 0);

        match (draft.validate(&TimeStamp::new()), first_negative) {
            (Ok(()), None) => {}
            (Err(OfferError::NegativeDuration { index, value }), Some(expected)) => {
                prop_assert_eq!(index, expected);
                prop_assert!(value < 0);
            }
            (other, _) => prop_assert!(false, "unexpected outcome {:?}", other),
        }
    }

    /// Transferring any resource twice is rejected, whatever else is offered
    #[test]
    fn duplicate_transfers_are_caught(
        resources in prop::collection::vec("[a-d]", 1..6),
    ) {
        let mut draft = OfferDraft::new().set_author("alice");
        for resource in &resources {
            draft = draft.transfer_resource(Target::user("alice"), Target::user("bob"), resource.as_str());
        }

        let mut distinct = resources.clone();
        distinct.sort();
        distinct.dedup();

        let result = draft.validate(&TimeStamp::new());
        if distinct.len() == resources.len() {
            prop_assert!(result.is_ok());
        } else {
            prop_assert!(matches!(result, Err(OfferError::DuplicateResourceInOffer(_))));
        }
    }
}
