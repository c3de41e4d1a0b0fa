//! Offer header and its status state machine.
//!
//! ```text
//! Pending --> Accepted --> Completed
//!    |
//!    +--> Declined | Canceled | Expired
//! ```
//!
//! Every state other than `Pending` and `Accepted` is terminal.
use super::decision::DecisionLedger;
use super::error::OfferError;
use super::item::OfferItem;
use super::keys::{OfferItemKey, OfferKey, UserKey, UserKeys};
use super::timestamp::TimeStamp;
use chrono::Utc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
pub enum OfferStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Accepted,
    #[n(2)]
    Completed,
    #[n(3)]
    Declined,
    #[n(4)]
    Canceled,
    #[n(5)]
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Offer {
    #[n(0)]
    pub key: OfferKey,
    #[n(1)]
    pub author: UserKey,
    #[n(2)]
    pub message: String,
    #[n(3)]
    pub status: OfferStatus,
    #[n(4)]
    pub created_at: TimeStamp<Utc>,
    #[n(5)]
    pub completed_at: Option<TimeStamp<Utc>>,
    #[n(6)]
    pub expires_at: Option<TimeStamp<Utc>>,
    // fixed at submission so a transaction can re-read items and decisions by key
    #[n(7)]
    pub item_keys: Vec<OfferItemKey>,
    #[n(8)]
    pub participants: Vec<UserKey>,
    #[n(9)]
    pub declined_by: Option<UserKey>,
    // number of history witnesses recorded so far
    #[n(10)]
    pub revision: u64,
}

/// An offer together with everything needed to display it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferView {
    pub offer: Offer,
    pub items: Vec<OfferItem>,
    pub decisions: DecisionLedger,
}

impl OfferStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OfferStatus::Completed
                | OfferStatus::Declined
                | OfferStatus::Canceled
                | OfferStatus::Expired
        )
    }

    pub fn can_transition_to(self, next: OfferStatus) -> bool {
        matches!(
            (self, next),
            (
                OfferStatus::Pending,
                OfferStatus::Accepted
                    | OfferStatus::Declined
                    | OfferStatus::Canceled
                    | OfferStatus::Expired
            ) | (OfferStatus::Accepted, OfferStatus::Completed)
        )
    }
}

impl std::fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Completed => "completed",
            OfferStatus::Declined => "declined",
            OfferStatus::Canceled => "canceled",
            OfferStatus::Expired => "expired",
        })
    }
}

impl Offer {
    pub fn new(
        key: OfferKey,
        author: UserKey,
        message: String,
        expires_at: Option<TimeStamp<Utc>>,
        item_keys: Vec<OfferItemKey>,
        participants: UserKeys,
    ) -> Self {
        Self {
            key,
            author,
            message,
            status: OfferStatus::Pending,
            created_at: TimeStamp::new(),
            completed_at: None,
            expires_at,
            item_keys,
            participants: participants.into_iter().collect(),
            declined_by: None,
            revision: 0,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == OfferStatus::Pending
    }

    pub fn participant_keys(&self) -> UserKeys {
        self.participants.iter().cloned().collect()
    }

    pub fn is_participant(&self, user: &UserKey) -> bool {
        self.participants.contains(user)
    }

    pub fn is_overdue(&self, now: &TimeStamp<Utc>) -> bool {
        self.expires_at.as_ref().is_some_and(|at| at <= now)
    }

    pub fn mark_accepted(&mut self) -> Result<(), OfferError> {
        self.transition(OfferStatus::Accepted)
    }

    pub fn mark_completed(&mut self, at: TimeStamp<Utc>) -> Result<(), OfferError> {
        self.transition(OfferStatus::Completed)?;
        self.completed_at = Some(at);
        Ok(())
    }

    pub fn mark_declined(&mut self, declined_by: UserKey) -> Result<(), OfferError> {
        self.transition(OfferStatus::Declined)?;
        self.declined_by = Some(declined_by);
        Ok(())
    }

    pub fn mark_canceled(&mut self) -> Result<(), OfferError> {
        self.transition(OfferStatus::Canceled)
    }

    pub fn mark_expired(&mut self, now: &TimeStamp<Utc>) -> Result<(), OfferError> {
        if !self.status.can_transition_to(OfferStatus::Expired) {
            return Err(OfferError::InvalidTransition {
                from: self.status,
                to: OfferStatus::Expired,
            });
        }
        if !self.is_overdue(now) {
            return Err(OfferError::NotExpired);
        }
        self.transition(OfferStatus::Expired)
    }

    fn transition(&mut self, next: OfferStatus) -> Result<(), OfferError> {
        if !self.status.can_transition_to(next) {
            return Err(OfferError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

impl OfferView {
    pub fn item(&self, key: &OfferItemKey) -> Option<&OfferItem> {
        self.items.iter().find(|item| &item.key == key)
    }

    pub fn all_items_completed(&self) -> bool {
        self.items.iter().all(OfferItem::is_completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_offer() -> Offer {
        Offer::new(
            OfferKey::new("offer_a"),
            UserKey::new("alice"),
            String::new(),
            None,
            vec![OfferItemKey::new("item_a")],
            [UserKey::new("alice"), UserKey::new("bob")].into(),
        )
    }

    #[test]
    fn completion_requires_acceptance_first() {
        let mut offer = pending_offer();
        assert!(matches!(
            offer.mark_completed(TimeStamp::new()),
            Err(OfferError::InvalidTransition {
                from: OfferStatus::Pending,
                to: OfferStatus::Completed
            })
        ));
        assert!(offer.completed_at.is_none());

        offer.mark_accepted().unwrap();
        offer.mark_completed(TimeStamp::new()).unwrap();
        assert_eq!(offer.status, OfferStatus::Completed);
        assert!(offer.completed_at.is_some());
    }

    #[test]
    fn terminal_states_are_immutable() {
        for terminal in [
            OfferStatus::Completed,
            OfferStatus::Declined,
            OfferStatus::Canceled,
            OfferStatus::Expired,
        ] {
            assert!(terminal.is_terminal());
            for next in [
                OfferStatus::Pending,
                OfferStatus::Accepted,
                OfferStatus::Completed,
                OfferStatus::Declined,
                OfferStatus::Canceled,
                OfferStatus::Expired,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn accepted_offer_cannot_be_declined() {
        let mut offer = pending_offer();
        offer.mark_accepted().unwrap();
        assert!(offer.mark_declined(UserKey::new("bob")).is_err());
        assert!(offer.declined_by.is_none());
    }

    #[test]
    fn expiry_needs_a_passed_deadline() {
        let now = TimeStamp::new();
        let mut offer = pending_offer();
        assert!(matches!(offer.mark_expired(&now), Err(OfferError::NotExpired)));

        offer.expires_at = TimeStamp::new_with(2020, 1, 1, 0, 0, 0);
        offer.mark_expired(&now).unwrap();
        assert_eq!(offer.status, OfferStatus::Expired);
    }

    #[test]
    fn offer_cbor_roundtrip() {
        let offer = pending_offer();
        let encoded = minicbor::to_vec(&offer).unwrap();
        let decoded: Offer = minicbor::decode(&encoded).unwrap();
        assert_eq!(offer, decoded);
    }
}
