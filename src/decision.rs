//! One accept/decline vote per participant per offer.
use super::keys::{OfferKey, UserKey, UserKeys};
use super::timestamp::TimeStamp;
use chrono::Utc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum Decision {
    #[n(0)]
    Pending,
    #[n(1)]
    Accepted,
    #[n(2)]
    Declined,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct OfferDecision {
    #[n(0)]
    pub offer_key: OfferKey,
    #[n(1)]
    pub user_key: UserKey,
    #[n(2)]
    pub decision: Decision,
    #[n(3)]
    pub decided_at: Option<TimeStamp<Utc>>,
}

/// All decision rows of one offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionLedger {
    pub offer_key: OfferKey,
    pub rows: Vec<OfferDecision>,
}

/// What the ledger says about the offer as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOutcome {
    Unanimous,
    Declined(UserKey),
    Open,
}

/// Who has answered so far. Sent to participants for visibility only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecisionTally {
    pub accepted: Vec<UserKey>,
    pub declined: Vec<UserKey>,
    pub pending: Vec<UserKey>,
}

impl OfferDecision {
    pub fn pending(offer_key: OfferKey, user_key: UserKey) -> Self {
        Self {
            offer_key,
            user_key,
            decision: Decision::Pending,
            decided_at: None,
        }
    }

    pub fn decide(&mut self, decision: Decision, at: TimeStamp<Utc>) {
        self.decision = decision;
        self.decided_at = Some(at);
    }
}

impl DecisionLedger {
    pub fn new(offer_key: OfferKey, rows: Vec<OfferDecision>) -> Self {
        Self { offer_key, rows }
    }

    /// A fresh ledger with one pending row per participant.
    pub fn open(offer_key: &OfferKey, participants: &UserKeys) -> Self {
        let rows = participants
            .iter()
            .map(|user| OfferDecision::pending(offer_key.clone(), user.clone()))
            .collect();
        Self::new(offer_key.clone(), rows)
    }

    pub fn get(&self, user: &UserKey) -> Option<&OfferDecision> {
        self.rows.iter().find(|row| &row.user_key == user)
    }

    pub fn is_unanimous(&self) -> bool {
        !self.rows.is_empty()
            && self
                .rows
                .iter()
                .all(|row| row.decision == Decision::Accepted)
    }

    pub fn declined_by(&self) -> Option<&UserKey> {
        self.rows
            .iter()
            .find(|row| row.decision == Decision::Declined)
            .map(|row| &row.user_key)
    }

    pub fn outcome(&self) -> LedgerOutcome {
        if let Some(user) = self.declined_by() {
            return LedgerOutcome::Declined(user.clone());
        }
        if self.is_unanimous() {
            return LedgerOutcome::Unanimous;
        }
        LedgerOutcome::Open
    }

    pub fn tally(&self) -> DecisionTally {
        let mut tally = DecisionTally::default();
        for row in &self.rows {
            let bucket = match row.decision {
                Decision::Accepted => &mut tally.accepted,
                Decision::Declined => &mut tally.declined,
                Decision::Pending => &mut tally.pending,
            };
            bucket.push(row.user_key.clone());
        }
        tally
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Decision::Pending => "pending",
            Decision::Accepted => "accepted",
            Decision::Declined => "declined",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(users: &[&str]) -> DecisionLedger {
        let participants = users.iter().map(|u| UserKey::new(*u)).collect();
        DecisionLedger::open(&OfferKey::new("offer_a"), &participants)
    }

    fn decide(ledger: &mut DecisionLedger, user: &str, decision: Decision) {
        let row = ledger
            .rows
            .iter_mut()
            .find(|row| row.user_key.as_str() == user)
            .unwrap();
        row.decide(decision, TimeStamp::new());
    }

    #[test]
    fn open_ledger_has_one_pending_row_per_participant() {
        let ledger = ledger(&["alice", "bob", "alice"]);
        assert_eq!(ledger.rows.len(), 2);
        assert_eq!(ledger.outcome(), LedgerOutcome::Open);
        assert_eq!(ledger.tally().pending.len(), 2);
    }

    #[test]
    fn unanimous_only_when_everyone_accepted() {
        let mut ledger = ledger(&["alice", "bob", "carol"]);
        decide(&mut ledger, "alice", Decision::Accepted);
        decide(&mut ledger, "bob", Decision::Accepted);
        assert_eq!(ledger.outcome(), LedgerOutcome::Open);

        decide(&mut ledger, "carol", Decision::Accepted);
        assert_eq!(ledger.outcome(), LedgerOutcome::Unanimous);
    }

    #[test]
    fn single_decline_wins() {
        let mut ledger = ledger(&["alice", "bob", "carol"]);
        decide(&mut ledger, "alice", Decision::Accepted);
        decide(&mut ledger, "bob", Decision::Accepted);
        decide(&mut ledger, "carol", Decision::Declined);

        assert_eq!(
            ledger.outcome(),
            LedgerOutcome::Declined(UserKey::new("carol"))
        );
        let tally = ledger.tally();
        assert_eq!(tally.accepted.len(), 2);
        assert_eq!(tally.declined, vec![UserKey::new("carol")]);
    }

    #[test]
    fn empty_ledger_is_never_unanimous() {
        let ledger = DecisionLedger::new(OfferKey::new("offer_a"), vec![]);
        assert!(!ledger.is_unanimous());
    }
}
