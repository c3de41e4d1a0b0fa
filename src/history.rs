//! Audit trail of an offer.
//!
//! Each state change appends a witness. A witness is stored together with the
//! sha256 digest of its CBOR encoding so the trail can be checked later.
use super::decision::Decision;
use super::error::OfferError;
use super::item::Confirmation;
use super::keys::{OfferItemKey, OfferKey, UserKey};
use super::timestamp::TimeStamp;
use chrono::Utc;
use tracing::info;

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct Witness {
    #[n(0)]
    pub offer_key: OfferKey,
    // absent for system actions such as expiry or automatic credit transfers
    #[n(1)]
    pub user: Option<UserKey>,
    #[n(2)]
    pub timestamp: TimeStamp<Utc>,
    #[n(3)]
    pub witness_type: WitnessType,
}

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub enum WitnessType {
    #[n(0)]
    Submit {
        #[n(0)]
        item_count: u32,
        #[n(1)]
        participants: Vec<UserKey>,
    },
    #[n(1)]
    Decide {
        #[n(0)]
        decision: Decision,
    },
    #[n(2)]
    Accepted,
    #[n(3)]
    Declined,
    #[n(4)]
    Canceled,
    #[n(5)]
    Expired,
    #[n(6)]
    Confirm {
        #[n(0)]
        item_key: OfferItemKey,
        #[n(1)]
        confirmation: Confirmation,
    },
    #[n(7)]
    CreditsTransferred {
        #[n(0)]
        item_key: OfferItemKey,
        #[n(1)]
        amount_secs: i64,
    },
    #[n(8)]
    Completed,
}

/// A witness as persisted: the digest of its encoding plus the witness.
#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct HistoryEntry {
    #[n(0)]
    pub hash: String,
    #[n(1)]
    pub witness: Witness,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferHistory {
    pub offer_key: OfferKey,
    pub entries: Vec<HistoryEntry>,
}

impl Witness {
    pub fn new(
        offer_key: OfferKey,
        user: Option<UserKey>,
        timestamp: TimeStamp<Utc>,
        witness_type: WitnessType,
    ) -> Self {
        Self {
            offer_key,
            user,
            timestamp,
            witness_type,
        }
    }
    pub fn by(offer_key: &OfferKey, user: &UserKey, witness_type: WitnessType) -> Self {
        Self::new(
            offer_key.clone(),
            Some(user.clone()),
            TimeStamp::new(),
            witness_type,
        )
    }
    pub fn system(offer_key: &OfferKey, witness_type: WitnessType) -> Self {
        Self::new(offer_key.clone(), None, TimeStamp::new(), witness_type)
    }
    pub fn build(&self) -> Result<(String, Vec<u8>), OfferError> {
        let cbor = minicbor::to_vec(self).map_err(|e| OfferError::Codec(e.to_string()))?;
        let hash = sha256::digest(&cbor);

        Ok((hash, cbor))
    }
    pub fn into_entry(self) -> Result<HistoryEntry, OfferError> {
        let (hash, _) = self.build()?;
        Ok(HistoryEntry {
            hash,
            witness: self,
        })
    }
}

impl OfferHistory {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn witness_types(&self) -> Vec<&WitnessType> {
        self.entries
            .iter()
            .map(|entry| &entry.witness.witness_type)
            .collect()
    }

    /// Recomputes every digest. Returns the index of the first entry whose
    /// stored digest does not match its witness.
    pub fn verify(&self) -> Result<(), usize> {
        for (index, entry) in self.entries.iter().enumerate() {
            match entry.witness.build() {
                Ok((hash, _)) if hash == entry.hash => {}
                _ => return Err(index),
            }
        }
        Ok(())
    }

    pub fn view_history(&self) {
        for entry in &self.entries {
            let actor = entry
                .witness
                .user
                .as_ref()
                .map(UserKey::to_string)
                .unwrap_or_else(|| "system".into());
            info!(
                offer = %self.offer_key,
                at = %entry.witness.timestamp,
                actor = %actor,
                hash = %entry.hash,
                "{:?}",
                entry.witness.witness_type
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_covers_the_whole_witness() {
        let offer_key = OfferKey::new("offer_a");
        let entry = Witness::by(
            &offer_key,
            &UserKey::new("alice"),
            WitnessType::Decide {
                decision: Decision::Accepted,
            },
        )
        .into_entry()
        .unwrap();

        let mut history = OfferHistory {
            offer_key,
            entries: vec![entry],
        };
        assert_eq!(history.verify(), Ok(()));

        history.entries[0].witness.witness_type = WitnessType::Decide {
            decision: Decision::Declined,
        };
        assert_eq!(history.verify(), Err(0));
    }

    #[test]
    fn witness_roundtrips_through_cbor() {
        let witness = Witness::system(
            &OfferKey::new("offer_a"),
            WitnessType::CreditsTransferred {
                item_key: OfferItemKey::new("item_a"),
                amount_secs: 3600,
            },
        );
        let (_, cbor) = witness.build().unwrap();
        let decoded: Witness = minicbor::decode(&cbor).unwrap();
        assert_eq!(witness, decoded);
    }
}
