//! sled backed persistence for offers, items, decisions and history.
//!
//! Reads that drive a state transition go through [`OfferStore::atomically`],
//! which runs the closure inside one transaction spanning all four trees.
//! sled re-runs the closure on conflict, so it must not have side effects
//! beyond the transactional writes.
use super::decision::{DecisionLedger, OfferDecision};
use super::error::OfferError;
use super::history::{HistoryEntry, OfferHistory, Witness};
use super::item::OfferItem;
use super::keys::{OfferItemKey, OfferKey, UserKey};
use super::offer::Offer;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree,
};
use sled::{Db, Transactional, Tree};
use std::sync::Arc;

const OFFERS_TREE: &str = "offers";
const ITEMS_TREE: &str = "offer_items";
const DECISIONS_TREE: &str = "offer_decisions";
const HISTORY_TREE: &str = "offer_history";

pub type TxResult<T> = ConflictableTransactionResult<T, OfferError>;

pub struct OfferStore {
    offers: Tree,
    items: Tree,
    decisions: Tree,
    history: Tree,
}

/// View of the store inside a transaction.
pub struct OfferTx<'a> {
    offers: &'a TransactionalTree,
    items: &'a TransactionalTree,
    decisions: &'a TransactionalTree,
    history: &'a TransactionalTree,
}

fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, OfferError> {
    minicbor::to_vec(value).map_err(|e| OfferError::Codec(e.to_string()))
}

fn decode<T>(bytes: &[u8]) -> Result<T, OfferError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    minicbor::decode(bytes).map_err(|e| OfferError::Codec(e.to_string()))
}

/// Lifts a domain result into a transaction result, aborting on error.
pub fn abort<T>(result: Result<T, OfferError>) -> TxResult<T> {
    result.map_err(ConflictableTransactionError::Abort)
}

pub fn reject<T>(error: OfferError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(error))
}

fn decision_row_key(offer: &OfferKey, user: &UserKey) -> Vec<u8> {
    format!("{offer}/{user}").into_bytes()
}

fn history_prefix(offer: &OfferKey) -> Vec<u8> {
    format!("{offer}/").into_bytes()
}

fn history_row_key(offer: &OfferKey, revision: u64) -> Vec<u8> {
    let mut key = history_prefix(offer);
    key.extend_from_slice(&revision.to_be_bytes());
    key
}

impl OfferStore {
    pub fn new(instance: Arc<Db>) -> Result<Self, OfferError> {
        Ok(Self {
            offers: instance.open_tree(OFFERS_TREE)?,
            items: instance.open_tree(ITEMS_TREE)?,
            decisions: instance.open_tree(DECISIONS_TREE)?,
            history: instance.open_tree(HISTORY_TREE)?,
        })
    }

    /// Runs `f` as one atomic unit over every tree of the store.
    pub fn atomically<T, F>(&self, f: F) -> Result<T, OfferError>
    where
        F: Fn(&OfferTx<'_>) -> TxResult<T>,
    {
        (&self.offers, &self.items, &self.decisions, &self.history)
            .transaction(|(offers, items, decisions, history)| {
                f(&OfferTx {
                    offers,
                    items,
                    decisions,
                    history,
                })
            })
            .map_err(OfferError::from)
    }

    /// Persists a freshly submitted offer with its items and pending ledger.
    pub fn save_submission(
        &self,
        offer: &Offer,
        items: &[OfferItem],
        ledger: &DecisionLedger,
        witness: Witness,
    ) -> Result<Offer, OfferError> {
        self.atomically(|tx| {
            let mut offer = offer.clone();
            if tx.offers.get(offer.key.as_bytes())?.is_some() {
                return reject(OfferError::Identifier(format!(
                    "offer key {} already in use",
                    offer.key
                )));
            }
            for item in items {
                tx.update_item(item)?;
            }
            for row in &ledger.rows {
                tx.save_decision(row)?;
            }
            tx.record(&mut offer, witness.clone())?;
            tx.save_offer(&offer)?;
            Ok(offer)
        })
    }

    pub fn get_offer(&self, key: &OfferKey) -> Result<Offer, OfferError> {
        match self.offers.get(key.as_bytes())? {
            Some(bytes) => decode(&bytes),
            None => Err(OfferError::OfferNotFound(key.clone())),
        }
    }

    pub fn get_item(&self, key: &OfferItemKey) -> Result<OfferItem, OfferError> {
        match self.items.get(key.as_bytes())? {
            Some(bytes) => decode(&bytes),
            None => Err(OfferError::ItemNotFound(key.clone())),
        }
    }

    pub fn get_items(&self, offer: &Offer) -> Result<Vec<OfferItem>, OfferError> {
        offer.item_keys.iter().map(|key| self.get_item(key)).collect()
    }

    pub fn get_decisions(&self, offer: &Offer) -> Result<DecisionLedger, OfferError> {
        let mut rows = Vec::with_capacity(offer.participants.len());
        for user in &offer.participants {
            if let Some(bytes) = self.decisions.get(decision_row_key(&offer.key, user))? {
                rows.push(decode(&bytes)?);
            }
        }
        Ok(DecisionLedger::new(offer.key.clone(), rows))
    }

    pub fn history(&self, key: &OfferKey) -> Result<OfferHistory, OfferError> {
        let entries = self
            .history
            .scan_prefix(history_prefix(key))
            .values()
            .map(|bytes| decode::<HistoryEntry>(&bytes?))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(OfferHistory {
            offer_key: key.clone(),
            entries,
        })
    }

    pub fn offers(&self) -> Result<Vec<Offer>, OfferError> {
        self.offers
            .iter()
            .values()
            .map(|bytes| decode::<Offer>(&bytes?))
            .collect()
    }
}

impl OfferTx<'_> {
    pub fn get_offer(&self, key: &OfferKey) -> TxResult<Offer> {
        match self.offers.get(key.as_bytes())? {
            Some(bytes) => abort(decode(&bytes)),
            None => reject(OfferError::OfferNotFound(key.clone())),
        }
    }

    pub fn save_offer(&self, offer: &Offer) -> TxResult<()> {
        let bytes = abort(encode(offer))?;
        self.offers.insert(offer.key.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn get_item(&self, key: &OfferItemKey) -> TxResult<OfferItem> {
        match self.items.get(key.as_bytes())? {
            Some(bytes) => abort(decode(&bytes)),
            None => reject(OfferError::ItemNotFound(key.clone())),
        }
    }

    pub fn update_item(&self, item: &OfferItem) -> TxResult<()> {
        let bytes = abort(encode(item))?;
        self.items.insert(item.key.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn get_items(&self, offer: &Offer) -> TxResult<Vec<OfferItem>> {
        offer.item_keys.iter().map(|key| self.get_item(key)).collect()
    }

    pub fn get_decision(&self, offer: &OfferKey, user: &UserKey) -> TxResult<Option<OfferDecision>> {
        match self.decisions.get(decision_row_key(offer, user))? {
            Some(bytes) => abort(decode(&bytes)).map(Some),
            None => Ok(None),
        }
    }

    pub fn save_decision(&self, decision: &OfferDecision) -> TxResult<()> {
        let bytes = abort(encode(decision))?;
        self.decisions
            .insert(decision_row_key(&decision.offer_key, &decision.user_key), bytes)?;
        Ok(())
    }

    pub fn get_decisions(&self, offer: &Offer) -> TxResult<DecisionLedger> {
        let mut rows = Vec::with_capacity(offer.participants.len());
        for user in &offer.participants {
            if let Some(row) = self.get_decision(&offer.key, user)? {
                rows.push(row);
            }
        }
        Ok(DecisionLedger::new(offer.key.clone(), rows))
    }

    /// Appends `witness` to the offer's history and bumps its revision. The
    /// caller still has to save the offer.
    pub fn record(&self, offer: &mut Offer, witness: Witness) -> TxResult<()> {
        let entry = abort(witness.into_entry())?;
        let bytes = abort(encode(&entry))?;
        self.history
            .insert(history_row_key(&offer.key, offer.revision), bytes)?;
        offer.revision += 1;
        Ok(())
    }
}

trait AsBytes {
    fn as_bytes(&self) -> &[u8];
}

impl AsBytes for OfferKey {
    fn as_bytes(&self) -> &[u8] {
        self.as_str().as_bytes()
    }
}

impl AsBytes for OfferItemKey {
    fn as_bytes(&self) -> &[u8] {
        self.as_str().as_bytes()
    }
}
