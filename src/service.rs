//! Service layer API for the offer negotiation workflow
//!
//! Every state change runs as one sled transaction that writes, re-reads and
//! transitions in a single step. Notifications are sent only after the
//! transaction has committed.
use super::approval::ApprovalResolver;
use super::collaborators::{NotificationSink, ParticipantDirectory, ResourceCatalog};
use super::config::EngineConfig;
use super::decision::{Decision, DecisionLedger, LedgerOutcome};
use super::draft::OfferDraft;
use super::error::OfferError;
use super::history::{OfferHistory, Witness, WitnessType};
use super::item::{BondDirection, Confirmation, OfferItem};
use super::keys::{OfferItemKey, OfferKey, ResourceKey, UserKey, UserKeys};
use super::notify::{self, Notifier};
use super::offer::{Offer, OfferStatus, OfferView};
use super::store::{OfferStore, OfferTx, TxResult, abort, reject};
use super::target::Target;
use super::timestamp::TimeStamp;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The systems the engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub directory: Arc<dyn ParticipantDirectory>,
    pub catalog: Arc<dyn ResourceCatalog>,
    pub sink: Arc<dyn NotificationSink>,
}

impl Collaborators {
    pub fn new(
        directory: Arc<dyn ParticipantDirectory>,
        catalog: Arc<dyn ResourceCatalog>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            directory,
            catalog,
            sink,
        }
    }
}

pub struct OfferService {
    store: OfferStore,
    resolver: ApprovalResolver,
    notifier: Notifier,
    catalog: Arc<dyn ResourceCatalog>,
    config: EngineConfig,
}

// What a committed decision did to the offer.
enum DecisionEffect {
    Unchanged,
    StillPending(DecisionLedger),
    Declined,
    Accepted(Option<Vec<OfferItem>>),
}

// What a committed confirmation did to the offer.
enum ConfirmEffect {
    Unchanged,
    Confirmed {
        offer: Offer,
        item: OfferItem,
        completed: Option<Vec<OfferItem>>,
    },
}

impl OfferService {
    pub fn new(
        instance: Arc<sled::Db>,
        collaborators: Collaborators,
        config: EngineConfig,
    ) -> Result<Self, OfferError> {
        let Collaborators {
            directory,
            catalog,
            sink,
        } = collaborators;

        Ok(Self {
            store: OfferStore::new(instance)?,
            resolver: ApprovalResolver::new(directory, config.approver_roles.clone()),
            notifier: Notifier::new(sink, catalog.clone()),
            catalog,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Submit a new offer. Every participant gets one pending decision and
    /// an accept/decline prompt.
    pub fn submit_offer(&self, draft: OfferDraft) -> Result<OfferView, OfferError> {
        let now = TimeStamp::new();

        // Apply the configured lifetime to drafts without one
        let mut draft = draft;
        if draft.expires_at.is_none() {
            draft.expires_at = self
                .config
                .default_offer_ttl
                .and_then(|ttl| now.checked_add(ttl));
        }

        // Validate and key the items
        let offer_key = OfferKey::generate()?;
        let items = draft.finalise(&offer_key, &now)?;
        let author = draft.author.clone().ok_or(OfferError::MissingAuthor)?;

        if self.config.require_resource_owner {
            self.check_ownership(&items)?;
        }

        // Everyone on either side of any item takes part in the decision
        let participants = self.resolver.participants(&items)?;
        if participants.is_empty() {
            return Err(OfferError::NoParticipants);
        }

        let offer = Offer::new(
            offer_key,
            author,
            draft.message.clone(),
            draft.expires_at.clone(),
            items.iter().map(|item| item.key.clone()).collect(),
            participants.clone(),
        );
        let ledger = DecisionLedger::open(&offer.key, &participants);
        let witness = Witness::by(
            &offer.key,
            &offer.author,
            WitnessType::Submit {
                item_count: items.len() as u32,
                participants: offer.participants.clone(),
            },
        );

        // Persist offer, items and pending decisions together
        let offer = self
            .store
            .save_submission(&offer, &items, &ledger, witness)?;
        info!(
            offer = %offer.key,
            author = %offer.author,
            items = items.len(),
            participants = participants.len(),
            "offer submitted"
        );

        let titles = self.notifier.resource_titles(&items);
        for user in &participants {
            self.notifier.deliver(
                &UserKeys::from([user.clone()]),
                notify::proposal(&offer, &items, &titles, user),
            );
        }
        if let Some(message) = notify::custom_message(&offer) {
            self.notifier.deliver(&participants, message);
        }

        Ok(OfferView {
            offer,
            items,
            decisions: ledger,
        })
    }

    /// Record a participant's accept or decline vote
    pub fn record_decision(
        &self,
        offer_key: &OfferKey,
        user: &UserKey,
        decision: Decision,
    ) -> Result<OfferView, OfferError> {
        if decision == Decision::Pending {
            return Err(OfferError::InvalidDecision);
        }

        let (offer, effect) = self.store.atomically(|tx| {
            let mut offer = tx.get_offer(offer_key)?;

            // Only participants hold a decision row
            let Some(mut row) = tx.get_decision(&offer.key, user)? else {
                return reject(OfferError::NotAParticipant(user.clone()));
            };
            if row.decision == decision {
                return Ok((offer, DecisionEffect::Unchanged));
            }
            if !offer.is_pending() {
                return reject(OfferError::OfferNotPending(offer.status));
            }

            row.decide(decision, TimeStamp::new());
            tx.save_decision(&row)?;
            let witness = Witness::by(&offer.key, user, WitnessType::Decide { decision });
            tx.record(&mut offer, witness)?;

            // Re-read the whole ledger inside the same transaction
            let ledger = tx.get_decisions(&offer)?;
            let effect = match ledger.outcome() {
                LedgerOutcome::Declined(_) => {
                    abort(offer.mark_declined(user.clone()))?;
                    let witness = Witness::by(&offer.key, user, WitnessType::Declined);
                    tx.record(&mut offer, witness)?;
                    DecisionEffect::Declined
                }
                LedgerOutcome::Unanimous => {
                    abort(offer.mark_accepted())?;
                    let witness = Witness::by(&offer.key, user, WitnessType::Accepted);
                    tx.record(&mut offer, witness)?;
                    DecisionEffect::Accepted(settle(tx, &mut offer)?)
                }
                LedgerOutcome::Open => DecisionEffect::StillPending(ledger),
            };

            tx.save_offer(&offer)?;
            Ok((offer, effect))
        })?;

        let participants = offer.participant_keys();
        match effect {
            DecisionEffect::Unchanged => {
                debug!(offer = %offer.key, user = %user, %decision, "decision already recorded");
            }
            DecisionEffect::StillPending(ledger) => {
                info!(offer = %offer.key, user = %user, %decision, "decision recorded");
                self.notifier.deliver(
                    &participants,
                    notify::decision_tally(&offer.key, user, &ledger),
                );
            }
            DecisionEffect::Declined => {
                info!(offer = %offer.key, user = %user, "offer declined");
                self.notifier
                    .deliver(&participants, notify::offer_declined(&offer, user));
            }
            DecisionEffect::Accepted(completed) => {
                info!(offer = %offer.key, user = %user, "offer accepted by everyone");
                match self.store.get_items(&offer) {
                    Ok(items) => self.announce_acceptance(&offer, &items, &participants),
                    Err(e) => warn!(offer = %offer.key, error = %e, "could not announce acceptance"),
                }
                if let Some(items) = completed {
                    info!(offer = %offer.key, "offer completed");
                    self.notifier
                        .deliver(&participants, notify::offer_completed(&offer, &items));
                }
            }
        }

        self.get_offer(offer_key)
    }

    /// Confirm one fulfillment step of an item of an accepted offer
    pub fn confirm_item(
        &self,
        item_key: &OfferItemKey,
        user: &UserKey,
        confirmation: Confirmation,
    ) -> Result<OfferView, OfferError> {
        // Resolve approvers fresh, outside the transaction
        let snapshot = self.store.get_item(item_key)?;
        let approvers = self.resolver.approvers_for(&snapshot)?;
        let direction = snapshot.bond_direction(user, &approvers);

        let effect = self.store.atomically(|tx| {
            let mut item = tx.get_item(item_key)?;
            let mut offer = tx.get_offer(&item.offer_key)?;

            match offer.status {
                OfferStatus::Accepted => {}
                OfferStatus::Completed => return reject(OfferError::AlreadyCompleted),
                status => return reject(OfferError::OfferNotAccepted(status)),
            }
            if direction == BondDirection::Neither {
                return reject(OfferError::NotPartOfOfferItem(user.clone()));
            }
            let expected = abort(item.expected_side(confirmation))?;
            if !direction.covers(expected) {
                return reject(OfferError::WrongSide { expected });
            }

            // Already confirmed: nothing to write, nothing to announce
            if !abort(item.apply_confirmation(confirmation))? {
                return Ok(ConfirmEffect::Unchanged);
            }
            tx.update_item(&item)?;
            let witness = Witness::by(
                &offer.key,
                user,
                WitnessType::Confirm {
                    item_key: item.key.clone(),
                    confirmation,
                },
            );
            tx.record(&mut offer, witness)?;

            let completed = settle(tx, &mut offer)?;
            tx.save_offer(&offer)?;
            Ok(ConfirmEffect::Confirmed {
                offer,
                item,
                completed,
            })
        })?;

        match effect {
            ConfirmEffect::Unchanged => {
                debug!(item = %item_key, user = %user, %confirmation, "item already confirmed");
            }
            ConfirmEffect::Confirmed {
                offer,
                item,
                completed,
            } => {
                info!(
                    offer = %offer.key,
                    item = %item.key,
                    user = %user,
                    %confirmation,
                    "item confirmed"
                );
                let participants = offer.participant_keys();
                let titles = self.notifier.resource_titles(std::slice::from_ref(&item));
                self.notifier.deliver(
                    &participants,
                    notify::item_confirmed(&offer.key, &item, &titles, user, confirmation),
                );
                if let Some(items) = completed {
                    info!(offer = %offer.key, "offer completed");
                    self.notifier
                        .deliver(&participants, notify::offer_completed(&offer, &items));
                }
            }
        }

        self.get_offer(&snapshot.offer_key)
    }

    /// Withdraw a pending offer. Only its author may do so.
    pub fn cancel_offer(&self, offer_key: &OfferKey, user: &UserKey) -> Result<Offer, OfferError> {
        let offer = self.store.atomically(|tx| {
            let mut offer = tx.get_offer(offer_key)?;
            if &offer.author != user {
                return reject(OfferError::NotOfferAuthor(user.clone()));
            }
            if !offer.is_pending() {
                return reject(OfferError::OfferNotPending(offer.status));
            }

            abort(offer.mark_canceled())?;
            let witness = Witness::by(&offer.key, user, WitnessType::Canceled);
            tx.record(&mut offer, witness)?;
            tx.save_offer(&offer)?;
            Ok(offer)
        })?;

        info!(offer = %offer.key, user = %user, "offer canceled");
        self.notifier
            .deliver(&offer.participant_keys(), notify::offer_canceled(&offer));

        Ok(offer)
    }

    /// Expire a pending offer whose expiration time has passed. Competes
    /// with concurrent decisions on the same transaction footing, so an
    /// offer accepted first is left alone.
    pub fn expire_offer(
        &self,
        offer_key: &OfferKey,
        now: &TimeStamp<Utc>,
    ) -> Result<Offer, OfferError> {
        let offer = self.store.atomically(|tx| {
            let mut offer = tx.get_offer(offer_key)?;
            if !offer.is_pending() {
                return reject(OfferError::OfferNotPending(offer.status));
            }

            abort(offer.mark_expired(now))?;
            let witness = Witness::system(&offer.key, WitnessType::Expired);
            tx.record(&mut offer, witness)?;
            tx.save_offer(&offer)?;
            Ok(offer)
        })?;

        info!(offer = %offer.key, "offer expired");
        self.notifier
            .deliver(&offer.participant_keys(), notify::offer_expired(&offer));

        Ok(offer)
    }

    /// Expire every pending offer that is overdue at `now`. Offers that
    /// change state in the meantime are skipped.
    pub fn sweep_expired(&self, now: &TimeStamp<Utc>) -> Result<Vec<OfferKey>, OfferError> {
        let mut expired = Vec::new();
        for offer in self.store.offers()? {
            if !offer.is_pending() || !offer.is_overdue(now) {
                continue;
            }
            match self.expire_offer(&offer.key, now) {
                Ok(offer) => expired.push(offer.key),
                Err(e @ (OfferError::OfferNotPending(_) | OfferError::NotExpired)) => {
                    debug!(offer = %offer.key, error = %e, "offer left the sweep");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(expired)
    }

    /// Load an offer with its items and decisions
    pub fn get_offer(&self, offer_key: &OfferKey) -> Result<OfferView, OfferError> {
        let offer = self.store.get_offer(offer_key)?;
        let items = self.store.get_items(&offer)?;
        let decisions = self.store.get_decisions(&offer)?;
        Ok(OfferView {
            offer,
            items,
            decisions,
        })
    }

    /// Offers the user takes part in or authored, oldest first.
    pub fn offers_for_user(&self, user: &UserKey) -> Result<Vec<Offer>, OfferError> {
        let mut offers: Vec<Offer> = self
            .store
            .offers()?
            .into_iter()
            .filter(|offer| &offer.author == user || offer.is_participant(user))
            .collect();
        offers.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(offers)
    }

    pub fn history(&self, offer_key: &OfferKey) -> Result<OfferHistory, OfferError> {
        // Surface unknown offers as not found rather than an empty trail
        self.store.get_offer(offer_key)?;
        self.store.history(offer_key)
    }

    pub fn find_giving_approvers(&self, item_key: &OfferItemKey) -> Result<UserKeys, OfferError> {
        let item = self.store.get_item(item_key)?;
        self.resolver.find_giving_approvers(&item)
    }

    pub fn find_receiving_approvers(
        &self,
        item_key: &OfferItemKey,
    ) -> Result<UserKeys, OfferError> {
        let item = self.store.get_item(item_key)?;
        self.resolver.find_receiving_approvers(&item)
    }

    pub fn bond_direction(
        &self,
        item_key: &OfferItemKey,
        user: &UserKey,
    ) -> Result<BondDirection, OfferError> {
        let item = self.store.get_item(item_key)?;
        let approvers = self.resolver.approvers_for(&item)?;
        Ok(item.bond_direction(user, &approvers))
    }

    // A resource can only be given, lent or provided by its catalog owner.
    // Resources the catalog does not know carry no owner to check.
    fn check_ownership(&self, items: &[OfferItem]) -> Result<(), OfferError> {
        let keys: Vec<ResourceKey> = items.iter().filter_map(|i| i.resource().cloned()).collect();
        if keys.is_empty() {
            return Ok(());
        }

        let owners: HashMap<ResourceKey, Target> = self
            .catalog
            .get_resources_by_keys(&keys)
            .map_err(OfferError::Catalog)?
            .into_iter()
            .filter_map(|summary| summary.owner.map(|owner| (summary.key, owner)))
            .collect();

        for item in items {
            let Some(resource) = item.resource() else {
                continue;
            };
            if owners.get(resource).is_some_and(|owner| owner != &item.from) {
                return Err(OfferError::ResourceNotOwnedByGiver(resource.clone()));
            }
        }
        Ok(())
    }

    fn announce_acceptance(&self, offer: &Offer, items: &[OfferItem], participants: &UserKeys) {
        self.notifier
            .deliver(participants, notify::offer_accepted(offer));

        let mut resolved = Vec::with_capacity(items.len());
        for item in items {
            match self.resolver.approvers_for(item) {
                Ok(approvers) => resolved.push((item, approvers)),
                Err(e) => {
                    warn!(offer = %offer.key, error = %e, "skipping fulfillment checklists");
                    return;
                }
            }
        }

        let titles = self.notifier.resource_titles(items);
        for user in participants {
            let duties: Vec<(OfferItem, bool, bool)> = resolved
                .iter()
                .map(|(item, approvers)| {
                    let direction = item.bond_direction(user, approvers);
                    (
                        (*item).clone(),
                        direction.covers(BondDirection::Giving),
                        direction.covers(BondDirection::Receiving),
                    )
                })
                .collect();
            if let Some(checklist) = notify::fulfillment_checklist(offer, &duties, &titles, user) {
                self.notifier
                    .deliver(&UserKeys::from([user.clone()]), checklist);
            }
        }
    }
}

/// Completion check for an accepted offer. Time credits move once every
/// other item is complete, and the offer completes when nothing is left
/// open. Returns the final items when the offer completed.
fn settle(tx: &OfferTx<'_>, offer: &mut Offer) -> TxResult<Option<Vec<OfferItem>>> {
    let mut items = tx.get_items(offer)?;
    let goods_done = items
        .iter()
        .filter(|item| !item.is_credit_transfer())
        .all(OfferItem::is_completed);
    if !goods_done {
        return Ok(None);
    }

    for item in items.iter_mut() {
        if item.mark_credits_transferred() {
            tx.update_item(item)?;
            let witness = Witness::system(
                &offer.key,
                WitnessType::CreditsTransferred {
                    item_key: item.key.clone(),
                    amount_secs: item.credit_amount_secs().unwrap_or_default(),
                },
            );
            tx.record(offer, witness)?;
        }
    }

    if !items.iter().all(OfferItem::is_completed) {
        return Ok(None);
    }
    abort(offer.mark_completed(TimeStamp::new()))?;
    let witness = Witness::system(&offer.key, WitnessType::Completed);
    tx.record(offer, witness)?;
    Ok(Some(items))
}

impl std::fmt::Debug for OfferService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfferService")
            .field("resolver", &self.resolver)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
