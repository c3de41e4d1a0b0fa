//! Participant-facing messages for every offer transition.
//!
//! Delivery is best effort: it happens after the state change has been
//! committed, and a failing sink is logged and otherwise ignored.
use super::collaborators::{NotificationSink, ResourceCatalog};
use super::decision::{DecisionLedger, DecisionTally};
use super::item::{Confirmation, ItemDetails, OfferItem};
use super::keys::{OfferItemKey, OfferKey, ResourceKey, UserKey, UserKeys};
use super::offer::Offer;
use super::target::Target;
use super::utils::format_duration_secs;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    OfferProposed,
    OfferMessage,
    DecisionTally,
    OfferAccepted,
    FulfillmentChecklist,
    OfferDeclined,
    OfferCanceled,
    OfferExpired,
    ItemConfirmed,
    OfferCompleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub offer_key: OfferKey,
    pub kind: NotificationKind,
    pub headline: String,
    pub lines: Vec<String>,
    /// Set when the message is addressed to one participant in particular.
    pub addressed_to: Option<UserKey>,
    /// Set when the message is about a single item.
    pub item_key: Option<OfferItemKey>,
}

impl Notification {
    fn new(offer_key: &OfferKey, kind: NotificationKind, headline: impl Into<String>) -> Self {
        Self {
            offer_key: offer_key.clone(),
            kind,
            headline: headline.into(),
            lines: vec![],
            addressed_to: None,
            item_key: None,
        }
    }

    fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    fn addressed_to(mut self, user: &UserKey) -> Self {
        self.addressed_to = Some(user.clone());
        self
    }

    fn about(mut self, item: &OfferItemKey) -> Self {
        self.item_key = Some(item.clone());
        self
    }
}

/// Resource titles by key, with the key itself as the fallback label.
#[derive(Debug, Clone, Default)]
pub struct ResourceTitles(HashMap<ResourceKey, String>);

impl ResourceTitles {
    pub fn title(&self, key: &ResourceKey) -> String {
        self.0
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}

#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    catalog: Arc<dyn ResourceCatalog>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>, catalog: Arc<dyn ResourceCatalog>) -> Self {
        Self { sink, catalog }
    }

    pub fn deliver(&self, recipients: &UserKeys, notification: Notification) {
        if recipients.is_empty() {
            return;
        }
        match self.sink.notify(recipients, &notification) {
            Ok(()) => debug!(
                offer = %notification.offer_key,
                kind = ?notification.kind,
                "notification delivered"
            ),
            Err(e) => warn!(
                offer = %notification.offer_key,
                kind = ?notification.kind,
                error = %e,
                "notification delivery failed"
            ),
        }
    }

    /// Looks up resource titles for display. Catalog failures degrade to raw
    /// keys rather than failing the caller.
    pub fn resource_titles(&self, items: &[OfferItem]) -> ResourceTitles {
        let keys: Vec<ResourceKey> = items.iter().filter_map(|i| i.resource().cloned()).collect();
        if keys.is_empty() {
            return ResourceTitles::default();
        }
        match self.catalog.get_resources_by_keys(&keys) {
            Ok(summaries) => ResourceTitles(
                summaries
                    .into_iter()
                    .map(|summary| (summary.key, summary.title))
                    .collect(),
            ),
            Err(e) => {
                warn!(error = %e, "could not load resource titles");
                ResourceTitles::default()
            }
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier").finish_non_exhaustive()
    }
}

fn describe_item(item: &OfferItem, titles: &ResourceTitles) -> String {
    match &item.details {
        ItemDetails::CreditTransfer(c) => format!(
            "{} gets {} of time credits from {}",
            item.to,
            format_duration_secs(c.amount_secs),
            item.from
        ),
        ItemDetails::ProvideService(s) => format!(
            "{} provides {} ({}) to {}",
            item.from,
            titles.title(&s.resource),
            format_duration_secs(s.duration_secs),
            item.to
        ),
        ItemDetails::BorrowResource(b) => format!(
            "{} lends {} to {} for {}",
            item.from,
            titles.title(&b.resource),
            item.to,
            format_duration_secs(b.duration_secs)
        ),
        ItemDetails::ResourceTransfer(r) => format!(
            "{} gives {} to {}",
            item.from,
            titles.title(&r.resource),
            item.to
        ),
    }
}

/// Accept/decline prompt for one participant.
pub fn proposal(
    offer: &Offer,
    items: &[OfferItem],
    titles: &ResourceTitles,
    recipient: &UserKey,
) -> Notification {
    let mut notification = Notification::new(
        &offer.key,
        NotificationKind::OfferProposed,
        format!("{} is proposing an exchange", Target::User(offer.author.clone())),
    )
    .addressed_to(recipient);
    for item in items {
        notification = notification.line(describe_item(item, titles));
    }
    notification.line(format!("Accept or decline offer {}", offer.key))
}

/// The author's free text, sent on its own. `None` for a blank message.
pub fn custom_message(offer: &Offer) -> Option<Notification> {
    let message = offer.message.trim();
    if message.is_empty() {
        return None;
    }
    Some(Notification::new(
        &offer.key,
        NotificationKind::OfferMessage,
        message,
    ))
}

pub fn decision_tally(offer_key: &OfferKey, decided_by: &UserKey, ledger: &DecisionLedger) -> Notification {
    let DecisionTally {
        accepted,
        declined,
        pending,
    } = ledger.tally();
    let mut notification = Notification::new(
        offer_key,
        NotificationKind::DecisionTally,
        format!("{decided_by} has accepted the offer"),
    );
    for user in accepted {
        notification = notification.line(format!("{user} has accepted the offer"));
    }
    for user in pending {
        notification = notification.line(format!("{user} has not answered yet"));
    }
    for user in declined {
        notification = notification.line(format!("{user} declined the offer"));
    }
    notification
}

pub fn offer_accepted(offer: &Offer) -> Notification {
    Notification::new(
        &offer.key,
        NotificationKind::OfferAccepted,
        "Everyone accepted the offer",
    )
    .line(
        "Once you have kept your side of the bargain, confirm it. \
         Confirm as well when others give you what was agreed upon.",
    )
}

/// What `recipient` still has to confirm once the offer is accepted. `None`
/// when the participant has nothing to confirm by hand.
pub fn fulfillment_checklist(
    offer: &Offer,
    items: &[(OfferItem, bool, bool)],
    titles: &ResourceTitles,
    recipient: &UserKey,
) -> Option<Notification> {
    let mut notification = Notification::new(
        &offer.key,
        NotificationKind::FulfillmentChecklist,
        "Your part of the exchange",
    )
    .addressed_to(recipient);

    for (item, gives, receives) in items {
        if item.is_credit_transfer() {
            continue;
        }
        let what = describe_item(item, titles);
        if *gives {
            notification = notification.line(format!("Confirm once given: {what}"));
        }
        if *receives {
            notification = notification.line(format!("Confirm once received: {what}"));
        }
    }

    (!notification.lines.is_empty()).then_some(notification)
}

pub fn offer_declined(offer: &Offer, declined_by: &UserKey) -> Notification {
    Notification::new(
        &offer.key,
        NotificationKind::OfferDeclined,
        format!("{declined_by} declined the offer"),
    )
}

pub fn offer_canceled(offer: &Offer) -> Notification {
    Notification::new(
        &offer.key,
        NotificationKind::OfferCanceled,
        format!("{} canceled the offer", offer.author),
    )
}

pub fn offer_expired(offer: &Offer) -> Notification {
    Notification::new(
        &offer.key,
        NotificationKind::OfferExpired,
        "The offer expired before everyone answered",
    )
}

pub fn item_confirmed(
    offer_key: &OfferKey,
    item: &OfferItem,
    titles: &ResourceTitles,
    confirmed_by: &UserKey,
    confirmation: Confirmation,
) -> Notification {
    Notification::new(
        offer_key,
        NotificationKind::ItemConfirmed,
        format!("{confirmed_by} confirmed the item was {confirmation}"),
    )
    .about(&item.key)
    .line(describe_item(item, titles))
}

/// Single summary sent when the last item completes, listing the time
/// credits that moved.
pub fn offer_completed(offer: &Offer, items: &[OfferItem]) -> Notification {
    let mut notification = Notification::new(
        &offer.key,
        NotificationKind::OfferCompleted,
        "Everybody confirmed having received and given their part",
    );
    for item in items {
        if let Some(amount) = item.credit_amount_secs() {
            notification = notification.line(format!(
                "{} of time credits transferred from {} to {}",
                format_duration_secs(amount),
                item.from,
                item.to
            ));
        }
    }
    notification
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::CreditTransfer;

    fn offer(message: &str) -> Offer {
        Offer::new(
            OfferKey::new("offer_a"),
            UserKey::new("alice"),
            message.to_owned(),
            None,
            vec![],
            [UserKey::new("alice"), UserKey::new("bob")].into(),
        )
    }

    fn credit_item() -> OfferItem {
        OfferItem::new(
            OfferItemKey::new("item_a"),
            OfferKey::new("offer_a"),
            Target::user("bob"),
            Target::user("alice"),
            ItemDetails::CreditTransfer(CreditTransfer {
                amount_secs: 3600,
                credits_transferred: true,
            }),
        )
    }

    #[test]
    fn blank_message_is_not_sent() {
        assert!(custom_message(&offer("   ")).is_none());
        assert_eq!(
            custom_message(&offer("see you saturday")).unwrap().headline,
            "see you saturday"
        );
    }

    #[test]
    fn completion_summary_lists_credit_amounts() {
        let summary = offer_completed(&offer(""), &[credit_item()]);
        assert_eq!(summary.kind, NotificationKind::OfferCompleted);
        assert_eq!(
            summary.lines,
            vec!["1h of time credits transferred from user:bob to user:alice".to_owned()]
        );
    }

    #[test]
    fn checklist_skips_credit_transfers() {
        let checklist = fulfillment_checklist(
            &offer(""),
            &[(credit_item(), true, false)],
            &ResourceTitles::default(),
            &UserKey::new("bob"),
        );
        assert!(checklist.is_none());
    }

    #[test]
    fn confirmation_notice_names_the_item() {
        let notice = item_confirmed(
            &OfferKey::new("offer_a"),
            &credit_item(),
            &ResourceTitles::default(),
            &UserKey::new("bob"),
            Confirmation::Given,
        );
        assert_eq!(notice.item_key, Some(OfferItemKey::new("item_a")));
        assert_eq!(notice.headline, "bob confirmed the item was given");
    }
}
