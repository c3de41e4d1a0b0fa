//! Offer drafts, assembled by the author before submission.
use super::error::OfferError;
use super::item::{
    BorrowResource, CreditTransfer, ItemDetails, OfferItem, ProvideService, ResourceTransfer,
};
use super::keys::{OfferItemKey, OfferKey, ResourceKey, UserKey};
use super::target::Target;
use super::timestamp::TimeStamp;
use chrono::Utc;
use std::collections::BTreeSet;

/// One item as requested by the author, before it gets a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemSpec {
    CreditTransfer {
        from: Target,
        to: Target,
        amount_secs: i64,
    },
    ProvideService {
        from: Target,
        to: Target,
        resource: ResourceKey,
        duration_secs: i64,
    },
    /// `from` lends the resource to `to`.
    BorrowResource {
        from: Target,
        to: Target,
        resource: ResourceKey,
        duration_secs: i64,
    },
    ResourceTransfer {
        from: Target,
        to: Target,
        resource: ResourceKey,
    },
}

#[derive(Debug, Clone, Default)]
pub struct OfferDraft {
    pub author: Option<UserKey>,
    pub message: String,
    pub expires_at: Option<TimeStamp<Utc>>,
    pub items: Vec<ItemSpec>,
}

impl ItemSpec {
    pub fn from(&self) -> &Target {
        match self {
            ItemSpec::CreditTransfer { from, .. }
            | ItemSpec::ProvideService { from, .. }
            | ItemSpec::BorrowResource { from, .. }
            | ItemSpec::ResourceTransfer { from, .. } => from,
        }
    }

    pub fn to(&self) -> &Target {
        match self {
            ItemSpec::CreditTransfer { to, .. }
            | ItemSpec::ProvideService { to, .. }
            | ItemSpec::BorrowResource { to, .. }
            | ItemSpec::ResourceTransfer { to, .. } => to,
        }
    }

    pub fn resource(&self) -> Option<&ResourceKey> {
        match self {
            ItemSpec::CreditTransfer { .. } => None,
            ItemSpec::ProvideService { resource, .. }
            | ItemSpec::BorrowResource { resource, .. }
            | ItemSpec::ResourceTransfer { resource, .. } => Some(resource),
        }
    }

    fn time_value(&self) -> Option<i64> {
        match self {
            ItemSpec::CreditTransfer { amount_secs, .. } => Some(*amount_secs),
            ItemSpec::ProvideService { duration_secs, .. }
            | ItemSpec::BorrowResource { duration_secs, .. } => Some(*duration_secs),
            ItemSpec::ResourceTransfer { .. } => None,
        }
    }

    pub fn into_item(self, key: OfferItemKey, offer_key: OfferKey) -> OfferItem {
        let (from, to, details) = match self {
            ItemSpec::CreditTransfer {
                from,
                to,
                amount_secs,
            } => (
                from,
                to,
                ItemDetails::CreditTransfer(CreditTransfer {
                    amount_secs,
                    credits_transferred: false,
                }),
            ),
            ItemSpec::ProvideService {
                from,
                to,
                resource,
                duration_secs,
            } => (
                from,
                to,
                ItemDetails::ProvideService(ProvideService {
                    resource,
                    duration_secs,
                    service_given: false,
                    service_received: false,
                }),
            ),
            ItemSpec::BorrowResource {
                from,
                to,
                resource,
                duration_secs,
            } => (
                from,
                to,
                ItemDetails::BorrowResource(BorrowResource {
                    resource,
                    duration_secs,
                    item_taken: false,
                    item_given: false,
                    item_returned_back: false,
                    item_received_back: false,
                }),
            ),
            ItemSpec::ResourceTransfer { from, to, resource } => (
                from,
                to,
                ItemDetails::ResourceTransfer(ResourceTransfer {
                    resource,
                    item_given: false,
                    item_received: false,
                }),
            ),
        };
        OfferItem::new(key, offer_key, from, to, details)
    }
}

impl OfferDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_author(mut self, author: impl Into<UserKey>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn set_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn set_expiration(mut self, at: TimeStamp<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn transfer_credits(mut self, from: Target, to: Target, amount_secs: i64) -> Self {
        self.items.push(ItemSpec::CreditTransfer {
            from,
            to,
            amount_secs,
        });
        self
    }

    pub fn provide_service(
        mut self,
        from: Target,
        to: Target,
        resource: impl Into<ResourceKey>,
        duration_secs: i64,
    ) -> Self {
        self.items.push(ItemSpec::ProvideService {
            from,
            to,
            resource: resource.into(),
            duration_secs,
        });
        self
    }

    pub fn borrow_resource(
        mut self,
        lender: Target,
        borrower: Target,
        resource: impl Into<ResourceKey>,
        duration_secs: i64,
    ) -> Self {
        self.items.push(ItemSpec::BorrowResource {
            from: lender,
            to: borrower,
            resource: resource.into(),
            duration_secs,
        });
        self
    }

    pub fn transfer_resource(
        mut self,
        from: Target,
        to: Target,
        resource: impl Into<ResourceKey>,
    ) -> Self {
        self.items.push(ItemSpec::ResourceTransfer {
            from,
            to,
            resource: resource.into(),
        });
        self
    }

    /// Checks everything that can be checked without collaborators. Nothing
    /// is persisted for a draft that fails here.
    pub fn validate(&self, now: &TimeStamp<Utc>) -> Result<(), OfferError> {
        if self.author.is_none() {
            return Err(OfferError::MissingAuthor);
        }
        if self.items.is_empty() {
            return Err(OfferError::EmptyOffer);
        }

        let mut transferred = BTreeSet::new();
        for (index, item) in self.items.iter().enumerate() {
            if item.from() == item.to() {
                return Err(OfferError::MalformedTarget(format!(
                    "item {index} gives and receives on the same target {}",
                    item.from()
                )));
            }
            if let Some(value) = item.time_value().filter(|v| *v < 0) {
                return Err(OfferError::NegativeDuration { index, value });
            }
            if let ItemSpec::ResourceTransfer { resource, .. } = item {
                if !transferred.insert(resource) {
                    return Err(OfferError::DuplicateResourceInOffer(resource.clone()));
                }
            }
        }

        if let Some(at) = &self.expires_at {
            if at <= now {
                return Err(OfferError::ExpirationInPast);
            }
            if !at.is_storable() {
                return Err(OfferError::ExpirationOutOfRange);
            }
        }

        Ok(())
    }

    /// Validates the draft and turns it into keyed items of `offer_key`.
    pub fn finalise(
        &self,
        offer_key: &OfferKey,
        now: &TimeStamp<Utc>,
    ) -> Result<Vec<OfferItem>, OfferError> {
        self.validate(now)?;
        let mut items = Vec::with_capacity(self.items.len());
        for spec in &self.items {
            items.push(spec.clone().into_item(OfferItemKey::generate()?, offer_key.clone()));
        }
        Ok(items)
    }
}
