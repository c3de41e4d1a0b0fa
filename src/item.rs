//! Exchangeable items and their completion rules.
//!
//! Every item moves something from its `from` target to its `to` target.
//! Completion is decided by the item's own confirmation flags only:
//!
//! | kind               | complete when                                          |
//! |--------------------|--------------------------------------------------------|
//! | `CreditTransfer`   | `credits_transferred`                                  |
//! | `ProvideService`   | `service_given && service_received`                    |
//! | `ResourceTransfer` | `item_given && item_received`                          |
//! | `BorrowResource`   | `item_taken && item_given && item_returned_back && item_received_back` |
use super::error::OfferError;
use super::keys::{OfferItemKey, OfferKey, ResourceKey, UserKey, UserKeys};
use super::target::Target;

/// Discriminant of [`ItemDetails`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
pub enum ItemKind {
    #[n(0)]
    CreditTransfer,
    #[n(1)]
    ProvideService,
    #[n(2)]
    BorrowResource,
    #[n(3)]
    ResourceTransfer,
}

/// Which side of an item a user stands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum BondDirection {
    #[n(0)]
    Giving,
    #[n(1)]
    Receiving,
    // resolved on both sides, e.g. an admin of both groups
    #[n(2)]
    Both,
    #[n(3)]
    Neither,
}

/// A fulfillment step a participant reports for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum Confirmation {
    /// Giver handed the resource over or provided the service.
    #[n(0)]
    Given,
    /// Receiver got the resource or service (for a loan: took it).
    #[n(1)]
    Received,
    /// Borrower brought a lent resource back.
    #[n(2)]
    Returned,
    /// Lender got a lent resource back.
    #[n(3)]
    ReceivedBack,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct CreditTransfer {
    #[n(0)]
    pub amount_secs: i64,
    #[n(1)]
    pub credits_transferred: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ProvideService {
    #[n(0)]
    pub resource: ResourceKey,
    #[n(1)]
    pub duration_secs: i64,
    #[n(2)]
    pub service_given: bool,
    #[n(3)]
    pub service_received: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct BorrowResource {
    #[n(0)]
    pub resource: ResourceKey,
    #[n(1)]
    pub duration_secs: i64,
    #[n(2)]
    pub item_taken: bool,
    #[n(3)]
    pub item_given: bool,
    #[n(4)]
    pub item_returned_back: bool,
    #[n(5)]
    pub item_received_back: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ResourceTransfer {
    #[n(0)]
    pub resource: ResourceKey,
    #[n(1)]
    pub item_given: bool,
    #[n(2)]
    pub item_received: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum ItemDetails {
    #[n(0)]
    CreditTransfer(#[n(0)] CreditTransfer),
    #[n(1)]
    ProvideService(#[n(0)] ProvideService),
    #[n(2)]
    BorrowResource(#[n(0)] BorrowResource),
    #[n(3)]
    ResourceTransfer(#[n(0)] ResourceTransfer),
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct OfferItem {
    #[n(0)]
    pub key: OfferItemKey,
    #[n(1)]
    pub offer_key: OfferKey,
    #[n(2)]
    pub from: Target,
    #[n(3)]
    pub to: Target,
    #[n(4)]
    pub details: ItemDetails,
}

/// Users entitled to confirm each side of one item, resolved at the time of
/// the confirmation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemApprovers {
    pub giving: UserKeys,
    pub receiving: UserKeys,
}

impl ItemApprovers {
    pub fn all(&self) -> UserKeys {
        self.giving.union(&self.receiving).cloned().collect()
    }
}

impl BondDirection {
    /// Whether a user standing on `self` may act for the `side` of an item.
    pub fn covers(self, side: BondDirection) -> bool {
        match (self, side) {
            (BondDirection::Neither, _) | (_, BondDirection::Neither) => false,
            (BondDirection::Both, _) => true,
            (own, side) => own == side,
        }
    }
}

impl Confirmation {
    pub const ALL: [Confirmation; 4] = [
        Confirmation::Given,
        Confirmation::Received,
        Confirmation::Returned,
        Confirmation::ReceivedBack,
    ];
}

impl OfferItem {
    pub fn new(
        key: OfferItemKey,
        offer_key: OfferKey,
        from: Target,
        to: Target,
        details: ItemDetails,
    ) -> Self {
        Self {
            key,
            offer_key,
            from,
            to,
            details,
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self.details {
            ItemDetails::CreditTransfer(_) => ItemKind::CreditTransfer,
            ItemDetails::ProvideService(_) => ItemKind::ProvideService,
            ItemDetails::BorrowResource(_) => ItemKind::BorrowResource,
            ItemDetails::ResourceTransfer(_) => ItemKind::ResourceTransfer,
        }
    }

    pub fn is_completed(&self) -> bool {
        match &self.details {
            ItemDetails::CreditTransfer(c) => c.credits_transferred,
            ItemDetails::ProvideService(s) => s.service_given && s.service_received,
            ItemDetails::ResourceTransfer(r) => r.item_given && r.item_received,
            ItemDetails::BorrowResource(b) => {
                b.item_taken && b.item_given && b.item_returned_back && b.item_received_back
            }
        }
    }

    pub fn is_credit_transfer(&self) -> bool {
        self.kind() == ItemKind::CreditTransfer
    }

    pub fn resource(&self) -> Option<&ResourceKey> {
        match &self.details {
            ItemDetails::CreditTransfer(_) => None,
            ItemDetails::ProvideService(s) => Some(&s.resource),
            ItemDetails::BorrowResource(b) => Some(&b.resource),
            ItemDetails::ResourceTransfer(r) => Some(&r.resource),
        }
    }

    pub fn credit_amount_secs(&self) -> Option<i64> {
        match &self.details {
            ItemDetails::CreditTransfer(c) => Some(c.amount_secs),
            _ => None,
        }
    }

    pub fn bond_direction(&self, user: &UserKey, approvers: &ItemApprovers) -> BondDirection {
        match (
            approvers.giving.contains(user),
            approvers.receiving.contains(user),
        ) {
            (true, true) => BondDirection::Both,
            (true, false) => BondDirection::Giving,
            (false, true) => BondDirection::Receiving,
            (false, false) => BondDirection::Neither,
        }
    }

    /// The side that reports `confirmation` on this kind of item.
    pub fn expected_side(&self, confirmation: Confirmation) -> Result<BondDirection, OfferError> {
        let side = match (&self.details, confirmation) {
            (ItemDetails::CreditTransfer(_), _) => None,
            (
                ItemDetails::ProvideService(_) | ItemDetails::ResourceTransfer(_),
                Confirmation::Given,
            ) => Some(BondDirection::Giving),
            (
                ItemDetails::ProvideService(_) | ItemDetails::ResourceTransfer(_),
                Confirmation::Received,
            ) => Some(BondDirection::Receiving),
            (
                ItemDetails::ProvideService(_) | ItemDetails::ResourceTransfer(_),
                Confirmation::Returned | Confirmation::ReceivedBack,
            ) => None,
            (ItemDetails::BorrowResource(_), Confirmation::Given | Confirmation::ReceivedBack) => {
                Some(BondDirection::Giving)
            }
            (ItemDetails::BorrowResource(_), Confirmation::Received | Confirmation::Returned) => {
                Some(BondDirection::Receiving)
            }
        };

        side.ok_or(OfferError::WrongItemType {
            kind: self.kind(),
            confirmation,
        })
    }

    pub fn is_confirmed(&self, confirmation: Confirmation) -> Result<bool, OfferError> {
        let mut probe = self.clone();
        Ok(*probe.flag_mut(confirmation)?)
    }

    /// Sets the flag behind `confirmation`. Returns `false` when it was
    /// already set.
    pub fn apply_confirmation(&mut self, confirmation: Confirmation) -> Result<bool, OfferError> {
        let flag = self.flag_mut(confirmation)?;
        if *flag {
            return Ok(false);
        }
        *flag = true;
        Ok(true)
    }

    /// Records that the time credits of a credit-transfer item moved.
    /// Returns `false` for other kinds or when already recorded.
    pub fn mark_credits_transferred(&mut self) -> bool {
        match &mut self.details {
            ItemDetails::CreditTransfer(c) if !c.credits_transferred => {
                c.credits_transferred = true;
                true
            }
            _ => false,
        }
    }

    fn flag_mut(&mut self, confirmation: Confirmation) -> Result<&mut bool, OfferError> {
        let kind = self.kind();
        let flag = match (&mut self.details, confirmation) {
            (ItemDetails::ProvideService(s), Confirmation::Given) => Some(&mut s.service_given),
            (ItemDetails::ProvideService(s), Confirmation::Received) => {
                Some(&mut s.service_received)
            }
            (ItemDetails::ResourceTransfer(r), Confirmation::Given) => Some(&mut r.item_given),
            (ItemDetails::ResourceTransfer(r), Confirmation::Received) => {
                Some(&mut r.item_received)
            }
            (ItemDetails::BorrowResource(b), Confirmation::Given) => Some(&mut b.item_given),
            (ItemDetails::BorrowResource(b), Confirmation::Received) => Some(&mut b.item_taken),
            (ItemDetails::BorrowResource(b), Confirmation::Returned) => {
                Some(&mut b.item_returned_back)
            }
            (ItemDetails::BorrowResource(b), Confirmation::ReceivedBack) => {
                Some(&mut b.item_received_back)
            }
            (ItemDetails::CreditTransfer(_), _)
            | (
                ItemDetails::ProvideService(_) | ItemDetails::ResourceTransfer(_),
                Confirmation::Returned | Confirmation::ReceivedBack,
            ) => None,
        };

        flag.ok_or(OfferError::WrongItemType { kind, confirmation })
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ItemKind::CreditTransfer => "credit transfer",
            ItemKind::ProvideService => "service provision",
            ItemKind::BorrowResource => "resource loan",
            ItemKind::ResourceTransfer => "resource transfer",
        })
    }
}

impl std::fmt::Display for BondDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BondDirection::Giving => "giving",
            BondDirection::Receiving => "receiving",
            BondDirection::Both => "giving and receiving",
            BondDirection::Neither => "no",
        })
    }
}

impl std::fmt::Display for Confirmation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Confirmation::Given => "given",
            Confirmation::Received => "received",
            Confirmation::Returned => "returned",
            Confirmation::ReceivedBack => "received back",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(details: ItemDetails) -> OfferItem {
        OfferItem::new(
            OfferItemKey::new("item_a"),
            OfferKey::new("offer_a"),
            Target::user("alice"),
            Target::user("bob"),
            details,
        )
    }

    fn borrow() -> OfferItem {
        item(ItemDetails::BorrowResource(BorrowResource {
            resource: ResourceKey::new("ladder"),
            duration_secs: 7200,
            item_taken: false,
            item_given: false,
            item_returned_back: false,
            item_received_back: false,
        }))
    }

    fn transfer() -> OfferItem {
        item(ItemDetails::ResourceTransfer(ResourceTransfer {
            resource: ResourceKey::new("bike"),
            item_given: false,
            item_received: false,
        }))
    }

    fn credits() -> OfferItem {
        item(ItemDetails::CreditTransfer(CreditTransfer {
            amount_secs: 3600,
            credits_transferred: false,
        }))
    }

    #[test]
    fn resource_transfer_needs_both_sides() {
        let mut item = transfer();
        assert!(item.apply_confirmation(Confirmation::Given).unwrap());
        assert!(!item.is_completed());
        assert!(item.apply_confirmation(Confirmation::Received).unwrap());
        assert!(item.is_completed());
    }

    #[test]
    fn borrow_needs_all_four_flags() {
        let mut item = borrow();
        for confirmation in [
            Confirmation::Given,
            Confirmation::Received,
            Confirmation::Returned,
        ] {
            item.apply_confirmation(confirmation).unwrap();
            assert!(!item.is_completed());
        }
        item.apply_confirmation(Confirmation::ReceivedBack).unwrap();
        assert!(item.is_completed());
    }

    #[test]
    fn repeated_confirmation_reports_no_change() {
        let mut item = transfer();
        assert!(item.apply_confirmation(Confirmation::Given).unwrap());
        let snapshot = item.clone();
        assert!(!item.apply_confirmation(Confirmation::Given).unwrap());
        assert_eq!(item, snapshot);
    }

    #[test]
    fn credit_transfer_rejects_manual_confirmation() {
        let mut item = credits();
        for confirmation in Confirmation::ALL {
            assert!(matches!(
                item.apply_confirmation(confirmation),
                Err(OfferError::WrongItemType {
                    kind: ItemKind::CreditTransfer,
                    ..
                })
            ));
        }
        assert!(item.mark_credits_transferred());
        assert!(!item.mark_credits_transferred());
        assert!(item.is_completed());
    }

    #[test]
    fn return_confirmations_only_apply_to_loans() {
        let item = transfer();
        assert!(item.expected_side(Confirmation::Returned).is_err());
        assert!(item.expected_side(Confirmation::ReceivedBack).is_err());

        let loan = borrow();
        assert_eq!(
            loan.expected_side(Confirmation::Returned).unwrap(),
            BondDirection::Receiving
        );
        assert_eq!(
            loan.expected_side(Confirmation::ReceivedBack).unwrap(),
            BondDirection::Giving
        );
    }

    #[test]
    fn bond_direction_follows_approver_sets() {
        let item = transfer();
        let approvers = ItemApprovers {
            giving: [UserKey::new("alice"), UserKey::new("carol")].into(),
            receiving: [UserKey::new("bob"), UserKey::new("carol")].into(),
        };

        assert_eq!(
            item.bond_direction(&UserKey::new("alice"), &approvers),
            BondDirection::Giving
        );
        assert_eq!(
            item.bond_direction(&UserKey::new("bob"), &approvers),
            BondDirection::Receiving
        );
        assert_eq!(
            item.bond_direction(&UserKey::new("carol"), &approvers),
            BondDirection::Both
        );
        assert_eq!(
            item.bond_direction(&UserKey::new("dave"), &approvers),
            BondDirection::Neither
        );
    }

    #[test]
    fn both_covers_either_side() {
        assert!(BondDirection::Both.covers(BondDirection::Giving));
        assert!(BondDirection::Both.covers(BondDirection::Receiving));
        assert!(!BondDirection::Giving.covers(BondDirection::Receiving));
        assert!(!BondDirection::Neither.covers(BondDirection::Giving));
    }

    #[test]
    fn item_cbor_roundtrip() {
        let item = borrow();
        let encoded = minicbor::to_vec(&item).unwrap();
        let decoded: OfferItem = minicbor::decode(&encoded).unwrap();
        assert_eq!(item, decoded);
    }
}
