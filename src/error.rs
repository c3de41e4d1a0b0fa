use crate::collaborators::CollaboratorError;
use crate::item::{BondDirection, Confirmation, ItemKind};
use crate::keys::{OfferItemKey, OfferKey, ResourceKey, UserKey};
use crate::offer::OfferStatus;
use sled::transaction::TransactionError;

#[derive(thiserror::Error, Debug)]
pub enum OfferError {
    // Validation: the caller can fix the request.
    #[error("An offer must exchange at least one item")]
    EmptyOffer,
    #[error("Offer has no author")]
    MissingAuthor,
    #[error("Resource {0} is transferred more than once in the same offer")]
    DuplicateResourceInOffer(ResourceKey),
    #[error("Item {index} carries a negative time value ({value}s)")]
    NegativeDuration { index: usize, value: i64 },
    #[error("Malformed target: {0}")]
    MalformedTarget(String),
    #[error("Offer expiration lies in the past")]
    ExpirationInPast,
    #[error("Offer expiration lies beyond the storable range (year 2262)")]
    ExpirationOutOfRange,
    #[error("Resource {0} can only be offered by its owner")]
    ResourceNotOwnedByGiver(ResourceKey),
    #[error("Offer items resolve to no participating user")]
    NoParticipants,
    #[error("User {0} is not a participant of this offer")]
    NotAParticipant(UserKey),
    #[error("User {0} is not the author of this offer")]
    NotOfferAuthor(UserKey),
    #[error("User {0} is neither giving nor receiving this item")]
    NotPartOfOfferItem(UserKey),
    #[error("Confirmation must come from the {expected} side of the item")]
    WrongSide { expected: BondDirection },
    #[error("A {confirmation} confirmation does not apply to a {kind} item")]
    WrongItemType {
        kind: ItemKind,
        confirmation: Confirmation,
    },
    #[error("A decision must be either accepted or declined")]
    InvalidDecision,

    // State: retry with fresh state.
    #[error("Offer is not pending. Current status: {0}")]
    OfferNotPending(OfferStatus),
    #[error("Offer has not been accepted by everyone. Current status: {0}")]
    OfferNotAccepted(OfferStatus),
    #[error("Offer has already been completed")]
    AlreadyCompleted,
    #[error("Offer cannot move from {from} to {to}")]
    InvalidTransition { from: OfferStatus, to: OfferStatus },
    #[error("Offer has not reached its expiration time")]
    NotExpired,

    #[error("Offer {0} not found")]
    OfferNotFound(OfferKey),
    #[error("Offer item {0} not found")]
    ItemNotFound(OfferItemKey),

    // Infrastructure: surfaced as retryable.
    #[error("Storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("Failed to encode or decode a record: {0}")]
    Codec(String),
    #[error("Participant directory unavailable: {0}")]
    Directory(CollaboratorError),
    #[error("Resource catalog unavailable: {0}")]
    Catalog(CollaboratorError),
    #[error("Failed to mint identifier: {0}")]
    Identifier(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    State,
    NotFound,
    Infrastructure,
}

impl OfferError {
    pub fn class(&self) -> ErrorClass {
        match self {
            OfferError::EmptyOffer
            | OfferError::MissingAuthor
            | OfferError::DuplicateResourceInOffer(_)
            | OfferError::NegativeDuration { .. }
            | OfferError::MalformedTarget(_)
            | OfferError::ExpirationInPast
            | OfferError::ExpirationOutOfRange
            | OfferError::ResourceNotOwnedByGiver(_)
            | OfferError::NoParticipants
            | OfferError::NotAParticipant(_)
            | OfferError::NotOfferAuthor(_)
            | OfferError::NotPartOfOfferItem(_)
            | OfferError::WrongSide { .. }
            | OfferError::WrongItemType { .. }
            | OfferError::InvalidDecision => ErrorClass::Validation,
            OfferError::OfferNotPending(_)
            | OfferError::OfferNotAccepted(_)
            | OfferError::AlreadyCompleted
            | OfferError::InvalidTransition { .. }
            | OfferError::NotExpired => ErrorClass::State,
            OfferError::OfferNotFound(_) | OfferError::ItemNotFound(_) => ErrorClass::NotFound,
            OfferError::Storage(_)
            | OfferError::Codec(_)
            | OfferError::Directory(_)
            | OfferError::Catalog(_)
            | OfferError::Identifier(_) => ErrorClass::Infrastructure,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Infrastructure
    }

    /// True for permission failures an HTTP layer would answer with 403.
    pub fn is_forbidden(&self) -> bool {
        matches!(
            self,
            OfferError::NotAParticipant(_)
                | OfferError::NotOfferAuthor(_)
                | OfferError::NotPartOfOfferItem(_)
        )
    }
}

impl From<TransactionError<OfferError>> for OfferError {
    fn from(value: TransactionError<OfferError>) -> Self {
        match value {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => OfferError::Storage(e),
        }
    }
}
