pub mod approval;
pub mod collaborators;
pub mod config;
pub mod decision;
pub mod draft;
pub mod error;
pub mod history;
pub mod item;
pub mod keys;
pub mod notify;
pub mod offer;
pub mod service;
pub mod store;
pub mod target;
pub mod telemetry;
pub mod timestamp;
pub mod utils;

pub use collaborators::{
    CollaboratorError, GroupRole, InMemoryCatalog, InMemoryDirectory, NotificationSink,
    ParticipantDirectory, RecordingSink, ResourceCatalog, ResourceSummary, TracingSink,
};
pub use config::{ConfigError, EngineConfig};
pub use decision::Decision;
pub use draft::{ItemSpec, OfferDraft};
pub use error::{ErrorClass, OfferError};
pub use item::{BondDirection, Confirmation, ItemKind, OfferItem};
pub use keys::{GroupKey, OfferItemKey, OfferKey, ResourceKey, UserKey, UserKeys};
pub use offer::{Offer, OfferStatus, OfferView};
pub use service::{Collaborators, OfferService};
pub use target::Target;
pub use timestamp::TimeStamp;
