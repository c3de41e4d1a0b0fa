//! Resolves item targets to the concrete users allowed to act for them.
//!
//! A user target resolves to that user. A group target resolves to every
//! active member holding one of the configured roles. Resolution runs on
//! every call and is never cached on the offer or the item, so membership
//! changes between submission and fulfillment take effect immediately.
use super::collaborators::{GroupRole, ParticipantDirectory};
use super::error::OfferError;
use super::item::{ItemApprovers, OfferItem};
use super::keys::UserKeys;
use super::target::Target;
use std::sync::Arc;

#[derive(Clone)]
pub struct ApprovalResolver {
    directory: Arc<dyn ParticipantDirectory>,
    roles: Vec<GroupRole>,
}

impl ApprovalResolver {
    pub fn new(directory: Arc<dyn ParticipantDirectory>, roles: Vec<GroupRole>) -> Self {
        Self { directory, roles }
    }

    pub fn resolve_target(&self, target: &Target) -> Result<UserKeys, OfferError> {
        match target {
            Target::User(user) => Ok(UserKeys::from([user.clone()])),
            Target::Group(group) => {
                let mut users = UserKeys::new();
                for role in &self.roles {
                    let members = self
                        .directory
                        .resolve_group_members(group, *role)
                        .map_err(OfferError::Directory)?;
                    users.extend(members);
                }
                Ok(users)
            }
        }
    }

    pub fn find_giving_approvers(&self, item: &OfferItem) -> Result<UserKeys, OfferError> {
        self.resolve_target(&item.from)
    }

    pub fn find_receiving_approvers(&self, item: &OfferItem) -> Result<UserKeys, OfferError> {
        self.resolve_target(&item.to)
    }

    pub fn approvers_for(&self, item: &OfferItem) -> Result<ItemApprovers, OfferError> {
        Ok(ItemApprovers {
            giving: self.find_giving_approvers(item)?,
            receiving: self.find_receiving_approvers(item)?,
        })
    }

    /// Every distinct user on either side of any of `items`.
    pub fn participants<'a>(
        &self,
        items: impl IntoIterator<Item = &'a OfferItem>,
    ) -> Result<UserKeys, OfferError> {
        let mut users = UserKeys::new();
        for item in items {
            users.extend(self.approvers_for(item)?.all());
        }
        Ok(users)
    }
}

impl std::fmt::Debug for ApprovalResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalResolver")
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}
