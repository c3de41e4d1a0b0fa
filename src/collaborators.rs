//! Interfaces to the systems around the negotiation engine, plus in-memory
//! implementations used by tests and local setups.
use super::keys::{GroupKey, OfferKey, ResourceKey, UserKey, UserKeys};
use super::notify::Notification;
use super::target::Target;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

impl CollaboratorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Role a user holds within a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupRole {
    Admin,
    Member,
}

impl std::str::FromStr for GroupRole {
    type Err = CollaboratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(GroupRole::Admin),
            "member" => Ok(GroupRole::Member),
            other => Err(CollaboratorError::new(format!("unknown group role `{other}`"))),
        }
    }
}

pub trait ParticipantDirectory: Send + Sync {
    /// Active members of `group` holding `role`.
    fn resolve_group_members(
        &self,
        group: &GroupKey,
        role: GroupRole,
    ) -> Result<UserKeys, CollaboratorError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSummary {
    pub key: ResourceKey,
    pub title: String,
    pub owner: Option<Target>,
}

pub trait ResourceCatalog: Send + Sync {
    /// Summaries of the known resources among `keys`. Unknown keys are
    /// skipped.
    fn get_resources_by_keys(
        &self,
        keys: &[ResourceKey],
    ) -> Result<Vec<ResourceSummary>, CollaboratorError>;
}

pub trait NotificationSink: Send + Sync {
    fn notify(
        &self,
        recipients: &UserKeys,
        notification: &Notification,
    ) -> Result<(), CollaboratorError>;
}

#[derive(Debug, Clone)]
struct Membership {
    user: UserKey,
    role: GroupRole,
    active: bool,
}

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    groups: RwLock<HashMap<GroupKey, Vec<Membership>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_member(&self, group: impl Into<GroupKey>, user: impl Into<UserKey>, role: GroupRole) {
        let (group, user) = (group.into(), user.into());
        let mut groups = self.groups.write().unwrap_or_else(|e| e.into_inner());
        let members = groups.entry(group).or_default();
        members.retain(|m| m.user != user);
        members.push(Membership {
            user,
            role,
            active: true,
        });
    }

    pub fn remove_member(&self, group: &GroupKey, user: &UserKey) {
        let mut groups = self.groups.write().unwrap_or_else(|e| e.into_inner());
        if let Some(members) = groups.get_mut(group) {
            members.retain(|m| &m.user != user);
        }
    }

    pub fn set_active(&self, group: &GroupKey, user: &UserKey, active: bool) {
        let mut groups = self.groups.write().unwrap_or_else(|e| e.into_inner());
        if let Some(member) = groups
            .get_mut(group)
            .and_then(|members| members.iter_mut().find(|m| &m.user == user))
        {
            member.active = active;
        }
    }
}

impl ParticipantDirectory for InMemoryDirectory {
    fn resolve_group_members(
        &self,
        group: &GroupKey,
        role: GroupRole,
    ) -> Result<UserKeys, CollaboratorError> {
        let groups = self.groups.read().unwrap_or_else(|e| e.into_inner());
        Ok(groups
            .get(group)
            .map(|members| {
                members
                    .iter()
                    .filter(|m| m.active && m.role == role)
                    .map(|m| m.user.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    resources: RwLock<HashMap<ResourceKey, ResourceSummary>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<ResourceKey>, title: impl Into<String>, owner: Target) {
        let key = key.into();
        let summary = ResourceSummary {
            key: key.clone(),
            title: title.into(),
            owner: Some(owner),
        };
        self.resources
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, summary);
    }
}

impl ResourceCatalog for InMemoryCatalog {
    fn get_resources_by_keys(
        &self,
        keys: &[ResourceKey],
    ) -> Result<Vec<ResourceSummary>, CollaboratorError> {
        let resources = self.resources.read().unwrap_or_else(|e| e.into_inner());
        Ok(keys
            .iter()
            .filter_map(|key| resources.get(key).cloned())
            .collect())
    }
}

/// Keeps every delivered notification in memory. Can be switched to fail so
/// callers can observe best-effort delivery.
#[derive(Debug, Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<(UserKeys, Notification)>>,
    failing: Mutex<bool>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = failing;
    }

    pub fn delivered(&self) -> Vec<(UserKeys, Notification)> {
        self.delivered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn delivered_for(&self, offer: &OfferKey) -> Vec<Notification> {
        self.delivered()
            .into_iter()
            .filter(|(_, n)| &n.offer_key == offer)
            .map(|(_, n)| n)
            .collect()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(
        &self,
        recipients: &UserKeys,
        notification: &Notification,
    ) -> Result<(), CollaboratorError> {
        if *self.failing.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(CollaboratorError::new("chat service unreachable"));
        }
        self.delivered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((recipients.clone(), notification.clone()));
        Ok(())
    }
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(
        &self,
        recipients: &UserKeys,
        notification: &Notification,
    ) -> Result<(), CollaboratorError> {
        tracing::info!(
            offer = %notification.offer_key,
            kind = ?notification.kind,
            recipients = recipients.len(),
            "{}",
            notification.headline
        );
        Ok(())
    }
}
