//! Engine configuration.
//!
//! Defaults suit a local setup. Override via environment variables or
//! explicit construction.
use super::collaborators::GroupRole;
use chrono::Duration;

pub const DEFAULT_TTL_VAR: &str = "OFFER_DEFAULT_TTL_SECS";
pub const APPROVER_ROLES_VAR: &str = "OFFER_APPROVER_ROLES";
pub const REQUIRE_OWNER_VAR: &str = "OFFER_REQUIRE_RESOURCE_OWNER";

/// Longest accepted default lifetime, 100 years. Expirations must stay
/// within the storable timestamp range.
pub const MAX_TTL_SECS: i64 = 100 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Expiration applied to drafts that carry none. `None` means offers
    /// never expire unless the author says so.
    pub default_offer_ttl: Option<Duration>,
    /// Group roles whose members may act for the group.
    pub approver_roles: Vec<GroupRole>,
    /// Reject resource items whose giving side is not the catalog owner.
    pub require_resource_owner: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_offer_ttl: None,
            approver_roles: vec![GroupRole::Admin, GroupRole::Member],
            require_resource_owner: true,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `OFFER_DEFAULT_TTL_SECS` (default: unset, no expiration)
    /// - `OFFER_APPROVER_ROLES` (default: `admin,member`)
    /// - `OFFER_REQUIRE_RESOURCE_OWNER` (default: `true`)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`EngineConfig::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let default_offer_ttl = match lookup(DEFAULT_TTL_VAR) {
            Some(raw) => Some(parse_ttl(&raw)?),
            None => defaults.default_offer_ttl,
        };

        let approver_roles = match lookup(APPROVER_ROLES_VAR) {
            Some(raw) => parse_roles(&raw)?,
            None => defaults.approver_roles,
        };

        let require_resource_owner = match lookup(REQUIRE_OWNER_VAR) {
            Some(raw) => parse_flag(REQUIRE_OWNER_VAR, &raw)?,
            None => defaults.require_resource_owner,
        };

        Ok(Self {
            default_offer_ttl,
            approver_roles,
            require_resource_owner,
        })
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_offer_ttl = Some(ttl);
        self
    }

    pub fn with_approver_roles(mut self, roles: Vec<GroupRole>) -> Self {
        self.approver_roles = roles;
        self
    }

    pub fn with_resource_owner_check(mut self, required: bool) -> Self {
        self.require_resource_owner = required;
        self
    }
}

fn parse_ttl(raw: &str) -> Result<Duration, ConfigError> {
    let secs: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(DEFAULT_TTL_VAR.into(), raw.into()))?;
    if secs <= 0 || secs > MAX_TTL_SECS {
        return Err(ConfigError::Invalid(DEFAULT_TTL_VAR.into(), raw.into()));
    }
    Duration::try_seconds(secs).ok_or_else(|| ConfigError::Invalid(DEFAULT_TTL_VAR.into(), raw.into()))
}

fn parse_roles(raw: &str) -> Result<Vec<GroupRole>, ConfigError> {
    let mut roles = Vec::new();
    for part in raw.split(',').filter(|p| !p.trim().is_empty()) {
        let role: GroupRole = part
            .parse()
            .map_err(|_| ConfigError::Invalid(APPROVER_ROLES_VAR.into(), part.trim().into()))?;
        if !roles.contains(&role) {
            roles.push(role);
        }
    }
    if roles.is_empty() {
        return Err(ConfigError::NoApproverRoles);
    }
    Ok(roles)
}

fn parse_flag(var: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid(var.into(), raw.into())),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
    #[error("OFFER_APPROVER_ROLES must name at least one role")]
    NoApproverRoles,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn reads_every_variable() {
        let config = EngineConfig::from_lookup(lookup(&[
            (DEFAULT_TTL_VAR, "86400"),
            (APPROVER_ROLES_VAR, "admin"),
            (REQUIRE_OWNER_VAR, "off"),
        ]))
        .unwrap();

        assert_eq!(config.default_offer_ttl, Some(Duration::days(1)));
        assert_eq!(config.approver_roles, vec![GroupRole::Admin]);
        assert!(!config.require_resource_owner);
    }

    #[test]
    fn longest_ttl_still_yields_a_storable_expiration() {
        let max = MAX_TTL_SECS.to_string();
        let config = EngineConfig::from_lookup(lookup(&[(DEFAULT_TTL_VAR, max.as_str())])).unwrap();
        let ttl = config.default_offer_ttl.unwrap();
        let expires = crate::TimeStamp::new().checked_add(ttl).unwrap();
        assert!(expires.is_storable());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            EngineConfig::from_lookup(lookup(&[(DEFAULT_TTL_VAR, "-5")])),
            Err(ConfigError::Invalid(..))
        ));
        assert!(matches!(
            EngineConfig::from_lookup(lookup(&[(APPROVER_ROLES_VAR, "admin,owner")])),
            Err(ConfigError::Invalid(..))
        ));
        assert!(matches!(
            EngineConfig::from_lookup(lookup(&[(DEFAULT_TTL_VAR, "9000000000")])),
            Err(ConfigError::Invalid(..))
        ));
        assert_eq!(
            EngineConfig::from_lookup(lookup(&[(APPROVER_ROLES_VAR, " , ")])),
            Err(ConfigError::NoApproverRoles)
        );
    }
}
