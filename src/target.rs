//! User-or-group endpoints of offer items
use super::error::OfferError;
use super::keys::{GroupKey, UserKey};
use std::str::FromStr;

/// One side of an offer item. Equality is structural; a group target is only
/// made accountable through the members the approval resolver finds for it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, minicbor::Encode, minicbor::Decode)]
pub enum Target {
    #[n(0)]
    User(#[n(0)] UserKey),
    #[n(1)]
    Group(#[n(0)] GroupKey),
}

impl Target {
    pub fn user(key: impl Into<UserKey>) -> Self {
        Target::User(key.into())
    }
    pub fn group(key: impl Into<GroupKey>) -> Self {
        Target::Group(key.into())
    }
    pub fn is_for_group(&self) -> bool {
        matches!(self, Target::Group(_))
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::User(key) => write!(f, "user:{key}"),
            Target::Group(key) => write!(f, "group:{key}"),
        }
    }
}

// accepts `user:<key>` or `group:<key>`
impl FromStr for Target {
    type Err = OfferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, key) = s
            .split_once(':')
            .ok_or_else(|| OfferError::MalformedTarget(s.to_owned()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(OfferError::MalformedTarget(s.to_owned()));
        }

        match kind.trim() {
            "user" => Ok(Target::user(key)),
            "group" => Ok(Target::group(key)),
            _ => Err(OfferError::MalformedTarget(s.to_owned())),
        }
    }
}
