//! Identifier newtypes.
//!
//! Offer and item keys are minted here as bech32 encoded uuid7 values. User,
//! group and resource keys belong to other systems and are carried verbatim.

use crate::error::OfferError;
use crate::utils;

macro_rules! string_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, minicbor::Encode, minicbor::Decode,
        )]
        pub struct $name(#[n(0)] String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_key!(
    /// Identity of an offer. Never reused.
    OfferKey
);
string_key!(OfferItemKey);
string_key!(UserKey);
string_key!(GroupKey);
string_key!(ResourceKey);

impl OfferKey {
    pub fn generate() -> Result<Self, OfferError> {
        mint("offer_").map(Self)
    }
}

impl OfferItemKey {
    pub fn generate() -> Result<Self, OfferError> {
        mint("item_").map(Self)
    }
}

fn mint(hrp: &str) -> Result<String, OfferError> {
    utils::new_uuid_to_bech32(hrp).map_err(|e| OfferError::Identifier(e.to_string()))
}

/// Set of concrete users, ordered so notifications and tallies are stable.
pub type UserKeys = std::collections::BTreeSet<UserKey>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_carry_their_prefix() {
        let offer = OfferKey::generate().unwrap();
        let item = OfferItemKey::generate().unwrap();

        assert!(offer.as_str().starts_with("offer_1"));
        assert!(item.as_str().starts_with("item_1"));
        assert_ne!(offer, OfferKey::generate().unwrap());
    }

    #[test]
    fn key_cbor_roundtrip() {
        let key = UserKey::new("user_alice");
        let encoded = minicbor::to_vec(&key).unwrap();
        let decoded: UserKey = minicbor::decode(&encoded).unwrap();
        assert_eq!(key, decoded);
    }
}
