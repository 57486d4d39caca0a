//! Typed identifiers.
//!
//! Each wrapper is a distinct type so that a session id can never be passed where a
//! correlation id is expected. All of them share the canonical UUID form.

use crate::{CanonicalUuid, UuidError};
use std::{fmt, str::FromStr};

macro_rules! canonical_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(CanonicalUuid);

        impl $name {
            /// Generates a fresh identifier.
            pub fn generate() -> Self {
                Self(CanonicalUuid::new())
            }

            /// Validates an externally supplied identifier.
            pub fn parse(input: &str) -> Result<Self, UuidError> {
                CanonicalUuid::parse(input).map(Self)
            }

            pub fn canonical(&self) -> &CanonicalUuid {
                &self.0
            }

            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl From<CanonicalUuid> for $name {
            fn from(value: CanonicalUuid) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = UuidError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        #[cfg(feature = "serde")]
        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.collect_str(&self.0)
            }
        }

        #[cfg(feature = "serde")]
        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

canonical_id!(
    /// Identity of a scheduling or order record.
    RecordId
);

canonical_id!(
    /// Links a proposal to its confirmation, modification and cancellation, and a decision to
    /// the audit entries written for it.
    CorrelationId
);

canonical_id!(
    /// The authenticated session an actor is acting within.
    SessionId
);

canonical_id!(
    /// A single inbound request, for tracing.
    RequestId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_ids_parse_canonical_only() {
        assert!(RecordId::parse("550e8400e29b41d4a716446655440000").is_ok());
        assert!(SessionId::parse("550e8400-e29b-41d4-a716-446655440000").is_err());
    }

    #[test]
    fn typed_ids_serialize_as_plain_strings() {
        let id = CorrelationId::parse("00112233445566778899aabbccddeeff").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"00112233445566778899aabbccddeeff\"");
        let back: CorrelationId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn nil_is_detected() {
        let nil = RequestId::parse("00000000000000000000000000000000").unwrap();
        assert!(nil.is_nil());
        assert!(!RequestId::generate().is_nil());
    }
}
