//! Shared vocabulary for the VPR gate crates.
//!
//! These types are deliberately small and dependency-light so that the core, the CLI and the
//! REST runner agree on how actors, roles and record kinds are spelled on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Errors that can occur when creating validated vocabulary types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,

    /// The input text contained a line break where a single-line value was required
    #[error("Text must be a single line")]
    MultiLine,

    /// The input did not name a known role
    #[error("unknown role: '{0}'")]
    UnknownRole(String),

    /// The input did not name a known record kind
    #[error("unknown record kind: '{0}'")]
    UnknownRecordKind(String),
}

/// A single-line string that is guaranteed to carry content.
///
/// Actor identifiers, tenant identifiers and similar attribution fields use this type so that
/// an audit entry can never be written against a blank identity. Input is trimmed during
/// construction; line breaks are rejected because these values are rendered into log lines and
/// audit evidence verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Empty`] if the trimmed input is empty, or
    /// [`TextError::MultiLine`] if it contains `\n` or `\r`.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        if trimmed.contains(['\n', '\r']) {
            return Err(TextError::MultiLine);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for NonEmptyText {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// The human roles recognised by the gate.
///
/// Each role carries a fixed authority domain; see [`Role::authority_domain`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Patient,
    Provider,
    Staff,
    Operator,
    Auditor,
}

/// What a role may act upon.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthorityDomain {
    /// Only records the actor participates in or is the subject of.
    OwnRecords,
    /// Records belonging to the care the actor delivers or administers.
    CareTeam,
    /// Configuration and control plane, never clinical records.
    Administration,
    /// Read-only visibility over every record.
    ReadOnly,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Patient,
        Role::Provider,
        Role::Staff,
        Role::Operator,
        Role::Auditor,
    ];

    pub const fn authority_domain(self) -> AuthorityDomain {
        match self {
            Role::Patient => AuthorityDomain::OwnRecords,
            Role::Provider | Role::Staff => AuthorityDomain::CareTeam,
            Role::Operator => AuthorityDomain::Administration,
            Role::Auditor => AuthorityDomain::ReadOnly,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Patient => "Patient",
            Role::Provider => "Provider",
            Role::Staff => "Staff",
            Role::Operator => "Operator",
            Role::Auditor => "Auditor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TextError::UnknownRole(s.to_owned()))
    }
}

/// The two record kinds whose transitions are governed.
///
/// Each kind is also a *domain* for the purposes of enablement and kill-switches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Scheduling,
    Order,
}

impl RecordKind {
    pub const ALL: [RecordKind; 2] = [RecordKind::Scheduling, RecordKind::Order];

    pub const fn as_str(self) -> &'static str {
        match self {
            RecordKind::Scheduling => "scheduling",
            RecordKind::Order => "order",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scheduling" | "schedule" => Ok(RecordKind::Scheduling),
            "order" | "orders" => Ok(RecordKind::Order),
            _ => Err(TextError::UnknownRecordKind(s.to_owned())),
        }
    }
}
