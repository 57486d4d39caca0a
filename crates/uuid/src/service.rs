//! Canonical UUIDs and monotonic timestamp identifiers.

use crate::{UuidError, UuidResult};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use std::sync::Mutex;
use std::{fmt, str::FromStr};

/// Re-exported for convenience.
pub use ::uuid::Uuid;

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3f";

/// A UUID held in canonical form (32 lowercase hex characters, no hyphens).
///
/// # Construction
/// - [`CanonicalUuid::new`] generates a fresh v4 identifier.
/// - [`CanonicalUuid::parse`] validates an externally supplied identifier.
/// - [`CanonicalUuid::from_uuid`] wraps an already-parsed [`Uuid`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalUuid(Uuid);

impl Default for CanonicalUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl CanonicalUuid {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Validates and parses a UUID string that must already be canonical.
    ///
    /// # Errors
    ///
    /// Returns [`UuidError::InvalidInput`] if `input` is hyphenated, uppercase, the wrong
    /// length or contains non-hex characters.
    pub fn parse(input: &str) -> UuidResult<Self> {
        if !Self::is_canonical(input) {
            return Err(UuidError::InvalidInput(format!(
                "UUID must be 32 lowercase hex characters without hyphens, got: '{}'",
                input
            )));
        }
        Uuid::parse_str(input)
            .map(Self)
            .map_err(|e| UuidError::InvalidInput(format!("invalid UUID '{}': {}", input, e)))
    }

    /// Purely syntactic check for canonical form.
    pub fn is_canonical(input: &str) -> bool {
        input.len() == 32
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// True for the all-zero UUID, which is never a meaningful identifier.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for CanonicalUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for CanonicalUuid {
    type Err = UuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CanonicalUuid::parse(s)
    }
}

/// A time-prefixed identifier.
///
/// Format: `YYYYMMDDTHHMMSS.mmmZ-<canonical_uuid>`
///
/// Example: `20260111T143522.045Z-550e8400e29b41d4a716446655440000`
///
/// Ordering compares the timestamp first and the UUID second, so ids produced by one
/// [`TimestampIdGenerator`] sort in generation order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimestampId {
    timestamp: DateTime<Utc>,
    uuid: CanonicalUuid,
}

impl TimestampId {
    pub fn new(timestamp: DateTime<Utc>, uuid: CanonicalUuid) -> Self {
        // Millisecond precision so the rendered form round-trips exactly.
        let millis = timestamp.timestamp_millis();
        let timestamp = DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or(timestamp);
        Self { timestamp, uuid }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn uuid(&self) -> &CanonicalUuid {
        &self.uuid
    }
}

impl fmt::Display for TimestampId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Z-{}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.uuid
        )
    }
}

impl FromStr for TimestampId {
    type Err = UuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ts_str, uuid_str) = s.split_once('-').ok_or_else(|| {
            UuidError::InvalidInput(format!("Invalid timestamp id format: '{}'", s))
        })?;

        let ts_no_z = ts_str.strip_suffix('Z').ok_or_else(|| {
            UuidError::InvalidInput(format!("Timestamp must end with 'Z': '{}'", ts_str))
        })?;

        let naive = NaiveDateTime::parse_from_str(ts_no_z, TIMESTAMP_FORMAT).map_err(|e| {
            UuidError::InvalidInput(format!("Invalid timestamp format '{}': {}", ts_str, e))
        })?;

        Ok(Self {
            timestamp: DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc),
            uuid: CanonicalUuid::parse(uuid_str)?,
        })
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for TimestampId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for TimestampId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Issues [`TimestampId`]s with strictly increasing timestamps.
///
/// The caller supplies "now" so that ids follow the trusted clock used for the rest of the
/// entry rather than the host clock. If `now` is not after the previously issued timestamp,
/// the new id is stamped one millisecond later.
#[derive(Debug, Default)]
pub struct TimestampIdGenerator {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl TimestampIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume after an existing id, e.g. the last entry of a reopened audit log.
    pub fn resume_after(last: &TimestampId) -> Self {
        Self {
            last: Mutex::new(Some(last.timestamp())),
        }
    }

    pub fn next(&self, now: DateTime<Utc>) -> TimestampId {
        let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let candidate = TimestampId::new(now, CanonicalUuid::new());
        let timestamp = match *last {
            Some(prev) if candidate.timestamp <= prev => prev + Duration::milliseconds(1),
            _ => candidate.timestamp,
        };
        *last = Some(timestamp);
        TimestampId {
            timestamp,
            uuid: candidate.uuid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_generates_canonical_uuid() {
        let id = CanonicalUuid::new();
        assert!(CanonicalUuid::is_canonical(&id.to_string()));
        assert!(!id.is_nil());
    }

    #[test]
    fn test_parse_rejects_non_canonical_forms() {
        assert!(CanonicalUuid::parse("550e8400e29b41d4a716446655440000").is_ok());
        assert!(CanonicalUuid::parse("550e8400-e29b-41d4-a716-446655440000").is_err());
        assert!(CanonicalUuid::parse("550E8400E29B41D4A716446655440000").is_err());
        assert!(CanonicalUuid::parse("550e8400e29b41d4a71644665544000").is_err());
        assert!(CanonicalUuid::parse("550e8400e29b41d4a716446655440zzz").is_err());
        assert!(CanonicalUuid::parse("").is_err());
    }

    #[test]
    fn test_parse_error_message_names_expected_form() {
        match CanonicalUuid::parse("not-a-uuid") {
            Err(UuidError::InvalidInput(msg)) => assert!(msg.contains("32 lowercase hex")),
            other => panic!("expected InvalidInput, got {:?}", other),
        }
    }

    #[test]
    fn test_timestamp_id_parse_and_display() {
        let raw = "20260111T143522.045Z-550e8400e29b41d4a716446655440000";
        let id: TimestampId = raw.parse().unwrap();
        assert_eq!(id.to_string(), raw);
        assert_eq!(id.uuid().to_string(), "550e8400e29b41d4a716446655440000");
    }

    #[test]
    fn test_timestamp_id_parse_rejects_bad_input() {
        assert!("20260111T143522.045Z550e8400e29b41d4a716446655440000"
            .parse::<TimestampId>()
            .is_err());
        assert!("20260111T143522.045-550e8400e29b41d4a716446655440000"
            .parse::<TimestampId>()
            .is_err());
        assert!("20260199T143522.045Z-550e8400e29b41d4a716446655440000"
            .parse::<TimestampId>()
            .is_err());
    }

    #[test]
    fn test_generator_is_strictly_monotonic_for_same_instant() {
        let generator = TimestampIdGenerator::new();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let a = generator.next(now);
        let b = generator.next(now);
        let c = generator.next(now - Duration::seconds(5));
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_generator_resumes_after_existing_id() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let existing = TimestampId::new(now, CanonicalUuid::new());
        let generator = TimestampIdGenerator::resume_after(&existing);
        assert!(generator.next(now).timestamp() > existing.timestamp());
    }

    #[test]
    fn test_timestamp_id_serde_uses_string_form() {
        let raw = "20260111T143522.045Z-550e8400e29b41d4a716446655440000";
        let id: TimestampId = raw.parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", raw));
        let back: TimestampId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
