//! Object id generation.
//!
//! Ids are 12 bytes: a 4-byte big-endian unix timestamp, 5 random bytes fixed
//! per process, and a 3-byte counter. They render as 24 lowercase hex characters,
//! sort by creation time, and carry a recoverable creation timestamp.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::AppError;

static PROCESS_UNIQUE: Lazy<[u8; 5]> = Lazy::new(|| rand::thread_rng().r#gen());
static COUNTER: Lazy<AtomicU32> = Lazy::new(|| AtomicU32::new(rand::thread_rng().r#gen()));

/// A 12-byte time-sortable identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// The all-zero id, used as "no id".
    pub const NIL: Self = Self([0; 12]);

    /// Generate a new id for the current time.
    #[must_use]
    pub fn new() -> Self {
        Self::from_time(Utc::now())
    }

    /// Generate a new id embedding the given timestamp.
    #[must_use]
    pub fn from_time(at: DateTime<Utc>) -> Self {
        let mut bytes = [0u8; 12];
        let secs = u32::try_from(at.timestamp().max(0)).unwrap_or(u32::MAX);
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_UNIQUE);
        let count = COUNTER.fetch_add(1, Ordering::Relaxed) & 0x00ff_ffff;
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    /// Creation timestamp embedded in the id.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        let secs = u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        Utc.timestamp_opt(i64::from(secs), 0)
            .single()
            .unwrap_or_default()
    }

    /// Raw bytes.
    #[must_use]
    pub const fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Hex representation.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a hex id.
    pub fn parse(s: &str) -> Result<Self, AppError> {
        s.parse()
    }
}

impl FromStr for ObjectId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 12];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|_| AppError::BadObjectId(format!("'{s}' is not a valid object id")))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// ID generator for entities.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new id as its hex string, the form stored in the database.
    #[must_use]
    pub fn generate(&self) -> String {
        ObjectId::new().to_hex()
    }

    /// Generate `n` random bytes rendered as hex.
    #[must_use]
    pub fn generate_token(&self, n: usize) -> String {
        let mut buf = vec![0u8; n];
        rand::thread_rng().fill(buf.as_mut_slice());
        hex::encode(buf)
    }
}

/// Validate that `s` is an object id and return it normalised to lowercase.
pub fn parse_id(s: &str) -> Result<String, AppError> {
    ObjectId::parse(s).map(|id| id.to_hex())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_object_id() {
        let id_gen = IdGenerator::new();
        let id1 = id_gen.generate();
        let id2 = id_gen.generate();

        assert_eq!(id1.len(), 24);
        assert_eq!(id2.len(), 24);
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_timestamp_is_recoverable() {
        let at = Utc.with_ymd_and_hms(2023, 5, 1, 12, 0, 0).unwrap();
        let id = ObjectId::from_time(at);

        assert_eq!(id.timestamp(), at);
    }

    #[test]
    fn test_ids_sort_by_time() {
        let early = ObjectId::from_time(Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap());
        let late = ObjectId::from_time(Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap());

        assert!(early < late);
        assert!(early.to_hex() < late.to_hex());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            ObjectId::parse("not-an-id"),
            Err(AppError::BadObjectId(_))
        ));
        assert!(ObjectId::parse("60ae434d1aa1d1b2f8d4a5c7").is_ok());
    }

    #[test]
    fn test_serde_uses_hex() {
        let id = ObjectId::parse("60ae434d1aa1d1b2f8d4a5c7").unwrap();
        let json = serde_json::to_string(&id).unwrap();

        assert_eq!(json, "\"60ae434d1aa1d1b2f8d4a5c7\"");
        assert_eq!(serde_json::from_str::<ObjectId>(&json).unwrap(), id);
    }

    #[test]
    fn test_generate_token_length() {
        let token = IdGenerator::new().generate_token(16);
        assert_eq!(token.len(), 32);
    }
}
