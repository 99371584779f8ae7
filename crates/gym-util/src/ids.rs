//! Strongly-typed identifiers for gymd

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Prefix of human-readable member IDs (`MEM-0001`)
pub const MEMBER_ID_PREFIX: &str = "MEM-";

/// Prefix of human-readable class IDs (`CLS-0001`)
pub const CLASS_ID_PREFIX: &str = "CLS-";

/// Parse the numeric part of a `PREFIX-NNNN` identifier.
fn parse_sequence(s: &str, prefix: &str) -> Option<u64> {
    let digits = s.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Immutable, sequential member identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId(String);

impl MemberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build the ID for the n-th registered member
    pub fn from_sequence(n: u64) -> Self {
        Self(format!("{}{:04}", MEMBER_ID_PREFIX, n))
    }

    /// Parse a string that looks like `MEM-NNNN`
    pub fn parse(s: &str) -> Option<Self> {
        parse_sequence(s, MEMBER_ID_PREFIX).map(|_| Self(s.to_string()))
    }

    pub fn sequence(&self) -> Option<u64> {
        parse_sequence(&self.0, MEMBER_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MemberId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Sequential class identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(String);

impl ClassId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn from_sequence(n: u64) -> Self {
        Self(format!("{}{:04}", CLASS_ID_PREFIX, n))
    }

    pub fn sequence(&self) -> Option<u64> {
        parse_sequence(&self.0, CLASS_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ClassId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Trainer identifier (assigned by the facility, opaque to gymd)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrainerId(String);

impl TrainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TrainerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a booked session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnrollmentId(Uuid);

impl EnrollmentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EnrollmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EnrollmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a membership record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MembershipId(Uuid);

impl MembershipId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MembershipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MembershipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a connected IPC client
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_id_from_sequence_is_zero_padded() {
        assert_eq!(MemberId::from_sequence(1).as_str(), "MEM-0001");
        assert_eq!(MemberId::from_sequence(42).as_str(), "MEM-0042");
        assert_eq!(MemberId::from_sequence(12345).as_str(), "MEM-12345");
    }

    #[test]
    fn class_id_sequence_round_trip() {
        let id = ClassId::from_sequence(7);
        assert_eq!(id.as_str(), "CLS-0007");
        assert_eq!(id.sequence(), Some(7));
    }

    #[test]
    fn member_id_parse_rejects_other_shapes() {
        assert!(MemberId::parse("MEM-0003").is_some());
        assert!(MemberId::parse("MEM-").is_none());
        assert!(MemberId::parse("MEM-12a").is_none());
        assert!(MemberId::parse("jdoe").is_none());
        assert!(MemberId::parse("CLS-0001").is_none());
    }

    #[test]
    fn enrollment_id_uniqueness() {
        let e1 = EnrollmentId::new();
        let e2 = EnrollmentId::new();
        assert_ne!(e1, e2);
    }

    #[test]
    fn ids_serialize_deserialize() {
        let member_id = MemberId::from_sequence(9);
        let json = serde_json::to_string(&member_id).unwrap();
        assert_eq!(json, "\"MEM-0009\"");
        let parsed: MemberId = serde_json::from_str(&json).unwrap();
        assert_eq!(member_id, parsed);

        let enrollment_id = EnrollmentId::new();
        let json = serde_json::to_string(&enrollment_id).unwrap();
        let parsed: EnrollmentId = serde_json::from_str(&json).unwrap();
        assert_eq!(enrollment_id, parsed);
    }
}
