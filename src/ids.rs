// ============================================================================
// Identifiers - Parimutuel Escrow
// ============================================================================
//
// Question and answer identifiers are opaque 32-byte strings. The escrow only
// ever compares them for equality; it never looks inside.
//
// Hex literals shorter than 64 digits are zero-filled after the given
// digits, so "0x1" becomes 0x1000...0 (the way fixture ids are written).
//
// ============================================================================

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Native currency units. Every accumulation is checked.
pub type Amount = u64;

/// Width of every question/answer identifier in bytes
pub const ID_BYTES: usize = 32;

// ============================================================================
// FIXED-WIDTH IDENTIFIER
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Id32(pub [u8; ID_BYTES]);

pub type QuestionId = Id32;
pub type AnswerId = Id32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdParseError {
    #[error("identifier has {0} hex digits, at most 64 allowed")]
    TooLong(usize),

    #[error("identifier is empty")]
    Empty,

    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

impl Id32 {
    pub const fn new(bytes: [u8; ID_BYTES]) -> Self {
        Id32(bytes)
    }

    /// Parse a hex literal, zero-filling the tail up to 32 bytes.
    pub fn from_hex(literal: &str) -> Result<Self, IdParseError> {
        let digits = literal
            .strip_prefix("0x")
            .or_else(|| literal.strip_prefix("0X"))
            .unwrap_or(literal);

        if digits.is_empty() {
            return Err(IdParseError::Empty);
        }
        if digits.len() > ID_BYTES * 2 {
            return Err(IdParseError::TooLong(digits.len()));
        }

        let mut padded = String::with_capacity(ID_BYTES * 2);
        padded.push_str(digits);
        while padded.len() < ID_BYTES * 2 {
            padded.push('0');
        }

        let mut bytes = [0u8; ID_BYTES];
        hex::decode_to_slice(&padded, &mut bytes)
            .map_err(|e| IdParseError::InvalidHex(e.to_string()))?;
        Ok(Id32(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; ID_BYTES] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// First 8 hex digits, for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl FromStr for Id32 {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Id32::from_hex(s)
    }
}

impl From<[u8; ID_BYTES]> for Id32 {
    fn from(bytes: [u8; ID_BYTES]) -> Self {
        Id32(bytes)
    }
}

impl fmt::Display for Id32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Id32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id32({})", self.to_hex())
    }
}

impl Serialize for Id32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Id32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let literal = String::deserialize(deserializer)?;
        Id32::from_hex(&literal).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// CALLER IDENTITY
// ============================================================================

/// Authenticated caller identity (wallet address, account name, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(addr: impl Into<String>) -> Self {
        Address(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Truncated form for log lines
    pub fn short(&self) -> &str {
        self.0.get(..16).unwrap_or(&self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Address(s.to_string())
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Address(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
