use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

const HEX_LEN: usize = 64;

/// Lowercase hex SHA-256 of a file's full byte content.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(String);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid content hash {0:?}: expected 64 hex characters")]
pub struct ParseContentHashError(String);

impl ContentHash {
    pub fn from_digest(digest: &[u8]) -> Self {
        ContentHash(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First characters of the hash, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl FromStr for ContentHash {
    type Err = ParseContentHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(ContentHash(s.to_ascii_lowercase()))
        } else {
            Err(ParseContentHashError(s.to_string()))
        }
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short())
    }
}

impl AsRef<str> for ContentHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str =
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn parses_and_normalizes_case() {
        let hash: ContentHash = EMPTY_SHA256.to_uppercase().parse().unwrap();
        assert_eq!(hash.as_str(), EMPTY_SHA256);
        assert_eq!(hash.short(), "e3b0c44298fc");
    }

    #[test]
    fn rejects_wrong_length_and_non_hex() {
        assert!("abc".parse::<ContentHash>().is_err());
        let bad = format!("{}zz", &EMPTY_SHA256[..62]);
        assert!(bad.parse::<ContentHash>().is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let hash: ContentHash = EMPTY_SHA256.parse().unwrap();
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{EMPTY_SHA256}\""));
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
