// Store-native document identifiers: 24 lower-case hexadecimal characters.
//
// Layout of generated ids (12 bytes, hex-encoded):
//   [0..4)   seconds since the Unix epoch, big-endian
//   [4..9)   per-process random bytes
//   [9..12)  counter, big-endian, randomly seeded

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of characters in a textual document identifier.
pub const ID_LEN: usize = 24;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("document id is empty")]
    Empty,

    #[error("document id must be {ID_LEN} characters, got {0}")]
    WrongLength(usize),

    #[error("document id must contain only lower-case hexadecimal characters")]
    InvalidCharacter,
}

/// A validated document identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    /// Parse a raw path segment into an identifier.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        if raw.is_empty() {
            return Err(IdError::Empty);
        }
        if raw.len() != ID_LEN {
            return Err(IdError::WrongLength(raw.chars().count()));
        }
        if !raw.bytes().all(is_lower_hex) {
            return Err(IdError::InvalidCharacter);
        }
        Ok(Self(raw.to_owned()))
    }

    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        let seconds = chrono::Utc::now().timestamp().clamp(0, i64::from(u32::MAX)) as u32;
        let counter = next_counter();

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(process_unique());
        bytes[9..].copy_from_slice(&counter.to_be_bytes()[1..]);

        Self(hex_encode(&bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Pure shape check; never allocates.
pub fn is_valid(raw: &str) -> bool {
    raw.len() == ID_LEN && raw.bytes().all(is_lower_hex)
}

fn is_lower_hex(byte: u8) -> bool {
    byte.is_ascii_digit() || (b'a'..=b'f').contains(&byte)
}

fn process_unique() -> &'static [u8; 5] {
    static PROCESS_UNIQUE: OnceLock<[u8; 5]> = OnceLock::new();
    PROCESS_UNIQUE.get_or_init(|| {
        let mut bytes = [0u8; 5];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes
    })
}

fn next_counter() -> u32 {
    static COUNTER: OnceLock<AtomicU32> = OnceLock::new();
    let counter = COUNTER.get_or_init(|| AtomicU32::new(rand::thread_rng().gen_range(0..0x00ff_ffff)));
    counter.fetch_add(1, Ordering::Relaxed) & 0x00ff_ffff
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DocumentId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DocumentId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DocumentId> for String {
    fn from(value: DocumentId) -> Self {
        value.0
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_lower_hex_of_exact_length() {
        let id = DocumentId::parse("507f1f77bcf86cd799439011").unwrap();
        assert_eq!(id.as_str(), "507f1f77bcf86cd799439011");
        assert!(is_valid("507f1f77bcf86cd799439011"));
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(DocumentId::parse(""), Err(IdError::Empty));
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(DocumentId::parse("abc"), Err(IdError::WrongLength(3)));
        assert!(!is_valid("507f1f77bcf86cd7994390111"));
    }

    #[test]
    fn rejects_upper_case_hex() {
        assert_eq!(
            DocumentId::parse("507F1F77BCF86CD799439011"),
            Err(IdError::InvalidCharacter)
        );
    }

    #[test]
    fn rejects_non_hex_characters() {
        assert!(DocumentId::parse("not-an-id").is_err());
        assert_eq!(
            DocumentId::parse("zzzzzzzzzzzzzzzzzzzzzzzz"),
            Err(IdError::InvalidCharacter)
        );
    }

    #[test]
    fn multibyte_input_does_not_panic() {
        // 24 bytes, fewer chars.
        let raw = "éééééééééééé";
        assert_eq!(raw.len(), 24);
        assert_eq!(DocumentId::parse(raw), Err(IdError::InvalidCharacter));
    }

    #[test]
    fn generated_ids_are_valid_and_distinct() {
        let a = DocumentId::generate();
        let b = DocumentId::generate();
        assert!(is_valid(a.as_str()));
        assert!(is_valid(b.as_str()));
        assert_ne!(a, b);
    }

    #[test]
    fn generated_ids_share_process_bytes() {
        let a = DocumentId::generate();
        let b = DocumentId::generate();
        assert_eq!(&a.as_str()[8..18], &b.as_str()[8..18]);
    }

    #[test]
    fn serde_round_trip_validates() {
        let parsed: Result<DocumentId, _> = serde_json::from_str("\"not-an-id\"");
        assert!(parsed.is_err());
        let parsed: DocumentId = serde_json::from_str("\"507f1f77bcf86cd799439011\"").unwrap();
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"507f1f77bcf86cd799439011\"");
    }
}
