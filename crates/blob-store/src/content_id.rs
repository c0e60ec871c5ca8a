use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

/// Opaque handle to the bytes of a stored blob.
///
/// Ids are minted by the store on `put` and `copy`; a copy always
/// gets a fresh id so two logical files never share a physical blob,
/// and deleting one cannot strand the other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId(String);

#[derive(Debug, thiserror::Error)]
pub enum ContentIdError {
    #[error("content id must be 32 hex characters, got {0:?}")]
    Malformed(String),
}

impl ContentId {
    /// Mint a fresh content id.
    pub fn generate() -> Self {
        ContentId(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContentId {
    type Err = ContentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ContentIdError::Malformed(s.to_string()));
        }
        Ok(ContentId(s.to_ascii_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_unique() {
        assert_ne!(ContentId::generate(), ContentId::generate());
    }

    #[test]
    fn test_parse_round_trip() {
        let id = ContentId::generate();
        let parsed: ContentId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("not-hex".parse::<ContentId>().is_err());
        assert!("abc123".parse::<ContentId>().is_err());
    }
}
