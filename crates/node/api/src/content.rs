//! Content references.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

/// Length of a content digest in bytes.
const DIGEST_LEN: usize = 32;

/// Content address of a stored blob: the hex-encoded SHA3-256 of its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentRef([u8; DIGEST_LEN]);

impl ContentRef {
    /// Reference for the given content.
    pub fn for_content(data: &[u8]) -> Self {
        Self(Sha3_256::digest(data).into())
    }

    /// True if `data` hashes to this reference.
    pub fn matches(&self, data: &[u8]) -> bool {
        Self::for_content(data) == *self
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// A string that is not a 64-digit hex digest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid content reference: {0:?}")]
pub struct InvalidContentRef(pub String);

impl FromStr for ContentRef {
    type Err = InvalidContentRef;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut digest = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s, &mut digest).map_err(|_| InvalidContentRef(s.to_string()))?;
        Ok(Self(digest))
    }
}

impl TryFrom<String> for ContentRef {
    type Error = InvalidContentRef;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContentRef> for String {
    fn from(reference: ContentRef) -> Self {
        reference.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_is_content_addressed() {
        let a = ContentRef::for_content(b"hello");
        assert_eq!(a, ContentRef::for_content(b"hello"));
        assert_ne!(a, ContentRef::for_content(b"hello!"));
        assert!(a.matches(b"hello"));
        assert!(!a.matches(b"world"));
    }

    #[test]
    fn test_parse_display() {
        let reference = ContentRef::for_content(&[0u8; 128]);
        let text = reference.to_string();
        assert_eq!(text.len(), 64);
        assert_eq!(text.parse::<ContentRef>().unwrap(), reference);
    }

    #[test]
    fn test_rejects_malformed() {
        assert!("zz".parse::<ContentRef>().is_err());
        assert!("abcd".parse::<ContentRef>().is_err());
        assert!("".parse::<ContentRef>().is_err());
    }
}
