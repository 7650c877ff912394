use std::fmt;

use bytes::Bytes;
use rand::RngCore;

/// Content injected at one peer and expected verbatim at the other.
#[derive(Clone, PartialEq, Eq)]
pub struct TransferPayload(Bytes);

impl TransferPayload {
    /// `size` bytes from the thread-local RNG.
    pub fn random(size: usize) -> Self {
        let mut buf = vec![0u8; size];
        rand::rng().fill_bytes(&mut buf);
        Self(Bytes::from(buf))
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Cheap clone of the content.
    pub fn to_bytes(&self) -> Bytes {
        self.0.clone()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Offset of the first byte where `received` differs, if any.
    pub fn first_difference(&self, received: &[u8]) -> Option<usize> {
        let common = self
            .0
            .iter()
            .zip(received)
            .position(|(sent, got)| sent != got);
        match common {
            Some(offset) => Some(offset),
            None if self.0.len() != received.len() => Some(self.0.len().min(received.len())),
            None => None,
        }
    }
}

impl fmt::Debug for TransferPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = self.0.get(..8).unwrap_or(self.as_bytes());
        write!(f, "TransferPayload({} bytes, {}..)", self.0.len(), hex::encode(head))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_has_requested_size() {
        let payload = TransferPayload::random(128);
        assert_eq!(payload.len(), 128);
        assert_ne!(payload, TransferPayload::random(128));
    }

    #[test]
    fn test_first_difference() {
        let payload = TransferPayload::from_bytes(&b"relayed"[..]);
        assert_eq!(payload.first_difference(b"relayed"), None);
        assert_eq!(payload.first_difference(b"relaxed"), Some(4));
        assert_eq!(payload.first_difference(b"relay"), Some(5));
        assert_eq!(payload.first_difference(b"relayed!"), Some(7));
    }

    #[test]
    fn test_debug_is_abbreviated() {
        let payload = TransferPayload::from_bytes(vec![0xab; 64]);
        assert_eq!(
            format!("{payload:?}"),
            "TransferPayload(64 bytes, abababababababab..)"
        );
    }
}
