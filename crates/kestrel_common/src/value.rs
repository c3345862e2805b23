use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A binary key. Compared lexicographically on raw bytes.
pub type Key = Bytes;

/// An opaque KV value: a byte payload plus a present bit. The absent form
/// is a deletion tombstone — it suppresses the key from scan output and
/// flushes as a Delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    raw: Option<Bytes>,
}

impl Value {
    /// A present value holding `bytes`.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            raw: Some(bytes.into()),
        }
    }

    /// The absent form: a deletion tombstone.
    pub fn tombstone() -> Self {
        Self { raw: None }
    }

    pub fn is_present(&self) -> bool {
        self.raw.is_some()
    }

    /// The payload, if present.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.raw.as_deref()
    }

    /// Payload length in bytes; 0 for a tombstone.
    pub fn len(&self) -> usize {
        self.raw.as_ref().map_or(0, |b| b.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The raw payload for wire transmission; `None` for a tombstone.
    pub fn into_raw(self) -> Option<Bytes> {
        self.raw
    }

    /// Rebuild from a wire payload; `None` yields a tombstone.
    pub fn from_raw(raw: Option<Bytes>) -> Self {
        Self { raw }
    }
}
