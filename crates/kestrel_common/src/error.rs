use thiserror::Error;

use crate::types::TxnId;
use crate::value::Value;

/// Convenience alias for `Result<T, KvError>`.
pub type KvResult<T> = Result<T, KvError>;

/// Errors surfaced by the KV client send path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KvError {
    /// A conditional put's expectation did not match the existing value.
    /// Evaluated on the client after the decomposed locking read returns.
    #[error("condition failed: expected {expected:?}, found {actual:?}")]
    ConditionFailed {
        expected: Vec<u8>,
        actual: Option<Value>,
    },

    /// A scan response format that cannot be merged with buffered writes.
    #[error("unsupported scan format {0}: cannot merge with buffered writes")]
    UnsupportedScanFormat(&'static str),

    /// Should never occur in a correct caller. Carries a description for
    /// post-mortem; surfaced as a fatal internal error.
    #[error("assertion failed: {0}")]
    AssertionFailed(String),

    /// An error reported by the storage layer.
    #[error("server error: {0}")]
    Server(String),

    /// The per-transaction write buffer is at its byte budget and the
    /// reject policy is in effect.
    #[error("write buffer at capacity ({used_bytes} / {limit_bytes} bytes)")]
    MemoryPressure { used_bytes: u64, limit_bytes: u64 },
}

/// An error produced while evaluating a batch. `index`, when set, is the
/// position of the offending request within the batch it was returned
/// for; the write buffer remaps it so the client always sees an index
/// into its own original batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{detail}")]
pub struct BatchError {
    pub detail: KvError,
    pub index: Option<u32>,
    pub txn: Option<TxnId>,
}

impl BatchError {
    pub fn new(detail: KvError) -> Self {
        Self {
            detail,
            index: None,
            txn: None,
        }
    }

    pub fn with_index(mut self, index: u32) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_txn(mut self, txn: TxnId) -> Self {
        self.txn = Some(txn);
        self
    }

    /// Shorthand for an assertion failure.
    pub fn assertion(msg: impl Into<String>) -> Self {
        Self::new(KvError::AssertionFailed(msg.into()))
    }
}

impl From<KvError> for BatchError {
    fn from(detail: KvError) -> Self {
        Self::new(detail)
    }
}
