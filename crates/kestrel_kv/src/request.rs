use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use kestrel_common::{Key, TxnSeq, Value};

/// Strength of the lock a read acquires at the leaseholder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockStrength {
    /// Plain read; no lock is acquired.
    #[default]
    None,
    Shared,
    Exclusive,
}

/// Result format requested by a scan. Only `KeyValues` can be merged with
/// buffered writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanFormat {
    #[default]
    KeyValues,
    BatchResponse,
    ColBatchResponse,
}

impl ScanFormat {
    pub fn name(self) -> &'static str {
        match self {
            ScanFormat::KeyValues => "key_values",
            ScanFormat::BatchResponse => "batch_response",
            ScanFormat::ColBatchResponse => "col_batch_response",
        }
    }
}

/// Point read. A locking get (`lock_strength != None`) additionally
/// places a lock on the key at the leaseholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRequest {
    pub key: Key,
    pub seq: TxnSeq,
    pub lock_strength: LockStrength,
    /// Acquire the lock even if the key does not exist.
    pub lock_non_existing: bool,
    /// Return raw MVCC values instead of decoded ones. Incompatible with
    /// serving the read from a write buffer.
    pub return_raw_mvcc_values: bool,
}

impl GetRequest {
    pub fn new(key: Key, seq: TxnSeq) -> Self {
        Self {
            key,
            seq,
            lock_strength: LockStrength::None,
            lock_non_existing: false,
            return_raw_mvcc_values: false,
        }
    }

    pub fn locking(mut self, strength: LockStrength) -> Self {
        self.lock_strength = strength;
        self
    }
}

/// Blind write of a value to a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutRequest {
    pub key: Key,
    pub value: Value,
    pub seq: TxnSeq,
    /// The write must also acquire an exclusive lock at the leaseholder,
    /// even while the write itself is buffered.
    pub must_acquire_exclusive_lock: bool,
}

impl PutRequest {
    pub fn new(key: Key, value: Value, seq: TxnSeq) -> Self {
        Self {
            key,
            value,
            seq,
            must_acquire_exclusive_lock: false,
        }
    }
}

/// Blind deletion of a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub key: Key,
    pub seq: TxnSeq,
    pub must_acquire_exclusive_lock: bool,
}

impl DeleteRequest {
    pub fn new(key: Key, seq: TxnSeq) -> Self {
        Self {
            key,
            seq,
            must_acquire_exclusive_lock: false,
        }
    }
}

/// Conditional write: succeeds only if the existing value matches
/// `expected`. An empty `expected` means the key must not exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalPutRequest {
    pub key: Key,
    pub value: Value,
    /// Raw bytes the existing value must equal; empty expects absence.
    pub expected: Bytes,
    /// A missing existing value also satisfies the condition.
    pub allow_if_does_not_exist: bool,
    pub seq: TxnSeq,
}

impl ConditionalPutRequest {
    pub fn new(key: Key, value: Value, expected: Bytes, seq: TxnSeq) -> Self {
        Self {
            key,
            value,
            expected,
            allow_if_does_not_exist: false,
            seq,
        }
    }
}

/// Forward scan over `[key, end_key)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub key: Key,
    pub end_key: Key,
    pub seq: TxnSeq,
    pub format: ScanFormat,
    pub return_raw_mvcc_values: bool,
}

impl ScanRequest {
    pub fn new(key: Key, end_key: Key, seq: TxnSeq) -> Self {
        Self {
            key,
            end_key,
            seq,
            format: ScanFormat::KeyValues,
            return_raw_mvcc_values: false,
        }
    }
}

/// Reverse scan over `[key, end_key)`, rows returned in descending key
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseScanRequest {
    pub key: Key,
    pub end_key: Key,
    pub seq: TxnSeq,
    pub format: ScanFormat,
    pub return_raw_mvcc_values: bool,
}

impl ReverseScanRequest {
    pub fn new(key: Key, end_key: Key, seq: TxnSeq) -> Self {
        Self {
            key,
            end_key,
            seq,
            format: ScanFormat::KeyValues,
            return_raw_mvcc_values: false,
        }
    }
}

/// End-of-transaction marker: finalizes the transaction as a commit or a
/// rollback. Its presence in a batch triggers the buffer flush path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndTxnRequest {
    pub commit: bool,
}

/// Atomic increment of an integer-encoded key. Carried here as a
/// representative request kind the write buffer passes through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementRequest {
    pub key: Key,
    pub delta: i64,
    pub seq: TxnSeq,
}

/// One KV operation within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    Get(GetRequest),
    Put(PutRequest),
    Delete(DeleteRequest),
    ConditionalPut(ConditionalPutRequest),
    Scan(ScanRequest),
    ReverseScan(ReverseScanRequest),
    EndTxn(EndTxnRequest),
    Increment(IncrementRequest),
}

impl Request {
    /// Method name for logging.
    pub fn method(&self) -> &'static str {
        match self {
            Request::Get(_) => "Get",
            Request::Put(_) => "Put",
            Request::Delete(_) => "Delete",
            Request::ConditionalPut(_) => "ConditionalPut",
            Request::Scan(_) => "Scan",
            Request::ReverseScan(_) => "ReverseScan",
            Request::EndTxn(_) => "EndTxn",
            Request::Increment(_) => "Increment",
        }
    }

    /// Whether this request would be absorbed into the write buffer
    /// rather than forwarded.
    pub fn is_buffered_write(&self) -> bool {
        matches!(
            self,
            Request::Put(_) | Request::Delete(_) | Request::ConditionalPut(_)
        )
    }

    pub fn is_end_txn(&self) -> bool {
        matches!(self, Request::EndTxn(_))
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.method())
    }
}
