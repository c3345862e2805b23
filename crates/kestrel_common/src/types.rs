use std::fmt;

use serde::{Deserialize, Serialize};

/// Transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxnId(pub u64);

/// Transaction epoch. Bumped when a transaction restarts; writes from
/// earlier epochs are discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxnEpoch(pub u32);

/// Per-transaction sequence number assigned to each write, used for
/// intra-transaction visibility. `i32` for wire compatibility with the
/// leaf input state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxnSeq(pub i32);

impl TxnSeq {
    pub const ZERO: TxnSeq = TxnSeq(0);

    pub fn next(self) -> TxnSeq {
        TxnSeq(self.0 + 1)
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

impl fmt::Display for TxnEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epoch:{}", self.0)
    }
}

impl fmt::Display for TxnSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq:{}", self.0)
    }
}

/// Transaction identity carried on every batch request. Errors synthesized
/// on the client (e.g. a failed conditional put) are stamped with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnMeta {
    pub id: TxnId,
    pub epoch: TxnEpoch,
}

impl TxnMeta {
    pub fn new(id: TxnId) -> Self {
        Self {
            id,
            epoch: TxnEpoch::default(),
        }
    }
}

/// Token exchanged with the savepoint manager. Captures the sequence
/// number the transaction was at when the savepoint was taken; rolling
/// back discards all writes above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Savepoint {
    pub seq: TxnSeq,
}

impl Savepoint {
    pub fn at(seq: TxnSeq) -> Self {
        Self { seq }
    }
}
