//! Wire state shipped from a root transaction to its leaves.
//!
//! Distributed query executors read through leaf transactions; for
//! read-your-own-writes to hold, the root's write buffer travels with
//! them. The wire shape is fixed for cross-version compatibility:
//! `{id: u64, key: bytes, vals: [{value: bytes-or-absent, seq: i32}]}`.
//! Transmission order is informative only; receivers sort by key on
//! import.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use kestrel_common::{TxnSeq, Value};

use crate::buffer::{BufferedValue, BufferedWrite};

/// One buffered value on the wire. `value: None` is a deletion tombstone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafBufferedValue {
    pub value: Option<Bytes>,
    pub seq: i32,
}

/// One buffered write on the wire. Ids are preserved verbatim; the leaf
/// never allocates new ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafBufferedWrite {
    pub id: u64,
    pub key: Bytes,
    pub vals: Vec<LeafBufferedValue>,
}

impl LeafBufferedWrite {
    pub(crate) fn from_buffered(bw: &BufferedWrite) -> Self {
        Self {
            id: bw.id,
            key: bw.key.clone(),
            vals: bw
                .vals
                .iter()
                .map(|bv| LeafBufferedValue {
                    value: bv.value.clone().into_raw(),
                    seq: bv.seq.0,
                })
                .collect(),
        }
    }

    pub(crate) fn to_buffered(&self) -> BufferedWrite {
        BufferedWrite {
            id: self.id,
            key: self.key.clone(),
            vals: self
                .vals
                .iter()
                .map(|bv| BufferedValue {
                    value: Value::from_raw(bv.value.clone()),
                    seq: TxnSeq(bv.seq),
                })
                .collect(),
        }
    }
}

/// State a root populates when constructing a leaf transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafTxnInputState {
    pub buffered_writes: Vec<LeafBufferedWrite>,
}

/// State a leaf reports back when it finishes. The write buffer
/// contributes nothing: a leaf never mutates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafTxnFinalState {}
