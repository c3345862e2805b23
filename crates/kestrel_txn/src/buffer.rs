//! Per-transaction store of buffered writes, keyed by binary key.
//!
//! A transaction may write to a single key multiple times. Only the final
//! value needs to reach the storage layer at commit, but intermediate
//! values are retained to serve read-your-own-writes at any sequence
//! number and to support savepoint rollbacks.

use std::collections::BTreeMap;
use std::ops::Bound;

use kestrel_common::{Key, TxnSeq, Value};
use kestrel_kv::{DeleteRequest, PutRequest, Request};

/// A value written to a key at a given sequence number. A non-present
/// value is a deletion tombstone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedValue {
    pub value: Value,
    pub seq: TxnSeq,
}

/// A buffered write to one key. `vals` is non-empty and strictly
/// ascending by `seq`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedWrite {
    /// Allocated when the record is first inserted; not client-visible.
    pub id: u64,
    pub key: Key,
    pub vals: Vec<BufferedValue>,
}

impl BufferedWrite {
    /// The buffered value visible to a read at `seq`: the one with the
    /// greatest sequence number `<= seq`, if any.
    pub fn visible_at(&self, seq: TxnSeq) -> Option<&BufferedValue> {
        // Reads usually land at or above the latest buffered write, so
        // walk from the end.
        self.vals.iter().rev().find(|bv| bv.seq <= seq)
    }

    /// The most recent buffered value.
    pub fn last(&self) -> &BufferedValue {
        self.vals.last().expect("buffered write with no values")
    }

    /// The write to emit when flushing this record: a Put of the final
    /// value, or a Delete if the final value is a tombstone.
    pub fn to_flush_request(&self) -> Request {
        let last = self.last();
        if last.value.is_present() {
            Request::Put(PutRequest::new(
                self.key.clone(),
                last.value.clone(),
                last.seq,
            ))
        } else {
            Request::Delete(DeleteRequest::new(self.key.clone(), last.seq))
        }
    }
}

/// Key-ordered store of buffered writes with point and range lookups.
///
/// Keys are compared lexicographically on raw bytes. Byte accounting
/// covers every key once plus every buffered payload, matching the
/// per-transaction budget the interceptor enforces.
#[derive(Debug, Default)]
pub struct WriteBuffer {
    tree: BTreeMap<Key, BufferedWrite>,
    id_alloc: u64,
    size_bytes: u64,
}

impl WriteBuffer {
    /// Point lookup by key.
    pub fn get(&self, key: &[u8]) -> Option<&BufferedWrite> {
        self.tree.get(key)
    }

    /// The buffered value visible to a read of `key` at `seq`.
    pub fn visible_at(&self, key: &[u8], seq: TxnSeq) -> Option<&BufferedValue> {
        self.get(key)?.visible_at(seq)
    }

    /// Records overlapping `[start, end)`, in key order. Navigable from
    /// either end for reverse scans.
    pub fn overlapping<'a>(
        &'a self,
        start: &'a [u8],
        end: &'a [u8],
    ) -> impl DoubleEndedIterator<Item = &'a BufferedWrite> + 'a {
        // An inverted span yields nothing rather than panicking in range().
        let end = if end < start { start } else { end };
        self.tree
            .range::<[u8], _>((Bound::Included(start), Bound::Excluded(end)))
            .map(|(_, bw)| bw)
    }

    /// Whether any buffered write falls within `[start, end)`.
    pub fn overlaps(&self, start: &[u8], end: &[u8]) -> bool {
        self.overlapping(start, end).next().is_some()
    }

    /// Record a write of `value` to `key` at `seq`. Appends to an
    /// existing record or inserts a fresh one with a newly allocated id.
    pub fn add(&mut self, key: Key, value: Value, seq: TxnSeq) {
        self.size_bytes += value.len() as u64;
        match self.tree.get_mut(&key[..]) {
            Some(bw) => {
                debug_assert!(
                    bw.vals.last().map_or(true, |bv| bv.seq < seq),
                    "buffered values must be strictly ascending by seq"
                );
                bw.vals.push(BufferedValue { value, seq });
            }
            None => {
                self.size_bytes += key.len() as u64;
                self.id_alloc += 1;
                let bw = BufferedWrite {
                    id: self.id_alloc,
                    key: key.clone(),
                    vals: vec![BufferedValue { value, seq }],
                };
                self.tree.insert(key, bw);
            }
        }
    }

    /// Install a record verbatim, preserving its id. Used when a leaf
    /// imports the root's buffer; the id allocator is left untouched.
    pub fn install(&mut self, bw: BufferedWrite) {
        self.size_bytes += bw.key.len() as u64;
        self.size_bytes += bw.vals.iter().map(|bv| bv.value.len() as u64).sum::<u64>();
        self.tree.insert(bw.key.clone(), bw);
    }

    /// Discard every buffered value with a sequence number above `seq`,
    /// dropping records left empty.
    pub fn rollback_to(&mut self, seq: TxnSeq) {
        let mut emptied = Vec::new();
        for (key, bw) in self.tree.iter_mut() {
            while bw.vals.last().map_or(false, |bv| bv.seq > seq) {
                if let Some(bv) = bw.vals.pop() {
                    self.size_bytes -= bv.value.len() as u64;
                }
            }
            if bw.vals.is_empty() {
                emptied.push(key.clone());
            }
        }
        for key in emptied {
            self.size_bytes -= key.len() as u64;
            self.tree.remove(&key[..]);
        }
    }

    /// All records in key order.
    pub fn iter(&self) -> impl Iterator<Item = &BufferedWrite> {
        self.tree.values()
    }

    /// Number of distinct buffered keys.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Current `Σ (len(key) + len(value))` across the buffer.
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn clear(&mut self) {
        self.tree.clear();
        self.size_bytes = 0;
    }
}
