//! Merging scan responses with buffered writes.
//!
//! The storage layer cannot see buffered writes, so its scan results must
//! be interleaved with the buffer before returning to the client. The
//! merged response lists rows in the order the server would have produced
//! had the buffered writes been durable before the scan.

use std::cmp::Ordering;

use kestrel_common::{Key, KvError, KvResult, TxnSeq, Value};
use kestrel_kv::{
    KeyValue, ReverseScanRequest, ReverseScanResponse, ScanFormat, ScanRequest, ScanResponse,
};

use crate::buffer::{BufferedWrite, WriteBuffer};

/// One row the merged response keeps: a buffered value, or the server row
/// at the given index.
enum MergeItem<'a> {
    Buffered(&'a Key, &'a Value),
    Server(usize),
}

/// Merge a forward scan's server response with the buffered writes
/// overlapping its span.
pub(crate) fn merge_scan_response(
    buffer: &WriteBuffer,
    req: &ScanRequest,
    resp: &ScanResponse,
) -> KvResult<ScanResponse> {
    check_format(req.format)?;
    let rows = merge_rows(buffer, &req.key, &req.end_key, req.seq, &resp.rows, false);
    Ok(ScanResponse { rows })
}

/// Merge a reverse scan's server response; identical to the forward case
/// with the comparison inverted and the buffer walked backwards.
pub(crate) fn merge_reverse_scan_response(
    buffer: &WriteBuffer,
    req: &ReverseScanRequest,
    resp: &ReverseScanResponse,
) -> KvResult<ReverseScanResponse> {
    check_format(req.format)?;
    let rows = merge_rows(buffer, &req.key, &req.end_key, req.seq, &resp.rows, true);
    Ok(ReverseScanResponse { rows })
}

fn check_format(format: ScanFormat) -> KvResult<()> {
    match format {
        ScanFormat::KeyValues => Ok(()),
        other => Err(KvError::UnsupportedScanFormat(other.name())),
    }
}

/// Two passes over the same walk: the first counts the merged rows so the
/// output vector is exact-sized, the second materializes them.
fn merge_rows(
    buffer: &WriteBuffer,
    start: &Key,
    end: &Key,
    seq: TxnSeq,
    server_rows: &[KeyValue],
    reverse: bool,
) -> Vec<KeyValue> {
    let mut count = 0usize;
    merge_walk(buffer, start, end, seq, server_rows, reverse, |_| count += 1);

    let mut rows = Vec::with_capacity(count);
    merge_walk(buffer, start, end, seq, server_rows, reverse, |item| {
        rows.push(match item {
            MergeItem::Buffered(key, value) => KeyValue::new(key.clone(), value.clone()),
            MergeItem::Server(idx) => server_rows[idx].clone(),
        })
    });
    debug_assert_eq!(rows.len(), count, "merged row count drifted between passes");
    rows
}

/// Walk the buffer and the server rows in lockstep (the merge step of a
/// merge sort), calling `accept` for each row the combined response keeps.
///
/// The server rows arrive already ordered in scan direction; the buffer
/// iterator is reversed to match for reverse scans. A buffered value is
/// only eligible if visible at the scan's `seq`, and a visible tombstone
/// suppresses the row entirely, matching storage-engine scan semantics.
fn merge_walk<'a>(
    buffer: &'a WriteBuffer,
    start: &'a Key,
    end: &'a Key,
    seq: TxnSeq,
    server_rows: &[KeyValue],
    reverse: bool,
    mut accept: impl FnMut(MergeItem<'a>),
) {
    let mut buf_iter: Box<dyn Iterator<Item = &'a BufferedWrite> + 'a> = if reverse {
        Box::new(buffer.overlapping(start, end).rev())
    } else {
        Box::new(buffer.overlapping(start, end))
    };
    let mut cur = buf_iter.next();
    let mut row_idx = 0usize;

    while row_idx < server_rows.len() {
        let Some(bw) = cur else { break };
        let mut ord = bw.key.cmp(&server_rows[row_idx].key);
        if reverse {
            // Prefer the larger key when scanning backwards.
            ord = ord.reverse();
        }
        match ord {
            Ordering::Less => {
                // The buffered key comes first in scan order.
                if let Some(bv) = bw.visible_at(seq) {
                    if bv.value.is_present() {
                        accept(MergeItem::Buffered(&bw.key, &bv.value));
                    }
                }
                cur = buf_iter.next();
            }
            Ordering::Equal => {
                // Same key on both sides: the buffered value wins if it
                // is visible to the scan, else the server row stands.
                match bw.visible_at(seq) {
                    Some(bv) => {
                        if bv.value.is_present() {
                            accept(MergeItem::Buffered(&bw.key, &bv.value));
                        }
                    }
                    None => accept(MergeItem::Server(row_idx)),
                }
                row_idx += 1;
                cur = buf_iter.next();
            }
            Ordering::Greater => {
                accept(MergeItem::Server(row_idx));
                row_idx += 1;
            }
        }
    }

    // One side is exhausted; drain the other.
    while row_idx < server_rows.len() {
        accept(MergeItem::Server(row_idx));
        row_idx += 1;
    }
    while let Some(bw) = cur {
        if let Some(bv) = bw.visible_at(seq) {
            if bv.value.is_present() {
                accept(MergeItem::Buffered(&bw.key, &bv.value));
            }
        }
        cur = buf_iter.next();
    }
}
