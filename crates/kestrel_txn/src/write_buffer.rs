//! Client-side buffering of transactional writes.
//!
//! `TxnWriteBuffer` is the interceptor that buffers blind writes until
//! commit time and decomposes read-write operations (conditional puts)
//! into a locking read plus a deferred write. Buffering writes batches
//! them into a single commit-time flush, elides redundant writes to the
//! same key, and serves read-your-own-writes locally instead of from the
//! leaseholder.
//!
//! The hard part is keeping the rewrite invisible: reads must see
//! buffered writes at the right sequence numbers, scans must interleave
//! buffered rows with server rows in scan order, responses must be
//! reassembled at the client's original indices, and error indexes must
//! be translated back to the batch the client actually sent.

use tracing::{debug, error, trace, warn};

use kestrel_common::config::WriteBufferingConfig;
use kestrel_common::{
    BatchError, KvError, KvResult, Key, RequestContext, Savepoint, TxnMeta, TxnSeq, Value,
};
use kestrel_kv::{
    eval_cput_condition, BatchRequest, BatchResponse, ConditionalPutResponse, DeleteResponse,
    GetRequest, GetResponse, LockStrength, PutResponse, Request, Response,
};

use crate::buffer::{BufferedWrite, WriteBuffer};
use crate::interceptor::{LockedSender, TxnInterceptor};
use crate::leaf::{LeafBufferedWrite, LeafTxnFinalState, LeafTxnInputState};
use crate::merge::{merge_reverse_scan_response, merge_scan_response};

/// Evaluator for conditional-put expectations. Overridable in tests.
pub type CPutEvalFn = fn(&[u8], Option<&Value>, bool) -> Option<KvError>;

/// A modification applied to a batch request on the way out, to be
/// accounted for when reassembling the response.
#[derive(Debug)]
struct Transformation {
    /// The request was omitted from the forwarded batch and never reached
    /// the storage layer.
    stripped: bool,
    /// Position of the original request within the incoming batch.
    index: usize,
    /// The original request, kept to drive response post-processing.
    orig: Request,
    /// Locally synthesized response. Always present when stripped; also
    /// present for requests whose server response is discarded.
    resp: Option<Response>,
}

/// Interceptor that buffers transactional writes until commit time.
pub struct TxnWriteBuffer {
    enabled: bool,
    /// Leaves serve distributed reads from an imported copy of the
    /// root's buffer and must never buffer writes of their own.
    is_leaf: bool,
    /// Per-transaction budget on buffered key+value bytes; 0 = unlimited.
    max_buffered_bytes: u64,
    buffer: WriteBuffer,
    wrapped: Box<dyn LockedSender>,
    testing_override_cput_eval: Option<CPutEvalFn>,
}

impl TxnWriteBuffer {
    /// Build an interceptor wrapping `wrapped`. The enabled flag and the
    /// byte budget are read from `config` once, here.
    pub fn new(config: &WriteBufferingConfig, wrapped: Box<dyn LockedSender>) -> Self {
        Self {
            enabled: config.enabled,
            is_leaf: false,
            max_buffered_bytes: config.max_buffered_bytes,
            buffer: WriteBuffer::default(),
            wrapped,
            testing_override_cput_eval: None,
        }
    }

    /// Whether any writes are currently buffered.
    pub fn has_buffered_writes(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Replace the conditional-put evaluator. Intended only for tests.
    pub fn testing_override_cput_eval(&mut self, eval: CPutEvalFn) {
        self.testing_override_cput_eval = Some(eval);
    }

    /// All buffered writes in key order, ids scrubbed. Intended only for
    /// tests.
    pub fn testing_writes_snapshot(&self) -> Vec<BufferedWrite> {
        self.buffer
            .iter()
            .map(|bw| {
                let mut bw = bw.clone();
                bw.id = 0;
                bw
            })
            .collect()
    }

    /// Apply transformations to `ba`, producing the requests to forward
    /// and the transformation list the response path will consume.
    ///
    /// Blind writes are stripped and buffered; point reads of buffered
    /// keys are served locally; conditional puts are rewritten into
    /// locking gets; scans overlapping the buffer are tagged for merging.
    fn apply_transformations(
        &mut self,
        ba: &BatchRequest,
    ) -> Result<(Vec<Request>, Vec<Transformation>), BatchError> {
        let mut forwarded = Vec::with_capacity(ba.requests.len());
        let mut ts = Vec::new();

        for (i, req) in ba.requests.iter().enumerate() {
            if self.is_leaf && req.is_buffered_write() {
                return Err(BatchError::assertion(format!(
                    "{} request on a leaf transaction",
                    req.method()
                ))
                .with_txn(ba.txn.id));
            }
            match req {
                Request::Put(put) => {
                    // A write that must also lock is rewritten into a
                    // locking get; the write itself is still buffered.
                    if put.must_acquire_exclusive_lock {
                        forwarded.push(Request::Get(locking_get(put.key.clone(), put.seq, true)));
                        ts.push(Transformation {
                            stripped: false,
                            index: i,
                            orig: req.clone(),
                            resp: Some(Response::Put(PutResponse {})),
                        });
                    } else {
                        ts.push(Transformation {
                            stripped: true,
                            index: i,
                            orig: req.clone(),
                            resp: Some(Response::Put(PutResponse {})),
                        });
                    }
                    self.buffer.add(put.key.clone(), put.value.clone(), put.seq);
                }

                Request::Delete(del) => {
                    // found_key is unknowable until flush; see the module
                    // docs for why the locking-get variant doesn't help.
                    let resp = Some(Response::Delete(DeleteResponse { found_key: false }));
                    if del.must_acquire_exclusive_lock {
                        forwarded.push(Request::Get(locking_get(del.key.clone(), del.seq, true)));
                        ts.push(Transformation {
                            stripped: false,
                            index: i,
                            orig: req.clone(),
                            resp,
                        });
                    } else {
                        ts.push(Transformation {
                            stripped: true,
                            index: i,
                            orig: req.clone(),
                            resp,
                        });
                    }
                    self.buffer.add(del.key.clone(), Value::tombstone(), del.seq);
                }

                Request::ConditionalPut(cput) => {
                    // Decompose into a locking get; the condition is
                    // evaluated locally on the response path and the
                    // write buffered only if it holds.
                    let lock_non_existing =
                        cput.expected.is_empty() || cput.allow_if_does_not_exist;
                    forwarded.push(Request::Get(locking_get(
                        cput.key.clone(),
                        cput.seq,
                        lock_non_existing,
                    )));
                    ts.push(Transformation {
                        stripped: false,
                        index: i,
                        orig: req.clone(),
                        resp: None,
                    });
                }

                Request::Get(get) => {
                    let Some(bv) = self.buffer.visible_at(&get.key, get.seq) else {
                        // Not buffered; the storage layer serves it.
                        forwarded.push(req.clone());
                        continue;
                    };
                    if get.return_raw_mvcc_values {
                        return Err(BatchError::assertion(
                            "raw MVCC values requested for a read served from the write buffer",
                        )
                        .with_txn(ba.txn.id));
                    }
                    trace!(key = ?get.key, seq = get.seq.0, "serving Get from the write buffer");
                    let resp = Some(Response::Get(GetResponse {
                        value: bv.value.is_present().then(|| bv.value.clone()),
                    }));
                    let stripped = get.lock_strength == LockStrength::None;
                    if !stripped {
                        // The read is served locally, but the lock must
                        // still be acquired at the leaseholder.
                        forwarded.push(req.clone());
                    }
                    ts.push(Transformation {
                        stripped,
                        index: i,
                        orig: req.clone(),
                        resp,
                    });
                }

                Request::Scan(scan) => {
                    if self.buffer.overlaps(&scan.key, &scan.end_key) {
                        if scan.return_raw_mvcc_values {
                            return Err(BatchError::assertion(
                                "raw MVCC values requested for a scan overlapping the write buffer",
                            )
                            .with_txn(ba.txn.id));
                        }
                        ts.push(Transformation {
                            stripped: false,
                            index: i,
                            orig: req.clone(),
                            resp: None,
                        });
                    }
                    // The server may hold keys the buffer doesn't;
                    // always forward.
                    forwarded.push(req.clone());
                }

                Request::ReverseScan(scan) => {
                    if self.buffer.overlaps(&scan.key, &scan.end_key) {
                        if scan.return_raw_mvcc_values {
                            return Err(BatchError::assertion(
                                "raw MVCC values requested for a scan overlapping the write buffer",
                            )
                            .with_txn(ba.txn.id));
                        }
                        ts.push(Transformation {
                            stripped: false,
                            index: i,
                            orig: req.clone(),
                            resp: None,
                        });
                    }
                    forwarded.push(req.clone());
                }

                Request::EndTxn(_) | Request::Increment(_) => {
                    forwarded.push(req.clone());
                }
            }
        }
        Ok((forwarded, ts))
    }

    /// Produce the response for one transformation, consuming the server
    /// response at the matching forwarded position when non-stripped.
    fn transformation_to_resp(
        &mut self,
        t: Transformation,
        server_resp: Option<Response>,
        txn: &TxnMeta,
    ) -> Result<Response, BatchError> {
        if t.stripped {
            return t
                .resp
                .ok_or_else(|| BatchError::assertion("stripped transformation without a response"));
        }

        match &t.orig {
            Request::ConditionalPut(cput) => {
                let Some(Response::Get(get_resp)) = server_resp else {
                    return Err(BatchError::assertion(
                        "decomposed ConditionalPut expects a Get response",
                    ));
                };
                let eval = self
                    .testing_override_cput_eval
                    .unwrap_or(eval_cput_condition as CPutEvalFn);
                if let Some(cond_failed) = eval(
                    &cput.expected,
                    get_resp.value.as_ref(),
                    cput.allow_if_does_not_exist,
                ) {
                    return Err(BatchError::new(cond_failed)
                        .with_txn(txn.id)
                        .with_index(t.index as u32));
                }
                // Condition satisfied; the write joins the buffer.
                self.buffer
                    .add(cput.key.clone(), cput.value.clone(), cput.seq);
                Ok(Response::ConditionalPut(ConditionalPutResponse {}))
            }

            Request::Get(get) => {
                // A non-stripped Get was forwarded for its lock only; the
                // buffered value it was served from takes precedence over
                // whatever the server returned.
                if get.lock_strength == LockStrength::None {
                    return Err(BatchError::assertion(
                        "non-locking Get should have been stripped",
                    ));
                }
                if !matches!(server_resp, Some(Response::Get(_))) {
                    return Err(BatchError::assertion("locking Get expects a Get response"));
                }
                t.resp
                    .ok_or_else(|| BatchError::assertion("locking Get without a buffered response"))
            }

            Request::Put(put) => {
                // Only the locking-get rewrite leaves a Put non-stripped.
                if !put.must_acquire_exclusive_lock {
                    return Err(BatchError::assertion("non-stripped Put without lock flag"));
                }
                if !matches!(server_resp, Some(Response::Get(_))) {
                    return Err(BatchError::assertion("locking Put expects a Get response"));
                }
                t.resp
                    .ok_or_else(|| BatchError::assertion("locking Put without a response"))
            }

            Request::Delete(del) => {
                if !del.must_acquire_exclusive_lock {
                    return Err(BatchError::assertion(
                        "non-stripped Delete without lock flag",
                    ));
                }
                if !matches!(server_resp, Some(Response::Get(_))) {
                    return Err(BatchError::assertion("locking Delete expects a Get response"));
                }
                t.resp
                    .ok_or_else(|| BatchError::assertion("locking Delete without a response"))
            }

            Request::Scan(scan) => {
                let Some(Response::Scan(resp)) = server_resp else {
                    return Err(BatchError::assertion("Scan transformation expects a Scan response"));
                };
                let merged = merge_scan_response(&self.buffer, scan, &resp)?;
                Ok(Response::Scan(merged))
            }

            Request::ReverseScan(scan) => {
                let Some(Response::ReverseScan(resp)) = server_resp else {
                    return Err(BatchError::assertion(
                        "ReverseScan transformation expects a ReverseScan response",
                    ));
                };
                let merged = merge_reverse_scan_response(&self.buffer, scan, &resp)?;
                Ok(Response::ReverseScan(merged))
            }

            other => Err(BatchError::assertion(format!(
                "unexpected transformation for {} request",
                other.method()
            ))),
        }
    }

    /// Reassemble the client-visible response: synthesized responses slot
    /// in at their original indices, server responses fill the rest.
    /// Every transformation and every server response must be consumed.
    fn merge_response_with_transformations(
        &mut self,
        ts: Vec<Transformation>,
        br: BatchResponse,
        txn: &TxnMeta,
    ) -> Result<BatchResponse, BatchError> {
        if ts.is_empty() {
            return Ok(br);
        }

        let merged_len = br.responses.len() + ts.iter().filter(|t| t.stripped).count();
        let mut merged = Vec::with_capacity(merged_len);
        let mut ts_iter = ts.into_iter().peekable();
        let mut server = br.responses.into_iter();

        for i in 0..merged_len {
            if ts_iter.peek().map_or(false, |t| t.index == i) {
                let t = ts_iter.next().expect("peeked");
                let resp = if t.stripped {
                    self.transformation_to_resp(t, None, txn)?
                } else {
                    let sr = server.next().ok_or_else(|| {
                        BatchError::assertion("server responses exhausted while merging")
                    })?;
                    self.transformation_to_resp(t, Some(sr), txn)?
                };
                merged.push(resp);
            } else {
                let sr = server.next().ok_or_else(|| {
                    BatchError::assertion("server responses exhausted while merging")
                })?;
                merged.push(sr);
            }
        }

        if ts_iter.next().is_some() || server.next().is_some() {
            return Err(BatchError::assertion(
                "unconsumed transformations or responses after merge",
            ));
        }
        Ok(BatchResponse::new(merged))
    }

    /// Translate a downstream error's index from the forwarded batch back
    /// to the client's original batch: every stripped request that came
    /// before it shifts the index up by one.
    fn adjust_error(
        &self,
        ts: &[Transformation],
        num_original: usize,
        mut err: BatchError,
    ) -> BatchError {
        let Some(err_idx) = err.index else { return err };

        let mut num_stripped = 0u32;
        let mut ts_pos = 0usize;
        let mut ba_idx = 0u32;
        for i in 0..num_original {
            if ts.get(ts_pos).map_or(false, |t| t.index == i) {
                let t = &ts[ts_pos];
                ts_pos += 1;
                if t.stripped {
                    num_stripped += 1;
                    continue;
                }
                if ba_idx == err_idx {
                    // The client never sent the request the error points
                    // at; surfacing the raw index would be a lie it can't
                    // interpret.
                    error!(
                        index = err_idx,
                        method = t.orig.method(),
                        "downstream error points at a transformed request"
                    );
                    let mut breach = BatchError::assertion(format!(
                        "error index {} refers to a rewritten {} request",
                        err_idx,
                        t.orig.method()
                    ));
                    breach.txn = err.txn;
                    return breach;
                }
                ba_idx += 1;
                continue;
            }
            if ba_idx == err_idx {
                break;
            }
            ba_idx += 1;
        }

        err.index = Some(err_idx + num_stripped);
        err
    }

    /// Translate a downstream error after a flush: indexes within the
    /// flush prefix refer to writes the client never sent in this batch,
    /// so they are cleared; later indexes shift down past the prefix.
    fn adjust_error_upon_flush(num_flushed: usize, mut err: BatchError) -> BatchError {
        if let Some(idx) = err.index {
            if (idx as usize) < num_flushed {
                warn!(index = idx, "error index falls within the buffer flush");
                err.index = None;
            } else {
                err.index = Some(idx - num_flushed as u32);
            }
        }
        err
    }

    /// Commit path: the batch carries an end-of-transaction marker, so
    /// every buffered write is prepended to it, in key order, before
    /// sending. The flushed writes' responses are stripped on return.
    fn flush_with_end_txn(
        &mut self,
        ctx: &RequestContext,
        ba: BatchRequest,
    ) -> Result<BatchResponse, BatchError> {
        let num_flushed = self.buffer.len();
        if num_flushed == 0 {
            return self.wrapped.send_locked(ctx, ba);
        }

        if let Some(Request::EndTxn(et)) = ba.requests.iter().find(|r| r.is_end_txn()) {
            if !et.commit {
                // Rolling back: the server discards everything anyway,
                // so the flush would be wasted work.
                debug!(buffered = num_flushed, "discarding write buffer on rollback");
                self.buffer.clear();
                return self.wrapped.send_locked(ctx, ba);
            }
        }

        debug!(
            buffered = num_flushed,
            bytes = self.buffer.size_bytes(),
            "flushing write buffer with EndTxn"
        );
        let mut requests = Vec::with_capacity(num_flushed + ba.requests.len());
        requests.extend(self.buffer.iter().map(|bw| bw.to_flush_request()));
        requests.extend(ba.requests);
        let fb = BatchRequest {
            txn: ba.txn,
            requests,
        };

        let mut br = self
            .wrapped
            .send_locked(ctx, fb)
            .map_err(|e| Self::adjust_error_upon_flush(num_flushed, e))?;
        if br.responses.len() < num_flushed {
            return Err(BatchError::assertion(
                "flush response shorter than the flush prefix",
            ));
        }
        br.responses.drain(..num_flushed);
        self.buffer.clear();
        Ok(br)
    }

    /// Whether buffering this batch's writes would push the buffer past
    /// its byte budget.
    fn exceeds_budget(&self, ba: &BatchRequest) -> bool {
        if self.max_buffered_bytes == 0 || self.buffer.is_empty() {
            return false;
        }
        let delta: u64 = ba
            .requests
            .iter()
            .map(|req| match req {
                Request::Put(put) => (put.key.len() + put.value.len()) as u64,
                Request::Delete(del) => del.key.len() as u64,
                Request::ConditionalPut(cput) => (cput.key.len() + cput.value.len()) as u64,
                _ => 0,
            })
            .sum();
        delta > 0 && self.buffer.size_bytes() + delta > self.max_buffered_bytes
    }

    /// Drain the buffer into flush requests for a partial flush.
    fn take_flush_prefix(&mut self) -> Vec<Request> {
        let reqs: Vec<Request> = self.buffer.iter().map(|bw| bw.to_flush_request()).collect();
        debug!(
            buffered = reqs.len(),
            bytes = self.buffer.size_bytes(),
            "write buffer over budget; flushing early"
        );
        self.buffer.clear();
        reqs
    }
}

fn locking_get(key: Key, seq: TxnSeq, lock_non_existing: bool) -> GetRequest {
    GetRequest {
        key,
        seq,
        lock_strength: LockStrength::Exclusive,
        lock_non_existing,
        return_raw_mvcc_values: false,
    }
}

impl LockedSender for TxnWriteBuffer {
    fn send_locked(
        &mut self,
        ctx: &RequestContext,
        ba: BatchRequest,
    ) -> Result<BatchResponse, BatchError> {
        if !self.enabled {
            return self.wrapped.send_locked(ctx, ba);
        }

        if ba.has_end_txn() {
            return self.flush_with_end_txn(ctx, ba);
        }

        // Over-budget batches force the current buffer out as a prefix of
        // this batch; buffering then continues with the new writes.
        let flush_prefix = if self.exceeds_budget(&ba) {
            self.take_flush_prefix()
        } else {
            Vec::new()
        };
        let num_flushed = flush_prefix.len();

        let (forwarded, ts) = self.apply_transformations(&ba)?;

        if num_flushed == 0 && forwarded.is_empty() {
            // Every request was handled locally. Lower layers don't
            // expect empty batches, so don't send one.
            let mut responses = Vec::with_capacity(ts.len());
            for t in ts {
                responses.push(self.transformation_to_resp(t, None, &ba.txn)?);
            }
            return Ok(BatchResponse::new(responses));
        }

        let mut requests = flush_prefix;
        requests.extend(forwarded);
        let fb = BatchRequest {
            txn: ba.txn,
            requests,
        };

        let mut br = match self.wrapped.send_locked(ctx, fb) {
            Ok(br) => br,
            Err(e) => {
                let e = if num_flushed > 0 {
                    Self::adjust_error_upon_flush(num_flushed, e)
                } else {
                    e
                };
                return Err(self.adjust_error(&ts, ba.requests.len(), e));
            }
        };

        if num_flushed > 0 {
            if br.responses.len() < num_flushed {
                return Err(BatchError::assertion(
                    "flush response shorter than the flush prefix",
                ));
            }
            br.responses.drain(..num_flushed);
        }

        self.merge_response_with_transformations(ts, br, &ba.txn)
    }
}

impl TxnInterceptor for TxnWriteBuffer {
    fn set_wrapped(&mut self, wrapped: Box<dyn LockedSender>) {
        self.wrapped = wrapped;
    }

    fn populate_leaf_input_state(&self, state: &mut LeafTxnInputState) {
        if !self.enabled || self.buffer.is_empty() {
            return;
        }
        state.buffered_writes = self
            .buffer
            .iter()
            .map(LeafBufferedWrite::from_buffered)
            .collect();
    }

    fn initialize_leaf(&mut self, state: &LeafTxnInputState) {
        if state.buffered_writes.is_empty() {
            // Nothing buffered on the root; the leaf has nothing to
            // serve and can stay out of the way.
            self.enabled = false;
            return;
        }
        self.enabled = true;
        self.is_leaf = true;
        for bw in &state.buffered_writes {
            self.buffer.install(bw.to_buffered());
        }
        // The id allocator stays at its initial value: a leaf never
        // buffers new writes.
    }

    fn populate_leaf_final_state(&self, _state: &mut LeafTxnFinalState) {}

    fn import_leaf_final_state(
        &mut self,
        _ctx: &RequestContext,
        _state: &LeafTxnFinalState,
    ) -> KvResult<()> {
        Ok(())
    }

    fn epoch_bumped(&mut self) {
        // Writes from the previous epoch never happened.
        self.buffer.clear();
    }

    fn create_savepoint(&mut self, _s: &Savepoint) {}

    fn rollback_to_savepoint(&mut self, s: &Savepoint) {
        self.buffer.rollback_to(s.seq);
    }

    fn close(&mut self) {
        self.buffer.clear();
    }
}
