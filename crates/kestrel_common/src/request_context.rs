//! Per-request context threaded through the client send pipeline.
//!
//! The interceptor stack never blocks on its own; the context is handed
//! down to the wrapped sender, which honors cancellation while the batch
//! is in flight. On cancellation the write buffer is left intact — the
//! transaction coordinator decides whether to roll back.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Global monotonic request ID counter.
static GLOBAL_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a new unique request ID.
pub fn next_request_id() -> u64 {
    GLOBAL_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

/// Context for one batch send, propagated to the wrapped sender.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique per batch send (monotonic).
    pub request_id: u64,
    /// Transaction ID (0 if not yet assigned).
    pub txn_id: u64,
    /// When this request entered the pipeline.
    pub started_at: Instant,
    cancelled: Arc<AtomicBool>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: next_request_id(),
            txn_id: 0,
            started_at: Instant::now(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_txn_id(mut self, txn_id: u64) -> Self {
        self.txn_id = txn_id;
        self
    }

    /// Request cancellation. Senders poll `is_cancelled` at their
    /// suspension points.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn elapsed_us(&self) -> u64 {
        self.started_at.elapsed().as_micros() as u64
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
