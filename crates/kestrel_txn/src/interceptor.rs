//! The locked-sender contract and the interceptor surface.
//!
//! A transaction's interceptor stack is guarded by a caller-held lock:
//! every method here is invoked with that lock held, so implementations
//! acquire no further locks and delegate all blocking to the wrapped
//! sender.

use kestrel_common::{BatchError, KvResult, RequestContext, Savepoint};
use kestrel_kv::{BatchRequest, BatchResponse};

use crate::leaf::{LeafTxnFinalState, LeafTxnInputState};

/// A stage of the send pipeline. The caller holds the transaction's lock
/// across the call; only the innermost sender actually blocks on I/O.
pub trait LockedSender {
    /// Send a batch and return its response. An error may carry the
    /// index of the offending request within the submitted batch.
    fn send_locked(
        &mut self,
        ctx: &RequestContext,
        ba: BatchRequest,
    ) -> Result<BatchResponse, BatchError>;
}

/// An interceptor in the transaction coordinator's send stack. Beyond
/// forwarding batches it participates in the transaction's lifecycle:
/// leaf state shipping, epoch bumps, savepoints, and teardown.
pub trait TxnInterceptor: LockedSender {
    /// Replace the downstream sender this interceptor forwards to.
    fn set_wrapped(&mut self, wrapped: Box<dyn LockedSender>);

    /// Contribute this interceptor's state to a leaf transaction's input,
    /// for shipment to distributed readers.
    fn populate_leaf_input_state(&self, state: &mut LeafTxnInputState);

    /// Initialize a fresh interceptor as a read-only leaf from shipped
    /// root state.
    fn initialize_leaf(&mut self, state: &LeafTxnInputState);

    /// Contribute to the final state a leaf reports back to its root.
    fn populate_leaf_final_state(&self, state: &mut LeafTxnFinalState);

    /// Reintegrate a leaf's final state on the root.
    fn import_leaf_final_state(
        &mut self,
        ctx: &RequestContext,
        state: &LeafTxnFinalState,
    ) -> KvResult<()>;

    /// The transaction restarted at a new epoch; state from the old epoch
    /// is no longer meaningful.
    fn epoch_bumped(&mut self);

    /// A savepoint was created at the current sequence number.
    fn create_savepoint(&mut self, s: &Savepoint);

    /// The transaction rolled back to `s`; writes above its sequence
    /// number never happened.
    fn rollback_to_savepoint(&mut self, s: &Savepoint);

    /// The transaction is finished; release per-transaction state.
    fn close(&mut self);
}
