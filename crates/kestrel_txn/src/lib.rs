pub mod buffer;
pub mod interceptor;
pub mod leaf;
mod merge;
pub mod write_buffer;


pub use buffer::{BufferedValue, BufferedWrite, WriteBuffer};
pub use interceptor::{LockedSender, TxnInterceptor};
pub use leaf::{LeafBufferedValue, LeafBufferedWrite, LeafTxnFinalState, LeafTxnInputState};
pub use write_buffer::TxnWriteBuffer;
