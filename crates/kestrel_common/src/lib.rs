pub mod config;
pub mod error;
pub mod request_context;
pub mod types;
pub mod value;

pub use error::{BatchError, KvError, KvResult};
pub use request_context::RequestContext;
pub use types::{Savepoint, TxnEpoch, TxnId, TxnMeta, TxnSeq};
pub use value::{Key, Value};
