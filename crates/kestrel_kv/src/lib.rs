pub mod batch;
pub mod eval;
pub mod request;
pub mod response;

pub use batch::{BatchRequest, BatchResponse};
pub use eval::eval_cput_condition;
pub use request::{
    ConditionalPutRequest, DeleteRequest, EndTxnRequest, GetRequest, IncrementRequest,
    LockStrength, PutRequest, Request, ReverseScanRequest, ScanFormat, ScanRequest,
};
pub use response::{
    ConditionalPutResponse, DeleteResponse, EndTxnResponse, GetResponse, IncrementResponse,
    KeyValue, PutResponse, Response, ReverseScanResponse, ScanResponse,
};
