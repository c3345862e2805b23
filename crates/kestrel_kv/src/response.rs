use serde::{Deserialize, Serialize};

use kestrel_common::{Key, Value};

/// One row of a scan response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: Key,
    pub value: Value,
}

impl KeyValue {
    pub fn new(key: Key, value: Value) -> Self {
        Self { key, value }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResponse {
    /// The value read, or `None` if the key does not exist.
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutResponse {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    /// Whether the key existed. A buffered delete reports `false`; the
    /// true answer is only known at flush time.
    pub found_key: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalPutResponse {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResponse {
    /// Rows in ascending key order.
    pub rows: Vec<KeyValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseScanResponse {
    /// Rows in descending key order.
    pub rows: Vec<KeyValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndTxnResponse {
    pub committed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementResponse {
    pub new_value: i64,
}

/// The result of one KV operation; positions mirror the request batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Get(GetResponse),
    Put(PutResponse),
    Delete(DeleteResponse),
    ConditionalPut(ConditionalPutResponse),
    Scan(ScanResponse),
    ReverseScan(ReverseScanResponse),
    EndTxn(EndTxnResponse),
    Increment(IncrementResponse),
}

impl Response {
    pub fn method(&self) -> &'static str {
        match self {
            Response::Get(_) => "Get",
            Response::Put(_) => "Put",
            Response::Delete(_) => "Delete",
            Response::ConditionalPut(_) => "ConditionalPut",
            Response::Scan(_) => "Scan",
            Response::ReverseScan(_) => "ReverseScan",
            Response::EndTxn(_) => "EndTxn",
            Response::Increment(_) => "Increment",
        }
    }
}
