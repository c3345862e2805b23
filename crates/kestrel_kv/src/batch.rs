use serde::{Deserialize, Serialize};

use kestrel_common::TxnMeta;

use crate::request::Request;
use crate::response::Response;

/// An ordered list of KV operations carried as one RPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub txn: TxnMeta,
    pub requests: Vec<Request>,
}

impl BatchRequest {
    pub fn new(txn: TxnMeta) -> Self {
        Self {
            txn,
            requests: Vec::new(),
        }
    }

    pub fn with_requests(txn: TxnMeta, requests: Vec<Request>) -> Self {
        Self { txn, requests }
    }

    pub fn add(&mut self, req: Request) {
        self.requests.push(req);
    }

    /// Whether the batch carries an end-of-transaction marker anywhere.
    pub fn has_end_txn(&self) -> bool {
        self.requests.iter().any(Request::is_end_txn)
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }
}

/// Results for a batch, one response per request, at matching indices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub responses: Vec<Response>,
}

impl BatchResponse {
    pub fn new(responses: Vec<Response>) -> Self {
        Self { responses }
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}
