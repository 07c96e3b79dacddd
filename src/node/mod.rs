//! Node gateway: the two narrow capabilities the core needs from gmet.
//!
//! [`JsonRpc`] covers single and batched JSON-RPC calls, [`GraphQl`] covers the
//! one GraphQL query used for balances. Every core component is generic over
//! these traits, so tests swap in a scripted node without touching the
//! translation logic.

pub mod http;
#[cfg(test)]
pub(crate) mod mock;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use http::HttpNode;
pub use types::*;

/// Failure talking to the node.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("node returned error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed node response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("node call timed out")]
    Timeout,
}

/// One element of a batched JSON-RPC request.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcCall {
    pub method: String,
    pub params: Vec<Value>,
}

impl RpcCall {
    pub fn new(method: &str, params: Vec<Value>) -> Self {
        Self {
            method: method.to_string(),
            params,
        }
    }
}

#[async_trait]
pub trait JsonRpc: Send + Sync {
    /// Issue a single call and return its `result` (possibly `null`).
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, NodeError>;

    /// Issue all calls in one round trip.
    ///
    /// The outer error is a transport failure of the whole batch. Each inner
    /// element carries the outcome of one call, in request order. Elements the
    /// node did not answer are absent, so the returned vector may be shorter
    /// than `calls`.
    async fn batch_call(
        &self,
        calls: Vec<RpcCall>,
    ) -> Result<Vec<Result<Value, NodeError>>, NodeError>;
}

#[async_trait]
pub trait GraphQl: Send + Sync {
    /// Run a query and return the raw response body.
    async fn query(&self, query: &str) -> Result<String, NodeError>;
}

#[async_trait]
impl<T: JsonRpc + ?Sized> JsonRpc for Arc<T> {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, NodeError> {
        (**self).call(method, params).await
    }

    async fn batch_call(
        &self,
        calls: Vec<RpcCall>,
    ) -> Result<Vec<Result<Value, NodeError>>, NodeError> {
        (**self).batch_call(calls).await
    }
}

#[async_trait]
impl<T: GraphQl + ?Sized> GraphQl for Arc<T> {
    async fn query(&self, query: &str) -> Result<String, NodeError> {
        (**self).query(query).await
    }
}
