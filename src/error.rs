use thiserror::Error;

use crate::node::NodeError;

/// Discrete failure causes surfaced by the ledger client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BlockNotFound,
    InvalidBlockIdentifier,
    UnknownBlockReference,
    InvalidAccount,
    CallParametersInvalid,
    CallMethodInvalid,
    TraceUnavailable,
    BatchSizeMismatch,
    UpstreamTransportError,
    Canceled,
}

/// Errors returned by [`crate::client::Client`].
///
/// Validation failures (selector, method, parameters, account) are produced
/// before any node access. Everything else wraps an upstream response.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The node has no head yet, or the selected block does not exist.
    #[error("block not found")]
    BlockNotFound,

    /// The block selector is malformed or names both a hash and an index.
    #[error("invalid block identifier: {0}")]
    InvalidBlockIdentifier(String),

    /// A balance query referenced a block the node does not know.
    #[error("unknown block reference: {0}")]
    UnknownBlockReference(String),

    #[error("invalid account: {0}")]
    InvalidAccount(String),

    #[error("call parameters invalid: {0}")]
    CallParametersInvalid(String),

    #[error("call method not supported: {0}")]
    CallMethodInvalid(String),

    #[error("trace unavailable for block {block_hash}: {reason}")]
    TraceUnavailable { block_hash: String, reason: String },

    #[error("batch size mismatch: requested {requested}, received {received}")]
    BatchSizeMismatch { requested: usize, received: usize },

    /// A batched receipt answers a different transaction than the one it was
    /// requested for. Reported under [`ErrorKind::BatchSizeMismatch`].
    #[error("receipt for {receipt} returned in place of {transaction}")]
    ReceiptMismatch { transaction: String, receipt: String },

    #[error("{step} failed: {source}")]
    Upstream {
        step: &'static str,
        #[source]
        source: NodeError,
    },

    #[error("request canceled")]
    Canceled,
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::BlockNotFound => ErrorKind::BlockNotFound,
            ClientError::InvalidBlockIdentifier(_) => ErrorKind::InvalidBlockIdentifier,
            ClientError::UnknownBlockReference(_) => ErrorKind::UnknownBlockReference,
            ClientError::InvalidAccount(_) => ErrorKind::InvalidAccount,
            ClientError::CallParametersInvalid(_) => ErrorKind::CallParametersInvalid,
            ClientError::CallMethodInvalid(_) => ErrorKind::CallMethodInvalid,
            ClientError::TraceUnavailable { .. } => ErrorKind::TraceUnavailable,
            ClientError::BatchSizeMismatch { .. } | ClientError::ReceiptMismatch { .. } => {
                ErrorKind::BatchSizeMismatch
            }
            ClientError::Upstream { .. } => ErrorKind::UpstreamTransportError,
            ClientError::Canceled => ErrorKind::Canceled,
        }
    }

    /// Wrap a gateway error with the step that issued it.
    pub fn upstream(step: &'static str) -> impl FnOnce(NodeError) -> ClientError {
        move |source| ClientError::Upstream { step, source }
    }

    /// A response that decoded but carries a value the client cannot use.
    pub fn malformed(step: &'static str, reason: String) -> ClientError {
        ClientError::Upstream {
            step,
            source: NodeError::Decode(<serde_json::Error as serde::de::Error>::custom(reason)),
        }
    }

    /// Wrap a response that could not be decoded into the expected shape.
    pub fn decode(step: &'static str) -> impl FnOnce(serde_json::Error) -> ClientError {
        move |err| ClientError::Upstream {
            step,
            source: NodeError::Decode(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_keeps_step_in_message() {
        let err = ClientError::upstream("eth_syncing")(NodeError::Rpc {
            code: -32601,
            message: "method not found".to_string(),
        });
        assert_eq!(err.kind(), ErrorKind::UpstreamTransportError);
        assert_eq!(
            err.to_string(),
            "eth_syncing failed: node returned error -32601: method not found"
        );
    }
}
