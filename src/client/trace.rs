use std::str::FromStr;
use std::sync::Arc;

use alloy_primitives::{Address, B256, U256, U64};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use super::{hash_hex, Client};
use crate::error::ClientError;
use crate::node::{GraphQl, JsonRpc, NodeError};
use crate::types::OperationType;

/// Admission gate for block trace calls.
///
/// Tracing replays a whole block on the node, so only a fixed number of
/// trace calls may be outstanding at once. Callers wait for a slot instead of
/// being rejected. Clones share the same slots.
#[derive(Clone, Debug)]
pub struct TraceGate(Arc<Semaphore>);

impl TraceGate {
    /// Capacity is clamped to `1..=Semaphore::MAX_PERMITS`; an empty gate
    /// would never admit a trace.
    pub fn new(capacity: usize) -> Self {
        let clamped = capacity.clamp(1, Semaphore::MAX_PERMITS);
        if clamped != capacity {
            warn!("Trace gate capacity {} clamped to {}", capacity, clamped);
        }
        Self(Arc::new(Semaphore::new(clamped)))
    }

    /// Wait for a slot. The slot is returned when the permit is dropped.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, ClientError> {
        self.0
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ClientError::Canceled)
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.0.available_permits()
    }

    /// Fail all pending and future acquisitions with [`ClientError::Canceled`].
    pub fn close(&self) {
        self.0.close();
    }
}

/// Frame kind reported by the call tracer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CallKind {
    Call,
    CallCode,
    DelegateCall,
    StaticCall,
    Create,
    Create2,
    #[serde(alias = "SUICIDE")]
    SelfDestruct,
    Precompiled,
}

impl CallKind {
    /// DELEGATECALL and STATICCALL run foreign code but never move value.
    pub fn moves_value(&self) -> bool {
        !matches!(self, CallKind::DelegateCall | CallKind::StaticCall)
    }

    pub fn is_create(&self) -> bool {
        matches!(self, CallKind::Create | CallKind::Create2)
    }

    pub fn operation_type(&self) -> OperationType {
        match self {
            CallKind::Call
            | CallKind::DelegateCall
            | CallKind::StaticCall
            | CallKind::Precompiled => OperationType::Call,
            CallKind::CallCode => OperationType::CallCode,
            CallKind::Create => OperationType::Create,
            CallKind::Create2 => OperationType::Create2,
            CallKind::SelfDestruct => OperationType::SelfDestruct,
        }
    }
}

/// One frame of a transaction's call tree.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallTrace {
    #[serde(rename = "type")]
    pub kind: CallKind,
    pub from: Address,
    #[serde(default, deserialize_with = "optional_address")]
    pub to: Option<Address>,
    #[serde(default)]
    pub value: Option<U256>,
    #[serde(default)]
    pub gas_used: Option<U64>,
    /// Set when this frame itself failed.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub calls: Vec<CallTrace>,
}

impl CallTrace {
    /// Kind with plain calls into precompile addresses reported as
    /// [`CallKind::Precompiled`].
    pub fn effective_kind(&self) -> CallKind {
        match (self.kind, self.to) {
            (CallKind::Call, Some(to)) if is_precompile(&to) => CallKind::Precompiled,
            (kind, _) => kind,
        }
    }

    pub fn value(&self) -> U256 {
        self.value.unwrap_or_default()
    }
}

/// Addresses 0x01..=0x09 host the native precompiled contracts.
fn is_precompile(address: &Address) -> bool {
    let bytes = address.as_slice();
    bytes[..19].iter().all(|b| *b == 0) && (1..=9).contains(&bytes[19])
}

/// Failed creates may report `to` as an empty string.
fn optional_address<'de, D>(deserializer: D) -> Result<Option<Address>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") | Some("0x") => Ok(None),
        Some(s) => Address::from_str(s)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Deserialize)]
struct BlockTraceEntry {
    #[serde(default)]
    result: Option<CallTrace>,
    #[serde(default)]
    error: Option<String>,
}

impl<R: JsonRpc, G: GraphQl> Client<R, G> {
    /// Fetch the call tree of every transaction in the block, in block order.
    ///
    /// Holds one trace gate slot for the duration of the node call.
    pub async fn trace_block(&self, block_hash: &B256) -> Result<Vec<CallTrace>, ClientError> {
        let _permit = self.trace_gate.acquire().await?;

        let hash = hash_hex(block_hash);
        let unavailable = |reason: String| ClientError::TraceUnavailable {
            block_hash: hash.clone(),
            reason,
        };

        let trace_config = json!({
            "tracer": self.tracer,
            "timeout": format!("{}s", self.trace_timeout.as_secs()),
        });

        debug!("debug_traceBlockByHash: block={}, tracer={}", hash, self.tracer);

        let request = self
            .rpc
            .call("debug_traceBlockByHash", vec![json!(hash), trace_config]);
        // A deadline that does not fit in a Duration is no deadline at all.
        let response = match self.trace_timeout.checked_add(self.trace_deadline_grace) {
            Some(deadline) => tokio::time::timeout(deadline, request)
                .await
                .map_err(|_| unavailable("timed out".to_string()))?,
            None => request.await,
        };
        let raw = match response {
            Err(err @ (NodeError::Rpc { .. } | NodeError::Timeout)) => {
                warn!("Trace call for block {} failed: {}", hash, err);
                return Err(unavailable(err.to_string()));
            }
            Err(err) => return Err(ClientError::upstream("debug_traceBlockByHash")(err)),
            Ok(Value::Null) => return Err(unavailable("node returned no trace".to_string())),
            Ok(raw) => raw,
        };

        let entries: Vec<BlockTraceEntry> =
            serde_json::from_value(raw).map_err(ClientError::decode("debug_traceBlockByHash"))?;

        entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| match (entry.result, entry.error) {
                (_, Some(err)) => Err(unavailable(format!("transaction {}: {}", i, err))),
                (Some(trace), None) => Ok(trace),
                (None, None) => Err(unavailable(format!("transaction {}: empty trace", i))),
            })
            .collect()
    }
}
