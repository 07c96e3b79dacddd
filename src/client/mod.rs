//! Translator core: turns gmet node responses into ledger API objects.
//!
//! [`Client`] composes the node gateway with the trace admission gate.
//! Each entry point lives in its own module:
//!
//! - `status` - head, sync progress and peers
//! - `balance` - point-in-time balance via one GraphQL query
//! - `call` - whitelisted generic node calls
//! - `trace` - gated `debug_traceBlockByHash`
//! - `operations` - call trace + receipt -> ordered operations
//! - `block` - block assembly
//! - `submit` - nonce, gas price and raw transaction pass-through

pub mod balance;
pub mod block;
pub mod call;
pub mod operations;
pub mod status;
pub mod submit;
pub mod trace;

use std::time::Duration;

use alloy_primitives::{Address, B256, U64};

use crate::config::{native_currency, Config, BLOCKCHAIN, MAINNET_NETWORK};
use crate::error::ClientError;
use crate::node::{GraphQl, JsonRpc};
use crate::types::{Currency, NetworkIdentifier};

pub use operations::extract_operations;
pub use trace::{CallKind, CallTrace, TraceGate};

/// Tunables for a [`Client`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub skip_admin_calls: bool,
    pub max_trace_concurrency: usize,
    pub tracer: String,
    pub trace_timeout: Duration,
    /// Slack on top of `trace_timeout` before the local deadline fires.
    pub trace_deadline_grace: Duration,
    pub currency: Currency,
    pub network: NetworkIdentifier,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            skip_admin_calls: false,
            max_trace_concurrency: 16,
            tracer: "callTracer".to_string(),
            trace_timeout: Duration::from_secs(120),
            trace_deadline_grace: Duration::from_secs(10),
            currency: native_currency(),
            network: NetworkIdentifier {
                blockchain: BLOCKCHAIN.to_string(),
                network: MAINNET_NETWORK.to_string(),
            },
        }
    }
}

impl From<&Config> for ClientOptions {
    fn from(config: &Config) -> Self {
        Self {
            skip_admin_calls: config.skip_admin_calls,
            max_trace_concurrency: config.max_trace_concurrency,
            tracer: config.tracer.clone(),
            trace_timeout: config.trace_timeout,
            currency: config.currency(),
            network: config.network_identifier(),
            ..ClientOptions::default()
        }
    }
}

/// Ledger client over a JSON-RPC capability `R` and a GraphQL capability `G`.
///
/// Holds no mutable state besides the trace gate, so one instance serves any
/// number of concurrent requests.
pub struct Client<R, G> {
    rpc: R,
    graphql: G,
    trace_gate: TraceGate,
    tracer: String,
    trace_timeout: Duration,
    trace_deadline_grace: Duration,
    skip_admin_calls: bool,
    currency: Currency,
    network: NetworkIdentifier,
}

impl<R: JsonRpc, G: GraphQl> Client<R, G> {
    pub fn new(rpc: R, graphql: G, options: ClientOptions) -> Self {
        let trace_gate = TraceGate::new(options.max_trace_concurrency);
        Self::with_trace_gate(rpc, graphql, options, trace_gate)
    }

    /// Build a client that shares `trace_gate` with other clients, so the
    /// trace bound holds process-wide.
    pub fn with_trace_gate(
        rpc: R,
        graphql: G,
        options: ClientOptions,
        trace_gate: TraceGate,
    ) -> Self {
        Self {
            rpc,
            graphql,
            trace_gate,
            tracer: options.tracer,
            trace_timeout: options.trace_timeout,
            trace_deadline_grace: options.trace_deadline_grace,
            skip_admin_calls: options.skip_admin_calls,
            currency: options.currency,
            network: options.network,
        }
    }

    pub fn trace_gate(&self) -> &TraceGate {
        &self.trace_gate
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn network_identifier(&self) -> &NetworkIdentifier {
        &self.network
    }
}

pub(crate) fn hash_hex(hash: &B256) -> String {
    format!("0x{}", hex::encode(hash))
}

pub(crate) fn quantity_hex(value: u64) -> String {
    format!("0x{:x}", value)
}

pub(crate) fn checksum(address: &Address) -> String {
    address.to_checksum(None)
}

/// Unix seconds as reported by the node, in milliseconds.
pub(crate) fn timestamp_millis(seconds: U64, step: &'static str) -> Result<i64, ClientError> {
    i64::try_from(seconds.to::<u64>())
        .ok()
        .and_then(|s| s.checked_mul(1000))
        .ok_or_else(|| ClientError::malformed(step, format!("timestamp {} out of range", seconds)))
}
