use std::str::FromStr;

use alloy_primitives::{Address, Bytes, B256};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{hash_hex, quantity_hex, Client};
use crate::error::ClientError;
use crate::node::{GraphQl, JsonRpc};
use crate::types::{CallRequest, CallResponse, Metadata};

/// Node methods reachable through [`Client::call`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMethod {
    GetBlockByNumber,
    GetTransactionReceipt,
    Call,
    EstimateGas,
}

impl CallMethod {
    pub const ALL: [CallMethod; 4] = [
        CallMethod::GetBlockByNumber,
        CallMethod::GetTransactionReceipt,
        CallMethod::Call,
        CallMethod::EstimateGas,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CallMethod::GetBlockByNumber => "eth_getBlockByNumber",
            CallMethod::GetTransactionReceipt => "eth_getTransactionReceipt",
            CallMethod::Call => "eth_call",
            CallMethod::EstimateGas => "eth_estimateGas",
        }
    }

    pub fn idempotent(&self) -> bool {
        false
    }
}

impl FromStr for CallMethod {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CallMethod::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| ClientError::CallMethodInvalid(s.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct GetBlockByNumberParams {
    index: u64,
    show_transaction_details: bool,
}

#[derive(Debug, Deserialize)]
struct GetTransactionReceiptParams {
    tx_hash: B256,
}

#[derive(Debug, Deserialize)]
struct CallParams {
    to: Address,
    data: Bytes,
    #[serde(default)]
    index: Option<u64>,
    #[serde(default)]
    hash: Option<B256>,
}

#[derive(Debug, Deserialize)]
struct EstimateGasParams {
    from: Address,
    to: Address,
    data: Bytes,
}

/// A whitelisted call with parameters already checked, ready to send.
#[derive(Debug, Clone, PartialEq)]
struct PreparedCall {
    method: CallMethod,
    params: Vec<Value>,
}

fn parse<T: DeserializeOwned>(parameters: &Metadata) -> Result<T, ClientError> {
    serde_json::from_value(Value::Object(parameters.clone()))
        .map_err(|e| ClientError::CallParametersInvalid(e.to_string()))
}

fn prepare(request: &CallRequest) -> Result<PreparedCall, ClientError> {
    let method = CallMethod::from_str(&request.method)?;
    let parameters = &request.parameters;

    let params = match method {
        CallMethod::GetBlockByNumber => {
            let p: GetBlockByNumberParams = parse(parameters)?;
            vec![json!(quantity_hex(p.index)), json!(p.show_transaction_details)]
        }
        CallMethod::GetTransactionReceipt => {
            let p: GetTransactionReceiptParams = parse(parameters)?;
            vec![json!(hash_hex(&p.tx_hash))]
        }
        CallMethod::Call => {
            let p: CallParams = parse(parameters)?;
            let block = match (p.hash, p.index) {
                (Some(hash), _) => json!(hash_hex(&hash)),
                (None, Some(index)) => json!(quantity_hex(index)),
                (None, None) => json!("latest"),
            };
            vec![json!({ "to": p.to, "data": p.data }), block]
        }
        CallMethod::EstimateGas => {
            let p: EstimateGasParams = parse(parameters)?;
            vec![json!({ "from": p.from, "to": p.to, "data": p.data })]
        }
    };

    Ok(PreparedCall { method, params })
}

impl<R: JsonRpc, G: GraphQl> Client<R, G> {
    /// Forward a whitelisted node method.
    ///
    /// The method name and parameters are checked locally first; nothing is
    /// sent unless both are valid.
    pub async fn call(&self, request: &CallRequest) -> Result<CallResponse, ClientError> {
        let prepared = prepare(request)?;
        let method = prepared.method.name();

        debug!("{}: params={:?}", method, prepared.params);
        let raw = self
            .rpc
            .call(method, prepared.params)
            .await
            .map_err(ClientError::upstream(method))?;

        let result = match prepared.method {
            CallMethod::Call | CallMethod::EstimateGas => json!({ "data": raw }),
            CallMethod::GetBlockByNumber | CallMethod::GetTransactionReceipt => raw,
        };

        Ok(CallResponse {
            result,
            idempotent: prepared.method.idempotent(),
        })
    }
}
