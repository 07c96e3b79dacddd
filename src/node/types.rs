use alloy_primitives::{Address, Bytes, B256, U256, U64};
use serde::{Deserialize, Serialize};

/// JSON-RPC request to gmet
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Vec<serde_json::Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &str, params: Vec<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC response from gmet
#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error from gmet
#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Block header as returned by `eth_getBlockByNumber(.., false)`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcHeader {
    pub hash: B256,
    pub parent_hash: B256,
    pub number: U64,
    /// Unix seconds
    pub timestamp: U64,
    pub miner: Address,
}

/// Block with full transaction bodies.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
    pub hash: B256,
    pub parent_hash: B256,
    pub number: U64,
    pub timestamp: U64,
    /// Fee recipient
    pub miner: Address,
    #[serde(default)]
    pub transactions: Vec<RpcTransaction>,
}

impl RpcBlock {
    pub fn number(&self) -> u64 {
        self.number.to::<u64>()
    }

    pub fn is_genesis(&self) -> bool {
        self.number() == 0
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    pub hash: B256,
    pub from: Address,
    /// None for contract creation
    #[serde(default)]
    pub to: Option<Address>,
    pub value: U256,
    pub gas: U64,
    #[serde(default)]
    pub gas_price: Option<U256>,
    pub nonce: U64,
    #[serde(default)]
    pub input: Bytes,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt {
    pub transaction_hash: B256,
    /// 0x1 success, 0x0 failure. Absent on pre-Byzantium receipts.
    #[serde(default)]
    pub status: Option<U64>,
    pub gas_used: U64,
    #[serde(default)]
    pub effective_gas_price: Option<U256>,
    #[serde(default)]
    pub contract_address: Option<Address>,
}

impl RpcReceipt {
    pub fn failed(&self) -> bool {
        matches!(self.status, Some(status) if status.is_zero())
    }
}

/// Object form of an `eth_syncing` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    pub current_block: U64,
    pub highest_block: U64,
    #[serde(default)]
    pub starting_block: Option<U64>,
}

/// One entry of `admin_peers`.
#[derive(Debug, Clone, Deserialize)]
pub struct PeerInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub enode: String,
    #[serde(default)]
    pub enr: String,
    #[serde(default)]
    pub caps: Vec<String>,
    #[serde(default)]
    pub protocols: serde_json::Value,
}
