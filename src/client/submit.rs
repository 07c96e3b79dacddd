use std::str::FromStr;

use alloy_primitives::{Address, U256, U64};
use serde_json::json;
use tracing::{debug, info};

use super::{checksum, Client};
use crate::error::ClientError;
use crate::node::{GraphQl, JsonRpc};

impl<R: JsonRpc, G: GraphQl> Client<R, G> {
    /// Next nonce for `account`, counting pending transactions.
    pub async fn pending_nonce_at(&self, account: &str) -> Result<u64, ClientError> {
        let address = Address::from_str(account)
            .map_err(|e| ClientError::InvalidAccount(format!("{}: {}", account, e)))?;

        debug!("eth_getTransactionCount: account={}", account);
        let raw = self
            .rpc
            .call(
                "eth_getTransactionCount",
                vec![json!(checksum(&address)), json!("pending")],
            )
            .await
            .map_err(ClientError::upstream("eth_getTransactionCount"))?;
        let nonce: U64 =
            serde_json::from_value(raw).map_err(ClientError::decode("eth_getTransactionCount"))?;
        Ok(nonce.to::<u64>())
    }

    /// Gas price the node currently suggests, in wei.
    pub async fn suggest_gas_price(&self) -> Result<U256, ClientError> {
        let raw = self
            .rpc
            .call("eth_gasPrice", vec![])
            .await
            .map_err(ClientError::upstream("eth_gasPrice"))?;
        serde_json::from_value(raw).map_err(ClientError::decode("eth_gasPrice"))
    }

    /// Broadcast an already signed, RLP encoded transaction.
    pub async fn send_transaction(&self, raw_tx: &[u8]) -> Result<(), ClientError> {
        let encoded = format!("0x{}", hex::encode(raw_tx));
        let tx_hash = self
            .rpc
            .call("eth_sendRawTransaction", vec![json!(encoded)])
            .await
            .map_err(ClientError::upstream("eth_sendRawTransaction"))?;
        info!("Submitted transaction {}", tx_hash);
        Ok(())
    }
}
