use std::str::FromStr;

use alloy_primitives::{B256, U64};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info};

use super::operations::extract_operations;
use super::{hash_hex, quantity_hex, timestamp_millis, Client};
use crate::error::ClientError;
use crate::node::{GraphQl, JsonRpc, RpcBlock, RpcCall, RpcReceipt, RpcTransaction};
use crate::types::{
    Block, BlockIdentifier, Metadata, PartialBlockIdentifier, Transaction, TransactionIdentifier,
};

/// A resolved block selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSelector {
    Latest,
    Hash(B256),
    Index(u64),
}

impl BlockSelector {
    /// Resolve a partial identifier to exactly one selector.
    pub fn resolve(partial: Option<&PartialBlockIdentifier>) -> Result<Self, ClientError> {
        let Some(partial) = partial else {
            return Ok(BlockSelector::Latest);
        };
        match (&partial.hash, partial.index) {
            (Some(_), Some(_)) => Err(ClientError::InvalidBlockIdentifier(
                "specify either a hash or an index, not both".to_string(),
            )),
            (Some(hash), None) => B256::from_str(hash)
                .map(BlockSelector::Hash)
                .map_err(|e| ClientError::InvalidBlockIdentifier(format!("{}: {}", hash, e))),
            (None, Some(index)) => Ok(BlockSelector::Index(index)),
            (None, None) => Ok(BlockSelector::Latest),
        }
    }

    /// Method and leading parameter for a block lookup.
    fn request(&self) -> (&'static str, Value) {
        match self {
            BlockSelector::Latest => ("eth_getBlockByNumber", json!("latest")),
            BlockSelector::Hash(hash) => ("eth_getBlockByHash", json!(hash_hex(hash))),
            BlockSelector::Index(index) => ("eth_getBlockByNumber", json!(quantity_hex(*index))),
        }
    }
}

impl<R: JsonRpc, G: GraphQl> Client<R, G> {
    /// Assemble the canonical block for `partial` (latest when `None`).
    ///
    /// Steps run strictly in order: block, trace, receipts, extraction. Any
    /// failure aborts the call; no partial block is ever returned.
    pub async fn block(
        &self,
        partial: Option<&PartialBlockIdentifier>,
    ) -> Result<Block, ClientError> {
        let selector = BlockSelector::resolve(partial)?;
        let (method, block_arg) = selector.request();

        debug!("{}: selector={:?}", method, selector);
        let raw = self
            .rpc
            .call(method, vec![block_arg, json!(true)])
            .await
            .map_err(ClientError::upstream(method))?;
        if raw.is_null() {
            return Err(ClientError::BlockNotFound);
        }
        let block: RpcBlock = serde_json::from_value(raw).map_err(ClientError::decode(method))?;

        let traces = self.trace_block(&block.hash).await?;
        if traces.len() != block.transactions.len() {
            return Err(ClientError::TraceUnavailable {
                block_hash: hash_hex(&block.hash),
                reason: format!(
                    "trace covers {} of {} transactions",
                    traces.len(),
                    block.transactions.len()
                ),
            });
        }

        let receipts = if block.is_genesis() {
            block.transactions.iter().map(genesis_receipt).collect()
        } else {
            self.block_receipts(&block.transactions).await?
        };
        for (tx, receipt) in block.transactions.iter().zip(receipts.iter()) {
            if receipt.transaction_hash != tx.hash {
                error!(
                    "Receipt {} paired with transaction {}",
                    hash_hex(&receipt.transaction_hash),
                    hash_hex(&tx.hash)
                );
                return Err(ClientError::ReceiptMismatch {
                    transaction: hash_hex(&tx.hash),
                    receipt: hash_hex(&receipt.transaction_hash),
                });
            }
        }

        let transactions = block
            .transactions
            .iter()
            .zip(traces.iter())
            .zip(receipts.iter())
            .map(|((tx, trace), receipt)| Transaction {
                transaction_identifier: TransactionIdentifier {
                    hash: hash_hex(&tx.hash),
                },
                operations: extract_operations(trace, tx, receipt, &block.miner, &self.currency),
                metadata: transaction_metadata(tx, receipt, trace.error.is_some()),
            })
            .collect::<Vec<_>>();

        let block_identifier = BlockIdentifier {
            index: block.number(),
            hash: hash_hex(&block.hash),
        };
        let parent_block_identifier = if block.is_genesis() {
            block_identifier.clone()
        } else {
            BlockIdentifier {
                index: block.number() - 1,
                hash: hash_hex(&block.parent_hash),
            }
        };

        info!(
            "Assembled block {} ({}) with {} transactions",
            block_identifier.index,
            block_identifier.hash,
            transactions.len()
        );

        Ok(Block {
            block_identifier,
            parent_block_identifier,
            timestamp: timestamp_millis(block.timestamp, method)?,
            transactions,
        })
    }

    /// Fetch every receipt of the block in one batched round trip.
    async fn block_receipts(
        &self,
        transactions: &[RpcTransaction],
    ) -> Result<Vec<RpcReceipt>, ClientError> {
        if transactions.is_empty() {
            return Ok(Vec::new());
        }

        let calls = transactions
            .iter()
            .map(|tx| RpcCall::new("eth_getTransactionReceipt", vec![json!(hash_hex(&tx.hash))]))
            .collect::<Vec<_>>();
        let requested = calls.len();

        let replies = self
            .rpc
            .batch_call(calls)
            .await
            .map_err(ClientError::upstream("eth_getTransactionReceipt"))?;

        if replies.len() != requested {
            error!(
                "Receipt batch returned {} results for {} transactions",
                replies.len(),
                requested
            );
            return Err(ClientError::BatchSizeMismatch {
                requested,
                received: replies.len(),
            });
        }

        let mut values = Vec::with_capacity(requested);
        for reply in replies {
            let value = reply.map_err(ClientError::upstream("eth_getTransactionReceipt"))?;
            if !value.is_null() {
                values.push(value);
            }
        }
        if values.len() != requested {
            return Err(ClientError::BatchSizeMismatch {
                requested,
                received: values.len(),
            });
        }

        values
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(ClientError::decode("eth_getTransactionReceipt")))
            .collect()
    }
}

/// Allocations in the genesis block have no receipt and pay no fee.
fn genesis_receipt(tx: &RpcTransaction) -> RpcReceipt {
    RpcReceipt {
        transaction_hash: tx.hash,
        status: Some(U64::from(1)),
        gas_used: U64::ZERO,
        effective_gas_price: None,
        contract_address: None,
    }
}

fn transaction_metadata(tx: &RpcTransaction, receipt: &RpcReceipt, trace_failed: bool) -> Metadata {
    let mut metadata = Map::new();
    metadata.insert("gas_limit".to_string(), json!(quantity_hex(tx.gas.to::<u64>())));
    metadata.insert(
        "gas_price".to_string(),
        json!(format!("0x{:x}", receipt.effective_gas_price.or(tx.gas_price).unwrap_or_default())),
    );
    metadata.insert(
        "gas_used".to_string(),
        json!(quantity_hex(receipt.gas_used.to::<u64>())),
    );
    metadata.insert(
        "receipt_status".to_string(),
        json!(if receipt.failed() { "0x0" } else { "0x1" }),
    );
    metadata.insert(
        "trace_reverted".to_string(),
        json!(receipt.failed() || trace_failed),
    );
    if let Some(address) = receipt.contract_address {
        metadata.insert("contract_address".to_string(), json!(super::checksum(&address)));
    }
    metadata
}
