use std::str::FromStr;

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use super::{checksum, hash_hex, Client};
use crate::error::ClientError;
use crate::node::{GraphQl, JsonRpc, NodeError};
use crate::types::{
    AccountBalanceResponse, AccountIdentifier, AccountMetadata, Amount, BlockIdentifier,
    PartialBlockIdentifier,
};

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    #[serde(default)]
    data: Option<BalanceData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct BalanceData {
    #[serde(default)]
    block: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct BalanceBlock {
    hash: String,
    #[serde(deserialize_with = "long")]
    number: u64,
    #[serde(default)]
    account: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceAccount {
    balance: U256,
    #[serde(deserialize_with = "long")]
    transaction_count: u64,
    code: String,
}

/// GraphQL `Long` values come back either as JSON numbers or hex strings
/// depending on the node version.
fn long<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom(format!("{} is not a u64", n))),
        Value::String(s) => {
            let parsed = match s.strip_prefix("0x") {
                Some(hex) => u64::from_str_radix(hex, 16),
                None => s.parse::<u64>(),
            };
            parsed.map_err(serde::de::Error::custom)
        }
        other => Err(serde::de::Error::custom(format!("unexpected long {}", other))),
    }
}

fn balance_query(address: &str, selector: &str) -> String {
    format!(
        r#"{{
			block({}){{
				hash
				number
				account(address:"{}"){{
					balance
					transactionCount
					code
				}}
			}}
		}}"#,
        selector, address
    )
}

/// GraphQL block arguments. A hash takes precedence when both are set.
fn block_selector(partial: Option<&PartialBlockIdentifier>) -> Result<String, ClientError> {
    let Some(partial) = partial else {
        return Ok(String::new());
    };
    if let Some(hash) = &partial.hash {
        let hash = B256::from_str(hash)
            .map_err(|e| ClientError::InvalidBlockIdentifier(format!("{}: {}", hash, e)))?;
        return Ok(format!(r#"hash: "{}""#, hash_hex(&hash)));
    }
    Ok(partial
        .index
        .map(|index| format!("number: {}", index))
        .unwrap_or_default())
}

impl<R: JsonRpc, G: GraphQl> Client<R, G> {
    /// Balance, nonce and code of `account` at the selected block (latest when
    /// `None`), resolved with a single GraphQL round trip.
    pub async fn balance(
        &self,
        account: &AccountIdentifier,
        partial: Option<&PartialBlockIdentifier>,
    ) -> Result<AccountBalanceResponse, ClientError> {
        let address = Address::from_str(&account.address)
            .map_err(|e| ClientError::InvalidAccount(format!("{}: {}", account.address, e)))?;
        let selector = block_selector(partial)?;
        let query = balance_query(&checksum(&address), &selector);

        debug!("graphql balance: account={}, block=({})", account.address, selector);
        let body = self
            .graphql
            .query(&query)
            .await
            .map_err(ClientError::upstream("graphql balance query"))?;

        let response: BalanceResponse =
            serde_json::from_str(&body).map_err(ClientError::decode("graphql balance query"))?;
        let Some(data) = response.data else {
            let messages = response
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            let reason = if messages.is_empty() {
                "response carried no data".to_string()
            } else {
                messages
            };
            return Err(ClientError::upstream("graphql balance query")(NodeError::Transport(
                reason,
            )));
        };
        let block = match data.block {
            Some(block) if !block.is_null() => block,
            _ => return Err(ClientError::UnknownBlockReference(selector)),
        };
        let block: BalanceBlock =
            serde_json::from_value(block).map_err(ClientError::decode("graphql balance query"))?;

        let account_data = match block.account {
            Some(account) if !account.is_null() => account,
            _ => {
                return Err(ClientError::InvalidAccount(format!(
                    "{}: node returned no account",
                    account.address
                )))
            }
        };
        let account_data: BalanceAccount = serde_json::from_value(account_data)
            .map_err(|e| ClientError::InvalidAccount(format!("{}: {}", account.address, e)))?;

        Ok(AccountBalanceResponse {
            block_identifier: BlockIdentifier {
                index: block.number,
                hash: block.hash,
            },
            balances: vec![Amount {
                value: account_data.balance.to_string(),
                currency: self.currency.clone(),
            }],
            metadata: AccountMetadata {
                code: account_data.code,
                nonce: account_data.transaction_count,
            },
        })
    }
}
