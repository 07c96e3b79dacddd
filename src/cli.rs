//! Operator command line: one subcommand per client entry point, printing
//! pretty JSON on stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use crate::client::{Client, ClientOptions};
use crate::config::{Config, Mode};
use crate::node::HttpNode;
use crate::types::{AccountIdentifier, CallRequest, PartialBlockIdentifier};

#[derive(Parser, Debug)]
#[command(
    name = "metadium-ledger",
    about = "Ledger API core for Metadium: blocks, balances and status from a gmet node",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Current head, sync progress and peers
    Status,
    /// Identifier of block 0
    Genesis,
    /// Assemble a block with its operations (latest by default)
    Block(BlockArgs),
    /// Balance, nonce and code of an account
    Balance {
        /// Account address
        address: String,
        #[command(flatten)]
        block: BlockArgs,
    },
    /// Forward a whitelisted node method
    Call {
        /// eth_getBlockByNumber, eth_getTransactionReceipt, eth_call or eth_estimateGas
        method: String,
        /// Parameters as a JSON object
        #[arg(value_name = "JSON", default_value = "{}")]
        params: String,
    },
    /// Pending nonce of an account
    Nonce {
        address: String,
    },
    /// Suggested gas price in wei
    GasPrice,
    /// Broadcast a signed raw transaction
    Send {
        /// Hex encoded transaction, with or without 0x prefix
        raw: String,
    },
}

#[derive(Args, Debug, Default)]
pub struct BlockArgs {
    /// Block height
    #[arg(long, conflicts_with = "hash")]
    pub index: Option<u64>,
    /// Block hash
    #[arg(long)]
    pub hash: Option<String>,
}

impl BlockArgs {
    fn partial(&self) -> Option<PartialBlockIdentifier> {
        if self.index.is_none() && self.hash.is_none() {
            return None;
        }
        Some(PartialBlockIdentifier {
            index: self.index,
            hash: self.hash.clone(),
        })
    }
}

/// Configuration as printed in OFFLINE mode.
pub fn describe_config(config: &Config) -> Value {
    json!({
        "mode": match config.mode {
            Mode::Online => "ONLINE",
            Mode::Offline => "OFFLINE",
        },
        "network": config.network_identifier(),
        "currency": config.currency(),
        "port": config.port,
        "node_url": config.node_url,
        "remote_node": config.remote_node,
        "skip_admin_calls": config.skip_admin_calls,
        "max_trace_concurrency": config.max_trace_concurrency,
        "tracer": config.tracer,
        "trace_timeout_secs": config.trace_timeout.as_secs(),
    })
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Execute one subcommand against the configured node.
pub async fn run(cli: Cli, config: Config) -> Result<()> {
    if config.mode == Mode::Offline {
        info!("OFFLINE mode: node access disabled");
        return print(&describe_config(&config));
    }

    let node = Arc::new(HttpNode::new(&config.node_url));
    info!("Using gmet at {}", node.rpc_url());
    let client = Client::new(node.clone(), node, ClientOptions::from(&config));

    match cli.command {
        Command::Status => print(&client.status().await?),
        Command::Genesis => print(&client.genesis_block_identifier().await?),
        Command::Block(args) => print(&client.block(args.partial().as_ref()).await?),
        Command::Balance { address, block } => {
            let account = AccountIdentifier { address };
            print(&client.balance(&account, block.partial().as_ref()).await?)
        }
        Command::Call { method, params } => {
            let parameters = serde_json::from_str(&params)
                .with_context(|| format!("parameters must be a JSON object: {}", params))?;
            let request = CallRequest { method, parameters };
            print(&client.call(&request).await?)
        }
        Command::Nonce { address } => {
            print(&json!({ "nonce": client.pending_nonce_at(&address).await? }))
        }
        Command::GasPrice => {
            print(&json!({ "gas_price": client.suggest_gas_price().await?.to_string() }))
        }
        Command::Send { raw } => {
            let bytes = hex::decode(raw.trim_start_matches("0x"))
                .context("raw transaction must be hex encoded")?;
            client.send_transaction(&bytes).await?;
            print(&json!({ "submitted": true }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("metadium-ledger").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_block_selector_flags() {
        let Command::Block(args) = parse(&["block"]).command else {
            panic!("expected block");
        };
        assert_eq!(args.partial(), None);

        let Command::Block(args) = parse(&["block", "--index", "10992"]).command else {
            panic!("expected block");
        };
        assert_eq!(args.partial(), Some(PartialBlockIdentifier::by_index(10992)));

        let conflicting = Cli::try_parse_from(["metadium-ledger", "block", "--index", "1", "--hash", "0x00"]);
        assert!(conflicting.is_err());
    }

    #[test]
    fn test_call_defaults_to_empty_params() {
        let Command::Call { method, params } = parse(&["call", "eth_call"]).command else {
            panic!("expected call");
        };
        assert_eq!(method, "eth_call");
        assert_eq!(params, "{}");
    }

    #[test]
    fn test_describe_offline_config() {
        let config = Config::from_lookup(|key| match key {
            "MODE" => Some("OFFLINE".to_string()),
            "NETWORK" => Some("TESTNET".to_string()),
            "PORT" => Some("8080".to_string()),
            _ => None,
        })
        .unwrap();

        let described = describe_config(&config);
        assert_eq!(described["mode"], json!("OFFLINE"));
        assert_eq!(
            described["network"],
            json!({ "blockchain": "Metadium", "network": "testnet" })
        );
        assert_eq!(described["currency"], json!({ "symbol": "META", "decimals": 18 }));
        assert_eq!(described["remote_node"], json!(false));
    }
}
