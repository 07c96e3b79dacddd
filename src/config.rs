use std::env;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tokio::sync::Semaphore;

use crate::types::{Currency, NetworkIdentifier};

/// Default URL of a locally supervised gmet node.
pub const DEFAULT_GMET_URL: &str = "http://localhost:8588";

pub const BLOCKCHAIN: &str = "Metadium";
pub const MAINNET_NETWORK: &str = "mainnet";
pub const TESTNET_NETWORK: &str = "testnet";

pub const CURRENCY_SYMBOL: &str = "META";
pub const CURRENCY_DECIMALS: u32 = 18;

/// Upper bound for `TRACE_TIMEOUT_SECS` (one day).
pub const MAX_TRACE_TIMEOUT_SECS: u64 = 86_400;

/// Whether the process may reach the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => MAINNET_NETWORK,
            Network::Testnet => TESTNET_NETWORK,
        }
    }
}

/// Middleware configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub network: Network,
    /// Port of the ledger API surface
    pub port: u16,
    /// gmet JSON-RPC endpoint
    pub node_url: String,
    /// True when `GMET` points at an externally managed node
    pub remote_node: bool,
    /// Skip `admin_*` calls, which hosted nodes usually reject
    pub skip_admin_calls: bool,
    /// Admission gate capacity for block trace calls
    pub max_trace_concurrency: usize,
    /// Tracer passed to `debug_traceBlockByHash`
    pub tracer: String,
    pub trace_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    /// Call dotenvy::dotenv() before calling this.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let mode = match var("MODE").as_deref() {
            Some("ONLINE") => Mode::Online,
            Some("OFFLINE") => Mode::Offline,
            Some(other) => bail!("{} is not a valid mode", other),
            None => bail!("MODE must be populated"),
        };

        let network = match var("NETWORK").as_deref() {
            Some("MAINNET") => Network::Mainnet,
            Some("TESTNET") => Network::Testnet,
            Some(other) => bail!("{} is not a valid network", other),
            None => bail!("NETWORK must be populated"),
        };

        let port_value = var("PORT").ok_or_else(|| anyhow!("PORT must be populated"))?;
        let port: u16 = port_value
            .parse()
            .with_context(|| format!("unable to parse port {}", port_value))?;
        if port == 0 {
            bail!("unable to parse port {}", port_value);
        }

        let (node_url, remote_node) = match var("GMET") {
            Some(url) => (url, true),
            None => (DEFAULT_GMET_URL.to_string(), false),
        };

        let skip_admin_calls = match var("SKIP_GMET_ADMIN") {
            Some(value) => parse_bool(&value)
                .with_context(|| format!("unable to parse SKIP_GMET_ADMIN {}", value))?,
            None => false,
        };

        let max_trace_concurrency: usize = var("MAX_TRACE_CONCURRENCY")
            .unwrap_or_else(|| "16".to_string())
            .parse()
            .context("MAX_TRACE_CONCURRENCY must be a valid usize")?;
        if max_trace_concurrency == 0 {
            bail!("MAX_TRACE_CONCURRENCY must be greater than zero");
        }
        if max_trace_concurrency > Semaphore::MAX_PERMITS {
            bail!(
                "MAX_TRACE_CONCURRENCY must be at most {}",
                Semaphore::MAX_PERMITS
            );
        }

        let tracer = var("TRACER").unwrap_or_else(|| "callTracer".to_string());

        let trace_timeout_secs: u64 = var("TRACE_TIMEOUT_SECS")
            .unwrap_or_else(|| "120".to_string())
            .parse()
            .context("TRACE_TIMEOUT_SECS must be a valid u64")?;
        if trace_timeout_secs == 0 || trace_timeout_secs > MAX_TRACE_TIMEOUT_SECS {
            bail!(
                "TRACE_TIMEOUT_SECS must be between 1 and {}",
                MAX_TRACE_TIMEOUT_SECS
            );
        }

        Ok(Config {
            mode,
            network,
            port,
            node_url,
            remote_node,
            skip_admin_calls,
            max_trace_concurrency,
            tracer,
            trace_timeout: Duration::from_secs(trace_timeout_secs),
        })
    }

    pub fn network_identifier(&self) -> NetworkIdentifier {
        NetworkIdentifier {
            blockchain: BLOCKCHAIN.to_string(),
            network: self.network.name().to_string(),
        }
    }

    pub fn currency(&self) -> Currency {
        native_currency()
    }
}

pub fn native_currency() -> Currency {
    Currency {
        symbol: CURRENCY_SYMBOL.to_string(),
        decimals: CURRENCY_DECIMALS,
    }
}

/// Accepts `1`, `t`, `true` and their false counterparts in the usual casings.
fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        other => Err(anyhow!("{} is not a boolean", other)),
    }
}
