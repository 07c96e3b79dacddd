//! Metadium ledger API core
//!
//! Translates a gmet (proof-of-authority EVM) node into a ledger-interchange
//! view: canonical blocks whose transactions are flat lists of balance
//! changing operations, point-in-time account balances, network status and a
//! whitelisted pass-through for generic node calls.
//!
//! # Architecture
//!
//! ```text
//! Caller (exchange, custodian, auditor)
//!     |
//!     | status / block / balance / call / submit
//!     v
//! Client (this crate)
//!     |
//!     | JSON-RPC (single + batch), debug_traceBlockByHash, GraphQL
//!     v
//! gmet node
//! ```
//!
//! # Modules
//!
//! - `config` - Environment and configuration management
//! - `error` - Error taxonomy returned to callers
//! - `types` - Ledger API data model
//! - `node` - Node gateway traits and the reqwest implementation
//! - `client` - Status, balance, call dispatch, trace fetch, operation
//!   extraction, block assembly and transaction submission
//! - `cli` - Operator command line

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod node;
pub mod types;
