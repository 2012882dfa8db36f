//! # CLI Interface
//!
//! Defines the command-line argument structure for `tokensale-node` using
//! `clap` derive. Supports three subcommands: `run`, `status`, and
//! `version`. Every `run` flag can also be supplied through a
//! `TOKENSALE_*` environment variable.

use clap::{Parser, Subcommand};
use tokensale_contracts::config::{DEFAULT_BLOCK_TIME_MS, EXCHANGE_RATE, TOKEN_SALE_CAP};
use tokensale_contracts::Address;

use crate::logging::LogFormat;

/// Devnet host for a fixed-window token sale.
///
/// Deploys one sale at startup, advances its block counter on a fixed
/// interval, and serves purchases and finalization over HTTP.
#[derive(Parser, Debug)]
#[command(
    name = "tokensale-node",
    about = "Devnet host for a fixed-window token sale",
    version,
    propagate_version = true
)]
pub struct TokenSaleCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy the sale and start serving it.
    Run(RunArgs),
    /// Query the status of a running node via its HTTP endpoint.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Account that receives every forwarded contribution.
    #[arg(long, env = "TOKENSALE_FUND_RECIPIENT")]
    pub fund_recipient: Address,

    /// Account that receives the reserve mirror of every purchase.
    #[arg(long, env = "TOKENSALE_RESERVE_RECIPIENT")]
    pub reserve_recipient: Address,

    /// Administrative account allowed to finalize the sale.
    #[arg(long, env = "TOKENSALE_ADMIN")]
    pub admin: Address,

    /// Bearer token required by `/deposit` and `/finalize`. Account keys
    /// for `/purchase` and `/transfer` are derived from it.
    #[arg(long, env = "TOKENSALE_ADMIN_TOKEN", hide_env_values = true)]
    pub admin_token: String,

    /// Blocks between deployment and the first block of the sale window.
    #[arg(long, env = "TOKENSALE_START_OFFSET", default_value_t = 10)]
    pub start_offset: u64,

    /// Length of the sale window in blocks.
    #[arg(long, env = "TOKENSALE_DURATION", default_value_t = 100)]
    pub duration: u64,

    /// Token base units credited per value base unit.
    #[arg(long, env = "TOKENSALE_EXCHANGE_RATE", default_value_t = EXCHANGE_RATE)]
    pub exchange_rate: u128,

    /// Cap on cumulative buyer-side issuance, in token base units.
    #[arg(long, env = "TOKENSALE_CAP", default_value_t = TOKEN_SALE_CAP)]
    pub cap: u128,

    /// Milliseconds between block counter ticks.
    #[arg(long, env = "TOKENSALE_BLOCK_TIME_MS", default_value_t = DEFAULT_BLOCK_TIME_MS)]
    pub block_time_ms: u64,

    /// Port for the HTTP API.
    #[arg(long, env = "TOKENSALE_RPC_PORT", default_value_t = 9751)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "TOKENSALE_METRICS_PORT", default_value_t = 9752)]
    pub metrics_port: u16,

    /// Log output format.
    #[arg(long, env = "TOKENSALE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// HTTP endpoint of the running node.
    #[arg(long, default_value = "http://127.0.0.1:9751")]
    pub rpc_url: String,
}
