// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Token Sale Node
//!
//! Entry point for the `tokensale-node` binary. Parses CLI arguments,
//! initializes logging and metrics, deploys the sale, drives its block
//! counter, and serves the HTTP/WS API.
//!
//! The binary supports three subcommands:
//!
//! - `run`    : deploy the sale and serve it
//! - `status` : query a running node's status endpoint
//! - `version`: print build version information

mod api;
mod auth;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;

use tokensale_contracts::{Clock, ManualClock, SaleConfig, SaleHost, TokenSale, ValueBank};

use cli::{Commands, TokenSaleCli};
use metrics::SaleMetrics;

/// Broadcast channel capacity for live event streaming.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = TokenSaleCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Deploys the sale and serves it until a shutdown signal arrives.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "tokensale_node=info,tokensale_contracts=info,tower_http=debug",
        args.log_format,
    );

    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        block_time_ms = args.block_time_ms,
        "starting tokensale-node"
    );

    anyhow::ensure!(
        !args.admin_token.trim().is_empty(),
        "admin token must not be empty"
    );

    // --- Sale deployment ---
    let clock = ManualClock::new(0);
    let start = clock
        .now()
        .checked_add(args.start_offset)
        .context("start offset overflows the block counter")?;
    let end = start
        .checked_add(args.duration)
        .context("sale duration overflows the block counter")?;

    let config = SaleConfig::new(args.fund_recipient, args.reserve_recipient, start, end)
        .with_exchange_rate(args.exchange_rate)
        .with_cap(args.cap);
    let sale = TokenSale::new(args.admin, config, clock.clone(), ValueBank::new())
        .context("failed to deploy token sale")?;
    tracing::info!(
        sale = %sale.address(),
        ledger = %sale.ledger_address(),
        start,
        end,
        "sale deployed"
    );

    // --- Metrics ---
    let sale_metrics = Arc::new(SaleMetrics::new().context("failed to register metrics")?);

    // --- Event broadcast ---
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    // --- Application state ---
    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        sale: SaleHost::new(sale),
        admin: args.admin,
        auth: auth::ApiAuth::new(args.admin_token.trim()),
        clock,
        event_tx,
        metrics: Arc::clone(&sale_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state.clone());
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("RPC/API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&sale_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Block counter ---
    let tick_state = app_state.clone();
    let block_time = std::time::Duration::from_millis(args.block_time_ms.max(1));
    let block_loop = tokio::spawn(async move {
        let mut interval = tokio::time::interval(block_time);
        // The first tick completes immediately; skip it so the counter
        // starts advancing one block time after deployment.
        interval.tick().await;
        loop {
            interval.tick().await;
            let counter = api::tick(&tick_state);
            if counter == start {
                tracing::info!(counter, "sale window opened");
            } else if counter == end.saturating_add(1) {
                tracing::info!(counter, "sale window closed");
            }
        }
    });

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    block_loop.abort();
    tracing::info!(
        counter = api::current_counter(&app_state),
        tokens_sold = %app_state.sale.tokens_sold(),
        "tokensale-node stopped"
    );
    Ok(())
}

/// Queries a running node's status endpoint and prints the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let url = format!("{}/status", args.rpc_url.trim_end_matches('/'));
    let body = http_get(&url).await?;
    println!("{}", body);
    Ok(())
}

/// Minimal HTTP/1.1 GET over a raw TCP stream, enough for `status`.
async fn http_get(url: &str) -> Result<String> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let parsed: url::Url = url
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid URL: {}", e))?;

    let addr = format!("{}:{}", parsed.host, parsed.port.unwrap_or(80));
    let mut stream = tokio::net::TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;

    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        parsed.path, parsed.host,
    );
    stream.write_all(request.as_bytes()).await?;
    stream.shutdown().await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf);

    // Everything after the first blank line is the body.
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_else(|| response.to_string());

    Ok(body)
}

/// Prints version information to stdout.
fn print_version() {
    println!("tokensale-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc          {}", option_env!("RUSTC_VERSION").unwrap_or("unknown"));
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Host/port/path split of an `http://` URL.
mod url {
    #[derive(Debug, PartialEq, Eq)]
    pub struct Url {
        pub host: String,
        pub port: Option<u16>,
        pub path: String,
    }

    impl std::str::FromStr for Url {
        type Err = String;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            let rest = s
                .strip_prefix("http://")
                .or_else(|| s.strip_prefix("https://"))
                .unwrap_or(s);

            let (authority, path) = match rest.find('/') {
                Some(i) => (&rest[..i], &rest[i..]),
                None => (rest, "/"),
            };
            if authority.is_empty() {
                return Err("missing host".to_string());
            }

            let (host, port) = match authority.rfind(':') {
                Some(i) => {
                    let p = authority[i + 1..]
                        .parse::<u16>()
                        .map_err(|e| format!("bad port: {}", e))?;
                    (authority[..i].to_string(), Some(p))
                }
                None => (authority.to_string(), None),
            };

            Ok(Url {
                host,
                port,
                path: path.to_string(),
            })
        }
    }

}
