//! Swap Runner
//!
//! Runs one cross-chain swap end-to-end against the configured wallet,
//! chains and settlement backend, printing every status change.
//! Ctrl-C cancels the swap while it is still cancellable.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin fusion-swap -- \
//!   --from-chain 11155111 --from-asset ETH \
//!   --to-chain 10143 --to-asset MON \
//!   --amount 0.01
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use fusion_swap::{
    config::SwapConfig, ChainReader, EvmClient, HttpSettlementBackend, JsonRpcWallet,
    SupportedChain, SwapOrchestrator, SwapState,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fusion-swap")]
#[command(about = "Swap a native asset for its counterpart on another chain via a signed limit order")]
struct Args {
    /// Path to configuration file (default: config/swap.toml or FUSION_SWAP_CONFIG_PATH env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Source chain ID
    #[arg(long)]
    from_chain: u64,

    /// Source asset symbol (as configured in [[asset]])
    #[arg(long)]
    from_asset: String,

    /// Destination chain ID
    #[arg(long)]
    to_chain: u64,

    /// Destination asset symbol
    #[arg(long)]
    to_asset: String,

    /// Amount in whole units, e.g. "0.5"
    #[arg(long)]
    amount: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = SwapConfig::load_from_path(args.config.as_deref())?;
    info!("Configuration loaded successfully");
    info!("Settlement URL: {}", config.service.settlement_url);

    let from = config
        .asset(args.from_chain, &args.from_asset)
        .with_context(|| format!("Asset {} not configured on chain {}", args.from_asset, args.from_chain))?;
    let to = config
        .asset(args.to_chain, &args.to_asset)
        .with_context(|| format!("Asset {} not configured on chain {}", args.to_asset, args.to_chain))?;

    let wallet_poll = Duration::from_millis(config.service.wallet_poll_interval_ms);
    let wallet = Arc::new(
        JsonRpcWallet::connect(&config.service.wallet_rpc_url, wallet_poll)
            .await
            .context("Failed to connect wallet")?,
    );
    let watcher = wallet.watch();

    let mut readers: HashMap<SupportedChain, Arc<dyn ChainReader>> = HashMap::new();
    for chain in &config.chains {
        let supported = SupportedChain::from_chain_id(chain.chain_id)?;
        let client = EvmClient::new(&chain.rpc_url)?;
        info!("{} RPC: {}", supported, client.base_url());
        readers.insert(supported, Arc::new(client));
    }

    let settlement = HttpSettlementBackend::new(
        config.service.settlement_url.clone(),
        Duration::from_millis(config.service.settlement_poll_interval_ms),
    )?;

    let orchestrator = SwapOrchestrator::new(
        wallet,
        Arc::new(settlement),
        Arc::new(config.registry()?),
        readers,
        config.timeouts.to_timeouts(),
    );

    let handle = orchestrator.initiate_swap(&from, &to, &args.amount).await?;
    let mut status = orchestrator.subscribe(&handle).await?;
    info!("Swap {} initiated", handle);

    let outcome = loop {
        let report = status.borrow_and_update().clone();
        println!("[{}] {}: {}", report.updated_at.to_rfc3339(), report.state, report.message);
        if report.state.is_terminal() {
            break report;
        }

        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    anyhow::bail!("Swap {} was dropped", handle);
                }
            }
            _ = signal::ctrl_c() => {
                match orchestrator.cancel(&handle).await {
                    Ok(()) => {
                        warn!("Swap {} cancelled", handle);
                        watcher.abort();
                        return Ok(());
                    }
                    Err(e) => warn!("Cannot cancel swap {}: {}", handle, e),
                }
            }
        }
    };

    watcher.abort();

    if outcome.state == SwapState::Completed {
        info!("Swap {} completed (order {:?})", handle, outcome.order_hash);
        Ok(())
    } else {
        let err = outcome
            .error
            .map(|e| e.to_string())
            .unwrap_or_else(|| outcome.message.clone());
        error!("Swap {} failed: {}", handle, err);
        Err(anyhow::anyhow!("Swap failed: {}", err))
    }
}
