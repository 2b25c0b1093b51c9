//! Order Signature Generation Utility
//!
//! Builds a limit order, signs its EIP-712 digest with a local secp256k1 key
//! and prints the order, its hash and the compact `{r, vs}` signature as JSON.
//! The private key is read from an environment variable, never from the
//! command line.
//!
//! ## Usage
//!
//! ```bash
//! FUSION_SWAP_PRIVATE_KEY=0x... cargo run --bin sign_order -- \
//!   --chain-id 11155111 \
//!   --amount 1.0
//! ```
//!
//! Contract addresses default to the chain's entry in the configuration file.

use anyhow::{Context, Result};
use clap::Parser;
use ethereum_types::Address;
use fusion_swap::{config::SwapConfig, order, typed_data, LocalSigner, NATIVE_TOKEN};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sign_order")]
#[command(about = "Build and sign a Limit Order Protocol order with a local key")]
struct Args {
    /// Path to configuration file (default: config/swap.toml or FUSION_SWAP_CONFIG_PATH env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Chain ID the order is signed for
    #[arg(long)]
    chain_id: u64,

    /// Making amount in whole units
    #[arg(long)]
    amount: String,

    /// Taking amount in whole units (defaults to the making amount)
    #[arg(long)]
    taking_amount: Option<String>,

    /// Maker asset (defaults to the native coin sentinel)
    #[arg(long, value_parser = parse_address)]
    maker_asset: Option<Address>,

    /// Taker asset (defaults to the chain's configured proxy asset)
    #[arg(long, value_parser = parse_address)]
    taker_asset: Option<Address>,

    /// Verifying contract (defaults to the chain's configured Limit Order Protocol)
    #[arg(long, value_parser = parse_address)]
    verifying_contract: Option<Address>,

    /// Environment variable holding the hex private key
    #[arg(long)]
    private_key_env: Option<String>,
}

fn parse_address(value: &str) -> Result<Address, String> {
    value
        .parse::<Address>()
        .map_err(|e| format!("invalid address '{}': {:?}", value, e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    // Only touch the config file when something has to come from it.
    let needs_config = args.verifying_contract.is_none() || args.taker_asset.is_none() || args.private_key_env.is_none();
    let config = if needs_config {
        Some(SwapConfig::load_from_path(args.config.as_deref())?)
    } else {
        None
    };
    let chain = config.as_ref().and_then(|c| c.chain(args.chain_id));

    let verifying_contract = args
        .verifying_contract
        .or_else(|| chain.map(|c| c.limit_order_protocol))
        .with_context(|| format!("No verifying contract given or configured for chain {}", args.chain_id))?;
    let taker_asset = args
        .taker_asset
        .or_else(|| chain.map(|c| c.proxy_asset))
        .with_context(|| format!("No taker asset given or configured for chain {}", args.chain_id))?;
    let maker_asset = args.maker_asset.unwrap_or(NATIVE_TOKEN);
    let key_env = args
        .private_key_env
        .clone()
        .or_else(|| config.as_ref().map(|c| c.signer.private_key_env.clone()))
        .unwrap_or_else(|| "FUSION_SWAP_PRIVATE_KEY".to_string());

    let signer = LocalSigner::from_env(&key_env)?;
    info!("Signing as {:?}", signer.address());

    let taking_amount = args.taking_amount.as_deref().unwrap_or(&args.amount);
    let order = order::build(
        signer.address(),
        maker_asset,
        taker_asset,
        &args.amount,
        taking_amount,
        args.chain_id,
        verifying_contract,
    )?;

    let order_hash = typed_data::hash(&order, args.chain_id, verifying_contract);
    let signature = typed_data::sign(&order, &signer, args.chain_id, verifying_contract).await?;

    let recovered = typed_data::recover_signer(order_hash, &signature)?;
    if recovered != signer.address() {
        anyhow::bail!("Recovered signer {:?} does not match {:?}", recovered, signer.address());
    }

    let output = json!({
        "order": order,
        "orderHash": format!("{:?}", order_hash),
        "r": format!("{:?}", signature.r),
        "vs": format!("{:?}", signature.vs),
        "signer": format!("{:?}", signer.address()),
        "chainId": args.chain_id,
        "verifyingContract": format!("{:?}", verifying_contract),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
