//! Configuration Management Module
//!
//! Loads the swap configuration from TOML: chain RPC endpoints and contract
//! sets, swap assets, per-phase timeouts and the settlement backend.
//! Private keys never live in the file; only the name of the environment
//! variable holding one does.

use anyhow::Context;
use ethereum_types::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::chains::{ChainContractSet, ChainRegistry, SupportedChain, NATIVE_TOKEN};
use crate::order::Asset;

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "FUSION_SWAP_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/swap.toml";
pub const TEMPLATE_CONFIG_PATH: &str = "config/swap.template.toml";

// ============================================================================
// CONFIGURATION STRUCTURES
// ============================================================================

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapConfig {
    /// Wallet and settlement endpoints
    pub service: ServiceConfig,
    /// Per-phase timeouts
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    /// Local signing key settings (used by `sign_order`)
    #[serde(default)]
    pub signer: SignerConfig,
    /// Chains with their contract sets (use [[chain]] in TOML)
    #[serde(rename = "chain", default)]
    pub chains: Vec<ChainConfig>,
    /// Swappable assets (use [[asset]] in TOML)
    #[serde(rename = "asset", default)]
    pub assets: Vec<AssetConfig>,
}

/// Service-level endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// JSON-RPC endpoint of the wallet (must expose eth_accounts and eth_signTypedData_v4)
    pub wallet_rpc_url: String,
    /// Resolver/settlement API base URL (e.g., "http://127.0.0.1:3333")
    pub settlement_url: String,
    /// Settlement status polling interval in milliseconds
    #[serde(default = "default_settlement_poll_ms")]
    pub settlement_poll_interval_ms: u64,
    /// Wallet session and receipt polling interval in milliseconds
    #[serde(default = "default_wallet_poll_ms")]
    pub wallet_poll_interval_ms: u64,
}

/// Timeouts in seconds, one per externally awaited phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub chain_read_secs: u64,
    pub signature_secs: u64,
    pub approval_confirmation_secs: u64,
    pub lock_secs: u64,
    pub completion_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        let defaults = SwapTimeouts::default();
        Self {
            chain_read_secs: defaults.chain_read.as_secs(),
            signature_secs: defaults.signature.as_secs(),
            approval_confirmation_secs: defaults.approval_confirmation.as_secs(),
            lock_secs: defaults.lock.as_secs(),
            completion_secs: defaults.completion.as_secs(),
        }
    }
}

impl TimeoutsConfig {
    pub fn to_timeouts(&self) -> SwapTimeouts {
        SwapTimeouts {
            chain_read: Duration::from_secs(self.chain_read_secs),
            signature: Duration::from_secs(self.signature_secs),
            approval_confirmation: Duration::from_secs(self.approval_confirmation_secs),
            lock: Duration::from_secs(self.lock_secs),
            completion: Duration::from_secs(self.completion_secs),
        }
    }
}

/// Per-phase timeouts applied by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapTimeouts {
    pub chain_read: Duration,
    pub signature: Duration,
    pub approval_confirmation: Duration,
    pub lock: Duration,
    pub completion: Duration,
}

impl Default for SwapTimeouts {
    fn default() -> Self {
        Self {
            chain_read: Duration::from_secs(30),
            signature: Duration::from_secs(120),
            approval_confirmation: Duration::from_secs(300),
            lock: Duration::from_secs(900),
            completion: Duration::from_secs(3600),
        }
    }
}

/// Local signing key configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    /// Environment variable name containing the hex private key
    pub private_key_env: String,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            private_key_env: "FUSION_SWAP_PRIVATE_KEY".to_string(),
        }
    }
}

/// One chain: RPC endpoint plus its contract set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Chain ID (must be one of the supported chains)
    pub chain_id: u64,
    /// RPC endpoint URL
    pub rpc_url: String,
    /// Limit Order Protocol contract (EIP-712 verifying contract)
    pub limit_order_protocol: Address,
    /// Native coin sentinel
    #[serde(default = "default_native_token")]
    pub native_token: Address,
    /// Escrow factory contract
    pub escrow_factory: Address,
    /// Proxy token used as taker asset
    pub proxy_asset: Address,
    #[serde(default)]
    pub fee_bank: Option<Address>,
    #[serde(default)]
    pub escrow_src: Option<Address>,
    #[serde(default)]
    pub escrow_dst: Option<Address>,
}

impl ChainConfig {
    pub fn contracts(&self) -> ChainContractSet {
        ChainContractSet {
            limit_order_protocol: self.limit_order_protocol,
            native_token: self.native_token,
            escrow_factory: self.escrow_factory,
            proxy_asset: self.proxy_asset,
            fee_bank: self.fee_bank,
            escrow_src: self.escrow_src,
            escrow_dst: self.escrow_dst,
        }
    }
}

/// A swappable asset on one of the configured chains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    pub chain_id: u64,
    pub symbol: String,
    pub address: Address,
    #[serde(default = "default_decimals")]
    pub decimals: u32,
}

impl AssetConfig {
    pub fn to_asset(&self) -> Asset {
        Asset {
            chain_id: self.chain_id,
            address: self.address,
            symbol: self.symbol.clone(),
            decimals: self.decimals,
        }
    }
}

fn default_settlement_poll_ms() -> u64 {
    2000
}

fn default_wallet_poll_ms() -> u64 {
    1000
}

fn default_native_token() -> Address {
    NATIVE_TOKEN
}

fn default_decimals() -> u32 {
    18
}

impl SwapConfig {
    /// Loads configuration from a TOML file.
    ///
    /// Path resolution: `path` argument, then `FUSION_SWAP_CONFIG_PATH`, then
    /// `config/swap.toml`. A missing file produces an error pointing at the
    /// template.
    pub fn load_from_path(path: Option<&str>) -> anyhow::Result<Self> {
        let config_path = path
            .map(|p| p.to_string())
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        if std::path::Path::new(&config_path).exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file '{}'", config_path))?;
            let config = Self::from_toml(&content)
                .with_context(|| format!("Invalid config file '{}'", config_path))?;
            Ok(config)
        } else {
            Err(anyhow::anyhow!(
                "Configuration file '{}' not found. Please copy the template:\n\
                cp {} {}\n\
                Then edit {} with your actual values.",
                config_path,
                TEMPLATE_CONFIG_PATH,
                DEFAULT_CONFIG_PATH,
                DEFAULT_CONFIG_PATH
            ))
        }
    }

    /// Loads configuration from the default location.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from_path(None)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: SwapConfig = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// Checks:
    /// - At least one chain is configured, every chain id is supported and unique
    /// - Contract addresses are non-zero
    /// - Timeouts are non-zero
    /// - Assets reference configured chains and have unique symbols per chain
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chains.is_empty() {
            return Err(anyhow::anyhow!(
                "Configuration error: At least one [[chain]] must be configured"
            ));
        }

        if self.service.settlement_url.trim().is_empty() {
            return Err(anyhow::anyhow!("Configuration error: service.settlement_url is empty"));
        }

        let mut seen = HashSet::new();
        for chain in &self.chains {
            let supported = SupportedChain::from_chain_id(chain.chain_id).map_err(|_| {
                anyhow::anyhow!(
                    "Configuration error: Chain ID {} is not a supported chain",
                    chain.chain_id
                )
            })?;
            if !seen.insert(chain.chain_id) {
                return Err(anyhow::anyhow!(
                    "Configuration error: Chain ID {} is configured more than once",
                    chain.chain_id
                ));
            }
            if chain.rpc_url.trim().is_empty() {
                return Err(anyhow::anyhow!(
                    "Configuration error: {} has an empty rpc_url",
                    supported
                ));
            }
            for (field, address) in [
                ("limit_order_protocol", chain.limit_order_protocol),
                ("escrow_factory", chain.escrow_factory),
                ("proxy_asset", chain.proxy_asset),
            ] {
                if address.is_zero() {
                    return Err(anyhow::anyhow!(
                        "Configuration error: {} has a zero {} address",
                        supported,
                        field
                    ));
                }
            }
        }

        let timeouts = &self.timeouts;
        for (field, secs) in [
            ("chain_read_secs", timeouts.chain_read_secs),
            ("signature_secs", timeouts.signature_secs),
            ("approval_confirmation_secs", timeouts.approval_confirmation_secs),
            ("lock_secs", timeouts.lock_secs),
            ("completion_secs", timeouts.completion_secs),
        ] {
            if secs == 0 {
                return Err(anyhow::anyhow!(
                    "Configuration error: timeouts.{} must be greater than zero",
                    field
                ));
            }
        }

        let mut symbols = HashSet::new();
        for asset in &self.assets {
            if !seen.contains(&asset.chain_id) {
                return Err(anyhow::anyhow!(
                    "Configuration error: Asset {} references unconfigured chain {}",
                    asset.symbol,
                    asset.chain_id
                ));
            }
            if !symbols.insert((asset.chain_id, asset.symbol.to_uppercase())) {
                return Err(anyhow::anyhow!(
                    "Configuration error: Asset {} is configured twice on chain {}",
                    asset.symbol,
                    asset.chain_id
                ));
            }
        }

        Ok(())
    }

    /// Builds the contract registry from the configured chains.
    pub fn registry(&self) -> anyhow::Result<ChainRegistry> {
        self.chains.iter().try_fold(ChainRegistry::new(), |registry, chain| {
            let supported = SupportedChain::from_chain_id(chain.chain_id)?;
            Ok(registry.with_chain(supported, chain.contracts()))
        })
    }

    /// Chain configuration by chain ID.
    pub fn chain(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }

    /// Asset by chain and symbol (case-insensitive).
    pub fn asset(&self, chain_id: u64, symbol: &str) -> Option<Asset> {
        self.assets
            .iter()
            .find(|a| a.chain_id == chain_id && a.symbol.eq_ignore_ascii_case(symbol))
            .map(AssetConfig::to_asset)
    }
}
