//! Supported Chains and Contract Registry
//!
//! The set of chains the swap core can operate on is closed: every chain id is
//! resolved to a [`SupportedChain`] first, so "unsupported chain" is a single
//! match arm instead of a map miss scattered through the code.

use ethereum_types::{Address, H160};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::SwapError;

/// Sentinel address representing a chain's native coin (ETH, MON).
pub const NATIVE_TOKEN: Address = H160([0xee; 20]);

/// Chains the swap core knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportedChain {
    /// Ethereum Sepolia testnet
    Sepolia,
    /// Monad testnet
    MonadTestnet,
}

impl SupportedChain {
    pub const ALL: [SupportedChain; 2] = [SupportedChain::Sepolia, SupportedChain::MonadTestnet];

    pub fn chain_id(self) -> u64 {
        match self {
            SupportedChain::Sepolia => 11_155_111,
            SupportedChain::MonadTestnet => 10_143,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SupportedChain::Sepolia => "Sepolia",
            SupportedChain::MonadTestnet => "Monad Testnet",
        }
    }

    /// Resolves a numeric chain id.
    pub fn from_chain_id(chain_id: u64) -> Result<Self, SwapError> {
        Self::ALL
            .into_iter()
            .find(|chain| chain.chain_id() == chain_id)
            .ok_or(SwapError::UnsupportedChain(chain_id))
    }
}

impl std::fmt::Display for SupportedChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.chain_id())
    }
}

/// Static per-chain contract configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainContractSet {
    /// Limit Order Protocol (EIP-712 verifying contract and approval spender)
    pub limit_order_protocol: Address,
    /// Sentinel standing for the native coin
    pub native_token: Address,
    /// Escrow factory exposing `addressOfEscrowSrc(bytes32)`
    pub escrow_factory: Address,
    /// Proxy/marker token used as the order's taker asset on this chain
    pub proxy_asset: Address,
    /// Fee bank of the deployment (not called by the core)
    pub fee_bank: Option<Address>,
    /// Source escrow implementation (not called by the core)
    pub escrow_src: Option<Address>,
    /// Destination escrow implementation (not called by the core)
    pub escrow_dst: Option<Address>,
}

/// Read-only registry of contract sets, shared across swap sessions.
#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
    contracts: HashMap<SupportedChain, ChainContractSet>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the contract set of a chain.
    pub fn with_chain(mut self, chain: SupportedChain, contracts: ChainContractSet) -> Self {
        self.contracts.insert(chain, contracts);
        self
    }

    /// Contract set for a supported chain.
    pub fn get(&self, chain: SupportedChain) -> Result<&ChainContractSet, SwapError> {
        self.contracts
            .get(&chain)
            .ok_or(SwapError::UnsupportedChain(chain.chain_id()))
    }

    /// Contract set for a numeric chain id.
    pub fn for_chain_id(&self, chain_id: u64) -> Result<&ChainContractSet, SwapError> {
        self.get(SupportedChain::from_chain_id(chain_id)?)
    }

    /// Chains with a registered contract set.
    pub fn chains(&self) -> impl Iterator<Item = SupportedChain> + '_ {
        self.contracts.keys().copied()
    }
}
