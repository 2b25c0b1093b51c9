//! Cross-chain limit-order swap core
//!
//! Builds and signs Limit Order Protocol orders (EIP-712), makes sure token
//! allowances are in place, predicts the source escrow and drives the swap
//! through settlement.

pub mod abi;
pub mod allowance;
pub mod chains;
pub mod config;
pub mod error;
pub mod escrow;
pub mod evm_client;
pub mod orchestrator;
pub mod order;
pub mod settlement;
pub mod typed_data;
pub mod wallet;

// Re-export public types for convenience
pub use allowance::{ApprovalGate, ApprovalOutcome};
pub use chains::{ChainContractSet, ChainRegistry, SupportedChain, NATIVE_TOKEN};
pub use config::{SwapConfig, SwapTimeouts};
pub use error::{SwapError, SwapPhase};
pub use escrow::EscrowPredictor;
pub use evm_client::{ChainReader, EvmClient, RpcError, TransactionReceipt};
pub use orchestrator::{SwapHandle, SwapOrchestrator, SwapState, SwapStatusReport};
pub use order::{parse_units, Asset, Order, SignedOrder};
pub use settlement::{HttpSettlementBackend, SettlementBackend, SettlementEvent};
pub use typed_data::{recover_signer, Eip712Domain, OrderSignature, TypedData};
pub use wallet::{JsonRpcWallet, LocalSigner, OrderSigner, WalletEvent, WalletProvider};
