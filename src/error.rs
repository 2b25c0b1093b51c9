//! Swap Error Taxonomy
//!
//! Every failure the swap core can report. Each variant is attached to the
//! swap session when it moves to `Error`; none of them is retried internally.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Phase of the swap that an external call belongs to (used for timeouts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapPhase {
    /// Reading contract state through the chain client
    ChainRead,
    /// Waiting for the wallet to send the approval transaction
    ApprovalRequest,
    /// Waiting for the approval transaction to be mined
    ApprovalConfirmation,
    /// Waiting for the user to sign the order
    Signature,
    /// Waiting for the resolver to submit and confirm the escrow lock
    Lock,
    /// Waiting for the destination-side release
    Completion,
}

impl std::fmt::Display for SwapPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SwapPhase::ChainRead => "chain read",
            SwapPhase::ApprovalRequest => "approval request",
            SwapPhase::ApprovalConfirmation => "approval confirmation",
            SwapPhase::Signature => "signature",
            SwapPhase::Lock => "escrow lock",
            SwapPhase::Completion => "cross-chain completion",
        };
        f.write_str(name)
    }
}

/// Errors produced by the swap core.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SwapError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("No signing capability available: {0}")]
    SignerUnavailable(String),

    #[error("Signature request rejected: {0}")]
    SigningRejected(String),

    #[error("Token approval failed: {0}")]
    ApprovalFailed(String),

    #[error("Unsupported chain: {0}")]
    UnsupportedChain(u64),

    #[error("Escrow address prediction unavailable: {0}")]
    PredictionUnavailable(String),

    #[error("A swap is already in progress")]
    SwapAlreadyInProgress,

    #[error("Swap cannot be cancelled after the escrow lock was submitted")]
    CannotCancelAfterLock,

    #[error("Timed out after {after:?} during {phase}")]
    Timeout {
        phase: SwapPhase,
        #[serde(with = "duration_secs")]
        after: Duration,
    },

    #[error("Settlement failed: {0}")]
    SettlementFailed(String),

    #[error("Wallet not connected")]
    WalletNotConnected,

    #[error("Wallet is on chain {actual}, source asset lives on chain {expected}")]
    ChainMismatch { expected: u64, actual: u64 },

    #[error("Wallet session changed during swap: {0}")]
    WalletChanged(String),

    #[error("Swap session not found")]
    SessionNotFound,
}

impl SwapError {
    /// Builds a timeout error for the given phase.
    pub fn timeout(phase: SwapPhase, after: Duration) -> Self {
        SwapError::Timeout { phase, after }
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }
}
