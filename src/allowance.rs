//! Approval Gate
//!
//! Ensures the Limit Order Protocol may pull the maker's tokens before the
//! order is signed. Native coins need no approval.

use ethereum_types::{Address, H256, U256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::abi::{decode_u256, encode_call, Token};
use crate::chains::ChainContractSet;
use crate::error::{SwapError, SwapPhase};
use crate::evm_client::ChainReader;
use crate::wallet::WalletProvider;

pub const ALLOWANCE_SIGNATURE: &str = "allowance(address,address)";
pub const APPROVE_SIGNATURE: &str = "approve(address,uint256)";

/// What `ensure_allowance` had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// Native coin, nothing to approve
    NativeAsset,
    /// Existing allowance already covers the amount
    AlreadySufficient,
    /// An exact-amount approval was mined
    Approved { tx_hash: H256 },
}

pub struct ApprovalGate {
    reader: Arc<dyn ChainReader>,
    wallet: Arc<dyn WalletProvider>,
    read_timeout: Duration,
    request_timeout: Duration,
    confirmation_timeout: Duration,
}

impl ApprovalGate {
    pub fn new(
        reader: Arc<dyn ChainReader>,
        wallet: Arc<dyn WalletProvider>,
        read_timeout: Duration,
        request_timeout: Duration,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            reader,
            wallet,
            read_timeout,
            request_timeout,
            confirmation_timeout,
        }
    }

    /// Reads `allowance(owner, spender)` on `token`.
    pub async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, SwapError> {
        let calldata = encode_call(
            ALLOWANCE_SIGNATURE,
            &[Token::Address(owner), Token::Address(spender)],
        );

        let data = tokio::time::timeout(self.read_timeout, self.reader.call(token, &calldata))
            .await
            .map_err(|_| SwapError::timeout(SwapPhase::ChainRead, self.read_timeout))?
            .map_err(|e| {
                SwapError::ApprovalFailed(format!("Failed to read allowance of {:?}: {:#}", token, e))
            })?;

        decode_u256(&data).map_err(|e| SwapError::ApprovalFailed(format!("{:#}", e)))
    }

    /// Makes sure `spender` may transfer at least `required` of `token` from `owner`.
    ///
    /// Approves exactly `required` when the current allowance is lower. Never
    /// retries: a rejected, reverted or unconfirmed approval fails the call.
    pub async fn ensure_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        required: U256,
        contracts: &ChainContractSet,
    ) -> Result<ApprovalOutcome, SwapError> {
        if token == contracts.native_token {
            debug!("Native asset, no approval needed");
            return Ok(ApprovalOutcome::NativeAsset);
        }

        let current = self.allowance(token, owner, spender).await?;
        if current >= required {
            debug!(
                "Allowance {} of {:?} for {:?} covers {}",
                current, token, spender, required
            );
            return Ok(ApprovalOutcome::AlreadySufficient);
        }

        info!(
            "Allowance {} of {:?} below required {}, approving {:?}",
            current, token, required, spender
        );

        let calldata = encode_call(
            APPROVE_SIGNATURE,
            &[Token::Address(spender), Token::Uint(required)],
        );
        let tx_hash = tokio::time::timeout(self.request_timeout, self.wallet.send_transaction(token, calldata))
            .await
            .map_err(|_| SwapError::timeout(SwapPhase::ApprovalRequest, self.request_timeout))?
            .map_err(|e| SwapError::ApprovalFailed(format!("Approval not sent: {:#}", e)))?;

        let receipt = tokio::time::timeout(
            self.confirmation_timeout,
            self.wallet.wait_for_confirmation(tx_hash),
        )
        .await
        .map_err(|_| SwapError::timeout(SwapPhase::ApprovalConfirmation, self.confirmation_timeout))?
        .map_err(|e| {
            SwapError::ApprovalFailed(format!("Approval {:?} not confirmed: {:#}", tx_hash, e))
        })?;

        if !receipt.is_success() {
            warn!("Approval transaction {:?} reverted", tx_hash);
            return Err(SwapError::ApprovalFailed(format!(
                "Approval transaction {:?} reverted",
                tx_hash
            )));
        }

        info!("Approval {:?} confirmed", tx_hash);
        Ok(ApprovalOutcome::Approved { tx_hash })
    }
}
