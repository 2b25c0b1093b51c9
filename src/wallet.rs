//! Wallet Session
//!
//! The orchestrator never reaches for a global wallet. It receives an explicit
//! [`WalletProvider`] session at construction time, and account/chain changes
//! arrive as a [`WalletEvent`] broadcast stream.
//!
//! Two implementations are provided:
//! - [`JsonRpcWallet`]: a node or wallet endpoint that exposes `eth_accounts`,
//!   `eth_signTypedData_v4` and `eth_sendTransaction` (e.g. an unlocked dev node)
//! - [`LocalSigner`]: an in-process secp256k1 key that can only sign orders

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethereum_types::{Address, H256};
use k256::ecdsa::SigningKey;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::abi::decode_hex;
use crate::error::SwapError;
use crate::evm_client::{EvmClient, RpcError, TransactionReceipt};
use crate::typed_data::{ethereum_address, TypedData};

/// EIP-1193 "user rejected request".
pub const USER_REJECTED_CODE: i64 = 4001;

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Change in the wallet session observed after the orchestrator was built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    /// Active account changed (None when all accounts were disconnected)
    AccountsChanged(Option<Address>),
    /// Active chain changed
    ChainChanged(u64),
    /// Session ended
    Disconnected,
}

impl std::fmt::Display for WalletEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalletEvent::AccountsChanged(Some(account)) => write!(f, "account changed to {:?}", account),
            WalletEvent::AccountsChanged(None) => write!(f, "accounts disconnected"),
            WalletEvent::ChainChanged(chain_id) => write!(f, "chain changed to {}", chain_id),
            WalletEvent::Disconnected => write!(f, "wallet disconnected"),
        }
    }
}

/// Something that can produce a 65-byte `r || s || v` signature over typed data.
#[async_trait]
pub trait OrderSigner: Send + Sync {
    async fn sign_typed_data(&self, typed_data: &TypedData) -> Result<Vec<u8>, SwapError>;
}

/// A connected wallet session.
#[async_trait]
pub trait WalletProvider: OrderSigner {
    /// Active account, None when disconnected.
    async fn address(&self) -> Option<Address>;

    /// Chain the wallet is currently connected to.
    async fn chain_id(&self) -> Result<u64>;

    /// Sends a transaction from the active account and returns its hash.
    async fn send_transaction(&self, to: Address, data: Vec<u8>) -> Result<H256>;

    /// Waits until the transaction is mined. Callers bound this with a timeout.
    async fn wait_for_confirmation(&self, tx_hash: H256) -> Result<TransactionReceipt>;

    /// Subscribes to session changes. Dropping the receiver unsubscribes.
    fn events(&self) -> broadcast::Receiver<WalletEvent>;
}

fn rpc_code(error: &anyhow::Error) -> Option<i64> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<RpcError>())
        .map(|rpc| rpc.code)
}

// ============================================================================
// JSON-RPC WALLET
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SessionSnapshot {
    account: Option<Address>,
    chain_id: u64,
}

/// Wallet backed by a JSON-RPC endpoint that manages the account keys.
pub struct JsonRpcWallet {
    client: EvmClient,
    session: RwLock<SessionSnapshot>,
    events: broadcast::Sender<WalletEvent>,
    poll_interval: Duration,
}

impl JsonRpcWallet {
    /// Connects to the endpoint and records the current account and chain.
    pub async fn connect(url: &str, poll_interval: Duration) -> Result<Self> {
        let client = EvmClient::new(url)?;
        let snapshot = Self::fetch_session(&client).await?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        info!(
            "Wallet session at {}: account {:?}, chain {}",
            url, snapshot.account, snapshot.chain_id
        );

        Ok(Self {
            client,
            session: RwLock::new(snapshot),
            events,
            poll_interval,
        })
    }

    async fn fetch_session(client: &EvmClient) -> Result<SessionSnapshot> {
        let accounts: Vec<Address> = client
            .request("eth_accounts", vec![])
            .await
            .context("Failed to list wallet accounts")?
            .unwrap_or_default();
        let chain_id = client.chain_id().await.context("Failed to read wallet chain id")?;

        Ok(SessionSnapshot {
            account: accounts.first().copied(),
            chain_id,
        })
    }

    /// Re-reads the session and broadcasts any change.
    pub async fn refresh(&self) -> Result<()> {
        let latest = match Self::fetch_session(&self.client).await {
            Ok(latest) => latest,
            Err(e) => {
                let mut session = self.session.write().await;
                if session.account.is_some() {
                    warn!("Wallet endpoint unreachable, treating session as disconnected: {:#}", e);
                    session.account = None;
                    let _ = self.events.send(WalletEvent::Disconnected);
                }
                return Err(e);
            }
        };

        let mut session = self.session.write().await;
        if latest.account != session.account {
            debug!("Wallet account {:?} -> {:?}", session.account, latest.account);
            let _ = self.events.send(WalletEvent::AccountsChanged(latest.account));
        }
        if latest.chain_id != session.chain_id {
            debug!("Wallet chain {} -> {}", session.chain_id, latest.chain_id);
            let _ = self.events.send(WalletEvent::ChainChanged(latest.chain_id));
        }
        *session = latest;
        Ok(())
    }

    /// Polls the endpoint for session changes until the handle is aborted.
    pub fn watch(self: &Arc<Self>) -> JoinHandle<()> {
        let wallet = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(wallet.poll_interval);
            loop {
                ticker.tick().await;
                if let Err(e) = wallet.refresh().await {
                    debug!("Wallet session refresh failed: {:#}", e);
                }
            }
        })
    }

    async fn active_account(&self) -> Result<Address, SwapError> {
        self.session
            .read()
            .await
            .account
            .ok_or(SwapError::WalletNotConnected)
    }
}

#[async_trait]
impl OrderSigner for JsonRpcWallet {
    async fn sign_typed_data(&self, typed_data: &TypedData) -> Result<Vec<u8>, SwapError> {
        let account = self.active_account().await?;
        let payload = typed_data.to_json().to_string();

        let result: Option<String> = self
            .client
            .request(
                "eth_signTypedData_v4",
                vec![json!(format!("{:?}", account)), json!(payload)],
            )
            .await
            .map_err(|e| match rpc_code(&e) {
                Some(USER_REJECTED_CODE) => SwapError::SigningRejected(format!("{:#}", e)),
                _ => SwapError::SignerUnavailable(format!("{:#}", e)),
            })?;

        let signature = result.ok_or_else(|| {
            SwapError::SignerUnavailable("eth_signTypedData_v4 returned no signature".to_string())
        })?;
        decode_hex(&signature).map_err(|e| SwapError::SigningRejected(format!("{:#}", e)))
    }
}

#[async_trait]
impl WalletProvider for JsonRpcWallet {
    async fn address(&self) -> Option<Address> {
        self.session.read().await.account
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(self.session.read().await.chain_id)
    }

    async fn send_transaction(&self, to: Address, data: Vec<u8>) -> Result<H256> {
        let from = self
            .session
            .read()
            .await
            .account
            .ok_or_else(|| anyhow::anyhow!("No active wallet account"))?;

        let tx = json!({
            "from": format!("{:?}", from),
            "to": format!("{:?}", to),
            "data": format!("0x{}", hex::encode(&data)),
        });

        let hash: Option<H256> = self.client.request("eth_sendTransaction", vec![tx]).await?;
        let hash = hash.ok_or_else(|| anyhow::anyhow!("eth_sendTransaction returned no hash"))?;
        info!("Submitted transaction {:?} to {:?}", hash, to);
        Ok(hash)
    }

    async fn wait_for_confirmation(&self, tx_hash: H256) -> Result<TransactionReceipt> {
        loop {
            if let Some(receipt) = self.client.get_transaction_receipt(tx_hash).await? {
                debug!("Transaction {:?} mined in block {:?}", tx_hash, receipt.block_number);
                return Ok(receipt);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn events(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}

// ============================================================================
// LOCAL SIGNER
// ============================================================================

/// In-process secp256k1 key that signs order digests directly.
///
/// The private key is never logged.
pub struct LocalSigner {
    signing_key: SigningKey,
    address: Address,
}

impl LocalSigner {
    /// Parses a 32-byte hex private key (with or without `0x`).
    pub fn from_hex(private_key: &str) -> Result<Self> {
        let bytes = decode_hex(private_key.trim()).context("Private key is not valid hex")?;
        if bytes.len() != 32 {
            anyhow::bail!("Private key must be 32 bytes, got {}", bytes.len());
        }
        let signing_key =
            SigningKey::from_slice(&bytes).map_err(|e| anyhow::anyhow!("Invalid private key: {}", e))?;
        let address = ethereum_address(signing_key.verifying_key())?;
        Ok(Self { signing_key, address })
    }

    /// Loads the private key from an environment variable.
    pub fn from_env(var_name: &str) -> Result<Self> {
        let value = std::env::var(var_name)
            .with_context(|| format!("Environment variable {} is not set", var_name))?;
        Self::from_hex(&value)
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

#[async_trait]
impl OrderSigner for LocalSigner {
    async fn sign_typed_data(&self, typed_data: &TypedData) -> Result<Vec<u8>, SwapError> {
        let digest = typed_data.digest();
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(digest.as_bytes())
            .map_err(|e| SwapError::SignerUnavailable(format!("Failed to sign digest: {}", e)))?;

        let mut bytes = Vec::with_capacity(65);
        bytes.extend_from_slice(&signature.to_bytes());
        bytes.push(27 + recovery_id.to_byte());
        Ok(bytes)
    }
}
