//! Shared test helpers for fusion-swap tests
//!
//! Constants, contract fixtures and in-memory implementations of the wallet,
//! chain reader and settlement seams.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use ethereum_types::{Address, H256, U256, U64};
use fusion_swap::abi::{address_word, selector, u256_word};
use fusion_swap::chains::{ChainContractSet, ChainRegistry, SupportedChain, NATIVE_TOKEN};
use fusion_swap::config::SwapTimeouts;
use fusion_swap::evm_client::{ChainReader, TransactionReceipt};
use fusion_swap::order::{Asset, Order, SignedOrder};
use fusion_swap::settlement::{SettlementBackend, SettlementEvent};
use fusion_swap::typed_data::TypedData;
use fusion_swap::wallet::{LocalSigner, OrderSigner, WalletEvent, WalletProvider};
use fusion_swap::SwapError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

// ============================================================================
// CONSTANTS
// ============================================================================

// -------------------------------- CHAINS --------------------------------

pub const SEPOLIA_CHAIN_ID: u64 = 11_155_111;
pub const MONAD_CHAIN_ID: u64 = 10_143;

// -------------------------------- KEYS ----------------------------------

/// Well-known development key (first account of anvil/hardhat)
pub const DUMMY_PRIVATE_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Address of DUMMY_PRIVATE_KEY
pub const DUMMY_SIGNER_ADDR: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

/// Second anvil/hardhat development key
pub const OTHER_PRIVATE_KEY: &str =
    "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

// ------------------------- TOKENS AND CONTRACTS -------------------------

/// Limit Order Protocol v4 address
pub const DUMMY_LOP_ADDR: &str = "0x111111125421cA6dc452d289314280a0f8842A65";

pub const DUMMY_ESCROW_FACTORY_ADDR: &str = "0x239d9eb2418e5B4333a7976c3c3fE936DC6E6613";

pub const DUMMY_PROXY_ASSET_ADDR: &str = "0x00000000000000000000000000000000000000a1";

pub const DUMMY_TOKEN_ADDR: &str = "0x000000000000000000000000000000000000000a";

/// Escrow address returned by the mock factory
pub const DUMMY_ESCROW_ADDR: &str = "0x00000000000000000000000000000000000000e5";

pub const DUMMY_TX_HASH: &str =
    "0x00000000000000000000000000000000000000000000000000000000000000f1";

pub fn addr(value: &str) -> Address {
    value.parse().unwrap()
}

pub fn hash(value: &str) -> H256 {
    value.parse().unwrap()
}

/// 10^18
pub fn one_unit() -> U256 {
    U256::exp10(18)
}

// ============================================================================
// FIXTURES
// ============================================================================

pub fn test_contracts() -> ChainContractSet {
    ChainContractSet {
        limit_order_protocol: addr(DUMMY_LOP_ADDR),
        native_token: NATIVE_TOKEN,
        escrow_factory: addr(DUMMY_ESCROW_FACTORY_ADDR),
        proxy_asset: addr(DUMMY_PROXY_ASSET_ADDR),
        fee_bank: None,
        escrow_src: None,
        escrow_dst: None,
    }
}

pub fn test_registry() -> ChainRegistry {
    ChainRegistry::new()
        .with_chain(SupportedChain::Sepolia, test_contracts())
        .with_chain(SupportedChain::MonadTestnet, test_contracts())
}

pub fn native_asset(chain_id: u64, symbol: &str) -> Asset {
    Asset {
        chain_id,
        address: NATIVE_TOKEN,
        symbol: symbol.to_string(),
        decimals: 18,
    }
}

pub fn token_asset(chain_id: u64) -> Asset {
    Asset {
        chain_id,
        address: addr(DUMMY_TOKEN_ADDR),
        symbol: "TKN".to_string(),
        decimals: 18,
    }
}

/// Order from the golden hash vector.
pub fn golden_order() -> Order {
    Order {
        salt: U256::one(),
        maker: addr("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa01"),
        receiver: addr("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa01"),
        maker_asset: NATIVE_TOKEN,
        taker_asset: addr("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb02"),
        making_amount: one_unit(),
        taking_amount: one_unit(),
        maker_traits: U256::zero(),
    }
}

/// Short timeouts so failing phases surface quickly.
pub fn fast_timeouts() -> SwapTimeouts {
    SwapTimeouts {
        chain_read: Duration::from_secs(2),
        signature: Duration::from_secs(2),
        approval_confirmation: Duration::from_secs(2),
        lock: Duration::from_secs(5),
        completion: Duration::from_secs(5),
    }
}

/// Polls `condition` every 10ms for up to 5s.
pub async fn eventually<F: Fn() -> bool>(condition: F) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 5s");
}

// ============================================================================
// MOCK CHAIN READER
// ============================================================================

/// Answers `allowance` and `addressOfEscrowSrc` calls and records every call.
pub struct MockChainReader {
    pub allowance: Mutex<U256>,
    pub escrow: Address,
    pub calls: Mutex<Vec<(Address, Vec<u8>)>>,
    pub fail: AtomicBool,
    pub delay: Option<Duration>,
}

impl MockChainReader {
    pub fn new() -> Self {
        Self {
            allowance: Mutex::new(U256::zero()),
            escrow: addr(DUMMY_ESCROW_ADDR),
            calls: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            delay: None,
        }
    }

    pub fn with_allowance(self, allowance: U256) -> Self {
        *self.allowance.lock().unwrap() = allowance;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ChainReader for MockChainReader {
    async fn call(&self, contract: Address, calldata: &[u8]) -> Result<Vec<u8>> {
        self.calls.lock().unwrap().push((contract, calldata.to_vec()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("connection refused");
        }

        let function = &calldata[..4];
        if function == selector("allowance(address,address)") {
            Ok(u256_word(&self.allowance.lock().unwrap()).to_vec())
        } else if function == selector("addressOfEscrowSrc(bytes32)") {
            Ok(address_word(&self.escrow).to_vec())
        } else {
            anyhow::bail!("execution reverted")
        }
    }
}

// ============================================================================
// MOCK WALLET
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignBehavior {
    Sign,
    Reject,
    Unavailable,
    Hang,
    /// Signs with a key other than the connected account
    OtherKey,
}

/// Wallet that signs with a local key and records sent transactions.
pub struct MockWallet {
    pub signer: LocalSigner,
    pub connected: AtomicBool,
    pub chain_id: Mutex<u64>,
    pub sign_behavior: Mutex<SignBehavior>,
    pub receipt_success: AtomicBool,
    pub fail_send: AtomicBool,
    pub hang_send: AtomicBool,
    /// Delay before `chain_id` answers
    pub chain_delay: Mutex<Option<Duration>>,
    pub sent: Mutex<Vec<(Address, Vec<u8>)>>,
    events: broadcast::Sender<WalletEvent>,
}

impl MockWallet {
    pub fn new(chain_id: u64) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            signer: LocalSigner::from_hex(DUMMY_PRIVATE_KEY).unwrap(),
            connected: AtomicBool::new(true),
            chain_id: Mutex::new(chain_id),
            sign_behavior: Mutex::new(SignBehavior::Sign),
            receipt_success: AtomicBool::new(true),
            fail_send: AtomicBool::new(false),
            hang_send: AtomicBool::new(false),
            chain_delay: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn disconnected(chain_id: u64) -> Self {
        let wallet = Self::new(chain_id);
        wallet.connected.store(false, Ordering::SeqCst);
        wallet
    }

    pub fn set_sign_behavior(&self, behavior: SignBehavior) {
        *self.sign_behavior.lock().unwrap() = behavior;
    }

    /// Simulates a session change reported by the wallet.
    pub fn emit(&self, event: WalletEvent) {
        let _ = self.events.send(event);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl OrderSigner for MockWallet {
    async fn sign_typed_data(&self, typed_data: &TypedData) -> Result<Vec<u8>, SwapError> {
        let behavior = *self.sign_behavior.lock().unwrap();
        match behavior {
            SignBehavior::Sign => self.signer.sign_typed_data(typed_data).await,
            SignBehavior::Reject => Err(SwapError::SigningRejected("User rejected the request".to_string())),
            SignBehavior::Unavailable => Err(SwapError::SignerUnavailable("No signer".to_string())),
            SignBehavior::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            SignBehavior::OtherKey => {
                LocalSigner::from_hex(OTHER_PRIVATE_KEY)
                    .unwrap()
                    .sign_typed_data(typed_data)
                    .await
            }
        }
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    async fn address(&self) -> Option<Address> {
        if self.connected.load(Ordering::SeqCst) {
            Some(self.signer.address())
        } else {
            None
        }
    }

    async fn chain_id(&self) -> Result<u64> {
        let delay = *self.chain_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(*self.chain_id.lock().unwrap())
    }

    async fn send_transaction(&self, to: Address, data: Vec<u8>) -> Result<H256> {
        if self.hang_send.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_send.load(Ordering::SeqCst) {
            anyhow::bail!("User denied transaction signature");
        }
        self.sent.lock().unwrap().push((to, data));
        Ok(hash(DUMMY_TX_HASH))
    }

    async fn wait_for_confirmation(&self, tx_hash: H256) -> Result<TransactionReceipt> {
        let status = if self.receipt_success.load(Ordering::SeqCst) {
            U64::one()
        } else {
            U64::zero()
        };
        Ok(TransactionReceipt {
            transaction_hash: tx_hash,
            block_number: Some(U64::from(1u64)),
            status: Some(status),
        })
    }

    fn events(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}

// ============================================================================
// MOCK SETTLEMENT
// ============================================================================

/// Settlement backend driven by the test through `emit`.
pub struct MockSettlement {
    pub submitted: Mutex<Vec<SignedOrder>>,
    pub fail_submit: AtomicBool,
    /// Events sent right after submission
    pub scripted: Mutex<Vec<SettlementEvent>>,
    senders: Mutex<HashMap<H256, mpsc::Sender<SettlementEvent>>>,
}

impl MockSettlement {
    pub fn new() -> Self {
        Self {
            submitted: Mutex::new(Vec::new()),
            fail_submit: AtomicBool::new(false),
            scripted: Mutex::new(Vec::new()),
            senders: Mutex::new(HashMap::new()),
        }
    }

    pub fn scripted(events: Vec<SettlementEvent>) -> Self {
        let settlement = Self::new();
        *settlement.scripted.lock().unwrap() = events;
        settlement
    }

    pub fn submitted_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }

    pub fn last_submitted(&self) -> Option<SignedOrder> {
        self.submitted.lock().unwrap().last().cloned()
    }

    /// Sends an event for the most recently submitted order.
    pub async fn emit(&self, event: SettlementEvent) {
        let order_hash = self.last_submitted().expect("no order submitted").order_hash;
        let sender = self.senders.lock().unwrap().get(&order_hash).cloned();
        sender.expect("no subscriber").send(event).await.unwrap();
    }
}

#[async_trait]
impl SettlementBackend for MockSettlement {
    async fn submit(&self, order: &SignedOrder) -> Result<()> {
        if self.fail_submit.load(Ordering::SeqCst) {
            anyhow::bail!("Settlement API error: resolver offline");
        }
        self.submitted.lock().unwrap().push(order.clone());

        let sender = self.senders.lock().unwrap().get(&order.order_hash).cloned();
        let scripted = self.scripted.lock().unwrap().clone();
        if let Some(sender) = sender {
            for event in scripted {
                sender.send(event).await?;
            }
        }
        Ok(())
    }

    async fn subscribe(&self, order_hash: H256) -> Result<mpsc::Receiver<SettlementEvent>> {
        let (tx, rx) = mpsc::channel(16);
        self.senders.lock().unwrap().insert(order_hash, tx);
        Ok(rx)
    }
}

// ============================================================================
// ORCHESTRATOR FIXTURE
// ============================================================================

pub struct Fixture {
    pub wallet: Arc<MockWallet>,
    pub reader: Arc<MockChainReader>,
    pub settlement: Arc<MockSettlement>,
}

impl Fixture {
    pub fn new(wallet: MockWallet, reader: MockChainReader, settlement: MockSettlement) -> Self {
        Self {
            wallet: Arc::new(wallet),
            reader: Arc::new(reader),
            settlement: Arc::new(settlement),
        }
    }

    /// Connected wallet on Sepolia with a reader and a manually driven settlement backend.
    pub fn sepolia() -> Self {
        Self::new(
            MockWallet::new(SEPOLIA_CHAIN_ID),
            MockChainReader::new(),
            MockSettlement::new(),
        )
    }

    pub fn orchestrator(&self, timeouts: SwapTimeouts) -> fusion_swap::SwapOrchestrator {
        let mut readers: HashMap<SupportedChain, Arc<dyn ChainReader>> = HashMap::new();
        readers.insert(SupportedChain::Sepolia, self.reader.clone());
        readers.insert(SupportedChain::MonadTestnet, self.reader.clone());

        fusion_swap::SwapOrchestrator::new(
            self.wallet.clone(),
            self.settlement.clone(),
            Arc::new(test_registry()),
            readers,
            timeouts,
        )
    }
}
