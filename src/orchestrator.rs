//! Swap Orchestrator
//!
//! Drives one cross-chain swap at a time through its lifecycle:
//!
//! ```text
//! Idle -> Approving -> Signing -> WaitingForLock -> Locking -> WaitingForCompletion -> Completed
//!            \            \             \              \                \
//!             `------------`-------------`--------------`----------------`--> Error
//! ```
//!
//! 1. **Approving**: the Limit Order Protocol gets an exact allowance for the
//!    source token (nothing to do for native coins).
//! 2. **Signing**: the order is built and the wallet signs its typed data.
//! 3. **WaitingForLock**: the source escrow address is predicted and the signed
//!    order goes to the settlement backend.
//! 4. **Locking**: the resolver submitted the escrow lock. From here on the
//!    swap can no longer be cancelled.
//! 5. **WaitingForCompletion**: the lock is confirmed, the destination release
//!    is pending.
//!
//! Each swap runs as one tokio task. Every external await is bounded by the
//! timeout of its phase. Wallet session changes fail the swap while it is still
//! before the point of no return.

use chrono::{DateTime, Utc};
use ethereum_types::{Address, H256, U256};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::allowance::{ApprovalGate, ApprovalOutcome};
use crate::chains::{ChainContractSet, ChainRegistry, SupportedChain};
use crate::config::SwapTimeouts;
use crate::error::{SwapError, SwapPhase};
use crate::escrow::EscrowPredictor;
use crate::evm_client::ChainReader;
use crate::order::{self, Asset, Order, SignedOrder};
use crate::settlement::{SettlementBackend, SettlementEvent};
use crate::typed_data;
use crate::wallet::{WalletEvent, WalletProvider};

// ============================================================================
// STATE AND STATUS TYPES
// ============================================================================

/// Lifecycle state of a swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapState {
    Idle,
    Approving,
    Signing,
    WaitingForLock,
    Locking,
    WaitingForCompletion,
    Completed,
    Error,
}

impl SwapState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SwapState::Completed | SwapState::Error)
    }

    /// Next state on the success path.
    fn next(self) -> Option<SwapState> {
        match self {
            SwapState::Idle => Some(SwapState::Approving),
            SwapState::Approving => Some(SwapState::Signing),
            SwapState::Signing => Some(SwapState::WaitingForLock),
            SwapState::WaitingForLock => Some(SwapState::Locking),
            SwapState::Locking => Some(SwapState::WaitingForCompletion),
            SwapState::WaitingForCompletion => Some(SwapState::Completed),
            SwapState::Completed | SwapState::Error => None,
        }
    }
}

impl std::fmt::Display for SwapState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SwapState::Idle => "idle",
            SwapState::Approving => "approving",
            SwapState::Signing => "signing",
            SwapState::WaitingForLock => "waiting for lock",
            SwapState::Locking => "locking",
            SwapState::WaitingForCompletion => "waiting for completion",
            SwapState::Completed => "completed",
            SwapState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Identifies one swap session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SwapHandle {
    id: Uuid,
}

impl SwapHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl std::fmt::Display for SwapHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Snapshot of a swap as observed by callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwapStatusReport {
    pub state: SwapState,
    pub message: String,
    pub error: Option<SwapError>,
    pub order_hash: Option<H256>,
    pub escrow_address: Option<Address>,
    pub updated_at: DateTime<Utc>,
}

impl SwapStatusReport {
    fn new(state: SwapState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
            error: None,
            order_hash: None,
            escrow_address: None,
            updated_at: Utc::now(),
        }
    }
}

/// Inputs of a swap, fixed at initiation.
struct SwapPlan {
    from: Asset,
    to: Asset,
    amount: String,
    making_amount: U256,
    maker: Address,
    chain: SupportedChain,
    contracts: ChainContractSet,
    reader: Arc<dyn ChainReader>,
}

struct SwapSession {
    id: Uuid,
    status: watch::Sender<SwapStatusReport>,
    history: Vec<SwapState>,
    order: Option<Order>,
    point_of_no_return: bool,
    task: Option<JoinHandle<()>>,
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

struct Inner {
    wallet: Arc<dyn WalletProvider>,
    settlement: Arc<dyn SettlementBackend>,
    registry: Arc<ChainRegistry>,
    readers: HashMap<SupportedChain, Arc<dyn ChainReader>>,
    timeouts: SwapTimeouts,
    session: RwLock<Option<SwapSession>>,
}

/// Sequences approval, signing, escrow prediction and settlement for one wallet session.
pub struct SwapOrchestrator {
    inner: Arc<Inner>,
}

impl SwapOrchestrator {
    /// Creates an orchestrator bound to an explicit wallet session.
    ///
    /// `readers` provides contract read access per chain; a chain with a
    /// contract set but no reader cannot be swapped from.
    pub fn new(
        wallet: Arc<dyn WalletProvider>,
        settlement: Arc<dyn SettlementBackend>,
        registry: Arc<ChainRegistry>,
        readers: HashMap<SupportedChain, Arc<dyn ChainReader>>,
        timeouts: SwapTimeouts,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                wallet,
                settlement,
                registry,
                readers,
                timeouts,
                session: RwLock::new(None),
            }),
        }
    }

    /// Validates the request and starts a swap of `amount` units of `from` into `to`.
    ///
    /// Validation failures are returned directly and leave the orchestrator
    /// untouched. A swap that is still running blocks a new one; a finished
    /// (completed or failed) swap is replaced.
    pub async fn initiate_swap(&self, from: &Asset, to: &Asset, amount: &str) -> Result<SwapHandle, SwapError> {
        if self.swap_running().await {
            return Err(SwapError::SwapAlreadyInProgress);
        }

        let making_amount = order::parse_units(amount, from.decimals)?;
        if making_amount.is_zero() {
            return Err(SwapError::InvalidAmount(format!("'{}': must be greater than zero", amount)));
        }

        // Wallet reads happen before the session lock so observers of the
        // previous session are not blocked by a slow wallet.
        let maker = self.inner.wallet.address().await.ok_or(SwapError::WalletNotConnected)?;
        let wallet_chain = tokio::time::timeout(self.inner.timeouts.chain_read, self.inner.wallet.chain_id())
            .await
            .map_err(|_| SwapError::timeout(SwapPhase::ChainRead, self.inner.timeouts.chain_read))?
            .map_err(|e| {
                warn!("Failed to read wallet chain: {:#}", e);
                SwapError::WalletNotConnected
            })?;
        if wallet_chain != from.chain_id {
            return Err(SwapError::ChainMismatch {
                expected: from.chain_id,
                actual: wallet_chain,
            });
        }

        let chain = SupportedChain::from_chain_id(from.chain_id)?;
        SupportedChain::from_chain_id(to.chain_id)?;
        let contracts = self.inner.registry.get(chain)?.clone();
        let reader = self
            .inner
            .readers
            .get(&chain)
            .cloned()
            .ok_or(SwapError::UnsupportedChain(from.chain_id))?;

        let plan = SwapPlan {
            from: from.clone(),
            to: to.clone(),
            amount: amount.to_string(),
            making_amount,
            maker,
            chain,
            contracts,
            reader,
        };

        let mut guard = self.inner.session.write().await;
        if let Some(session) = guard.as_ref() {
            if !session.status.borrow().state.is_terminal() {
                return Err(SwapError::SwapAlreadyInProgress);
            }
        }

        let id = Uuid::new_v4();
        let (status, _) = watch::channel(SwapStatusReport::new(SwapState::Approving, "Checking token allowance"));
        // Subscribe before the task starts so no session change goes unnoticed.
        let events = self.inner.wallet.events();
        let task = tokio::spawn(Inner::run(Arc::clone(&self.inner), id, plan, events));

        *guard = Some(SwapSession {
            id,
            status,
            history: vec![SwapState::Approving],
            order: None,
            point_of_no_return: false,
            task: Some(task),
        });

        info!("Swap {} started: {} {} -> {} on {}", id, amount, from, to, chain);
        Ok(SwapHandle { id })
    }

    async fn swap_running(&self) -> bool {
        self.inner
            .session
            .read()
            .await
            .as_ref()
            .map(|session| !session.status.borrow().state.is_terminal())
            .unwrap_or(false)
    }

    /// Current status of the swap behind `handle`.
    pub async fn status(&self, handle: &SwapHandle) -> Result<SwapStatusReport, SwapError> {
        let guard = self.inner.session.read().await;
        match guard.as_ref() {
            Some(session) if session.id == handle.id => Ok(session.status.borrow().clone()),
            _ => Err(SwapError::SessionNotFound),
        }
    }

    /// State of the orchestrator's current session (`Idle` when there is none).
    pub async fn state(&self) -> SwapState {
        self.inner
            .session
            .read()
            .await
            .as_ref()
            .map(|session| session.status.borrow().state)
            .unwrap_or(SwapState::Idle)
    }

    /// States the swap went through, in order.
    pub async fn history(&self, handle: &SwapHandle) -> Result<Vec<SwapState>, SwapError> {
        let guard = self.inner.session.read().await;
        match guard.as_ref() {
            Some(session) if session.id == handle.id => Ok(session.history.clone()),
            _ => Err(SwapError::SessionNotFound),
        }
    }

    /// The signed order of the swap, once signing finished.
    pub async fn order(&self, handle: &SwapHandle) -> Result<Option<Order>, SwapError> {
        let guard = self.inner.session.read().await;
        match guard.as_ref() {
            Some(session) if session.id == handle.id => Ok(session.order.clone()),
            _ => Err(SwapError::SessionNotFound),
        }
    }

    /// Watches status changes of the swap behind `handle`.
    pub async fn subscribe(&self, handle: &SwapHandle) -> Result<watch::Receiver<SwapStatusReport>, SwapError> {
        let guard = self.inner.session.read().await;
        match guard.as_ref() {
            Some(session) if session.id == handle.id => Ok(session.status.subscribe()),
            _ => Err(SwapError::SessionNotFound),
        }
    }

    /// Cancels the swap and returns the orchestrator to `Idle`.
    ///
    /// Fails with `CannotCancelAfterLock` once the escrow lock was submitted;
    /// the swap then keeps running.
    pub async fn cancel(&self, handle: &SwapHandle) -> Result<(), SwapError> {
        let mut guard = self.inner.session.write().await;
        let session = match guard.as_mut() {
            Some(session) if session.id == handle.id => session,
            _ => return Err(SwapError::SessionNotFound),
        };

        if session.point_of_no_return {
            return Err(SwapError::CannotCancelAfterLock);
        }

        if let Some(task) = session.task.take() {
            task.abort();
        }
        let state = session.status.borrow().state;
        *guard = None;

        info!("Swap {} cancelled in state {}", handle.id, state);
        Ok(())
    }
}

impl Drop for SwapOrchestrator {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.inner.session.try_write() {
            if let Some(task) = guard.as_mut().and_then(|session| session.task.take()) {
                task.abort();
            }
        }
    }
}

// ============================================================================
// SWAP TASK
// ============================================================================

impl Inner {
    async fn run(inner: Arc<Inner>, id: Uuid, plan: SwapPlan, mut events: broadcast::Receiver<WalletEvent>) {
        let result = {
            let swap = inner.execute(id, &plan);
            tokio::pin!(swap);
            let mut guard_wallet = true;

            loop {
                tokio::select! {
                    result = &mut swap => break result,
                    event = events.recv(), if guard_wallet => {
                        let reason = match event {
                            Ok(event) => event.to_string(),
                            Err(broadcast::error::RecvError::Lagged(missed)) => {
                                format!("{} wallet events missed", missed)
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                debug!("Wallet event stream closed for swap {}", id);
                                guard_wallet = false;
                                continue;
                            }
                        };

                        if inner.past_point_of_no_return(id).await {
                            debug!("Swap {} ignores wallet change after lock: {}", id, reason);
                            guard_wallet = false;
                            continue;
                        }
                        break Err(SwapError::WalletChanged(reason));
                    }
                }
            }
        };
        // The event subscription ends here, together with the task.
        drop(events);

        if let Err(err) = result {
            inner.fail(id, err).await;
        }
    }

    async fn execute(&self, id: Uuid, plan: &SwapPlan) -> Result<(), SwapError> {
        let timeouts = self.timeouts;
        let chain_id = plan.chain.chain_id();
        let verifying_contract = plan.contracts.limit_order_protocol;

        // Approving
        let gate = ApprovalGate::new(
            Arc::clone(&plan.reader),
            Arc::clone(&self.wallet),
            timeouts.chain_read,
            timeouts.signature,
            timeouts.approval_confirmation,
        );
        let outcome = gate
            .ensure_allowance(
                plan.from.address,
                plan.maker,
                verifying_contract,
                plan.making_amount,
                &plan.contracts,
            )
            .await?;
        let message = match outcome {
            ApprovalOutcome::Approved { tx_hash } => format!("Approved in {:?}, waiting for order signature", tx_hash),
            _ => "Waiting for order signature".to_string(),
        };
        self.transition(id, SwapState::Signing, message, |_| {}).await?;

        // Signing. Fixed 1:1 ratio: the taking amount equals the making amount.
        let order = order::build_with_decimals(
            plan.maker,
            plan.from.address,
            plan.contracts.proxy_asset,
            &plan.amount,
            &plan.amount,
            plan.from.decimals,
            chain_id,
            verifying_contract,
        )?;
        let order_hash = typed_data::hash(&order, chain_id, verifying_contract);
        let signature = tokio::time::timeout(
            timeouts.signature,
            typed_data::sign(&order, self.wallet.as_ref(), chain_id, verifying_contract),
        )
        .await
        .map_err(|_| SwapError::timeout(SwapPhase::Signature, timeouts.signature))??;

        let signer = typed_data::recover_signer(order_hash, &signature)
            .map_err(|e| SwapError::SigningRejected(format!("Unrecoverable signature: {:#}", e)))?;
        if signer != plan.maker {
            return Err(SwapError::SigningRejected(format!(
                "Order signed by {:?}, expected maker {:?}",
                signer, plan.maker
            )));
        }

        self.transition(id, SwapState::WaitingForLock, "Waiting for the resolver to lock the escrow", |report| {
            report.order_hash = Some(order_hash);
        })
        .await?;
        self.record_order(id, order.clone()).await?;

        // WaitingForLock
        let predictor = EscrowPredictor::new(Arc::clone(&self.registry), Arc::clone(&plan.reader), timeouts.chain_read);
        let escrow_address = predictor.predict_source_escrow(order_hash, chain_id).await?;
        self.transition(
            id,
            SwapState::WaitingForLock,
            format!("Source escrow {:?}, waiting for the resolver lock", escrow_address),
            |report| report.escrow_address = Some(escrow_address),
        )
        .await?;

        let lock_deadline = Instant::now() + timeouts.lock;
        let lock_timeout = || SwapError::timeout(SwapPhase::Lock, timeouts.lock);

        let mut settlement_events = tokio::time::timeout_at(lock_deadline, self.settlement.subscribe(order_hash))
            .await
            .map_err(|_| lock_timeout())?
            .map_err(|e| SwapError::SettlementFailed(format!("Failed to subscribe: {:#}", e)))?;

        let signed = SignedOrder {
            order,
            signature,
            order_hash,
            chain_id,
            escrow_address,
        };
        tokio::time::timeout_at(lock_deadline, self.settlement.submit(&signed))
            .await
            .map_err(|_| lock_timeout())?
            .map_err(|e| SwapError::SettlementFailed(format!("Order submission failed: {:#}", e)))?;
        info!("Swap {}: order {:?} submitted to settlement", id, order_hash);

        self.await_settlement(id, &plan.to, &mut settlement_events, lock_deadline, timeouts)
            .await
    }

    async fn await_settlement(
        &self,
        id: Uuid,
        to: &Asset,
        events: &mut mpsc::Receiver<SettlementEvent>,
        lock_deadline: Instant,
        timeouts: SwapTimeouts,
    ) -> Result<(), SwapError> {
        let mut state = SwapState::WaitingForLock;
        let mut deadline = lock_deadline;
        let mut phase = (SwapPhase::Lock, timeouts.lock);

        loop {
            let event = tokio::time::timeout_at(deadline, events.recv())
                .await
                .map_err(|_| SwapError::timeout(phase.0, phase.1))?
                .ok_or_else(|| SwapError::SettlementFailed("Settlement event stream closed".to_string()))?;

            let target = match event {
                SettlementEvent::LockSubmitted { tx_hash } => {
                    debug!("Swap {}: lock submitted in {:?}", id, tx_hash);
                    SwapState::Locking
                }
                SettlementEvent::LockConfirmed => SwapState::WaitingForCompletion,
                SettlementEvent::CrossChainCompleted => SwapState::Completed,
                SettlementEvent::Failed { reason } => return Err(SwapError::SettlementFailed(reason)),
            };

            while state < target {
                let Some(next) = state.next() else { break };
                state = next;
                let message = match state {
                    SwapState::Locking => "Escrow lock submitted".to_string(),
                    SwapState::WaitingForCompletion => format!("Escrow locked, waiting for {}", to),
                    _ => format!("Received {}", to),
                };
                self.transition(id, state, message, |_| {}).await?;

                if state == SwapState::WaitingForCompletion {
                    deadline = Instant::now() + timeouts.completion;
                    phase = (SwapPhase::Completion, timeouts.completion);
                }
            }

            if state == SwapState::Completed {
                info!("Swap {} completed", id);
                return Ok(());
            }
        }
    }

    /// Applies a state change to the session `id`. Entering `Locking` sets the
    /// point of no return under the same lock that `cancel` takes.
    async fn transition<F>(&self, id: Uuid, state: SwapState, message: impl Into<String>, update: F) -> Result<(), SwapError>
    where
        F: FnOnce(&mut SwapStatusReport),
    {
        let message = message.into();
        let mut guard = self.session.write().await;
        let session = match guard.as_mut() {
            Some(session) if session.id == id => session,
            _ => return Err(SwapError::SessionNotFound),
        };

        if state >= SwapState::Locking && state != SwapState::Error {
            session.point_of_no_return = true;
        }

        let mut report = session.status.borrow().clone();
        let previous = report.state;
        report.state = state;
        report.message = message;
        report.updated_at = Utc::now();
        update(&mut report);
        session.status.send_replace(report);

        if previous != state {
            session.history.push(state);
            info!("Swap {}: {} -> {}", id, previous, state);
        }
        Ok(())
    }

    async fn record_order(&self, id: Uuid, order: Order) -> Result<(), SwapError> {
        let mut guard = self.session.write().await;
        match guard.as_mut() {
            Some(session) if session.id == id => {
                session.order = Some(order);
                Ok(())
            }
            _ => Err(SwapError::SessionNotFound),
        }
    }

    async fn past_point_of_no_return(&self, id: Uuid) -> bool {
        self.session
            .read()
            .await
            .as_ref()
            .map(|session| session.id == id && session.point_of_no_return)
            .unwrap_or(false)
    }

    async fn fail(&self, id: Uuid, err: SwapError) {
        if err == SwapError::SessionNotFound {
            debug!("Swap {} no longer tracked, dropping its result", id);
            return;
        }
        error!("Swap {} failed: {}", id, err);
        let message = err.to_string();
        let _ = self
            .transition(id, SwapState::Error, message, |report| report.error = Some(err))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_path_order() {
        let mut state = SwapState::Idle;
        let mut path = vec![state];
        while let Some(next) = state.next() {
            state = next;
            path.push(state);
        }
        assert_eq!(
            path,
            vec![
                SwapState::Idle,
                SwapState::Approving,
                SwapState::Signing,
                SwapState::WaitingForLock,
                SwapState::Locking,
                SwapState::WaitingForCompletion,
                SwapState::Completed,
            ]
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(SwapState::Completed.is_terminal());
        assert!(SwapState::Error.is_terminal());
        assert!(!SwapState::Locking.is_terminal());
        assert!(!SwapState::Idle.is_terminal());
    }

    #[test]
    fn test_error_state_has_no_successor() {
        assert_eq!(SwapState::Error.next(), None);
    }

    #[test]
    fn test_orchestrator_is_send_and_sync() {
        fn check<T: Send + Sync>() {}
        check::<SwapOrchestrator>();
    }
}
