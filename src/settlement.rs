//! Settlement Backend
//!
//! After the order is signed, a resolver locks the maker's funds in the source
//! escrow and releases them on the destination chain. The swap core only
//! observes that process through an explicit per-order event stream.
//!
//! `HttpSettlementBackend` talks to a resolver API:
//! - `POST /orders` with the signed order
//! - `GET /orders/{order_hash}` returning the settlement status
//!
//! Both endpoints use the standard envelope:
//! ```json
//! {
//!   "success": true|false,
//!   "data": <payload>|null,
//!   "error": <message>|null
//! }
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethereum_types::H256;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::order::SignedOrder;

const EVENT_CHANNEL_CAPACITY: usize = 8;

/// Progress notification for one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SettlementEvent {
    /// Resolver sent the escrow lock transaction
    LockSubmitted { tx_hash: H256 },
    /// Lock transaction is final on the source chain
    LockConfirmed,
    /// Destination-side release finished
    CrossChainCompleted,
    /// Settlement aborted
    Failed { reason: String },
}

/// Resolver-side settlement of signed orders.
#[async_trait]
pub trait SettlementBackend: Send + Sync {
    /// Hands the signed order to the resolver network.
    async fn submit(&self, order: &SignedOrder) -> Result<()>;

    /// Event stream for an order. Dropping the receiver unsubscribes.
    async fn subscribe(&self, order_hash: H256) -> Result<mpsc::Receiver<SettlementEvent>>;
}

// ============================================================================
// API STRUCTURES
// ============================================================================

/// Standardized response envelope of the resolver API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

/// Settlement status as reported by `GET /orders/{order_hash}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    LockSubmitted,
    LockConfirmed,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusResponse {
    pub status: SettlementStatus,
    #[serde(default)]
    pub tx_hash: Option<H256>,
    #[serde(default)]
    pub reason: Option<String>,
}

// ============================================================================
// HTTP BACKEND
// ============================================================================

pub struct HttpSettlementBackend {
    /// Resolver API base URL, e.g. "http://127.0.0.1:3333"
    base_url: String,
    client: Client,
    poll_interval: Duration,
}

impl HttpSettlementBackend {
    pub fn new(base_url: impl Into<String>, poll_interval: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            poll_interval,
        })
    }
}

async fn fetch_status(client: &Client, base_url: &str, order_hash: H256) -> Result<OrderStatusResponse> {
    let url = format!("{}/orders/{:?}", base_url, order_hash);

    let response: ApiResponse<OrderStatusResponse> = client
        .get(&url)
        .send()
        .await
        .context("Failed to send GET /orders/:hash request")?
        .json()
        .await
        .context("Failed to parse GET /orders/:hash response")?;

    if !response.success {
        return Err(anyhow::anyhow!(
            "Settlement API error: {}",
            response.error.unwrap_or_else(|| "Unknown error".to_string())
        ));
    }

    response
        .data
        .ok_or_else(|| anyhow::anyhow!("Settlement API returned no order status"))
}

/// Events that advance a subscriber from `last` to the reported status, in protocol order.
fn events_between(last: SettlementStatus, reported: &OrderStatusResponse) -> Vec<SettlementEvent> {
    if reported.status == SettlementStatus::Failed {
        return vec![SettlementEvent::Failed {
            reason: reported
                .reason
                .clone()
                .unwrap_or_else(|| "Resolver reported failure".to_string()),
        }];
    }

    let mut events = Vec::new();
    if last < SettlementStatus::LockSubmitted && reported.status >= SettlementStatus::LockSubmitted {
        events.push(SettlementEvent::LockSubmitted {
            tx_hash: reported.tx_hash.unwrap_or_default(),
        });
    }
    if last < SettlementStatus::LockConfirmed && reported.status >= SettlementStatus::LockConfirmed {
        events.push(SettlementEvent::LockConfirmed);
    }
    if last < SettlementStatus::Completed && reported.status >= SettlementStatus::Completed {
        events.push(SettlementEvent::CrossChainCompleted);
    }
    events
}

#[async_trait]
impl SettlementBackend for HttpSettlementBackend {
    async fn submit(&self, order: &SignedOrder) -> Result<()> {
        let url = format!("{}/orders", self.base_url);

        let response: ApiResponse<serde_json::Value> = self
            .client
            .post(&url)
            .json(order)
            .send()
            .await
            .context("Failed to send POST /orders request")?
            .json()
            .await
            .context("Failed to parse POST /orders response")?;

        if !response.success {
            return Err(anyhow::anyhow!(
                "Settlement API error: {}",
                response.error.unwrap_or_else(|| "Unknown error".to_string())
            ));
        }

        info!("Submitted order {:?} for settlement", order.order_hash);
        Ok(())
    }

    async fn subscribe(&self, order_hash: H256) -> Result<mpsc::Receiver<SettlementEvent>> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let client = self.client.clone();
        let base_url = self.base_url.clone();
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            let mut last = SettlementStatus::Pending;
            let mut ticker = tokio::time::interval(poll_interval);
            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    debug!("Settlement subscriber for {:?} dropped", order_hash);
                    return;
                }

                let reported = match fetch_status(&client, &base_url, order_hash).await {
                    Ok(reported) => reported,
                    Err(e) => {
                        warn!("Settlement status poll for {:?} failed: {:#}", order_hash, e);
                        continue;
                    }
                };

                for event in events_between(last, &reported) {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
                if reported.status > last {
                    last = reported.status;
                }
                if matches!(last, SettlementStatus::Completed | SettlementStatus::Failed) {
                    return;
                }
            }
        });

        Ok(rx)
    }
}
