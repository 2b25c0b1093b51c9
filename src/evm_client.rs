//! EVM Client Module
//!
//! JSON-RPC client for EVM-compatible nodes. Provides the contract reads the
//! swap core needs (`eth_call`), receipt lookups and chain identification, and
//! implements the [`ChainReader`] seam.

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethereum_types::{Address, H256, U64};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::abi::decode_hex;

// ============================================================================
// JSON-RPC STRUCTURES
// ============================================================================

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Vec<serde_json::Value>,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

/// Error object returned by a JSON-RPC endpoint.
///
/// Kept as a typed error so callers can `downcast_ref` and branch on `code`
/// (e.g. EIP-1193 `4001` for a user rejection).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Error)]
#[error("JSON-RPC error: {message} (code: {code})")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// Transaction receipt (only the fields the swap core inspects).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: H256,
    pub block_number: Option<U64>,
    /// 1 = success, 0 = reverted
    pub status: Option<U64>,
}

impl TransactionReceipt {
    pub fn is_success(&self) -> bool {
        self.status.map(|status| status == U64::one()).unwrap_or(false)
    }
}

// ============================================================================
// CHAIN READER SEAM
// ============================================================================

/// Read-only access to contract state on one chain.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Executes a read-only contract call against the latest block.
    async fn call(&self, contract: Address, calldata: &[u8]) -> Result<Vec<u8>>;
}

// ============================================================================
// EVM CLIENT IMPLEMENTATION
// ============================================================================

/// Client for communicating with EVM-compatible blockchain nodes via JSON-RPC
pub struct EvmClient {
    client: Client,
    /// Base URL of the node (e.g., "http://127.0.0.1:8545")
    base_url: String,
    next_id: AtomicU64,
}

impl EvmClient {
    /// Creates a new EVM client for the given node URL
    pub fn new(node_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: node_url.to_string(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends a JSON-RPC request and returns its `result` (None for JSON `null`).
    ///
    /// Endpoint errors are returned as [`RpcError`] wrapped in `anyhow`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<Option<T>> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        debug!("JSON-RPC {} -> {}", method, self.base_url);

        let response: JsonRpcResponse<T> = self
            .client
            .post(&self.base_url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request to {}", method, self.base_url))?
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response from {}", method, self.base_url))?;

        if let Some(error) = response.error {
            return Err(anyhow::Error::new(error)
                .context(format!("{} failed at {}", method, self.base_url)));
        }

        Ok(response.result)
    }

    /// `eth_call` against the latest block, returning the raw return data.
    pub async fn eth_call(&self, to: Address, data: &[u8]) -> Result<Vec<u8>> {
        let call = json!({
            "to": format!("{:?}", to),
            "data": format!("0x{}", hex::encode(data)),
        });

        let result: Option<String> = self.request("eth_call", vec![call, json!("latest")]).await?;
        let result = result.ok_or_else(|| anyhow::anyhow!("eth_call to {:?} returned no result", to))?;
        decode_hex(&result).context("Invalid eth_call return data")
    }

    /// Chain id reported by the node.
    pub async fn chain_id(&self) -> Result<u64> {
        let result: Option<U64> = self.request("eth_chainId", vec![]).await?;
        result
            .map(|id| id.as_u64())
            .ok_or_else(|| anyhow::anyhow!("eth_chainId returned no result"))
    }

    /// Receipt of a transaction, or `None` while it is pending or unknown.
    pub async fn get_transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>> {
        self.request("eth_getTransactionReceipt", vec![json!(format!("{:?}", hash))])
            .await
    }
}

#[async_trait]
impl ChainReader for EvmClient {
    async fn call(&self, contract: Address, calldata: &[u8]) -> Result<Vec<u8>> {
        self.eth_call(contract, calldata).await
    }
}
