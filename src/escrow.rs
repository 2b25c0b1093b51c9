//! Escrow Address Prediction
//!
//! The escrow factory deploys source escrows at deterministic addresses, so
//! the address is known before the resolver locks any funds.

use ethereum_types::{Address, H256};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::abi::{decode_address, encode_call, Token};
use crate::chains::ChainRegistry;
use crate::error::{SwapError, SwapPhase};
use crate::evm_client::ChainReader;

pub const ADDRESS_OF_ESCROW_SRC_SIGNATURE: &str = "addressOfEscrowSrc(bytes32)";

pub struct EscrowPredictor {
    registry: Arc<ChainRegistry>,
    reader: Arc<dyn ChainReader>,
    read_timeout: Duration,
}

impl EscrowPredictor {
    pub fn new(registry: Arc<ChainRegistry>, reader: Arc<dyn ChainReader>, read_timeout: Duration) -> Self {
        Self {
            registry,
            reader,
            read_timeout,
        }
    }

    /// Source escrow address for `order_hash` on `chain_id`.
    ///
    /// A pure view call: the same hash always yields the same address, whether
    /// or not the escrow has been deployed yet.
    pub async fn predict_source_escrow(&self, order_hash: H256, chain_id: u64) -> Result<Address, SwapError> {
        let factory = self.registry.for_chain_id(chain_id)?.escrow_factory;
        let calldata = encode_call(ADDRESS_OF_ESCROW_SRC_SIGNATURE, &[Token::FixedBytes(order_hash)]);

        let data = tokio::time::timeout(self.read_timeout, self.reader.call(factory, &calldata))
            .await
            .map_err(|_| SwapError::timeout(SwapPhase::ChainRead, self.read_timeout))?
            .map_err(|e| {
                SwapError::PredictionUnavailable(format!("Escrow factory {:?} call failed: {:#}", factory, e))
            })?;

        let escrow = decode_address(&data).map_err(|e| SwapError::PredictionUnavailable(format!("{:#}", e)))?;
        debug!("Predicted source escrow {:?} for order {:?}", escrow, order_hash);
        Ok(escrow)
    }
}
