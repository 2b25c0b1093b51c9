//! Order Construction
//!
//! Builds the canonical, unsigned limit order that the maker signs off-chain.
//! Cross-chain orders route funds back to the initiator, so `receiver` is
//! always the maker, and no advanced maker traits are used.

use ethereum_types::{Address, H256, U256};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SwapError;
use crate::typed_data::OrderSignature;

/// Decimals assumed for order amounts when the asset does not say otherwise.
pub const DEFAULT_DECIMALS: u32 = 18;

/// Canonical off-chain-signed limit order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(with = "u256_dec")]
    pub salt: U256,
    pub maker: Address,
    pub receiver: Address,
    pub maker_asset: Address,
    pub taker_asset: Address,
    #[serde(with = "u256_dec")]
    pub making_amount: U256,
    #[serde(with = "u256_dec")]
    pub taking_amount: U256,
    #[serde(with = "u256_dec")]
    pub maker_traits: U256,
}

/// One side of a swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub chain_id: u64,
    /// Token contract, or the native sentinel
    pub address: Address,
    pub symbol: String,
    pub decimals: u32,
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} on chain {}", self.symbol, self.chain_id)
    }
}

/// A signed order together with the identifiers the settlement side needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedOrder {
    pub order: Order,
    pub signature: OrderSignature,
    pub order_hash: H256,
    pub chain_id: u64,
    /// Predicted source escrow address
    pub escrow_address: Address,
}

/// Builds an order with a salt drawn from the operating system CSPRNG.
///
/// Amounts are parsed with 18 decimals.
pub fn build(
    maker: Address,
    maker_asset: Address,
    taker_asset: Address,
    making_amount: &str,
    taking_amount: &str,
    chain_id: u64,
    verifying_contract: Address,
) -> Result<Order, SwapError> {
    build_with_decimals(
        maker,
        maker_asset,
        taker_asset,
        making_amount,
        taking_amount,
        DEFAULT_DECIMALS,
        chain_id,
        verifying_contract,
    )
}

/// Like [`build`], with amounts scaled by `decimals` of the maker asset.
#[allow(clippy::too_many_arguments)]
pub fn build_with_decimals(
    maker: Address,
    maker_asset: Address,
    taker_asset: Address,
    making_amount: &str,
    taking_amount: &str,
    decimals: u32,
    chain_id: u64,
    verifying_contract: Address,
) -> Result<Order, SwapError> {
    build_with_rng(
        &mut OsRng,
        maker,
        maker_asset,
        taker_asset,
        making_amount,
        taking_amount,
        decimals,
        chain_id,
        verifying_contract,
    )
}

/// Builds an order drawing the 32-byte salt from `rng`.
#[allow(clippy::too_many_arguments)]
pub fn build_with_rng<R: RngCore + CryptoRng>(
    rng: &mut R,
    maker: Address,
    maker_asset: Address,
    taker_asset: Address,
    making_amount: &str,
    taking_amount: &str,
    decimals: u32,
    chain_id: u64,
    verifying_contract: Address,
) -> Result<Order, SwapError> {
    let making_amount = parse_units(making_amount, decimals)?;
    let taking_amount = parse_units(taking_amount, decimals)?;

    let mut salt_bytes = [0u8; 32];
    rng.fill_bytes(&mut salt_bytes);

    let order = Order {
        salt: U256::from_big_endian(&salt_bytes),
        maker,
        receiver: maker,
        maker_asset,
        taker_asset,
        making_amount,
        taking_amount,
        maker_traits: U256::zero(),
    };

    debug!(
        "Built order for maker {:?} on chain {} (verifying contract {:?}): making={}, taking={}",
        maker, chain_id, verifying_contract, order.making_amount, order.taking_amount
    );

    Ok(order)
}

/// Converts a non-negative decimal string into a fixed-point integer.
///
/// `"1.5"` with 18 decimals becomes `1500000000000000000`. Signs, exponents,
/// whitespace, excess fractional digits and values above 2^256-1 are rejected.
pub fn parse_units(amount: &str, decimals: u32) -> Result<U256, SwapError> {
    let invalid = |reason: &str| SwapError::InvalidAmount(format!("'{}': {}", amount, reason));

    if amount.is_empty() {
        return Err(invalid("empty amount"));
    }

    let (whole, fraction) = match amount.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (amount, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid("no digits"));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("not a non-negative decimal number"));
    }
    if fraction.len() > decimals as usize {
        return Err(invalid(&format!("more than {} fractional digits", decimals)));
    }

    let scale = U256::from(10u64)
        .checked_pow(U256::from(decimals))
        .ok_or_else(|| invalid("decimals out of range"))?;

    let whole_value = if whole.is_empty() {
        U256::zero()
    } else {
        U256::from_dec_str(whole).map_err(|_| invalid("overflows 256 bits"))?
    };

    let fraction_value = if fraction.is_empty() {
        U256::zero()
    } else {
        let padded = format!("{:0<width$}", fraction, width = decimals as usize);
        U256::from_dec_str(&padded).map_err(|_| invalid("overflows 256 bits"))?
    };

    whole_value
        .checked_mul(scale)
        .and_then(|value| value.checked_add(fraction_value))
        .ok_or_else(|| invalid("overflows 256 bits"))
}

/// Serializes `U256` as a decimal string (the `eth_signTypedData_v4` message format).
pub(crate) mod u256_dec {
    use ethereum_types::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.strip_prefix("0x") {
            Some(hex) => U256::from_str_radix(hex, 16).map_err(serde::de::Error::custom),
            None => U256::from_dec_str(&raw).map_err(serde::de::Error::custom),
        }
    }
}
