//! EIP-712 Typed Data Signing
//!
//! Domain-separated hashing of limit orders and the `{r, vs}` compact signature
//! (EIP-2098) accepted by the Limit Order Protocol.
//!
//! ## Hash Layout
//!
//! ```text
//! digest = keccak256(0x19 0x01 || domainSeparator || structHash(order))
//! ```
//!
//! The digest doubles as the public order identifier (`order_hash`).

use anyhow::{Context, Result};
use ethereum_types::{Address, H256, U256};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::abi::{address_word, keccak256, u256_word};
use crate::error::SwapError;
use crate::order::Order;
use crate::wallet::OrderSigner;

pub const DOMAIN_NAME: &str = "Limit Order Protocol";
pub const DOMAIN_VERSION: &str = "1";

pub const EIP712_DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

pub const ORDER_TYPE: &str = "Order(uint256 salt,address maker,address receiver,address makerAsset,address takerAsset,uint256 makingAmount,uint256 takingAmount,uint256 makerTraits)";

/// secp256k1 group order divided by two; canonical signatures have `s <= HALF_ORDER`.
const SECP256K1_HALF_ORDER: &str =
    "7fffffffffffffffffffffffffffffff5d576e7357a4501ddfe92f46681b20a0";

// ============================================================================
// DOMAIN AND STRUCT HASHING
// ============================================================================

/// EIP-712 domain of the Limit Order Protocol on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip712Domain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl Eip712Domain {
    pub fn limit_order_protocol(chain_id: u64, verifying_contract: Address) -> Self {
        Self {
            name: DOMAIN_NAME.to_string(),
            version: DOMAIN_VERSION.to_string(),
            chain_id,
            verifying_contract,
        }
    }

    /// `hashStruct(EIP712Domain)`
    pub fn separator(&self) -> H256 {
        let mut encoded = Vec::with_capacity(5 * 32);
        encoded.extend_from_slice(&keccak256(EIP712_DOMAIN_TYPE.as_bytes()));
        encoded.extend_from_slice(&keccak256(self.name.as_bytes()));
        encoded.extend_from_slice(&keccak256(self.version.as_bytes()));
        encoded.extend_from_slice(&u256_word(&U256::from(self.chain_id)));
        encoded.extend_from_slice(&address_word(&self.verifying_contract));
        H256(keccak256(&encoded))
    }
}

/// `hashStruct(Order)`
pub fn order_struct_hash(order: &Order) -> H256 {
    let mut encoded = Vec::with_capacity(9 * 32);
    encoded.extend_from_slice(&keccak256(ORDER_TYPE.as_bytes()));
    encoded.extend_from_slice(&u256_word(&order.salt));
    encoded.extend_from_slice(&address_word(&order.maker));
    encoded.extend_from_slice(&address_word(&order.receiver));
    encoded.extend_from_slice(&address_word(&order.maker_asset));
    encoded.extend_from_slice(&address_word(&order.taker_asset));
    encoded.extend_from_slice(&u256_word(&order.making_amount));
    encoded.extend_from_slice(&u256_word(&order.taking_amount));
    encoded.extend_from_slice(&u256_word(&order.maker_traits));
    H256(keccak256(&encoded))
}

/// An order bound to its signing domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedData {
    pub domain: Eip712Domain,
    pub order: Order,
}

impl TypedData {
    pub fn new(order: Order, chain_id: u64, verifying_contract: Address) -> Self {
        Self {
            domain: Eip712Domain::limit_order_protocol(chain_id, verifying_contract),
            order,
        }
    }

    /// EIP-712 digest that gets signed.
    pub fn digest(&self) -> H256 {
        let mut preimage = Vec::with_capacity(2 + 64);
        preimage.extend_from_slice(&[0x19, 0x01]);
        preimage.extend_from_slice(self.domain.separator().as_bytes());
        preimage.extend_from_slice(order_struct_hash(&self.order).as_bytes());
        H256(keccak256(&preimage))
    }

    /// Payload for `eth_signTypedData_v4`.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "types": {
                "EIP712Domain": [
                    { "name": "name", "type": "string" },
                    { "name": "version", "type": "string" },
                    { "name": "chainId", "type": "uint256" },
                    { "name": "verifyingContract", "type": "address" },
                ],
                "Order": [
                    { "name": "salt", "type": "uint256" },
                    { "name": "maker", "type": "address" },
                    { "name": "receiver", "type": "address" },
                    { "name": "makerAsset", "type": "address" },
                    { "name": "takerAsset", "type": "address" },
                    { "name": "makingAmount", "type": "uint256" },
                    { "name": "takingAmount", "type": "uint256" },
                    { "name": "makerTraits", "type": "uint256" },
                ],
            },
            "primaryType": "Order",
            "domain": self.domain,
            "message": self.order,
        })
    }
}

/// Order hash for `order` on the given chain and verifying contract.
pub fn hash(order: &Order, chain_id: u64, verifying_contract: Address) -> H256 {
    TypedData::new(order.clone(), chain_id, verifying_contract).digest()
}

// ============================================================================
// COMPACT SIGNATURE
// ============================================================================

/// EIP-2098 compact signature: `vs = s | ((v - 27) << 255)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSignature {
    pub r: H256,
    pub vs: H256,
}

impl OrderSignature {
    /// Packs a 65-byte `r || s || v` signature. `v` may be 0/1 or 27/28.
    pub fn from_rsv(signature: &[u8]) -> Result<Self, SwapError> {
        if signature.len() != 65 {
            return Err(SwapError::SigningRejected(format!(
                "Invalid signature length: expected 65 bytes, got {}",
                signature.len()
            )));
        }

        let parity = match signature[64] {
            0 | 27 => 0u8,
            1 | 28 => 1u8,
            other => {
                return Err(SwapError::SigningRejected(format!(
                    "Invalid recovery byte v={}",
                    other
                )))
            }
        };

        let s = U256::from_big_endian(&signature[32..64]);
        if s > half_order() {
            return Err(SwapError::SigningRejected(
                "Non-canonical signature: s is in the upper half of the curve order".to_string(),
            ));
        }

        let mut vs = [0u8; 32];
        vs.copy_from_slice(&signature[32..64]);
        vs[0] |= parity << 7;

        Ok(Self {
            r: H256::from_slice(&signature[..32]),
            vs: H256(vs),
        })
    }

    /// `s` with the parity bit cleared.
    pub fn s(&self) -> H256 {
        let mut s = self.vs.to_fixed_bytes();
        s[0] &= 0x7f;
        H256(s)
    }

    /// Ethereum-style `v` (27 or 28).
    pub fn v(&self) -> u8 {
        27 + (self.vs.as_bytes()[0] >> 7)
    }

    /// Expanded 65-byte `r || s || v` form.
    pub fn to_rsv(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(65);
        bytes.extend_from_slice(self.r.as_bytes());
        bytes.extend_from_slice(self.s().as_bytes());
        bytes.push(self.v());
        bytes
    }
}

fn half_order() -> U256 {
    U256::from_str_radix(SECP256K1_HALF_ORDER, 16).unwrap_or_else(|_| U256::MAX)
}

/// Requests a signature over the order's typed data and packs it as `{r, vs}`.
pub async fn sign<S: OrderSigner + ?Sized>(
    order: &Order,
    signer: &S,
    chain_id: u64,
    verifying_contract: Address,
) -> Result<OrderSignature, SwapError> {
    let typed_data = TypedData::new(order.clone(), chain_id, verifying_contract);
    let digest = typed_data.digest();
    debug!("Requesting signature for order {:?}", digest);

    let raw = signer.sign_typed_data(&typed_data).await?;
    let signature = OrderSignature::from_rsv(&raw)?;

    info!("Order {:?} signed", digest);
    Ok(signature)
}

/// Recovers the signer address from a digest and a compact signature.
pub fn recover_signer(digest: H256, signature: &OrderSignature) -> Result<Address> {
    let mut rs = [0u8; 64];
    rs[..32].copy_from_slice(signature.r.as_bytes());
    rs[32..].copy_from_slice(signature.s().as_bytes());

    let ecdsa_signature =
        Signature::from_slice(&rs).context("Signature is not a valid secp256k1 (r, s) pair")?;
    let recovery_id = RecoveryId::try_from(signature.v() - 27)
        .map_err(|e| anyhow::anyhow!("Invalid recovery id: {}", e))?;

    let verifying_key =
        VerifyingKey::recover_from_prehash(digest.as_bytes(), &ecdsa_signature, recovery_id)
            .context("Failed to recover public key from signature")?;

    ethereum_address(&verifying_key)
}

/// `keccak256(uncompressed_public_key[1..])[12..]`
pub fn ethereum_address(verifying_key: &VerifyingKey) -> Result<Address> {
    let point = verifying_key.to_encoded_point(false);
    let public_key = point.as_bytes();
    if public_key.len() != 65 || public_key[0] != 0x04 {
        anyhow::bail!("Invalid public key format: expected 65 bytes with 0x04 prefix");
    }
    let hash = keccak256(&public_key[1..]);
    Ok(Address::from_slice(&hash[12..]))
}
