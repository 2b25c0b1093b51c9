//! Minimal Solidity ABI helpers
//!
//! Only what the swap core needs: function selectors, static 32-byte words for
//! `address` / `uint256` / `bytes32` arguments, and decoding of single-word
//! return values.

use anyhow::Result;
use ethereum_types::{Address, H256, U256};
use sha3::{Digest, Keccak256};

/// Size of one ABI word in bytes.
pub const WORD: usize = 32;

/// Keccak-256 of arbitrary bytes.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// First four bytes of keccak256 of the canonical function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Left-pads an address to a 32-byte word.
pub fn address_word(address: &Address) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

/// Big-endian 32-byte word of a uint256.
pub fn u256_word(value: &U256) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    value.to_big_endian(&mut word);
    word
}

/// Static argument of a contract call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Uint(U256),
    FixedBytes(H256),
}

impl Token {
    fn word(&self) -> [u8; WORD] {
        match self {
            Token::Address(address) => address_word(address),
            Token::Uint(value) => u256_word(value),
            Token::FixedBytes(bytes) => bytes.to_fixed_bytes(),
        }
    }
}

/// Encodes calldata for a function taking only static arguments.
pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + args.len() * WORD);
    data.extend_from_slice(&selector(signature));
    for arg in args {
        data.extend_from_slice(&arg.word());
    }
    data
}

/// Decodes a `uint256` return value.
pub fn decode_u256(data: &[u8]) -> Result<U256> {
    if data.len() < WORD {
        anyhow::bail!(
            "Return data too short for uint256: expected {} bytes, got {}",
            WORD,
            data.len()
        );
    }
    Ok(U256::from_big_endian(&data[..WORD]))
}

/// Decodes an `address` return value, rejecting dirty upper bytes.
pub fn decode_address(data: &[u8]) -> Result<Address> {
    if data.len() < WORD {
        anyhow::bail!(
            "Return data too short for address: expected {} bytes, got {}",
            WORD,
            data.len()
        );
    }
    if data[..12].iter().any(|byte| *byte != 0) {
        anyhow::bail!("Return word is not a valid address: 0x{}", hex::encode(&data[..WORD]));
    }
    Ok(Address::from_slice(&data[12..WORD]))
}

/// Parses a `0x`-prefixed (or bare) hex string into bytes.
pub fn decode_hex(value: &str) -> Result<Vec<u8>> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(stripped).map_err(|e| anyhow::anyhow!("Invalid hex '{}': {}", value, e))
}
