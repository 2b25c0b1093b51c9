//! Unit tests for configuration loading and validation

use fusion_swap::config::SwapConfig;
use fusion_swap::{SupportedChain, NATIVE_TOKEN};
use std::time::Duration;

#[path = "helpers.rs"]
mod test_helpers;
use test_helpers::{addr, DUMMY_LOP_ADDR, MONAD_CHAIN_ID, SEPOLIA_CHAIN_ID};

const TEMPLATE: &str = include_str!("../config/swap.template.toml");

const MINIMAL: &str = r#"
[service]
wallet_rpc_url = "http://127.0.0.1:8545"
settlement_url = "http://127.0.0.1:3333"

[[chain]]
chain_id = 11155111
rpc_url = "http://127.0.0.1:8545"
limit_order_protocol = "0x111111125421cA6dc452d289314280a0f8842A65"
escrow_factory = "0x239d9eb2418e5B4333a7976c3c3fE936DC6E6613"
proxy_asset = "0x00000000000000000000000000000000000000a1"
"#;

fn assert_rejected(content: &str, needle: &str) {
    let err = SwapConfig::from_toml(content).unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains(needle), "expected '{}' in: {}", needle, message);
}

// ============================================================================
// PARSING
// ============================================================================

/// 1. Test: Template Parses
/// Verifies that the shipped template is a valid configuration with both chains and all assets.
/// Why: Users start from the template; it must never drift out of sync with the schema.
#[test]
fn test_template_parses_and_validates() {
    let config = SwapConfig::from_toml(TEMPLATE).unwrap();

    assert_eq!(config.chains.len(), 2);
    assert_eq!(config.assets.len(), 3);
    assert_eq!(config.chain(SEPOLIA_CHAIN_ID).unwrap().limit_order_protocol, addr(DUMMY_LOP_ADDR));
    assert_eq!(config.chain(MONAD_CHAIN_ID).unwrap().native_token, NATIVE_TOKEN);

    let registry = config.registry().unwrap();
    assert_eq!(registry.chains().count(), 2);
    assert!(registry.get(SupportedChain::MonadTestnet).is_ok());
}

/// 2. Test: Defaults For Omitted Sections
/// Verifies that omitted timeouts, signer and poll intervals fall back to defaults.
/// Why: A minimal file should be enough to run a swap.
#[test]
fn test_minimal_config_defaults() {
    let config = SwapConfig::from_toml(MINIMAL).unwrap();
    let timeouts = config.timeouts.to_timeouts();

    assert_eq!(timeouts.signature, Duration::from_secs(120));
    assert_eq!(timeouts.lock, Duration::from_secs(900));
    assert_eq!(config.service.settlement_poll_interval_ms, 2000);
    assert_eq!(config.signer.private_key_env, "FUSION_SWAP_PRIVATE_KEY");
    assert_eq!(config.chains[0].native_token, NATIVE_TOKEN);
    assert!(config.assets.is_empty());
}

/// 3. Test: Case-Insensitive Asset Lookup
/// Verifies that assets are found by chain and symbol regardless of case.
/// Why: The CLI takes symbols as typed by the user.
#[test]
fn test_asset_lookup() {
    let config = SwapConfig::from_toml(TEMPLATE).unwrap();

    let mdai = config.asset(MONAD_CHAIN_ID, "MDAI").unwrap();
    assert_eq!(mdai.symbol, "mDAI");
    assert_eq!(mdai.decimals, 18);
    assert!(config.asset(SEPOLIA_CHAIN_ID, "mDAI").is_none());
}

// ============================================================================
// VALIDATION
// ============================================================================

/// 4. Test: Duplicate Chain Rejected
/// Verifies that the same chain id configured twice is an error.
/// Why: Two contract sets for one chain would make the verifying contract ambiguous.
#[test]
fn test_duplicate_chain_rejected() {
    let duplicated = format!("{}\n{}", MINIMAL, &MINIMAL[MINIMAL.find("[[chain]]").unwrap()..]);
    assert_rejected(&duplicated, "configured more than once");
}

/// 5. Test: Unsupported Chain Rejected
/// Verifies that a chain id outside the supported set is an error.
/// Why: Only supported chains have known contract deployments.
#[test]
fn test_unsupported_chain_rejected() {
    assert_rejected(&MINIMAL.replace("11155111", "1"), "not a supported chain");
}

/// 6. Test: Zero Contract Address Rejected
/// Verifies that a zero escrow factory address is an error.
/// Why: Calls to the zero address succeed with empty data and would mask a missing deployment.
#[test]
fn test_zero_address_rejected() {
    let zeroed = MINIMAL.replace(
        "0x239d9eb2418e5B4333a7976c3c3fE936DC6E6613",
        "0x0000000000000000000000000000000000000000",
    );
    assert_rejected(&zeroed, "zero escrow_factory");
}

/// 7. Test: Zero Timeout Rejected
/// Verifies that a zero phase timeout is an error.
/// Why: A zero timeout fails every swap immediately.
#[test]
fn test_zero_timeout_rejected() {
    let content = format!("{}\n[timeouts]\nlock_secs = 0\n", MINIMAL);
    assert_rejected(&content, "timeouts.lock_secs");
}

/// 8. Test: Asset On Unconfigured Chain Rejected
/// Verifies that an asset pointing at a chain without a [[chain]] entry is an error.
/// Why: Such an asset could be selected but never swapped.
#[test]
fn test_asset_on_unknown_chain_rejected() {
    let content = format!(
        "{}\n[[asset]]\nchain_id = 10143\nsymbol = \"MON\"\naddress = \"0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE\"\n",
        MINIMAL
    );
    assert_rejected(&content, "unconfigured chain 10143");
}

/// 9. Test: No Chains Rejected
/// Verifies that a configuration without chains is an error.
/// Why: Nothing could be swapped.
#[test]
fn test_no_chains_rejected() {
    let content = &MINIMAL[..MINIMAL.find("[[chain]]").unwrap()];
    assert_rejected(content, "At least one [[chain]]");
}

// ============================================================================
// LOADING
// ============================================================================

/// 10. Test: Missing File Points At Template
/// Verifies that a missing config file yields instructions to copy the template.
/// Why: First-time users otherwise get a bare "file not found".
#[test]
fn test_missing_file_mentions_template() {
    let err = SwapConfig::load_from_path(Some("/nonexistent/fusion-swap.toml")).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("not found"));
    assert!(message.contains("config/swap.template.toml"));
}

/// 11. Test: Load From Explicit Path
/// Verifies that an explicit path is read and validated.
/// Why: The CLI passes --config straight through.
#[test]
fn test_load_from_explicit_path() {
    let path = std::env::temp_dir().join(format!("fusion-swap-{}.toml", uuid::Uuid::new_v4()));
    std::fs::write(&path, MINIMAL).unwrap();

    let config = SwapConfig::load_from_path(path.to_str()).unwrap();
    assert_eq!(config.chains[0].chain_id, SEPOLIA_CHAIN_ID);

    std::fs::remove_file(&path).unwrap();
}
