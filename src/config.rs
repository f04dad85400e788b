/// Governance client configuration from environment variables
///
/// Controls which RPC endpoint and contract the client talks to, which
/// contract read backs the deposit query, and the timing of authorization,
/// confirmation and provider polling. Defaults to the deployed Sepolia
/// contract.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::gateway::DepositAccessor;
use crate::network::{ChainDescriptor, SEPOLIA_PUBLIC_RPC};
use crate::types::Address;

/// Address of the deployed governance contract on Sepolia
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x64b2428983d5ab66ad0849b93d83113b980ccf32";

#[derive(Clone, Debug)]
pub struct GovernanceConfig {
    /// Required network; nothing runs against any other chain
    pub chain: ChainDescriptor,
    /// Governance contract address
    pub contract_address: Address,
    /// Which contract read answers deposit queries
    pub deposit_accessor: DepositAccessor,
    /// Optional JSON-RPC endpoint of a remote signer
    pub signer_url: Option<String>,
    /// How long the wallet may take to authorize accounts
    pub authorization_timeout: Duration,
    /// How long a submitted transaction may take to be included
    pub confirmation_timeout: Duration,
    /// Receipt polling interval while waiting for inclusion
    pub receipt_poll_interval: Duration,
    /// Provider polling interval for account and chain changes
    pub event_poll_interval: Duration,
}

impl GovernanceConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `DAO_RPC_URL`: Sepolia RPC endpoint (default: Alchemy if `ALCHEMY_KEY`
    ///   is set, the public Sepolia RPC otherwise)
    /// - `DAO_CONTRACT_ADDRESS`: governance contract address
    /// - `DAO_DEPOSIT_ACCESSOR`: "userInfo" (default) or "getDeposit"
    /// - `DAO_SIGNER_URL`: remote signer JSON-RPC endpoint (optional)
    /// - `DAO_AUTH_TIMEOUT_SECS`: authorization timeout (default 60)
    /// - `DAO_CONFIRMATION_TIMEOUT_SECS`: inclusion timeout (default 300)
    /// - `DAO_RECEIPT_POLL_MS`: receipt polling interval (default 2000)
    /// - `DAO_POLL_INTERVAL_MS`: provider event polling interval (default 12000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let rpc_url = env::var("DAO_RPC_URL").unwrap_or_else(|_| match env::var("ALCHEMY_KEY") {
            Ok(key) if !key.is_empty() => {
                log::info!("📡 RPC URL: Alchemy Sepolia");
                format!("https://eth-sepolia.g.alchemy.com/v2/{}", key)
            }
            _ => {
                log::info!("📡 RPC URL: {} (public default)", SEPOLIA_PUBLIC_RPC);
                SEPOLIA_PUBLIC_RPC.to_string()
            }
        });

        let contract_address = match env::var("DAO_CONTRACT_ADDRESS") {
            Ok(raw) => Address::from_str(raw.trim()).unwrap_or_else(|e| {
                log::warn!("⚠️  {}, using default contract", e);
                defaults.contract_address
            }),
            Err(_) => defaults.contract_address,
        };
        log::info!("📜 Governance contract: {}", contract_address);

        let deposit_accessor = match env::var("DAO_DEPOSIT_ACCESSOR") {
            Ok(raw) => DepositAccessor::from_str(&raw).unwrap_or_else(|_| {
                log::warn!("⚠️  Unknown deposit accessor '{}', defaulting to userInfo", raw);
                DepositAccessor::UserInfo
            }),
            Err(_) => defaults.deposit_accessor,
        };

        let signer_url = env::var("DAO_SIGNER_URL").ok().filter(|url| !url.is_empty());
        if let Some(ref url) = signer_url {
            log::info!("🔗 Remote signer URL: {}", url);
        }

        Self {
            chain: ChainDescriptor::sepolia(rpc_url),
            contract_address,
            deposit_accessor,
            signer_url,
            authorization_timeout: duration_var(
                "DAO_AUTH_TIMEOUT_SECS",
                Duration::from_secs,
                defaults.authorization_timeout,
            ),
            confirmation_timeout: duration_var(
                "DAO_CONFIRMATION_TIMEOUT_SECS",
                Duration::from_secs,
                defaults.confirmation_timeout,
            ),
            receipt_poll_interval: duration_var(
                "DAO_RECEIPT_POLL_MS",
                Duration::from_millis,
                defaults.receipt_poll_interval,
            ),
            event_poll_interval: duration_var(
                "DAO_POLL_INTERVAL_MS",
                Duration::from_millis,
                defaults.event_poll_interval,
            ),
        }
    }

    /// Required chain id
    pub fn chain_id(&self) -> u64 {
        self.chain.chain_id
    }
}

impl Default for GovernanceConfig {
    /// Default configuration (Sepolia, deployed contract)
    fn default() -> Self {
        Self {
            chain: ChainDescriptor::sepolia(SEPOLIA_PUBLIC_RPC),
            contract_address: Address::from_str(DEFAULT_CONTRACT_ADDRESS)
                .unwrap_or(Address::ZERO),
            deposit_accessor: DepositAccessor::UserInfo,
            signer_url: None,
            authorization_timeout: Duration::from_secs(60),
            confirmation_timeout: Duration::from_secs(300),
            receipt_poll_interval: Duration::from_millis(2000),
            event_poll_interval: Duration::from_millis(12_000),
        }
    }
}

fn duration_var(name: &str, unit: fn(u64) -> Duration, default: Duration) -> Duration {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(value) => unit(value),
            Err(_) => {
                log::warn!("⚠️  Invalid {} '{}', using {:?}", name, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::SEPOLIA_CHAIN_ID;

    #[test]
    fn test_default_is_sepolia() {
        let config = GovernanceConfig::default();
        assert_eq!(config.chain_id(), SEPOLIA_CHAIN_ID);
        assert_eq!(config.contract_address.to_string(), DEFAULT_CONTRACT_ADDRESS);
        assert_eq!(config.deposit_accessor, DepositAccessor::UserInfo);
        assert_eq!(config.event_poll_interval, Duration::from_secs(12));
    }

    #[test]
    fn test_duration_var_falls_back_on_garbage() {
        std::env::set_var("DAO_TEST_DURATION_GARBAGE", "soon");
        let value = duration_var(
            "DAO_TEST_DURATION_GARBAGE",
            Duration::from_secs,
            Duration::from_secs(7),
        );
        assert_eq!(value, Duration::from_secs(7));

        std::env::set_var("DAO_TEST_DURATION_OK", "250");
        let value = duration_var("DAO_TEST_DURATION_OK", Duration::from_millis, Duration::ZERO);
        assert_eq!(value, Duration::from_millis(250));
    }
}
