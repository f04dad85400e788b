//! Wallet provider boundary
//!
//! A provider is the capability object the session manager is constructed
//! with: account authorization, chain inspection and switching, contract
//! reads and transaction submission, plus a push channel for account and
//! chain changes. Injecting it (rather than reaching for a process-wide
//! handle) is what lets the session manager run against `MockWallet` in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::GovernanceConfig;
use crate::error::ProviderError;
use crate::network::ChainDescriptor;
use crate::rpc::JsonRpcProvider;
use crate::types::{Address, TxHash};

/// Capacity of provider event channels
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// How the user connects a wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionMethod {
    /// Browser-injected wallet (MetaMask and friends)
    InjectedWallet,
    /// Wallet reached over a remote signing bridge (WalletConnect style)
    RemoteSigner,
}

impl fmt::Display for ConnectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InjectedWallet => write!(f, "injected wallet"),
            Self::RemoteSigner => write!(f, "remote signer"),
        }
    }
}

/// Push notifications from the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// Authorized accounts changed; empty means the wallet locked or revoked
    AccountsChanged(Vec<Address>),
    /// The wallet moved to another chain
    ChainChanged(u64),
    /// The provider dropped the connection
    Disconnected,
}

/// Read-only contract call (`eth_call`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub data: Vec<u8>,
}

/// State-changing contract call (`eth_sendTransaction`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    pub data: Vec<u8>,
}

/// Inclusion record of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: TxHash,
    pub block_number: u64,
    /// `false` when execution reverted
    pub status: bool,
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Ask the user to authorize accounts; first entry is the active one
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError>;

    /// Currently selected chain
    async fn chain_id(&self) -> Result<u64, ProviderError>;

    /// Ask the wallet to move to `chain_id`
    ///
    /// Fails with `ProviderError::UnrecognizedChain` if the wallet has never
    /// heard of the chain.
    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError>;

    /// Register a chain with the wallet
    async fn add_chain(&self, chain: &ChainDescriptor) -> Result<(), ProviderError>;

    /// Execute a read-only call against the latest block
    async fn call(&self, request: &CallRequest) -> Result<Vec<u8>, ProviderError>;

    /// Sign and submit a transaction, returning its hash once accepted
    async fn send_transaction(&self, request: &TransactionRequest)
        -> Result<TxHash, ProviderError>;

    /// Receipt of a transaction, `None` while still pending
    async fn transaction_receipt(
        &self,
        tx_hash: &TxHash,
    ) -> Result<Option<TransactionReceipt>, ProviderError>;

    /// Subscribe to account and chain change notifications
    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;

    /// Tear the connection down on the provider side
    async fn disconnect(&self) -> Result<(), ProviderError>;
}

/// Installed providers, one slot per connection method
#[derive(Clone, Default)]
pub struct WalletConnectors {
    injected: Option<Arc<dyn WalletProvider>>,
    remote_signer: Option<Arc<dyn WalletProvider>>,
}

impl WalletConnectors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_injected(mut self, provider: Arc<dyn WalletProvider>) -> Self {
        self.injected = Some(provider);
        self
    }

    pub fn with_remote_signer(mut self, provider: Arc<dyn WalletProvider>) -> Self {
        self.remote_signer = Some(provider);
        self
    }

    /// Connectors described by `config`
    ///
    /// With `signer_url` set, a `JsonRpcProvider` on that endpoint becomes the
    /// remote signer, polled for account and chain changes every
    /// `event_poll_interval`. The poller stops once the provider is dropped.
    /// An injected wallet is host-provided and added with `with_injected`.
    pub fn from_config(config: &GovernanceConfig) -> Self {
        let Some(url) = config.signer_url.as_deref() else {
            return Self::new();
        };

        log::info!("🔗 Remote signer at {}", url);
        let signer = Arc::new(
            JsonRpcProvider::new(url).with_authorization_timeout(config.authorization_timeout),
        );
        match tokio::runtime::Handle::try_current() {
            Ok(_) => drop(signer.spawn_event_poller(config.event_poll_interval)),
            Err(_) => log::warn!("⚠️  No tokio runtime; remote signer will not be polled"),
        }
        Self::new().with_remote_signer(signer)
    }

    /// Provider for `method`, if one is installed
    pub fn get(&self, method: ConnectionMethod) -> Option<Arc<dyn WalletProvider>> {
        match method {
            ConnectionMethod::InjectedWallet => self.injected.clone(),
            ConnectionMethod::RemoteSigner => self.remote_signer.clone(),
        }
    }

}

impl fmt::Debug for WalletConnectors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletConnectors")
            .field("injected", &self.injected.is_some())
            .field("remote_signer", &self.remote_signer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_signer_url_means_no_remote_signer() {
        let connectors = WalletConnectors::from_config(&GovernanceConfig::default());
        assert!(connectors.get(ConnectionMethod::RemoteSigner).is_none());
        assert!(connectors.get(ConnectionMethod::InjectedWallet).is_none());
    }

    #[tokio::test]
    async fn test_signer_url_installs_remote_signer() {
        let config = GovernanceConfig {
            signer_url: Some("http://127.0.0.1:1".to_string()),
            ..GovernanceConfig::default()
        };
        let connectors = WalletConnectors::from_config(&config);
        assert!(connectors.get(ConnectionMethod::RemoteSigner).is_some());
        assert!(connectors.get(ConnectionMethod::InjectedWallet).is_none());
    }
}
