//! DAO Governance: wallet sessions and a typed contract gateway
//!
//! This crate connects a wallet to a single on-chain governance contract on
//! Sepolia and exposes its operations with strong types.
//!
//! # Architecture
//!
//! - **Session Manager**: wallet connection lifecycle, network validation and
//!   switching, ordered change notifications
//! - **Contract Gateway**: proposal and deposit reads, deposit/vote/withdraw
//!   writes that wait for inclusion
//! - **Providers**: the `WalletProvider` boundary, with a JSON-RPC
//!   implementation and an in-memory `MockWallet`
//!
//! # Example
//!
//! ```ignore
//! use dao_governance::{
//!     ConnectionMethod, GovernanceConfig, JsonRpcProvider, SessionManager, WalletConnectors,
//! };
//! use std::sync::Arc;
//!
//! let config = GovernanceConfig::from_env();
//! let signer = Arc::new(JsonRpcProvider::new("http://localhost:8545"));
//! let manager = SessionManager::new(config, WalletConnectors::new().with_remote_signer(signer));
//!
//! manager.connect(ConnectionMethod::RemoteSigner).await?;
//! let gateway = manager.gateway()?;
//!
//! for proposal in gateway.get_all_proposals().await? {
//!     println!("#{} yes={} no={}", proposal.id, proposal.yes_votes, proposal.no_votes);
//! }
//! gateway.deposit("1.5").await?;
//! ```

// Public modules
pub mod abi;
pub mod config;
pub mod error;
pub mod gateway;
pub mod mock;
pub mod network;
pub mod proposal;
pub mod provider;
pub mod rpc;
pub mod session;
pub mod types;
pub mod units;

// Re-exports for convenience
pub use config::GovernanceConfig;
pub use error::{GovernanceError, ProviderError};
pub use gateway::{ContractGateway, DepositAccessor};
pub use mock::{MockProposal, MockWallet};
pub use network::{ChainDescriptor, SEPOLIA_CHAIN_ID};
pub use proposal::Proposal;
pub use provider::{
    CallRequest, ConnectionMethod, ProviderEvent, TransactionReceipt, TransactionRequest,
    WalletConnectors, WalletProvider,
};
pub use rpc::JsonRpcProvider;
pub use session::{Session, SessionManager, SessionStatus, Subscription};
pub use types::{Address, TxHash};
pub use units::TokenAmount;

// Common result type
pub type Result<T> = std::result::Result<T, GovernanceError>;
