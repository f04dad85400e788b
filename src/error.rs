//! Error types for DAO governance operations
//!
//! `GovernanceError` is what callers of the session manager and the contract
//! gateway see. `ProviderError` is what a wallet provider reports at the
//! boundary; it converts into `GovernanceError` where no more specific mapping
//! applies.

use thiserror::Error;

use crate::provider::ConnectionMethod;
use crate::types::TxHash;

/// Core error type for session and gateway operations
///
/// Cloneable so the last failure can be kept inside a session snapshot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GovernanceError {
    /// No provider is installed for the requested connection method
    #[error("No wallet provider available for {0}")]
    WalletUnavailable(ConnectionMethod),

    /// The user declined account authorization or a transaction prompt
    #[error("Request rejected by user")]
    UserRejected,

    /// The wallet is not (and could not be moved) on the required chain
    #[error("Wrong network: chain {expected} is required")]
    WrongNetwork { expected: u64 },

    /// The wallet did not answer the authorization request in time
    #[error("Timed out waiting for the wallet")]
    Timeout,

    /// Proposal id outside `[0, proposalCount)`
    #[error("Proposal {0} not found")]
    NotFound(u64),

    /// Amount is non-positive or not a valid decimal
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// The transaction was rejected by the contract
    #[error(
        "Transaction reverted: {}",
        .reason.as_deref().unwrap_or("no reason given")
    )]
    TransactionReverted {
        tx_hash: Option<TxHash>,
        reason: Option<String>,
    },

    /// The transaction was submitted but not seen in a block in time
    #[error("Transaction {0} was not confirmed in time")]
    TransactionTimeout(TxHash),

    /// One proposal of a bulk fetch failed; nothing partial is returned
    #[error("Failed to fetch proposal {index}: {source}")]
    PartialFetchFailure {
        index: u64,
        source: Box<GovernanceError>,
    },

    /// A gateway was requested without a connected session
    #[error("Wallet is not connected")]
    NotConnected,

    /// `connect` was called while another attempt is still running
    #[error("A connection attempt is already in progress")]
    ConnectInProgress,

    /// Transport or RPC level failure reported by the provider
    #[error("Provider error: {0}")]
    Provider(String),

    /// Malformed data from the provider or the contract
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl GovernanceError {
    /// Create an invalid amount error
    pub fn invalid_amount(msg: impl Into<String>) -> Self {
        Self::InvalidAmount(msg.into())
    }

    /// Create an invalid response error
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Wrap the failure of proposal `index` during a bulk fetch
    pub fn partial_fetch(index: u64, source: GovernanceError) -> Self {
        Self::PartialFetchFailure {
            index,
            source: Box::new(source),
        }
    }
}

/// Errors reported by a wallet provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// EIP-1193 code 4001
    #[error("User rejected the request")]
    UserRejected,

    /// EIP-1193 code 4902: the wallet does not know this chain
    #[error("Unrecognized chain {0}")]
    UnrecognizedChain(u64),

    /// Contract execution reverted
    #[error(
        "Execution reverted: {}",
        .reason.as_deref().unwrap_or("no reason given")
    )]
    Reverted { reason: Option<String> },

    /// Any other JSON-RPC error object
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The request never reached the wallet or the reply was lost
    #[error("Transport error: {0}")]
    Transport(String),

    /// The wallet answered with something we could not decode
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<ProviderError> for GovernanceError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::UserRejected => GovernanceError::UserRejected,
            ProviderError::UnrecognizedChain(chain_id) => {
                GovernanceError::WrongNetwork { expected: chain_id }
            }
            ProviderError::Reverted { reason } => GovernanceError::TransactionReverted {
                tx_hash: None,
                reason,
            },
            ProviderError::InvalidResponse(msg) => GovernanceError::InvalidResponse(msg),
            other => GovernanceError::Provider(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverted_display_includes_reason() {
        let err = GovernanceError::TransactionReverted {
            tx_hash: None,
            reason: Some("Voting closed".to_string()),
        };
        assert_eq!(err.to_string(), "Transaction reverted: Voting closed");

        let err = GovernanceError::TransactionReverted {
            tx_hash: None,
            reason: None,
        };
        assert_eq!(err.to_string(), "Transaction reverted: no reason given");
    }

    #[test]
    fn test_partial_fetch_carries_index_and_source() {
        let err = GovernanceError::partial_fetch(2, GovernanceError::Provider("boom".into()));
        match &err {
            GovernanceError::PartialFetchFailure { index, source } => {
                assert_eq!(*index, 2);
                assert_eq!(**source, GovernanceError::Provider("boom".into()));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().contains("proposal 2"));
    }

    #[test]
    fn test_provider_error_conversion() {
        assert_eq!(
            GovernanceError::from(ProviderError::UserRejected),
            GovernanceError::UserRejected
        );
        assert_eq!(
            GovernanceError::from(ProviderError::Reverted {
                reason: Some("nope".into())
            }),
            GovernanceError::TransactionReverted {
                tx_hash: None,
                reason: Some("nope".into())
            }
        );
        assert!(matches!(
            GovernanceError::from(ProviderError::Transport("down".into())),
            GovernanceError::Provider(_)
        ));
    }
}
