// Contract Gateway
//
// Typed access to the governance contract for one connected account:
// - Reads: proposal count, single proposal, all proposals, deposit
// - Writes: deposit, vote, withdraw (submit, then wait for inclusion)
//
// Writes for one account must be issued one at a time by the caller; the
// wallet serializes nonces and nothing here queues for it.

use futures::future::join_all;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::abi::{self, Decoder, Token};
use crate::config::GovernanceConfig;
use crate::error::ProviderError;
use crate::proposal::Proposal;
use crate::provider::{CallRequest, TransactionReceipt, TransactionRequest, WalletProvider};
use crate::types::{Address, TxHash};
use crate::units::TokenAmount;
use crate::GovernanceError;

/// Contract read that answers deposit queries
///
/// Deployed contracts expose either `userInfo(address)` or the older
/// `getDeposit(address)`; never assume both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositAccessor {
    UserInfo,
    GetDeposit,
}

impl DepositAccessor {
    fn selector(&self) -> abi::Selector {
        match self {
            Self::UserInfo => abi::USER_INFO,
            Self::GetDeposit => abi::GET_DEPOSIT,
        }
    }
}

impl FromStr for DepositAccessor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "userInfo" | "user_info" => Ok(Self::UserInfo),
            "getDeposit" | "get_deposit" => Ok(Self::GetDeposit),
            other => Err(format!("unknown deposit accessor: {}", other)),
        }
    }
}

/// How long to wait for a submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl ConfirmationPolicy {
    pub fn from_config(config: &GovernanceConfig) -> Self {
        Self {
            timeout: config.confirmation_timeout,
            poll_interval: config.receipt_poll_interval,
        }
    }
}

/// Contract Gateway bound to one account on the required chain
///
/// Cheap to clone; the provider is shared.
#[derive(Clone)]
pub struct ContractGateway {
    provider: Arc<dyn WalletProvider>,
    account: Address,
    contract: Address,
    required_chain_id: u64,
    deposit_accessor: DepositAccessor,
    confirmation: ConfirmationPolicy,
}

impl ContractGateway {
    /// Bind a gateway to `account`
    ///
    /// Normally obtained through `SessionManager::gateway()`, which guarantees
    /// the session is connected on the required chain.
    pub fn new(provider: Arc<dyn WalletProvider>, account: Address, config: &GovernanceConfig) -> Self {
        Self {
            provider,
            account,
            contract: config.contract_address,
            required_chain_id: config.chain_id(),
            deposit_accessor: config.deposit_accessor,
            confirmation: ConfirmationPolicy::from_config(config),
        }
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Number of proposals recorded on-chain
    pub async fn proposal_count(&self) -> Result<u64, GovernanceError> {
        self.ensure_chain().await?;
        self.read_proposal_count().await
    }

    /// One proposal; `NotFound` unless `id < proposal_count()`
    pub async fn get_proposal(&self, id: u64) -> Result<Proposal, GovernanceError> {
        self.ensure_chain().await?;
        let count = self.read_proposal_count().await?;
        if id >= count {
            return Err(GovernanceError::NotFound(id));
        }
        self.read_proposal(id).await
    }

    /// Every proposal, fetched concurrently
    ///
    /// All-or-nothing: if any fetch fails the result is `PartialFetchFailure`
    /// naming the lowest failing index.
    pub async fn get_all_proposals(&self) -> Result<Vec<Proposal>, GovernanceError> {
        self.ensure_chain().await?;
        let count = self.read_proposal_count().await?;
        log::debug!("📋 Fetching {} proposals", count);

        let results = join_all((0..count).map(|id| self.read_proposal(id))).await;

        let mut proposals = Vec::with_capacity(results.len());
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(proposal) => proposals.push(proposal),
                Err(e) => {
                    log::error!("   ❌ Proposal {} failed to load: {}", index, e);
                    return Err(GovernanceError::partial_fetch(index as u64, e));
                }
            }
        }
        Ok(proposals)
    }

    /// Current deposit of `account`
    pub async fn get_deposit(&self, account: Address) -> Result<TokenAmount, GovernanceError> {
        self.ensure_chain().await?;
        let data = abi::encode_call(self.deposit_accessor.selector(), &[Token::Address(account)]);
        let output = self.read(data).await?;
        Ok(TokenAmount::from_base_units(Decoder::new(&output).uint(0)?))
    }

    /// Deposit of the bound account
    pub async fn my_deposit(&self) -> Result<TokenAmount, GovernanceError> {
        self.get_deposit(self.account).await
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Deposit `amount` governance tokens (decimal string, e.g. `"1.5"`)
    pub async fn deposit(&self, amount: &str) -> Result<TransactionReceipt, GovernanceError> {
        let amount = TokenAmount::parse_positive(amount)?;
        self.ensure_chain().await?;

        log::info!("💰 Depositing {} tokens from {}", amount, self.account);
        let data = abi::encode_call(abi::DEPOSIT, &[Token::Uint(amount.base_units())]);
        self.submit(data).await
    }

    /// Vote on `proposal_id` with `amount` of deposited weight
    ///
    /// Only the proposal id is checked up front; whether the voting window
    /// is still open is the contract's decision and comes back as a revert.
    pub async fn vote(
        &self,
        proposal_id: u64,
        support: bool,
        amount: &str,
    ) -> Result<TransactionReceipt, GovernanceError> {
        let amount = TokenAmount::parse_positive(amount)?;
        self.ensure_chain().await?;

        let count = self.read_proposal_count().await?;
        if proposal_id >= count {
            return Err(GovernanceError::NotFound(proposal_id));
        }

        log::info!(
            "🗳️  Voting {} on proposal {} with {} tokens",
            if support { "YES" } else { "NO" },
            proposal_id,
            amount
        );
        let data = abi::encode_call(
            abi::VOTE,
            &[
                Token::Uint(proposal_id as u128),
                Token::Bool(support),
                Token::Uint(amount.base_units()),
            ],
        );
        self.submit(data).await
    }

    /// Withdraw the whole deposit of the bound account
    pub async fn withdraw(&self) -> Result<TransactionReceipt, GovernanceError> {
        self.ensure_chain().await?;

        log::info!("🏧 Withdrawing deposit of {}", self.account);
        self.submit(abi::encode_call(abi::WITHDRAW, &[])).await
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn ensure_chain(&self) -> Result<(), GovernanceError> {
        let chain_id = self.provider.chain_id().await?;
        if chain_id != self.required_chain_id {
            log::warn!(
                "⚠️  Provider is on chain {}, refusing to operate (need {})",
                chain_id,
                self.required_chain_id
            );
            return Err(GovernanceError::WrongNetwork {
                expected: self.required_chain_id,
            });
        }
        Ok(())
    }

    async fn read(&self, data: Vec<u8>) -> Result<Vec<u8>, GovernanceError> {
        let request = CallRequest {
            from: Some(self.account),
            to: self.contract,
            data,
        };
        Ok(self.provider.call(&request).await?)
    }

    async fn read_proposal_count(&self) -> Result<u64, GovernanceError> {
        let output = self
            .read(abi::encode_call(abi::GET_PROPOSALS_COUNT, &[]))
            .await?;
        Decoder::new(&output).uint64(0)
    }

    async fn read_proposal(&self, id: u64) -> Result<Proposal, GovernanceError> {
        let output = self
            .read(abi::encode_call(abi::GET_PROPOSAL, &[Token::Uint(id as u128)]))
            .await?;
        Proposal::decode(id, &output)
    }

    /// Submit one transaction and wait for it to be included
    async fn submit(&self, data: Vec<u8>) -> Result<TransactionReceipt, GovernanceError> {
        let request = TransactionRequest {
            from: self.account,
            to: self.contract,
            data,
        };

        let tx_hash = match self.provider.send_transaction(&request).await {
            Ok(hash) => hash,
            Err(ProviderError::Reverted { reason }) => {
                log::error!("   ❌ Rejected before submission: {:?}", reason);
                return Err(GovernanceError::TransactionReverted {
                    tx_hash: None,
                    reason,
                });
            }
            Err(e) => {
                log::error!("   ❌ Submission failed: {}", e);
                return Err(e.into());
            }
        };
        log::info!("   📤 Submitted {}", tx_hash);

        let receipt = self.wait_for_receipt(tx_hash).await?;
        if !receipt.status {
            let reason = self.revert_reason(&request).await;
            log::error!("   ❌ Reverted in block {}: {:?}", receipt.block_number, reason);
            return Err(GovernanceError::TransactionReverted {
                tx_hash: Some(tx_hash),
                reason,
            });
        }

        log::info!("   ✅ Included in block {}", receipt.block_number);
        Ok(receipt)
    }

    /// Poll for the receipt until the confirmation timeout
    ///
    /// Giving up here does not cancel anything: the transaction stays
    /// pending on the network and may still be included later.
    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TransactionReceipt, GovernanceError> {
        let deadline = Instant::now() + self.confirmation.timeout;
        loop {
            match self.provider.transaction_receipt(&tx_hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {}
                Err(e) => log::warn!("   Receipt query for {} failed: {}", tx_hash, e),
            }

            let now = Instant::now();
            if now >= deadline {
                log::error!("   ⏰ {} not included within {:?}", tx_hash, self.confirmation.timeout);
                return Err(GovernanceError::TransactionTimeout(tx_hash));
            }
            sleep(self.confirmation.poll_interval.min(deadline - now)).await;
        }
    }

    /// Replay a failed transaction as a call to recover its revert reason
    async fn revert_reason(&self, request: &TransactionRequest) -> Option<String> {
        let replay = CallRequest {
            from: Some(request.from),
            to: request.to,
            data: request.data.clone(),
        };
        match self.provider.call(&replay).await {
            Err(ProviderError::Reverted { reason }) => reason,
            Err(e) => {
                log::debug!("   Revert replay failed: {}", e);
                None
            }
            Ok(_) => None,
        }
    }
}

impl fmt::Debug for ContractGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractGateway")
            .field("account", &self.account)
            .field("contract", &self.contract)
            .field("required_chain_id", &self.required_chain_id)
            .field("deposit_accessor", &self.deposit_accessor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deposit_accessor_parsing() {
        assert_eq!("userInfo".parse::<DepositAccessor>().unwrap(), DepositAccessor::UserInfo);
        assert_eq!(" getDeposit ".parse::<DepositAccessor>().unwrap(), DepositAccessor::GetDeposit);
        assert!("balanceOf".parse::<DepositAccessor>().is_err());
    }

    #[test]
    fn test_deposit_accessor_selectors() {
        assert_eq!(DepositAccessor::UserInfo.selector(), abi::USER_INFO);
        assert_eq!(DepositAccessor::GetDeposit.selector(), abi::GET_DEPOSIT);
    }
}
