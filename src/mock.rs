// In-memory wallet provider with a simulated governance contract
//
// Behaves like an injected wallet sitting on top of a node that hosts the
// governance contract:
// - Wallet side: authorization, chain switching, known chains, push events
// - Contract side: proposals, deposits, votes, withdrawals, reverts
//
// Every provider call is recorded so tests can assert what went over the wire.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

use crate::abi::{self, Decoder, Token};
use crate::error::ProviderError;
use crate::network::ChainDescriptor;
use crate::provider::{
    CallRequest, ProviderEvent, TransactionReceipt, TransactionRequest, WalletProvider,
    EVENT_CHANNEL_CAPACITY,
};
use crate::types::{Address, TxHash};
use crate::units::TokenAmount;

/// Ethereum mainnet, known to every wallet
const MAINNET_CHAIN_ID: u64 = 1;

/// One proposal as stored by the simulated contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockProposal {
    pub call_data: Vec<u8>,
    pub target_contract: Address,
    pub start_time: u64,
    pub end_time: u64,
    pub yes_votes: u128,
    pub no_votes: u128,
    pub executed: bool,
    pub finished: bool,
}

impl MockProposal {
    /// Open proposal spanning `[start_time, end_time)` with no votes
    pub fn open(start_time: u64, end_time: u64) -> Self {
        Self {
            call_data: Vec::new(),
            target_contract: Address::ZERO,
            start_time,
            end_time,
            yes_votes: 0,
            no_votes: 0,
            executed: false,
            finished: false,
        }
    }

    /// Proposal that started an hour ago and ends in a day
    pub fn running() -> Self {
        let now = unix_now();
        Self::open(now.saturating_sub(3_600), now + 86_400)
    }

    /// Proposal whose voting window already ended
    pub fn closed() -> Self {
        let now = unix_now();
        Self::open(now.saturating_sub(2 * 86_400), now.saturating_sub(86_400))
    }

    fn encode(&self) -> Vec<u8> {
        abi::encode(&[
            Token::Bytes(self.call_data.clone()),
            Token::Address(self.target_contract),
            Token::Uint(self.start_time as u128),
            Token::Uint(self.end_time as u128),
            Token::Uint(self.yes_votes),
            Token::Uint(self.no_votes),
            Token::Bool(self.executed),
            Token::Bool(self.finished),
        ])
    }
}

fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

#[derive(Debug)]
struct MockState {
    accounts: Vec<Address>,
    chain_id: u64,
    known_chains: HashSet<u64>,

    reject_authorization: bool,
    hang_authorization: bool,
    reject_switch: bool,
    reject_add_chain: bool,
    ignore_switch: bool,
    fail_disconnect: bool,
    failing_proposal: Option<u64>,
    withhold_receipts: bool,
    revert_on_inclusion: Option<String>,

    proposals: Vec<MockProposal>,
    deposits: HashMap<Address, u128>,
    block_number: u64,
    nonce: u64,
    receipts: HashMap<TxHash, TransactionReceipt>,
    sent: Vec<TransactionRequest>,
    calls: Vec<String>,
}

/// In-memory `WalletProvider` for tests and the mock RPC server
pub struct MockWallet {
    state: Mutex<MockState>,
    events: broadcast::Sender<ProviderEvent>,
}

impl MockWallet {
    /// Wallet holding `account`, currently on `chain_id`
    pub fn new(account: Address, chain_id: u64) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(MockState {
                accounts: vec![account],
                chain_id,
                known_chains: [MAINNET_CHAIN_ID, chain_id].into_iter().collect(),
                reject_authorization: false,
                hang_authorization: false,
                reject_switch: false,
                reject_add_chain: false,
                ignore_switch: false,
                fail_disconnect: false,
                failing_proposal: None,
                withhold_receipts: false,
                revert_on_inclusion: None,
                proposals: Vec::new(),
                deposits: HashMap::new(),
                block_number: 1,
                nonce: 0,
                receipts: HashMap::new(),
                sent: Vec::new(),
                calls: Vec::new(),
            }),
            events,
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, method: &str) -> MutexGuard<'_, MockState> {
        let mut state = self.state();
        state.calls.push(method.to_string());
        state
    }

    fn emit(&self, event: ProviderEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    // ========================================================================
    // Wallet controls
    // ========================================================================

    /// Accounts currently exposed, without prompting
    pub fn accounts(&self) -> Vec<Address> {
        self.state().accounts.clone()
    }

    /// Replace the exposed accounts and emit `AccountsChanged`
    pub fn set_accounts(&self, accounts: Vec<Address>) {
        self.state().accounts = accounts.clone();
        self.emit(ProviderEvent::AccountsChanged(accounts));
    }

    /// Move the wallet to `chain_id` as if the user switched in the wallet UI
    pub fn set_chain(&self, chain_id: u64) {
        {
            let mut state = self.state();
            state.chain_id = chain_id;
            state.known_chains.insert(chain_id);
        }
        self.emit(ProviderEvent::ChainChanged(chain_id));
    }

    /// Emit a provider-side `Disconnected`
    pub fn drop_connection(&self) {
        self.emit(ProviderEvent::Disconnected);
    }

    pub fn current_chain(&self) -> u64 {
        self.state().chain_id
    }

    pub fn knows_chain(&self, chain_id: u64) -> bool {
        self.state().known_chains.contains(&chain_id)
    }

    /// Make the wallet unaware of `chain_id`, so switching needs `add_chain`
    pub fn forget_chain(&self, chain_id: u64) {
        self.state().known_chains.remove(&chain_id);
    }

    pub fn set_reject_authorization(&self, reject: bool) {
        self.state().reject_authorization = reject;
    }

    /// Never answer `request_accounts` (the user walked away)
    pub fn set_hang_authorization(&self, hang: bool) {
        self.state().hang_authorization = hang;
    }

    pub fn set_reject_switch(&self, reject: bool) {
        self.state().reject_switch = reject;
    }

    pub fn set_reject_add_chain(&self, reject: bool) {
        self.state().reject_add_chain = reject;
    }

    /// Acknowledge switch requests without actually switching
    pub fn set_ignore_switch(&self, ignore: bool) {
        self.state().ignore_switch = ignore;
    }

    /// Make provider-side teardown fail
    pub fn set_fail_disconnect(&self, fail: bool) {
        self.state().fail_disconnect = fail;
    }

    // ========================================================================
    // Contract controls
    // ========================================================================

    /// Append a proposal, returning its id
    pub fn add_proposal(&self, proposal: MockProposal) -> u64 {
        let mut state = self.state();
        state.proposals.push(proposal);
        state.proposals.len() as u64 - 1
    }

    pub fn proposal(&self, id: u64) -> Option<MockProposal> {
        self.state().proposals.get(id as usize).cloned()
    }

    /// Make every `getProposal(index)` read fail at the transport level
    pub fn fail_proposal(&self, index: Option<u64>) {
        self.state().failing_proposal = index;
    }

    pub fn set_deposit(&self, account: Address, amount: TokenAmount) {
        self.state().deposits.insert(account, amount.base_units());
    }

    pub fn deposit_of(&self, account: Address) -> TokenAmount {
        TokenAmount::from_base_units(self.state().deposits.get(&account).copied().unwrap_or(0))
    }

    /// Accept transactions but never produce receipts
    pub fn set_withhold_receipts(&self, withhold: bool) {
        self.state().withhold_receipts = withhold;
    }

    /// Include the next transactions as failed, reverting with `reason`
    pub fn set_revert_on_inclusion(&self, reason: Option<String>) {
        self.state().revert_on_inclusion = reason;
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Provider methods called so far, in order (JSON-RPC names)
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Transactions accepted by `send_transaction`
    pub fn sent_transactions(&self) -> Vec<TransactionRequest> {
        self.state().sent.clone()
    }
}

fn revert(reason: &str) -> ProviderError {
    ProviderError::Reverted {
        reason: Some(reason.to_string()),
    }
}

fn bad_calldata(e: crate::GovernanceError) -> ProviderError {
    log::debug!("Mock contract could not decode calldata: {}", e);
    ProviderError::Reverted { reason: None }
}

impl MockState {
    /// Run contract code for `from`; state changes are kept only if `commit`
    fn execute(&mut self, from: Option<Address>, data: &[u8], commit: bool) -> Result<Vec<u8>, ProviderError> {
        let (selector, args) = abi::split_selector(data).ok_or(ProviderError::Reverted { reason: None })?;
        let args = Decoder::new(args);
        let sender = from.unwrap_or(Address::ZERO);

        match selector {
            abi::GET_PROPOSALS_COUNT => Ok(abi::encode(&[Token::Uint(self.proposals.len() as u128)])),
            abi::GET_PROPOSAL => {
                let id = args.uint64(0).map_err(bad_calldata)?;
                if self.failing_proposal == Some(id) {
                    return Err(ProviderError::Transport(format!("proposal {} read dropped", id)));
                }
                self.proposals
                    .get(id as usize)
                    .map(MockProposal::encode)
                    .ok_or_else(|| revert("Proposal does not exist"))
            }
            abi::USER_INFO | abi::GET_DEPOSIT => {
                let account = args.address(0).map_err(bad_calldata)?;
                let amount = self.deposits.get(&account).copied().unwrap_or(0);
                Ok(abi::encode(&[Token::Uint(amount)]))
            }
            abi::DEPOSIT => {
                let amount = args.uint(0).map_err(bad_calldata)?;
                if amount == 0 {
                    return Err(revert("Amount must be greater than zero"));
                }
                let current = self.deposits.get(&sender).copied().unwrap_or(0);
                let updated = current.checked_add(amount).ok_or_else(|| revert("Deposit overflow"))?;
                if commit {
                    self.deposits.insert(sender, updated);
                }
                Ok(Vec::new())
            }
            abi::VOTE => {
                let id = args.uint64(0).map_err(bad_calldata)?;
                let support = args.bool(1).map_err(bad_calldata)?;
                let amount = args.uint(2).map_err(bad_calldata)?;
                let deposit = self.deposits.get(&sender).copied().unwrap_or(0);
                let now = unix_now();

                let proposal = self
                    .proposals
                    .get_mut(id as usize)
                    .ok_or_else(|| revert("Proposal does not exist"))?;
                if proposal.finished || now >= proposal.end_time {
                    return Err(revert("Voting closed"));
                }
                if now < proposal.start_time {
                    return Err(revert("Voting not started"));
                }
                if amount == 0 || amount > deposit {
                    return Err(revert("Insufficient deposit"));
                }
                if commit {
                    let tally = if support {
                        &mut proposal.yes_votes
                    } else {
                        &mut proposal.no_votes
                    };
                    *tally = tally.saturating_add(amount);
                }
                Ok(Vec::new())
            }
            abi::WITHDRAW => {
                if self.deposits.get(&sender).copied().unwrap_or(0) == 0 {
                    return Err(revert("Nothing to withdraw"));
                }
                if commit {
                    self.deposits.remove(&sender);
                }
                Ok(Vec::new())
            }
            other => {
                log::debug!("Mock contract has no function {}", hex::encode(other));
                Err(ProviderError::Reverted { reason: None })
            }
        }
    }

    fn next_tx_hash(&mut self, request: &TransactionRequest) -> TxHash {
        self.nonce += 1;
        let mut hasher = Sha256::new();
        hasher.update(request.from.as_bytes());
        hasher.update(self.nonce.to_be_bytes());
        hasher.update(&request.data);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hasher.finalize());
        TxHash::from_bytes(bytes)
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        let (hang, reject, accounts) = {
            let state = self.record("eth_requestAccounts");
            (state.hang_authorization, state.reject_authorization, state.accounts.clone())
        };
        if hang {
            std::future::pending::<()>().await;
        }
        if reject {
            return Err(ProviderError::UserRejected);
        }
        Ok(accounts)
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        Ok(self.record("eth_chainId").chain_id)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError> {
        {
            let mut state = self.record("wallet_switchEthereumChain");
            if state.reject_switch {
                return Err(ProviderError::UserRejected);
            }
            if !state.known_chains.contains(&chain_id) {
                return Err(ProviderError::UnrecognizedChain(chain_id));
            }
            if state.ignore_switch || state.chain_id == chain_id {
                return Ok(());
            }
            state.chain_id = chain_id;
        }
        self.emit(ProviderEvent::ChainChanged(chain_id));
        Ok(())
    }

    async fn add_chain(&self, chain: &ChainDescriptor) -> Result<(), ProviderError> {
        let mut state = self.record("wallet_addEthereumChain");
        if state.reject_add_chain {
            return Err(ProviderError::UserRejected);
        }
        state.known_chains.insert(chain.chain_id);
        Ok(())
    }

    async fn call(&self, request: &CallRequest) -> Result<Vec<u8>, ProviderError> {
        let mut state = self.record("eth_call");
        if let Some(reason) = &state.revert_on_inclusion {
            let is_write = matches!(
                abi::split_selector(&request.data).map(|(selector, _)| selector),
                Some(abi::DEPOSIT | abi::VOTE | abi::WITHDRAW)
            );
            if is_write {
                return Err(revert(reason));
            }
        }
        state.execute(request.from, &request.data, false)
    }

    async fn send_transaction(&self, request: &TransactionRequest) -> Result<TxHash, ProviderError> {
        let mut state = self.record("eth_sendTransaction");
        if !state.accounts.contains(&request.from) {
            return Err(ProviderError::Rpc {
                code: 4100,
                message: format!("account {} is not authorized", request.from),
            });
        }

        // Gas estimation fails on a reverting call, so it never gets a hash
        let status = if state.revert_on_inclusion.is_some() {
            false
        } else {
            state.execute(Some(request.from), &request.data, true)?;
            true
        };

        let tx_hash = state.next_tx_hash(request);
        state.block_number += 1;
        let receipt = TransactionReceipt {
            transaction_hash: tx_hash,
            block_number: state.block_number,
            status,
        };
        state.receipts.insert(tx_hash, receipt);
        state.sent.push(request.clone());
        Ok(tx_hash)
    }

    async fn transaction_receipt(&self, tx_hash: &TxHash) -> Result<Option<TransactionReceipt>, ProviderError> {
        let state = self.record("eth_getTransactionReceipt");
        if state.withhold_receipts {
            return Ok(None);
        }
        Ok(state.receipts.get(tx_hash).cloned())
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        let state = self.record("wallet_disconnect");
        if state.fail_disconnect {
            return Err(ProviderError::Transport("wallet bridge already closed".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Address {
        Address::from_bytes([0xa1; 20])
    }

    #[tokio::test]
    async fn test_proposal_count_and_read() {
        let wallet = MockWallet::new(alice(), 1);
        wallet.add_proposal(MockProposal::open(100, 200));

        let count = wallet
            .call(&CallRequest {
                from: None,
                to: Address::ZERO,
                data: abi::encode_call(abi::GET_PROPOSALS_COUNT, &[]),
            })
            .await
            .unwrap();
        assert_eq!(Decoder::new(&count).uint(0).unwrap(), 1);

        let missing = wallet
            .call(&CallRequest {
                from: None,
                to: Address::ZERO,
                data: abi::encode_call(abi::GET_PROPOSAL, &[Token::Uint(7)]),
            })
            .await
            .unwrap_err();
        assert_eq!(missing, revert("Proposal does not exist"));
    }

    #[tokio::test]
    async fn test_deposit_then_withdraw() {
        let wallet = MockWallet::new(alice(), 1);
        let deposit = TransactionRequest {
            from: alice(),
            to: Address::ZERO,
            data: abi::encode_call(abi::DEPOSIT, &[Token::Uint(5)]),
        };
        let hash = wallet.send_transaction(&deposit).await.unwrap();
        assert!(wallet.transaction_receipt(&hash).await.unwrap().unwrap().status);
        assert_eq!(wallet.deposit_of(alice()).base_units(), 5);

        let withdraw = TransactionRequest {
            data: abi::encode_call(abi::WITHDRAW, &[]),
            ..deposit
        };
        wallet.send_transaction(&withdraw).await.unwrap();
        assert!(wallet.deposit_of(alice()).is_zero());
        assert_eq!(
            wallet.send_transaction(&withdraw).await.unwrap_err(),
            revert("Nothing to withdraw")
        );
    }

    #[tokio::test]
    async fn test_vote_requires_open_proposal_and_deposit() {
        let wallet = MockWallet::new(alice(), 1);
        let open = wallet.add_proposal(MockProposal::running());
        let closed = wallet.add_proposal(MockProposal::closed());
        wallet.set_deposit(alice(), TokenAmount::from_base_units(10));

        let vote = |id: u64, amount: u128| TransactionRequest {
            from: alice(),
            to: Address::ZERO,
            data: abi::encode_call(abi::VOTE, &[Token::Uint(id as u128), Token::Bool(true), Token::Uint(amount)]),
        };

        assert_eq!(wallet.send_transaction(&vote(closed, 1)).await.unwrap_err(), revert("Voting closed"));
        assert_eq!(
            wallet.send_transaction(&vote(open, 11)).await.unwrap_err(),
            revert("Insufficient deposit")
        );
        wallet.send_transaction(&vote(open, 10)).await.unwrap();
        assert_eq!(wallet.proposal(open).unwrap().yes_votes, 10);
    }

    #[tokio::test]
    async fn test_switch_unknown_chain_needs_registration() {
        let wallet = MockWallet::new(alice(), 1);
        let mut events = wallet.subscribe();

        assert_eq!(
            wallet.switch_chain(11_155_111).await.unwrap_err(),
            ProviderError::UnrecognizedChain(11_155_111)
        );
        wallet.add_chain(&ChainDescriptor::sepolia("http://localhost")).await.unwrap();
        wallet.switch_chain(11_155_111).await.unwrap();

        assert_eq!(wallet.current_chain(), 11_155_111);
        assert_eq!(events.recv().await.unwrap(), ProviderEvent::ChainChanged(11_155_111));
        assert_eq!(
            wallet.calls(),
            vec!["wallet_switchEthereumChain", "wallet_addEthereumChain", "wallet_switchEthereumChain"]
        );
    }
}
