//! JSON-RPC Mock Integration Tests
//!
//! Starts the mock server on an ephemeral port and drives it with the real
//! `JsonRpcProvider`, the `SessionManager` and the `ContractGateway`, so the
//! whole HTTP path (request encoding, EIP-1193 error codes, receipts) is
//! covered end to end.
//!
//! Run with: cargo test -p rpc-mock --test json_rpc_test -- --nocapture

use dao_governance::{
    Address, ConnectionMethod, GovernanceConfig, GovernanceError, JsonRpcProvider, MockProposal,
    MockWallet, ProviderError, ProviderEvent, SessionManager, SessionStatus, TokenAmount,
    WalletConnectors, WalletProvider, SEPOLIA_CHAIN_ID,
};
use rpc_mock::create_router;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn alice() -> Address {
    Address::from_bytes([0xa1; 20])
}

/// Serve `wallet` on 127.0.0.1 and return the base URL
async fn spawn_server(wallet: Arc<MockWallet>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind failed");
    let addr = listener.local_addr().expect("no local addr");
    tokio::spawn(async move {
        axum::serve(listener, create_router(wallet))
            .await
            .expect("server failed");
    });
    format!("http://{}", addr)
}

fn fast_config() -> GovernanceConfig {
    GovernanceConfig {
        receipt_poll_interval: Duration::from_millis(10),
        confirmation_timeout: Duration::from_secs(5),
        ..GovernanceConfig::default()
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    init_logger();
    let url = spawn_server(Arc::new(MockWallet::new(alice(), SEPOLIA_CHAIN_ID))).await;

    let body = reqwest::get(format!("{}/health", url)).await.unwrap().text().await.unwrap();
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn test_basic_wallet_methods() {
    init_logger();
    let url = spawn_server(Arc::new(MockWallet::new(alice(), SEPOLIA_CHAIN_ID))).await;
    let provider = JsonRpcProvider::new(url);

    assert_eq!(provider.request_accounts().await.unwrap(), vec![alice()]);
    assert_eq!(provider.accounts().await.unwrap(), vec![alice()]);
    assert_eq!(provider.chain_id().await.unwrap(), SEPOLIA_CHAIN_ID);

    let err = provider.request("eth_mine", json!([])).await.unwrap_err();
    assert!(matches!(err, ProviderError::Rpc { code: -32601, .. }));
}

#[tokio::test]
async fn test_error_codes_survive_the_wire() {
    init_logger();
    let wallet = Arc::new(MockWallet::new(alice(), 1));
    let url = spawn_server(wallet.clone()).await;
    let provider = JsonRpcProvider::new(url);

    assert_eq!(
        provider.switch_chain(SEPOLIA_CHAIN_ID).await.unwrap_err(),
        ProviderError::UnrecognizedChain(SEPOLIA_CHAIN_ID)
    );

    wallet.set_reject_authorization(true);
    assert_eq!(
        provider.request_accounts().await.unwrap_err(),
        ProviderError::UserRejected
    );
}

#[tokio::test]
async fn test_session_and_gateway_over_http() {
    init_logger();
    let wallet = Arc::new(MockWallet::new(alice(), 1));
    let open = wallet.add_proposal(MockProposal::running());
    let closed = wallet.add_proposal(MockProposal::closed());
    let url = spawn_server(wallet.clone()).await;

    let signer = Arc::new(JsonRpcProvider::new(url));
    let manager = SessionManager::new(fast_config(), WalletConnectors::new().with_remote_signer(signer));

    // Wallet starts on mainnet without Sepolia: register, then switch
    let session = manager.connect(ConnectionMethod::RemoteSigner).await.unwrap();
    assert_eq!(session.account(), Some(alice()));
    assert_eq!(wallet.current_chain(), SEPOLIA_CHAIN_ID);

    let gateway = manager.gateway().unwrap();
    let proposals = gateway.get_all_proposals().await.unwrap();
    assert_eq!(proposals.len(), 2);
    assert!(proposals.iter().all(|p| p.end_time > p.start_time));

    let receipt = gateway.deposit("1.5").await.unwrap();
    assert!(receipt.status);
    assert_eq!(gateway.my_deposit().await.unwrap().to_string(), "1.5");

    gateway.vote(open, true, "1").await.unwrap();
    assert_eq!(wallet.proposal(open).unwrap().yes_votes, TokenAmount::from_tokens(1).base_units());

    let err = gateway.vote(closed, false, "1").await.unwrap_err();
    assert_eq!(
        err,
        GovernanceError::TransactionReverted {
            tx_hash: None,
            reason: Some("Voting closed".to_string()),
        }
    );

    gateway.withdraw().await.unwrap();
    assert!(gateway.my_deposit().await.unwrap().is_zero());
}

#[tokio::test]
async fn test_revert_reason_recovered_after_failed_inclusion() {
    init_logger();
    let wallet = Arc::new(MockWallet::new(alice(), SEPOLIA_CHAIN_ID));
    let url = spawn_server(wallet.clone()).await;
    let signer = Arc::new(JsonRpcProvider::new(url));
    let manager = SessionManager::new(fast_config(), WalletConnectors::new().with_injected(signer));
    manager.connect(ConnectionMethod::InjectedWallet).await.unwrap();
    wallet.set_revert_on_inclusion(Some("Contract paused".to_string()));

    let err = manager.gateway().unwrap().deposit("2").await.unwrap_err();

    match err {
        GovernanceError::TransactionReverted { tx_hash, reason } => {
            assert!(tx_hash.is_some());
            assert_eq!(reason.as_deref(), Some("Contract paused"));
        }
        other => panic!("expected TransactionReverted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_poller_reports_chain_and_account_changes() {
    init_logger();
    let wallet = Arc::new(MockWallet::new(alice(), SEPOLIA_CHAIN_ID));
    let url = spawn_server(wallet.clone()).await;
    let provider = Arc::new(JsonRpcProvider::new(url.clone()));
    let mut events = provider.subscribe();
    let poller = provider.spawn_event_poller(Duration::from_millis(20));

    // Let the poller record a baseline first
    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = reqwest::Client::new();
    client
        .post(format!("{}/mock/chain", url))
        .json(&json!({ "chain_id": 1 }))
        .send()
        .await
        .unwrap()
        .error_for_status()
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("no event")
        .unwrap();
    assert_eq!(event, ProviderEvent::ChainChanged(1));

    let bob = Address::from_bytes([0xb0; 20]);
    client
        .post(format!("{}/mock/accounts", url))
        .json(&json!({ "accounts": [bob.to_string()] }))
        .send()
        .await
        .unwrap()
        .error_for_status()
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("no event")
        .unwrap();
    assert_eq!(event, ProviderEvent::AccountsChanged(vec![bob]));

    poller.abort();
}

#[tokio::test]
async fn test_configured_remote_signer_connects_and_follows_chain() {
    init_logger();
    let wallet = Arc::new(MockWallet::new(alice(), SEPOLIA_CHAIN_ID));
    wallet.add_proposal(MockProposal::running());
    let url = spawn_server(wallet.clone()).await;

    let config = GovernanceConfig {
        signer_url: Some(url.clone()),
        event_poll_interval: Duration::from_millis(20),
        ..fast_config()
    };
    let manager = SessionManager::new(config.clone(), WalletConnectors::from_config(&config));

    let session = manager.connect(ConnectionMethod::RemoteSigner).await.unwrap();
    assert_eq!(session.account(), Some(alice()));
    assert_eq!(session.method(), Some(ConnectionMethod::RemoteSigner));
    assert_eq!(manager.gateway().unwrap().proposal_count().await.unwrap(), 1);

    // Let the poller record a baseline, then leave Sepolia from the wallet side
    tokio::time::sleep(Duration::from_millis(100)).await;
    reqwest::Client::new()
        .post(format!("{}/mock/chain", url))
        .json(&json!({ "chain_id": 1 }))
        .send()
        .await
        .unwrap()
        .error_for_status()
        .unwrap();

    let mut session = manager.current_session();
    for _ in 0..200 {
        if session.status() == &SessionStatus::Disconnected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        session = manager.current_session();
    }
    assert_eq!(session.status(), &SessionStatus::Disconnected);
    assert_eq!(
        session.last_error(),
        Some(&GovernanceError::WrongNetwork {
            expected: SEPOLIA_CHAIN_ID
        })
    );
}

#[tokio::test]
async fn test_control_endpoint_rejects_bad_address() {
    init_logger();
    let url = spawn_server(Arc::new(MockWallet::new(alice(), SEPOLIA_CHAIN_ID))).await;

    let response = reqwest::Client::new()
        .post(format!("{}/mock/accounts", url))
        .json(&json!({ "accounts": ["0x1234"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}
