/// Axum HTTP server setup and routing

use axum::{
    routing::{get, post},
    Router,
};
use dao_governance::{Address, MockProposal, MockWallet, TokenAmount};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::*;

pub fn create_router(wallet: Arc<MockWallet>) -> Router {
    // Browser front-ends call the mock cross-origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Wallet JSON-RPC
        .route("/", post(json_rpc))

        // Health check
        .route("/health", get(health_check))

        // Mock control endpoints
        .route("/mock/state", get(get_state))
        .route("/mock/accounts", post(set_accounts))
        .route("/mock/chain", post(set_chain))

        // Shared state
        .with_state(wallet)

        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Populate the simulated contract with a few proposals and a deposit
///
/// Gives a front-end something to render right after startup: one running
/// proposal with votes, one fresh proposal, and one that already closed.
pub fn seed_demo_proposals(wallet: &MockWallet, account: Address) {
    let mut with_votes = MockProposal::running();
    with_votes.yes_votes = TokenAmount::from_tokens(12).base_units();
    with_votes.no_votes = TokenAmount::from_tokens(4).base_units();
    with_votes.call_data = vec![0x3c, 0xcf, 0xd6, 0x0b];
    with_votes.target_contract = Address::from_bytes([0x64; 20]);

    let mut closed = MockProposal::closed();
    closed.yes_votes = TokenAmount::from_tokens(7).base_units();
    closed.finished = true;
    closed.executed = true;

    for proposal in [with_votes, MockProposal::running(), closed] {
        wallet.add_proposal(proposal);
    }
    wallet.set_deposit(account, TokenAmount::from_tokens(10));
}

pub async fn run_server(wallet: Arc<MockWallet>, host: String, port: u16) -> anyhow::Result<()> {
    let app = create_router(wallet);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    log::info!("🚀 Wallet RPC mock listening on http://{}", addr);
    log::info!("🔧 Control endpoints: POST /mock/accounts, POST /mock/chain");

    axum::serve(listener, app).await?;

    Ok(())
}
