/// Wallet JSON-RPC Mock Server
///
/// Serves a simulated wallet and governance contract over JSON-RPC so the
/// governance client can be exercised without a browser wallet or Sepolia.

use anyhow::{Context, Result};
use dao_governance::{Address, MockWallet, SEPOLIA_CHAIN_ID};
use std::env;
use std::str::FromStr;
use std::sync::Arc;

use rpc_mock::{run_server, seed_demo_proposals};

/// Well-known first development account
const DEFAULT_ACCOUNT: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

#[derive(Debug)]
struct Config {
    // Wallet
    account: Address,
    chain_id: u64,

    // Server
    server_host: String,
    server_port: u16,
}

impl Config {
    fn from_env() -> Result<Self> {
        dotenv::dotenv().ok(); // Load .env file if present

        let account = env::var("MOCK_ACCOUNT").unwrap_or_else(|_| DEFAULT_ACCOUNT.to_string());
        let account = Address::from_str(&account).context("Invalid MOCK_ACCOUNT")?;

        let chain_id = match env::var("MOCK_CHAIN_ID") {
            Ok(raw) => raw.parse().context("Invalid MOCK_CHAIN_ID")?,
            Err(_) => SEPOLIA_CHAIN_ID,
        };

        let server_host = env::var("MOCK_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let server_port = env::var("MOCK_PORT")
            .unwrap_or_else(|_| "8545".to_string())
            .parse()
            .context("Invalid MOCK_PORT")?;

        Ok(Self {
            account,
            chain_id,
            server_host,
            server_port,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting wallet RPC mock...");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    log::info!("Account: {}", config.account);
    log::info!("Chain: {}", config.chain_id);

    let wallet = Arc::new(MockWallet::new(config.account, config.chain_id));
    seed_demo_proposals(&wallet, config.account);

    // Run server
    run_server(wallet, config.server_host, config.server_port)
        .await
        .context("Server error")?;

    Ok(())
}
