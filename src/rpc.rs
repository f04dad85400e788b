// JSON-RPC wallet provider
//
// Speaks JSON-RPC 2.0 over HTTP to a wallet endpoint (a remote signer or a
// node with unlocked accounts):
// - eth_requestAccounts / eth_accounts / eth_chainId
// - wallet_switchEthereumChain / wallet_addEthereumChain
// - eth_call / eth_sendTransaction / eth_getTransactionReceipt
//
// HTTP cannot push, so account and chain changes are discovered by polling.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::abi;
use crate::error::ProviderError;
use crate::network::ChainDescriptor;
use crate::provider::{
    CallRequest, ProviderEvent, TransactionReceipt, TransactionRequest, WalletProvider,
    EVENT_CHANNEL_CAPACITY,
};
use crate::types::{decode_hex_bytes, encode_hex_bytes, format_quantity, parse_quantity, Address, TxHash};

/// EIP-1193: user rejected the request
pub const CODE_USER_REJECTED: i64 = 4001;
/// Wallet does not know the requested chain
pub const CODE_UNRECOGNIZED_CHAIN: i64 = 4902;
/// Geth-style execution reverted
pub const CODE_EXECUTION_REVERTED: i64 = 3;

/// Upper bound on any single HTTP round trip
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Default bound on `eth_requestAccounts`, which waits for the user
pub const DEFAULT_AUTHORIZATION_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// Map a JSON-RPC error object onto the provider error taxonomy
fn classify_error(error: RpcErrorObject, requested_chain: Option<u64>) -> ProviderError {
    match error.code {
        CODE_USER_REJECTED => ProviderError::UserRejected,
        CODE_UNRECOGNIZED_CHAIN => ProviderError::UnrecognizedChain(requested_chain.unwrap_or_default()),
        code if code == CODE_EXECUTION_REVERTED
            || error.message.to_ascii_lowercase().contains("execution reverted") =>
        {
            let reason = error
                .data
                .as_ref()
                .and_then(|data| data.as_str())
                .and_then(|hex| decode_hex_bytes(hex).ok())
                .and_then(|bytes| abi::decode_revert_reason(&bytes));
            ProviderError::Reverted { reason }
        }
        code => ProviderError::Rpc {
            code,
            message: error.message,
        },
    }
}

pub struct JsonRpcProvider {
    url: String,
    /// reqwest::Client is internally Arc-based
    http_client: reqwest::Client,
    next_id: AtomicU64,
    authorization_timeout: Duration,
    events: broadcast::Sender<ProviderEvent>,
}

impl JsonRpcProvider {
    pub fn new(url: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let http_client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("⚠️  Failed to create HTTP client with timeout: {}", e);
                reqwest::Client::new()
            });
        Self {
            url: url.into(),
            http_client,
            next_id: AtomicU64::new(1),
            authorization_timeout: DEFAULT_AUTHORIZATION_TIMEOUT,
            events,
        }
    }

    /// Let `eth_requestAccounts` wait up to `timeout` for the user
    pub fn with_authorization_timeout(mut self, timeout: Duration) -> Self {
        self.authorization_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue one JSON-RPC request and return its `result`
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        self.request_with_chain(method, params, None).await
    }

    async fn request_with_chain(
        &self,
        method: &str,
        params: Value,
        requested_chain: Option<u64>,
    ) -> Result<Value, ProviderError> {
        self.send(method, params, requested_chain, HTTP_TIMEOUT).await
    }

    async fn send(
        &self,
        method: &str,
        params: Value,
        requested_chain: Option<u64>,
        timeout: Duration,
    ) -> Result<Value, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        log::debug!("   ➡️  {} (id {})", method, id);

        let response = self
            .http_client
            .post(&self.url)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                log::error!("   ❌ HTTP request failed: {}", e);
                ProviderError::Transport(format!("HTTP error: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            log::error!("   ❌ HTTP error: {}", status);
            return Err(ProviderError::Transport(format!("HTTP {}", status)));
        }

        let reply: RpcResponse = response.json().await.map_err(|e| {
            log::error!("   ❌ JSON parse failed: {}", e);
            ProviderError::InvalidResponse(format!("Invalid JSON-RPC reply: {}", e))
        })?;

        if let Some(error) = reply.error {
            log::debug!("   ⬅️  {} error {}: {}", method, error.code, error.message);
            return Err(classify_error(error, requested_chain));
        }
        Ok(reply.result.unwrap_or(Value::Null))
    }

    /// Accounts already authorized, without prompting
    pub async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        let result = self.request("eth_accounts", json!([])).await?;
        parse_accounts(result)
    }

    /// Poll `eth_accounts` and `eth_chainId` every `interval`, publishing
    /// changes as provider events
    pub fn spawn_event_poller(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let provider = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut last_accounts: Option<Vec<Address>> = None;
            let mut last_chain: Option<u64> = None;

            loop {
                ticker.tick().await;
                let Some(provider) = provider.upgrade() else { break };

                match provider.accounts().await {
                    Ok(accounts) => {
                        if last_accounts.as_ref().is_some_and(|prev| *prev != accounts) {
                            let _ = provider.events.send(ProviderEvent::AccountsChanged(accounts.clone()));
                        }
                        last_accounts = Some(accounts);
                    }
                    Err(e) => log::debug!("Account poll failed: {}", e),
                }

                match provider.chain_id().await {
                    Ok(chain_id) => {
                        if last_chain.is_some_and(|prev| prev != chain_id) {
                            let _ = provider.events.send(ProviderEvent::ChainChanged(chain_id));
                        }
                        last_chain = Some(chain_id);
                    }
                    Err(e) => log::debug!("Chain poll failed: {}", e),
                }
            }
        })
    }
}

fn parse_accounts(result: Value) -> Result<Vec<Address>, ProviderError> {
    let raw: Vec<String> = serde_json::from_value(result)
        .map_err(|e| ProviderError::InvalidResponse(format!("accounts: {}", e)))?;
    raw.iter()
        .map(|s| Address::from_str(s).map_err(|e| ProviderError::InvalidResponse(e.to_string())))
        .collect()
}

fn as_str<'a>(value: &'a Value, what: &str) -> Result<&'a str, ProviderError> {
    value
        .as_str()
        .ok_or_else(|| ProviderError::InvalidResponse(format!("{} is not a string: {}", what, value)))
}

fn call_object(request: &CallRequest) -> Value {
    let mut object = json!({
        "to": request.to.to_string(),
        "data": encode_hex_bytes(&request.data),
    });
    if let Some(from) = request.from {
        object["from"] = json!(from.to_string());
    }
    object
}

#[async_trait]
impl WalletProvider for JsonRpcProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        let result = self
            .send("eth_requestAccounts", json!([]), None, self.authorization_timeout)
            .await?;
        parse_accounts(result)
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        let result = self.request("eth_chainId", json!([])).await?;
        parse_quantity(as_str(&result, "chain id")?)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError> {
        self.request_with_chain(
            "wallet_switchEthereumChain",
            json!([{ "chainId": format_quantity(chain_id) }]),
            Some(chain_id),
        )
        .await
        .map(|_| ())
    }

    async fn add_chain(&self, chain: &ChainDescriptor) -> Result<(), ProviderError> {
        self.request_with_chain(
            "wallet_addEthereumChain",
            json!([chain.to_add_chain_params()]),
            Some(chain.chain_id),
        )
        .await
        .map(|_| ())
    }

    async fn call(&self, request: &CallRequest) -> Result<Vec<u8>, ProviderError> {
        let result = self
            .request("eth_call", json!([call_object(request), "latest"]))
            .await?;
        decode_hex_bytes(as_str(&result, "call result")?)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    async fn send_transaction(&self, request: &TransactionRequest) -> Result<TxHash, ProviderError> {
        let transaction = json!({
            "from": request.from.to_string(),
            "to": request.to.to_string(),
            "data": encode_hex_bytes(&request.data),
        });
        let result = self.request("eth_sendTransaction", json!([transaction])).await?;
        TxHash::from_str(as_str(&result, "transaction hash")?)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    async fn transaction_receipt(
        &self,
        tx_hash: &TxHash,
    ) -> Result<Option<TransactionReceipt>, ProviderError> {
        let result = self
            .request("eth_getTransactionReceipt", json!([tx_hash.to_string()]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }

        let invalid = |e: crate::GovernanceError| ProviderError::InvalidResponse(e.to_string());
        let transaction_hash = TxHash::from_str(as_str(&result["transactionHash"], "transactionHash")?)
            .map_err(invalid)?;
        let block_number =
            parse_quantity(as_str(&result["blockNumber"], "blockNumber")?).map_err(invalid)?;
        let status = parse_quantity(as_str(&result["status"], "status")?).map_err(invalid)? == 1;

        Ok(Some(TransactionReceipt {
            transaction_hash,
            block_number,
            status,
        }))
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        // Stateless over HTTP; let subscribers know the session is gone.
        let _ = self.events.send(ProviderEvent::Disconnected);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error(code: i64, message: &str, data: Option<Value>) -> RpcErrorObject {
        RpcErrorObject {
            code,
            message: message.to_string(),
            data,
        }
    }

    #[test]
    fn test_classify_user_rejection() {
        assert_eq!(
            classify_error(error(4001, "User rejected the request.", None), None),
            ProviderError::UserRejected
        );
    }

    #[test]
    fn test_classify_unrecognized_chain_keeps_requested_id() {
        assert_eq!(
            classify_error(error(4902, "Unrecognized chain ID", None), Some(11_155_111)),
            ProviderError::UnrecognizedChain(11_155_111)
        );
    }

    #[test]
    fn test_classify_revert_decodes_reason() {
        let payload = encode_hex_bytes(&abi::encode_revert_reason("Voting closed"));
        assert_eq!(
            classify_error(error(3, "execution reverted: Voting closed", Some(json!(payload))), None),
            ProviderError::Reverted {
                reason: Some("Voting closed".to_string())
            }
        );
        assert_eq!(
            classify_error(error(-32000, "execution reverted", None), None),
            ProviderError::Reverted { reason: None }
        );
    }

    #[test]
    fn test_classify_other_errors() {
        assert_eq!(
            classify_error(error(-32601, "Method not found", None), None),
            ProviderError::Rpc {
                code: -32601,
                message: "Method not found".to_string()
            }
        );
    }

    #[test]
    fn test_call_object_includes_sender_when_known() {
        let request = CallRequest {
            from: Some(Address::from_bytes([1; 20])),
            to: Address::from_bytes([2; 20]),
            data: vec![0x98, 0xe5, 0x27, 0xd3],
        };
        let object = call_object(&request);
        assert_eq!(object["data"], "0x98e527d3");
        assert_eq!(object["from"], format!("0x{}", "01".repeat(20)));

        let anonymous = CallRequest { from: None, ..request };
        assert!(call_object(&anonymous).get("from").is_none());
    }

    #[tokio::test]
    async fn test_stalled_endpoint_is_bounded_by_authorization_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept connections and never answer
        let _server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let provider = JsonRpcProvider::new(format!("http://{}", addr))
            .with_authorization_timeout(Duration::from_millis(100));
        let err = tokio::time::timeout(Duration::from_secs(5), provider.request_accounts())
            .await
            .expect("request was not bounded")
            .unwrap_err();
        assert!(matches!(err, ProviderError::Transport(_)), "got {:?}", err);
    }

    #[test]
    fn test_parse_accounts() {
        let accounts = parse_accounts(json!([format!("0x{}", "ab".repeat(20))])).unwrap();
        assert_eq!(accounts, vec![Address::from_bytes([0xab; 20])]);
        assert!(parse_accounts(json!(["0x12"])).is_err());
        assert!(parse_accounts(json!("nope")).is_err());
    }
}
