/// Axum HTTP handlers for the JSON-RPC endpoint and mock controls

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dao_governance::abi;
use dao_governance::types::{encode_hex_bytes, format_quantity, parse_quantity};
use dao_governance::{
    Address, CallRequest, ChainDescriptor, GovernanceError, MockWallet, ProviderError,
    TransactionRequest, TxHash, WalletProvider,
};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::types::*;

/// Shared application state
pub type AppState = Arc<MockWallet>;

// EIP-1193 and JSON-RPC 2.0 error codes
pub const CODE_USER_REJECTED: i64 = 4001;
pub const CODE_UNRECOGNIZED_CHAIN: i64 = 4902;
pub const CODE_EXECUTION_REVERTED: i64 = 3;
pub const CODE_INVALID_PARAMS: i64 = -32602;
pub const CODE_METHOD_NOT_FOUND: i64 = -32601;
pub const CODE_INTERNAL: i64 = -32603;

/// Why a JSON-RPC call failed
#[derive(Debug, Error)]
pub enum RpcFailure {
    #[error("the method {0} does not exist/is not available")]
    MethodNotFound(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl RpcFailure {
    fn invalid(err: GovernanceError) -> Self {
        Self::InvalidParams(err.to_string())
    }

    /// Error object as a wallet would send it
    pub fn into_error(self) -> JsonRpcError {
        let text = self.to_string();
        let (code, message, data) = match self {
            RpcFailure::MethodNotFound(_) => (CODE_METHOD_NOT_FOUND, text, None),
            RpcFailure::InvalidParams(_) => (CODE_INVALID_PARAMS, text, None),
            RpcFailure::Internal(_) => (CODE_INTERNAL, text, None),
            RpcFailure::Provider(err) => match err {
                ProviderError::UserRejected => {
                    (CODE_USER_REJECTED, "User rejected the request.".to_string(), None)
                }
                ProviderError::UnrecognizedChain(chain_id) => (
                    CODE_UNRECOGNIZED_CHAIN,
                    format!(
                        "Unrecognized chain ID \"{}\". Try adding the chain using wallet_addEthereumChain first.",
                        format_quantity(chain_id)
                    ),
                    None,
                ),
                ProviderError::Reverted { reason: Some(reason) } => (
                    CODE_EXECUTION_REVERTED,
                    format!("execution reverted: {}", reason),
                    Some(json!(format!("0x{}", hex::encode(abi::encode_revert_reason(&reason))))),
                ),
                ProviderError::Reverted { reason: None } => {
                    (CODE_EXECUTION_REVERTED, "execution reverted".to_string(), None)
                }
                ProviderError::Rpc { code, message } => (code, message, None),
                ProviderError::Transport(message) | ProviderError::InvalidResponse(message) => {
                    (CODE_INTERNAL, message, None)
                }
            },
        };
        JsonRpcError { code, message, data }
    }
}

/// POST /
/// JSON-RPC 2.0 entry point
pub async fn json_rpc(
    State(wallet): State<AppState>,
    Json(request): Json<JsonRpcRequest>,
) -> Json<JsonRpcResponse> {
    log::debug!("➡️  {} (id {})", request.method, request.id);

    let response = match dispatch(&wallet, &request.method, &request.params).await {
        Ok(result) => JsonRpcResponse::success(request.id, result),
        Err(failure) => {
            log::info!("   ❌ {} failed: {}", request.method, failure);
            JsonRpcResponse::failure(request.id, failure.into_error())
        }
    };
    Json(response)
}

async fn dispatch(wallet: &MockWallet, method: &str, params: &Value) -> Result<Value, RpcFailure> {
    match method {
        "eth_requestAccounts" => Ok(address_list(&wallet.request_accounts().await?)),
        "eth_accounts" => Ok(address_list(&wallet.accounts())),
        "eth_chainId" => Ok(json!(format_quantity(wallet.chain_id().await?))),
        "net_version" => Ok(json!(wallet.chain_id().await?.to_string())),

        "wallet_switchEthereumChain" => {
            let raw = string_field(first_param(params)?, "chainId")?;
            let chain_id = parse_quantity(raw).map_err(RpcFailure::invalid)?;
            wallet.switch_chain(chain_id).await?;
            Ok(Value::Null)
        }
        "wallet_addEthereumChain" => {
            let chain = ChainDescriptor::from_add_chain_params(first_param(params)?)
                .map_err(RpcFailure::invalid)?;
            log::info!("➕ Registering chain {} ({})", chain.name, chain.chain_id);
            wallet.add_chain(&chain).await?;
            Ok(Value::Null)
        }

        "eth_call" => {
            let call = call_object(params)?;
            let request = CallRequest {
                from: call.from.as_deref().map(parse_address).transpose()?,
                to: parse_address(&call.to)?,
                data: call_data(&call)?,
            };
            Ok(json!(encode_hex_bytes(&wallet.call(&request).await?)))
        }
        "eth_sendTransaction" => {
            let call = call_object(params)?;
            let from = call
                .from
                .as_deref()
                .ok_or_else(|| RpcFailure::InvalidParams("from is required".to_string()))?;
            let request = TransactionRequest {
                from: parse_address(from)?,
                to: parse_address(&call.to)?,
                data: call_data(&call)?,
            };
            let tx_hash = wallet.send_transaction(&request).await?;
            log::info!("📤 Accepted transaction {}", tx_hash);
            Ok(json!(tx_hash.to_string()))
        }
        "eth_getTransactionReceipt" => {
            let raw = first_param(params)?
                .as_str()
                .ok_or_else(|| RpcFailure::InvalidParams("transaction hash expected".to_string()))?;
            let tx_hash = TxHash::from_str(raw).map_err(RpcFailure::invalid)?;
            match wallet.transaction_receipt(&tx_hash).await? {
                None => Ok(Value::Null),
                Some(receipt) => serde_json::to_value(ReceiptResponse {
                    transaction_hash: receipt.transaction_hash.to_string(),
                    block_number: format_quantity(receipt.block_number),
                    status: if receipt.status { "0x1" } else { "0x0" }.to_string(),
                })
                .map_err(|e| RpcFailure::Internal(e.to_string())),
            }
        }

        other => Err(RpcFailure::MethodNotFound(other.to_string())),
    }
}

fn address_list(accounts: &[Address]) -> Value {
    json!(accounts.iter().map(|a| a.to_string()).collect::<Vec<_>>())
}

fn first_param(params: &Value) -> Result<&Value, RpcFailure> {
    params
        .get(0)
        .ok_or_else(|| RpcFailure::InvalidParams("missing first parameter".to_string()))
}

fn string_field<'a>(object: &'a Value, field: &str) -> Result<&'a str, RpcFailure> {
    object[field]
        .as_str()
        .ok_or_else(|| RpcFailure::InvalidParams(format!("{} must be a string", field)))
}

fn call_object(params: &Value) -> Result<CallObject, RpcFailure> {
    serde_json::from_value(first_param(params)?.clone())
        .map_err(|e| RpcFailure::InvalidParams(e.to_string()))
}

fn call_data(call: &CallObject) -> Result<Vec<u8>, RpcFailure> {
    match call.data.as_deref() {
        Some(data) => dao_governance::types::decode_hex_bytes(data).map_err(RpcFailure::invalid),
        None => Ok(Vec::new()),
    }
}

fn parse_address(raw: &str) -> Result<Address, RpcFailure> {
    Address::from_str(raw).map_err(RpcFailure::invalid)
}

// ============================================================================
// MOCK CONTROL ENDPOINTS (not part of the wallet JSON-RPC surface)
// ============================================================================

/// Custom error type for control handlers
pub enum ApiError {
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        (status, message).into_response()
    }
}

fn state_of(wallet: &MockWallet) -> MockStateResponse {
    MockStateResponse {
        accounts: wallet.accounts().iter().map(|a| a.to_string()).collect(),
        chain_id: wallet.current_chain(),
    }
}

/// GET /mock/state
pub async fn get_state(State(wallet): State<AppState>) -> Json<MockStateResponse> {
    Json(state_of(&wallet))
}

/// POST /mock/accounts
/// Replace the exposed accounts, as if the user switched or locked the wallet
pub async fn set_accounts(
    State(wallet): State<AppState>,
    Json(req): Json<SetAccountsRequest>,
) -> Result<Json<MockStateResponse>, ApiError> {
    let accounts = req
        .accounts
        .iter()
        .map(|raw| Address::from_str(raw).map_err(|e| ApiError::BadRequest(e.to_string())))
        .collect::<Result<Vec<_>, _>>()?;

    log::info!("👤 Accounts set to {:?}", accounts);
    wallet.set_accounts(accounts);
    Ok(Json(state_of(&wallet)))
}

/// POST /mock/chain
/// Move the wallet to another chain
pub async fn set_chain(
    State(wallet): State<AppState>,
    Json(req): Json<SetChainRequest>,
) -> Json<MockStateResponse> {
    log::info!("🔀 Chain set to {}", req.chain_id);
    wallet.set_chain(req.chain_id);
    Json(state_of(&wallet))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revert_error_carries_reason_payload() {
        let error = RpcFailure::from(ProviderError::Reverted {
            reason: Some("Voting closed".to_string()),
        })
        .into_error();

        assert_eq!(error.code, CODE_EXECUTION_REVERTED);
        assert_eq!(error.message, "execution reverted: Voting closed");
        let data = error.data.unwrap();
        let bytes = dao_governance::types::decode_hex_bytes(data.as_str().unwrap()).unwrap();
        assert_eq!(abi::decode_revert_reason(&bytes).as_deref(), Some("Voting closed"));
    }

    #[test]
    fn test_wallet_error_codes() {
        assert_eq!(
            RpcFailure::from(ProviderError::UserRejected).into_error().code,
            CODE_USER_REJECTED
        );
        assert_eq!(
            RpcFailure::from(ProviderError::UnrecognizedChain(1)).into_error().code,
            CODE_UNRECOGNIZED_CHAIN
        );
        assert_eq!(
            RpcFailure::MethodNotFound("eth_mine".into()).into_error().code,
            CODE_METHOD_NOT_FOUND
        );
    }
}
