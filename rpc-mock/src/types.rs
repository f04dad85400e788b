/// JSON-RPC 2.0 wire types
///
/// Shapes follow the Ethereum JSON-RPC conventions so wallet clients can talk
/// to the mock without knowing it is one.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Incoming request envelope
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Outgoing response envelope; exactly one of `result` and `error` is set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Receipt object of `eth_getTransactionReceipt`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptResponse {
    pub transaction_hash: String,
    pub block_number: String,
    /// "0x1" on success, "0x0" when execution reverted
    pub status: String,
}

/// Call or transaction object (`eth_call`, `eth_sendTransaction`)
#[derive(Debug, Clone, Deserialize)]
pub struct CallObject {
    #[serde(default)]
    pub from: Option<String>,
    pub to: String,
    #[serde(default, alias = "input")]
    pub data: Option<String>,
}

// ============================================================================
// MOCK CONTROL ENDPOINTS (not part of the JSON-RPC surface)
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SetAccountsRequest {
    pub accounts: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetChainRequest {
    pub chain_id: u64,
}

#[derive(Debug, Serialize)]
pub struct MockStateResponse {
    pub accounts: Vec<String>,
    pub chain_id: u64,
}
