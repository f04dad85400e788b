//! Required network description
//!
//! The governance contract lives on Sepolia only. When the wallet does not
//! know Sepolia yet, this descriptor is what gets registered with it.

use serde::{Deserialize, Serialize};

use crate::GovernanceError;

/// Sepolia testnet chain id
pub const SEPOLIA_CHAIN_ID: u64 = 11_155_111;

/// Public Sepolia RPC used when no Alchemy key is configured
pub const SEPOLIA_PUBLIC_RPC: &str = "https://rpc.sepolia.org";

/// Sepolia block explorer
pub const SEPOLIA_EXPLORER: &str = "https://sepolia.etherscan.io";

/// Chain metadata handed to `wallet_addEthereumChain`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainDescriptor {
    pub chain_id: u64,
    pub name: String,
    pub native_currency_name: String,
    pub native_currency_symbol: String,
    pub native_currency_decimals: u8,
    pub rpc_url: String,
    pub explorer_url: String,
}

impl ChainDescriptor {
    /// Sepolia reached through `rpc_url`
    pub fn sepolia(rpc_url: impl Into<String>) -> Self {
        Self {
            chain_id: SEPOLIA_CHAIN_ID,
            name: "Sepolia".to_string(),
            native_currency_name: "Sepolia Ether".to_string(),
            native_currency_symbol: "SepoliaETH".to_string(),
            native_currency_decimals: 18,
            rpc_url: rpc_url.into(),
            explorer_url: SEPOLIA_EXPLORER.to_string(),
        }
    }

    /// EIP-3085 parameter object for `wallet_addEthereumChain`
    pub fn to_add_chain_params(&self) -> serde_json::Value {
        serde_json::json!({
            "chainId": crate::types::format_quantity(self.chain_id),
            "chainName": self.name,
            "nativeCurrency": {
                "name": self.native_currency_name,
                "symbol": self.native_currency_symbol,
                "decimals": self.native_currency_decimals,
            },
            "rpcUrls": [self.rpc_url],
            "blockExplorerUrls": [self.explorer_url],
        })
    }

    /// Read an EIP-3085 parameter object back into a descriptor
    pub fn from_add_chain_params(params: &serde_json::Value) -> Result<Self, GovernanceError> {
        let text = |value: &serde_json::Value, field: &str| {
            value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| GovernanceError::invalid_response(format!("{} missing", field)))
        };

        let chain_id = crate::types::parse_quantity(&text(&params["chainId"], "chainId")?)?;
        let currency = &params["nativeCurrency"];
        let decimals = currency["decimals"]
            .as_u64()
            .and_then(|d| u8::try_from(d).ok())
            .ok_or_else(|| GovernanceError::invalid_response("nativeCurrency.decimals missing"))?;

        Ok(Self {
            chain_id,
            name: text(&params["chainName"], "chainName")?,
            native_currency_name: text(&currency["name"], "nativeCurrency.name")?,
            native_currency_symbol: text(&currency["symbol"], "nativeCurrency.symbol")?,
            native_currency_decimals: decimals,
            rpc_url: text(&params["rpcUrls"][0], "rpcUrls")?,
            explorer_url: params["blockExplorerUrls"][0]
                .as_str()
                .unwrap_or_default()
                .to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sepolia_add_chain_params() {
        let chain = ChainDescriptor::sepolia("https://rpc.example");
        let params = chain.to_add_chain_params();
        assert_eq!(params["chainId"], "0xaa36a7");
        assert_eq!(params["chainName"], "Sepolia");
        assert_eq!(params["nativeCurrency"]["symbol"], "SepoliaETH");
        assert_eq!(params["nativeCurrency"]["decimals"], 18);
        assert_eq!(params["rpcUrls"][0], "https://rpc.example");
        assert_eq!(params["blockExplorerUrls"][0], SEPOLIA_EXPLORER);
    }

    #[test]
    fn test_add_chain_params_read_back() {
        let chain = ChainDescriptor::sepolia("https://rpc.example");
        let parsed = ChainDescriptor::from_add_chain_params(&chain.to_add_chain_params()).unwrap();
        assert_eq!(parsed, chain);

        let mut broken = chain.to_add_chain_params();
        broken["chainId"] = serde_json::json!(11155111);
        assert!(ChainDescriptor::from_add_chain_params(&broken).is_err());
    }
}
