/// SOLANA JSON-RPC
///
/// Only one call is needed: `getParsedTokenAccountsByOwner` against the SPL
/// Token program, which lists every token account a wallet owns with its
/// mint and raw amount.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

pub const SPL_TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAccount {
    pub pubkey: String,
    pub mint: String,
    pub owner: String,
    pub amount: u64,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RpcError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("Malformed RPC response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for RpcError {
    fn from(e: reqwest::Error) -> Self {
        RpcError::Network(e.to_string())
    }
}

/// Lookup of SPL token accounts by owner wallet
#[async_trait]
pub trait TokenAccountSource: Send + Sync {
    async fn token_accounts_by_owner(&self, owner: &str) -> Result<Vec<TokenAccount>, RpcError>;
}

#[derive(Debug, Clone)]
pub struct SolanaRpcClient {
    client: Client,
    endpoint: String,
    commitment: String,
}

impl SolanaRpcClient {
    pub fn new(endpoint: &str, commitment: &str, timeout: Duration) -> Result<Self, RpcError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(SolanaRpcClient {
            client,
            endpoint: endpoint.to_string(),
            commitment: commitment.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TokenAccountSource for SolanaRpcClient {
    async fn token_accounts_by_owner(&self, owner: &str) -> Result<Vec<TokenAccount>, RpcError> {
        let body = token_accounts_request(owner, &self.commitment);
        let response: Value = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await?
            .json()
            .await
            .map_err(|e| RpcError::Malformed(e.to_string()))?;
        parse_token_accounts(&response)
    }
}

pub fn token_accounts_request(owner: &str, commitment: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "getParsedTokenAccountsByOwner",
        "params": [
            owner,
            { "programId": SPL_TOKEN_PROGRAM_ID },
            { "encoding": "jsonParsed", "commitment": commitment }
        ]
    })
}

/// Extract token accounts from a `getParsedTokenAccountsByOwner` response
pub fn parse_token_accounts(response: &Value) -> Result<Vec<TokenAccount>, RpcError> {
    if let Some(err) = response.get("error") {
        return Err(RpcError::Rpc {
            code: err.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }

    let accounts = response
        .pointer("/result/value")
        .and_then(Value::as_array)
        .ok_or_else(|| RpcError::Malformed("missing result.value".to_string()))?;

    accounts
        .iter()
        .map(|entry| {
            let info = entry
                .pointer("/account/data/parsed/info")
                .ok_or_else(|| RpcError::Malformed("account is not jsonParsed".to_string()))?;
            let field = |name: &str| -> Result<String, RpcError> {
                info.get(name)
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| RpcError::Malformed(format!("missing {}", name)))
            };
            let amount = info
                .pointer("/tokenAmount/amount")
                .and_then(Value::as_str)
                .and_then(|a| a.parse::<u64>().ok())
                .ok_or_else(|| RpcError::Malformed("bad tokenAmount.amount".to_string()))?;

            Ok(TokenAccount {
                pubkey: entry
                    .get("pubkey")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                mint: field("mint")?,
                owner: field("owner")?,
                amount,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let req = token_accounts_request("Owner111", "confirmed");
        assert_eq!(req["method"], json!("getParsedTokenAccountsByOwner"));
        assert_eq!(req["params"][1]["programId"], json!(SPL_TOKEN_PROGRAM_ID));
        assert_eq!(req["params"][2]["encoding"], json!("jsonParsed"));
    }

    #[test]
    fn test_parse_accounts() {
        let response = json!({
            "jsonrpc": "2.0",
            "result": {
                "context": { "slot": 1 },
                "value": [{
                    "pubkey": "TokenAcct1",
                    "account": { "data": { "parsed": { "info": {
                        "mint": "MintA", "owner": "Owner111",
                        "tokenAmount": { "amount": "1", "decimals": 0, "uiAmount": 1.0 }
                    }}}}
                }]
            },
            "id": 1
        });
        let accounts = parse_token_accounts(&response).unwrap();
        assert_eq!(
            accounts,
            vec![TokenAccount {
                pubkey: "TokenAcct1".to_string(),
                mint: "MintA".to_string(),
                owner: "Owner111".to_string(),
                amount: 1,
            }]
        );
    }

    #[test]
    fn test_parse_rpc_error() {
        let response = json!({"jsonrpc": "2.0", "error": {"code": -32602, "message": "Invalid param"}, "id": 1});
        assert_eq!(
            parse_token_accounts(&response).unwrap_err(),
            RpcError::Rpc { code: -32602, message: "Invalid param".to_string() }
        );
        assert!(matches!(parse_token_accounts(&json!({})), Err(RpcError::Malformed(_))));
    }
}
