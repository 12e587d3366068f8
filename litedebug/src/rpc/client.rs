//! HTTP JSON-RPC client for the node under test

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{hex, Address, B256, U64};
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use super::{EthRpc, Receipt};
use crate::config::{defaults, parse_http_url};
use crate::error::RpcError;

/// Timeouts for node requests
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    pub request_timeout: Duration,
    pub connection_timeout: Duration,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(defaults::REQUEST_TIMEOUT_SECS),
            connection_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct JsonRpcResponse {
    #[serde(default)]
    jsonrpc: Option<String>,
    #[serde(default)]
    id: Value,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// JSON-RPC 2.0 client over HTTP
pub struct RpcClient {
    client: Client,
    url: Url,
    config: RpcClientConfig,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Create a client with default timeouts
    pub fn new(url: Url) -> Result<Self, RpcError> {
        Self::with_config(url, RpcClientConfig::default())
    }

    pub fn with_config(url: Url, config: RpcClientConfig) -> Result<Self, RpcError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connection_timeout)
            .build()?;

        Ok(Self {
            client,
            url,
            config,
            next_id: AtomicU64::new(1),
        })
    }

    /// Client for a node reachable at `ip` on the standard RPC port
    pub fn for_client_ip(ip: &str, config: RpcClientConfig) -> anyhow::Result<Self> {
        let url = parse_http_url(&format!("{ip}:{}", defaults::CLIENT_RPC_PORT))?;
        Ok(Self::with_config(url, config)?)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Call `method` and decode its result into `R`
    pub async fn request<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<R, RpcError> {
        let result = self.call_raw(method, params).await?;
        serde_json::from_value(result).map_err(|source| RpcError::Decode {
            method: method.to_string(),
            source,
        })
    }

    async fn call_raw(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        if log::log_enabled!(log::Level::Debug) {
            debug!("Making JSON-RPC request to {}: {}", self.url, method);
        }

        let response = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RpcError::Timeout(self.config.request_timeout)
                } else if e.is_connect() {
                    RpcError::Connect(e)
                } else {
                    RpcError::Transport(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Http {
                status: status.as_u16(),
                reason: status
                    .canonical_reason()
                    .unwrap_or("Unknown error")
                    .to_string(),
            });
        }

        let body = response.bytes().await?;
        let rpc_response: JsonRpcResponse =
            serde_json::from_slice(&body).map_err(|source| RpcError::Decode {
                method: method.to_string(),
                source,
            })?;

        if let Some(error) = rpc_response.error {
            return Err(RpcError::Server {
                code: error.code,
                message: error.message,
            });
        }

        Ok(rpc_response.result.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl EthRpc for RpcClient {
    async fn pending_nonce_at(&self, address: Address) -> Result<u64, RpcError> {
        let nonce: U64 = self
            .request("eth_getTransactionCount", json!([format!("{address:#x}"), "pending"]))
            .await?;
        Ok(nonce.to::<u64>())
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, RpcError> {
        self.request("eth_sendRawTransaction", json!([hex::encode_prefixed(raw)]))
            .await
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>, RpcError> {
        self.request("eth_getTransactionReceipt", json!([format!("{hash:#x}")]))
            .await
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.call_raw(method, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    async fn client_for(server: &mockito::ServerGuard) -> RpcClient {
        RpcClient::new(Url::parse(&server.url()).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_pending_nonce() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({
                "method": "eth_getTransactionCount",
                "params": ["0x658bdf435d810c91414ec09147daa6db62406379", "pending"]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x7"}"#)
            .create_async()
            .await;

        let client = client_for(&server).await;
        let nonce = client
            .pending_nonce_at(defaults::MINER_ADDRESS)
            .await
            .unwrap();

        assert_eq!(nonce, 7);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_null_receipt_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":null}"#)
            .create_async()
            .await;

        let client = client_for(&server).await;
        let receipt = client.transaction_receipt(B256::ZERO).await.unwrap();
        assert!(receipt.is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"the method debug_traceBlockFromFile does not exist/is not available"}}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server).await;
        let err = client
            .call("debug_traceBlockFromFile", json!(["non-exist-file"]))
            .await
            .unwrap_err();

        assert_eq!(err.code(), Some(-32601));
        assert!(err.to_string().contains("does not exist/is not available"));
    }

    #[tokio::test]
    async fn test_http_status_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(503)
            .create_async()
            .await;

        let client = client_for(&server).await;
        let err = client.call("eth_chainId", json!([])).await.unwrap_err();
        assert!(matches!(err, RpcError::Http { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_decode_error_names_method() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"not-a-number"}"#)
            .create_async()
            .await;

        let client = client_for(&server).await;
        let err = client
            .pending_nonce_at(defaults::MINER_ADDRESS)
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Decode { ref method, .. } if method == "eth_getTransactionCount"));
    }

    #[test]
    fn test_client_for_ip_uses_rpc_port() {
        let client = RpcClient::for_client_ip("10.0.0.5", RpcClientConfig::default()).unwrap();
        assert_eq!(client.url().as_str(), "http://10.0.0.5:8545/");
    }
}
