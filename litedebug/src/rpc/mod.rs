// Node RPC
//
// The subset of the Ethereum JSON-RPC API the scenarios need, behind a
// trait so the submitter and scenario logic can run against an in-memory
// node in tests.

pub mod client;

pub use client::{RpcClient, RpcClientConfig};

use crate::error::RpcError;
use alloy_primitives::{Address, B256, U64};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Transaction receipt, reduced to the fields the suite inspects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: B256,
    #[serde(default)]
    pub block_hash: Option<B256>,
    /// `null` while the transaction is still pending on some clients
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub status: Option<U64>,
    #[serde(default)]
    pub gas_used: Option<U64>,
}

impl Receipt {
    /// Block the transaction was included in, once mined
    pub fn mined_at(&self) -> Option<u64> {
        self.block_number.map(|n| n.to::<u64>())
    }
}

/// Encode a block number the way `debug_traceBlockByNumber` expects it
pub fn block_number_hex(number: u64) -> String {
    format!("{number:#x}")
}

/// Node RPC used by the submitter and the scenarios.
///
/// Implementations surface JSON-RPC error objects as [`RpcError::Server`]
/// so the node's message text reaches the caller unchanged.
#[async_trait]
pub trait EthRpc: Send + Sync {
    /// Next nonce for `address`, pending transactions included
    async fn pending_nonce_at(&self, address: Address) -> Result<u64, RpcError>;

    /// Broadcast an EIP-2718 encoded signed transaction
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, RpcError>;

    /// Receipt for `hash`, `None` when the node does not know it yet
    async fn transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>, RpcError>;

    /// Arbitrary method call returning the raw JSON result
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_block_number_hex() {
        assert_eq!(block_number_hex(0), "0x0");
        assert_eq!(block_number_hex(26), "0x1a");
        assert_eq!(block_number_hex(4096), "0x1000");
    }

    #[test]
    fn test_receipt_from_node_json() {
        let receipt: Receipt = serde_json::from_value(json!({
            "transactionHash": "0x8f2a5c1e0f9b6a0d3c4e5f60718293a4b5c6d7e8f90112233445566778899aab",
            "blockHash": "0x0101010101010101010101010101010101010101010101010101010101010101",
            "blockNumber": "0x1a",
            "status": "0x1",
            "gasUsed": "0x5208",
            "logs": [],
            "contractAddress": null
        }))
        .unwrap();

        assert_eq!(receipt.mined_at(), Some(26));
        assert_eq!(receipt.status, Some(U64::from(1)));
    }

    #[test]
    fn test_pending_receipt_has_no_block() {
        let receipt: Receipt = serde_json::from_value(json!({
            "transactionHash": "0x8f2a5c1e0f9b6a0d3c4e5f60718293a4b5c6d7e8f90112233445566778899aab",
            "blockHash": null,
            "blockNumber": null
        }))
        .unwrap();

        assert_eq!(receipt.mined_at(), None);
    }

    #[test]
    fn test_null_receipt_is_none() {
        let receipt: Option<Receipt> = serde_json::from_value(Value::Null).unwrap();
        assert!(receipt.is_none());
    }
}
