//! Raw JSON-RPC access to source chains.
//!
//! Blocks are kept as raw JSON because header layouts differ per chain (Celo, Aura seals)
//! and canonicalization needs every field the node reports.

use alloy_primitives::{Address, Bloom, Bytes, B256, U64};
use async_trait::async_trait;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::{Classify, ErrorKind};

#[derive(thiserror::Error, Debug)]
pub enum RpcError {
    #[error("rpc call `{method}` failed: {message}")]
    Call { method: &'static str, message: String },
    #[error("cannot build client for {endpoint}: {message}")]
    Connect { endpoint: String, message: String },
    #[error("block {0} not found")]
    BlockNotFound(String),
    #[error("no rpc endpoint known for chain {0}")]
    NoEndpoint(u64),
    #[error("all endpoints failed for chain {chain_id}: {last_error}")]
    AllEndpointsFailed { chain_id: u64, last_error: String },
}

impl Classify for RpcError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NoEndpoint(_) => ErrorKind::Permanent,
            _ => ErrorKind::Transient,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    #[serde(default)]
    pub log_index: Option<U64>,
}

/// The receipt fields needed to rebuild a receipts trie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt {
    pub transaction_hash: B256,
    #[serde(default)]
    pub transaction_index: Option<U64>,
    pub block_hash: B256,
    pub block_number: U64,
    #[serde(default)]
    pub status: Option<U64>,
    /// Pre-Byzantium post-state root, reported instead of `status`.
    #[serde(default)]
    pub root: Option<B256>,
    pub cumulative_gas_used: U64,
    pub logs_bloom: Bloom,
    pub logs: Vec<RpcLog>,
    #[serde(default, rename = "type")]
    pub tx_type: Option<U64>,
}

/// What the relay needs from a source chain node.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn block_number(&self) -> Result<u64, RpcError>;

    /// Returns the raw block; a missing block is `BlockNotFound`.
    async fn block_by_number(&self, number: u64) -> Result<Value, RpcError>;

    async fn block_by_hash(&self, hash: B256, full_transactions: bool) -> Result<Value, RpcError>;

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<RpcReceipt>, RpcError>;

    /// Celo's synthetic per-block receipt carrying system logs.
    async fn block_receipt(&self, block_hash: B256) -> Result<Option<RpcReceipt>, RpcError>;
}

/// `ChainRpc` over a jsonrpsee HTTP client.
pub struct JsonRpcChainClient {
    endpoint: String,
    client: HttpClient,
}

impl JsonRpcChainClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, RpcError> {
        let client = HttpClientBuilder::default().request_timeout(timeout).build(endpoint).map_err(
            |e| RpcError::Connect { endpoint: endpoint.to_string(), message: e.to_string() },
        )?;
        Ok(Self { endpoint: endpoint.to_string(), client })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn call_error(method: &'static str) -> impl Fn(jsonrpsee::core::ClientError) -> RpcError {
    move |e| RpcError::Call { method, message: e.to_string() }
}

fn present(block: Value, id: String) -> Result<Value, RpcError> {
    if block.is_null() {
        return Err(RpcError::BlockNotFound(id));
    }
    Ok(block)
}

#[async_trait]
impl ChainRpc for JsonRpcChainClient {
    async fn block_number(&self) -> Result<u64, RpcError> {
        let number: U64 = self
            .client
            .request("eth_blockNumber", rpc_params![])
            .await
            .map_err(call_error("eth_blockNumber"))?;
        Ok(number.to())
    }

    async fn block_by_number(&self, number: u64) -> Result<Value, RpcError> {
        let block: Value = self
            .client
            .request("eth_getBlockByNumber", rpc_params![format!("0x{:x}", number), false])
            .await
            .map_err(call_error("eth_getBlockByNumber"))?;
        present(block, number.to_string())
    }

    async fn block_by_hash(&self, hash: B256, full_transactions: bool) -> Result<Value, RpcError> {
        let block: Value = self
            .client
            .request("eth_getBlockByHash", rpc_params![hash, full_transactions])
            .await
            .map_err(call_error("eth_getBlockByHash"))?;
        present(block, hash.to_string())
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<RpcReceipt>, RpcError> {
        self.client
            .request("eth_getTransactionReceipt", rpc_params![hash])
            .await
            .map_err(call_error("eth_getTransactionReceipt"))
    }

    async fn block_receipt(&self, block_hash: B256) -> Result<Option<RpcReceipt>, RpcError> {
        self.client
            .request("eth_getBlockReceipt", rpc_params![block_hash])
            .await
            .map_err(call_error("eth_getBlockReceipt"))
    }
}

/// Transaction hashes listed in a raw block, whether it was fetched with full
/// transactions or hashes only.
pub fn transaction_hashes(block: &Value) -> Result<Vec<B256>, RpcError> {
    let invalid = |message: &str| RpcError::Call {
        method: "eth_getBlockByHash",
        message: message.to_string(),
    };
    let Some(transactions) = block.get("transactions").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    transactions
        .iter()
        .map(|tx| {
            let hash = match tx {
                Value::String(_) => tx,
                Value::Object(fields) => fields.get("hash").ok_or_else(|| invalid("missing tx hash"))?,
                _ => return Err(invalid("unexpected transaction entry")),
            };
            serde_json::from_value::<B256>(hash.clone()).map_err(|e| invalid(&e.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn should_parse_receipt() {
        let receipt: RpcReceipt = serde_json::from_value(json!({
            "transactionHash": B256::repeat_byte(1),
            "transactionIndex": "0x2",
            "blockHash": B256::repeat_byte(2),
            "blockNumber": "0x10",
            "status": "0x1",
            "cumulativeGasUsed": "0x5208",
            "logsBloom": Bloom::ZERO,
            "logs": [{
                "address": Address::repeat_byte(3),
                "topics": [B256::repeat_byte(4)],
                "data": "0x0102",
                "logIndex": "0x0",
                "removed": false,
            }],
            "type": "0x2",
            "effectiveGasPrice": "0x1",
        }))
        .unwrap();
        assert_eq!(receipt.transaction_index, Some(U64::from(2)));
        assert_eq!(receipt.status, Some(U64::from(1)));
        assert_eq!(receipt.root, None);
        assert_eq!(receipt.tx_type, Some(U64::from(2)));
        assert_eq!(receipt.logs[0].data, Bytes::from_static(&[1, 2]));
    }

    #[test]
    fn should_list_transaction_hashes() {
        let hashes = json!({ "transactions": [B256::repeat_byte(1), B256::repeat_byte(2)] });
        assert_eq!(
            transaction_hashes(&hashes).unwrap(),
            vec![B256::repeat_byte(1), B256::repeat_byte(2)]
        );
        let full = json!({ "transactions": [{ "hash": B256::repeat_byte(9), "nonce": "0x0" }] });
        assert_eq!(transaction_hashes(&full).unwrap(), vec![B256::repeat_byte(9)]);
        assert!(transaction_hashes(&json!({})).unwrap().is_empty());
    }
}
