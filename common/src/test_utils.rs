//! In-memory source chain used by tests across the workspace.

use alloy_primitives::{keccak256, Address, Bloom, Bytes, B256, U64};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::header::{block_number, encode_header};
use crate::mpt::PatriciaTrie;
use crate::receipt::encode_receipt;
use crate::rpc::{ChainRpc, RpcError, RpcLog, RpcReceipt};

#[derive(Default)]
struct FakeState {
    head: u64,
    blocks: BTreeMap<u64, Value>,
    by_hash: HashMap<B256, u64>,
    receipts: HashMap<B256, RpcReceipt>,
    block_receipts: HashMap<B256, RpcReceipt>,
    fail_all: bool,
    failing_blocks: HashSet<u64>,
    block_requests: Vec<u64>,
}

/// A chain whose blocks hash correctly and whose receipts tries match their headers.
#[derive(Clone)]
pub struct FakeChain {
    chain_id: u64,
    state: Arc<Mutex<FakeState>>,
}

/// A successful type-2 receipt with the given logs, before it is placed in a block.
pub fn receipt_with_logs(tx_hash: B256, logs: Vec<RpcLog>) -> RpcReceipt {
    RpcReceipt {
        transaction_hash: tx_hash,
        transaction_index: None,
        block_hash: B256::ZERO,
        block_number: U64::ZERO,
        status: Some(U64::from(1)),
        root: None,
        cumulative_gas_used: U64::from(21_000),
        logs_bloom: Bloom::ZERO,
        logs,
        tx_type: Some(U64::from(2)),
    }
}

pub fn log(address: Address, topics: Vec<B256>, data: Vec<u8>) -> RpcLog {
    RpcLog { address, topics, data: Bytes::from(data), log_index: None }
}

impl FakeChain {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id, state: Arc::new(Mutex::new(FakeState::default())) }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn set_head(&self, head: u64) {
        self.state().head = head;
    }

    pub fn fail_all(&self, fail: bool) {
        self.state().fail_all = fail;
    }

    pub fn fail_block(&self, number: u64) {
        self.state().failing_blocks.insert(number);
    }

    /// Block numbers requested through `block_by_number`, in call order.
    pub fn block_requests(&self) -> Vec<u64> {
        self.state().block_requests.clone()
    }

    pub fn block(&self, number: u64) -> Option<Value> {
        self.state().blocks.get(&number).cloned()
    }

    pub fn block_hash(&self, number: u64) -> Option<B256> {
        self.block(number).and_then(|b| serde_json::from_value(b["hash"].clone()).ok())
    }

    /// Replaces a stored block's JSON without touching its hash, e.g. to corrupt it.
    pub fn overwrite_block(&self, number: u64, block: Value) {
        self.state().blocks.insert(number, block);
    }

    /// Adds a block exactly as given, keyed by its own `number` and `hash` fields.
    pub fn insert_block(&self, block: Value) {
        let number = block_number(&block).expect("block has a number");
        let hash: B256 = serde_json::from_value(block["hash"].clone()).expect("block has a hash");
        let mut state = self.state();
        state.blocks.insert(number, block);
        state.by_hash.insert(hash, number);
        state.head = state.head.max(number);
    }

    /// Adds an empty block linked to the previous one; raises the head if needed.
    pub fn push_block(&self, number: u64) -> B256 {
        self.push_block_with_receipts(number, Vec::new(), None)
    }

    /// Adds blocks `from..=to`.
    pub fn push_range(&self, from: u64, to: u64) {
        for number in from..=to {
            self.push_block(number);
        }
    }

    /// Adds a block containing the given receipts, in order, and an optional Celo block
    /// receipt. Receipt indexes, block hash and number are filled in.
    pub fn push_block_with_receipts(
        &self, number: u64, mut receipts: Vec<RpcReceipt>, block_receipt: Option<RpcReceipt>,
    ) -> B256 {
        let mut trie = PatriciaTrie::new();
        for (index, receipt) in receipts.iter().enumerate() {
            trie.insert(&alloy_rlp::encode(index as u64), encode_receipt(receipt, true));
        }
        if let Some(extra) = block_receipt.as_ref().filter(|r| !r.logs.is_empty()) {
            trie.insert(&alloy_rlp::encode(receipts.len() as u64), encode_receipt(extra, true));
        }

        let parent_hash = number
            .checked_sub(1)
            .and_then(|parent| self.block_hash(parent))
            .unwrap_or(B256::ZERO);
        let tx_hashes: Vec<B256> = receipts.iter().map(|r| r.transaction_hash).collect();
        let mut block = json!({
            "parentHash": parent_hash,
            "sha3Uncles": B256::repeat_byte(0x1d),
            "miner": Address::repeat_byte(0x0b),
            "stateRoot": keccak256(format!("state-{}", number)),
            "transactionsRoot": keccak256(number.to_be_bytes()),
            "receiptsRoot": trie.root_hash(),
            "logsBloom": Bloom::ZERO,
            "difficulty": "0x0",
            "number": format!("0x{:x}", number),
            "gasLimit": "0x1c9c380",
            "gasUsed": format!("0x{:x}", 21_000 * receipts.len()),
            "timestamp": format!("0x{:x}", 1_700_000_000 + number * 5),
            "extraData": "0x",
            "mixHash": B256::ZERO,
            "nonce": "0x0000000000000000",
            "baseFeePerGas": "0x7",
            "transactions": tx_hashes,
        });
        let rlp = encode_header(&block, self.chain_id).expect("fake block has every header field");
        let hash = keccak256(&rlp);
        block["hash"] = json!(hash);

        let mut state = self.state();
        for (index, receipt) in receipts.iter_mut().enumerate() {
            receipt.transaction_index = Some(U64::from(index));
            receipt.block_hash = hash;
            receipt.block_number = U64::from(number);
            state.receipts.insert(receipt.transaction_hash, receipt.clone());
        }
        if let Some(mut extra) = block_receipt {
            extra.transaction_index = Some(U64::from(receipts.len()));
            extra.block_hash = hash;
            extra.block_number = U64::from(number);
            state.block_receipts.insert(hash, extra);
        }
        state.blocks.insert(number, block);
        state.by_hash.insert(hash, number);
        state.head = state.head.max(number);
        hash
    }

    /// Drops a receipt so lookups return nothing, as on a pruned node.
    pub fn forget_receipt(&self, tx_hash: B256) {
        self.state().receipts.remove(&tx_hash);
    }

    fn check(&self, method: &'static str) -> Result<(), RpcError> {
        if self.state().fail_all {
            return Err(RpcError::Call { method, message: "fake chain unavailable".into() });
        }
        Ok(())
    }
}

#[async_trait]
impl ChainRpc for FakeChain {
    async fn block_number(&self) -> Result<u64, RpcError> {
        self.check("eth_blockNumber")?;
        Ok(self.state().head)
    }

    async fn block_by_number(&self, number: u64) -> Result<Value, RpcError> {
        self.check("eth_getBlockByNumber")?;
        let mut state = self.state();
        state.block_requests.push(number);
        if state.failing_blocks.contains(&number) {
            return Err(RpcError::Call {
                method: "eth_getBlockByNumber",
                message: format!("block {} unavailable", number),
            });
        }
        state.blocks.get(&number).cloned().ok_or(RpcError::BlockNotFound(number.to_string()))
    }

    async fn block_by_hash(&self, hash: B256, _full_transactions: bool) -> Result<Value, RpcError> {
        self.check("eth_getBlockByHash")?;
        let state = self.state();
        state
            .by_hash
            .get(&hash)
            .and_then(|number| state.blocks.get(number))
            .cloned()
            .ok_or(RpcError::BlockNotFound(hash.to_string()))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<RpcReceipt>, RpcError> {
        self.check("eth_getTransactionReceipt")?;
        Ok(self.state().receipts.get(&hash).cloned())
    }

    async fn block_receipt(&self, block_hash: B256) -> Result<Option<RpcReceipt>, RpcError> {
        self.check("eth_getBlockReceipt")?;
        Ok(self.state().block_receipts.get(&block_hash).cloned())
    }
}
