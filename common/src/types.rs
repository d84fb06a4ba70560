use alloy_primitives::{Address, Bytes, B256, U256};
use getset::Getters;
use serde::{Deserialize, Serialize};

/// Compact (EIP-2098) ECDSA signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Signature {
    pub r: B256,
    pub vs: B256,
}

/// A block header signed by one validator, ready for the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBlock {
    pub chain_id: u64,
    pub rlp_header: Bytes,
    pub block_hash: B256,
    pub signature: Signature,
    pub cycle_end: u64,
    pub validators: Vec<Address>,
}

/// A header that was re-encoded and checked against the hash the chain reports.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct CanonicalHeader {
    number: u64,
    hash: B256,
    parent_hash: B256,
    receipts_root: B256,
    timestamp: u64,
    rlp: Bytes,
}

impl CanonicalHeader {
    pub fn new(
        number: u64, hash: B256, parent_hash: B256, receipts_root: B256, timestamp: u64, rlp: Bytes,
    ) -> Self {
        Self { number, hash, parent_hash, receipts_root, timestamp, rlp }
    }
}

/// Validator-set rotation info read from the consensus contract.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CycleInfo {
    pub cycle_start: u64,
    pub cycle_end: u64,
    pub validators: Vec<Address>,
}

/// A `BlockAdded` registry event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockAddedEvent {
    pub validator: Address,
    pub chain_id: u64,
    pub block_number: u64,
    pub block_hash: B256,
    pub payload: B256,
    pub validators: Vec<Address>,
    pub cycle_end: u64,
    pub signature: Signature,
    /// Registry-chain block the event was emitted in.
    pub registry_block: u64,
}

/// A `BridgeRequest` emitted by a source bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeRequest {
    pub id: B256,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub target_chain_id: u64,
    pub relay: Address,
    pub block_number: u64,
    pub transaction_hash: B256,
}

/// Aggregated registry signatures for one checkpoint block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCheckpoint {
    pub chain_id: u64,
    pub block_number: u64,
    pub block_hash: B256,
    pub rlp_header: Bytes,
    pub signatures: Vec<Signature>,
    pub cycle_end: u64,
    pub validators: Vec<Address>,
}
