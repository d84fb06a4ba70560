//! The on-chain contracts the relay network talks to, behind traits.
//!
//! Each trait has an alloy-backed implementation in this crate and an in-memory fake in
//! [`test_utils`] for the node and SDK tests.

use alloy::primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;

use blockrelay_common::mpt::MerkleProof;
use blockrelay_common::types::{
    BlockAddedEvent, BridgeRequest, CycleInfo, Signature, SignedBlock, SignedCheckpoint,
};
use blockrelay_common::{Classify, ErrorKind};

mod bridge;
mod registry;
pub mod sol;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use bridge::{bridge_request_topic, decode_bridge_request, AlloyBridge, AlloyMulticall, AlloyVerifier};
pub use registry::{AlloyConsensus, AlloyRegistry};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("contract call failed: {0}")]
    Call(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("cannot decode contract data: {0}")]
    Decode(String),
    #[error("invalid rpc url {0}")]
    InvalidUrl(String),
    #[error("a signer is required to send transactions")]
    MissingSigner,
    #[error("transaction {0} reverted")]
    Reverted(B256),
}

impl Classify for ContractError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Call(_) | Self::Transport(_) => ErrorKind::Transient,
            Self::Decode(_) | Self::Reverted(_) => ErrorKind::Permanent,
            Self::InvalidUrl(_) | Self::MissingSigner => ErrorKind::Startup,
        }
    }
}

/// What the registry returns for a directly-read signed block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySignedBlock {
    pub block_hash: B256,
    pub signatures: Vec<Signature>,
    pub cycle_end: u64,
    pub validators: Vec<Address>,
}

/// Receipt proofs for the transactions of one source block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockReceiptProofs {
    pub receipt_proofs: Vec<MerkleProof>,
    pub block_header_rlp: Bytes,
    pub block_number: u64,
}

/// Arguments of the verifier's combined checkpoint, parent headers and receipts entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierSubmission {
    pub checkpoint: SignedCheckpoint,
    /// Child to ancestor, excluding the checkpoint itself.
    pub parent_headers: Vec<Bytes>,
    pub blocks: Vec<BlockReceiptProofs>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReceipt {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
}

/// A sent relay transaction: its hash is known, its confirmation may be awaited or dropped.
pub struct PendingRelay {
    pub tx_hash: B256,
    pub confirmation: BoxFuture<'static, Result<RelayReceipt, ContractError>>,
}

impl fmt::Debug for PendingRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRelay").field("tx_hash", &self.tx_hash).finish()
    }
}

/// The block registry, where validators publish signed headers.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// `(chain id, comma-separated rpc urls)` entries.
    async fn rpc_list(&self) -> Result<Vec<(u64, String)>, ContractError>;

    async fn add_signed_blocks(&self, blocks: &[SignedBlock]) -> Result<B256, ContractError>;

    /// Current block of the chain the registry lives on.
    async fn head(&self) -> Result<u64, ContractError>;

    /// `BlockAdded` events for `chain_id` emitted in registry blocks `from..=to`,
    /// optionally restricted to one source block number.
    async fn block_added_events(
        &self, chain_id: u64, block_number: Option<u64>, from: u64, to: u64,
    ) -> Result<Vec<BlockAddedEvent>, ContractError>;

    /// Direct read of the signatures collected for a block; `None` if nothing was signed.
    async fn signed_block(
        &self, chain_id: u64, number: u64,
    ) -> Result<Option<RegistrySignedBlock>, ContractError>;
}

/// Validator-set rotation on chains that embed it into attestations.
#[async_trait]
pub trait ConsensusClient: Send + Sync {
    async fn cycle_info(&self) -> Result<CycleInfo, ContractError>;
}

/// A bridge on a source chain.
#[async_trait]
pub trait BridgeClient: Send + Sync {
    fn address(&self) -> Address;

    /// `BridgeRequest` events emitted in blocks `from..=to`.
    async fn bridge_requests(&self, from: u64, to: u64) -> Result<Vec<BridgeRequest>, ContractError>;
}

/// A bridge on a destination chain, which verifies relayed proofs.
#[async_trait]
pub trait VerifierClient: Send + Sync {
    fn address(&self) -> Address;

    /// Hash recorded for a verified source block, zero if none.
    async fn chain_verified_block(&self, chain_id: u64, number: u64) -> Result<B256, ContractError>;

    async fn is_executed(&self, id: B256) -> Result<bool, ContractError>;

    async fn submit(
        &self, submission: VerifierSubmission, gas_price: Option<u128>,
    ) -> Result<PendingRelay, ContractError>;
}

/// Batched `executedRequests` reads through a multicall aggregator.
#[async_trait]
pub trait MulticallClient: Send + Sync {
    /// Executed flags for `ids` on `bridge`, in input order.
    async fn executed_requests(&self, bridge: Address, ids: &[B256]) -> Result<Vec<bool>, ContractError>;
}

fn transport<E: fmt::Display>(e: E) -> ContractError {
    ContractError::Transport(e.to_string())
}

fn call<E: fmt::Display>(e: E) -> ContractError {
    ContractError::Call(e.to_string())
}
