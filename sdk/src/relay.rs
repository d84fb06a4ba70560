use alloy_primitives::{Address, Bytes, B256};
use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use blockrelay_common::fetch_bounded;
use blockrelay_common::pool::ChainRpcPool;
use blockrelay_common::rpc::ChainRpc;
use blockrelay_common::types::{BridgeRequest, SignedCheckpoint};
use blockrelay_contracts::{
    decode_bridge_request, BlockReceiptProofs, ContractError, RelayReceipt, VerifierClient,
    VerifierSubmission,
};

use crate::checkpoint::{CheckpointResolver, ResolvedCheckpoint};
use crate::error::{Stage, StageExt};
use crate::headers::get_chain_block_headers;
use crate::proof::{build_receipt_proof, ReceiptProof};
use crate::SdkError;

/// Receipt proofs built at once for one relay.
pub const PROOF_BUILD_CONCURRENCY: usize = 5;

/// A submitted relay. The transaction hash is known; `confirmation` resolves once the
/// destination chain includes it and may be dropped by fire-and-forget callers.
pub struct RelayOutcome {
    pub relay_tx_hash: B256,
    pub checkpoint: u64,
    pub bridge_requests: Vec<BridgeRequest>,
    pub confirmation: BoxFuture<'static, Result<RelayReceipt, ContractError>>,
}

impl fmt::Debug for RelayOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayOutcome")
            .field("relay_tx_hash", &self.relay_tx_hash)
            .field("checkpoint", &self.checkpoint)
            .field("bridge_requests", &self.bridge_requests)
            .finish()
    }
}

struct Destination {
    verifier: Arc<dyn VerifierClient>,
    gas_price: Option<u128>,
}

/// Proves source-chain receipts to destination-chain verifiers.
pub struct Relayer {
    pool: Arc<ChainRpcPool>,
    resolver: CheckpointResolver,
    destinations: HashMap<u64, Destination>,
    source_bridges: HashMap<u64, Address>,
}

impl Relayer {
    pub fn new(pool: Arc<ChainRpcPool>, resolver: CheckpointResolver) -> Self {
        Self { pool, resolver, destinations: HashMap::new(), source_bridges: HashMap::new() }
    }

    /// Sets the bridge whose `BridgeRequest` logs are reported for relays from `chain_id`.
    pub fn with_source_bridge(mut self, chain_id: u64, bridge: Address) -> Self {
        self.source_bridges.insert(chain_id, bridge);
        self
    }

    /// Registers the verifier receiving relays for `chain_id`.
    pub fn with_verifier(
        mut self, chain_id: u64, verifier: Arc<dyn VerifierClient>, gas_price: Option<u128>,
    ) -> Self {
        self.destinations.insert(chain_id, Destination { verifier, gas_price });
        self
    }

    pub fn pool(&self) -> &Arc<ChainRpcPool> {
        &self.pool
    }

    pub fn resolver(&self) -> &CheckpointResolver {
        &self.resolver
    }

    pub fn verifier(&self, chain_id: u64) -> Option<&Arc<dyn VerifierClient>> {
        self.destinations.get(&chain_id).map(|d| &d.verifier)
    }

    pub async fn relay_tx(
        &self, source_chain: u64, target_chain: u64, tx_hash: B256,
    ) -> Result<RelayOutcome, SdkError> {
        self.relay_txs(source_chain, target_chain, &[tx_hash]).await
    }

    /// Proves the receipts of `tx_hashes` on `source_chain` to the verifier of `target_chain`
    /// in one transaction.
    pub async fn relay_txs(
        &self, source_chain: u64, target_chain: u64, tx_hashes: &[B256],
    ) -> Result<RelayOutcome, SdkError> {
        let mut unique: Vec<B256> = Vec::with_capacity(tx_hashes.len());
        for hash in tx_hashes {
            if !unique.contains(hash) {
                unique.push(*hash);
            }
        }
        if unique.is_empty() {
            return Err(SdkError::NothingToRelay);
        }
        let destination =
            self.destinations.get(&target_chain).ok_or(SdkError::UnknownChain(target_chain))?;
        let rpc = self.pool.client(source_chain).await.stage(Stage::Connect)?;

        let proofs = fetch_bounded(unique.iter().copied(), PROOF_BUILD_CONCURRENCY, |hash| {
            build_receipt_proof(rpc.as_ref(), source_chain, hash)
        })
        .await
        .stage(Stage::Proofs)?;

        let bridge_requests = match self.source_bridges.get(&source_chain) {
            Some(bridge) => bridge_requests(&proofs, *bridge),
            None => {
                debug!(source_chain, "no source bridge configured, requests not decoded");
                Vec::new()
            },
        };
        for request in &bridge_requests {
            info!(
                id = %request.id,
                from = %request.from,
                to = %request.to,
                amount = %request.amount,
                "relaying bridge request"
            );
        }

        let min_block = proofs.iter().map(ReceiptProof::block_number).min().unwrap_or_default();
        let max_block = proofs.iter().map(ReceiptProof::block_number).max().unwrap_or_default();
        let checkpoint = self
            .checkpoint_for(rpc.as_ref(), destination.verifier.as_ref(), source_chain, max_block)
            .await
            .stage(Stage::Checkpoint)?;

        let headers =
            get_chain_block_headers(rpc.as_ref(), source_chain, min_block, checkpoint.block_number)
                .await
                .stage(Stage::Headers)?;
        let (checkpoint_header, parents) = headers
            .split_last()
            .ok_or(SdkError::CheckpointMissing { chain_id: source_chain, block: max_block })
            .stage(Stage::Headers)?;
        if *checkpoint_header.hash() != checkpoint.block_hash {
            return Err(SdkError::CheckpointHashMismatch {
                number: checkpoint.block_number,
                attested: checkpoint.block_hash,
                actual: *checkpoint_header.hash(),
            })
            .stage(Stage::Checkpoint);
        }

        let submission = VerifierSubmission {
            checkpoint: SignedCheckpoint {
                chain_id: source_chain,
                block_number: checkpoint.block_number,
                block_hash: checkpoint.block_hash,
                rlp_header: checkpoint_header.rlp().clone(),
                signatures: checkpoint.signatures,
                cycle_end: checkpoint.cycle_end,
                validators: checkpoint.validators,
            },
            parent_headers: parents.iter().rev().map(|h| h.rlp().clone()).collect::<Vec<Bytes>>(),
            blocks: group_by_block(&proofs),
        };
        debug!(
            source_chain,
            target_chain,
            checkpoint = checkpoint.block_number,
            parents = submission.parent_headers.len(),
            blocks = submission.blocks.len(),
            "submitting relay"
        );

        let pending = destination
            .verifier
            .submit(submission, destination.gas_price)
            .await
            .stage(Stage::Submit)?;
        info!(
            source_chain,
            target_chain,
            tx_hash = %pending.tx_hash,
            receipts = proofs.len(),
            "relay sent"
        );
        Ok(RelayOutcome {
            relay_tx_hash: pending.tx_hash,
            checkpoint: checkpoint.block_number,
            bridge_requests,
            confirmation: pending.confirmation,
        })
    }

    /// The block the relay is anchored to: the highest proven block when the verifier already
    /// knows it, otherwise the attested checkpoint covering it.
    async fn checkpoint_for(
        &self, rpc: &dyn ChainRpc, verifier: &dyn VerifierClient, chain_id: u64, max_block: u64,
    ) -> Result<ResolvedCheckpoint, SdkError> {
        let verified = verifier.chain_verified_block(chain_id, max_block).await?;
        if !verified.is_zero() {
            debug!(chain_id, block = max_block, "block already verified on destination");
            return Ok(ResolvedCheckpoint {
                block_number: max_block,
                block_hash: verified,
                signatures: Vec::new(),
                signers: Vec::new(),
                cycle_end: 0,
                validators: Vec::new(),
            });
        }
        match self.resolver.resolve(rpc, chain_id, max_block).await {
            Err(SdkError::CheckpointNotFound { .. }) => {
                Err(SdkError::CheckpointMissing { chain_id, block: max_block })
            },
            res => res,
        }
    }
}

fn bridge_requests(proofs: &[ReceiptProof], bridge: Address) -> Vec<BridgeRequest> {
    proofs
        .iter()
        .flat_map(|p| {
            p.receipt.logs.iter().filter_map(move |log| {
                decode_bridge_request(log, bridge, p.block_number(), p.transaction_hash())
            })
        })
        .collect()
}

fn group_by_block(proofs: &[ReceiptProof]) -> Vec<BlockReceiptProofs> {
    let mut blocks: BTreeMap<u64, BlockReceiptProofs> = BTreeMap::new();
    for proof in proofs {
        blocks
            .entry(proof.block_number())
            .or_insert_with(|| BlockReceiptProofs {
                receipt_proofs: Vec::new(),
                block_header_rlp: proof.header.rlp().clone(),
                block_number: proof.block_number(),
            })
            .receipt_proofs
            .push(proof.proof.clone());
    }
    blocks.into_values().collect()
}
