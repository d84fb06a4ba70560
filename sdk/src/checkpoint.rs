//! Finds the registry attestation that covers a source block.
//!
//! Validators sign every `step_size`-th block. A receipt in block `n` is proven against the
//! first checkpoint at or above `n`; if validators skipped that one, the next is used.

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use blockrelay_common::rpc::ChainRpc;
use blockrelay_common::types::{BlockAddedEvent, Signature};
use blockrelay_contracts::RegistryClient;

use crate::SdkError;

pub const DEFAULT_LOOKBACK: u64 = 50_000;
pub const DEFAULT_MAX_FORWARD_CHECKPOINTS: u32 = 10;

/// Where signatures are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveMode {
    /// `BlockAdded` events in the registry's recent history.
    #[default]
    Events,
    /// The registry's `getSignedBlock` view.
    Registry,
}

/// Aggregated signatures for one checkpoint block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCheckpoint {
    pub block_number: u64,
    pub block_hash: B256,
    pub signatures: Vec<Signature>,
    pub signers: Vec<Address>,
    pub cycle_end: u64,
    pub validators: Vec<Address>,
}

pub struct CheckpointResolver {
    registry: Arc<dyn RegistryClient>,
    step_size: u64,
    lookback: u64,
    max_forward: u32,
    mode: ResolveMode,
}

impl CheckpointResolver {
    pub fn new(registry: Arc<dyn RegistryClient>, step_size: u64) -> Self {
        Self {
            registry,
            step_size: step_size.max(1),
            lookback: DEFAULT_LOOKBACK,
            max_forward: DEFAULT_MAX_FORWARD_CHECKPOINTS,
            mode: ResolveMode::default(),
        }
    }

    pub fn with_lookback(mut self, lookback: u64) -> Self {
        self.lookback = lookback;
        self
    }

    pub fn with_max_forward(mut self, max_forward: u32) -> Self {
        self.max_forward = max_forward;
        self
    }

    pub fn with_mode(mut self, mode: ResolveMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn step_size(&self) -> u64 {
        self.step_size
    }

    /// First multiple of the step size at or above `block`.
    pub fn nearest_checkpoint(&self, block: u64) -> u64 {
        block.div_ceil(self.step_size) * self.step_size
    }

    /// Resolves the checkpoint covering `block` on `chain_id`, moving forward one step at a
    /// time while nothing is signed and `source` has already passed the next checkpoint.
    pub async fn resolve(
        &self, source: &dyn ChainRpc, chain_id: u64, block: u64,
    ) -> Result<ResolvedCheckpoint, SdkError> {
        let mut checkpoint = self.nearest_checkpoint(block);
        for _ in 0..=self.max_forward {
            if let Some(found) = self.lookup(chain_id, checkpoint).await? {
                info!(
                    chain_id,
                    block,
                    checkpoint,
                    signatures = found.signatures.len(),
                    "checkpoint resolved"
                );
                return Ok(found);
            }
            let next = checkpoint + self.step_size;
            let height = source.block_number().await?;
            if height < next {
                break;
            }
            debug!(chain_id, checkpoint, next, height, "checkpoint unsigned, trying the next one");
            checkpoint = next;
        }
        Err(SdkError::CheckpointNotFound { chain_id, block })
    }

    async fn lookup(
        &self, chain_id: u64, number: u64,
    ) -> Result<Option<ResolvedCheckpoint>, SdkError> {
        match self.mode {
            ResolveMode::Events => {
                let head = self.registry.head().await?;
                let events = self
                    .registry
                    .block_added_events(chain_id, Some(number), head.saturating_sub(self.lookback), head)
                    .await?;
                Ok(most_signed(&events))
            },
            ResolveMode::Registry => {
                let signed = self.registry.signed_block(chain_id, number).await?;
                Ok(signed.filter(|s| !s.signatures.is_empty()).map(|s| ResolvedCheckpoint {
                    block_number: number,
                    block_hash: s.block_hash,
                    signatures: s.signatures,
                    signers: Vec::new(),
                    cycle_end: s.cycle_end,
                    validators: s.validators,
                }))
            },
        }
    }

    /// Highest source block with any attestation in the look-back window.
    pub async fn latest_checkpoint(&self, chain_id: u64) -> Result<u64, SdkError> {
        let head = self.registry.head().await?;
        let events = self
            .registry
            .block_added_events(chain_id, None, head.saturating_sub(self.lookback), head)
            .await?;
        events
            .iter()
            .map(|e| e.block_number)
            .max()
            .ok_or(SdkError::NoRecentCheckpoint(chain_id))
    }
}

/// Groups events by signed payload and returns the group with the most distinct validators.
/// Ties go to the group seen first.
pub fn most_signed(events: &[BlockAddedEvent]) -> Option<ResolvedCheckpoint> {
    let mut groups: Vec<(B256, Vec<&BlockAddedEvent>)> = Vec::new();
    for event in events {
        match groups.iter_mut().find(|(payload, _)| *payload == event.payload) {
            Some((_, members)) => {
                if members.iter().all(|m| m.validator != event.validator) {
                    members.push(event);
                }
            },
            None => groups.push((event.payload, vec![event])),
        }
    }

    let mut best: Option<&Vec<&BlockAddedEvent>> = None;
    for (_, members) in &groups {
        if best.map_or(true, |b| members.len() > b.len()) {
            best = Some(members);
        }
    }
    let members = best?;
    let first = members.first()?;

    let (signers, signatures): (Vec<Address>, Vec<Signature>) =
        members.iter().map(|m| (m.validator, m.signature)).unzip();
    Some(ResolvedCheckpoint {
        block_number: first.block_number,
        block_hash: first.block_hash,
        signatures,
        signers,
        cycle_end: first.cycle_end,
        validators: first.validators.clone(),
    })
}
