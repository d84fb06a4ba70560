//! Validator node: watches the configured chains and attests their checkpoint headers in
//! the block registry.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use blockrelay_common::config::{ChainEndpoint, RegistryConfig};
use blockrelay_common::pool::ChainRpcPool;
use blockrelay_common::signer::BlockSigner;
use blockrelay_common::storage::JsonMapStore;
use blockrelay_contracts::{AlloyConsensus, AlloyRegistry, ConsensusClient};

pub mod attest;
mod error;

pub use attest::{checkpoints_to_attest, AttestationLoop, CycleReport, CYCLE_CHAIN_ID};
pub use error::AttestationError;

/// Comma-separated hex keys the node signs with. The first one pays for registry writes.
pub const KEYS_VAR: &str = "VALIDATOR_KEYS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// The configuration for the Validator.
pub struct Config {
    /// Checkpoint granularity in blocks.
    pub step_size: u64,
    pub poll_interval_secs: u64,
    #[serde(default = "default_rpc_refresh_interval_secs")]
    pub rpc_refresh_interval_secs: u64,
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    #[serde(default = "default_submit_chunk_size")]
    pub submit_chunk_size: usize,
    /// Last attested block per chain. Relative paths live in the config directory.
    pub state_file: PathBuf,
    pub registry: RegistryConfig,
    /// Consensus contract on chain 122. Zero or absent disables validator-set embedding.
    #[serde(default)]
    pub consensus_address: Option<Address>,
    #[serde(default)]
    pub chains: Vec<ChainEndpoint>,
}

fn default_rpc_refresh_interval_secs() -> u64 {
    3600
}

fn default_rpc_timeout_secs() -> u64 {
    30
}

fn default_fetch_concurrency() -> usize {
    50
}

fn default_submit_chunk_size() -> usize {
    10
}

impl Config {
    pub fn consensus(&self) -> Option<Address> {
        self.consensus_address.filter(|a| !a.is_zero())
    }

    pub fn state_path(&self, config_dir: &Path) -> PathBuf {
        config_dir.join(&self.state_file)
    }

    /// RPC used for consensus reads: the first chain 122 seed, else the registry's.
    fn consensus_rpc(&self) -> &str {
        self.chains
            .iter()
            .find(|c| c.chain_id == CYCLE_CHAIN_ID)
            .and_then(|c| c.rpc.split(',').next())
            .map(str::trim)
            .unwrap_or(&self.registry.rpc_url)
    }
}

/// Parses the value of [`KEYS_VAR`].
pub fn parse_signers(keys: Option<&str>) -> Result<Vec<BlockSigner>, AttestationError> {
    let keys = keys.map(str::trim).filter(|k| !k.is_empty()).ok_or(AttestationError::MissingKeys)?;
    Ok(BlockSigner::from_hex_list(keys)?)
}

pub fn signers_from_env() -> Result<Vec<BlockSigner>, AttestationError> {
    parse_signers(std::env::var(KEYS_VAR).ok().as_deref())
}

/// Builds the attestation loop against the real registry and chains.
pub async fn init(
    config: Config, config_dir: &Path, signers: Vec<BlockSigner>,
) -> Result<AttestationLoop, AttestationError> {
    let payer = signers.first().ok_or(AttestationError::MissingKeys)?;
    let registry =
        AlloyRegistry::new(config.registry.address, &config.registry.rpc_url, Some(payer))?;
    let consensus = match config.consensus() {
        Some(address) => {
            let client = AlloyConsensus::new(address, config.consensus_rpc())?;
            Some(Arc::new(client) as Arc<dyn ConsensusClient>)
        },
        None => None,
    };
    let pool = Arc::new(ChainRpcPool::with_json_rpc(
        Duration::from_secs(config.rpc_timeout_secs),
        Duration::from_secs(config.rpc_refresh_interval_secs),
    ));
    let store = JsonMapStore::new(config.state_path(config_dir));
    info!(state = ?store.path(), registry = %config.registry.address, "validator initialized");
    AttestationLoop::new(config, pool, Arc::new(registry), consensus, signers, store).await
}
