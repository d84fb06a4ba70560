use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use blockrelay_common::config::RegistryConfig;
use blockrelay_common::pool::ChainRpcPool;
use blockrelay_common::signer::BlockSigner;
use blockrelay_contracts::{AlloyRegistry, AlloyVerifier, RegistryClient};

use crate::checkpoint::{
    CheckpointResolver, ResolveMode, DEFAULT_LOOKBACK, DEFAULT_MAX_FORWARD_CHECKPOINTS,
};
use crate::relay::Relayer;
use crate::SdkError;

/// One chain the relay network touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    /// Comma-separated alternates.
    pub rpc: String,
    #[serde(default)]
    pub bridge_address: Option<Address>,
    #[serde(default)]
    pub multicall_address: Option<Address>,
    /// Legacy gas price in wei for relay transactions on this chain.
    #[serde(default)]
    pub gas_price: Option<u64>,
}

/// Network-wide settings shared by the relayer node and the SDK CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub step_size: u64,
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
    #[serde(default = "default_lookback")]
    pub checkpoint_lookback: u64,
    #[serde(default = "default_max_forward")]
    pub max_forward_checkpoints: u32,
    #[serde(default)]
    pub resolve_mode: ResolveMode,
    pub registry: RegistryConfig,
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
}

fn default_rpc_timeout_secs() -> u64 {
    30
}

fn default_lookback() -> u64 {
    DEFAULT_LOOKBACK
}

fn default_max_forward() -> u32 {
    DEFAULT_MAX_FORWARD_CHECKPOINTS
}

impl ChainConfig {
    /// The first alternate, used for contract calls and transactions.
    pub fn primary_rpc(&self) -> &str {
        self.rpc.split(',').next().unwrap_or_default().trim()
    }
}

impl NetworkConfig {
    pub fn chain(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    /// A pool seeded with every configured chain endpoint.
    pub async fn rpc_pool(&self) -> Arc<ChainRpcPool> {
        let pool = ChainRpcPool::with_json_rpc(self.rpc_timeout(), Duration::from_secs(3600));
        for chain in &self.chains {
            pool.set_endpoints(chain.chain_id, &chain.rpc).await;
        }
        Arc::new(pool)
    }

    pub fn registry_client(&self) -> Result<Arc<dyn RegistryClient>, SdkError> {
        let registry = AlloyRegistry::new(self.registry.address, &self.registry.rpc_url, None)?;
        Ok(Arc::new(registry))
    }

    pub fn resolver(&self, registry: Arc<dyn RegistryClient>) -> CheckpointResolver {
        CheckpointResolver::new(registry, self.step_size)
            .with_lookback(self.checkpoint_lookback)
            .with_max_forward(self.max_forward_checkpoints)
            .with_mode(self.resolve_mode)
    }

    /// A relayer with a verifier for every chain that has a bridge address, which is also
    /// the source bridge of relays from that chain. Submissions
    /// are signed by `signer`.
    pub async fn relayer(&self, signer: Option<&BlockSigner>) -> Result<Relayer, SdkError> {
        let resolver = self.resolver(self.registry_client()?);
        let mut relayer = Relayer::new(self.rpc_pool().await, resolver);
        for chain in &self.chains {
            let Some(bridge) = chain.bridge_address else {
                continue;
            };
            let verifier = AlloyVerifier::new(bridge, chain.primary_rpc(), signer)?;
            relayer = relayer
                .with_verifier(chain.chain_id, Arc::new(verifier), chain.gas_price.map(u128::from))
                .with_source_bridge(chain.chain_id, bridge);
        }
        Ok(relayer)
    }
}
