//! Relayer node: for every configured bridge pair, finds attested but unexecuted bridge
//! requests and relays their receipt proofs to the other side.

use alloy_primitives::{Address, B256};
use futures::future::join_all;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use blockrelay_common::signer::BlockSigner;
use blockrelay_common::storage::JsonMapStore;
use blockrelay_common::Classify;
use blockrelay_contracts::{AlloyBridge, AlloyMulticall};
use blockrelay_sdk::{ChainConfig, NetworkConfig, Relayer};

pub mod config;
pub mod cursor;
mod error;
pub mod pending;

pub use config::RelayerSettings;
pub use cursor::CursorStore;
pub use error::RelayerError;
pub use pending::{fetch_pending_bridge_requests, BridgeDirection, PendingRequests};

/// Environment variable holding the hex key that signs relay transactions.
pub const KEY_VAR: &str = "RELAYER_KEY";

/// What one tick of a direction did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectionReport {
    pub cycles: u32,
    /// Bridge request ids relayed.
    pub relayed: Vec<B256>,
    pub relay_txs: Vec<B256>,
    pub cursor: Option<u64>,
}

pub fn relayer_key_from_env() -> Result<BlockSigner, RelayerError> {
    let secret = std::env::var(KEY_VAR).map_err(|_| RelayerError::MissingKey)?;
    Ok(BlockSigner::from_hex(&secret)?)
}

fn bridge_address(chain: &ChainConfig) -> Result<Address, RelayerError> {
    chain
        .bridge_address
        .filter(|a| !a.is_zero())
        .ok_or(RelayerError::IncompleteChain { chain_id: chain.chain_id, field: "bridge_address" })
}

pub struct RelayerNode {
    relayer: Relayer,
    directions: Vec<BridgeDirection>,
    settings: RelayerSettings,
    cursors: CursorStore,
    poll_interval: Duration,
}

impl RelayerNode {
    pub fn new(
        relayer: Relayer, directions: Vec<BridgeDirection>, settings: RelayerSettings,
        cursors: CursorStore,
    ) -> Self {
        let poll_interval = settings.poll_interval();
        Self { relayer, directions, settings, cursors, poll_interval }
    }

    /// Builds the node from config: both directions of every pair, each with the source
    /// bridge to read requests from and the target multicall to check them against.
    pub async fn from_config(
        network: &NetworkConfig, settings: RelayerSettings, signer: &BlockSigner,
        config_dir: &Path,
    ) -> Result<Self, RelayerError> {
        let mut directions = Vec::new();
        for (source_chain, target_chain) in settings.directions() {
            let chain = |chain_id| {
                network.chain(chain_id).ok_or(RelayerError::IncompleteChain { chain_id, field: "rpc" })
            };
            let source = chain(source_chain)?;
            let target = chain(target_chain)?;
            let multicall = target.multicall_address.filter(|a| !a.is_zero()).ok_or(
                RelayerError::IncompleteChain { chain_id: target_chain, field: "multicall_address" },
            )?;
            directions.push(BridgeDirection {
                source_chain,
                target_chain,
                source_bridge: Arc::new(AlloyBridge::new(bridge_address(source)?, source.primary_rpc())?),
                target_bridge: bridge_address(target)?,
                multicall: Arc::new(AlloyMulticall::new(multicall, target.primary_rpc())?),
            });
        }
        let relayer = network.relayer(Some(signer)).await?;
        let store = JsonMapStore::new(config_dir.join(&settings.cursor_file));
        let cursors = CursorStore::open(store).await?;
        info!(
            relayer = %signer.address(),
            directions = directions.len(),
            "relayer initialized"
        );
        Ok(Self::new(relayer, directions, settings, cursors))
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn directions(&self) -> &[BridgeDirection] {
        &self.directions
    }

    pub async fn cursor(&self, direction: &BridgeDirection) -> Option<u64> {
        self.cursors.get(&direction.key()).await
    }

    /// Relays pending requests of one direction. Keeps going without waiting while the
    /// cursor moves and is still behind the checkpoint, up to `max_cycles_per_tick`.
    /// The cursor is saved only after the relay transaction confirmed.
    pub async fn run_direction(
        &self, direction: &BridgeDirection,
    ) -> Result<DirectionReport, RelayerError> {
        let key = direction.key();
        let mut report = DirectionReport::default();
        for _ in 0..self.settings.max_cycles_per_tick.max(1) {
            let cursor = self.cursors.get(&key).await;
            let pending = fetch_pending_bridge_requests(
                self.relayer.resolver(),
                direction,
                cursor,
                &self.settings,
            )
            .await?;
            report.cycles += 1;

            if !pending.requests.is_empty() {
                let outcome = self
                    .relayer
                    .relay_txs(
                        direction.source_chain,
                        direction.target_chain,
                        &pending.transaction_hashes(),
                    )
                    .await?;
                info!(
                    key = %key,
                    tx_hash = %outcome.relay_tx_hash,
                    checkpoint = outcome.checkpoint,
                    requests = pending.requests.len(),
                    "relay sent"
                );
                let receipt = outcome.confirmation.await?;
                info!(key = %key, tx_hash = %receipt.tx_hash, block = ?receipt.block_number, "relay confirmed");
                report.relay_txs.push(receipt.tx_hash);
                report.relayed.extend(pending.requests.iter().map(|r| r.id));
            }

            let advanced = self.cursors.advance(&key, pending.next_cursor).await?;
            if !advanced || pending.next_cursor >= pending.checkpoint {
                break;
            }
        }
        report.cursor = self.cursors.get(&key).await;
        Ok(report)
    }

    /// One tick of every direction, concurrently.
    pub async fn run_once(&self) -> Vec<(String, Result<DirectionReport, RelayerError>)> {
        let results = join_all(self.directions.iter().map(|d| self.run_direction(d))).await;
        self.directions
            .iter()
            .zip(results)
            .map(|(direction, result)| {
                let key = direction.key();
                if let Err(e) = &result {
                    error!(key = %key, error = %e, kind = %e.kind(), "relay cycle failed");
                }
                (key, result)
            })
            .collect()
    }

    /// Runs every direction on its own schedule until `cancel` fires. A failed tick waits
    /// for the next interval.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let tasks: Vec<_> = (0..self.directions.len())
            .map(|i| tokio::spawn(self.clone().direction_task(i, cancel.clone())))
            .collect();
        for task in tasks {
            let _ = task.await;
        }
        info!("relayer stopped");
    }

    async fn direction_task(self: Arc<Self>, index: usize, cancel: CancellationToken) {
        let Some(direction) = self.directions.get(index) else {
            return;
        };
        let key = direction.key();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {},
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                res = self.run_direction(direction) => match res {
                    Ok(report) if !report.relayed.is_empty() => {
                        info!(key = %key, relayed = report.relayed.len(), cursor = ?report.cursor, "tick done");
                    },
                    Ok(_) => {},
                    Err(e) => error!(key = %key, error = %e, kind = %e.kind(), "relay cycle failed"),
                },
            }
        }
    }
}
