use alloy_primitives::Address;
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use blockrelay_common::header::canonicalize;
use blockrelay_common::pool::ChainRpcPool;
use blockrelay_common::signer::{BlockSigner, SignerError};
use blockrelay_common::storage::JsonMapStore;
use blockrelay_common::types::SignedBlock;
use blockrelay_common::{fetch_bounded, Classify};
use blockrelay_contracts::{ConsensusClient, ContractError, RegistryClient};

use crate::{AttestationError, Config};

/// Chain whose attestations carry validator-set rotations.
pub const CYCLE_CHAIN_ID: u64 = 122;

/// Blocks to attest when the last attested block is `last` and the newest checkpoint is
/// `checkpoint`: the checkpoint alone on a first run, otherwise every step multiple after
/// `last` up to and including the checkpoint.
pub fn checkpoints_to_attest(last: Option<u64>, checkpoint: u64, step: u64) -> Vec<u64> {
    let step = step.max(1);
    match last {
        None => vec![checkpoint],
        Some(last) if last >= checkpoint => Vec::new(),
        Some(last) => {
            let first = (last / step + 1) * step;
            (first..checkpoint)
                .step_by(step as usize)
                .chain(std::iter::once(checkpoint))
                .collect()
        },
    }
}

/// What one chain cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub checkpoint: u64,
    pub attested: Vec<u64>,
    pub skipped: Vec<u64>,
}

/// Signs checkpoint headers of every tracked chain and publishes them to the registry.
pub struct AttestationLoop {
    config: Config,
    pool: Arc<ChainRpcPool>,
    registry: Arc<dyn RegistryClient>,
    consensus: Option<Arc<dyn ConsensusClient>>,
    signers: Vec<BlockSigner>,
    store: JsonMapStore<u64, u64>,
    /// Last attested block per chain, advanced before submission.
    attested: Mutex<BTreeMap<u64, u64>>,
    /// What the state file holds: only blocks whose submission was accepted.
    saved: Mutex<BTreeMap<u64, u64>>,
    poll_interval: Duration,
}

impl AttestationLoop {
    /// Seeds `pool` with the configured endpoints and restores the last attested blocks.
    pub async fn new(
        config: Config, pool: Arc<ChainRpcPool>, registry: Arc<dyn RegistryClient>,
        consensus: Option<Arc<dyn ConsensusClient>>, signers: Vec<BlockSigner>,
        store: JsonMapStore<u64, u64>,
    ) -> Result<Self, AttestationError> {
        if signers.is_empty() {
            return Err(AttestationError::MissingKeys);
        }
        for chain in &config.chains {
            pool.set_endpoints(chain.chain_id, &chain.rpc).await;
        }
        let attested = store.load().await?;
        info!(
            validators = ?signers.iter().map(BlockSigner::address).collect::<Vec<_>>(),
            restored = attested.len(),
            "attestation loop ready"
        );
        let poll_interval = Duration::from_secs(config.poll_interval_secs);
        Ok(Self {
            config,
            pool,
            registry,
            consensus,
            signers,
            store,
            saved: Mutex::new(attested.clone()),
            attested: Mutex::new(attested),
            poll_interval,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub async fn last_attested(&self, chain_id: u64) -> Option<u64> {
        self.attested.lock().await.get(&chain_id).copied()
    }

    /// Chains with a known endpoint. The registry's own chain is only attested when it is
    /// configured explicitly.
    pub async fn tracked_chains(&self) -> Vec<u64> {
        let registry_chain = self.config.registry.chain_id;
        let configured = |id: &u64| self.config.chains.iter().any(|c| c.chain_id == *id);
        self.pool
            .chain_ids()
            .await
            .into_iter()
            .filter(|id| *id != registry_chain || configured(id))
            .collect()
    }

    /// Reloads chain endpoints from the registry once the refresh interval has passed.
    pub async fn refresh_rpcs(&self, now: Instant) -> Result<bool, ContractError> {
        self.pool.refresh_if_due(now, || self.registry.rpc_list()).await
    }

    /// One attestation cycle for `chain_id`.
    pub async fn run_chain_cycle(&self, chain_id: u64) -> Result<CycleReport, AttestationError> {
        let step = self.config.step_size.max(1);
        let rpc = self.pool.client(chain_id).await?;
        let head = match rpc.block_number().await {
            Ok(head) => head,
            Err(e) => {
                self.pool.invalidate(chain_id).await;
                return Err(e.into());
            },
        };
        let checkpoint = head / step * step;
        let last = self.last_attested(chain_id).await;
        let targets = checkpoints_to_attest(last, checkpoint, step);
        let mut report = CycleReport { checkpoint, ..Default::default() };
        if targets.is_empty() {
            debug!(chain_id, checkpoint, "nothing new to attest");
            return Ok(report);
        }

        let fetched = fetch_bounded(targets.iter().copied(), self.config.fetch_concurrency, |n| {
            rpc.block_by_number(n)
        })
        .await;
        let blocks = match fetched {
            Ok(blocks) => blocks,
            Err(e) => {
                self.pool.invalidate(chain_id).await;
                return Err(e.into());
            },
        };

        let cycle = match (&self.consensus, chain_id) {
            (Some(consensus), CYCLE_CHAIN_ID) => Some(consensus.cycle_info().await?),
            _ => None,
        };
        let mut pending_cycle = cycle.as_ref();
        let no_validators: &[Address] = &[];
        let mut signed = Vec::new();

        for (number, block) in targets.iter().copied().zip(&blocks) {
            let header = match canonicalize(block, chain_id) {
                Ok(header) => header,
                Err(e) => {
                    warn!(chain_id, block = number, error = %e, kind = %e.kind(), "skipping block");
                    report.skipped.push(number);
                    continue;
                },
            };
            let embed = pending_cycle
                .filter(|c| last.unwrap_or(0) < c.cycle_start && c.cycle_start <= number);
            let (cycle_end, validators) = match embed {
                Some(c) => (c.cycle_end, c.validators.as_slice()),
                None => (0, no_validators),
            };
            match self.sign_all(header.rlp(), chain_id, cycle_end, validators) {
                Ok(mut blocks) => {
                    if let Some(c) = embed {
                        info!(
                            chain_id,
                            block = number,
                            cycle_end = c.cycle_end,
                            validators = c.validators.len(),
                            "validator set embedded"
                        );
                        pending_cycle = None;
                    }
                    signed.append(&mut blocks);
                    report.attested.push(number);
                },
                Err(e) => {
                    warn!(chain_id, block = number, error = %e, "cannot sign block, skipping");
                    report.skipped.push(number);
                },
            }
        }

        self.attested.lock().await.insert(chain_id, checkpoint);
        for chunk in signed.chunks(self.config.submit_chunk_size.max(1)) {
            let tx_hash = self.registry.add_signed_blocks(chunk).await?;
            info!(chain_id, blocks = chunk.len(), %tx_hash, "signed blocks submitted");
        }
        self.persist(chain_id, checkpoint).await?;
        info!(chain_id, checkpoint, attested = ?report.attested, "attestation cycle done");
        Ok(report)
    }

    fn sign_all(
        &self, rlp: &[u8], chain_id: u64, cycle_end: u64, validators: &[Address],
    ) -> Result<Vec<SignedBlock>, SignerError> {
        self.signers.iter().map(|s| s.sign(rlp, chain_id, cycle_end, validators)).collect()
    }

    /// Records `checkpoint` for `chain_id` in the state file. The saved map stays locked
    /// until the write finished, so concurrent chains never write an older map last.
    async fn persist(&self, chain_id: u64, checkpoint: u64) -> Result<(), AttestationError> {
        let mut saved = self.saved.lock().await;
        let previous = saved.insert(chain_id, checkpoint);
        if let Err(e) = self.store.save(&saved).await {
            match previous {
                Some(previous) => saved.insert(chain_id, previous),
                None => saved.remove(&chain_id),
            };
            return Err(e.into());
        }
        Ok(())
    }

    /// Refreshes endpoints if due, then runs one cycle for every tracked chain concurrently.
    pub async fn run_once(&self) -> Vec<(u64, Result<CycleReport, AttestationError>)> {
        if let Err(e) = self.refresh_rpcs(Instant::now()).await {
            warn!(error = %e, "rpc list refresh failed");
        }
        let chains = self.tracked_chains().await;
        let results = join_all(chains.iter().map(|id| self.run_chain_cycle(*id))).await;
        for (chain_id, res) in chains.iter().zip(&results) {
            if let Err(e) = res {
                error!(chain_id, error = %e, kind = %e.kind(), "attestation cycle failed");
            }
        }
        chains.into_iter().zip(results).collect()
    }

    /// Runs until `cancel` fires: one task per tracked chain, plus the endpoint refresh.
    /// Chains that appear after a refresh get their own task on the next tick.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let refresh = tokio::spawn(self.clone().refresh_task(cancel.clone()));
        let mut tasks: HashMap<u64, JoinHandle<()>> = HashMap::new();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    for chain_id in self.tracked_chains().await {
                        if tasks.contains_key(&chain_id) {
                            continue;
                        }
                        info!(chain_id, "tracking chain");
                        let task = tokio::spawn(self.clone().chain_task(chain_id, cancel.clone()));
                        tasks.insert(chain_id, task);
                    }
                },
            }
        }

        for (_, task) in tasks {
            let _ = task.await;
        }
        let _ = refresh.await;
        info!("attestation loop stopped");
    }

    async fn chain_task(self: Arc<Self>, chain_id: u64, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {},
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                res = self.run_chain_cycle(chain_id) => {
                    if let Err(e) = res {
                        error!(chain_id, error = %e, kind = %e.kind(), "attestation cycle failed");
                    }
                },
            }
        }
    }

    async fn refresh_task(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh_rpcs(Instant::now()).await {
                        warn!(error = %e, "rpc list refresh failed");
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use alloy_primitives::keccak256;
    use blockrelay_common::config::{ChainEndpoint, RegistryConfig};
    use blockrelay_common::pool::Connector;
    use blockrelay_common::rpc::{ChainRpc, RpcError};
    use blockrelay_common::test_utils::FakeChain;
    use blockrelay_common::types::CycleInfo;
    use blockrelay_contracts::test_utils::{FakeConsensus, FakeRegistry};
    use std::path::{Path, PathBuf};

    const REGISTRY_CHAIN: u64 = 999;

    fn config(step_size: u64, chains: &[u64]) -> Config {
        Config {
            step_size,
            poll_interval_secs: 1,
            rpc_refresh_interval_secs: 3600,
            rpc_timeout_secs: 5,
            fetch_concurrency: 50,
            submit_chunk_size: 10,
            state_file: PathBuf::from("attested.json"),
            registry: RegistryConfig {
                chain_id: REGISTRY_CHAIN,
                rpc_url: "http://registry".into(),
                address: Address::repeat_byte(0xaa),
            },
            consensus_address: None,
            chains: chains
                .iter()
                .map(|id| ChainEndpoint { chain_id: *id, rpc: format!("http://chain-{}", id) })
                .collect(),
        }
    }

    fn connector(chains: &[FakeChain]) -> Connector {
        let by_url: HashMap<String, FakeChain> = chains
            .iter()
            .map(|c| (format!("http://chain-{}", c.chain_id()), c.clone()))
            .collect();
        Arc::new(move |url: &str| {
            by_url.get(url).cloned().map(|c| Arc::new(c) as Arc<dyn ChainRpc>).ok_or_else(|| {
                RpcError::Connect { endpoint: url.to_string(), message: "unknown".into() }
            })
        })
    }

    async fn attestation(
        config: Config, chains: &[FakeChain], registry: &FakeRegistry,
        consensus: Option<FakeConsensus>, keys: u8, state: &Path,
    ) -> AttestationLoop {
        let pool = Arc::new(ChainRpcPool::new(connector(chains), Duration::from_secs(3600)));
        let signers =
            (1..=keys).map(|i| BlockSigner::from_hex(&format!("{:064x}", i)).unwrap()).collect();
        let consensus = consensus.map(|c| Arc::new(c) as Arc<dyn ConsensusClient>);
        AttestationLoop::new(
            config,
            pool,
            Arc::new(registry.clone()),
            consensus,
            signers,
            JsonMapStore::new(state),
        )
        .await
        .unwrap()
    }

    async fn saved(path: &Path) -> BTreeMap<u64, u64> {
        JsonMapStore::<u64, u64>::new(path).load().await.unwrap()
    }

    async fn preset(path: &Path, entries: &[(u64, u64)]) {
        JsonMapStore::<u64, u64>::new(path).save(&entries.iter().copied().collect()).await.unwrap();
    }

    fn chain(id: u64, head: u64) -> FakeChain {
        let chain = FakeChain::new(id);
        chain.push_range(0, head);
        chain
    }

    fn signed_hashes(batch: &[SignedBlock]) -> Vec<alloy_primitives::B256> {
        batch.iter().map(|b| b.block_hash).collect()
    }

    #[test]
    fn should_list_blocks_to_attest() {
        assert_eq!(checkpoints_to_attest(None, 500, 100), vec![500]);
        assert_eq!(checkpoints_to_attest(Some(500), 500, 100), Vec::<u64>::new());
        assert_eq!(checkpoints_to_attest(Some(600), 500, 100), Vec::<u64>::new());
        assert_eq!(checkpoints_to_attest(Some(200), 500, 100), vec![300, 400, 500]);
        assert_eq!(checkpoints_to_attest(Some(250), 500, 100), vec![300, 400, 500]);
        assert_eq!(checkpoints_to_attest(Some(400), 500, 100), vec![500]);
    }

    #[tokio::test]
    async fn first_run_attests_only_the_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("attested.json");
        let source = chain(1, 257);
        let registry = FakeRegistry::new();
        let attestation =
            attestation(config(100, &[1]), &[source.clone()], &registry, None, 1, &state).await;

        let report = attestation.run_chain_cycle(1).await.unwrap();
        assert_eq!(report.checkpoint, 200);
        assert_eq!(report.attested, vec![200]);
        assert_eq!(source.block_requests(), vec![200]);

        let batches = registry.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(signed_hashes(&batches[0]), vec![source.block_hash(200).unwrap()]);
        assert_eq!(keccak256(&batches[0][0].rlp_header), source.block_hash(200).unwrap());
        assert_eq!(saved(&state).await, BTreeMap::from([(1, 200)]));

        // same checkpoint, nothing to do
        let report = attestation.run_chain_cycle(1).await.unwrap();
        assert!(report.attested.is_empty());
        assert_eq!(registry.batches().len(), 1);
    }

    #[tokio::test]
    async fn should_attest_every_skipped_multiple() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("attested.json");
        preset(&state, &[(1, 200)]).await;
        let source = chain(1, 512);
        let registry = FakeRegistry::new();
        let attestation =
            attestation(config(100, &[1]), &[source.clone()], &registry, None, 2, &state).await;

        let report = attestation.run_chain_cycle(1).await.unwrap();
        assert_eq!(report.attested, vec![300, 400, 500]);
        let h = |n| source.block_hash(n).unwrap();
        assert_eq!(
            signed_hashes(&registry.batches()[0]),
            vec![h(300), h(300), h(400), h(400), h(500), h(500)]
        );
        // two validators over three blocks
        assert_eq!(registry.events().len(), 6);
        assert_eq!(saved(&state).await, BTreeMap::from([(1, 500)]));
    }

    #[tokio::test]
    async fn submits_in_bounded_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("attested.json");
        preset(&state, &[(1, 0)]).await;
        let source = chain(1, 125);
        let registry = FakeRegistry::new();
        let attestation =
            attestation(config(10, &[1]), &[source], &registry, None, 2, &state).await;

        let report = attestation.run_chain_cycle(1).await.unwrap();
        assert_eq!(report.attested.len(), 12);
        let sizes: Vec<usize> = registry.batches().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![10, 10, 4]);
    }

    #[tokio::test]
    async fn validator_set_is_embedded_once_on_cycle_chain() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("attested.json");
        preset(&state, &[(CYCLE_CHAIN_ID, 200)]).await;
        let source = chain(CYCLE_CHAIN_ID, 512);
        let registry = FakeRegistry::new();
        let validators = vec![Address::repeat_byte(7), Address::repeat_byte(8)];
        let consensus = FakeConsensus::new(CycleInfo {
            cycle_start: 250,
            cycle_end: 999,
            validators: validators.clone(),
        });
        let attestation = attestation(
            config(100, &[CYCLE_CHAIN_ID]),
            &[source],
            &registry,
            Some(consensus.clone()),
            1,
            &state,
        )
        .await;

        attestation.run_chain_cycle(CYCLE_CHAIN_ID).await.unwrap();
        let batch = &registry.batches()[0];
        let cycles: Vec<(u64, usize)> =
            batch.iter().map(|b| (b.cycle_end, b.validators.len())).collect();
        assert_eq!(cycles, vec![(999, 2), (0, 0), (0, 0)]);
        assert_eq!(batch[0].validators, validators);
        assert_eq!(consensus.calls(), 1);
    }

    #[tokio::test]
    async fn validator_set_is_not_embedded_without_a_new_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("attested.json");
        preset(&state, &[(CYCLE_CHAIN_ID, 200)]).await;
        let registry = FakeRegistry::new();
        let consensus = FakeConsensus::new(CycleInfo {
            cycle_start: 150,
            cycle_end: 999,
            validators: vec![Address::repeat_byte(7)],
        });
        let attestation = attestation(
            config(100, &[CYCLE_CHAIN_ID]),
            &[chain(CYCLE_CHAIN_ID, 400)],
            &registry,
            Some(consensus),
            1,
            &state,
        )
        .await;

        attestation.run_chain_cycle(CYCLE_CHAIN_ID).await.unwrap();
        assert!(registry.batches()[0].iter().all(|b| b.cycle_end == 0 && b.validators.is_empty()));
    }

    #[tokio::test]
    async fn other_chains_do_not_read_the_consensus_contract() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FakeRegistry::new();
        let consensus = FakeConsensus::new(CycleInfo::default());
        let attestation = attestation(
            config(100, &[1]),
            &[chain(1, 300)],
            &registry,
            Some(consensus.clone()),
            1,
            &dir.path().join("attested.json"),
        )
        .await;
        attestation.run_chain_cycle(1).await.unwrap();
        assert_eq!(consensus.calls(), 0);
    }

    #[tokio::test]
    async fn bad_block_is_skipped_and_the_rest_submitted() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("attested.json");
        preset(&state, &[(1, 200)]).await;
        let source = chain(1, 512);
        let mut corrupted = source.block(400).unwrap();
        corrupted["gasUsed"] = serde_json::json!("0x1");
        source.overwrite_block(400, corrupted);
        let registry = FakeRegistry::new();
        let attestation =
            attestation(config(100, &[1]), &[source.clone()], &registry, None, 1, &state).await;

        let report = attestation.run_chain_cycle(1).await.unwrap();
        assert_eq!(report.attested, vec![300, 500]);
        assert_eq!(report.skipped, vec![400]);
        assert_eq!(
            signed_hashes(&registry.batches()[0]),
            vec![source.block_hash(300).unwrap(), source.block_hash(500).unwrap()]
        );
        assert_eq!(saved(&state).await, BTreeMap::from([(1, 500)]));
    }

    #[tokio::test]
    async fn failed_submission_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("attested.json");
        preset(&state, &[(1, 200)]).await;
        let source = chain(1, 512);
        let registry = FakeRegistry::new();
        registry.fail_submit(true);
        let first =
            attestation(config(100, &[1]), &[source.clone()], &registry, None, 1, &state).await;

        let err = first.run_chain_cycle(1).await.unwrap_err();
        assert!(matches!(err, AttestationError::Contract(_)));
        assert_eq!(saved(&state).await, BTreeMap::from([(1, 200)]));
        // advanced in memory only
        assert_eq!(first.last_attested(1).await, Some(500));
        assert!(first.run_chain_cycle(1).await.unwrap().attested.is_empty());

        // a restart picks up from the persisted block
        registry.fail_submit(false);
        let restarted =
            attestation(config(100, &[1]), &[source], &registry, None, 1, &state).await;
        let report = restarted.run_chain_cycle(1).await.unwrap();
        assert_eq!(report.attested, vec![300, 400, 500]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_chains_keep_every_saved_entry() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("attested.json");
        let ids: Vec<u64> = (1..=6).collect();
        let chains: Vec<FakeChain> = ids.iter().map(|id| chain(*id, 0)).collect();
        let registry = FakeRegistry::new();
        let attestation = attestation(config(100, &ids), &chains, &registry, None, 1, &state).await;

        for head in [100u64, 200, 300, 400] {
            for source in &chains {
                source.push_range(head - 99, head);
            }
            for (chain_id, result) in attestation.run_once().await {
                assert_eq!(result.unwrap().checkpoint, head, "chain {}", chain_id);
            }
            let expected: BTreeMap<u64, u64> = ids.iter().map(|id| (*id, head)).collect();
            assert_eq!(saved(&state).await, expected);
        }
    }

    #[tokio::test]
    async fn unsubmitted_block_of_one_chain_is_not_saved_by_another() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("attested.json");
        preset(&state, &[(1, 200), (2, 200)]).await;
        let registry = FakeRegistry::new();
        let attestation = attestation(
            config(100, &[1, 2]),
            &[chain(1, 500), chain(2, 500)],
            &registry,
            None,
            1,
            &state,
        )
        .await;

        registry.fail_submit(true);
        assert!(attestation.run_chain_cycle(1).await.is_err());
        assert_eq!(attestation.last_attested(1).await, Some(500));

        registry.fail_submit(false);
        attestation.run_chain_cycle(2).await.unwrap();
        assert_eq!(saved(&state).await, BTreeMap::from([(1, 200), (2, 500)]));
    }

    #[tokio::test]
    async fn one_failing_chain_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        let healthy = chain(1, 300);
        let broken = chain(5, 300);
        broken.fail_all(true);
        let registry = FakeRegistry::new();
        let attestation = attestation(
            config(100, &[1, 5]),
            &[healthy, broken],
            &registry,
            None,
            1,
            &dir.path().join("attested.json"),
        )
        .await;

        let results = attestation.run_once().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, 1);
        assert_eq!(results[0].1.as_ref().unwrap().attested, vec![300]);
        assert_eq!(results[1].0, 5);
        assert!(matches!(results[1].1, Err(AttestationError::Rpc(_))));
    }

    #[tokio::test]
    async fn registry_rpcs_add_chains_but_not_the_registry_chain() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FakeRegistry::new();
        registry.set_rpcs(vec![
            (7, "http://chain-7".to_string()),
            (REGISTRY_CHAIN, "http://chain-999".to_string()),
        ]);
        let attestation = attestation(
            config(100, &[1]),
            &[chain(1, 300), chain(7, 300)],
            &registry,
            None,
            1,
            &dir.path().join("attested.json"),
        )
        .await;

        let results = attestation.run_once().await;
        let chains: Vec<u64> = results.iter().map(|(id, _)| *id).collect();
        assert_eq!(chains, vec![1, 7]);
        assert!(results.iter().all(|(_, res)| res.is_ok()));
        assert_eq!(registry.rpc_list_calls(), 1);

        // not due again within the refresh interval
        attestation.run_once().await;
        assert_eq!(registry.rpc_list_calls(), 1);
    }

    #[tokio::test]
    async fn run_stops_when_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FakeRegistry::new();
        let attestation = Arc::new(
            attestation(
                config(100, &[1]),
                &[chain(1, 300)],
                &registry,
                None,
                1,
                &dir.path().join("attested.json"),
            )
            .await
            .with_poll_interval(Duration::from_millis(10)),
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(attestation.clone().run(cancel.clone()));

        tokio::time::timeout(Duration::from_secs(5), async {
            while registry.batches().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        assert_eq!(attestation.last_attested(1).await, Some(300));
    }
}
