//! In-memory contracts for tests.

use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::SolValue;
use async_trait::async_trait;
use futures::FutureExt;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use blockrelay_common::rpc::RpcLog;
use blockrelay_common::signer::{recover_signer, signing_payload};
use blockrelay_common::types::{BlockAddedEvent, BridgeRequest, CycleInfo, SignedBlock};

use crate::{
    bridge_request_topic, BridgeClient, ConsensusClient, ContractError, MulticallClient,
    PendingRelay, RegistryClient, RegistrySignedBlock, RelayReceipt, VerifierClient,
    VerifierSubmission,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// The log a source bridge emits for `request`.
pub fn bridge_request_log(bridge: Address, request: &BridgeRequest) -> RpcLog {
    let data =
        (request.amount, U256::from(request.target_chain_id), request.relay).abi_encode_params();
    RpcLog {
        address: bridge,
        topics: vec![
            bridge_request_topic(),
            request.from.into_word(),
            request.to.into_word(),
            request.id,
        ],
        data: data.into(),
        log_index: None,
    }
}

#[derive(Default)]
struct RegistryState {
    head: u64,
    rpcs: Vec<(u64, String)>,
    events: Vec<BlockAddedEvent>,
    batches: Vec<Vec<SignedBlock>>,
    signed: BTreeMap<(u64, u64), RegistrySignedBlock>,
    fail_submit: bool,
    fail_reads: bool,
    rpc_list_calls: usize,
}

/// A registry that records submissions and turns them into `BlockAdded` events,
/// ignoring repeat signatures from the same validator over the same payload.
#[derive(Clone, Default)]
pub struct FakeRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_head(&self, head: u64) {
        lock(&self.state).head = head;
    }

    pub fn set_rpcs(&self, rpcs: Vec<(u64, String)>) {
        lock(&self.state).rpcs = rpcs;
    }

    pub fn fail_submit(&self, fail: bool) {
        lock(&self.state).fail_submit = fail;
    }

    pub fn fail_reads(&self, fail: bool) {
        lock(&self.state).fail_reads = fail;
    }

    pub fn rpc_list_calls(&self) -> usize {
        lock(&self.state).rpc_list_calls
    }

    /// Every accepted `add_signed_blocks` call, in order.
    pub fn batches(&self) -> Vec<Vec<SignedBlock>> {
        lock(&self.state).batches.clone()
    }

    pub fn events(&self) -> Vec<BlockAddedEvent> {
        lock(&self.state).events.clone()
    }

    /// Adds an event directly, e.g. one signed over a competing header.
    pub fn push_event(&self, event: BlockAddedEvent) {
        lock(&self.state).events.push(event);
    }

    pub fn set_signed_block(&self, chain_id: u64, number: u64, block: RegistrySignedBlock) {
        lock(&self.state).signed.insert((chain_id, number), block);
    }

    /// Records `block` as if its signer had submitted it at registry height `registry_block`.
    pub fn record(&self, block: &SignedBlock, block_number: u64, registry_block: u64) {
        let Ok(validator) = recover_signer(block) else {
            return;
        };
        let payload =
            signing_payload(block.block_hash, block.chain_id, &block.validators, block.cycle_end);
        let mut state = lock(&self.state);
        let duplicate = state.events.iter().any(|e| {
            e.chain_id == block.chain_id && e.payload == payload && e.validator == validator
        });
        if duplicate {
            return;
        }
        state.events.push(BlockAddedEvent {
            validator,
            chain_id: block.chain_id,
            block_number,
            block_hash: block.block_hash,
            payload,
            validators: block.validators.clone(),
            cycle_end: block.cycle_end,
            signature: block.signature,
            registry_block,
        });
    }
}

fn header_number(rlp: &[u8]) -> u64 {
    // number is the 9th field of every layout the fakes produce
    blockrelay_common::rlp::decode_list_raw(rlp)
        .ok()
        .and_then(|items| items.get(8).copied())
        .and_then(|item| blockrelay_common::rlp::item_payload(item).ok())
        .map(|(_, payload)| payload.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
        .unwrap_or_default()
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn rpc_list(&self) -> Result<Vec<(u64, String)>, ContractError> {
        let mut state = lock(&self.state);
        state.rpc_list_calls += 1;
        if state.fail_reads {
            return Err(ContractError::Transport("fake registry unavailable".into()));
        }
        Ok(state.rpcs.clone())
    }

    async fn add_signed_blocks(&self, blocks: &[SignedBlock]) -> Result<B256, ContractError> {
        let head = {
            let mut state = lock(&self.state);
            if state.fail_submit {
                return Err(ContractError::Call("fake registry rejected batch".into()));
            }
            state.batches.push(blocks.to_vec());
            state.head
        };
        for block in blocks {
            self.record(block, header_number(&block.rlp_header), head);
        }
        Ok(B256::with_last_byte(self.batches().len() as u8))
    }

    async fn head(&self) -> Result<u64, ContractError> {
        let state = lock(&self.state);
        if state.fail_reads {
            return Err(ContractError::Transport("fake registry unavailable".into()));
        }
        Ok(state.head)
    }

    async fn block_added_events(
        &self, chain_id: u64, block_number: Option<u64>, from: u64, to: u64,
    ) -> Result<Vec<BlockAddedEvent>, ContractError> {
        let state = lock(&self.state);
        if state.fail_reads {
            return Err(ContractError::Transport("fake registry unavailable".into()));
        }
        Ok(state
            .events
            .iter()
            .filter(|e| e.chain_id == chain_id)
            .filter(|e| block_number.map_or(true, |n| e.block_number == n))
            .filter(|e| e.registry_block >= from && e.registry_block <= to)
            .cloned()
            .collect())
    }

    async fn signed_block(
        &self, chain_id: u64, number: u64,
    ) -> Result<Option<RegistrySignedBlock>, ContractError> {
        Ok(lock(&self.state).signed.get(&(chain_id, number)).cloned())
    }
}

/// Consensus contract returning a fixed cycle and counting reads.
#[derive(Clone, Default)]
pub struct FakeConsensus {
    cycle: Arc<Mutex<CycleInfo>>,
    calls: Arc<Mutex<usize>>,
}

impl FakeConsensus {
    pub fn new(cycle: CycleInfo) -> Self {
        Self { cycle: Arc::new(Mutex::new(cycle)), calls: Arc::default() }
    }

    pub fn calls(&self) -> usize {
        *lock(&self.calls)
    }
}

#[async_trait]
impl ConsensusClient for FakeConsensus {
    async fn cycle_info(&self) -> Result<CycleInfo, ContractError> {
        *lock(&self.calls) += 1;
        Ok(lock(&self.cycle).clone())
    }
}

#[derive(Default)]
struct BridgeState {
    requests: Vec<BridgeRequest>,
    queries: Vec<(u64, u64)>,
    fail_from: Option<u64>,
}

/// Source bridge serving a fixed list of requests.
#[derive(Clone)]
pub struct FakeBridge {
    address: Address,
    state: Arc<Mutex<BridgeState>>,
}

impl FakeBridge {
    pub fn new(address: Address) -> Self {
        Self { address, state: Arc::default() }
    }

    pub fn push_request(&self, request: BridgeRequest) {
        lock(&self.state).requests.push(request);
    }

    /// Windows queried so far, as `(from, to)`.
    pub fn queries(&self) -> Vec<(u64, u64)> {
        lock(&self.state).queries.clone()
    }

    /// Makes any query window reaching `block` fail.
    pub fn fail_from(&self, block: u64) {
        lock(&self.state).fail_from = Some(block);
    }
}

#[async_trait]
impl BridgeClient for FakeBridge {
    fn address(&self) -> Address {
        self.address
    }

    async fn bridge_requests(&self, from: u64, to: u64) -> Result<Vec<BridgeRequest>, ContractError> {
        let mut state = lock(&self.state);
        state.queries.push((from, to));
        if state.fail_from.is_some_and(|block| to >= block) {
            return Err(ContractError::Transport("fake bridge query failed".into()));
        }
        let mut requests: Vec<BridgeRequest> = state
            .requests
            .iter()
            .filter(|r| r.block_number >= from && r.block_number <= to)
            .cloned()
            .collect();
        requests.sort_by_key(|r| r.block_number);
        Ok(requests)
    }
}

#[derive(Default)]
struct VerifierState {
    verified: HashMap<(u64, u64), B256>,
    executed: HashSet<B256>,
    submissions: Vec<(VerifierSubmission, Option<u128>)>,
    fail_submit: bool,
    fail_confirmation: bool,
}

/// Destination bridge recording submissions. Submitting marks every proven request id
/// passed to [`FakeVerifier::execute_on_submit`] as executed.
#[derive(Clone)]
pub struct FakeVerifier {
    address: Address,
    state: Arc<Mutex<VerifierState>>,
    pending_ids: Arc<Mutex<Vec<B256>>>,
}

impl FakeVerifier {
    pub fn new(address: Address) -> Self {
        Self { address, state: Arc::default(), pending_ids: Arc::default() }
    }

    pub fn set_verified(&self, chain_id: u64, number: u64, hash: B256) {
        lock(&self.state).verified.insert((chain_id, number), hash);
    }

    pub fn mark_executed(&self, id: B256) {
        lock(&self.state).executed.insert(id);
    }

    pub fn execute_on_submit(&self, ids: Vec<B256>) {
        lock(&self.pending_ids).extend(ids);
    }

    pub fn fail_submit(&self, fail: bool) {
        lock(&self.state).fail_submit = fail;
    }

    pub fn fail_confirmation(&self, fail: bool) {
        lock(&self.state).fail_confirmation = fail;
    }

    pub fn submissions(&self) -> Vec<(VerifierSubmission, Option<u128>)> {
        lock(&self.state).submissions.clone()
    }

    pub fn executed(&self) -> HashSet<B256> {
        lock(&self.state).executed.clone()
    }
}

#[async_trait]
impl VerifierClient for FakeVerifier {
    fn address(&self) -> Address {
        self.address
    }

    async fn chain_verified_block(&self, chain_id: u64, number: u64) -> Result<B256, ContractError> {
        Ok(lock(&self.state).verified.get(&(chain_id, number)).copied().unwrap_or_default())
    }

    async fn is_executed(&self, id: B256) -> Result<bool, ContractError> {
        Ok(lock(&self.state).executed.contains(&id))
    }

    async fn submit(
        &self, submission: VerifierSubmission, gas_price: Option<u128>,
    ) -> Result<PendingRelay, ContractError> {
        let mut state = lock(&self.state);
        if state.fail_submit {
            return Err(ContractError::Call("fake verifier rejected submission".into()));
        }
        state.submissions.push((submission, gas_price));
        let tx_hash = B256::with_last_byte(state.submissions.len() as u8);
        let fail = state.fail_confirmation;
        if !fail {
            let ids: Vec<B256> = lock(&self.pending_ids).drain(..).collect();
            state.executed.extend(ids);
        }
        let confirmation = async move {
            if fail {
                Err(ContractError::Reverted(tx_hash))
            } else {
                Ok(RelayReceipt { tx_hash, block_number: Some(1) })
            }
        }
        .boxed();
        Ok(PendingRelay { tx_hash, confirmation })
    }
}

/// Multicall that reads executed flags straight from a [`FakeVerifier`].
#[derive(Clone)]
pub struct FakeMulticall {
    verifier: FakeVerifier,
    calls: Arc<Mutex<Vec<usize>>>,
    fail: Arc<Mutex<bool>>,
}

impl FakeMulticall {
    pub fn new(verifier: FakeVerifier) -> Self {
        Self { verifier, calls: Arc::default(), fail: Arc::default() }
    }

    /// Size of every batch served so far.
    pub fn calls(&self) -> Vec<usize> {
        lock(&self.calls).clone()
    }

    pub fn fail(&self, fail: bool) {
        *lock(&self.fail) = fail;
    }
}

#[async_trait]
impl MulticallClient for FakeMulticall {
    async fn executed_requests(&self, bridge: Address, ids: &[B256]) -> Result<Vec<bool>, ContractError> {
        if *lock(&self.fail) {
            return Err(ContractError::Transport("fake multicall unavailable".into()));
        }
        if bridge != self.verifier.address() {
            return Err(ContractError::Call(format!("unknown bridge {}", bridge)));
        }
        lock(&self.calls).push(ids.len());
        let executed = self.verifier.executed();
        Ok(ids.iter().map(|id| executed.contains(id)).collect())
    }
}
