use alloy::network::{EthereumWallet, ReceiptResponse};
use alloy::primitives::{Address, B256, U256};
use alloy::providers::ProviderBuilder;
use alloy::signers::k256::ecdsa::SigningKey;
use alloy::signers::local::LocalSigner;
use alloy::sol_types::{SolCall, SolEvent};
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::oneshot;
use tracing::{debug, info};

use blockrelay_common::mpt::MerkleProof;
use blockrelay_common::rpc::RpcLog;
use blockrelay_common::signer::BlockSigner;
use blockrelay_common::types::{BridgeRequest, SignedCheckpoint};

use crate::registry::{local_signer, parse_url};
use crate::sol::{IMulticall3, ITokenBridge};
use crate::{
    call, transport, BridgeClient, ContractError, MulticallClient, PendingRelay, RelayReceipt,
    VerifierClient, VerifierSubmission,
};

pub fn bridge_request_topic() -> B256 {
    ITokenBridge::BridgeRequest::SIGNATURE_HASH
}

/// Decodes a `BridgeRequest` emitted by `source_bridge` from a receipt log; `None` for
/// any other log, including the same event from another contract.
pub fn decode_bridge_request(
    log: &RpcLog, source_bridge: Address, block_number: u64, transaction_hash: B256,
) -> Option<BridgeRequest> {
    if log.address != source_bridge || log.topics.first() != Some(&bridge_request_topic()) {
        return None;
    }
    let event =
        ITokenBridge::BridgeRequest::decode_raw_log(log.topics.iter().copied(), &log.data, true)
            .ok()?;
    Some(to_request(event, block_number, transaction_hash))
}

fn to_request(
    event: ITokenBridge::BridgeRequest, block_number: u64, transaction_hash: B256,
) -> BridgeRequest {
    BridgeRequest {
        id: event.id,
        from: event.from,
        to: event.to,
        amount: event.amount,
        target_chain_id: event.targetChainId.saturating_to(),
        relay: event.relay,
        block_number,
        transaction_hash,
    }
}

/// A source-chain bridge reached over alloy.
pub struct AlloyBridge {
    address: Address,
    rpc_url: Url,
}

impl AlloyBridge {
    pub fn new(address: Address, rpc_url: &str) -> Result<Self, ContractError> {
        Ok(Self { address, rpc_url: parse_url(rpc_url)? })
    }
}

#[async_trait]
impl BridgeClient for AlloyBridge {
    fn address(&self) -> Address {
        self.address
    }

    async fn bridge_requests(&self, from: u64, to: u64) -> Result<Vec<BridgeRequest>, ContractError> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.clone());
        let bridge = ITokenBridge::new(self.address, provider);
        let logs = bridge
            .BridgeRequest_filter()
            .from_block(from)
            .to_block(to)
            .query()
            .await
            .map_err(transport)?;
        debug!(bridge = %self.address, from, to, events = logs.len(), "BridgeRequest events fetched");
        Ok(logs
            .into_iter()
            .map(|(event, log)| {
                let block_number = log.block_number.unwrap_or_default();
                let tx_hash = log.transaction_hash.unwrap_or_default();
                to_request(event, block_number, tx_hash)
            })
            .collect())
    }
}

fn to_sol_proof(proof: &MerkleProof) -> ITokenBridge::MPTProof {
    ITokenBridge::MPTProof {
        expectedRoot: proof.expected_root,
        key: proof.key.clone(),
        proof: proof.proof.clone(),
        keyIndex: U256::from(proof.key_index),
        proofIndex: U256::from(proof.proof_index),
        expectedValue: proof.expected_value.clone(),
    }
}

fn to_sol_checkpoint(checkpoint: &SignedCheckpoint) -> ITokenBridge::SignedCheckpoint {
    ITokenBridge::SignedCheckpoint {
        rlpHeader: checkpoint.rlp_header.clone(),
        signatures: checkpoint
            .signatures
            .iter()
            .map(|s| ITokenBridge::Signature { r: s.r, vs: s.vs })
            .collect(),
        cycleEnd: U256::from(checkpoint.cycle_end),
        validators: checkpoint.validators.clone(),
    }
}

fn to_sol_blocks(submission: &VerifierSubmission) -> Vec<ITokenBridge::BlockSignedTxs> {
    submission
        .blocks
        .iter()
        .map(|block| ITokenBridge::BlockSignedTxs {
            receiptProofs: block.receipt_proofs.iter().map(to_sol_proof).collect(),
            blockHeaderRlp: block.block_header_rlp.clone(),
            blockNumber: U256::from(block.block_number),
        })
        .collect()
}

/// A destination-chain bridge reached over alloy.
pub struct AlloyVerifier {
    address: Address,
    rpc_url: Url,
    signer: Option<LocalSigner<SigningKey>>,
}

impl AlloyVerifier {
    pub fn new(
        address: Address, rpc_url: &str, signer: Option<&BlockSigner>,
    ) -> Result<Self, ContractError> {
        Ok(Self { address, rpc_url: parse_url(rpc_url)?, signer: signer.map(local_signer) })
    }
}

#[async_trait]
impl VerifierClient for AlloyVerifier {
    fn address(&self) -> Address {
        self.address
    }

    async fn chain_verified_block(&self, chain_id: u64, number: u64) -> Result<B256, ContractError> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.clone());
        let bridge = ITokenBridge::new(self.address, provider);
        let hash = bridge
            .chainVerifiedBlocks(U256::from(chain_id), U256::from(number))
            .call()
            .await
            .map_err(call)?
            ._0;
        Ok(hash)
    }

    async fn is_executed(&self, id: B256) -> Result<bool, ContractError> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.clone());
        let bridge = ITokenBridge::new(self.address, provider);
        Ok(bridge.executedRequests(id).call().await.map_err(call)?._0)
    }

    async fn submit(
        &self, submission: VerifierSubmission, gas_price: Option<u128>,
    ) -> Result<PendingRelay, ContractError> {
        let signer = self.signer.clone().ok_or(ContractError::MissingSigner)?;
        let rpc_url = self.rpc_url.clone();
        let address = self.address;
        let checkpoint = to_sol_checkpoint(&submission.checkpoint);
        let checkpoint_number = U256::from(submission.checkpoint.block_number);
        let blocks = to_sol_blocks(&submission);
        let parents = submission.parent_headers;

        // The provider must outlive the pending transaction, so the whole send and
        // confirmation runs in one task that reports the hash as soon as it is known.
        let (hash_tx, hash_rx) = oneshot::channel::<Result<B256, ContractError>>();
        let task = tokio::spawn(async move {
            let provider = ProviderBuilder::new()
                .with_recommended_fillers()
                .wallet(EthereumWallet::from(signer))
                .on_http(rpc_url);
            let bridge = ITokenBridge::new(address, provider);
            let mut builder =
                bridge.submitChainBlockParentsAndTxs(checkpoint, checkpoint_number, parents, blocks);
            if let Some(gas_price) = gas_price {
                builder = builder.gas_price(gas_price);
            }
            let pending = match builder.send().await {
                Ok(pending) => pending,
                Err(e) => {
                    let err = call(e);
                    let _ = hash_tx.send(Err(err.clone()));
                    return Err(err);
                },
            };
            let tx_hash = *pending.tx_hash();
            let _ = hash_tx.send(Ok(tx_hash));
            let receipt = pending.get_receipt().await.map_err(transport)?;
            if !receipt.status() {
                return Err(ContractError::Reverted(tx_hash));
            }
            info!(%tx_hash, block = ?receipt.block_number, "relay confirmed");
            Ok(RelayReceipt { tx_hash, block_number: receipt.block_number })
        });

        let tx_hash = hash_rx
            .await
            .map_err(|_| ContractError::Transport("relay task ended before sending".into()))??;
        let confirmation = async move { task.await.map_err(transport)? }.boxed();
        Ok(PendingRelay { tx_hash, confirmation })
    }
}

/// Multicall3 aggregator reached over alloy.
pub struct AlloyMulticall {
    address: Address,
    rpc_url: Url,
}

impl AlloyMulticall {
    pub fn new(address: Address, rpc_url: &str) -> Result<Self, ContractError> {
        Ok(Self { address, rpc_url: parse_url(rpc_url)? })
    }
}

/// Builds the `aggregate3` calls for `executedRequests(id)` on `bridge`.
pub(crate) fn executed_calls(bridge: Address, ids: &[B256]) -> Vec<IMulticall3::Call3> {
    ids.iter()
        .map(|id| IMulticall3::Call3 {
            target: bridge,
            allowFailure: true,
            callData: ITokenBridge::executedRequestsCall { id: *id }.abi_encode().into(),
        })
        .collect()
}

/// A failed or undecodable sub-call counts as not executed.
pub(crate) fn decode_executed(results: &[IMulticall3::CallResult]) -> Vec<bool> {
    results
        .iter()
        .map(|res| {
            res.success
                && ITokenBridge::executedRequestsCall::abi_decode_returns(&res.returnData, true)
                    .map(|ret| ret._0)
                    .unwrap_or(false)
        })
        .collect()
}

#[async_trait]
impl MulticallClient for AlloyMulticall {
    async fn executed_requests(&self, bridge: Address, ids: &[B256]) -> Result<Vec<bool>, ContractError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let provider = ProviderBuilder::new().on_http(self.rpc_url.clone());
        let multicall = IMulticall3::new(self.address, provider);
        let results = multicall
            .aggregate3(executed_calls(bridge, ids))
            .call()
            .await
            .map_err(call)?
            .returnData;
        if results.len() != ids.len() {
            return Err(ContractError::Decode(format!(
                "multicall returned {} results for {} calls",
                results.len(),
                ids.len()
            )));
        }
        Ok(decode_executed(&results))
    }
}
