use alloy_primitives::{Bytes, B256};
use tracing::debug;

use blockrelay_common::fetch_bounded;
use blockrelay_common::header::{canonicalize, has_base_fee, is_celo};
use blockrelay_common::mpt::{index2key, MerkleProof, PatriciaTrie};
use blockrelay_common::receipt::encode_receipt;
use blockrelay_common::rpc::{transaction_hashes, ChainRpc, RpcReceipt};
use blockrelay_common::types::CanonicalHeader;

use crate::SdkError;

/// Sibling receipts fetched at once while rebuilding a block's receipts trie.
pub const RECEIPT_FETCH_CONCURRENCY: usize = 10;

/// A receipt inclusion proof together with what it was built from.
#[derive(Debug, Clone)]
pub struct ReceiptProof {
    pub proof: MerkleProof,
    pub receipt: RpcReceipt,
    pub header: CanonicalHeader,
    pub transaction_index: u64,
}

impl ReceiptProof {
    pub fn block_number(&self) -> u64 {
        *self.header.number()
    }

    pub fn transaction_hash(&self) -> B256 {
        self.receipt.transaction_hash
    }
}

/// Proves that the receipt of `tx_hash` is part of its block's receipts trie.
pub async fn build_receipt_proof(
    rpc: &dyn ChainRpc, chain_id: u64, tx_hash: B256,
) -> Result<ReceiptProof, SdkError> {
    let receipt =
        rpc.transaction_receipt(tx_hash).await?.ok_or(SdkError::ReceiptNotFound(tx_hash))?;
    let block = rpc.block_by_hash(receipt.block_hash, false).await?;
    let header = canonicalize(&block, chain_id)?;
    let typed = has_base_fee(&block) || is_celo(chain_id);

    let hashes = transaction_hashes(&block)?;
    let transaction_index = hashes
        .iter()
        .position(|hash| *hash == tx_hash)
        .ok_or(SdkError::ReceiptNotFound(tx_hash))? as u64;

    let mut receipts = fetch_bounded(hashes.iter().copied(), RECEIPT_FETCH_CONCURRENCY, |hash| async move {
        rpc.transaction_receipt(hash).await?.ok_or(SdkError::ReceiptNotFound(hash))
    })
    .await?;
    if is_celo(chain_id) {
        if let Some(extra) = rpc.block_receipt(receipt.block_hash).await? {
            if !extra.logs.is_empty() {
                receipts.push(extra);
            }
        }
    }

    let mut trie = PatriciaTrie::new();
    for (index, sibling) in receipts.iter().enumerate() {
        trie.insert(&alloy_rlp::encode(index as u64), encode_receipt(sibling, typed));
    }
    let computed = trie.root_hash();
    if computed != *header.receipts_root() {
        return Err(SdkError::ReceiptsRootMismatch {
            number: *header.number(),
            computed,
            expected: *header.receipts_root(),
        });
    }

    let nodes = trie
        .proof(&alloy_rlp::encode(transaction_index))
        .ok_or(SdkError::ReceiptNotFound(tx_hash))?;
    let proof = MerkleProof {
        expected_root: computed,
        key: Bytes::from(index2key(transaction_index, nodes.len())),
        proof: nodes,
        key_index: 0,
        proof_index: 0,
        expected_value: Bytes::from(encode_receipt(&receipt, typed)),
    };
    proof.verify()?;
    debug!(
        chain_id,
        %tx_hash,
        block = header.number(),
        index = transaction_index,
        siblings = receipts.len(),
        "receipt proof built"
    );

    Ok(ReceiptProof { proof, receipt, header, transaction_index })
}
