use alloy_primitives::{Address, Bytes, B256};
use alloy_rlp_derive::RlpEncodable;

use crate::rlp::encode_list_raw;
use crate::rpc::RpcReceipt;

#[derive(Debug, Clone, RlpEncodable)]
struct ReceiptLog {
    address: Address,
    topics: Vec<B256>,
    data: Bytes,
}

/// Consensus encoding of a receipt as stored in the receipts trie.
///
/// With `typed` set, non-legacy receipts are prefixed with their EIP-2718 type byte.
pub fn encode_receipt(receipt: &RpcReceipt, typed: bool) -> Vec<u8> {
    let status = match (receipt.status, receipt.root) {
        (None, Some(root)) => alloy_rlp::encode(root),
        (status, _) => alloy_rlp::encode(status.map(|s| s.to::<u64>()).unwrap_or_default()),
    };
    let logs: Vec<ReceiptLog> = receipt
        .logs
        .iter()
        .map(|log| ReceiptLog {
            address: log.address,
            topics: log.topics.clone(),
            data: log.data.clone(),
        })
        .collect();
    let body = encode_list_raw(&[
        status,
        alloy_rlp::encode(receipt.cumulative_gas_used.to::<u64>()),
        alloy_rlp::encode(receipt.logs_bloom),
        alloy_rlp::encode(&logs),
    ]);

    let tx_type = receipt.tx_type.map(|t| t.to::<u64>()).unwrap_or_default();
    if typed && tx_type != 0 {
        let mut out = Vec::with_capacity(body.len() + 1);
        out.push(tx_type as u8);
        out.extend(body);
        return out;
    }
    body
}
