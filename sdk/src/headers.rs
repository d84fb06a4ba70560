use tracing::debug;

use blockrelay_common::fetch_bounded;
use blockrelay_common::header::canonicalize;
use blockrelay_common::rpc::ChainRpc;
use blockrelay_common::types::CanonicalHeader;

use crate::SdkError;

pub const HEADER_FETCH_CONCURRENCY: usize = 50;

/// Canonical headers of blocks `from..=to`, ascending, each verified against its reported
/// hash and linked to the one before it.
pub async fn get_chain_block_headers(
    rpc: &dyn ChainRpc, chain_id: u64, from: u64, to: u64,
) -> Result<Vec<CanonicalHeader>, SdkError> {
    if from > to {
        return Ok(Vec::new());
    }
    let headers = fetch_bounded(from..=to, HEADER_FETCH_CONCURRENCY, |number| async move {
        let block = rpc.block_by_number(number).await?;
        Ok::<_, SdkError>(canonicalize(&block, chain_id)?)
    })
    .await?;

    for pair in headers.windows(2) {
        if pair[1].parent_hash() != pair[0].hash() {
            return Err(SdkError::BrokenParentChain(*pair[1].number()));
        }
    }
    debug!(chain_id, from, to, "headers fetched");
    Ok(headers)
}

#[cfg(test)]
mod test {
    use super::*;
    use alloy_primitives::{b256, keccak256, Address, Bloom, Bytes, B256, B64, U256};
    use alloy_rlp::Encodable;
    use blockrelay_common::header::CELO_MAINNET;
    use blockrelay_common::test_utils::FakeChain;
    use serde_json::{json, Value};

    const EMPTY_OMMERS: B256 =
        b256!("1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347");
    const EMPTY_ROOT: B256 =
        b256!("56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421");
    const BEACON_ROOT: B256 = B256::repeat_byte(0xbe);

    fn rlp_list(items: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        alloy_rlp::Header { list: true, payload_length: items.iter().map(Vec::len).sum() }
            .encode(&mut out);
        for item in items {
            out.extend_from_slice(item);
        }
        out
    }

    fn aggregated_seal(bitmap: u64, signature: &[u8], round: u64) -> Vec<u8> {
        rlp_list(&[
            alloy_rlp::encode(bitmap),
            alloy_rlp::encode(Bytes::copy_from_slice(signature)),
            alloy_rlp::encode(round),
        ])
    }

    /// Vanity followed by the Istanbul extra: no validator changes, a proposer seal, the
    /// given aggregated seal and a parent seal.
    fn istanbul_extra(seal: Vec<u8>) -> Vec<u8> {
        let mut extra = vec![0u8; 32];
        extra.extend(rlp_list(&[
            rlp_list(&[]),
            rlp_list(&[]),
            alloy_rlp::encode(0u64),
            alloy_rlp::encode(Bytes::from(vec![0x12; 65])),
            seal,
            aggregated_seal(0x0f, &[0x34; 48], 0),
        ]));
        extra
    }

    /// A Celo mainnet block around the L2 migration and its hash, computed from the header
    /// fields the Celo node hashes rather than from the canonicalizer.
    fn celo_block(number: u64, parent_hash: B256) -> (Value, B256) {
        let l1 = number < 31_056_500;
        let state_root = keccak256(number.to_be_bytes());
        let (extra_on_chain, extra_for_hash) = if l1 {
            (
                istanbul_extra(aggregated_seal(number & 0xff, &[0x56; 48], 1)),
                istanbul_extra(aggregated_seal(0, &[], 0)),
            )
        } else {
            (Vec::new(), Vec::new())
        };
        let extra_for_hash = Bytes::from(extra_for_hash);
        let timestamp = 1_742_900_000 + number - 31_056_000;
        let mut fields: Vec<&dyn Encodable> = vec![
            &parent_hash,
            &EMPTY_OMMERS,
            &Address::ZERO,
            &state_root,
            &EMPTY_ROOT,
            &EMPTY_ROOT,
            &Bloom::ZERO,
            &U256::ZERO,
            &number,
            &30_000_000u64,
            &0u64,
            &timestamp,
            &extra_for_hash,
            &B256::ZERO,
            &B64::ZERO,
            &25_000_000_000u64,
        ];
        let l2_tail: [&dyn Encodable; 4] = [&EMPTY_ROOT, &0u64, &0u64, &BEACON_ROOT];
        if !l1 {
            fields.extend(l2_tail);
        }
        let mut rlp = Vec::new();
        alloy_rlp::encode_list::<_, dyn Encodable>(&fields, &mut rlp);
        let hash = keccak256(rlp);

        let mut block = json!({
            "hash": hash,
            "parentHash": parent_hash,
            "sha3Uncles": EMPTY_OMMERS,
            "miner": Address::ZERO,
            "stateRoot": state_root,
            "transactionsRoot": EMPTY_ROOT,
            "receiptsRoot": EMPTY_ROOT,
            "logsBloom": Bloom::ZERO,
            "difficulty": "0x0",
            "number": format!("0x{:x}", number),
            "gasLimit": "0x1c9c380",
            "gasUsed": "0x0",
            "timestamp": format!("0x{:x}", timestamp),
            "extraData": Bytes::from(extra_on_chain),
            "mixHash": B256::ZERO,
            "nonce": "0x0000000000000000",
            "baseFeePerGas": "0x5d21dba00",
            "size": "0x260",
            "transactions": [],
        });
        if !l1 {
            block["withdrawalsRoot"] = json!(EMPTY_ROOT);
            block["blobGasUsed"] = json!("0x0");
            block["excessBlobGas"] = json!("0x0");
            block["parentBeaconBlockRoot"] = json!(BEACON_ROOT);
        }
        (block, hash)
    }

    #[tokio::test]
    async fn should_return_linked_headers_across_celo_migration() {
        let chain = FakeChain::new(CELO_MAINNET);
        let mut parent = B256::repeat_byte(0x42);
        let mut expected = Vec::new();
        for number in 31_056_497..=31_056_504 {
            let (block, hash) = celo_block(number, parent);
            chain.insert_block(block);
            expected.push((number, hash));
            parent = hash;
        }

        let headers = get_chain_block_headers(&chain, CELO_MAINNET, 31_056_498, 31_056_504).await.unwrap();
        let got: Vec<(u64, B256)> = headers.iter().map(|h| (*h.number(), *h.hash())).collect();
        assert_eq!(got, expected[1..].to_vec());
        for header in &headers {
            assert_eq!(keccak256(header.rlp()), *header.hash());
        }
        assert_eq!(*headers[0].parent_hash(), expected[0].1);
    }

    #[tokio::test]
    async fn empty_range_fetches_nothing() {
        let chain = FakeChain::new(1);
        assert!(get_chain_block_headers(&chain, 1, 5, 4).await.unwrap().is_empty());
        assert!(chain.block_requests().is_empty());
    }

    #[tokio::test]
    async fn should_reject_broken_links() {
        let chain = FakeChain::new(1);
        chain.push_range(0, 2);
        // a block 3 whose parent is not block 2
        let other = FakeChain::new(1);
        other.push_range(3, 3);
        chain.overwrite_block(3, other.block(3).unwrap());

        let err = get_chain_block_headers(&chain, 1, 0, 3).await.unwrap_err();
        assert!(matches!(err, SdkError::BrokenParentChain(3)));
    }

    #[tokio::test]
    async fn rpc_failure_propagates() {
        let chain = FakeChain::new(1);
        chain.push_range(0, 10);
        chain.fail_block(7);
        let err = get_chain_block_headers(&chain, 1, 0, 10).await.unwrap_err();
        assert!(matches!(err, SdkError::Rpc(_)));
    }
}
