//! Canonical header re-encoding.
//!
//! Chains report blocks as JSON objects. To prove anything about a block on another
//! chain we need the exact RLP bytes whose keccak is the block hash, so the JSON fields
//! are picked in the order of the chain's header struct and re-encoded here.

use alloy_primitives::{keccak256, Bytes, B256};
use serde_json::{Map, Value};

use crate::error::{Classify, ErrorKind};
use crate::rlp::{decode_list_raw, encode_bytes, encode_list_raw, encode_uint_bytes};
use crate::types::CanonicalHeader;

/// Size of the vanity prefix in front of the Istanbul extra.
const ISTANBUL_VANITY: usize = 32;
const ISTANBUL_AGGREGATED_SEAL: usize = 4;
/// `rlp([bitmap = 0, signature = "", round = 0])`
const EMPTY_AGGREGATED_SEAL: [u8; 4] = [0xc3, 0x80, 0x80, 0x80];

pub const CELO_MAINNET: u64 = 42220;
pub const CELO_ALFAJORES: u64 = 44787;
pub const CELO_BAKLAVA: u64 = 62320;

#[derive(thiserror::Error, Debug)]
pub enum HeaderError {
    #[error("block is not a JSON object")]
    NotAnObject,
    #[error("block is missing field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` is not valid hex: {value}")]
    InvalidHex { field: &'static str, value: String },
    #[error("malformed RLP in `{field}`: {source}")]
    Rlp { field: &'static str, source: alloy_rlp::Error },
    #[error("unsupported Istanbul extra shape: {0}")]
    UnsupportedExtraShape(String),
    #[error("header hash mismatch for block {number}: computed {computed}, reported {reported}")]
    HeaderMismatch { number: u64, computed: B256, reported: B256 },
}

impl Classify for HeaderError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::ItemFatal
    }
}

/// Which header layout a chain uses at a given height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainProfile {
    /// Ethereum layout, including any fork fields the block carries.
    Standard,
    /// Celo before Gingerbread: no uncles, difficulty, gas limit or PoW seal,
    /// and an Istanbul extra whose aggregated seal is normalized before hashing.
    CeloIstanbul,
    /// Celo L1 from Gingerbread until the L2 migration: Ethereum layout, but the
    /// Istanbul extra is still normalized before hashing.
    CeloGingerbread,
}

/// First block of the Gingerbread fork, from which Celo headers use the standard layout.
fn gingerbread_block(chain_id: u64) -> Option<u64> {
    match chain_id {
        CELO_MAINNET => Some(21_616_000),
        CELO_ALFAJORES => Some(19_814_000),
        CELO_BAKLAVA => Some(18_785_000),
        _ => None,
    }
}

/// First block produced by the Celo L2, whose headers are plain Ethereum headers.
fn l2_migration_block(chain_id: u64) -> Option<u64> {
    match chain_id {
        CELO_MAINNET => Some(31_056_500),
        CELO_ALFAJORES => Some(26_384_000),
        CELO_BAKLAVA => Some(28_308_600),
        _ => None,
    }
}

impl ChainProfile {
    pub fn for_block(chain_id: u64, number: u64) -> Self {
        let (Some(fork), Some(migration)) = (gingerbread_block(chain_id), l2_migration_block(chain_id))
        else {
            return ChainProfile::Standard;
        };
        if number < fork {
            ChainProfile::CeloIstanbul
        } else if number < migration {
            ChainProfile::CeloGingerbread
        } else {
            ChainProfile::Standard
        }
    }
}

pub fn is_celo(chain_id: u64) -> bool {
    gingerbread_block(chain_id).is_some()
}

#[derive(Clone, Copy)]
enum Kind {
    Bytes,
    Uint,
}

const STANDARD_HEAD: &[(&str, Kind)] = &[
    ("parentHash", Kind::Bytes),
    ("sha3Uncles", Kind::Bytes),
    ("miner", Kind::Bytes),
    ("stateRoot", Kind::Bytes),
    ("transactionsRoot", Kind::Bytes),
    ("receiptsRoot", Kind::Bytes),
    ("logsBloom", Kind::Bytes),
    ("difficulty", Kind::Uint),
    ("number", Kind::Uint),
    ("gasLimit", Kind::Uint),
    ("gasUsed", Kind::Uint),
    ("timestamp", Kind::Uint),
    ("extraData", Kind::Bytes),
];

/// Fork fields, appended in order while present.
const STANDARD_TAIL: &[(&str, Kind)] = &[
    ("baseFeePerGas", Kind::Uint),
    ("withdrawalsRoot", Kind::Bytes),
    ("blobGasUsed", Kind::Uint),
    ("excessBlobGas", Kind::Uint),
    ("parentBeaconBlockRoot", Kind::Bytes),
    ("requestsHash", Kind::Bytes),
];

const CELO_ISTANBUL: &[(&str, Kind)] = &[
    ("parentHash", Kind::Bytes),
    ("miner", Kind::Bytes),
    ("stateRoot", Kind::Bytes),
    ("transactionsRoot", Kind::Bytes),
    ("receiptsRoot", Kind::Bytes),
    ("logsBloom", Kind::Bytes),
    ("number", Kind::Uint),
    ("gasUsed", Kind::Uint),
    ("timestamp", Kind::Uint),
];

struct RawBlock<'a> {
    fields: &'a Map<String, Value>,
}

impl<'a> RawBlock<'a> {
    fn new(block: &'a Value) -> Result<Self, HeaderError> {
        block.as_object().map(|fields| Self { fields }).ok_or(HeaderError::NotAnObject)
    }

    fn optional(&self, name: &'static str) -> Result<Option<Vec<u8>>, HeaderError> {
        match self.fields.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => decode_hex(name, s).map(Some),
            Some(other) => {
                Err(HeaderError::InvalidHex { field: name, value: other.to_string() })
            },
        }
    }

    fn required(&self, name: &'static str) -> Result<Vec<u8>, HeaderError> {
        self.optional(name)?.ok_or(HeaderError::MissingField(name))
    }

    fn b256(&self, name: &'static str) -> Result<B256, HeaderError> {
        let bytes = self.required(name)?;
        if bytes.len() != 32 {
            return Err(HeaderError::InvalidHex { field: name, value: hex::encode(bytes) });
        }
        Ok(B256::from_slice(&bytes))
    }

    fn uint(&self, name: &'static str) -> Result<u64, HeaderError> {
        let bytes = self.required(name)?;
        let trimmed = crate::rlp::trim_leading_zeros(&bytes);
        if trimmed.len() > 8 {
            return Err(HeaderError::InvalidHex { field: name, value: hex::encode(bytes) });
        }
        Ok(trimmed.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }

    fn encode_field(&self, name: &'static str, kind: Kind, out: &mut Vec<Vec<u8>>) -> Result<(), HeaderError> {
        let value = self.required(name)?;
        out.push(encode_value(&value, kind));
        Ok(())
    }

    fn seal_fields(&self) -> Result<Option<Vec<Vec<u8>>>, HeaderError> {
        match self.fields.get("sealFields") {
            Some(Value::Array(items)) if !items.is_empty() => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => decode_hex("sealFields", s),
                    other => Err(HeaderError::InvalidHex {
                        field: "sealFields",
                        value: other.to_string(),
                    }),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            _ => Ok(None),
        }
    }
}

fn decode_hex(field: &'static str, value: &str) -> Result<Vec<u8>, HeaderError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    let padded;
    let digits = if digits.len() % 2 == 1 {
        padded = format!("0{}", digits);
        padded.as_str()
    } else {
        digits
    };
    hex::decode(digits).map_err(|_| HeaderError::InvalidHex { field, value: value.to_string() })
}

fn encode_value(value: &[u8], kind: Kind) -> Vec<u8> {
    match kind {
        Kind::Bytes => encode_bytes(value),
        Kind::Uint => encode_uint_bytes(value),
    }
}

fn standard_items(block: &RawBlock, istanbul_extra: bool) -> Result<Vec<Vec<u8>>, HeaderError> {
    let mut items = Vec::with_capacity(21);
    for (name, kind) in STANDARD_HEAD {
        if istanbul_extra && *name == "extraData" {
            let extra = block.required(name)?;
            items.push(encode_bytes(&gingerbread_hash_extra(extra)));
        } else {
            block.encode_field(name, *kind, &mut items)?;
        }
    }

    if let Some(mix_hash) = block.optional("mixHash")? {
        items.push(encode_bytes(&mix_hash));
        if let Some(nonce) = block.optional("nonce")? {
            items.push(encode_bytes(&nonce));
        }
    } else if let Some(seal) = block.seal_fields()? {
        // already RLP items
        items.extend(seal);
    } else if let Some(step) = block.optional("step")? {
        items.push(encode_uint_bytes(&step));
        items.push(encode_bytes(&block.required("signature")?));
    }

    for (name, kind) in STANDARD_TAIL {
        match block.optional(name)? {
            Some(value) => items.push(encode_value(&value, *kind)),
            None => break,
        }
    }
    Ok(items)
}

fn celo_istanbul_items(block: &RawBlock) -> Result<Vec<Vec<u8>>, HeaderError> {
    let mut items = Vec::with_capacity(10);
    for (name, kind) in CELO_ISTANBUL {
        block.encode_field(name, *kind, &mut items)?;
    }
    let extra = normalize_istanbul_extra(&block.required("extraData")?)?;
    items.push(encode_bytes(&extra));
    Ok(items)
}

/// Replaces the aggregated seal in a Celo extra with its empty form.
///
/// The aggregated seal is filled in after the block is produced, so hashing needs the
/// empty value to reproduce the block hash.
pub fn normalize_istanbul_extra(extra: &[u8]) -> Result<Vec<u8>, HeaderError> {
    if extra.len() < ISTANBUL_VANITY {
        return Err(HeaderError::UnsupportedExtraShape(format!(
            "extra is {} bytes, shorter than the vanity",
            extra.len()
        )));
    }
    let (vanity, istanbul) = extra.split_at(ISTANBUL_VANITY);
    let mut items = decode_list_raw(istanbul)
        .map_err(|source| HeaderError::Rlp { field: "extraData", source })?;
    if items.len() <= ISTANBUL_AGGREGATED_SEAL {
        return Err(HeaderError::UnsupportedExtraShape(format!(
            "expected at least {} items, found {}",
            ISTANBUL_AGGREGATED_SEAL + 1,
            items.len()
        )));
    }
    items[ISTANBUL_AGGREGATED_SEAL] = &EMPTY_AGGREGATED_SEAL;

    let mut out = vanity.to_vec();
    out.extend(encode_list_raw(&items));
    Ok(out)
}

/// Extra used for hashing a Gingerbread header. Extras shorter than the vanity or not
/// shaped like an Istanbul extra are hashed as they are, like the Celo node does.
fn gingerbread_hash_extra(extra: Vec<u8>) -> Vec<u8> {
    if extra.len() < ISTANBUL_VANITY {
        return extra;
    }
    normalize_istanbul_extra(&extra).unwrap_or(extra)
}

/// Encodes a block's header for the given chain without checking the reported hash.
pub fn encode_header(block: &Value, chain_id: u64) -> Result<Bytes, HeaderError> {
    let raw = RawBlock::new(block)?;
    let number = raw.uint("number")?;
    let items = match ChainProfile::for_block(chain_id, number) {
        ChainProfile::Standard => standard_items(&raw, false)?,
        ChainProfile::CeloGingerbread => standard_items(&raw, true)?,
        ChainProfile::CeloIstanbul => celo_istanbul_items(&raw)?,
    };
    Ok(Bytes::from(encode_list_raw(&items)))
}

/// Re-encodes a raw JSON block and checks that it hashes to the reported block hash.
pub fn canonicalize(block: &Value, chain_id: u64) -> Result<CanonicalHeader, HeaderError> {
    let raw = RawBlock::new(block)?;
    let rlp = encode_header(block, chain_id)?;
    let number = raw.uint("number")?;
    let computed = keccak256(&rlp);
    let reported = raw.b256("hash")?;
    if computed != reported {
        return Err(HeaderError::HeaderMismatch { number, computed, reported });
    }
    Ok(CanonicalHeader::new(
        number,
        computed,
        raw.b256("parentHash")?,
        raw.b256("receiptsRoot")?,
        raw.uint("timestamp")?,
        rlp,
    ))
}

/// Reads a numeric JSON-RPC field such as `number` from a raw block.
pub fn block_number(block: &Value) -> Result<u64, HeaderError> {
    RawBlock::new(block)?.uint("number")
}

/// Whether the block carries a London base fee.
pub fn has_base_fee(block: &Value) -> bool {
    block.get("baseFeePerGas").map(|v| !v.is_null()).unwrap_or(false)
}

#[cfg(test)]
mod test {
    use super::*;
    use alloy_primitives::{Address, Bloom, B64, U256};
    use alloy_rlp::Encodable;
    use serde_json::json;

    fn hash_of(fields: &[&dyn Encodable]) -> B256 {
        let mut out = Vec::new();
        alloy_rlp::encode_list::<_, dyn Encodable>(fields, &mut out);
        keccak256(out)
    }

    fn hex32(byte: u8) -> String {
        format!("0x{}", hex::encode([byte; 32]))
    }

    #[test]
    fn mainnet_genesis_round_trip() {
        let block = json!({
            "number": "0x0",
            "hash": "0xd4e56740f876aef8c010b86a40d5f56745a118d0906a34e69aec8c0db1cb8fa3",
            "parentHash": "0x0000000000000000000000000000000000000000000000000000000000000000",
            "sha3Uncles": "0x1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347",
            "miner": "0x0000000000000000000000000000000000000000",
            "stateRoot": "0xd7f8974fb5ac78d9ac099b9ad5018bedc2ce0a72dad1827a1709da30580f0544",
            "transactionsRoot": "0x56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421",
            "receiptsRoot": "0x56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421",
            "logsBloom": format!("0x{}", "0".repeat(512)),
            "difficulty": "0x400000000",
            "gasLimit": "0x1388",
            "gasUsed": "0x0",
            "timestamp": "0x0",
            "extraData": "0x11bbe8db4e347b4e8c937c1c8370e4b5ed33adb3db69cbdb7a38e1e50b1b82fa",
            "mixHash": "0x0000000000000000000000000000000000000000000000000000000000000000",
            "nonce": "0x0000000000000042",
        });
        let header = canonicalize(&block, 1).unwrap();
        assert_eq!(*header.number(), 0);
        assert_eq!(*header.hash(), keccak256(header.rlp()));
    }

    fn cancun_block() -> (Value, B256) {
        let bloom = Bloom::repeat_byte(0x01);
        let miner = Address::repeat_byte(0x22);
        let extra = Bytes::from_static(b"builder");
        let nonce = B64::ZERO;
        let hash = hash_of(&[
            &B256::repeat_byte(0xaa),
            &B256::repeat_byte(0xbb),
            &miner,
            &B256::repeat_byte(0xcc),
            &B256::repeat_byte(0xdd),
            &B256::repeat_byte(0xee),
            &bloom,
            &U256::ZERO,
            &19_000_000u64,
            &30_000_000u64,
            &12_345_678u64,
            &1_700_000_000u64,
            &extra,
            &B256::repeat_byte(0x33),
            &nonce,
            &7u64,
            &B256::repeat_byte(0x44),
            &0u64,
            &131_072u64,
            &B256::repeat_byte(0x55),
        ]);
        let block = json!({
            "hash": hash,
            "parentHash": hex32(0xaa),
            "sha3Uncles": hex32(0xbb),
            "miner": miner,
            "stateRoot": hex32(0xcc),
            "transactionsRoot": hex32(0xdd),
            "receiptsRoot": hex32(0xee),
            "logsBloom": bloom,
            "difficulty": "0x0",
            "number": "0x121eac0",
            "gasLimit": "0x1c9c380",
            "gasUsed": "0xbc614e",
            "timestamp": "0x6553f100",
            "extraData": extra,
            "mixHash": hex32(0x33),
            "nonce": "0x0000000000000000",
            "baseFeePerGas": "0x7",
            "withdrawalsRoot": hex32(0x44),
            "blobGasUsed": "0x0",
            "excessBlobGas": "0x20000",
            "parentBeaconBlockRoot": hex32(0x55),
            "size": "0x1234",
            "transactions": [],
        });
        (block, hash)
    }

    #[test]
    fn post_cancun_round_trip() {
        let (block, hash) = cancun_block();
        let header = canonicalize(&block, 1).unwrap();
        assert_eq!(*header.hash(), hash);
        assert_eq!(*header.number(), 19_000_000);
        assert_eq!(*header.receipts_root(), B256::repeat_byte(0xee));
        assert_eq!(*header.parent_hash(), B256::repeat_byte(0xaa));
    }

    #[test]
    fn tampered_field_is_a_mismatch() {
        let (mut block, _) = cancun_block();
        block["gasUsed"] = json!("0xbc614f");
        assert!(matches!(
            canonicalize(&block, 1),
            Err(HeaderError::HeaderMismatch { number: 19_000_000, .. })
        ));
    }

    #[test]
    fn aura_step_and_signature() {
        let signature = Bytes::from(vec![0x99; 65]);
        let hash = hash_of(&[
            &B256::repeat_byte(0x01),
            &B256::repeat_byte(0x02),
            &Address::repeat_byte(0x03),
            &B256::repeat_byte(0x04),
            &B256::repeat_byte(0x05),
            &B256::repeat_byte(0x06),
            &Bloom::ZERO,
            &U256::from(0xfffffffeu64),
            &100u64,
            &8_000_000u64,
            &0u64,
            &1_600_000_000u64,
            &Bytes::new(),
            &320_000_000u64,
            &signature,
        ]);
        let block = json!({
            "hash": hash,
            "parentHash": hex32(0x01),
            "sha3Uncles": hex32(0x02),
            "miner": Address::repeat_byte(0x03),
            "stateRoot": hex32(0x04),
            "transactionsRoot": hex32(0x05),
            "receiptsRoot": hex32(0x06),
            "logsBloom": Bloom::ZERO,
            "difficulty": "0xfffffffe",
            "number": "0x64",
            "gasLimit": "0x7a1200",
            "gasUsed": "0x0",
            "timestamp": "0x5f5e1000",
            "extraData": "0x",
            "step": "0x1312d000",
            "signature": signature,
        });
        assert_eq!(*canonicalize(&block, 122).unwrap().hash(), hash);
    }

    #[test]
    fn seal_fields_are_appended_verbatim() {
        let seal_a = encode_bytes(&320_000_000u64.to_be_bytes()[4..]);
        let seal_b = encode_bytes(&[0x77; 65]);
        let mut out = Vec::new();
        let head: [&dyn Encodable; 13] = [
            &B256::repeat_byte(0x01),
            &B256::repeat_byte(0x02),
            &Address::repeat_byte(0x03),
            &B256::repeat_byte(0x04),
            &B256::repeat_byte(0x05),
            &B256::repeat_byte(0x06),
            &Bloom::ZERO,
            &1u64,
            &200u64,
            &8_000_000u64,
            &21_000u64,
            &1_600_000_000u64,
            &Bytes::new(),
        ];
        let mut items: Vec<Vec<u8>> = head.iter().map(|f| alloy_rlp::encode(f)).collect();
        items.push(seal_a.clone());
        items.push(seal_b.clone());
        out.extend(encode_list_raw(&items));
        let hash = keccak256(&out);

        let block = json!({
            "hash": hash,
            "parentHash": hex32(0x01),
            "sha3Uncles": hex32(0x02),
            "miner": Address::repeat_byte(0x03),
            "stateRoot": hex32(0x04),
            "transactionsRoot": hex32(0x05),
            "receiptsRoot": hex32(0x06),
            "logsBloom": Bloom::ZERO,
            "difficulty": "0x1",
            "number": "0xc8",
            "gasLimit": "0x7a1200",
            "gasUsed": "0x5208",
            "timestamp": "0x5f5e1000",
            "extraData": "0x",
            "sealFields": [format!("0x{}", hex::encode(&seal_a)), format!("0x{}", hex::encode(&seal_b))],
            "step": "0x1",
            "signature": "0x00",
        });
        assert_eq!(*canonicalize(&block, 122).unwrap().hash(), hash);
    }

    fn istanbul_extra(aggregated_seal: &[u8]) -> Vec<u8> {
        let items = vec![
            encode_list_raw::<Vec<u8>>(&[]),
            encode_list_raw::<Vec<u8>>(&[]),
            encode_bytes(&[]),
            encode_bytes(&[0x12; 65]),
            aggregated_seal.to_vec(),
            encode_list_raw(&[encode_bytes(&[0x0f]), encode_bytes(&[0x34; 48]), encode_bytes(&[])]),
        ];
        let mut extra = vec![0u8; ISTANBUL_VANITY];
        extra.extend(encode_list_raw(&items));
        extra
    }

    #[test]
    fn celo_istanbul_round_trip() {
        let signed_seal =
            encode_list_raw(&[encode_bytes(&[0x3f]), encode_bytes(&[0x56; 48]), encode_bytes(&[])]);
        let extra_on_chain = istanbul_extra(&signed_seal);
        let extra_for_hash = istanbul_extra(&EMPTY_AGGREGATED_SEAL);
        assert_eq!(normalize_istanbul_extra(&extra_on_chain).unwrap(), extra_for_hash);

        let hash = hash_of(&[
            &B256::repeat_byte(0x01),
            &Address::repeat_byte(0x02),
            &B256::repeat_byte(0x03),
            &B256::repeat_byte(0x04),
            &B256::repeat_byte(0x05),
            &Bloom::ZERO,
            &5_000_000u64,
            &21_000u64,
            &1_600_000_000u64,
            &Bytes::from(extra_for_hash),
        ]);
        let block = json!({
            "hash": hash,
            "parentHash": hex32(0x01),
            "sha3Uncles": hex32(0x09),
            "miner": Address::repeat_byte(0x02),
            "stateRoot": hex32(0x03),
            "transactionsRoot": hex32(0x04),
            "receiptsRoot": hex32(0x05),
            "logsBloom": Bloom::ZERO,
            "difficulty": "0x0",
            "number": "0x4c4b40",
            "gasLimit": "0x1312d00",
            "gasUsed": "0x5208",
            "timestamp": "0x5f5e1000",
            "extraData": Bytes::from(extra_on_chain),
        });
        let header = canonicalize(&block, CELO_MAINNET).unwrap();
        assert_eq!(*header.hash(), hash);

        // same header past the fork is a different layout
        assert!(canonicalize(&block, 1).is_err());
    }

    #[test]
    fn celo_profile_follows_forks() {
        let profile = ChainProfile::for_block;
        assert_eq!(profile(CELO_MAINNET, 21_615_999), ChainProfile::CeloIstanbul);
        assert_eq!(profile(CELO_MAINNET, 21_616_000), ChainProfile::CeloGingerbread);
        assert_eq!(profile(CELO_MAINNET, 31_056_499), ChainProfile::CeloGingerbread);
        assert_eq!(profile(CELO_MAINNET, 31_056_500), ChainProfile::Standard);
        assert_eq!(profile(CELO_ALFAJORES, 1), ChainProfile::CeloIstanbul);
        assert_eq!(profile(CELO_ALFAJORES, 20_000_000), ChainProfile::CeloGingerbread);
        assert_eq!(profile(CELO_ALFAJORES, 26_384_000), ChainProfile::Standard);
        assert_eq!(profile(10, 1), ChainProfile::Standard);
    }

    /// A post-Gingerbread L1 header: Ethereum fields plus base fee, hashed with the
    /// aggregated seal emptied.
    fn gingerbread_header(number: u64, extra_on_chain: &[u8], extra_for_hash: &[u8]) -> (Value, B256) {
        let hash = hash_of(&[
            &B256::repeat_byte(0x11),
            &B256::repeat_byte(0x12),
            &Address::repeat_byte(0x13),
            &B256::repeat_byte(0x14),
            &B256::repeat_byte(0x15),
            &B256::repeat_byte(0x16),
            &Bloom::ZERO,
            &U256::ZERO,
            &number,
            &35_000_000u64,
            &84_000u64,
            &1_690_000_000u64,
            &Bytes::copy_from_slice(extra_for_hash),
            &B256::ZERO,
            &B64::ZERO,
            &5_000_000_000u64,
        ]);
        let block = json!({
            "hash": hash,
            "parentHash": hex32(0x11),
            "sha3Uncles": hex32(0x12),
            "miner": Address::repeat_byte(0x13),
            "stateRoot": hex32(0x14),
            "transactionsRoot": hex32(0x15),
            "receiptsRoot": hex32(0x16),
            "logsBloom": Bloom::ZERO,
            "difficulty": "0x0",
            "number": format!("0x{:x}", number),
            "gasLimit": "0x2160ec0",
            "gasUsed": "0x14820",
            "timestamp": "0x64bb5a80",
            "extraData": Bytes::copy_from_slice(extra_on_chain),
            "mixHash": hex32(0x00),
            "nonce": "0x0000000000000000",
            "baseFeePerGas": "0x12a05f200",
        });
        (block, hash)
    }

    #[test]
    fn celo_gingerbread_round_trip() {
        let signed_seal =
            encode_list_raw(&[encode_bytes(&[0x7f]), encode_bytes(&[0x61; 48]), encode_bytes(&[0x02])]);
        let extra_on_chain = istanbul_extra(&signed_seal);
        let extra_for_hash = istanbul_extra(&EMPTY_AGGREGATED_SEAL);
        let (block, hash) = gingerbread_header(25_000_000, &extra_on_chain, &extra_for_hash);

        let header = canonicalize(&block, CELO_MAINNET).unwrap();
        assert_eq!(*header.hash(), hash);
        assert_eq!(*header.number(), 25_000_000);
        // the header carries the extra as hashed
        assert!(header.rlp().windows(extra_for_hash.len()).any(|w| w == extra_for_hash.as_slice()));
        assert!(!header.rlp().windows(extra_on_chain.len()).any(|w| w == extra_on_chain.as_slice()));

        // without the Celo rules the seal stays in and the hash differs
        assert!(matches!(
            canonicalize(&block, 1),
            Err(HeaderError::HeaderMismatch { number: 25_000_000, .. })
        ));
    }

    #[test]
    fn gingerbread_short_extra_is_hashed_as_is() {
        let extra = b"celo-node".to_vec();
        let (block, hash) = gingerbread_header(22_000_000, &extra, &extra);
        assert_eq!(*canonicalize(&block, CELO_MAINNET).unwrap().hash(), hash);
    }

    #[test]
    fn celo_l2_extra_is_not_filtered() {
        let signed_seal =
            encode_list_raw(&[encode_bytes(&[0x01]), encode_bytes(&[0x22; 48]), encode_bytes(&[])]);
        let extra = istanbul_extra(&signed_seal);
        let (block, hash) = gingerbread_header(31_056_500, &extra, &extra);
        assert_eq!(*canonicalize(&block, CELO_MAINNET).unwrap().hash(), hash);
    }

    #[test]
    fn short_istanbul_extra_is_rejected() {
        let mut extra = vec![0u8; ISTANBUL_VANITY];
        extra.extend(encode_list_raw(&[encode_bytes(&[]), encode_bytes(&[])]));
        assert!(matches!(
            normalize_istanbul_extra(&extra),
            Err(HeaderError::UnsupportedExtraShape(_))
        ));
        assert!(matches!(
            normalize_istanbul_extra(&[0u8; 8]),
            Err(HeaderError::UnsupportedExtraShape(_))
        ));
    }

    #[test]
    fn missing_field_is_reported() {
        let (mut block, _) = cancun_block();
        block.as_object_mut().unwrap().remove("stateRoot");
        assert!(matches!(canonicalize(&block, 1), Err(HeaderError::MissingField("stateRoot"))));
    }
}
