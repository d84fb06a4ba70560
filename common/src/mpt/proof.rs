use alloy_primitives::{keccak256, Bytes, B256};
use serde::{Deserialize, Serialize};

use super::decode_compact;
use crate::error::{Classify, ErrorKind};
use crate::rlp::{decode_list_raw, item_payload};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ProofError {
    #[error("proof is empty")]
    EmptyProof,
    #[error("proof ended before reaching a leaf at node {0}")]
    ProofTooShort(usize),
    #[error("hash of node {index} is {actual}, expected {expected}")]
    RootMismatch { index: usize, expected: B256, actual: B256 },
    #[error("inline node {0} does not match its parent reference")]
    InlineNodeMismatch(usize),
    #[error("node {0} is not a valid trie node")]
    InvalidNode(usize),
    #[error("key element {0} is not a nibble")]
    InvalidKeyNibble(u8),
    #[error("key diverges from trie path at node {0}")]
    KeyMismatch(usize),
    #[error("key not present in trie")]
    KeyNotFound,
    #[error("leaf value differs from expected value")]
    ValueMismatch,
}

impl Classify for ProofError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::ItemFatal
    }
}

/// Receipt inclusion proof in the shape the destination verifier consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProof {
    pub expected_root: B256,
    pub key: Bytes,
    pub proof: Vec<Bytes>,
    pub key_index: u64,
    pub proof_index: u64,
    pub expected_value: Bytes,
}

enum NodeRef<'a> {
    Hash(B256),
    Inline(&'a [u8]),
}

impl MerkleProof {
    /// Replays the trie walk described by `key` over `proof`.
    pub fn verify(&self) -> Result<(), ProofError> {
        if self.proof.is_empty() {
            return Err(ProofError::EmptyProof);
        }
        let key = &self.key[..];
        let mut key_index = self.key_index as usize;
        let mut proof_index = self.proof_index as usize;
        let mut expected = NodeRef::Hash(self.expected_root);

        loop {
            let node = self.proof.get(proof_index).ok_or(ProofError::ProofTooShort(proof_index))?;
            match expected {
                NodeRef::Hash(hash) => {
                    let actual = keccak256(node);
                    if actual != hash {
                        return Err(ProofError::RootMismatch {
                            index: proof_index,
                            expected: hash,
                            actual,
                        });
                    }
                },
                NodeRef::Inline(raw) => {
                    if raw != &node[..] {
                        return Err(ProofError::InlineNodeMismatch(proof_index));
                    }
                },
            }

            let items = decode_list_raw(node).map_err(|_| ProofError::InvalidNode(proof_index))?;
            match items.len() {
                17 => {
                    let Some(&nibble) = key.get(key_index) else {
                        return self.check_value(items[16], proof_index);
                    };
                    if nibble >= 16 {
                        return Err(ProofError::InvalidKeyNibble(nibble));
                    }
                    expected = child_ref(items[nibble as usize], proof_index)?;
                    key_index += 1;
                },
                2 => {
                    let (_, encoded_path) =
                        item_payload(items[0]).map_err(|_| ProofError::InvalidNode(proof_index))?;
                    let (path, is_leaf) =
                        decode_compact(encoded_path).ok_or(ProofError::InvalidNode(proof_index))?;
                    let rest = key.get(key_index..).unwrap_or_default();
                    if is_leaf {
                        if !leaf_path_matches(&path, encoded_path, rest) {
                            return Err(ProofError::KeyMismatch(proof_index));
                        }
                        return self.check_value(items[1], proof_index);
                    }
                    if !rest.starts_with(&path) {
                        return Err(ProofError::KeyMismatch(proof_index));
                    }
                    expected = child_ref(items[1], proof_index)?;
                    key_index += path.len();
                },
                _ => return Err(ProofError::InvalidNode(proof_index)),
            }
            proof_index += 1;
        }
    }

    fn check_value(&self, item: &[u8], index: usize) -> Result<(), ProofError> {
        let (_, value) = item_payload(item).map_err(|_| ProofError::InvalidNode(index))?;
        if value.is_empty() {
            return Err(ProofError::KeyNotFound);
        }
        if value != &self.expected_value[..] {
            return Err(ProofError::ValueMismatch);
        }
        Ok(())
    }
}

fn child_ref(item: &[u8], index: usize) -> Result<NodeRef<'_>, ProofError> {
    let (is_list, payload) = item_payload(item).map_err(|_| ProofError::InvalidNode(index))?;
    if is_list {
        return Ok(NodeRef::Inline(item));
    }
    match payload.len() {
        0 => Err(ProofError::KeyNotFound),
        32 => Ok(NodeRef::Hash(B256::from_slice(payload))),
        _ => Err(ProofError::InvalidNode(index)),
    }
}

/// A leaf matches the remaining key either nibble by nibble, or as the packed bytes
/// produced when the key's last element was merged back into a full byte.
fn leaf_path_matches(path: &[u8], compact: &[u8], rest: &[u8]) -> bool {
    if rest == path {
        return true;
    }
    let mut packed = Vec::with_capacity(compact.len());
    if path.len() % 2 == 1 {
        packed.push(compact[0] & 0x0f);
    }
    packed.extend_from_slice(&compact[1..]);
    rest == packed.as_slice()
}

/// Builds the proof key for a receipt at `index` whose proof has `proof_length` nodes.
///
/// Every byte of `rlp(index)` is split into two nibbles, except that a byte is kept whole
/// when it lands on the last proof element.
pub fn index2key(index: u64, proof_length: usize) -> Vec<u8> {
    let encoded = alloy_rlp::encode(index);
    let mut key = Vec::with_capacity(encoded.len() * 2);
    for byte in encoded {
        if key.len() + 1 == proof_length {
            key.push(byte);
        } else {
            key.push(byte >> 4);
            key.push(byte & 0x0f);
        }
    }
    key
}
