//! In-memory Merkle-Patricia trie, as used for block receipt roots.

use alloy_primitives::{keccak256, Bytes, B256};
use alloy_rlp::EMPTY_STRING_CODE;

use crate::rlp::{encode_bytes, encode_list_raw};

mod proof;
pub use proof::{index2key, MerkleProof, ProofError};

#[derive(Debug, Clone)]
enum Node {
    Empty,
    Leaf { path: Vec<u8>, value: Vec<u8> },
    Extension { path: Vec<u8>, child: Box<Node> },
    Branch { children: Box<[Node; 16]>, value: Option<Vec<u8>> },
}

impl Node {
    fn empty_children() -> Box<[Node; 16]> {
        Box::new(std::array::from_fn(|_| Node::Empty))
    }

    fn encode(&self) -> Vec<u8> {
        match self {
            Node::Empty => vec![EMPTY_STRING_CODE],
            Node::Leaf { path, value } => {
                encode_list_raw(&[encode_bytes(&compact_path(path, true)), encode_bytes(value)])
            },
            Node::Extension { path, child } => {
                encode_list_raw(&[encode_bytes(&compact_path(path, false)), child.reference()])
            },
            Node::Branch { children, value } => {
                let mut items: Vec<Vec<u8>> = children.iter().map(Node::reference).collect();
                items.push(encode_bytes(value.as_deref().unwrap_or_default()));
                encode_list_raw(&items)
            },
        }
    }

    /// How a parent embeds this node: inline when shorter than a hash, otherwise by hash.
    fn reference(&self) -> Vec<u8> {
        if let Node::Empty = self {
            return vec![EMPTY_STRING_CODE];
        }
        let encoded = self.encode();
        if encoded.len() < 32 {
            encoded
        } else {
            encode_bytes(keccak256(&encoded).as_slice())
        }
    }

    fn insert(self, path: &[u8], value: Vec<u8>) -> Node {
        match self {
            Node::Empty => Node::Leaf { path: path.to_vec(), value },
            Node::Leaf { path: leaf_path, value: leaf_value } => {
                let common = common_prefix(&leaf_path, path);
                if common == leaf_path.len() && common == path.len() {
                    return Node::Leaf { path: leaf_path, value };
                }
                let branch = Node::Branch { children: Self::empty_children(), value: None }
                    .insert(&leaf_path[common..], leaf_value)
                    .insert(&path[common..], value);
                with_extension(&path[..common], branch)
            },
            Node::Extension { path: ext_path, child } => {
                let common = common_prefix(&ext_path, path);
                if common == ext_path.len() {
                    let child = child.insert(&path[common..], value);
                    return Node::Extension { path: ext_path, child: Box::new(child) };
                }
                let mut children = Self::empty_children();
                let remainder = &ext_path[common + 1..];
                children[ext_path[common] as usize] = if remainder.is_empty() {
                    *child
                } else {
                    Node::Extension { path: remainder.to_vec(), child }
                };
                let branch = Node::Branch { children, value: None }.insert(&path[common..], value);
                with_extension(&path[..common], branch)
            },
            Node::Branch { mut children, value: branch_value } => {
                if path.is_empty() {
                    return Node::Branch { children, value: Some(value) };
                }
                let index = path[0] as usize;
                let child = std::mem::replace(&mut children[index], Node::Empty);
                children[index] = child.insert(&path[1..], value);
                Node::Branch { children, value: branch_value }
            },
        }
    }
}

fn with_extension(prefix: &[u8], node: Node) -> Node {
    if prefix.is_empty() {
        node
    } else {
        Node::Extension { path: prefix.to_vec(), child: Box::new(node) }
    }
}

fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Splits bytes into nibbles, high nibble first.
pub fn to_nibbles(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().flat_map(|b| [b >> 4, b & 0x0f]).collect()
}

/// Hex-prefix encoding of a nibble path.
pub fn compact_path(nibbles: &[u8], leaf: bool) -> Vec<u8> {
    let flag = if leaf { 2 } else { 0 };
    let mut out = Vec::with_capacity(nibbles.len() / 2 + 1);
    let rest = if nibbles.len() % 2 == 1 {
        out.push(((flag + 1) << 4) | nibbles[0]);
        &nibbles[1..]
    } else {
        out.push(flag << 4);
        nibbles
    };
    for pair in rest.chunks(2) {
        out.push((pair[0] << 4) | pair[1]);
    }
    out
}

/// Inverse of [`compact_path`]; returns the nibbles and whether the path ends in a leaf.
pub fn decode_compact(encoded: &[u8]) -> Option<(Vec<u8>, bool)> {
    let first = *encoded.first()?;
    let flag = first >> 4;
    if flag > 3 {
        return None;
    }
    let mut nibbles = Vec::with_capacity(encoded.len() * 2);
    if flag & 1 == 1 {
        nibbles.push(first & 0x0f);
    }
    nibbles.extend(to_nibbles(&encoded[1..]));
    Some((nibbles, flag & 2 == 2))
}

/// A Merkle-Patricia trie kept entirely in memory.
#[derive(Debug, Clone)]
pub struct PatriciaTrie {
    root: Node,
}

impl Default for PatriciaTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl PatriciaTrie {
    pub fn new() -> Self {
        Self { root: Node::Empty }
    }

    pub fn insert(&mut self, key: &[u8], value: Vec<u8>) {
        let root = std::mem::replace(&mut self.root, Node::Empty);
        self.root = root.insert(&to_nibbles(key), value);
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let nibbles = to_nibbles(key);
        let mut path = nibbles.as_slice();
        let mut node = &self.root;
        loop {
            match node {
                Node::Empty => return None,
                Node::Leaf { path: leaf_path, value } => {
                    return (leaf_path.as_slice() == path).then_some(value.as_slice());
                },
                Node::Extension { path: ext_path, child } => {
                    path = path.strip_prefix(ext_path.as_slice())?;
                    node = child;
                },
                Node::Branch { children, value } => {
                    let Some((first, rest)) = path.split_first() else {
                        return value.as_deref();
                    };
                    node = &children[*first as usize];
                    path = rest;
                },
            }
        }
    }

    pub fn root_hash(&self) -> B256 {
        keccak256(self.root.encode())
    }

    /// Returns the encoded nodes on the path from the root to `key`, root first.
    pub fn proof(&self, key: &[u8]) -> Option<Vec<Bytes>> {
        let nibbles = to_nibbles(key);
        let mut path = nibbles.as_slice();
        let mut node = &self.root;
        let mut proof = Vec::new();
        loop {
            match node {
                Node::Empty => return None,
                Node::Leaf { path: leaf_path, .. } => {
                    proof.push(Bytes::from(node.encode()));
                    return (leaf_path.as_slice() == path).then_some(proof);
                },
                Node::Extension { path: ext_path, child } => {
                    path = path.strip_prefix(ext_path.as_slice())?;
                    proof.push(Bytes::from(node.encode()));
                    node = child;
                },
                Node::Branch { children, value } => {
                    proof.push(Bytes::from(node.encode()));
                    let Some((first, rest)) = path.split_first() else {
                        return value.is_some().then_some(proof);
                    };
                    node = &children[*first as usize];
                    path = rest;
                },
            }
        }
    }
}
