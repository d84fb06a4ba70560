//! Low-level RLP helpers for working with already-encoded items.
//!
//! Header canonicalization and trie proofs both need to splice raw items
//! (seal fields, embedded trie nodes) into lists without re-encoding them,
//! which the derive-based `alloy_rlp` API does not cover.

use alloy_rlp::{Encodable, Error as RlpError, Header};

/// Encodes a byte string.
pub fn encode_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 3);
    bytes.encode(&mut out);
    out
}

/// Encodes an unsigned big-endian integer given as bytes, stripping leading zeros.
pub fn encode_uint_bytes(bytes: &[u8]) -> Vec<u8> {
    encode_bytes(trim_leading_zeros(bytes))
}

pub fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}

/// Wraps already-encoded items into an RLP list.
pub fn encode_list_raw<T: AsRef<[u8]>>(items: &[T]) -> Vec<u8> {
    let payload_length = items.iter().map(|item| item.as_ref().len()).sum();
    let mut out = Vec::with_capacity(payload_length + 9);
    Header { list: true, payload_length }.encode(&mut out);
    for item in items {
        out.extend_from_slice(item.as_ref());
    }
    out
}

/// Splits an encoded list into its raw (still encoded) items.
pub fn decode_list_raw(data: &[u8]) -> Result<Vec<&[u8]>, RlpError> {
    let mut buf = data;
    let header = Header::decode(&mut buf)?;
    if !header.list {
        return Err(RlpError::UnexpectedString);
    }
    if buf.len() < header.payload_length {
        return Err(RlpError::InputTooShort);
    }
    let mut payload = &buf[..header.payload_length];
    let mut items = Vec::new();
    while !payload.is_empty() {
        let start = payload;
        let item_header = Header::decode(&mut payload)?;
        let consumed = start.len() - payload.len() + item_header.payload_length;
        if start.len() < consumed {
            return Err(RlpError::InputTooShort);
        }
        items.push(&start[..consumed]);
        payload = &start[consumed..];
    }
    Ok(items)
}

/// Returns whether a raw item is a list, and its payload.
pub fn item_payload(item: &[u8]) -> Result<(bool, &[u8]), RlpError> {
    let mut buf = item;
    let header = Header::decode(&mut buf)?;
    if buf.len() < header.payload_length {
        return Err(RlpError::InputTooShort);
    }
    Ok((header.list, &buf[..header.payload_length]))
}
