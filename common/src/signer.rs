use alloy_primitives::{keccak256, Address, B256, U256};
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{
    Error as EcdsaError, RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey,
};
use sha3::{Digest, Keccak256};

use crate::error::{Classify, ErrorKind};
use crate::types::{Signature, SignedBlock};

const PERSONAL_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

#[derive(thiserror::Error, Debug)]
pub enum SignerError {
    #[error("invalid secret key: {0}")]
    InvalidKey(String),
    #[error("ecdsa failure: {0}")]
    Ecdsa(#[from] EcdsaError),
}

impl Classify for SignerError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidKey(_) => ErrorKind::Startup,
            Self::Ecdsa(_) => ErrorKind::ItemFatal,
        }
    }
}

/// The hash a validator signs for a block:
/// `keccak256(abi.encodePacked(blockHash, chainId, validators, cycleEnd))`.
pub fn signing_payload(
    block_hash: B256, chain_id: u64, validators: &[Address], cycle_end: u64,
) -> B256 {
    let mut hasher = Keccak256::new();
    hasher.update(block_hash);
    hasher.update(U256::from(chain_id).to_be_bytes::<32>());
    for validator in validators {
        // packed arrays pad every element to a full word
        hasher.update([0u8; 12]);
        hasher.update(validator);
    }
    hasher.update(U256::from(cycle_end).to_be_bytes::<32>());
    B256::from_slice(&hasher.finalize())
}

/// `keccak256("\x19Ethereum Signed Message:\n32" ++ payload)`
pub fn personal_message_hash(payload: B256) -> B256 {
    let mut message = Vec::with_capacity(PERSONAL_MESSAGE_PREFIX.len() + 32);
    message.extend_from_slice(PERSONAL_MESSAGE_PREFIX);
    message.extend_from_slice(payload.as_slice());
    keccak256(message)
}

pub fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Holds one validator key and signs block headers with it.
#[derive(Clone)]
pub struct BlockSigner {
    key: SigningKey,
    address: Address,
}

impl std::fmt::Debug for BlockSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockSigner").field("address", &self.address).finish()
    }
}

impl BlockSigner {
    pub fn new(key: SigningKey) -> Self {
        let address = address_from_verifying_key(key.verifying_key());
        Self { key, address }
    }

    pub fn from_hex(secret: &str) -> Result<Self, SignerError> {
        let secret = secret.trim();
        let bytes = hex::decode(secret.strip_prefix("0x").unwrap_or(secret))
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        let key = SigningKey::from_slice(&bytes).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Ok(Self::new(key))
    }

    /// Parses a comma-separated list of hex keys.
    pub fn from_hex_list(secrets: &str) -> Result<Vec<Self>, SignerError> {
        let signers = secrets
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Self::from_hex)
            .collect::<Result<Vec<_>, _>>()?;
        if signers.is_empty() {
            return Err(SignerError::InvalidKey("no keys given".into()));
        }
        Ok(signers)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.key
    }

    pub fn sign(
        &self, rlp_header: &[u8], chain_id: u64, cycle_end: u64, validators: &[Address],
    ) -> Result<SignedBlock, SignerError> {
        let block_hash = keccak256(rlp_header);
        let payload = signing_payload(block_hash, chain_id, validators, cycle_end);
        let message = personal_message_hash(payload);

        let (sig, rec) = self.key.sign_prehash_recoverable(message.as_slice())?;
        let r: [u8; 32] = sig.r().to_bytes().into();
        let mut vs: [u8; 32] = sig.s().to_bytes().into();
        if rec.is_y_odd() {
            vs[0] |= 0x80;
        }

        Ok(SignedBlock {
            chain_id,
            rlp_header: rlp_header.to_vec().into(),
            block_hash,
            signature: Signature { r: B256::from(r), vs: B256::from(vs) },
            cycle_end,
            validators: validators.to_vec(),
        })
    }
}

/// Splits a compact signature back into `(r, s, y_parity)`.
pub fn split_compact(signature: &Signature) -> ([u8; 32], [u8; 32], bool) {
    let mut s = signature.vs.0;
    let odd = s[0] & 0x80 != 0;
    s[0] &= 0x7f;
    (signature.r.0, s, odd)
}

/// Recovers the validator that signed a payload.
pub fn recover_payload_signer(payload: B256, signature: &Signature) -> Result<Address, SignerError> {
    let (r, s, odd) = split_compact(signature);
    let mut bytes = Vec::with_capacity(64);
    bytes.extend(r);
    bytes.extend(s);
    let message = personal_message_hash(payload);

    let sig = EcdsaSignature::try_from(bytes.as_slice())?;
    let rec_id = RecoveryId::new(odd, false);
    let verifying_key = VerifyingKey::recover_from_prehash(message.as_slice(), &sig, rec_id)?;
    verifying_key.verify_prehash(message.as_slice(), &sig)?;
    Ok(address_from_verifying_key(&verifying_key))
}

/// Recovers the validator address behind a signed block.
pub fn recover_signer(block: &SignedBlock) -> Result<Address, SignerError> {
    let payload =
        signing_payload(block.block_hash, block.chain_id, &block.validators, block.cycle_end);
    recover_payload_signer(payload, &block.signature)
}

#[cfg(test)]
mod test {
    use super::*;
    use alloy_primitives::address;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[test]
    fn should_derive_known_address() {
        let signer = BlockSigner::from_hex(KEY).unwrap();
        assert_eq!(signer.address(), address!("2c7536e3605d9c16a7a3d7b1898e529396a65c23"));
    }

    #[test]
    fn should_sign_and_recover() {
        let signer = BlockSigner::from_hex(KEY).unwrap();
        let validators = vec![Address::repeat_byte(0x01), Address::repeat_byte(0x02)];
        let block = signer.sign(&[0xc0], 122, 1_700_000_000, &validators).unwrap();

        assert_eq!(block.block_hash, keccak256([0xc0]));
        assert_eq!(block.cycle_end, 1_700_000_000);
        assert_eq!(recover_signer(&block).unwrap(), signer.address());
    }

    #[test]
    fn payload_binds_validator_set() {
        let hash = B256::repeat_byte(0x42);
        let empty = signing_payload(hash, 1, &[], 0);
        let with_set = signing_payload(hash, 1, &[Address::repeat_byte(0x01)], 0);
        let other_chain = signing_payload(hash, 2, &[], 0);
        assert_ne!(empty, with_set);
        assert_ne!(empty, other_chain);

        let mut packed = Vec::new();
        packed.extend_from_slice(hash.as_slice());
        packed.extend_from_slice(&U256::from(1u64).to_be_bytes::<32>());
        packed.extend_from_slice(&[0u8; 12]);
        packed.extend_from_slice(Address::repeat_byte(0x01).as_slice());
        packed.extend_from_slice(&U256::ZERO.to_be_bytes::<32>());
        assert_eq!(with_set, keccak256(packed));
    }

    #[test]
    fn tampered_signature_recovers_someone_else() {
        let signer = BlockSigner::from_hex(KEY).unwrap();
        let mut block = signer.sign(&[0xc0], 1, 0, &[]).unwrap();
        block.chain_id = 2;
        match recover_signer(&block) {
            Ok(address) => assert_ne!(address, signer.address()),
            Err(_) => {},
        }
    }

    #[test]
    fn should_parse_key_lists() {
        let keys = format!("{}, {}", KEY, "0x0101010101010101010101010101010101010101010101010101010101010101");
        assert_eq!(BlockSigner::from_hex_list(&keys).unwrap().len(), 2);
        assert!(BlockSigner::from_hex_list("").is_err());
        assert!(BlockSigner::from_hex("0xzz").is_err());
    }
}
