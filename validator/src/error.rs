use blockrelay_common::config::LoadError;
use blockrelay_common::rpc::RpcError;
use blockrelay_common::signer::SignerError;
use blockrelay_common::storage::StorageError;
use blockrelay_common::{Classify, ErrorKind};
use blockrelay_contracts::ContractError;

#[derive(thiserror::Error, Debug)]
pub enum AttestationError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("registry: {0}")]
    Contract(#[from] ContractError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Signer(#[from] SignerError),
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error("VALIDATOR_KEYS is not set")]
    MissingKeys,
}

impl Classify for AttestationError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Rpc(e) => e.kind(),
            Self::Contract(e) => e.kind(),
            Self::Storage(e) => e.kind(),
            Self::Signer(e) => e.kind(),
            Self::Config(e) => e.kind(),
            Self::MissingKeys => ErrorKind::Startup,
        }
    }
}
