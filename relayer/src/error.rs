use blockrelay_common::config::LoadError;
use blockrelay_common::signer::SignerError;
use blockrelay_common::storage::StorageError;
use blockrelay_common::{Classify, ErrorKind};
use blockrelay_contracts::ContractError;
use blockrelay_sdk::SdkError;

#[derive(thiserror::Error, Debug)]
pub enum RelayerError {
    #[error(transparent)]
    Sdk(#[from] SdkError),
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Signer(#[from] SignerError),
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error("chain {chain_id} has no {field} configured")]
    IncompleteChain { chain_id: u64, field: &'static str },
    #[error("RELAYER_KEY is not set")]
    MissingKey,
}

impl Classify for RelayerError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Sdk(e) => e.kind(),
            Self::Contract(e) => e.kind(),
            Self::Storage(e) => e.kind(),
            Self::Signer(e) => e.kind(),
            Self::Config(e) => e.kind(),
            Self::IncompleteChain { .. } | Self::MissingKey => ErrorKind::Startup,
        }
    }
}
