use alloy_primitives::B256;
use std::fmt;

use blockrelay_common::header::HeaderError;
use blockrelay_common::mpt::ProofError;
use blockrelay_common::rpc::RpcError;
use blockrelay_common::{Classify, ErrorKind};
use blockrelay_contracts::ContractError;

/// A step of the relay pipeline, named in wrapped errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connect,
    Proofs,
    Checkpoint,
    Headers,
    Submit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Proofs => "build proofs",
            Self::Checkpoint => "resolve checkpoint",
            Self::Headers => "fetch headers",
            Self::Submit => "submit",
        };
        write!(f, "{}", name)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SdkError {
    #[error("receipt for {0} not found, an archive node may be required")]
    ReceiptNotFound(B256),
    #[error("receipts root mismatch in block {number}: computed {computed}, header has {expected}")]
    ReceiptsRootMismatch { number: u64, computed: B256, expected: B256 },
    #[error("no signed checkpoint for chain {chain_id} covering block {block}")]
    CheckpointNotFound { chain_id: u64, block: u64 },
    #[error("checkpoint for chain {chain_id} covering block {block} is not attested yet")]
    CheckpointMissing { chain_id: u64, block: u64 },
    #[error("checkpoint {number} hash mismatch: attested {attested}, chain has {actual}")]
    CheckpointHashMismatch { number: u64, attested: B256, actual: B256 },
    #[error("no attested block for chain {0} in the registry look-back window")]
    NoRecentCheckpoint(u64),
    #[error("header {0} does not link to its parent")]
    BrokenParentChain(u64),
    #[error("no transactions to relay")]
    NothingToRelay,
    #[error("chain {0} is not configured")]
    UnknownChain(u64),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error(transparent)]
    Proof(#[from] ProofError),
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error("{stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<SdkError>,
    },
}

impl SdkError {
    /// The innermost error, past any stage wrappers.
    pub fn root(&self) -> &SdkError {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

impl Classify for SdkError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::CheckpointNotFound { .. }
            | Self::CheckpointMissing { .. }
            | Self::BrokenParentChain(_) => ErrorKind::Transient,
            Self::ReceiptsRootMismatch { .. } | Self::CheckpointHashMismatch { .. } => {
                ErrorKind::ItemFatal
            },
            Self::ReceiptNotFound(_) | Self::NoRecentCheckpoint(_) | Self::NothingToRelay => {
                ErrorKind::Permanent
            },
            Self::UnknownChain(_) => ErrorKind::Startup,
            Self::Rpc(e) => e.kind(),
            Self::Header(e) => e.kind(),
            Self::Proof(e) => e.kind(),
            Self::Contract(e) => e.kind(),
            Self::Stage { source, .. } => source.kind(),
        }
    }
}

/// Wraps any pipeline error with the stage it happened in.
pub trait StageExt<T> {
    fn stage(self, stage: Stage) -> Result<T, SdkError>;
}

impl<T, E: Into<SdkError>> StageExt<T> for Result<T, E> {
    fn stage(self, stage: Stage) -> Result<T, SdkError> {
        self.map_err(|e| SdkError::Stage { stage, source: Box::new(e.into()) })
    }
}
