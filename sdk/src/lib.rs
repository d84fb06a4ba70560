//! Client side of the block relay: finds the checkpoint covering a source block, proves
//! receipts against it and submits both to a destination-chain verifier.

pub mod checkpoint;
pub mod config;
mod error;
pub mod headers;
pub mod proof;
pub mod relay;

pub use checkpoint::{CheckpointResolver, ResolveMode, ResolvedCheckpoint};
pub use config::{ChainConfig, NetworkConfig};
pub use error::{SdkError, Stage, StageExt};
pub use headers::get_chain_block_headers;
pub use proof::{build_receipt_proof, ReceiptProof};
pub use relay::{RelayOutcome, Relayer};
