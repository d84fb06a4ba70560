use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// The `[relayer]` table of the relayer config file. The rest of the file is the
/// network config shared with the SDK CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayerSettings {
    pub poll_interval_secs: u64,
    /// Relative paths live in the config directory.
    pub cursor_file: PathBuf,
    /// Source blocks scanned per cycle.
    pub max_blocks: u64,
    pub max_requests: usize,
    /// Blocks one relay transaction may span, counted from its first request.
    pub block_window: u64,
    /// How far behind the checkpoint a direction without a cursor starts.
    pub history_depth: u64,
    /// Blocks per `BridgeRequest` log query.
    pub query_window: u64,
    pub query_concurrency: usize,
    pub multicall_chunk_size: usize,
    pub multicall_concurrency: usize,
    pub max_cycles_per_tick: u32,
    /// Bridge pairs, relayed in both directions.
    pub pairs: Vec<[u64; 2]>,
}

impl Default for RelayerSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            cursor_file: PathBuf::from("cursors.json"),
            max_blocks: 5_000,
            max_requests: 100,
            block_window: 50,
            history_depth: 20_000,
            query_window: 1_000,
            query_concurrency: 3,
            multicall_chunk_size: 100,
            multicall_concurrency: 5,
            max_cycles_per_tick: 10,
            pairs: Vec::new(),
        }
    }
}

impl RelayerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// `(source, target)` for both directions of every pair.
    pub fn directions(&self) -> Vec<(u64, u64)> {
        self.pairs.iter().flat_map(|[a, b]| [(*a, *b), (*b, *a)]).collect()
    }
}

/// Reads only the `[relayer]` table of a config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayerFile {
    #[serde(default)]
    pub relayer: RelayerSettings,
}
