use alloy_primitives::{Address, B256};
use std::sync::Arc;
use tracing::{debug, info};

use blockrelay_common::fetch_bounded;
use blockrelay_common::types::BridgeRequest;
use blockrelay_contracts::{BridgeClient, MulticallClient};
use blockrelay_sdk::CheckpointResolver;

use crate::config::RelayerSettings;
use crate::RelayerError;

/// One relay direction of a bridge pair.
#[derive(Clone)]
pub struct BridgeDirection {
    pub source_chain: u64,
    pub target_chain: u64,
    pub source_bridge: Arc<dyn BridgeClient>,
    /// Destination bridge holding `executedRequests`.
    pub target_bridge: Address,
    pub multicall: Arc<dyn MulticallClient>,
}

impl BridgeDirection {
    /// Cursor key, `{source}_{target}_{source bridge as lowercase 0x-hex}`.
    pub fn key(&self) -> String {
        format!(
            "{}_{}_0x{}",
            self.source_chain,
            self.target_chain,
            hex::encode(self.source_bridge.address())
        )
    }
}

/// Requests ready to be relayed in one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingRequests {
    /// Latest attested source block.
    pub checkpoint: u64,
    /// Queried source range, inclusive.
    pub from: u64,
    pub to: u64,
    pub requests: Vec<BridgeRequest>,
    /// Where the next scan starts.
    pub next_cursor: u64,
}

impl PendingRequests {
    /// Distinct source transactions of the requests, in block order.
    pub fn transaction_hashes(&self) -> Vec<B256> {
        let mut hashes: Vec<B256> = Vec::with_capacity(self.requests.len());
        for request in &self.requests {
            if !hashes.contains(&request.transaction_hash) {
                hashes.push(request.transaction_hash);
            }
        }
        hashes
    }
}

/// Splits `from..=to` into query windows of `size` blocks.
pub fn query_windows(from: u64, to: u64, size: u64) -> Vec<(u64, u64)> {
    let size = size.max(1);
    let mut windows = Vec::new();
    let mut start = from;
    while start <= to {
        let end = to.min(start.saturating_add(size - 1));
        windows.push((start, end));
        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }
    windows
}

/// Caps `requests` (sorted by block) to `max` entries, extended to the end of the block the
/// cap falls in. Returns the kept requests and the last block they cover, if capped.
fn cap_by_block(
    mut requests: Vec<BridgeRequest>, max: usize,
) -> (Vec<BridgeRequest>, Option<u64>) {
    let max = max.max(1);
    if requests.len() <= max {
        return (requests, None);
    }
    let boundary = requests[max - 1].block_number;
    requests.retain(|r| r.block_number <= boundary);
    (requests, Some(boundary))
}

/// Finds bridge requests on the source chain of `direction` that are covered by an
/// attested checkpoint and not yet executed on the target chain.
///
/// The scan starts at `cursor` (inclusive) or `history_depth` blocks behind the latest
/// checkpoint, and covers at most `max_blocks` blocks. The next cursor is the block of the
/// last returned request, or the end of what was scanned when nothing is left to relay.
pub async fn fetch_pending_bridge_requests(
    resolver: &CheckpointResolver, direction: &BridgeDirection, cursor: Option<u64>,
    settings: &RelayerSettings,
) -> Result<PendingRequests, RelayerError> {
    let checkpoint = resolver.latest_checkpoint(direction.source_chain).await?;
    let from = cursor.unwrap_or_else(|| checkpoint.saturating_sub(settings.history_depth));
    if from > checkpoint {
        debug!(key = %direction.key(), from, checkpoint, "cursor ahead of checkpoint");
        return Ok(PendingRequests { checkpoint, from, to: from, next_cursor: from, ..Default::default() });
    }
    let to = from.saturating_add(settings.max_blocks).min(checkpoint);

    let windows = query_windows(from, to, settings.query_window);
    let source_bridge = &direction.source_bridge;
    let found = fetch_bounded(windows, settings.query_concurrency, |(a, b)| {
        source_bridge.bridge_requests(a, b)
    })
    .await?;
    let mut candidates: Vec<BridgeRequest> = found
        .into_iter()
        .flatten()
        .filter(|r| r.target_chain_id == direction.target_chain)
        .collect();
    candidates.sort_by_key(|r| r.block_number);
    let (candidates, capped_at) = cap_by_block(candidates, settings.max_requests);
    let scanned_to = capped_at.unwrap_or(to);

    let ids: Vec<B256> = candidates.iter().map(|r| r.id).collect();
    let multicall = &direction.multicall;
    let target_bridge = direction.target_bridge;
    let executed: Vec<bool> = fetch_bounded(
        ids.chunks(settings.multicall_chunk_size.max(1)).map(<[B256]>::to_vec),
        settings.multicall_concurrency,
        |chunk: Vec<B256>| async move { multicall.executed_requests(target_bridge, &chunk).await },
    )
    .await?
    .into_iter()
    .flatten()
    .collect();

    let mut requests: Vec<BridgeRequest> = candidates
        .into_iter()
        .zip(executed)
        .filter_map(|(request, done)| (!done).then_some(request))
        .collect();
    if let Some(first) = requests.first().map(|r| r.block_number) {
        let last_allowed = first.saturating_add(settings.block_window);
        requests.retain(|r| r.block_number <= last_allowed);
    }
    let next_cursor = requests.last().map_or(scanned_to, |r| r.block_number);

    info!(
        key = %direction.key(),
        from,
        to,
        checkpoint,
        candidates = ids.len(),
        pending = requests.len(),
        next_cursor,
        "pending bridge requests fetched"
    );
    Ok(PendingRequests { checkpoint, from, to, requests, next_cursor })
}
