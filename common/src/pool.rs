use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::rpc::{ChainRpc, JsonRpcChainClient, RpcError};

/// Builds a client for one endpoint URL.
pub type Connector = Arc<dyn Fn(&str) -> Result<Arc<dyn ChainRpc>, RpcError> + Send + Sync>;

/// Tracks when the endpoint list was last refreshed from the registry.
#[derive(Debug, Clone)]
pub struct RefreshSchedule {
    interval: Duration,
    last_run: Option<Instant>,
}

impl RefreshSchedule {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last_run: None }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_run {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }

    pub fn mark(&mut self, now: Instant) {
        self.last_run = Some(now);
    }

    pub fn last_run(&self) -> Option<Instant> {
        self.last_run
    }
}

/// Per-chain RPC clients, cached and shared across loop iterations.
///
/// An endpoint string may list comma-separated alternates; a client is built for a random
/// alternate that answers `eth_blockNumber`.
pub struct ChainRpcPool {
    endpoints: RwLock<HashMap<u64, String>>,
    clients: Mutex<HashMap<u64, Arc<dyn ChainRpc>>>,
    refresh: Mutex<RefreshSchedule>,
    connector: Connector,
}

impl ChainRpcPool {
    pub fn new(connector: Connector, refresh_interval: Duration) -> Self {
        Self {
            endpoints: RwLock::new(HashMap::new()),
            clients: Mutex::new(HashMap::new()),
            refresh: Mutex::new(RefreshSchedule::new(refresh_interval)),
            connector,
        }
    }

    /// A pool that connects with jsonrpsee HTTP clients.
    pub fn with_json_rpc(timeout: Duration, refresh_interval: Duration) -> Self {
        let connector: Connector = Arc::new(move |url: &str| {
            let client = JsonRpcChainClient::new(url, timeout)?;
            Ok(Arc::new(client) as Arc<dyn ChainRpc>)
        });
        Self::new(connector, refresh_interval)
    }

    /// Sets the endpoint string for a chain, dropping the cached client if it changed.
    pub async fn set_endpoints(&self, chain_id: u64, rpc: &str) {
        let mut endpoints = self.endpoints.write().await;
        if endpoints.get(&chain_id).map(String::as_str) == Some(rpc) {
            return;
        }
        info!(chain_id, rpc, "rpc endpoints updated");
        endpoints.insert(chain_id, rpc.to_string());
        self.clients.lock().await.remove(&chain_id);
    }

    pub async fn endpoints(&self, chain_id: u64) -> Option<String> {
        self.endpoints.read().await.get(&chain_id).cloned()
    }

    pub async fn chain_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.endpoints.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Forgets the cached client so the next call picks a fresh alternate.
    pub async fn invalidate(&self, chain_id: u64) {
        self.clients.lock().await.remove(&chain_id);
    }

    pub async fn client(&self, chain_id: u64) -> Result<Arc<dyn ChainRpc>, RpcError> {
        if let Some(client) = self.clients.lock().await.get(&chain_id) {
            return Ok(client.clone());
        }

        let rpc = self.endpoints(chain_id).await.ok_or(RpcError::NoEndpoint(chain_id))?;
        let mut candidates: Vec<&str> =
            rpc.split(',').map(str::trim).filter(|url| !url.is_empty()).collect();
        if candidates.is_empty() {
            return Err(RpcError::NoEndpoint(chain_id));
        }
        candidates.shuffle(&mut rand::thread_rng());

        let mut last_error = String::new();
        for url in candidates {
            let client = match (self.connector)(url) {
                Ok(client) => client,
                Err(e) => {
                    warn!(chain_id, url, error = %e, "cannot build rpc client");
                    last_error = e.to_string();
                    continue;
                },
            };
            match client.block_number().await {
                Ok(head) => {
                    debug!(chain_id, url, head, "rpc endpoint selected");
                    self.clients.lock().await.insert(chain_id, client.clone());
                    return Ok(client);
                },
                Err(e) => {
                    warn!(chain_id, url, error = %e, "rpc endpoint not responding");
                    last_error = e.to_string();
                },
            }
        }
        Err(RpcError::AllEndpointsFailed { chain_id, last_error })
    }

    /// Replaces endpoint strings from `fetch` if the refresh interval has elapsed.
    /// Returns whether a refresh ran.
    pub async fn refresh_if_due<F, Fut, E>(&self, now: Instant, fetch: F) -> Result<bool, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<(u64, String)>, E>>,
    {
        if !self.refresh.lock().await.is_due(now) {
            return Ok(false);
        }
        let entries = fetch().await?;
        for (chain_id, rpc) in &entries {
            self.set_endpoints(*chain_id, rpc).await;
        }
        self.refresh.lock().await.mark(now);
        info!(chains = entries.len(), "rpc list refreshed");
        Ok(true)
    }
}
