pub mod config;
pub mod error;
pub mod header;
pub mod mpt;
pub mod pool;
pub mod receipt;
pub mod rlp;
pub mod rpc;
pub mod signer;
pub mod storage;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use futures::stream::{self, StreamExt, TryStreamExt};
use std::future::Future;
use tracing_subscriber::EnvFilter;

pub use error::{Classify, ErrorKind};

/// Installs the `fmt` subscriber, filtered by `RUST_LOG`.
pub fn setup_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).try_init();
}

/// Runs `f` over `items` with at most `limit` calls in flight, keeping input order.
/// Stops at the first error.
pub async fn fetch_bounded<I, T, E, F, Fut>(items: I, limit: usize, f: F) -> Result<Vec<T>, E>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    stream::iter(items).map(f).buffered(limit.max(1)).try_collect().await
}

/// Like [`fetch_bounded`], but keeps every per-item result.
pub async fn fetch_bounded_all<I, T, E, F, Fut>(items: I, limit: usize, f: F) -> Vec<Result<T, E>>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    stream::iter(items).map(f).buffered(limit.max(1)).collect().await
}
