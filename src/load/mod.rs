//! Asynchronous load orchestration.
//!
//! Loading is driven top-down from the root and fans out over the whole graph.
//! Every record guards its own work with a [`LoadCell`], so a resource that is
//! reachable along many paths (a buffer shared by many views) is fetched once.
//! A single [`CancellationToken`] travels in the [`LoadContext`] and is raced
//! against every fetch and every decode task.

mod cancel;
mod cell;
mod fetch;
mod join;

pub use cancel::CancellationToken;
pub use cell::LoadCell;
pub use fetch::{decode_data_uri, is_data_uri, percent_decode, resolve_uri, FileFetcher, Fetcher, MemoryFetcher};
pub use join::{join_all, LoadUnit};

use std::sync::Arc;

use crate::decode::DecoderPool;
use crate::util::{Error, Result};

/// Terminal state of a public load call.
///
/// Cancellation is a distinct outcome, not an error.
#[derive(Debug)]
pub enum LoadOutcome<T = ()> {
    Loaded(T),
    Cancelled,
}

impl<T> LoadOutcome<T> {
    /// Fold an internal result: cancellation becomes [`LoadOutcome::Cancelled`].
    pub fn from_result(res: Result<T>) -> Result<Self> {
        match res {
            Ok(v) => Ok(Self::Loaded(v)),
            Err(e) if e.is_cancelled() => Ok(Self::Cancelled),
            Err(e) => Err(e),
        }
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The loaded value, if any.
    pub fn loaded(self) -> Option<T> {
        match self {
            Self::Loaded(v) => Some(v),
            Self::Cancelled => None,
        }
    }
}

/// Everything a record needs while loading.
#[derive(Clone)]
pub struct LoadContext {
    token: CancellationToken,
    fetcher: Arc<dyn Fetcher>,
    pool: Option<Arc<DecoderPool>>,
}

impl LoadContext {
    pub fn new(fetcher: Arc<dyn Fetcher>, token: CancellationToken) -> Self {
        Self {
            token,
            fetcher,
            pool: None,
        }
    }

    /// Attach a decoder pool for compressed primitives.
    pub fn with_pool(mut self, pool: Arc<DecoderPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    #[inline]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The decoder pool, or a decode error when none is configured.
    pub fn pool(&self) -> Result<&Arc<DecoderPool>> {
        self.pool
            .as_ref()
            .ok_or_else(|| Error::decode("no decoder pool configured for compressed primitives"))
    }

    /// Fetch a resolved URI, racing the transfer against cancellation.
    pub async fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
        tracing::trace!(uri, "fetch");
        let bytes = self.token.run(self.fetcher.fetch(uri)).await?;
        tracing::trace!(uri, len = bytes.len(), "fetched");
        Ok(bytes)
    }

    /// Bytes for a URI found in the document at `source`; `data:` URIs are decoded inline.
    pub async fn fetch_relative(&self, source: &str, uri: &str) -> Result<Vec<u8>> {
        if is_data_uri(uri) {
            self.token.check()?;
            return decode_data_uri(uri);
        }
        self.fetch(&resolve_uri(source, uri)).await
    }
}

impl std::fmt::Debug for LoadContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadContext")
            .field("cancelled", &self.token.is_cancelled())
            .field("pool", &self.pool.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_result() {
        assert!(LoadOutcome::from_result(Ok(1)).unwrap().is_loaded());
        assert!(LoadOutcome::<()>::from_result(Err(Error::Cancelled))
            .unwrap()
            .is_cancelled());
        assert!(LoadOutcome::<()>::from_result(Err(Error::decode("x"))).is_err());
    }

    #[tokio::test]
    async fn test_fetch_after_cancel() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("a.bin", vec![1u8]);
        let token = CancellationToken::new();
        let cx = LoadContext::new(fetcher.clone(), token.clone());
        assert!(cx.fetch_relative("dir/doc.gltf", "a.bin").await.is_err());
        assert_eq!(fetcher.fetch_count("dir/a.bin"), 1);
        assert_eq!(cx.fetch("a.bin").await.unwrap(), vec![1]);

        token.cancel();
        assert!(matches!(cx.fetch("a.bin").await, Err(Error::Cancelled)));
        assert_eq!(fetcher.fetch_count("a.bin"), 1);
    }
}
