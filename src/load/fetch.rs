//! Byte transport for buffer and image URIs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use parking_lot::RwLock;
use percent_encoding::percent_decode_str;

use crate::util::{Error, Result};

/// Transport used to fetch the bytes behind a resolved URI.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>>;
}

/// Reads URIs as file-system paths, optionally below a base directory.
#[derive(Debug, Clone, Default)]
pub struct FileFetcher {
    base_dir: Option<PathBuf>,
}

impl FileFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative paths against `base_dir`.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn path_for(&self, uri: &str) -> PathBuf {
        let stripped = uri.strip_prefix("file://").unwrap_or(uri);
        let path = PathBuf::from(percent_decode(stripped));
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        }
    }
}

#[async_trait]
impl Fetcher for FileFetcher {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
        let path = self.path_for(uri);
        tokio::fs::read(&path).await.map_err(|e| Error::Fetch {
            uri: uri.to_string(),
            message: format!("{}: {}", path.display(), e),
        })
    }
}

/// In-memory transport keyed by URI, with per-URI fetch counters.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    entries: RwLock<HashMap<String, Arc<[u8]>>>,
    fetches: RwLock<HashMap<String, Arc<AtomicUsize>>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the bytes served for `uri`.
    pub fn insert(&self, uri: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        let bytes: Vec<u8> = bytes.into();
        self.entries.write().insert(uri.into(), bytes.into());
    }

    /// Number of fetches issued for `uri` so far.
    pub fn fetch_count(&self, uri: &str) -> usize {
        self.fetches
            .read()
            .get(uri)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    fn counter(&self, uri: &str) -> Arc<AtomicUsize> {
        if let Some(c) = self.fetches.read().get(uri) {
            return Arc::clone(c);
        }
        Arc::clone(self.fetches.write().entry(uri.to_string()).or_default())
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
        self.counter(uri).fetch_add(1, Ordering::SeqCst);
        let bytes = self.entries.read().get(uri).cloned();
        bytes.map(|b| b.to_vec()).ok_or_else(|| Error::Fetch {
            uri: uri.to_string(),
            message: "not found".into(),
        })
    }
}

/// Returns true for `data:` URIs, which are decoded without a fetcher.
#[inline]
pub fn is_data_uri(uri: &str) -> bool {
    uri.starts_with("data:")
}

/// Decode a base64 `data:` URI into bytes.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| Error::invalid(format!("not a data URI: {}", truncate(uri))))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::invalid(format!("data URI without payload: {}", truncate(uri))))?;
    if !meta.ends_with(";base64") {
        return Err(Error::invalid(format!(
            "only base64 data URIs are supported: {}",
            truncate(uri)
        )));
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| Error::invalid(format!("bad base64 in data URI: {}", e)))
}

/// Resolve `uri` relative to the document it was found in.
///
/// Absolute URIs (with a scheme or a leading `/`) and `data:` URIs are
/// returned unchanged.
pub fn resolve_uri(base: &str, uri: &str) -> String {
    if is_data_uri(uri) || uri.contains("://") || uri.starts_with('/') || base.is_empty() {
        return uri.to_string();
    }
    match base.rfind('/') {
        Some(pos) => format!("{}{}", &base[..=pos], uri),
        None => uri.to_string(),
    }
}

/// Decode `%XX` escapes; malformed escapes are kept verbatim.
pub fn percent_decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

fn truncate(uri: &str) -> &str {
    match uri.char_indices().nth(48) {
        Some((pos, _)) => &uri[..pos],
        None => uri,
    }
}
