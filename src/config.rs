//! Loader configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::util::{Error, Result};

/// How decoded data travels back from a worker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// `Shared` where threads share memory, `Copy` otherwise.
    #[default]
    Auto,
    /// Workers write into the caller's arrays.
    Shared,
    /// Workers return bytes that the pool copies.
    Copy,
}

impl TransferMode {
    /// Resolve `Auto` for the current target.
    pub fn resolve(self) -> Self {
        match self {
            Self::Auto if cfg!(target_arch = "wasm32") => Self::Copy,
            Self::Auto => Self::Shared,
            other => other,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "shared" => Some(Self::Shared),
            "copy" => Some(Self::Copy),
            _ => None,
        }
    }
}

/// Decoder pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Worker threads
    pub workers: usize,
    /// Tasks in flight before `decode` waits
    pub max_pending: usize,
    pub transfer: TransferMode,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_pending: 64,
            transfer: TransferMode::Auto,
        }
    }
}

/// Loader settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Directory relative file URIs are resolved against
    pub base_dir: Option<PathBuf>,
    pub pool: PoolConfig,
}

impl LoaderConfig {
    /// Read settings from a JSON file; missing keys take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Defaults overridden by `GLTF_GRAPH_WORKERS`, `GLTF_GRAPH_MAX_PENDING`
    /// and `GLTF_GRAPH_TRANSFER`.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = var("GLTF_GRAPH_WORKERS") {
            self.pool.workers = parse_count("GLTF_GRAPH_WORKERS", &v)?;
        }
        if let Some(v) = var("GLTF_GRAPH_MAX_PENDING") {
            self.pool.max_pending = parse_count("GLTF_GRAPH_MAX_PENDING", &v)?;
        }
        if let Some(v) = var("GLTF_GRAPH_TRANSFER") {
            self.pool.transfer = TransferMode::parse(&v).ok_or_else(|| {
                Error::invalid(format!("GLTF_GRAPH_TRANSFER: unknown mode '{}'", v))
            })?;
        }
        Ok(self)
    }
}

fn parse_count(key: &str, v: &str) -> Result<usize> {
    match v.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Error::invalid(format!("{}: expected a positive integer, got '{}'", key, v))),
    }
}
