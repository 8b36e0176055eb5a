//! The `asset` block and the version gate.

use serde::Deserialize;
use serde_json::Value;

use crate::util::{Error, Result};

/// Supported major version.
pub const MAJOR_VERSION: u32 = 2;
/// Highest supported minor version.
pub const MINOR_VERSION: u32 = 0;

/// Metadata about the asset.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub min_version: Option<String>,
    #[serde(default)]
    pub generator: Option<String>,
    #[serde(default)]
    pub copyright: Option<String>,
    #[serde(default)]
    pub extras: Option<Value>,
}

impl Asset {
    /// Reject documents this loader cannot read.
    ///
    /// `version` must be `2.x`; `minVersion`, when present, must be `2.0`.
    pub fn check_version(&self) -> Result<()> {
        match parse_version(&self.version) {
            Some((MAJOR_VERSION, _)) => {}
            _ => return Err(Error::UnsupportedVersion(self.version.clone())),
        }
        if let Some(min) = &self.min_version {
            match parse_version(min) {
                Some((MAJOR_VERSION, minor)) if minor <= MINOR_VERSION => {}
                _ => return Err(Error::UnsupportedVersion(format!("minVersion {}", min))),
            }
        }
        Ok(())
    }
}

fn parse_version(s: &str) -> Option<(u32, u32)> {
    let (major, minor) = s.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}
