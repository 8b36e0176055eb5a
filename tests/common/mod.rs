//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use byteorder::{ByteOrder, LittleEndian};
use serde_json::{json, Value};
use tokio::sync::watch;

use gltf_graph::load::{Fetcher, MemoryFetcher};
use gltf_graph::{Error, Result};

/// Route crate logs to the test harness; `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn f32_bytes(values: &[f32]) -> Vec<u8> {
    let mut out = vec![0u8; values.len() * 4];
    LittleEndian::write_f32_into(values, &mut out);
    out
}

pub fn u16_bytes(values: &[u16]) -> Vec<u8> {
    let mut out = vec![0u8; values.len() * 2];
    LittleEndian::write_u16_into(values, &mut out);
    out
}

pub const TRIANGLE_POSITIONS: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
pub const TRIANGLE_INDICES: [u16; 3] = [0, 1, 2];

/// 36 bytes of positions followed by 6 bytes of indices and 2 bytes padding.
pub fn triangle_bin() -> Vec<u8> {
    let mut bin = f32_bytes(&TRIANGLE_POSITIONS);
    bin.extend(u16_bytes(&TRIANGLE_INDICES));
    bin.extend([0, 0]);
    bin
}

/// One triangle whose buffer lives at `buffer_uri` (or in the BIN chunk when `None`).
pub fn triangle_document(buffer_uri: Option<&str>) -> Value {
    let mut buffer = json!({ "byteLength": 44 });
    if let Some(uri) = buffer_uri {
        buffer["uri"] = json!(uri);
    }
    json!({
        "asset": { "version": "2.0", "generator": "fixture" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0, "translation": [1.0, 2.0, 3.0] }],
        "meshes": [{
            "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1 }]
        }],
        "buffers": [buffer],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 6 }
        ],
        "accessors": [
            { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
              "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] },
            { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }
        ]
    })
}

pub fn to_bytes(doc: &Value) -> Vec<u8> {
    serde_json::to_vec(doc).unwrap()
}

/// Holds every fetch until [`GatedFetcher::open`] is called.
pub struct GatedFetcher {
    pub inner: MemoryFetcher,
    gate: watch::Sender<bool>,
}

impl GatedFetcher {
    pub fn new(inner: MemoryFetcher) -> Arc<Self> {
        let (gate, _) = watch::channel(false);
        Arc::new(Self { inner, gate })
    }

    pub fn open(&self) {
        self.gate.send_replace(true);
    }
}

#[async_trait]
impl Fetcher for GatedFetcher {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
        let mut rx = self.gate.subscribe();
        rx.wait_for(|open| *open).await.map_err(|e| Error::Fetch {
            uri: uri.to_string(),
            message: e.to_string(),
        })?;
        self.inner.fetch(uri).await
    }
}
