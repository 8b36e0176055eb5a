//! Asynchronous loading, deduplication and cancellation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use serde_json::json;

use common::*;
use gltf_graph::container::Container;
use gltf_graph::load::MemoryFetcher;
use gltf_graph::prelude::*;

fn registry() -> ExtensionRegistry {
    ExtensionRegistry::with_builtin()
}

#[tokio::test]
async fn test_load_fetches_external_buffer() {
    init_tracing();
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert("assets/tri.bin", triangle_bin());
    let doc = to_bytes(&triangle_document(Some("tri.bin")));
    let gltf = Gltf::from_slice(&doc, "assets/tri.gltf", &registry()).unwrap();
    assert!(!gltf.buffers[0].is_loaded());

    let cx = LoadContext::new(fetcher.clone(), CancellationToken::new());
    assert!(gltf.load(&cx).await.unwrap().is_loaded());
    assert!(gltf.is_loaded());
    assert_eq!(fetcher.fetch_count("assets/tri.bin"), 1);

    let positions = gltf.accessors[0].typed_array().unwrap();
    assert_eq!(positions.as_f32().unwrap(), &TRIANGLE_POSITIONS);
    let indices = gltf.accessors[1].typed_array().unwrap();
    assert_eq!(indices.as_u16().unwrap(), &TRIANGLE_INDICES);

    // Loaded records stay loaded.
    assert!(gltf.load(&cx).await.unwrap().is_loaded());
    assert_eq!(fetcher.fetch_count("assets/tri.bin"), 1);
}

#[tokio::test]
async fn test_shared_buffer_fetched_once() {
    let gated = GatedFetcher::new(MemoryFetcher::new());
    gated.inner.insert("tri.bin", triangle_bin());

    let doc = to_bytes(&triangle_document(Some("tri.bin")));
    let gltf = Gltf::from_slice(&doc, "tri.gltf", &registry()).unwrap();
    let cx = LoadContext::new(gated.clone(), CancellationToken::new());

    // Every path to the buffer is in flight before the transfer completes.
    let release = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        gated.open();
    };
    let (a, b, c, d, ()) = tokio::join!(
        gltf.load(&cx),
        gltf.load(&cx),
        gltf.buffer_views[0].load(&cx),
        gltf.accessors[1].load(&cx),
        release
    );
    assert!(a.unwrap().is_loaded());
    assert!(b.unwrap().is_loaded());
    c.unwrap();
    d.unwrap();
    assert_eq!(gated.inner.fetch_count("tri.bin"), 1);
}

#[tokio::test]
async fn test_cancel_then_retry() {
    init_tracing();
    let gated = GatedFetcher::new(MemoryFetcher::new());
    gated.inner.insert("tri.bin", triangle_bin());
    let doc = to_bytes(&triangle_document(Some("tri.bin")));
    let gltf = Gltf::from_slice(&doc, "tri.gltf", &registry()).unwrap();

    let token = CancellationToken::new();
    let cx = LoadContext::new(gated.clone(), token.clone());
    let cancel = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
    };
    let (outcome, ()) = tokio::join!(gltf.load(&cx), cancel);
    assert!(outcome.unwrap().is_cancelled());
    assert!(!gltf.is_loaded());
    assert!(!gltf.buffers[0].is_loaded());
    assert_eq!(gated.inner.fetch_count("tri.bin"), 0);

    // The cancelled token stays cancelled.
    assert!(gltf.load(&cx).await.unwrap().is_cancelled());

    gated.open();
    let retry = LoadContext::new(gated.clone(), CancellationToken::new());
    assert!(gltf.load(&retry).await.unwrap().is_loaded());
    assert_eq!(gated.inner.fetch_count("tri.bin"), 1);
    assert_eq!(
        gltf.accessors[1].typed_array().unwrap().as_u16().unwrap(),
        &TRIANGLE_INDICES
    );
}

#[tokio::test]
async fn test_fetch_failure_is_an_error() {
    let fetcher = Arc::new(MemoryFetcher::new());
    let doc = to_bytes(&triangle_document(Some("missing.bin")));
    let gltf = Gltf::from_slice(&doc, "tri.gltf", &registry()).unwrap();
    let cx = LoadContext::new(fetcher.clone(), CancellationToken::new());

    let err = gltf.load(&cx).await.unwrap_err();
    assert!(matches!(err.root(), Error::Fetch { uri, .. } if uri == "missing.bin"));

    // A failed load is retried on the next call.
    fetcher.insert("missing.bin", triangle_bin());
    assert!(gltf.load(&cx).await.unwrap().is_loaded());
    assert_eq!(fetcher.fetch_count("missing.bin"), 2);
}

#[tokio::test]
async fn test_data_uri_buffer() {
    let uri = format!(
        "data:application/octet-stream;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(triangle_bin())
    );
    let doc = to_bytes(&triangle_document(Some(&uri)));
    let gltf = Gltf::from_slice(&doc, "tri.gltf", &registry()).unwrap();
    let fetcher = Arc::new(MemoryFetcher::new());
    let cx = LoadContext::new(fetcher, CancellationToken::new());
    assert!(gltf.load(&cx).await.unwrap().is_loaded());
    assert_eq!(
        gltf.accessors[0].typed_array().unwrap().as_f32().unwrap(),
        &TRIANGLE_POSITIONS
    );
}

#[tokio::test]
async fn test_loader_opens_glb() {
    let fetcher = Arc::new(MemoryFetcher::new());
    let glb = Container::encode(&triangle_document(None), Some(&triangle_bin())).unwrap();
    fetcher.insert("models/tri.glb", glb);

    let loader = GltfLoader::default().with_fetcher(fetcher.clone());
    let gltf = loader
        .open("models/tri.glb", &CancellationToken::new())
        .await
        .unwrap()
        .loaded()
        .unwrap();
    assert_eq!(gltf.source(), "models/tri.glb");
    assert_eq!(gltf.asset.generator.as_deref(), Some("fixture"));
    assert_eq!(
        gltf.accessors[0].typed_array().unwrap().as_f32().unwrap(),
        &TRIANGLE_POSITIONS
    );

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    assert!(loader
        .open("models/tri.glb", &cancelled)
        .await
        .unwrap()
        .is_cancelled());
}

#[tokio::test]
async fn test_sparse_accessor() {
    // Base: four scalars. Sparse: replace elements 1 and 3.
    let mut bin = f32_bytes(&[1.0, 2.0, 3.0, 4.0]);
    bin.extend(u16_bytes(&[1, 3]));
    bin.extend(f32_bytes(&[20.0, 40.0]));
    let doc = json!({
        "asset": { "version": "2.0" },
        "buffers": [{ "byteLength": bin.len(), "uri": "s.bin" }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 16 },
            { "buffer": 0, "byteOffset": 16, "byteLength": 4 },
            { "buffer": 0, "byteOffset": 20, "byteLength": 8 }
        ],
        "accessors": [
            {
                "bufferView": 0, "componentType": 5126, "count": 4, "type": "SCALAR",
                "sparse": {
                    "count": 2,
                    "indices": { "bufferView": 1, "componentType": 5123 },
                    "values": { "bufferView": 2 }
                }
            },
            {
                "componentType": 5126, "count": 3, "type": "SCALAR",
                "sparse": {
                    "count": 1,
                    "indices": { "bufferView": 1, "componentType": 5123 },
                    "values": { "bufferView": 2 }
                }
            }
        ]
    });
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert("s.bin", bin);
    let gltf = Gltf::from_slice(&to_bytes(&doc), "s.gltf", &registry()).unwrap();
    let cx = LoadContext::new(fetcher, CancellationToken::new());
    assert!(gltf.load(&cx).await.unwrap().is_loaded());

    let dense = gltf.accessors[0].typed_array().unwrap();
    assert_eq!(dense.as_f32().unwrap(), &[1.0, 20.0, 3.0, 40.0]);
    // Without a base view the dense array starts zeroed.
    let zeroed = gltf.accessors[1].typed_array().unwrap();
    assert_eq!(zeroed.as_f32().unwrap(), &[0.0, 20.0, 0.0]);
}

#[tokio::test]
async fn test_sparse_index_out_of_range() {
    let mut bin = f32_bytes(&[1.0, 2.0]);
    bin.extend(u16_bytes(&[5, 0]));
    bin.extend(f32_bytes(&[9.0]));
    let doc = json!({
        "asset": { "version": "2.0" },
        "buffers": [{ "byteLength": bin.len(), "uri": "s.bin" }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 8 },
            { "buffer": 0, "byteOffset": 8, "byteLength": 2 },
            { "buffer": 0, "byteOffset": 12, "byteLength": 4 }
        ],
        "accessors": [{
            "bufferView": 0, "componentType": 5126, "count": 2, "type": "SCALAR",
            "sparse": {
                "count": 1,
                "indices": { "bufferView": 1, "componentType": 5123 },
                "values": { "bufferView": 2 }
            }
        }]
    });
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert("s.bin", bin);
    let gltf = Gltf::from_slice(&to_bytes(&doc), "s.gltf", &registry()).unwrap();
    let cx = LoadContext::new(fetcher, CancellationToken::new());
    assert!(gltf.load(&cx).await.unwrap().is_loaded());
    assert!(matches!(
        gltf.accessors[0].typed_array(),
        Err(Error::InvalidStructure(_))
    ));
}
