//! Building and dereferencing asset graphs.

mod common;

use std::sync::Arc;

use serde_json::json;

use common::*;
use gltf_graph::container::Container;
use gltf_graph::graph::{Record, RecordKind};
use gltf_graph::prelude::*;

fn build(doc: serde_json::Value) -> Result<Gltf> {
    Gltf::from_document(doc, "scene.gltf", &ExtensionRegistry::with_builtin(), None)
}

#[test]
fn test_links_point_at_collection_elements() {
    init_tracing();
    let gltf = build(triangle_document(Some("tri.bin"))).unwrap();

    let node = gltf.default_scene().unwrap().nodes.as_ref().unwrap()[0]
        .get()
        .unwrap();
    assert!(Arc::ptr_eq(&node, &gltf.nodes[0]));
    let mesh = node.mesh.get().unwrap();
    assert!(Arc::ptr_eq(&mesh, &gltf.meshes[0]));

    let prim = &mesh.primitives[0];
    let position = prim.attribute("POSITION").unwrap();
    assert!(Arc::ptr_eq(&position, &gltf.accessors[0]));
    let indices = prim.index_accessor().unwrap();
    assert!(Arc::ptr_eq(&indices, &gltf.accessors[1]));

    let view = gltf.accessors[1].buffer_view.get().unwrap();
    assert!(Arc::ptr_eq(&view, &gltf.buffer_views[1]));
    let buffer = view.buffer.get().unwrap();
    assert!(Arc::ptr_eq(&buffer, &gltf.buffers[0]));
}

#[test]
fn test_out_of_range_index_fails() {
    let mut doc = triangle_document(Some("tri.bin"));
    doc["meshes"][0]["primitives"][0]["attributes"]["NORMAL"] = json!(7);
    match build(doc) {
        Err(Error::Reference {
            collection, index, len, ..
        }) => {
            assert_eq!(collection, "accessors");
            assert_eq!(index, 7);
            assert_eq!(len, 2);
        }
        other => panic!("expected a reference error, got {:?}", other.map(|_| ())),
    }

    let mut doc = triangle_document(Some("tri.bin"));
    doc["nodes"][0]["mesh"] = json!(-1);
    assert!(matches!(build(doc), Err(Error::Reference { .. })));
}

#[test]
fn test_absent_and_empty_arrays_differ() {
    let doc = json!({
        "asset": { "version": "2.0" },
        "nodes": [{ "children": [] }, {}]
    });
    let gltf = build(doc).unwrap();
    assert_eq!(gltf.nodes[0].children.as_ref().map(Vec::len), Some(0));
    assert!(gltf.nodes[1].children.is_none());
}

#[test]
fn test_version_gate() {
    let v1 = json!({ "asset": { "version": "1.0" } });
    assert!(matches!(build(v1), Err(Error::UnsupportedVersion(v)) if v == "1.0"));

    let newer_min = json!({ "asset": { "version": "2.0", "minVersion": "2.1" } });
    assert!(matches!(build(newer_min), Err(Error::UnsupportedVersion(_))));

    let v2 = json!({ "asset": { "version": "2.0", "minVersion": "2.0" } });
    assert!(build(v2).is_ok());
}

#[test]
fn test_required_extensions_checked() {
    let doc = json!({
        "asset": { "version": "2.0" },
        "extensionsUsed": ["X_unregistered"],
        "extensionsRequired": ["X_unregistered"]
    });
    assert!(matches!(build(doc), Err(Error::UnsupportedExtension(n)) if n == "X_unregistered"));

    let used_only = json!({
        "asset": { "version": "2.0" },
        "extensionsUsed": ["X_unregistered"],
        "nodes": [{ "extensions": { "X_unregistered": { "flag": true } } }]
    });
    let gltf = build(used_only).unwrap();
    let ext = &gltf.nodes[0].base().extensions;
    assert_eq!(ext.opaque("X_unregistered"), Some(&json!({ "flag": true })));
    assert!(ext.record("X_unregistered").is_none());

    let compressed = json!({
        "asset": { "version": "2.0" },
        "extensionsRequired": ["KHR_draco_mesh_compression"]
    });
    assert!(build(compressed).is_ok());
}

#[test]
fn test_leaf_collections_keep_properties() {
    let doc = json!({
        "asset": { "version": "2.0" },
        "materials": [{ "name": "steel", "pbrMetallicRoughness": { "metallicFactor": 1.0 } }],
        "cameras": [{ "type": "perspective", "perspective": { "yfov": 0.8, "znear": 0.1 } }],
        "nodes": [{ "camera": 0 }]
    });
    let gltf = build(doc).unwrap();
    assert_eq!(gltf.materials[0].kind(), RecordKind::Material);
    assert_eq!(gltf.materials[0].base().name.as_deref(), Some("steel"));
    assert_eq!(gltf.materials[0].get("pbrMetallicRoughness").unwrap()["metallicFactor"], 1.0);
    let camera = gltf.nodes[0].camera.get().unwrap();
    assert!(Arc::ptr_eq(&camera, &gltf.cameras[0]));
}

#[test]
fn test_glb_container_binds_binary_chunk() {
    let bin = triangle_bin();
    let glb = Container::encode(&triangle_document(None), Some(&bin)).unwrap();
    let gltf = Gltf::from_slice(&glb, "tri.glb", &ExtensionRegistry::with_builtin()).unwrap();

    assert!(gltf.buffers[0].is_loaded());
    assert_eq!(gltf.buffers[0].bytes().unwrap(), bin.as_slice());
    let positions = gltf.accessors[0].typed_array().unwrap();
    assert_eq!(positions.as_f32().unwrap(), &TRIANGLE_POSITIONS);
}

#[test]
fn test_glb_unaligned_payload_round_trip() {
    let payload = [1u8, 2, 3, 4, 5];
    let doc = json!({
        "asset": { "version": "2.0" },
        "buffers": [{ "byteLength": payload.len() }]
    });
    let glb = Container::encode(&doc, Some(&payload)).unwrap();
    assert_eq!(glb.len() % 4, 0);

    let gltf = Gltf::from_slice(&glb, "five.glb", &ExtensionRegistry::with_builtin()).unwrap();
    assert_eq!(gltf.buffers[0].bytes().unwrap(), &payload);
}

#[test]
fn test_glb_chunk_with_uri_buffer_rejected() {
    let bin = triangle_bin();
    let glb = Container::encode(&triangle_document(Some("tri.bin")), Some(&bin)).unwrap();
    let err = Gltf::from_slice(&glb, "tri.glb", &ExtensionRegistry::with_builtin()).unwrap_err();
    assert!(matches!(err, Error::Format(_)));
}

#[test]
fn test_node_transform() {
    let gltf = build(triangle_document(Some("tri.bin"))).unwrap();
    let m = gltf.nodes[0].local_transform();
    assert_eq!(m.w_axis.truncate().to_array(), [1.0, 2.0, 3.0]);
}
