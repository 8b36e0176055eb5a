//! # gltf-graph
//!
//! Loader for glTF 2.0 assets as an in-memory object graph.
//!
//! Indices in the JSON document are replaced by direct links between typed
//! records, external resources are fetched asynchronously with single-flight
//! deduplication and cooperative cancellation, accessor data is exposed as
//! typed arrays, and compressed primitives are decoded on a pool of
//! background threads.
//!
//! ## Modules
//!
//! - [`container`] - Binary `.glb` container
//! - [`graph`] - Record model, links and dereferencing
//! - [`schema`] - Typed records for the core glTF collections
//! - [`registry`] - Extension factories keyed by name and record kind
//! - [`load`] - Load cells, cancellation and byte transport
//! - [`access`] - Typed arrays, strided views and sparse substitution
//! - [`decode`] - Background mesh decoding
//! - [`config`] - Loader and pool settings
//!
//! ## Example
//!
//! ```ignore
//! use gltf_graph::prelude::*;
//!
//! let loader = GltfLoader::new(LoaderConfig::default());
//! if let LoadOutcome::Loaded(gltf) = loader.open("box.glb", &CancellationToken::new()).await? {
//!     let positions = gltf.accessors[0].typed_array()?;
//!     println!("{} floats", positions.len());
//! }
//! ```

pub mod access;
pub mod config;
pub mod container;
pub mod decode;
pub mod gltf;
pub mod graph;
pub mod load;
pub mod loader;
pub mod registry;
pub mod schema;
pub mod util;

pub use gltf::Gltf;
pub use loader::GltfLoader;
pub use util::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::access::TypedArray;
    pub use crate::config::{LoaderConfig, PoolConfig, TransferMode};
    pub use crate::gltf::Gltf;
    pub use crate::graph::{Link, Record, RecordKind};
    pub use crate::load::{CancellationToken, LoadContext, LoadOutcome};
    pub use crate::loader::GltfLoader;
    pub use crate::registry::ExtensionRegistry;
    pub use crate::schema::*;
    pub use crate::util::{AccessorType, ComponentType, Error, Result};
}
