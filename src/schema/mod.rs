//! Typed schema records.
//!
//! Records that carry binary data (buffers, views, accessors, images) or
//! structure the scene (meshes, primitives, nodes, scenes) are fully typed.
//! The remaining kinds keep their JSON body verbatim in a [`LeafRecord`].

/// The `kind`, `base`, `base_mut` and `as_any` methods of [`Record`].
macro_rules! record_common {
    ($kind:expr) => {
        fn kind(&self) -> $crate::graph::RecordKind {
            $kind
        }

        fn base(&self) -> &$crate::graph::RecordBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut $crate::graph::RecordBase {
            &mut self.base
        }

        fn as_any(&self) -> &dyn ::std::any::Any {
            self
        }
    };
}

pub(crate) use record_common;

mod accessor;
mod asset;
mod buffer;
mod image;
mod leaf;
mod mesh;
mod node;

pub use accessor::{Accessor, Sparse, SparseIndices, SparseValues};
pub use asset::Asset;
pub use buffer::{Buffer, BufferView, ByteRegion};
pub use image::Image;
pub use leaf::LeafRecord;
pub use mesh::{Mesh, Primitive};
pub use node::{Node, Scene};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::graph::{Record, RecordContext};
use crate::util::{Error, Result};

/// Deserialize a record from its JSON body and hydrate it.
///
/// `path` labels errors, e.g. `accessors[3]`.
pub(crate) fn build<T>(value: Value, path: &str, cx: &RecordContext<'_>) -> Result<T>
where
    T: Record + DeserializeOwned,
{
    let mut record: T = serde_json::from_value(value).map_err(|e| Error::schema(path, e))?;
    record.hydrate(cx)?;
    Ok(record)
}

/// `glTF` default primitive mode (triangles).
pub(crate) const fn default_mode() -> u32 {
    4
}
