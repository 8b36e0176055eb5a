//! Mesh-compression extension attached to primitives.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::pool::DecodeJob;
use super::protocol::{AttributeRequest, IndicesRequest};
use crate::graph::{
    load_extensions, Collection, FieldSlot, Link, Record, RecordBase, RecordKind, ReferenceField,
};
use crate::load::{LoadCell, LoadContext};
use crate::registry::{ExtensionRegistry, ExtensionSchema};
use crate::schema::{build, record_common, Accessor, BufferView, Primitive};
use crate::util::{Error, Result};

/// Wire name of the mesh-compression extension.
pub const MESH_COMPRESSION: &str = "KHR_draco_mesh_compression";

/// Compressed geometry for the owning primitive.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshCompression {
    pub buffer_view: Link<BufferView>,
    /// Attribute semantic to id inside the compressed payload.
    pub attributes: BTreeMap<String, u32>,
    #[serde(flatten)]
    base: RecordBase,
    #[serde(skip)]
    cell: LoadCell,
}

const MESH_COMPRESSION_FIELDS: &[ReferenceField] =
    &[ReferenceField::index("bufferView", Collection::BufferViews)];

impl MeshCompression {
    /// Decode into the primitive's accessors.
    async fn decode(&self, primitive: &Primitive, cx: &LoadContext) -> Result<()> {
        let view = self.buffer_view.require("bufferView")?;
        view.load(cx).await?;
        let region = view.region()?;

        let mut targets: Vec<Arc<Accessor>> = Vec::with_capacity(self.attributes.len());
        let mut attributes = Vec::with_capacity(self.attributes.len());
        for (semantic, &unique_id) in &self.attributes {
            let accessor = primitive.attribute(semantic).ok_or_else(|| {
                Error::invalid(format!(
                    "{} names attribute {} missing from the primitive",
                    MESH_COMPRESSION, semantic
                ))
            })?;
            attributes.push(AttributeRequest {
                semantic: semantic.clone(),
                unique_id,
                component_type: accessor.component_type,
                components: accessor.accessor_type.num_components(),
                count: accessor.count,
            });
            targets.push(accessor);
        }
        let index_accessor = primitive.index_accessor();
        let indices = match &index_accessor {
            Some(a) if !a.component_type.is_index_type() => {
                return Err(Error::invalid(format!(
                    "index accessor of type {}",
                    a.component_type
                )))
            }
            Some(a) => Some(IndicesRequest {
                component_type: a.component_type,
                count: a.count,
            }),
            None => None,
        };

        let job = DecodeJob {
            buffer: Arc::clone(region.buffer()),
            byte_offset: region.offset(),
            byte_length: region.len(),
            attributes,
            indices,
        };
        tracing::trace!(
            attributes = job.attributes.len(),
            bytes = job.byte_length,
            "decoding compressed primitive"
        );
        let decoded = cx.pool()?.decode(job, cx.token()).await?;

        for (accessor, array) in targets.iter().zip(decoded.attributes) {
            accessor.set_decoded(array)?;
        }
        if let (Some(accessor), Some(array)) = (index_accessor, decoded.indices) {
            accessor.set_decoded(array)?;
        }
        load_extensions(self, cx).await
    }
}

#[async_trait]
impl Record for MeshCompression {
    record_common!(RecordKind::Extension(MESH_COMPRESSION));

    fn reference_fields(&self) -> &'static [ReferenceField] {
        MESH_COMPRESSION_FIELDS
    }

    fn field(&self, name: &str) -> Option<FieldSlot<'_>> {
        match name {
            "bufferView" => Some(FieldSlot::Index(&self.buffer_view)),
            _ => None,
        }
    }

    /// Standalone load only fetches the compressed bytes.
    async fn load(&self, cx: &LoadContext) -> Result<()> {
        self.buffer_view.require("bufferView")?.load(cx).await
    }

    async fn load_attached(&self, owner: &dyn Record, cx: &LoadContext) -> Result<()> {
        let primitive = owner.as_any().downcast_ref::<Primitive>().ok_or_else(|| {
            Error::invalid(format!("{} attached to a {}", MESH_COMPRESSION, owner.kind()))
        })?;
        self.cell.run(self.decode(primitive, cx)).await
    }
}

/// Register the extension on `registry`.
pub fn register(registry: &ExtensionRegistry) {
    registry.add(
        MESH_COMPRESSION,
        ExtensionSchema::new().with(RecordKind::Primitive, |value, cx| {
            let record: MeshCompression = build(value, MESH_COMPRESSION, cx)?;
            Ok(Arc::new(record) as Arc<dyn Record>)
        }),
    );
}
