//! Meshes and primitives.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::Deserialize;

use super::{default_mode, record_common, Accessor, LeafRecord};
use crate::graph::{
    load_extensions, Collection, DynLink, FieldSlot, Link, Record, RecordBase, RecordContext,
    RecordKind, ReferenceField,
};
use crate::load::{join_all, LoadCell, LoadContext, LoadUnit};
use crate::util::Result;

/// A set of primitives rendered together.
#[derive(Debug, Deserialize)]
pub struct Mesh {
    pub primitives: Vec<Primitive>,
    #[serde(default)]
    pub weights: Option<Vec<f32>>,
    #[serde(flatten)]
    base: RecordBase,
    #[serde(skip)]
    cell: LoadCell,
}

const MESH_FIELDS: &[ReferenceField] = &[ReferenceField::embedded_array("primitives")];

impl Mesh {
    async fn load_primitives(&self, cx: &LoadContext) -> Result<()> {
        join_all(self.primitives.iter().map(|p| p.load(cx))).await?;
        load_extensions(self, cx).await
    }
}

#[async_trait]
impl Record for Mesh {
    record_common!(RecordKind::Mesh);

    fn reference_fields(&self) -> &'static [ReferenceField] {
        MESH_FIELDS
    }

    fn field(&self, name: &str) -> Option<FieldSlot<'_>> {
        match name {
            "primitives" => Some(FieldSlot::EmbeddedArray(
                self.primitives.iter().map(|p| p as &dyn Record).collect(),
            )),
            _ => None,
        }
    }

    fn hydrate(&mut self, cx: &RecordContext<'_>) -> Result<()> {
        self.base.attach(RecordKind::Mesh, cx)?;
        for primitive in &mut self.primitives {
            primitive.hydrate(cx)?;
        }
        Ok(())
    }

    async fn load(&self, cx: &LoadContext) -> Result<()> {
        self.cell.run(self.load_primitives(cx)).await
    }
}

type AttributeMap = BTreeMap<String, Link<Accessor>>;

/// Geometry to be rendered with one material.
#[derive(Debug, Deserialize)]
pub struct Primitive {
    pub attributes: AttributeMap,
    #[serde(default)]
    pub indices: Link<Accessor>,
    #[serde(default)]
    pub material: Link<LeafRecord>,
    #[serde(default = "default_mode")]
    pub mode: u32,
    #[serde(default)]
    pub targets: Option<Vec<AttributeMap>>,
    #[serde(flatten)]
    base: RecordBase,
    #[serde(skip)]
    cell: LoadCell,
}

const PRIMITIVE_FIELDS: &[ReferenceField] = &[
    ReferenceField::index_map("attributes", Collection::Accessors),
    ReferenceField::index("indices", Collection::Accessors),
    ReferenceField::index("material", Collection::Materials),
    ReferenceField::index_map("targets", Collection::Accessors),
];

impl Primitive {
    /// Accessor bound to attribute `semantic`, e.g. `POSITION`.
    pub fn attribute(&self, semantic: &str) -> Option<Arc<Accessor>> {
        self.attributes.get(semantic)?.get()
    }

    /// The index accessor, if the primitive is indexed.
    pub fn index_accessor(&self) -> Option<Arc<Accessor>> {
        self.indices.get()
    }

    /// Every accessor referenced by attributes, indices and morph targets.
    pub fn accessors(&self) -> Vec<Arc<Accessor>> {
        let targets = self.targets.iter().flatten().flat_map(|t| t.values());
        self.attributes
            .values()
            .chain(std::iter::once(&self.indices))
            .chain(targets)
            .filter_map(Link::get)
            .collect()
    }

    async fn load_accessors(&self, cx: &LoadContext) -> Result<()> {
        let units: Vec<LoadUnit<'_>> = self
            .accessors()
            .into_iter()
            .map(|accessor| async move { accessor.load(cx).await }.boxed())
            .collect();
        join_all(units).await?;
        load_extensions(self, cx).await
    }
}

#[async_trait]
impl Record for Primitive {
    record_common!(RecordKind::Primitive);

    fn reference_fields(&self) -> &'static [ReferenceField] {
        PRIMITIVE_FIELDS
    }

    fn field(&self, name: &str) -> Option<FieldSlot<'_>> {
        let slot = match name {
            "attributes" => FieldSlot::Indices(
                self.attributes.values().map(|l| l as &dyn DynLink).collect(),
            ),
            "indices" => FieldSlot::Index(&self.indices),
            "material" => FieldSlot::Index(&self.material),
            "targets" => match &self.targets {
                Some(targets) => FieldSlot::Indices(
                    targets
                        .iter()
                        .flat_map(|t| t.values())
                        .map(|l| l as &dyn DynLink)
                        .collect(),
                ),
                None => FieldSlot::Absent,
            },
            _ => return None,
        };
        Some(slot)
    }

    async fn load(&self, cx: &LoadContext) -> Result<()> {
        self.cell.run(self.load_accessors(cx)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_defaults() {
        let p: Primitive = serde_json::from_str(r#"{"attributes": {"POSITION": 0}}"#).unwrap();
        assert_eq!(p.mode, 4);
        assert!(!p.indices.is_set());
        assert!(p.targets.is_none());
        assert!(matches!(p.field("targets"), Some(FieldSlot::Absent)));
        assert!(p.field("nope").is_none());
    }

    #[test]
    fn test_targets_flatten_into_one_slot() {
        let p: Primitive = serde_json::from_str(
            r#"{"attributes": {"POSITION": 0},
                "targets": [{"POSITION": 1, "NORMAL": 2}, {"POSITION": 3}]}"#,
        )
        .unwrap();
        match p.field("targets") {
            Some(FieldSlot::Indices(links)) => {
                let mut idx: Vec<_> = links.iter().filter_map(|l| l.index()).collect();
                idx.sort();
                assert_eq!(idx, vec![1, 2, 3]);
            }
            other => panic!("unexpected slot: {}", other.is_some()),
        }
    }

    #[test]
    fn test_mesh_requires_primitives() {
        assert!(serde_json::from_str::<Mesh>(r#"{"name": "m"}"#).is_err());
        let m: Mesh = serde_json::from_str(r#"{"name": "m", "primitives": []}"#).unwrap();
        assert_eq!(m.base().name.as_deref(), Some("m"));
    }
}
