//! Nodes and scenes.

use async_trait::async_trait;
use futures::FutureExt;
use glam::{Mat4, Quat, Vec3};
use serde::Deserialize;

use super::{record_common, LeafRecord, Mesh};
use crate::graph::{
    load_extensions, Collection, DynLink, FieldSlot, Link, Record, RecordBase, RecordKind,
    ReferenceField,
};
use crate::load::{join_all, LoadCell, LoadContext, LoadUnit};
use crate::util::Result;

/// A node in the scene hierarchy.
#[derive(Debug, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub children: Option<Vec<Link<Node>>>,
    #[serde(default)]
    pub mesh: Link<Mesh>,
    #[serde(default)]
    pub camera: Link<LeafRecord>,
    #[serde(default)]
    pub skin: Link<LeafRecord>,
    #[serde(default)]
    pub matrix: Option<[f32; 16]>,
    #[serde(default)]
    pub translation: Option<[f32; 3]>,
    #[serde(default)]
    pub rotation: Option<[f32; 4]>,
    #[serde(default)]
    pub scale: Option<[f32; 3]>,
    #[serde(default)]
    pub weights: Option<Vec<f32>>,
    #[serde(flatten)]
    base: RecordBase,
    #[serde(skip)]
    cell: LoadCell,
}

const NODE_FIELDS: &[ReferenceField] = &[
    ReferenceField::index_array("children", Collection::Nodes),
    ReferenceField::index("mesh", Collection::Meshes),
    ReferenceField::index("camera", Collection::Cameras),
    ReferenceField::index("skin", Collection::Skins),
];

impl Node {
    /// Local transform: `matrix` (column-major) if present, else T * R * S.
    pub fn local_transform(&self) -> Mat4 {
        if let Some(m) = &self.matrix {
            return Mat4::from_cols_array(m);
        }
        let t = self.translation.map(Vec3::from_array).unwrap_or(Vec3::ZERO);
        let r = self.rotation.map(Quat::from_array).unwrap_or(Quat::IDENTITY);
        let s = self.scale.map(Vec3::from_array).unwrap_or(Vec3::ONE);
        Mat4::from_scale_rotation_translation(s, r, t)
    }

    /// Child indices as found in the document.
    pub fn child_indices(&self) -> impl Iterator<Item = i64> + '_ {
        self.children.iter().flatten().filter_map(Link::index)
    }

    async fn load_subtree(&self, cx: &LoadContext) -> Result<()> {
        let mut units: Vec<LoadUnit<'_>> = Vec::new();
        if let Some(mesh) = self.mesh.resolve("mesh")? {
            units.push(async move { mesh.load(cx).await }.boxed());
        }
        for (i, child) in self.children.iter().flatten().enumerate() {
            let child = child.require(&format!("children[{}]", i))?;
            units.push(async move { child.load(cx).await }.boxed());
        }
        join_all(units).await?;
        load_extensions(self, cx).await
    }
}

#[async_trait]
impl Record for Node {
    record_common!(RecordKind::Node);

    fn reference_fields(&self) -> &'static [ReferenceField] {
        NODE_FIELDS
    }

    fn field(&self, name: &str) -> Option<FieldSlot<'_>> {
        let slot = match name {
            "children" => match &self.children {
                Some(children) => {
                    FieldSlot::Indices(children.iter().map(|l| l as &dyn DynLink).collect())
                }
                None => FieldSlot::Absent,
            },
            "mesh" => FieldSlot::Index(&self.mesh),
            "camera" => FieldSlot::Index(&self.camera),
            "skin" => FieldSlot::Index(&self.skin),
            _ => return None,
        };
        Some(slot)
    }

    async fn load(&self, cx: &LoadContext) -> Result<()> {
        self.cell.run(self.load_subtree(cx)).await
    }
}

/// The root nodes of one scene.
#[derive(Debug, Deserialize)]
pub struct Scene {
    #[serde(default)]
    pub nodes: Option<Vec<Link<Node>>>,
    #[serde(flatten)]
    base: RecordBase,
    #[serde(skip)]
    cell: LoadCell,
}

const SCENE_FIELDS: &[ReferenceField] = &[ReferenceField::index_array("nodes", Collection::Nodes)];

impl Scene {
    async fn load_nodes(&self, cx: &LoadContext) -> Result<()> {
        let mut units: Vec<LoadUnit<'_>> = Vec::new();
        for (i, node) in self.nodes.iter().flatten().enumerate() {
            let node = node.require(&format!("nodes[{}]", i))?;
            units.push(async move { node.load(cx).await }.boxed());
        }
        join_all(units).await?;
        load_extensions(self, cx).await
    }
}

#[async_trait]
impl Record for Scene {
    record_common!(RecordKind::Scene);

    fn reference_fields(&self) -> &'static [ReferenceField] {
        SCENE_FIELDS
    }

    fn field(&self, name: &str) -> Option<FieldSlot<'_>> {
        match name {
            "nodes" => Some(match &self.nodes {
                Some(nodes) => FieldSlot::Indices(nodes.iter().map(|l| l as &dyn DynLink).collect()),
                None => FieldSlot::Absent,
            }),
            _ => None,
        }
    }

    async fn load(&self, cx: &LoadContext) -> Result<()> {
        self.cell.run(self.load_nodes(cx)).await
    }
}
