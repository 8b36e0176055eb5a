//! The record abstraction shared by every schema entity.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::extensions::Extensions;
use super::link::DynLink;
use crate::load::LoadContext;
use crate::registry::ExtensionRegistry;
use crate::util::Result;

/// Kind of a record, used to key extension factories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    Root,
    Accessor,
    Sparse,
    SparseIndices,
    SparseValues,
    Animation,
    Buffer,
    BufferView,
    Camera,
    Image,
    Material,
    Mesh,
    Primitive,
    Node,
    Sampler,
    Scene,
    Skin,
    Texture,
    /// A record contributed by a registered extension.
    Extension(&'static str),
}

impl RecordKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Root => "glTF",
            Self::Accessor => "Accessor",
            Self::Sparse => "AccessorSparse",
            Self::SparseIndices => "AccessorSparseIndices",
            Self::SparseValues => "AccessorSparseValues",
            Self::Animation => "Animation",
            Self::Buffer => "Buffer",
            Self::BufferView => "BufferView",
            Self::Camera => "Camera",
            Self::Image => "Image",
            Self::Material => "Material",
            Self::Mesh => "Mesh",
            Self::Primitive => "Primitive",
            Self::Node => "Node",
            Self::Sampler => "Sampler",
            Self::Scene => "Scene",
            Self::Skin => "Skin",
            Self::Texture => "Texture",
            Self::Extension(name) => name,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Top-level collections of the schema document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Accessors,
    Animations,
    Buffers,
    BufferViews,
    Cameras,
    Images,
    Materials,
    Meshes,
    Nodes,
    Samplers,
    Scenes,
    Skins,
    Textures,
}

impl Collection {
    pub const ALL: [Collection; 13] = [
        Self::Accessors,
        Self::Animations,
        Self::Buffers,
        Self::BufferViews,
        Self::Cameras,
        Self::Images,
        Self::Materials,
        Self::Meshes,
        Self::Nodes,
        Self::Samplers,
        Self::Scenes,
        Self::Skins,
        Self::Textures,
    ];

    /// Key of the collection in the schema document.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Accessors => "accessors",
            Self::Animations => "animations",
            Self::Buffers => "buffers",
            Self::BufferViews => "bufferViews",
            Self::Cameras => "cameras",
            Self::Images => "images",
            Self::Materials => "materials",
            Self::Meshes => "meshes",
            Self::Nodes => "nodes",
            Self::Samplers => "samplers",
            Self::Scenes => "scenes",
            Self::Skins => "skins",
            Self::Textures => "textures",
        }
    }

    /// Kind of the records held by the collection.
    pub const fn kind(self) -> RecordKind {
        match self {
            Self::Accessors => RecordKind::Accessor,
            Self::Animations => RecordKind::Animation,
            Self::Buffers => RecordKind::Buffer,
            Self::BufferViews => RecordKind::BufferView,
            Self::Cameras => RecordKind::Camera,
            Self::Images => RecordKind::Image,
            Self::Materials => RecordKind::Material,
            Self::Meshes => RecordKind::Mesh,
            Self::Nodes => RecordKind::Node,
            Self::Samplers => RecordKind::Sampler,
            Self::Scenes => RecordKind::Scene,
            Self::Skins => RecordKind::Skin,
            Self::Textures => RecordKind::Texture,
        }
    }
}

/// How a reference field is stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// One index into a collection.
    Index,
    /// An ordered array of indices.
    IndexArray,
    /// A map (or array of maps) from names to indices.
    IndexMap,
    /// A nested record with its own reference fields.
    Embedded,
    /// An array of nested records.
    EmbeddedArray,
}

/// Static description of one reference field of a record kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReferenceField {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Target collection for index kinds; `None` for embedded kinds.
    pub collection: Option<Collection>,
}

impl ReferenceField {
    pub const fn index(name: &'static str, collection: Collection) -> Self {
        Self { name, kind: FieldKind::Index, collection: Some(collection) }
    }

    pub const fn index_array(name: &'static str, collection: Collection) -> Self {
        Self { name, kind: FieldKind::IndexArray, collection: Some(collection) }
    }

    pub const fn index_map(name: &'static str, collection: Collection) -> Self {
        Self { name, kind: FieldKind::IndexMap, collection: Some(collection) }
    }

    pub const fn embedded(name: &'static str) -> Self {
        Self { name, kind: FieldKind::Embedded, collection: None }
    }

    pub const fn embedded_array(name: &'static str) -> Self {
        Self { name, kind: FieldKind::EmbeddedArray, collection: None }
    }
}

/// Live access to the storage behind a [`ReferenceField`].
pub enum FieldSlot<'a> {
    Index(&'a dyn DynLink),
    /// Elements of an index array, or the values of an index map.
    Indices(Vec<&'a dyn DynLink>),
    Embedded(&'a dyn Record),
    EmbeddedArray(Vec<&'a dyn Record>),
    /// Optional field not present in the document.
    Absent,
}

/// Construction-time context: where the document came from and which
/// extensions can be hydrated.
#[derive(Clone, Copy)]
pub struct RecordContext<'a> {
    pub source: &'a Arc<str>,
    pub registry: &'a ExtensionRegistry,
}

/// Fields every record carries.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RecordBase {
    pub name: Option<String>,
    pub extensions: Extensions,
    pub extras: Option<Value>,
    #[serde(skip)]
    source: Option<Arc<str>>,
}

impl RecordBase {
    /// URI of the document this record was read from.
    pub fn source(&self) -> &str {
        self.source.as_deref().unwrap_or("")
    }

    /// Record the source URI and hydrate registered extensions.
    pub fn attach(&mut self, owner: RecordKind, cx: &RecordContext<'_>) -> Result<()> {
        self.source = Some(Arc::clone(cx.source));
        self.extensions.hydrate(owner, cx)
    }
}

/// A schema record.
///
/// Reference resolution is driven entirely by [`Record::reference_fields`] and
/// [`Record::field`]; loading by [`Record::load`].
#[async_trait]
pub trait Record: Any + Send + Sync + fmt::Debug {
    fn kind(&self) -> RecordKind;

    fn base(&self) -> &RecordBase;

    fn base_mut(&mut self) -> &mut RecordBase;

    fn as_any(&self) -> &dyn Any;

    /// Declared reference fields of this kind.
    fn reference_fields(&self) -> &'static [ReferenceField] {
        &[]
    }

    /// Storage for the declared field `name`.
    fn field(&self, _name: &str) -> Option<FieldSlot<'_>> {
        None
    }

    /// Finish construction: source URI, extensions, nested records.
    fn hydrate(&mut self, cx: &RecordContext<'_>) -> Result<()> {
        let kind = self.kind();
        self.base_mut().attach(kind, cx)
    }

    /// Load this record's payloads and those of the records it depends on.
    async fn load(&self, cx: &LoadContext) -> Result<()>;

    /// Called when this record is an extension attached to `owner` and the
    /// owner loads.
    async fn load_attached(&self, _owner: &dyn Record, cx: &LoadContext) -> Result<()> {
        self.load(cx).await
    }
}
