//! The root of a loaded asset.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::container::{has_magic, Container};
use crate::graph::{
    dereference, load_extensions, AnyRecord, Collection, FieldSlot, Link, Record, RecordBase,
    RecordContext, RecordKind, RecordStore, ReferenceField,
};
use crate::load::{join_all, LoadCell, LoadContext, LoadOutcome, LoadUnit};
use crate::registry::ExtensionRegistry;
use crate::schema::{
    self, Accessor, Asset, Buffer, BufferView, Image, LeafRecord, Mesh, Node, Scene,
};
use crate::util::{Error, Result};

/// A dereferenced asset graph.
///
/// Owns every collection. Links between records are non-owning, so handles
/// obtained from them stay valid only while the `Gltf` is alive.
pub struct Gltf {
    pub asset: Asset,
    pub extensions_used: Vec<String>,
    pub extensions_required: Vec<String>,
    pub scene: Link<Scene>,
    pub accessors: Vec<Arc<Accessor>>,
    pub animations: Vec<Arc<LeafRecord>>,
    pub buffers: Vec<Arc<Buffer>>,
    pub buffer_views: Vec<Arc<BufferView>>,
    pub cameras: Vec<Arc<LeafRecord>>,
    pub images: Vec<Arc<Image>>,
    pub materials: Vec<Arc<LeafRecord>>,
    pub meshes: Vec<Arc<Mesh>>,
    pub nodes: Vec<Arc<Node>>,
    pub samplers: Vec<Arc<LeafRecord>>,
    pub scenes: Vec<Arc<Scene>>,
    pub skins: Vec<Arc<LeafRecord>>,
    pub textures: Vec<Arc<LeafRecord>>,
    base: RecordBase,
    source: Arc<str>,
    cell: LoadCell,
}

const ROOT_FIELDS: &[ReferenceField] = &[ReferenceField::index("scene", Collection::Scenes)];

impl Gltf {
    /// Build from a `.gltf` document or a `.glb` container.
    pub fn from_slice(data: &[u8], uri: &str, registry: &ExtensionRegistry) -> Result<Self> {
        if has_magic(data) {
            let (document, bin) = Container::parse(data)?.into_parts()?;
            Self::from_document(document, uri, registry, bin)
        } else {
            Self::from_document(serde_json::from_slice(data)?, uri, registry, None)
        }
    }

    /// Build from a parsed document.
    ///
    /// Checks the version and required extensions, constructs every
    /// collection, binds `bin` to buffer 0 and dereferences the graph.
    pub fn from_document(
        document: Value,
        uri: &str,
        registry: &ExtensionRegistry,
        bin: Option<Vec<u8>>,
    ) -> Result<Self> {
        let Value::Object(mut map) = document else {
            return Err(Error::schema("glTF", "document is not an object"));
        };

        let asset: Asset = take(&mut map, "asset")?
            .ok_or_else(|| Error::schema("asset", "missing"))?;
        asset.check_version()?;

        let extensions_used: Vec<String> = take(&mut map, "extensionsUsed")?.unwrap_or_default();
        let extensions_required: Vec<String> =
            take(&mut map, "extensionsRequired")?.unwrap_or_default();
        if let Some(name) = extensions_required.iter().find(|n| !registry.is_supported(n)) {
            return Err(Error::UnsupportedExtension(name.clone()));
        }

        let source: Arc<str> = Arc::from(uri);
        let cx = RecordContext {
            source: &source,
            registry,
        };
        let scene: Link<Scene> = take(&mut map, "scene")?.unwrap_or_default();

        let gltf = Self {
            accessors: typed(&mut map, Collection::Accessors, &cx)?,
            animations: leaves(&mut map, Collection::Animations, &cx)?,
            buffers: typed(&mut map, Collection::Buffers, &cx)?,
            buffer_views: typed(&mut map, Collection::BufferViews, &cx)?,
            cameras: leaves(&mut map, Collection::Cameras, &cx)?,
            images: typed(&mut map, Collection::Images, &cx)?,
            materials: leaves(&mut map, Collection::Materials, &cx)?,
            meshes: typed(&mut map, Collection::Meshes, &cx)?,
            nodes: typed(&mut map, Collection::Nodes, &cx)?,
            samplers: leaves(&mut map, Collection::Samplers, &cx)?,
            scenes: typed(&mut map, Collection::Scenes, &cx)?,
            skins: leaves(&mut map, Collection::Skins, &cx)?,
            textures: leaves(&mut map, Collection::Textures, &cx)?,
            base: root_base(map, &cx)?,
            asset,
            extensions_used,
            extensions_required,
            scene,
            source: Arc::clone(&source),
            cell: LoadCell::new(),
        };

        if let Some(bin) = bin {
            match gltf.buffers.first() {
                Some(buffer) => buffer.bind_binary_chunk(Arc::from(bin))?,
                None => tracing::debug!(len = bin.len(), "binary chunk without buffers, ignored"),
            }
        }

        dereference(&gltf)?;
        gltf.check_node_hierarchy()?;
        tracing::debug!(
            uri,
            accessors = gltf.accessors.len(),
            buffers = gltf.buffers.len(),
            meshes = gltf.meshes.len(),
            nodes = gltf.nodes.len(),
            "built glTF graph"
        );
        Ok(gltf)
    }

    /// Load every record of the graph.
    ///
    /// Cancellation through the context's token settles as
    /// [`LoadOutcome::Cancelled`]; calling again with a fresh token retries
    /// only what did not finish.
    pub async fn load(&self, cx: &LoadContext) -> Result<LoadOutcome> {
        LoadOutcome::from_result(Record::load(self, cx).await)
    }

    /// URI the document was read from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The scene named by `scene`, if any.
    pub fn default_scene(&self) -> Option<Arc<Scene>> {
        self.scene.get()
    }

    /// True once a full load has completed.
    pub fn is_loaded(&self) -> bool {
        self.cell.is_loaded()
    }

    /// Node hierarchies must be trees; a cycle would make loads wait on
    /// themselves.
    fn check_node_hierarchy(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Open,
            Done,
        }
        let mut marks = vec![Mark::New; self.nodes.len()];
        for root in 0..self.nodes.len() {
            if marks[root] != Mark::New {
                continue;
            }
            let mut stack = vec![(root, false)];
            while let Some((i, leaving)) = stack.pop() {
                if leaving {
                    marks[i] = Mark::Done;
                    continue;
                }
                marks[i] = Mark::Open;
                stack.push((i, true));
                for child in self.nodes[i].child_indices() {
                    let c = child as usize;
                    match marks[c] {
                        Mark::Open => {
                            return Err(Error::invalid(format!(
                                "node hierarchy has a cycle through nodes[{}]",
                                c
                            )))
                        }
                        Mark::New => stack.push((c, false)),
                        Mark::Done => {}
                    }
                }
            }
        }
        Ok(())
    }

    async fn load_all(&self, cx: &LoadContext) -> Result<()> {
        let units: Vec<LoadUnit<'_>> = Collection::ALL
            .iter()
            .flat_map(|&c| self.records(c))
            .map(|record| record.load(cx))
            .collect();
        tracing::trace!(records = units.len(), "loading graph");
        join_all(units).await?;
        load_extensions(self, cx).await
    }
}

/// Remove `key` from `map` and deserialize it.
fn take<T: DeserializeOwned>(map: &mut Map<String, Value>, key: &str) -> Result<Option<T>> {
    match map.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => serde_json::from_value(v)
            .map(Some)
            .map_err(|e| Error::schema(key, e)),
    }
}

fn elements(map: &mut Map<String, Value>, collection: Collection) -> Result<Vec<Value>> {
    let name = collection.name();
    take::<Vec<Value>>(map, name).map(Option::unwrap_or_default)
}

fn typed<T>(
    map: &mut Map<String, Value>,
    collection: Collection,
    cx: &RecordContext<'_>,
) -> Result<Vec<Arc<T>>>
where
    T: Record + DeserializeOwned,
{
    elements(map, collection)?
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            let path = format!("{}[{}]", collection.name(), i);
            schema::build::<T>(v, &path, cx).map(Arc::new)
        })
        .collect()
}

fn leaves(
    map: &mut Map<String, Value>,
    collection: Collection,
    cx: &RecordContext<'_>,
) -> Result<Vec<Arc<LeafRecord>>> {
    elements(map, collection)?
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            let path = format!("{}[{}]", collection.name(), i);
            LeafRecord::from_value(collection.kind(), v, &path, cx).map(Arc::new)
        })
        .collect()
}

fn root_base(map: Map<String, Value>, cx: &RecordContext<'_>) -> Result<RecordBase> {
    let mut base =
        RecordBase::deserialize(&Value::Object(map)).map_err(|e| Error::schema("glTF", e))?;
    base.attach(RecordKind::Root, cx)?;
    Ok(base)
}

fn as_records<T: Record>(records: &[Arc<T>]) -> Vec<&dyn Record> {
    records.iter().map(|r| r.as_ref() as &dyn Record).collect()
}

fn any_record<T: Record>(records: &[Arc<T>], index: usize) -> Option<AnyRecord> {
    records.get(index).map(|r| Arc::clone(r) as AnyRecord)
}

impl RecordStore for Gltf {
    fn root_record(&self) -> &dyn Record {
        self
    }

    fn collection_len(&self, collection: Collection) -> usize {
        self.records(collection).len()
    }

    fn lookup(&self, collection: Collection, index: usize) -> Option<AnyRecord> {
        match collection {
            Collection::Accessors => any_record(&self.accessors, index),
            Collection::Animations => any_record(&self.animations, index),
            Collection::Buffers => any_record(&self.buffers, index),
            Collection::BufferViews => any_record(&self.buffer_views, index),
            Collection::Cameras => any_record(&self.cameras, index),
            Collection::Images => any_record(&self.images, index),
            Collection::Materials => any_record(&self.materials, index),
            Collection::Meshes => any_record(&self.meshes, index),
            Collection::Nodes => any_record(&self.nodes, index),
            Collection::Samplers => any_record(&self.samplers, index),
            Collection::Scenes => any_record(&self.scenes, index),
            Collection::Skins => any_record(&self.skins, index),
            Collection::Textures => any_record(&self.textures, index),
        }
    }

    fn records(&self, collection: Collection) -> Vec<&dyn Record> {
        match collection {
            Collection::Accessors => as_records(&self.accessors),
            Collection::Animations => as_records(&self.animations),
            Collection::Buffers => as_records(&self.buffers),
            Collection::BufferViews => as_records(&self.buffer_views),
            Collection::Cameras => as_records(&self.cameras),
            Collection::Images => as_records(&self.images),
            Collection::Materials => as_records(&self.materials),
            Collection::Meshes => as_records(&self.meshes),
            Collection::Nodes => as_records(&self.nodes),
            Collection::Samplers => as_records(&self.samplers),
            Collection::Scenes => as_records(&self.scenes),
            Collection::Skins => as_records(&self.skins),
            Collection::Textures => as_records(&self.textures),
        }
    }
}

#[async_trait]
impl Record for Gltf {
    fn kind(&self) -> RecordKind {
        RecordKind::Root
    }

    fn base(&self) -> &RecordBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut RecordBase {
        &mut self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn reference_fields(&self) -> &'static [ReferenceField] {
        ROOT_FIELDS
    }

    fn field(&self, name: &str) -> Option<FieldSlot<'_>> {
        match name {
            "scene" => Some(FieldSlot::Index(&self.scene)),
            _ => None,
        }
    }

    async fn load(&self, cx: &LoadContext) -> Result<()> {
        self.cell.run(self.load_all(cx)).await
    }
}

impl fmt::Debug for Gltf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gltf")
            .field("source", &self.source)
            .field("version", &self.asset.version)
            .field("accessors", &self.accessors.len())
            .field("buffers", &self.buffers.len())
            .field("meshes", &self.meshes.len())
            .field("nodes", &self.nodes.len())
            .field("scenes", &self.scenes.len())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> ExtensionRegistry {
        ExtensionRegistry::with_builtin()
    }

    #[test]
    fn test_minimal_document() {
        let doc = json!({ "asset": { "version": "2.0" } });
        let gltf = Gltf::from_document(doc, "a.gltf", &registry(), None).unwrap();
        assert!(gltf.nodes.is_empty());
        assert!(gltf.default_scene().is_none());
        assert_eq!(gltf.source(), "a.gltf");
    }

    #[test]
    fn test_missing_asset() {
        let err = Gltf::from_document(json!({}), "a.gltf", &registry(), None).unwrap_err();
        assert!(matches!(err, Error::Schema { .. }));
    }

    #[test]
    fn test_scene_and_children_linked() {
        let doc = json!({
            "asset": { "version": "2.0" },
            "scene": 0,
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "children": [1] }, { "name": "leaf" }]
        });
        let gltf = Gltf::from_document(doc, "a.gltf", &registry(), None).unwrap();
        let scene = gltf.default_scene().unwrap();
        assert!(Arc::ptr_eq(&scene, &gltf.scenes[0]));
        let root = scene.nodes.as_ref().unwrap()[0].get().unwrap();
        let child = root.children.as_ref().unwrap()[0].get().unwrap();
        assert!(Arc::ptr_eq(&child, &gltf.nodes[1]));
    }

    #[test]
    fn test_node_cycle_rejected() {
        let doc = json!({
            "asset": { "version": "2.0" },
            "nodes": [{ "children": [1] }, { "children": [0] }]
        });
        let err = Gltf::from_document(doc, "a.gltf", &registry(), None).unwrap_err();
        assert!(matches!(err, Error::InvalidStructure(_)));
    }

    #[test]
    fn test_record_errors_carry_path() {
        let doc = json!({
            "asset": { "version": "2.0" },
            "accessors": [{ "componentType": 5126, "count": 1, "type": "VEC9" }]
        });
        match Gltf::from_document(doc, "a.gltf", &registry(), None) {
            Err(Error::Schema { path, .. }) => assert_eq!(path, "accessors[0]"),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }
}
