//! Records kept as verbatim JSON.

use std::any::Any;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::graph::{load_extensions, Record, RecordBase, RecordContext, RecordKind};
use crate::load::LoadContext;
use crate::util::{Error, Result};

/// A material, texture, sampler, camera, skin or animation.
///
/// The JSON body is kept as-is; only the common record fields are typed.
#[derive(Debug)]
pub struct LeafRecord {
    kind: RecordKind,
    properties: Value,
    base: RecordBase,
}

impl LeafRecord {
    pub fn new(kind: RecordKind, properties: Value) -> Self {
        Self {
            kind,
            properties,
            base: RecordBase::default(),
        }
    }

    /// Build from a JSON body and hydrate its extensions.
    pub(crate) fn from_value(
        kind: RecordKind,
        value: Value,
        path: &str,
        cx: &RecordContext<'_>,
    ) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::schema(path, "expected an object"));
        }
        let base = RecordBase::deserialize(&value).map_err(|e| Error::schema(path, e))?;
        let mut record = Self {
            kind,
            properties: value,
            base,
        };
        record.hydrate(cx)?;
        Ok(record)
    }

    /// The record's JSON body.
    pub fn properties(&self) -> &Value {
        &self.properties
    }

    /// Property `key` of the JSON body.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

#[async_trait]
impl Record for LeafRecord {
    fn kind(&self) -> RecordKind {
        self.kind
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

    async fn load(&self, cx: &LoadContext) -> Result<()> {
        load_extensions(self, cx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ExtensionRegistry;
    use std::sync::Arc;

    #[test]
    fn test_from_value_keeps_body() {
        let registry = ExtensionRegistry::new();
        let source: Arc<str> = Arc::from("scene.gltf");
        let cx = RecordContext {
            source: &source,
            registry: &registry,
        };
        let value = serde_json::json!({
            "name": "steel",
            "pbrMetallicRoughness": {"metallicFactor": 1.0},
            "extensions": {"KHR_materials_ior": {"ior": 1.4}}
        });
        let leaf = LeafRecord::from_value(RecordKind::Material, value, "materials[0]", &cx).unwrap();
        assert_eq!(leaf.kind(), RecordKind::Material);
        assert_eq!(leaf.base().name.as_deref(), Some("steel"));
        assert_eq!(leaf.base().source(), "scene.gltf");
        assert!(leaf.get("pbrMetallicRoughness").is_some());
        assert!(leaf.base().extensions.opaque("KHR_materials_ior").is_some());

        let err = LeafRecord::from_value(RecordKind::Material, Value::Null, "materials[1]", &cx);
        assert!(matches!(err, Err(Error::Schema { .. })));
    }
}
