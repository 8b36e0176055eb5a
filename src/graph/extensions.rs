//! The `extensions` block carried by every record.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use super::record::{Record, RecordContext, RecordKind};
use crate::util::Result;

/// One entry of an `extensions` block.
#[derive(Debug, Clone)]
pub enum ExtensionEntry {
    /// Hydrated by a registered factory.
    Record(Arc<dyn Record>),
    /// No factory registered; kept verbatim.
    Opaque(Value),
}

/// Named extensions of a record, in name order.
#[derive(Debug, Clone, Default)]
pub struct Extensions {
    entries: BTreeMap<String, ExtensionEntry>,
}

impl Extensions {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, name: &str) -> Option<&ExtensionEntry> {
        self.entries.get(name)
    }

    /// Typed record for `name`, if it was hydrated.
    pub fn record(&self, name: &str) -> Option<&Arc<dyn Record>> {
        match self.entries.get(name)? {
            ExtensionEntry::Record(r) => Some(r),
            ExtensionEntry::Opaque(_) => None,
        }
    }

    /// Raw JSON for `name`, if it stayed opaque.
    pub fn opaque(&self, name: &str) -> Option<&Value> {
        match self.entries.get(name)? {
            ExtensionEntry::Opaque(v) => Some(v),
            ExtensionEntry::Record(_) => None,
        }
    }

    /// Typed record for `name` downcast to its concrete type.
    pub fn downcast<T: Record>(&self, name: &str) -> Option<&T> {
        self.record(name)?.as_any().downcast_ref::<T>()
    }

    /// All hydrated records.
    pub fn records(&self) -> impl Iterator<Item = &dyn Record> + '_ {
        self.entries.values().filter_map(|e| match e {
            ExtensionEntry::Record(r) => Some(r.as_ref()),
            ExtensionEntry::Opaque(_) => None,
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }

    /// Insert an entry directly, replacing any previous one.
    pub fn insert(&mut self, name: impl Into<String>, entry: ExtensionEntry) {
        self.entries.insert(name.into(), entry);
    }

    /// Replace opaque entries with typed records where the registry has a
    /// factory for `(owner, name)`.
    pub fn hydrate(&mut self, owner: RecordKind, cx: &RecordContext<'_>) -> Result<()> {
        for (name, entry) in self.entries.iter_mut() {
            let ExtensionEntry::Opaque(value) = entry else {
                continue;
            };
            match cx.registry.factory(owner, name) {
                Some(factory) => {
                    let record = factory(value.clone(), cx)?;
                    tracing::trace!(owner = %owner, extension = %name, "hydrated extension");
                    *entry = ExtensionEntry::Record(record);
                }
                None => {
                    tracing::debug!(owner = %owner, extension = %name, "no factory, kept opaque");
                }
            }
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for Extensions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let map = Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
        Ok(Self {
            entries: map
                .into_iter()
                .map(|(k, v)| (k, ExtensionEntry::Opaque(v)))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_keeps_everything_opaque() {
        let ext: Extensions =
            serde_json::from_str(r#"{"EXT_b": {"x": 1}, "EXT_a": true}"#).unwrap();
        assert_eq!(ext.len(), 2);
        assert_eq!(ext.names().collect::<Vec<_>>(), vec!["EXT_a", "EXT_b"]);
        assert_eq!(ext.opaque("EXT_b").unwrap()["x"], 1);
        assert!(ext.record("EXT_b").is_none());
        assert_eq!(ext.records().count(), 0);
    }

    #[test]
    fn test_null_is_empty() {
        let ext: Extensions = serde_json::from_str("null").unwrap();
        assert!(ext.is_empty());
    }
}
