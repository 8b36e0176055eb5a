//! Extension registry.
//!
//! Maps `(owning record kind, extension name)` to a factory that builds a
//! typed record from the extension's JSON body. Registries are plain values
//! handed to graph construction; there is no global instance.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::graph::{Record, RecordContext, RecordKind};
use crate::util::Result;

/// Builds a typed extension record from its JSON body.
pub type ExtensionFactory =
    Arc<dyn Fn(Value, &RecordContext<'_>) -> Result<Arc<dyn Record>> + Send + Sync>;

/// The record kinds an extension attaches to, with one factory each.
#[derive(Clone, Default)]
pub struct ExtensionSchema {
    factories: BTreeMap<RecordKind, ExtensionFactory>,
}

impl ExtensionSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach to `kind` through `factory`.
    pub fn with<F>(mut self, kind: RecordKind, factory: F) -> Self
    where
        F: Fn(Value, &RecordContext<'_>) -> Result<Arc<dyn Record>> + Send + Sync + 'static,
    {
        self.factories.insert(kind, Arc::new(factory));
        self
    }

    pub fn kinds(&self) -> impl Iterator<Item = RecordKind> + '_ {
        self.factories.keys().copied()
    }
}

impl fmt::Debug for ExtensionSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

type FactoryMap = HashMap<(RecordKind, String), ExtensionFactory>;

/// Saved registry state, see [`ExtensionRegistry::snapshot`].
#[derive(Clone)]
pub struct RegistrySnapshot(FactoryMap);

/// Registered extension factories.
#[derive(Default)]
pub struct ExtensionRegistry {
    factories: RwLock<FactoryMap>,
}

impl ExtensionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the extensions shipped by this crate.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        crate::decode::register(&registry);
        registry
    }

    /// Register every `(kind, factory)` pair of `schema` under `name`.
    ///
    /// A later registration for the same pair replaces the earlier one.
    pub fn add(&self, name: &str, schema: ExtensionSchema) {
        let mut factories = self.factories.write();
        for (kind, factory) in schema.factories {
            if factories.insert((kind, name.to_string()), factory).is_some() {
                tracing::debug!(extension = name, kind = %kind, "replaced extension factory");
            }
        }
    }

    /// Factory for `name` on records of `kind`.
    pub fn factory(&self, kind: RecordKind, name: &str) -> Option<ExtensionFactory> {
        self.factories.read().get(&(kind, name.to_string())).cloned()
    }

    /// True if `name` is registered for any record kind.
    pub fn is_supported(&self, name: &str) -> bool {
        self.factories.read().keys().any(|(_, n)| n == name)
    }

    /// Registered extension names, sorted.
    pub fn names(&self) -> Vec<String> {
        let factories = self.factories.read();
        let names: BTreeSet<&String> = factories.keys().map(|(_, n)| n).collect();
        names.into_iter().cloned().collect()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot(self.factories.read().clone())
    }

    /// Replace the current state with a snapshot.
    pub fn restore(&self, snapshot: RegistrySnapshot) {
        *self.factories.write() = snapshot.0;
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("names", &self.names())
            .finish()
    }
}
