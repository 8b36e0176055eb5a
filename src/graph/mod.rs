//! The record graph.
//!
//! A document is read into typed records whose cross-references are
//! [`Link`]s carrying wire indices. Each record kind declares its reference
//! fields once (see [`ReferenceField`]); [`dereference`] walks those
//! declarations and binds every link to its target in the owning collection.
//! Extension blocks are hydrated into typed records through the
//! [`ExtensionRegistry`](crate::registry::ExtensionRegistry) and take part in
//! dereferencing and loading like any other record.

mod deref;
mod extensions;
mod link;
mod record;

pub use deref::{dereference, RecordStore};
pub use extensions::{ExtensionEntry, Extensions};
pub use link::{AnyRecord, DynLink, Link};
pub use record::{
    Collection, FieldKind, FieldSlot, Record, RecordBase, RecordContext, RecordKind,
    ReferenceField,
};

use crate::load::{join_all, LoadContext, LoadUnit};
use crate::util::Result;

/// Run the load hook of every typed extension attached to `owner`.
pub async fn load_extensions(owner: &dyn Record, cx: &LoadContext) -> Result<()> {
    let units: Vec<LoadUnit<'_>> = owner
        .base()
        .extensions
        .records()
        .map(|ext| ext.load_attached(owner, cx))
        .collect();
    join_all(units).await
}
