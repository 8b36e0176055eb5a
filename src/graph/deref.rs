//! Dereferencing: the one pass that turns wire indices into links.

use super::link::{AnyRecord, DynLink};
use super::record::{Collection, FieldKind, FieldSlot, Record, ReferenceField};
use crate::util::{Error, Result};

/// Owner of the collections that links point into.
pub trait RecordStore {
    /// The top-level record; visited before any collection.
    fn root_record(&self) -> &dyn Record;

    fn collection_len(&self, collection: Collection) -> usize;

    /// Type-erased handle to `collection[index]`.
    fn lookup(&self, collection: Collection, index: usize) -> Option<AnyRecord>;

    /// Records of `collection` in wire order.
    fn records(&self, collection: Collection) -> Vec<&dyn Record>;
}

/// Bind every declared reference field of every record in `store`.
///
/// Depth-first: a record's embedded subrecords and typed extensions are
/// visited before its next sibling. Already-bound links are left alone, so
/// running this again is a no-op.
pub fn dereference(store: &dyn RecordStore) -> Result<()> {
    let mut bound = 0usize;
    visit(store, store.root_record(), &mut bound)?;
    for collection in Collection::ALL {
        for record in store.records(collection) {
            visit(store, record, &mut bound)?;
        }
    }
    tracing::debug!(links = bound, "dereferenced graph");
    Ok(())
}

fn visit(store: &dyn RecordStore, record: &dyn Record, bound: &mut usize) -> Result<()> {
    for field in record.reference_fields() {
        let slot = record.field(field.name).ok_or_else(|| {
            Error::invalid(format!(
                "{} declares reference '{}' without storage",
                record.kind(),
                field.name
            ))
        })?;
        match (field.kind, slot) {
            (_, FieldSlot::Absent) => {}
            (FieldKind::Index, FieldSlot::Index(link)) => bind(store, field, link, bound)?,
            (FieldKind::IndexArray | FieldKind::IndexMap, FieldSlot::Indices(links)) => {
                for link in links {
                    bind(store, field, link, bound)?;
                }
            }
            (FieldKind::Embedded, FieldSlot::Embedded(sub)) => visit(store, sub, bound)?,
            (FieldKind::EmbeddedArray, FieldSlot::EmbeddedArray(subs)) => {
                for sub in subs {
                    visit(store, sub, bound)?;
                }
            }
            (kind, _) => {
                return Err(Error::invalid(format!(
                    "{}.{}: storage does not match {:?}",
                    record.kind(),
                    field.name,
                    kind
                )))
            }
        }
    }
    for ext in record.base().extensions.records() {
        visit(store, ext, bound)?;
    }
    Ok(())
}

fn bind(
    store: &dyn RecordStore,
    field: &ReferenceField,
    link: &dyn DynLink,
    bound: &mut usize,
) -> Result<()> {
    if link.is_bound() {
        return Ok(());
    }
    let Some(index) = link.index() else {
        return Ok(());
    };
    let collection = field.collection.ok_or_else(|| {
        Error::invalid(format!("reference '{}' has no target collection", field.name))
    })?;
    let len = store.collection_len(collection);
    let out_of_range = || Error::Reference {
        collection: collection.name(),
        index,
        len,
    };
    let slot = usize::try_from(index).map_err(|_| out_of_range())?;
    if slot >= len {
        return Err(out_of_range());
    }
    let target = store.lookup(collection, slot).ok_or_else(out_of_range)?;
    link.bind(target)?;
    *bound += 1;
    Ok(())
}
