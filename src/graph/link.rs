//! Reference slots: wire indices that get bound to records in place.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Deserializer};

use crate::util::{Error, Result};

/// Type-erased record handle used while binding links.
pub type AnyRecord = Arc<dyn Any + Send + Sync>;

/// A reference to another record, stored as its wire index until bound.
///
/// Binding happens at most once; afterwards the link yields a non-owning handle
/// into the collection owned by the root.
pub struct Link<T> {
    index: Option<i64>,
    target: OnceCell<Weak<T>>,
}

impl<T> Link<T> {
    /// A link carrying an optional wire index.
    pub fn new(index: Option<i64>) -> Self {
        Self {
            index,
            target: OnceCell::new(),
        }
    }

    /// A link to `index`.
    pub fn with_index(index: i64) -> Self {
        Self::new(Some(index))
    }

    /// Wire index as found in the document.
    #[inline]
    pub fn index(&self) -> Option<i64> {
        self.index
    }

    /// True if the document set this field.
    #[inline]
    pub fn is_set(&self) -> bool {
        self.index.is_some()
    }

    #[inline]
    pub fn is_bound(&self) -> bool {
        self.target.get().is_some()
    }

    /// The bound record, if any.
    pub fn get(&self) -> Option<Arc<T>> {
        self.target.get().and_then(Weak::upgrade)
    }

    /// The bound record; unset or unbound links are an error.
    pub fn require(&self, field: &str) -> Result<Arc<T>> {
        self.resolve(field)?
            .ok_or_else(|| Error::invalid(format!("required reference '{}' is not set", field)))
    }

    /// `Ok(None)` when the field is unset, an error when it is set but not bound.
    pub fn resolve(&self, field: &str) -> Result<Option<Arc<T>>> {
        match self.index {
            None => Ok(None),
            Some(index) => self.get().map(Some).ok_or_else(|| {
                Error::invalid(format!("reference '{}' ({}) is not linked", field, index))
            }),
        }
    }
}

impl<T> Default for Link<T> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<T> fmt::Debug for Link<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.index, self.is_bound()) {
            (None, _) => f.write_str("Link(-)"),
            (Some(i), true) => write!(f, "Link({} -> bound)", i),
            (Some(i), false) => write!(f, "Link({})", i),
        }
    }
}

impl<'de, T> Deserialize<'de> for Link<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Option::<i64>::deserialize(deserializer).map(Self::new)
    }
}

/// Object-safe view of a [`Link`] used by the dereferencer.
pub trait DynLink: Send + Sync {
    fn index(&self) -> Option<i64>;
    fn is_bound(&self) -> bool;
    /// Bind to `target`, which must be a record of the link's type.
    fn bind(&self, target: AnyRecord) -> Result<()>;
}

impl<T: Any + Send + Sync> DynLink for Link<T> {
    fn index(&self) -> Option<i64> {
        self.index
    }

    fn is_bound(&self) -> bool {
        Link::is_bound(self)
    }

    fn bind(&self, target: AnyRecord) -> Result<()> {
        let target = target
            .downcast::<T>()
            .map_err(|_| Error::invalid(format!("link expects a {}", type_name::<T>())))?;
        // A concurrent or earlier bind wins; binding is idempotent.
        let _ = self.target.set(Arc::downgrade(&target));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Dummy(u32);

    #[test]
    fn test_deserialize_and_bind() {
        let link: Link<Dummy> = serde_json::from_str("2").unwrap();
        assert_eq!(link.index(), Some(2));
        assert!(!link.is_bound());
        assert!(link.resolve("x").is_err());

        let target = Arc::new(Dummy(5));
        link.bind(target.clone() as AnyRecord).unwrap();
        assert!(Arc::ptr_eq(&link.get().unwrap(), &target));
        assert_eq!(link.require("x").unwrap().0, 5);
    }

    #[test]
    fn test_unset_link() {
        let link: Link<Dummy> = Link::default();
        assert!(!link.is_set());
        assert!(link.resolve("x").unwrap().is_none());
        assert!(link.require("x").is_err());
    }

    #[test]
    fn test_bind_wrong_type() {
        let link: Link<Dummy> = Link::with_index(0);
        let wrong: AnyRecord = Arc::new(17u64);
        assert!(link.bind(wrong).is_err());
    }

    #[test]
    fn test_link_is_non_owning() {
        let link: Link<Dummy> = Link::with_index(0);
        let target = Arc::new(Dummy(1));
        link.bind(target.clone() as AnyRecord).unwrap();
        drop(target);
        assert!(link.get().is_none());
    }
}
