//! Sparse overrides applied in place to a dense array.

use super::{StridedView, TypedArray};
use crate::util::{Error, Result};

/// Overwrite the elements of `dense` named by `indices` with the matching
/// elements of `values`.
///
/// `dense` holds `count` elements; every index must be below `count`.
pub fn apply_sparse(
    dense: &mut TypedArray,
    count: usize,
    indices: &StridedView<'_>,
    values: &StridedView<'_>,
) -> Result<()> {
    if indices.count() != values.count() {
        return Err(Error::invalid(format!(
            "sparse indices ({}) and values ({}) disagree",
            indices.count(),
            values.count()
        )));
    }
    if indices.count() > count {
        return Err(Error::invalid(format!(
            "sparse count {} exceeds accessor count {}",
            indices.count(),
            count
        )));
    }
    if values.layout().component_type != dense.component_type() {
        return Err(Error::invalid("sparse values differ in component type"));
    }
    if dense.len() != count * values.layout().components() {
        return Err(Error::invalid("sparse values differ in element shape"));
    }
    for k in 0..indices.count() {
        let target = indices.index_at(k)? as usize;
        if target >= count {
            return Err(Error::invalid(format!(
                "sparse index {} out of range for {} elements",
                target, count
            )));
        }
        values.write_element(k, dense, target);
    }
    Ok(())
}
