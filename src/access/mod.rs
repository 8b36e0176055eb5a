//! Typed access to binary payloads.
//!
//! [`StridedView`] reads accessor elements out of a buffer view's bytes,
//! [`apply_sparse`] patches a dense array with sparse overrides and
//! [`TypedArray::normalized`] performs the fixed-point conversion.

mod sparse;
mod typed;
mod view;

pub use sparse::apply_sparse;
pub use typed::TypedArray;
pub use view::StridedView;
