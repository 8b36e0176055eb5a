//! Utility types shared by every layer of the loader.
//!
//! - [`ComponentType`] / [`AccessorType`] / [`ElementLayout`] - accessor element types
//! - [`Error`] / [`Result`] - Error handling

mod component;
mod error;

pub use component::*;
pub use error::*;
