//! Self-contained binary container (GLB).
//!
//! ```text
//! [magic u32][version u32][total length u32]
//! [chunk length u32][chunk type u32][JSON bytes ...]
//! [chunk length u32][chunk type u32][BIN bytes ...]   (optional)
//! ```
//!
//! All integers are little-endian and chunk payloads are 4-byte aligned.

pub mod format;
mod reader;

pub use format::{has_magic, GLB_MAGIC};
pub use reader::Container;
