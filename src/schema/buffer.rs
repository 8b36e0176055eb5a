//! Buffers and buffer views.

use std::ops::{Deref, Range};
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde::Deserialize;

use super::record_common;
use crate::graph::{
    load_extensions, Collection, FieldSlot, Link, Record, RecordBase, RecordKind, ReferenceField,
};
use crate::load::{LoadCell, LoadContext};
use crate::util::{Error, Result};

/// Owner of one byte region.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Buffer {
    pub byte_length: usize,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(flatten)]
    base: RecordBase,
    #[serde(skip)]
    bytes: OnceCell<Arc<[u8]>>,
    #[serde(skip)]
    cell: LoadCell,
}

impl Buffer {
    /// Loaded bytes, if any.
    pub fn bytes(&self) -> Option<&[u8]> {
        self.bytes.get().map(|b| &b[..])
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.bytes.get().is_some()
    }

    pub(crate) fn shared_bytes(&self) -> Option<Arc<[u8]>> {
        self.bytes.get().cloned()
    }

    /// Supply the bytes of a binary container chunk.
    ///
    /// Chunk padding past `byteLength` is dropped.
    pub(crate) fn bind_binary_chunk(&self, chunk: Arc<[u8]>) -> Result<()> {
        if let Some(uri) = &self.uri {
            return Err(Error::Format(format!(
                "buffer 0 is backed by the binary chunk but declares uri '{}'",
                uri
            )));
        }
        self.check_length(chunk.len())?;
        let chunk = if chunk.len() > self.byte_length {
            Arc::from(&chunk[..self.byte_length])
        } else {
            chunk
        };
        let _ = self.bytes.set(chunk);
        Ok(())
    }

    fn check_length(&self, len: usize) -> Result<()> {
        if len < self.byte_length {
            return Err(Error::invalid(format!(
                "buffer declares {} bytes, payload has {}",
                self.byte_length, len
            )));
        }
        Ok(())
    }

    async fn fetch(&self, cx: &LoadContext) -> Result<()> {
        if self.bytes.get().is_none() {
            let uri = self
                .uri
                .as_deref()
                .ok_or_else(|| Error::invalid("buffer has neither a uri nor a binary chunk"))?;
            let mut bytes = cx.fetch_relative(self.base.source(), uri).await?;
            self.check_length(bytes.len())?;
            bytes.truncate(self.byte_length);
            let _ = self.bytes.set(bytes.into());
        }
        load_extensions(self, cx).await
    }
}

#[async_trait]
impl Record for Buffer {
    record_common!(RecordKind::Buffer);

    async fn load(&self, cx: &LoadContext) -> Result<()> {
        self.cell.run(self.fetch(cx)).await
    }
}

/// Borrowed window into a loaded buffer.
#[derive(Clone, Debug)]
pub struct ByteRegion {
    bytes: Arc<[u8]>,
    range: Range<usize>,
}

impl ByteRegion {
    /// The whole buffer this region points into.
    pub fn buffer(&self) -> &Arc<[u8]> {
        &self.bytes
    }

    /// Offset of the region inside [`ByteRegion::buffer`].
    #[inline]
    pub fn offset(&self) -> usize {
        self.range.start
    }
}

impl Deref for ByteRegion {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes[self.range.clone()]
    }
}

/// Byte range of a buffer.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferView {
    pub buffer: Link<Buffer>,
    #[serde(default)]
    pub byte_offset: usize,
    pub byte_length: usize,
    #[serde(default)]
    pub byte_stride: Option<usize>,
    #[serde(default)]
    pub target: Option<u32>,
    #[serde(flatten)]
    base: RecordBase,
    #[serde(skip)]
    cell: LoadCell,
}

const BUFFER_VIEW_FIELDS: &[ReferenceField] = &[ReferenceField::index("buffer", Collection::Buffers)];

impl BufferView {
    /// The viewed bytes; the buffer must be loaded.
    pub fn region(&self) -> Result<ByteRegion> {
        let buffer = self.buffer.require("buffer")?;
        let bytes = buffer
            .shared_bytes()
            .ok_or_else(|| Error::invalid("buffer view read before its buffer was loaded"))?;
        let end = self
            .byte_offset
            .checked_add(self.byte_length)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| {
                Error::invalid(format!(
                    "view [{}, +{}) exceeds buffer of {} bytes",
                    self.byte_offset,
                    self.byte_length,
                    bytes.len()
                ))
            })?;
        Ok(ByteRegion {
            bytes,
            range: self.byte_offset..end,
        })
    }

    async fn load_buffer(&self, cx: &LoadContext) -> Result<()> {
        self.buffer.require("buffer")?.load(cx).await?;
        load_extensions(self, cx).await
    }
}

#[async_trait]
impl Record for BufferView {
    record_common!(RecordKind::BufferView);

    fn reference_fields(&self) -> &'static [ReferenceField] {
        BUFFER_VIEW_FIELDS
    }

    fn field(&self, name: &str) -> Option<FieldSlot<'_>> {
        match name {
            "buffer" => Some(FieldSlot::Index(&self.buffer)),
            _ => None,
        }
    }

    async fn load(&self, cx: &LoadContext) -> Result<()> {
        self.cell.run(self.load_buffer(cx)).await
    }
}
