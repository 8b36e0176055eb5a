//! Decoder capability and the reference packed-mesh format.
//!
//! Packed layout, zlib-compressed as a whole:
//!
//! ```text
//! b"PKMS"
//! u8   geometry        0 = mesh, 1 = point cloud
//! u32  attribute count
//! { u32 unique_id, u32 byte_length, bytes }*
//! u32  index byte length, bytes          (mesh only)
//! ```
//!
//! All integers and payload components are little-endian.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};

use byteorder::{ByteOrder, LittleEndian, NativeEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use super::protocol::{AttributeRequest, IndicesRequest};
use crate::util::{ComponentType, Error, Result};

/// Magic bytes of a packed mesh.
pub const PACKED_MAGIC: &[u8; 4] = b"PKMS";

/// Output slices for one decode call, in request order.
pub struct DecodeOutputs<'a> {
    pub attributes: Vec<&'a mut [u8]>,
    pub indices: Option<&'a mut [u8]>,
}

/// A mesh decoder living on one worker thread.
///
/// Outputs are native-endian and pre-sized to exactly the requested
/// `count * components` elements.
pub trait MeshDecoder: Send {
    fn decode(
        &mut self,
        data: &[u8],
        attributes: &[AttributeRequest],
        indices: Option<&IndicesRequest>,
        outputs: &mut DecodeOutputs<'_>,
    ) -> Result<()>;
}

/// Creates one decoder per worker, on the worker thread.
pub trait DecoderFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn MeshDecoder>>;
}

impl<F> DecoderFactory for F
where
    F: Fn() -> Result<Box<dyn MeshDecoder>> + Send + Sync,
{
    fn create(&self) -> Result<Box<dyn MeshDecoder>> {
        self()
    }
}

/// Kind of geometry stored in a packed payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Geometry {
    Mesh = 0,
    PointCloud = 1,
}

impl Geometry {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Self::Mesh),
            1 => Ok(Self::PointCloud),
            other => Err(Error::decode(format!("unknown geometry type {}", other))),
        }
    }
}

/// Reference decoder for the packed format.
#[derive(Debug, Default)]
pub struct PackedMeshDecoder;

/// Factory producing [`PackedMeshDecoder`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct PackedMeshFactory;

impl DecoderFactory for PackedMeshFactory {
    fn create(&self) -> Result<Box<dyn MeshDecoder>> {
        Ok(Box::new(PackedMeshDecoder))
    }
}

struct Unpacked {
    geometry: Geometry,
    attributes: HashMap<u32, Vec<u8>>,
    indices: Option<Vec<u8>>,
}

impl PackedMeshDecoder {
    fn unpack(data: &[u8]) -> Result<Unpacked> {
        let mut raw = Vec::new();
        ZlibDecoder::new(data)
            .read_to_end(&mut raw)
            .map_err(|e| Error::decode(format!("corrupt packed mesh: {}", e)))?;

        let truncated = |_| Error::decode("truncated packed mesh");
        let mut cur = Cursor::new(raw.as_slice());
        let mut magic = [0u8; 4];
        cur.read_exact(&mut magic).map_err(truncated)?;
        if &magic != PACKED_MAGIC {
            return Err(Error::decode("not a packed mesh"));
        }
        let geometry = Geometry::from_u8(cur.read_u8().map_err(truncated)?)?;
        let n = cur.read_u32::<LittleEndian>().map_err(truncated)?;
        // Each entry carries an 8-byte header, so the remaining bytes bound the count.
        let remaining = raw.len().saturating_sub(cur.position() as usize);
        let mut attributes = HashMap::with_capacity((n as usize).min(remaining / 8));
        for _ in 0..n {
            let id = cur.read_u32::<LittleEndian>().map_err(truncated)?;
            let len = cur.read_u32::<LittleEndian>().map_err(truncated)? as usize;
            attributes.insert(id, read_block(&mut cur, len)?);
        }
        let indices = match geometry {
            Geometry::Mesh => {
                let len = cur.read_u32::<LittleEndian>().map_err(truncated)? as usize;
                Some(read_block(&mut cur, len)?)
            }
            Geometry::PointCloud => None,
        };
        Ok(Unpacked {
            geometry,
            attributes,
            indices,
        })
    }
}

fn read_block(cur: &mut Cursor<&[u8]>, len: usize) -> Result<Vec<u8>> {
    let start = cur.position() as usize;
    let block = cur
        .get_ref()
        .get(start..start.saturating_add(len))
        .ok_or_else(|| Error::decode("truncated packed mesh block"))?
        .to_vec();
    cur.set_position((start + len) as u64);
    Ok(block)
}

/// Copy little-endian components from `src` into native-endian `dst`.
fn copy_components(src: &[u8], dst: &mut [u8], ct: ComponentType) -> Result<()> {
    if src.len() != dst.len() {
        return Err(Error::decode(format!(
            "decoded {} bytes, expected {}",
            src.len(),
            dst.len()
        )));
    }
    match ct.num_bytes() {
        2 => {
            for (d, s) in dst.chunks_exact_mut(2).zip(src.chunks_exact(2)) {
                NativeEndian::write_u16(d, LittleEndian::read_u16(s));
            }
        }
        4 => {
            for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
                NativeEndian::write_u32(d, LittleEndian::read_u32(s));
            }
        }
        _ => dst.copy_from_slice(src),
    }
    Ok(())
}

impl MeshDecoder for PackedMeshDecoder {
    fn decode(
        &mut self,
        data: &[u8],
        attributes: &[AttributeRequest],
        indices: Option<&IndicesRequest>,
        outputs: &mut DecodeOutputs<'_>,
    ) -> Result<()> {
        let unpacked = Self::unpack(data)?;
        for (request, out) in attributes.iter().zip(outputs.attributes.iter_mut()) {
            let src = unpacked.attributes.get(&request.unique_id).ok_or_else(|| {
                Error::decode(format!(
                    "attribute {} (id {}) not in payload",
                    request.semantic, request.unique_id
                ))
            })?;
            copy_components(src, out, request.component_type)?;
        }
        if let Some(request) = indices {
            if unpacked.geometry == Geometry::PointCloud {
                return Err(Error::decode("point cloud payload has no indices"));
            }
            let src = unpacked.indices.as_deref().unwrap_or_default();
            let out = outputs
                .indices
                .as_deref_mut()
                .ok_or_else(|| Error::decode("no output for indices"))?;
            copy_components(src, out, request.component_type)?;
        }
        Ok(())
    }
}

/// Writer for the packed format.
#[derive(Clone, Debug)]
pub struct PackedMeshEncoder {
    geometry: Geometry,
    attributes: Vec<(u32, Vec<u8>)>,
    indices: Vec<u8>,
}

impl PackedMeshEncoder {
    pub fn mesh() -> Self {
        Self::new(Geometry::Mesh)
    }

    pub fn point_cloud() -> Self {
        Self::new(Geometry::PointCloud)
    }

    fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            attributes: Vec::new(),
            indices: Vec::new(),
        }
    }

    /// Add raw little-endian attribute bytes under `unique_id`.
    pub fn attribute(mut self, unique_id: u32, bytes: Vec<u8>) -> Self {
        self.attributes.push((unique_id, bytes));
        self
    }

    pub fn attribute_f32(self, unique_id: u32, values: &[f32]) -> Self {
        let mut bytes = vec![0u8; values.len() * 4];
        LittleEndian::write_f32_into(values, &mut bytes);
        self.attribute(unique_id, bytes)
    }

    /// Set `u16` indices (mesh only).
    pub fn indices_u16(mut self, values: &[u16]) -> Self {
        let mut bytes = vec![0u8; values.len() * 2];
        LittleEndian::write_u16_into(values, &mut bytes);
        self.indices = bytes;
        self
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut raw = Vec::new();
        raw.extend_from_slice(PACKED_MAGIC);
        raw.write_u8(self.geometry as u8)?;
        raw.write_u32::<LittleEndian>(self.attributes.len() as u32)?;
        for (id, bytes) in &self.attributes {
            raw.write_u32::<LittleEndian>(*id)?;
            raw.write_u32::<LittleEndian>(bytes.len() as u32)?;
            raw.extend_from_slice(bytes);
        }
        if self.geometry == Geometry::Mesh {
            raw.write_u32::<LittleEndian>(self.indices.len() as u32)?;
            raw.extend_from_slice(&self.indices);
        }
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw)?;
        Ok(encoder.finish()?)
    }
}
