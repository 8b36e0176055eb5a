//! Binary container parsing and encoding.

use std::io::{Cursor, Write};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use serde_json::Value;

use super::format::*;
use crate::util::{Error, Result};

/// A parsed binary container: the JSON document plus the optional BIN payload.
#[derive(Debug, Clone)]
pub struct Container {
    version: u32,
    json: Vec<u8>,
    bin: Option<Vec<u8>>,
}

impl Container {
    /// Parse a container from raw bytes.
    ///
    /// The first chunk must be JSON. A BIN chunk directly after it supplies the
    /// payload of the first buffer; any other chunk is skipped.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::Format(format!(
                "container header truncated ({} bytes)",
                data.len()
            )));
        }

        let magic = LittleEndian::read_u32(&data[0..4]);
        if magic != GLB_MAGIC {
            return Err(Error::Format(format!("bad magic 0x{:08X}", magic)));
        }

        let version = LittleEndian::read_u32(&data[4..8]);
        if version != GLB_VERSION {
            return Err(Error::UnsupportedVersion(format!("container version {}", version)));
        }

        let total = LittleEndian::read_u32(&data[8..12]) as usize;
        if total > data.len() {
            return Err(Error::Format(format!(
                "declared length {} exceeds data length {}",
                total,
                data.len()
            )));
        }
        let data = &data[..total];

        let mut pos = HEADER_SIZE;
        let mut json = None;
        let mut bin = None;
        let mut index = 0usize;

        while pos < total {
            if pos + CHUNK_HEADER_SIZE > total {
                return Err(Error::Format(format!("chunk header truncated at {}", pos)));
            }
            let len = LittleEndian::read_u32(&data[pos..pos + 4]) as usize;
            let kind = LittleEndian::read_u32(&data[pos + 4..pos + 8]);
            pos += CHUNK_HEADER_SIZE;

            let end = pos
                .checked_add(len)
                .filter(|end| *end <= total)
                .ok_or_else(|| {
                    Error::Format(format!("chunk {} overruns container ({} bytes at {})", index, len, pos))
                })?;
            let chunk = &data[pos..end];

            match (index, kind) {
                (0, CHUNK_JSON) => json = Some(chunk.to_vec()),
                (0, other) => {
                    return Err(Error::Format(format!(
                        "first chunk must be JSON, found 0x{:08X}",
                        other
                    )));
                }
                (1, CHUNK_BIN) => bin = Some(chunk.to_vec()),
                (_, other) => {
                    tracing::debug!(chunk = index, kind = other, len, "skipping container chunk");
                }
            }

            pos = end;
            index += 1;
        }

        let json = json.ok_or_else(|| Error::Format("missing JSON chunk".into()))?;
        Ok(Self { version, json, bin })
    }

    /// Encode a document and optional payload into container bytes.
    pub fn encode(json: &Value, bin: Option<&[u8]>) -> Result<Vec<u8>> {
        let json_bytes = serde_json::to_vec(json)?;
        let json_len = padded_len(json_bytes.len());
        let bin_len = bin.map(|b| padded_len(b.len()));

        let total = HEADER_SIZE
            + CHUNK_HEADER_SIZE
            + json_len
            + bin_len.map(|l| CHUNK_HEADER_SIZE + l).unwrap_or(0);
        let total_u32 = u32::try_from(total)
            .map_err(|_| Error::Format(format!("container of {} bytes exceeds u32 length", total)))?;

        let mut out = Cursor::new(Vec::with_capacity(total));
        out.write_u32::<LittleEndian>(GLB_MAGIC)?;
        out.write_u32::<LittleEndian>(GLB_VERSION)?;
        out.write_u32::<LittleEndian>(total_u32)?;

        out.write_u32::<LittleEndian>(json_len as u32)?;
        out.write_u32::<LittleEndian>(CHUNK_JSON)?;
        out.write_all(&json_bytes)?;
        out.write_all(&vec![b' '; json_len - json_bytes.len()])?;

        if let (Some(bin), Some(bin_len)) = (bin, bin_len) {
            out.write_u32::<LittleEndian>(bin_len as u32)?;
            out.write_u32::<LittleEndian>(CHUNK_BIN)?;
            out.write_all(bin)?;
            out.write_all(&vec![0u8; bin_len - bin.len()])?;
        }

        Ok(out.into_inner())
    }

    /// Container format version.
    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Raw JSON chunk bytes (may carry trailing space padding).
    #[inline]
    pub fn json_bytes(&self) -> &[u8] {
        &self.json
    }

    /// Parse the JSON chunk.
    pub fn document(&self) -> Result<Value> {
        Ok(serde_json::from_slice(&self.json)?)
    }

    /// BIN chunk payload, if present, including its zero padding.
    #[inline]
    pub fn bin(&self) -> Option<&[u8]> {
        self.bin.as_deref()
    }

    /// Split into the parsed document and the BIN payload.
    pub fn into_parts(self) -> Result<(Value, Option<Vec<u8>>)> {
        let doc = serde_json::from_slice(&self.json)?;
        Ok((doc, self.bin))
    }
}
