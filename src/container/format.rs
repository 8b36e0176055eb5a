//! Binary container (GLB) constants.

/// Magic number at the start of a container, `b"glTF"` read as little-endian u32.
pub const GLB_MAGIC: u32 = 0x4654_6C67;

/// Container version this reader understands.
pub const GLB_VERSION: u32 = 2;

/// Size of the container header (magic, version, total length).
pub const HEADER_SIZE: usize = 12;

/// Size of a chunk header (length, type).
pub const CHUNK_HEADER_SIZE: usize = 8;

/// Chunk type of the JSON document, `b"JSON"`.
pub const CHUNK_JSON: u32 = 0x4E4F_534A;

/// Chunk type of the binary payload, `b"BIN\0"`.
pub const CHUNK_BIN: u32 = 0x004E_4942;

/// Chunk payloads are aligned to this many bytes.
pub const CHUNK_ALIGNMENT: usize = 4;

/// Returns true if `data` starts with the container magic.
#[inline]
pub fn has_magic(data: &[u8]) -> bool {
    data.len() >= 4 && u32::from_le_bytes([data[0], data[1], data[2], data[3]]) == GLB_MAGIC
}

/// Round `len` up to the chunk alignment.
#[inline]
pub const fn padded_len(len: usize) -> usize {
    (len + CHUNK_ALIGNMENT - 1) & !(CHUNK_ALIGNMENT - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic() {
        assert_eq!(&GLB_MAGIC.to_le_bytes(), b"glTF");
        assert_eq!(&CHUNK_JSON.to_le_bytes(), b"JSON");
        assert_eq!(&CHUNK_BIN.to_le_bytes(), b"BIN\0");
        assert!(has_magic(b"glTF\x02\0\0\0"));
        assert!(!has_magic(b"{\"asset\""));
        assert!(!has_magic(b"gl"));
    }

    #[test]
    fn test_padding() {
        assert_eq!(padded_len(0), 0);
        assert_eq!(padded_len(1), 4);
        assert_eq!(padded_len(4), 4);
        assert_eq!(padded_len(10), 12);
    }
}
