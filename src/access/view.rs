//! Strided element reads over a byte region.

use byteorder::{ByteOrder, LittleEndian};

use super::TypedArray;
use crate::util::{ComponentType, ElementLayout, Error, Result};

/// `count` elements of `layout`, starting at `offset`, `stride` bytes apart.
#[derive(Clone, Copy, Debug)]
pub struct StridedView<'a> {
    bytes: &'a [u8],
    offset: usize,
    stride: usize,
    layout: ElementLayout,
    count: usize,
}

impl<'a> StridedView<'a> {
    /// Validate that every element lies inside `bytes`.
    ///
    /// `stride` of `None` means tightly packed.
    pub fn new(
        bytes: &'a [u8],
        offset: usize,
        stride: Option<usize>,
        layout: ElementLayout,
        count: usize,
    ) -> Result<Self> {
        let element_size = layout.element_size();
        let stride = stride.unwrap_or(element_size);
        if stride < element_size {
            return Err(Error::invalid(format!(
                "byteStride {} is smaller than the element size {}",
                stride, element_size
            )));
        }
        if count > 0 {
            let end = (count - 1)
                .checked_mul(stride)
                .and_then(|n| n.checked_add(offset))
                .and_then(|n| n.checked_add(element_size))
                .ok_or_else(|| Error::invalid("strided view size overflows"))?;
            if end > bytes.len() {
                return Err(Error::invalid(format!(
                    "{} elements of {}x{} at offset {} (stride {}) need {} bytes, region has {}",
                    count,
                    layout.accessor_type,
                    layout.component_type,
                    offset,
                    stride,
                    end,
                    bytes.len()
                )));
            }
        }
        Ok(Self {
            bytes,
            offset,
            stride,
            layout,
            count,
        })
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn layout(&self) -> ElementLayout {
        self.layout
    }

    /// Materialize all elements into a fresh dense array.
    pub fn to_array(&self) -> TypedArray {
        let components = self.layout.components();
        let mut out = TypedArray::zeroed(self.layout.component_type, self.count * components);
        for i in 0..self.count {
            self.write_element(i, &mut out, i);
        }
        out
    }

    /// Copy element `src` of this view into element slot `dst` of `out`.
    ///
    /// `out` must have this view's component type; indices are checked by
    /// the constructor and callers.
    pub(crate) fn write_element(&self, src: usize, out: &mut TypedArray, dst: usize) {
        let components = self.layout.components();
        let base = self.offset + src * self.stride;
        for c in 0..components {
            let pos = base + self.layout.component_offset(c);
            let at = dst * components + c;
            let b = &self.bytes[pos..];
            match out {
                TypedArray::I8(v) => v[at] = b[0] as i8,
                TypedArray::U8(v) => v[at] = b[0],
                TypedArray::I16(v) => v[at] = LittleEndian::read_i16(b),
                TypedArray::U16(v) => v[at] = LittleEndian::read_u16(b),
                TypedArray::U32(v) => v[at] = LittleEndian::read_u32(b),
                TypedArray::F32(v) => v[at] = LittleEndian::read_f32(b),
            }
        }
    }

    /// Read element `i` as an unsigned index.
    pub fn index_at(&self, i: usize) -> Result<u32> {
        if i >= self.count {
            return Err(Error::invalid(format!("index {} past view of {}", i, self.count)));
        }
        let b = &self.bytes[self.offset + i * self.stride..];
        match self.layout.component_type {
            ComponentType::Uint8 => Ok(u32::from(b[0])),
            ComponentType::Uint16 => Ok(u32::from(LittleEndian::read_u16(b))),
            ComponentType::Uint32 => Ok(LittleEndian::read_u32(b)),
            other => Err(Error::invalid(format!("{} is not an index type", other))),
        }
    }
}
