//! Dense typed arrays.

use crate::util::ComponentType;

/// A dense array of components of one [`ComponentType`].
#[derive(Clone, Debug, PartialEq)]
pub enum TypedArray {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    F32(Vec<f32>),
}

macro_rules! dispatch {
    ($self:expr, $v:ident => $body:expr) => {
        match $self {
            TypedArray::I8($v) => $body,
            TypedArray::U8($v) => $body,
            TypedArray::I16($v) => $body,
            TypedArray::U16($v) => $body,
            TypedArray::U32($v) => $body,
            TypedArray::F32($v) => $body,
        }
    };
}

impl TypedArray {
    /// `len` zeroed components of type `ct`.
    pub fn zeroed(ct: ComponentType, len: usize) -> Self {
        match ct {
            ComponentType::Int8 => Self::I8(vec![0; len]),
            ComponentType::Uint8 => Self::U8(vec![0; len]),
            ComponentType::Int16 => Self::I16(vec![0; len]),
            ComponentType::Uint16 => Self::U16(vec![0; len]),
            ComponentType::Uint32 => Self::U32(vec![0; len]),
            ComponentType::Float32 => Self::F32(vec![0.0; len]),
        }
    }

    /// Number of components (not elements).
    #[inline]
    pub fn len(&self) -> usize {
        dispatch!(self, v => v.len())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn component_type(&self) -> ComponentType {
        match self {
            Self::I8(_) => ComponentType::Int8,
            Self::U8(_) => ComponentType::Uint8,
            Self::I16(_) => ComponentType::Int16,
            Self::U16(_) => ComponentType::Uint16,
            Self::U32(_) => ComponentType::Uint32,
            Self::F32(_) => ComponentType::Float32,
        }
    }

    /// Native-endian byte view of the storage.
    pub fn as_bytes(&self) -> &[u8] {
        dispatch!(self, v => bytemuck::cast_slice(v.as_slice()))
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        dispatch!(self, v => bytemuck::cast_slice_mut(v.as_mut_slice()))
    }

    /// Component `i` widened to `f32`, without normalization.
    pub fn get_f32(&self, i: usize) -> Option<f32> {
        dispatch!(self, v => v.get(i).map(|&c| c as f32))
    }

    /// Component `i` as an unsigned index; `None` for signed or float arrays.
    pub fn get_index(&self, i: usize) -> Option<u32> {
        match self {
            Self::U8(v) => v.get(i).map(|&c| u32::from(c)),
            Self::U16(v) => v.get(i).map(|&c| u32::from(c)),
            Self::U32(v) => v.get(i).copied(),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            Self::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<&[u32]> {
        match self {
            Self::U32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<&[u16]> {
        match self {
            Self::U16(v) => Some(v),
            _ => None,
        }
    }

    /// Copy components `[src, src + n)` of `from` into `[dst, dst + n)` of
    /// `self`. Both arrays must share a component type.
    pub(crate) fn copy_components(&mut self, dst: usize, from: &TypedArray, src: usize, n: usize) -> bool {
        macro_rules! copy {
            ($a:expr, $b:expr) => {{
                match ($a.get_mut(dst..dst + n), $b.get(src..src + n)) {
                    (Some(d), Some(s)) => {
                        d.copy_from_slice(s);
                        true
                    }
                    _ => false,
                }
            }};
        }
        match (self, from) {
            (Self::I8(a), Self::I8(b)) => copy!(a, b),
            (Self::U8(a), Self::U8(b)) => copy!(a, b),
            (Self::I16(a), Self::I16(b)) => copy!(a, b),
            (Self::U16(a), Self::U16(b)) => copy!(a, b),
            (Self::U32(a), Self::U32(b)) => copy!(a, b),
            (Self::F32(a), Self::F32(b)) => copy!(a, b),
            _ => false,
        }
    }

    /// Fixed-point conversion to `f32`.
    ///
    /// Signed types map to `[-1, 1]` (the most negative value clamps to -1),
    /// unsigned types to `[0, 1]`. Float arrays are returned unchanged.
    pub fn normalized(&self) -> TypedArray {
        let ct = self.component_type();
        if ct == ComponentType::Float32 {
            return self.clone();
        }
        let max = ct.normalization_max();
        let signed = ct.is_signed();
        let out = (0..self.len())
            .map(|i| {
                let c = self.get_f32(i).unwrap_or(0.0) / max;
                if signed {
                    c.max(-1.0)
                } else {
                    c
                }
            })
            .collect();
        Self::F32(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_and_bytes() {
        let mut a = TypedArray::zeroed(ComponentType::Uint16, 3);
        assert_eq!(a.len(), 3);
        assert_eq!(a.as_bytes().len(), 6);
        a.as_bytes_mut().copy_from_slice(bytemuck::cast_slice(&[1u16, 2, 3]));
        assert_eq!(a.as_u16(), Some(&[1u16, 2, 3][..]));
        assert_eq!(a.get_index(2), Some(3));
    }

    #[test]
    fn test_normalization() {
        let a = TypedArray::I8(vec![-128, -127, 0, 127]).normalized();
        assert_eq!(a.as_f32().unwrap(), &[-1.0, -1.0, 0.0, 1.0]);

        let a = TypedArray::U8(vec![0, 255]).normalized();
        assert_eq!(a.as_f32().unwrap(), &[0.0, 1.0]);

        let a = TypedArray::U16(vec![u16::MAX]).normalized();
        assert_eq!(a.as_f32().unwrap(), &[1.0]);

        let f = TypedArray::F32(vec![2.5]);
        assert_eq!(f.normalized(), f);
    }

    #[test]
    fn test_copy_components() {
        let mut a = TypedArray::zeroed(ComponentType::Float32, 4);
        let b = TypedArray::F32(vec![7.0, 8.0]);
        assert!(a.copy_components(2, &b, 0, 2));
        assert_eq!(a.as_f32().unwrap(), &[0.0, 0.0, 7.0, 8.0]);
        assert!(!a.copy_components(3, &b, 0, 2));
        assert!(!a.copy_components(0, &TypedArray::U8(vec![1]), 0, 1));
    }
}
