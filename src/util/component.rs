//! Component and element types used by accessors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric component type of an accessor, identified by its GL enum value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
#[repr(u32)]
pub enum ComponentType {
    /// Signed 8-bit integer
    Int8 = 5120,
    /// Unsigned 8-bit integer
    Uint8 = 5121,
    /// Signed 16-bit integer
    Int16 = 5122,
    /// Unsigned 16-bit integer
    Uint16 = 5123,
    /// Unsigned 32-bit integer
    Uint32 = 5125,
    /// 32-bit floating point (IEEE 754 single precision)
    Float32 = 5126,
}

impl ComponentType {
    /// Returns the size in bytes of a single component.
    #[inline]
    pub const fn num_bytes(self) -> usize {
        match self {
            Self::Int8 | Self::Uint8 => 1,
            Self::Int16 | Self::Uint16 => 2,
            Self::Uint32 | Self::Float32 => 4,
        }
    }

    /// Returns the name of this type as a string.
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Int8 => "int8_t",
            Self::Uint8 => "uint8_t",
            Self::Int16 => "int16_t",
            Self::Uint16 => "uint16_t",
            Self::Uint32 => "uint32_t",
            Self::Float32 => "float32_t",
        }
    }

    /// Convert from the GL enum value.
    pub const fn from_gl(v: u32) -> Option<Self> {
        match v {
            5120 => Some(Self::Int8),
            5121 => Some(Self::Uint8),
            5122 => Some(Self::Int16),
            5123 => Some(Self::Uint16),
            5125 => Some(Self::Uint32),
            5126 => Some(Self::Float32),
            _ => None,
        }
    }

    /// Returns true if this is an integer type.
    #[inline]
    pub const fn is_integer(self) -> bool {
        !matches!(self, Self::Float32)
    }

    /// Returns true for the unsigned types allowed as sparse or primitive indices.
    #[inline]
    pub const fn is_index_type(self) -> bool {
        matches!(self, Self::Uint8 | Self::Uint16 | Self::Uint32)
    }

    /// Divisor used by the fixed-point conversion of normalized data.
    #[inline]
    pub const fn normalization_max(self) -> f32 {
        match self {
            Self::Int8 => i8::MAX as f32,
            Self::Uint8 => u8::MAX as f32,
            Self::Int16 => i16::MAX as f32,
            Self::Uint16 => u16::MAX as f32,
            Self::Uint32 => u32::MAX as f32,
            Self::Float32 => 1.0,
        }
    }

    /// Signed types clamp to -1.0 after normalization.
    #[inline]
    pub const fn is_signed(self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Float32)
    }
}

impl TryFrom<u32> for ComponentType {
    type Error = String;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        Self::from_gl(v).ok_or_else(|| format!("unknown componentType {}", v))
    }
}

impl From<ComponentType> for u32 {
    fn from(v: ComponentType) -> u32 {
        v as u32
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Shape of a single accessor element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessorType {
    Scalar,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
}

impl AccessorType {
    /// Number of components per element.
    #[inline]
    pub const fn num_components(self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 | Self::Mat2 => 4,
            Self::Mat3 => 9,
            Self::Mat4 => 16,
        }
    }

    /// Number of columns; vectors and scalars are a single column.
    #[inline]
    pub const fn num_columns(self) -> usize {
        match self {
            Self::Mat2 => 2,
            Self::Mat3 => 3,
            Self::Mat4 => 4,
            _ => 1,
        }
    }

    /// Returns the wire name of this type.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Scalar => "SCALAR",
            Self::Vec2 => "VEC2",
            Self::Vec3 => "VEC3",
            Self::Vec4 => "VEC4",
            Self::Mat2 => "MAT2",
            Self::Mat3 => "MAT3",
            Self::Mat4 => "MAT4",
        }
    }
}

impl fmt::Display for AccessorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Byte layout of one accessor element: component type plus shape.
///
/// Matrix columns start on 4-byte boundaries, so `MAT2` of bytes and
/// `MAT3` of bytes/shorts carry padding between columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ElementLayout {
    pub component_type: ComponentType,
    pub accessor_type: AccessorType,
}

impl ElementLayout {
    pub const fn new(component_type: ComponentType, accessor_type: AccessorType) -> Self {
        Self { component_type, accessor_type }
    }

    /// Components per element.
    #[inline]
    pub const fn components(&self) -> usize {
        self.accessor_type.num_components()
    }

    /// Rows per column.
    #[inline]
    pub const fn rows(&self) -> usize {
        self.accessor_type.num_components() / self.accessor_type.num_columns()
    }

    /// Distance in bytes between the starts of two columns.
    #[inline]
    pub const fn column_stride(&self) -> usize {
        let raw = self.rows() * self.component_type.num_bytes();
        if self.accessor_type.num_columns() > 1 {
            (raw + 3) & !3
        } else {
            raw
        }
    }

    /// Size in bytes of one tightly packed element, including column padding.
    #[inline]
    pub const fn element_size(&self) -> usize {
        self.column_stride() * self.accessor_type.num_columns()
    }

    /// Byte offset of component `c` inside an element.
    #[inline]
    pub const fn component_offset(&self, c: usize) -> usize {
        let rows = self.rows();
        (c / rows) * self.column_stride() + (c % rows) * self.component_type.num_bytes()
    }
}
