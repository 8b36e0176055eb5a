//! Accessors and their sparse blocks.

use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use tracing::debug;

use super::{record_common, BufferView};
use crate::access::{apply_sparse, StridedView, TypedArray};
use crate::graph::{
    load_extensions, Collection, FieldSlot, Link, Record, RecordBase, RecordContext, RecordKind,
    ReferenceField,
};
use crate::load::{join_all, LoadCell, LoadContext, LoadUnit};
use crate::util::{AccessorType, ComponentType, ElementLayout, Error, Result};

/// Typed, strided interpretation of a buffer view.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Accessor {
    #[serde(default)]
    pub buffer_view: Link<BufferView>,
    #[serde(default)]
    pub byte_offset: usize,
    pub component_type: ComponentType,
    #[serde(default)]
    pub normalized: bool,
    pub count: usize,
    #[serde(rename = "type")]
    pub accessor_type: AccessorType,
    #[serde(default)]
    pub min: Option<Vec<f64>>,
    #[serde(default)]
    pub max: Option<Vec<f64>>,
    #[serde(default)]
    pub sparse: Option<Sparse>,
    #[serde(flatten)]
    base: RecordBase,
    #[serde(skip)]
    dense: OnceCell<Arc<TypedArray>>,
    #[serde(skip)]
    decoded: OnceCell<Arc<TypedArray>>,
    #[serde(skip)]
    cell: LoadCell,
}

const ACCESSOR_FIELDS: &[ReferenceField] = &[
    ReferenceField::index("bufferView", Collection::BufferViews),
    ReferenceField::embedded("sparse"),
];

impl Accessor {
    #[inline]
    pub fn layout(&self) -> ElementLayout {
        ElementLayout::new(self.component_type, self.accessor_type)
    }

    /// Components in the dense array: `count` times the element width.
    pub fn component_count(&self) -> Result<usize> {
        self.count
            .checked_mul(self.accessor_type.num_components())
            .ok_or_else(|| {
                Error::invalid(format!(
                    "accessor count {} of {} overflows",
                    self.count, self.accessor_type
                ))
            })
    }

    /// True once an extension installed decoded data for this accessor.
    pub fn has_decoded(&self) -> bool {
        self.decoded.get().is_some()
    }

    /// Dense values of this accessor.
    ///
    /// Decoded data installed by an extension takes precedence. Otherwise the
    /// base view is read (zeros when there is none), sparse overrides are
    /// applied in place and normalized integers are converted to `f32`. The
    /// result is computed once.
    pub fn typed_array(&self) -> Result<Arc<TypedArray>> {
        if let Some(decoded) = self.decoded.get() {
            return Ok(Arc::clone(decoded));
        }
        self.dense
            .get_or_try_init(|| self.materialize().map(Arc::new))
            .cloned()
    }

    /// Install data produced by a decoder in place of the view contents.
    ///
    /// `array` must have this accessor's component type and size.
    pub fn set_decoded(&self, array: TypedArray) -> Result<()> {
        if array.component_type() != self.component_type {
            return Err(Error::decode(format!(
                "decoded {} data for a {} accessor",
                array.component_type(),
                self.component_type
            )));
        }
        let expected = self.component_count()?;
        if array.len() != expected {
            return Err(Error::decode(format!(
                "decoded {} components, accessor expects {}",
                array.len(),
                expected
            )));
        }
        let array = if self.normalized { array.normalized() } else { array };
        if self.decoded.set(Arc::new(array)).is_err() {
            debug!(count = self.count, "accessor already decoded, keeping the first result");
        }
        Ok(())
    }

    fn materialize(&self) -> Result<TypedArray> {
        let layout = self.layout();
        let mut dense = match self.buffer_view.resolve("bufferView")? {
            Some(view) => {
                let region = view.region()?;
                StridedView::new(&region, self.byte_offset, view.byte_stride, layout, self.count)?
                    .to_array()
            }
            None => TypedArray::zeroed(self.component_type, self.component_count()?),
        };
        if let Some(sparse) = &self.sparse {
            sparse.apply(&mut dense, layout, self.count)?;
        }
        Ok(if self.normalized { dense.normalized() } else { dense })
    }

    async fn load_views(&self, cx: &LoadContext) -> Result<()> {
        let mut units: Vec<LoadUnit<'_>> = Vec::new();
        if let Some(view) = self.buffer_view.resolve("bufferView")? {
            units.push(async move { view.load(cx).await }.boxed());
        }
        if let Some(sparse) = &self.sparse {
            units.push(sparse.load(cx));
        }
        join_all(units).await?;
        load_extensions(self, cx).await
    }
}

#[async_trait]
impl Record for Accessor {
    record_common!(RecordKind::Accessor);

    fn reference_fields(&self) -> &'static [ReferenceField] {
        ACCESSOR_FIELDS
    }

    fn field(&self, name: &str) -> Option<FieldSlot<'_>> {
        match name {
            "bufferView" => Some(FieldSlot::Index(&self.buffer_view)),
            "sparse" => Some(match &self.sparse {
                Some(sparse) => FieldSlot::Embedded(sparse),
                None => FieldSlot::Absent,
            }),
            _ => None,
        }
    }

    fn hydrate(&mut self, cx: &RecordContext<'_>) -> Result<()> {
        self.base.attach(RecordKind::Accessor, cx)?;
        if let Some(sparse) = &mut self.sparse {
            sparse.hydrate(cx)?;
        }
        Ok(())
    }

    async fn load(&self, cx: &LoadContext) -> Result<()> {
        self.cell.run(self.load_views(cx)).await
    }
}

/// Sparse overrides of an accessor.
#[derive(Debug, Deserialize)]
pub struct Sparse {
    pub count: usize,
    pub indices: SparseIndices,
    pub values: SparseValues,
    #[serde(flatten)]
    base: RecordBase,
}

const SPARSE_FIELDS: &[ReferenceField] = &[
    ReferenceField::embedded("indices"),
    ReferenceField::embedded("values"),
];

impl Sparse {
    fn apply(&self, dense: &mut TypedArray, layout: ElementLayout, count: usize) -> Result<()> {
        if self.count > count {
            return Err(Error::invalid(format!(
                "sparse count {} exceeds accessor count {}",
                self.count, count
            )));
        }
        if !self.indices.component_type.is_index_type() {
            return Err(Error::invalid(format!(
                "sparse indices of type {}",
                self.indices.component_type
            )));
        }
        let index_layout = ElementLayout::new(self.indices.component_type, AccessorType::Scalar);
        let index_region = self.indices.buffer_view.require("sparse.indices.bufferView")?.region()?;
        let value_region = self.values.buffer_view.require("sparse.values.bufferView")?.region()?;
        let indices = StridedView::new(
            &index_region,
            self.indices.byte_offset,
            None,
            index_layout,
            self.count,
        )?;
        let values = StridedView::new(&value_region, self.values.byte_offset, None, layout, self.count)?;
        apply_sparse(dense, count, &indices, &values)
    }
}

#[async_trait]
impl Record for Sparse {
    record_common!(RecordKind::Sparse);

    fn reference_fields(&self) -> &'static [ReferenceField] {
        SPARSE_FIELDS
    }

    fn field(&self, name: &str) -> Option<FieldSlot<'_>> {
        match name {
            "indices" => Some(FieldSlot::Embedded(&self.indices)),
            "values" => Some(FieldSlot::Embedded(&self.values)),
            _ => None,
        }
    }

    fn hydrate(&mut self, cx: &RecordContext<'_>) -> Result<()> {
        self.base.attach(RecordKind::Sparse, cx)?;
        self.indices.hydrate(cx)?;
        self.values.hydrate(cx)
    }

    async fn load(&self, cx: &LoadContext) -> Result<()> {
        join_all([self.indices.load(cx), self.values.load(cx)]).await?;
        load_extensions(self, cx).await
    }
}

const SPARSE_VIEW_FIELDS: &[ReferenceField] =
    &[ReferenceField::index("bufferView", Collection::BufferViews)];

/// Positions overridden by a sparse block.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SparseIndices {
    pub buffer_view: Link<BufferView>,
    #[serde(default)]
    pub byte_offset: usize,
    pub component_type: ComponentType,
    #[serde(flatten)]
    base: RecordBase,
}

/// Replacement elements of a sparse block.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SparseValues {
    pub buffer_view: Link<BufferView>,
    #[serde(default)]
    pub byte_offset: usize,
    #[serde(flatten)]
    base: RecordBase,
}

macro_rules! sparse_view_record {
    ($ty:ty, $kind:expr) => {
        #[async_trait]
        impl Record for $ty {
            record_common!($kind);

            fn reference_fields(&self) -> &'static [ReferenceField] {
                SPARSE_VIEW_FIELDS
            }

            fn field(&self, name: &str) -> Option<FieldSlot<'_>> {
                match name {
                    "bufferView" => Some(FieldSlot::Index(&self.buffer_view)),
                    _ => None,
                }
            }

            async fn load(&self, cx: &LoadContext) -> Result<()> {
                self.buffer_view.require("bufferView")?.load(cx).await?;
                load_extensions(self, cx).await
            }
        }
    };
}

sparse_view_record!(SparseIndices, RecordKind::SparseIndices);
sparse_view_record!(SparseValues, RecordKind::SparseValues);
