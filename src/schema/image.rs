//! Encoded images.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde::Deserialize;

use super::{record_common, BufferView};
use crate::graph::{
    load_extensions, Collection, FieldSlot, Link, Record, RecordBase, RecordKind, ReferenceField,
};
use crate::load::{LoadCell, LoadContext};
use crate::util::{Error, Result};

/// Image data referenced by a URI or a buffer view. Pixels are not decoded.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub buffer_view: Link<BufferView>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(flatten)]
    base: RecordBase,
    #[serde(skip)]
    bytes: OnceCell<Arc<[u8]>>,
    #[serde(skip)]
    cell: LoadCell,
}

const IMAGE_FIELDS: &[ReferenceField] =
    &[ReferenceField::index("bufferView", Collection::BufferViews)];

impl Image {
    /// Encoded image bytes once loaded.
    pub fn bytes(&self) -> Option<&[u8]> {
        self.bytes.get().map(|b| &b[..])
    }

    async fn fetch(&self, cx: &LoadContext) -> Result<()> {
        if self.bytes.get().is_none() {
            let bytes: Arc<[u8]> = match (&self.uri, self.buffer_view.resolve("bufferView")?) {
                (Some(uri), _) => cx.fetch_relative(self.base.source(), uri).await?.into(),
                (None, Some(view)) => {
                    view.load(cx).await?;
                    Arc::from(&*view.region()?)
                }
                (None, None) => {
                    return Err(Error::invalid("image has neither a uri nor a bufferView"))
                }
            };
            let _ = self.bytes.set(bytes);
        }
        load_extensions(self, cx).await
    }
}

#[async_trait]
impl Record for Image {
    record_common!(RecordKind::Image);

    fn reference_fields(&self) -> &'static [ReferenceField] {
        IMAGE_FIELDS
    }

    fn field(&self, name: &str) -> Option<FieldSlot<'_>> {
        match name {
            "bufferView" => Some(FieldSlot::Index(&self.buffer_view)),
            _ => None,
        }
    }

    async fn load(&self, cx: &LoadContext) -> Result<()> {
        self.cell.run(self.fetch(cx)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::{CancellationToken, MemoryFetcher};

    #[tokio::test]
    async fn test_data_uri_image() {
        let image: Image = serde_json::from_str(
            r#"{"uri": "data:image/png;base64,iVBORw==", "mimeType": "image/png"}"#,
        )
        .unwrap();
        let cx = LoadContext::new(Arc::new(MemoryFetcher::new()), CancellationToken::new());
        image.load(&cx).await.unwrap();
        assert_eq!(image.bytes().unwrap(), &[0x89, b'P', b'N', b'G']);
    }

    #[tokio::test]
    async fn test_image_without_source() {
        let image: Image = serde_json::from_str("{}").unwrap();
        let cx = LoadContext::new(Arc::new(MemoryFetcher::new()), CancellationToken::new());
        let err = image.load(&cx).await.unwrap_err();
        assert!(matches!(err.root(), Error::InvalidStructure(_)));
    }
}
