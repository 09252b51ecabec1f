//! Scheme-aware image loading, shared by probing and normalization.

use std::time::Duration;

use image::DynamicImage;
use url::Url;

use crate::codec;
use crate::document::Document;
use crate::fetch::{FetchRequest, Fetcher};
use crate::types::{HarvestError, HarvestResult, Scheme};

/// Loads the bytes behind any reference a page can hold.
pub struct ImageLoader<'a> {
    document: &'a Document,
    fetcher: &'a dyn Fetcher,
    timeout: Duration,
}

impl<'a> ImageLoader<'a> {
    pub fn new(document: &'a Document, fetcher: &'a dyn Fetcher, timeout: Duration) -> Self {
        Self {
            document,
            fetcher,
            timeout,
        }
    }

    pub fn document(&self) -> &'a Document {
        self.document
    }

    /// Raw bytes for a reference, dispatched on its scheme.
    pub async fn bytes(&self, reference: &str) -> HarvestResult<Vec<u8>> {
        match Scheme::of(reference) {
            Scheme::Embedded => Ok(codec::parse_data_url(reference)?.bytes),
            Scheme::LocalFile => {
                let url = Url::parse(reference)
                    .map_err(|e| HarvestError::InvalidInput(format!("Invalid file URL: {e}")))?;
                let path = url.to_file_path().map_err(|_| {
                    HarvestError::InvalidInput(format!("Not a local path: {reference}"))
                })?;
                Ok(tokio::fs::read(path).await?)
            }
            Scheme::Blob => self
                .document
                .blob(reference)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| HarvestError::Fetch(format!("Blob not available: {reference}"))),
            Scheme::Other => {
                let request = FetchRequest::new(reference, self.timeout)
                    .with_cookie(self.document.cookie());
                self.fetcher.fetch(&request).await
            }
        }
    }

    /// Load and decode a reference into an image surface, bounded by the timeout.
    pub async fn load(&self, reference: &str) -> HarvestResult<DynamicImage> {
        let bytes = tokio::time::timeout(self.timeout, self.bytes(reference))
            .await
            .map_err(|_| HarvestError::Timeout(self.timeout.as_millis() as u64))??;
        if bytes.is_empty() {
            return Err(HarvestError::InvalidInput("Empty resource".to_string()));
        }
        Ok(image::load_from_memory(&bytes)?)
    }

    /// Whether the reference resolves to a loadable image. Never fails.
    pub async fn probe(&self, reference: &str) -> bool {
        match self.load(reference).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Probe rejected {}: {e}", short(reference));
                false
            }
        }
    }
}

/// Shorten long references (mostly data URLs) for log lines.
pub(crate) fn short(reference: &str) -> &str {
    match reference.char_indices().nth(96) {
        Some((idx, _)) => &reference[..idx],
        None => reference,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode, to_data_url, ImageKind};
    use async_trait::async_trait;

    struct NoNetwork;

    #[async_trait]
    impl Fetcher for NoNetwork {
        async fn fetch(&self, request: &FetchRequest) -> HarvestResult<Vec<u8>> {
            Err(HarvestError::Fetch(format!("offline: {}", request.url)))
        }
    }

    fn png() -> Vec<u8> {
        encode(&DynamicImage::new_rgb8(3, 3), ImageKind::Png).unwrap()
    }

    #[tokio::test]
    async fn test_loads_embedded_and_blob() {
        use base64::Engine;
        let blob = base64::engine::general_purpose::STANDARD.encode(png());
        let json = serde_json::json!({
            "url": "https://example.com/",
            "blobs": { "blob:https://example.com/42": blob },
            "root": { "tag": "html" }
        });
        let doc = Document::from_json(&json.to_string()).unwrap();
        let loader = ImageLoader::new(&doc, &NoNetwork, Duration::from_secs(1));

        assert!(loader.probe(&to_data_url(&png(), ImageKind::Png)).await);
        assert!(loader.probe("blob:https://example.com/42").await);
        assert!(!loader.probe("blob:https://example.com/43").await);
        assert!(!loader.probe("https://example.com/a.png").await);
        assert!(!loader.probe("data:text/plain,hello").await);
    }

    #[tokio::test]
    async fn test_loads_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.png");
        std::fs::write(&path, png()).unwrap();
        let url = Url::from_file_path(&path).unwrap().to_string();

        let doc = Document::new("file:///tmp/page.html");
        let loader = ImageLoader::new(&doc, &NoNetwork, Duration::from_secs(1));
        let img = loader.load(&url).await.unwrap();
        assert_eq!((img.width(), img.height()), (3, 3));
        assert!(!loader.probe("file:///definitely/missing.png").await);
    }
}
