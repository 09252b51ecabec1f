//! Spatially bounded traversal over a document and its shadow trees.

use crate::document::NodeId;
use crate::extract::NodeExtractor;
use crate::types::{Candidate, HarvestResult, SpatialRegion};

/// Walks descendants of a root, extracting only from nodes near the touch point.
pub struct SpatialWalker<'a> {
    extractor: &'a NodeExtractor<'a>,
    region: SpatialRegion,
}

impl<'a> SpatialWalker<'a> {
    pub fn new(extractor: &'a NodeExtractor<'a>, region: SpatialRegion) -> Self {
        Self { extractor, region }
    }

    /// Candidates from `root` and every descendant whose box meets the region.
    ///
    /// Nodes are visited in tree order starting at `root` itself, so styles on
    /// the document element are scanned too. A shadow host's sub-tree is walked
    /// right after the host itself, whether or not the host was in range.
    /// Nodes without layout information are always eligible.
    pub async fn walk(&self, root: NodeId) -> HarvestResult<Vec<Candidate>> {
        let document = self.extractor.document();
        let scroll = document.scroll();
        let mut found = Vec::new();
        let mut visited = 0usize;
        let mut extracted = 0usize;

        for id in std::iter::once(root).chain(document.descendants(root)) {
            visited += 1;
            let node = document.node(id)?;
            if let Some(rect) = node.rect.as_ref() {
                if !self.region.intersects(rect, scroll) {
                    continue;
                }
            }
            extracted += 1;
            found.extend(self.extractor.extract(id).await?);
        }

        tracing::debug!(
            "Walked {visited} nodes, extracted from {extracted}, found {} candidates",
            found.len()
        );
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::fetch::{FetchRequest, Fetcher};
    use crate::loader::ImageLoader;
    use crate::types::HarvestError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    struct NoNetwork;

    #[async_trait]
    impl Fetcher for NoNetwork {
        async fn fetch(&self, _request: &FetchRequest) -> HarvestResult<Vec<u8>> {
            Err(HarvestError::Fetch("offline".into()))
        }
    }

    fn img(src: &str, left: f64, top: f64) -> serde_json::Value {
        json!({
            "tag": "img",
            "currentSrc": src,
            "rect": { "left": left, "top": top, "width": 50, "height": 50 }
        })
    }

    fn page() -> Document {
        let json = json!({
            "url": "https://example.com/",
            "scroll": { "x": 0, "y": 1000 },
            "root": { "tag": "html", "children": [
                { "tag": "body", "children": [
                    img("https://example.com/near.png", 80.0, 80.0),
                    img("https://example.com/far.png", 600.0, 600.0),
                    { "tag": "div", "rect": { "left": 2000, "top": 2000, "width": 10, "height": 10 },
                      "shadowRoot": { "mode": "closed", "children": [
                          img("https://example.com/shadow.png", 90.0, 90.0)
                      ]},
                      "children": [ img("https://example.com/light.png", 100.0, 100.0) ]
                    },
                    { "tag": "img", "currentSrc": "https://example.com/nolayout.png" }
                ]}
            ]}
        });
        Document::from_json(&json.to_string()).unwrap()
    }

    async fn walk(doc: &Document, x: f64, y: f64) -> Vec<String> {
        let loader = ImageLoader::new(doc, &NoNetwork, Duration::from_secs(1));
        let extractor = NodeExtractor::new(&loader);
        let region = SpatialRegion::around(x, y, doc.scroll());
        let walker = SpatialWalker::new(&extractor, region);
        walker
            .walk(doc.root())
            .await
            .unwrap()
            .into_iter()
            .filter_map(|c| c.data)
            .collect()
    }

    #[tokio::test]
    async fn test_prunes_by_region_and_enters_shadow_roots() {
        let doc = page();
        let found = walk(&doc, 100.0, 100.0).await;
        assert_eq!(
            found,
            vec![
                "https://example.com/near.png",
                "https://example.com/shadow.png",
                "https://example.com/light.png",
                "https://example.com/nolayout.png",
            ]
        );
    }

    #[tokio::test]
    async fn test_root_element_styles_are_scanned() {
        let json = json!({
            "url": "https://example.com/",
            "root": { "tag": "html",
              "computedStyle": { "background-image": "url(\"/page-bg.png\")" },
              "children": [ img("https://example.com/near.png", 0.0, 0.0) ] }
        });
        let doc = Document::from_json(&json.to_string()).unwrap();
        let found = walk(&doc, 10.0, 10.0).await;
        assert_eq!(
            found,
            vec!["https://example.com/page-bg.png", "https://example.com/near.png"]
        );
    }

    #[tokio::test]
    async fn test_far_point_only_sees_unlaid_out_nodes() {
        let doc = page();
        let found = walk(&doc, 5000.0, 5000.0).await;
        assert_eq!(found, vec!["https://example.com/nolayout.png"]);
    }
}
