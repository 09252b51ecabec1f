//! Per-node extraction rules.
//!
//! Each element kind with its own way of carrying an image is mapped to a
//! [`Rule`] in [`KIND_RULES`]. Every node additionally has its style scanned
//! for `url()` references; non-replaced elements also have their `::before`
//! and `::after` generated content scanned.

use crate::codec::ImageKind;
use crate::css;
use crate::document::{Declarations, Document, Node, NodeId, NodeKind};
use crate::loader::{short, ImageLoader};
use crate::surface::Surface;
use crate::types::{Candidate, HarvestResult};

/// How an element kind exposes an image of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    /// The resolved `currentSrc`.
    CurrentSource,
    /// SVG `<image href>` / `xlink:href`.
    VectorHref,
    /// A plugin resource locator, kept only if it loads as an image.
    ProbedSource(&'static str),
    /// Frame `src`, kept only if it loads as an image and no `srcdoc` is set.
    FrameSource,
    /// Current pixels, unless the canvas is blank.
    CanvasSnapshot,
    /// Current frame if one is buffered, plus the poster.
    VideoFrame,
}

const KIND_RULES: &[(NodeKind, Rule)] = &[
    (NodeKind::Image, Rule::CurrentSource),
    (NodeKind::SvgImage, Rule::VectorHref),
    (NodeKind::Embed, Rule::ProbedSource("src")),
    (NodeKind::Object, Rule::ProbedSource("data")),
    (NodeKind::Frame, Rule::FrameSource),
    (NodeKind::Canvas, Rule::CanvasSnapshot),
    (NodeKind::Video, Rule::VideoFrame),
];

/// Image-bearing properties scanned on every node.
const STYLE_PROPERTIES: &[&str] = &["background-image", "border-image-source", "mask-image"];

const LIST_STYLE_PROPERTY: &str = "list-style-image";
const CONTENT_PROPERTY: &str = "content";

fn rule_for(kind: NodeKind) -> Option<Rule> {
    KIND_RULES
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, rule)| *rule)
}

/// Extracts raw candidates from a single node (never its descendants).
pub struct NodeExtractor<'a> {
    loader: &'a ImageLoader<'a>,
}

impl<'a> NodeExtractor<'a> {
    pub fn new(loader: &'a ImageLoader<'a>) -> Self {
        Self { loader }
    }

    pub fn document(&self) -> &'a Document {
        self.loader.document()
    }

    /// Raw candidates for one node, in rule order then style order.
    ///
    /// Rules that cannot resolve a value are skipped; only a malformed style
    /// value fails the call.
    pub async fn extract(&self, id: NodeId) -> HarvestResult<Vec<Candidate>> {
        let node = self.document().node(id)?;
        let mut found = Vec::new();

        if let Some(rule) = rule_for(node.kind) {
            self.apply(rule, node, &mut found).await;
        }

        let mut properties: Vec<&str> = Vec::with_capacity(STYLE_PROPERTIES.len() + 2);
        if node.kind == NodeKind::ListItem {
            properties.push(LIST_STYLE_PROPERTY);
        }
        properties.extend_from_slice(STYLE_PROPERTIES);

        for decls in [&node.inline_style, &node.computed_style] {
            self.scan_style(decls, &properties, &mut found)?;
        }

        if !node.kind.is_replaced() {
            properties.push(CONTENT_PROPERTY);
            for decls in [node.before.as_ref(), node.after.as_ref()].into_iter().flatten() {
                self.scan_style(decls, &properties, &mut found)?;
            }
        }

        Ok(found.into_iter().map(Candidate::raw).collect())
    }

    async fn apply(&self, rule: Rule, node: &Node, found: &mut Vec<String>) {
        let doc = self.document();
        match rule {
            Rule::CurrentSource => {
                if let Some(src) = node.current_src.as_deref().and_then(|s| doc.resolve(s)) {
                    found.push(src);
                }
            }
            Rule::VectorHref => {
                let href = node.attr("href").or_else(|| node.attr("xlink:href"));
                if let Some(url) = href.and_then(|h| doc.resolve(h)) {
                    found.push(url);
                }
            }
            Rule::ProbedSource(attr) => {
                if let Some(url) = node.attr(attr).and_then(|s| doc.resolve(s)) {
                    self.push_if_image(url, found).await;
                }
            }
            Rule::FrameSource => {
                if node.attr("srcdoc").is_some() {
                    return;
                }
                if let Some(url) = node.attr("src").and_then(|s| doc.resolve(s)) {
                    self.push_if_image(url, found).await;
                }
            }
            Rule::CanvasSnapshot => {
                let Some(pixels) = node.canvas.as_ref() else {
                    return;
                };
                if Surface::is_blank(pixels) {
                    tracing::debug!("Skipping blank {}x{} canvas", pixels.width(), pixels.height());
                    return;
                }
                match Surface::from_pixels(pixels.clone()).to_data_url(ImageKind::Png) {
                    Ok(data) => found.push(data),
                    Err(e) => tracing::debug!("Canvas snapshot failed: {e}"),
                }
            }
            Rule::VideoFrame => {
                if let Some(video) = node.video.as_ref().filter(|v| v.has_current_frame()) {
                    if let Some(frame) = video.frame.as_ref() {
                        let (w, h) = if video.width > 0 && video.height > 0 {
                            (video.width, video.height)
                        } else {
                            frame.dimensions()
                        };
                        let mut surface = Surface::new();
                        surface.draw_scaled(frame, w, h);
                        match surface.to_data_url(ImageKind::Png) {
                            Ok(data) => found.push(data),
                            Err(e) => tracing::debug!("Video frame snapshot failed: {e}"),
                        }
                    }
                }
                if let Some(poster) = node.attr("poster").and_then(|p| doc.resolve(p)) {
                    found.push(poster);
                }
            }
        }
    }

    async fn push_if_image(&self, url: String, found: &mut Vec<String>) {
        if self.loader.probe(&url).await {
            found.push(url);
        } else {
            tracing::debug!("Embedded resource is not an image: {}", short(&url));
        }
    }

    fn scan_style(
        &self,
        decls: &Declarations,
        properties: &[&str],
        found: &mut Vec<String>,
    ) -> HarvestResult<()> {
        let doc = self.document();
        for property in properties {
            let Some(value) = decls.get(*property) else {
                continue;
            };
            for url in css::extract_urls(value)? {
                if let Some(resolved) = doc.resolve(&url) {
                    found.push(resolved);
                }
            }
        }
        Ok(())
    }
}
