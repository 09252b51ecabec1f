//! Arena document model and the serde page snapshot it is built from.
//!
//! A renderer (or a content script) dumps the laid-out page as a nested
//! [`PageSnapshot`]. The pipeline never walks the nested form directly: it is
//! flattened into a [`Document`] arena addressed by [`NodeId`], with one
//! child-expansion primitive ([`Document::expand`]) covering both light
//! children and isolated shadow sub-trees.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use base64::Engine;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::{HarvestError, HarvestResult, Rect};

/// `HTMLMediaElement.HAVE_CURRENT_DATA`: a frame is available for drawing.
pub const HAVE_CURRENT_DATA: u8 = 2;

/// Property name → value, with kebab-case property names.
pub type Declarations = BTreeMap<String, String>;

/// Index of a node inside a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The element kinds that carry their own extraction rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Image,
    SvgImage,
    Embed,
    Object,
    Frame,
    Canvas,
    Video,
    ListItem,
    Other,
}

const TAG_KINDS: &[(&str, NodeKind)] = &[
    ("img", NodeKind::Image),
    ("image", NodeKind::SvgImage),
    ("embed", NodeKind::Embed),
    ("object", NodeKind::Object),
    ("iframe", NodeKind::Frame),
    ("frame", NodeKind::Frame),
    ("canvas", NodeKind::Canvas),
    ("video", NodeKind::Video),
    ("li", NodeKind::ListItem),
];

impl NodeKind {
    pub fn from_tag(tag: &str) -> Self {
        let tag = tag.to_ascii_lowercase();
        TAG_KINDS
            .iter()
            .find(|(name, _)| *name == tag)
            .map(|(_, kind)| *kind)
            .unwrap_or(NodeKind::Other)
    }

    /// Replaced elements render their own content, so `::before`/`::after`
    /// never show up on them.
    pub fn is_replaced(self) -> bool {
        matches!(
            self,
            NodeKind::Image
                | NodeKind::SvgImage
                | NodeKind::Embed
                | NodeKind::Object
                | NodeKind::Frame
                | NodeKind::Canvas
                | NodeKind::Video
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShadowMode {
    #[default]
    Open,
    Closed,
}

#[derive(Debug, Clone)]
pub struct ShadowRoot {
    pub mode: ShadowMode,
    pub children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct VideoState {
    pub ready_state: u8,
    pub width: u32,
    pub height: u32,
    pub frame: Option<RgbaImage>,
}

impl VideoState {
    pub fn has_current_frame(&self) -> bool {
        self.ready_state >= HAVE_CURRENT_DATA && self.frame.is_some()
    }
}

/// One structural element of the page.
#[derive(Debug, Clone)]
pub struct Node {
    pub tag: String,
    pub kind: NodeKind,
    pub attributes: BTreeMap<String, String>,
    pub current_src: Option<String>,
    /// Viewport rect; `None` when layout is unknown.
    pub rect: Option<Rect>,
    pub inline_style: Declarations,
    pub computed_style: Declarations,
    pub before: Option<Declarations>,
    pub after: Option<Declarations>,
    pub canvas: Option<RgbaImage>,
    pub video: Option<VideoState>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub shadow_root: Option<ShadowRoot>,
}

impl Node {
    pub fn new(tag: impl Into<String>) -> Self {
        let tag: String = tag.into();
        let tag = tag.to_ascii_lowercase();
        Self {
            kind: NodeKind::from_tag(&tag),
            tag,
            attributes: BTreeMap::new(),
            current_src: None,
            rect: None,
            inline_style: Declarations::new(),
            computed_style: Declarations::new(),
            before: None,
            after: None,
            canvas: None,
            video: None,
            parent: None,
            children: Vec::new(),
            shadow_root: None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Which children [`Document::expand`] yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expansion {
    Children,
    ShadowRoot,
}

/// A flattened, read-only view of one rendered page.
#[derive(Debug, Clone)]
pub struct Document {
    url: String,
    base: Option<Url>,
    scroll: (f64, f64),
    cookie: Option<String>,
    blobs: HashMap<String, Vec<u8>>,
    nodes: Vec<Node>,
    root: NodeId,
}

impl Document {
    /// Start an empty document; the first inserted node becomes the root.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let base = Url::parse(&url).ok();
        Self {
            url,
            base,
            scroll: (0.0, 0.0),
            cookie: None,
            blobs: HashMap::new(),
            nodes: Vec::new(),
            root: NodeId(0),
        }
    }

    /// Parse a JSON page snapshot.
    pub fn from_json(json: &str) -> HarvestResult<Self> {
        let snapshot: PageSnapshot = serde_json::from_str(json)?;
        Self::from_snapshot(snapshot)
    }

    /// Flatten a page snapshot into the arena.
    pub fn from_snapshot(snapshot: PageSnapshot) -> HarvestResult<Self> {
        let mut doc = Document::new(snapshot.url);
        doc.scroll = (snapshot.scroll.x, snapshot.scroll.y);
        doc.cookie = snapshot.cookie.filter(|c| !c.is_empty());
        for (url, payload) in snapshot.blobs {
            let bytes = decode_base64(&payload).ok_or_else(|| {
                HarvestError::InvalidInput(format!("Invalid base64 for blob {url}"))
            })?;
            doc.blobs.insert(url, bytes);
        }
        doc.insert_snapshot(snapshot.root, None)?;
        Ok(doc)
    }

    fn insert_snapshot(
        &mut self,
        snap: NodeSnapshot,
        parent: Option<NodeId>,
    ) -> HarvestResult<NodeId> {
        let mut node = Node::new(snap.tag);
        node.attributes = snap.attributes;
        node.current_src = snap.current_src.filter(|s| !s.is_empty());
        node.rect = snap.rect;
        node.inline_style = snap.style;
        node.computed_style = snap.computed_style;
        node.before = snap.before;
        node.after = snap.after;
        node.canvas = snap.canvas.map(|c| c.into_pixels()).transpose()?;
        node.video = snap
            .video
            .map(|v| -> HarvestResult<VideoState> {
                Ok(VideoState {
                    ready_state: v.ready_state,
                    width: v.width,
                    height: v.height,
                    frame: v.frame.map(|f| f.into_pixels()).transpose()?,
                })
            })
            .transpose()?;

        let id = self.push(node, parent);

        if let Some(shadow) = snap.shadow_root {
            let mut children = Vec::with_capacity(shadow.children.len());
            for child in shadow.children {
                children.push(self.insert_snapshot(child, Some(id))?);
            }
            self.nodes[id.0].shadow_root = Some(ShadowRoot {
                mode: shadow.mode,
                children,
            });
        }

        for child in snap.children {
            let child_id = self.insert_snapshot(child, Some(id))?;
            self.nodes[id.0].children.push(child_id);
        }

        Ok(id)
    }

    /// Append a node. Light-tree parents get the node as their last child;
    /// shadow hosts attach children through [`Document::attach_shadow`].
    pub(crate) fn push(&mut self, mut node: Node, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = parent;
        if self.nodes.is_empty() {
            self.root = id;
        }
        self.nodes.push(node);
        id
    }

    pub(crate) fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.0].children.push(child);
    }

    pub(crate) fn attach_shadow(&mut self, host: NodeId, mode: ShadowMode, children: Vec<NodeId>) {
        self.nodes[host.0].shadow_root = Some(ShadowRoot { mode, children });
    }

    pub(crate) fn set_base(&mut self, base: Url) {
        self.base = Some(base);
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Pages loaded from disk may re-encode `file:` resources.
    pub fn is_file_resident(&self) -> bool {
        self.url
            .get(..5)
            .is_some_and(|p| p.eq_ignore_ascii_case("file:"))
    }

    pub fn scroll(&self) -> (f64, f64) {
        self.scroll
    }

    pub fn cookie(&self) -> Option<&str> {
        self.cookie.as_deref()
    }

    pub fn blob(&self, url: &str) -> Option<&[u8]> {
        self.blobs.get(url).map(Vec::as_slice)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn node(&self, id: NodeId) -> HarvestResult<&Node> {
        self.get(id).ok_or(HarvestError::UnknownNode(id))
    }

    /// Either the plain children of a node or the children of its shadow root.
    pub fn expand(&self, id: NodeId, expansion: Expansion) -> &[NodeId] {
        let Some(node) = self.get(id) else {
            return &[];
        };
        match expansion {
            Expansion::Children => &node.children,
            Expansion::ShadowRoot => node
                .shadow_root
                .as_ref()
                .map(|s| s.children.as_slice())
                .unwrap_or(&[]),
        }
    }

    /// Descendants of `root` in tree-walker order. A shadow host's isolated
    /// sub-tree is visited right after the host, before its light children.
    pub fn descendants(&self, root: NodeId) -> Descendants<'_> {
        let mut stack: Vec<NodeId> = self.expand(root, Expansion::Children).to_vec();
        stack.reverse();
        Descendants {
            document: self,
            stack,
        }
    }

    /// Resolve a possibly relative reference against the document base.
    pub fn resolve(&self, reference: &str) -> Option<String> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }
        if Url::parse(reference).is_ok() {
            return Some(reference.to_string());
        }
        self.base
            .as_ref()
            .and_then(|base| base.join(reference).ok())
            .map(String::from)
    }

    /// The root followed by all of its descendants, shadow trees included.
    fn tree_order(&self) -> impl Iterator<Item = NodeId> + '_ {
        let root = (!self.is_empty()).then_some(self.root);
        root.into_iter().chain(root.into_iter().flat_map(|r| self.descendants(r)))
    }

    /// First element (light or shadow tree) with the given `id` attribute.
    pub fn element_by_id(&self, element_id: &str) -> Option<NodeId> {
        self.tree_order()
            .find(|id| self.nodes[id.0].attr("id") == Some(element_id))
    }

    /// Topmost node under a viewport point: the last node in tree order whose
    /// rect contains it.
    pub fn hit_test(&self, x: f64, y: f64) -> Option<NodeId> {
        self.tree_order()
            .filter(|id| {
                self.nodes[id.0]
                    .rect
                    .as_ref()
                    .is_some_and(|r| r.contains(x, y))
            })
            .last()
    }
}

/// Depth-first iterator produced by [`Document::descendants`].
pub struct Descendants<'a> {
    document: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.document.expand(id, Expansion::Children).iter().rev());
        self.stack
            .extend(self.document.expand(id, Expansion::ShadowRoot).iter().rev());
        Some(id)
    }
}

// ─────────────────────── snapshot wire format ───────────────────────

/// A rendered page as dumped by the renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub url: String,
    #[serde(default)]
    pub scroll: ScrollOffset,
    #[serde(default)]
    pub cookie: Option<String>,
    /// Blob URL → base64 payload.
    #[serde(default)]
    pub blobs: HashMap<String, String>,
    pub root: NodeSnapshot,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScrollOffset {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub current_src: Option<String>,
    #[serde(default)]
    pub rect: Option<Rect>,
    #[serde(default)]
    pub style: Declarations,
    #[serde(default)]
    pub computed_style: Declarations,
    #[serde(default)]
    pub before: Option<Declarations>,
    #[serde(default)]
    pub after: Option<Declarations>,
    #[serde(default)]
    pub canvas: Option<RasterSnapshot>,
    #[serde(default)]
    pub video: Option<VideoSnapshot>,
    #[serde(default)]
    pub children: Vec<NodeSnapshot>,
    #[serde(default)]
    pub shadow_root: Option<ShadowRootSnapshot>,
}

/// Raw RGBA pixels, base64 encoded, row-major.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterSnapshot {
    pub width: u32,
    pub height: u32,
    pub rgba: String,
}

impl RasterSnapshot {
    pub fn into_pixels(self) -> HarvestResult<RgbaImage> {
        let bytes = decode_base64(&self.rgba)
            .ok_or_else(|| HarvestError::InvalidInput("Invalid base64 pixel data".to_string()))?;
        let expected = self.width as usize * self.height as usize * 4;
        if bytes.len() != expected {
            return Err(HarvestError::InvalidInput(format!(
                "Pixel buffer is {} bytes, expected {expected} for {}x{}",
                bytes.len(),
                self.width,
                self.height
            )));
        }
        RgbaImage::from_raw(self.width, self.height, bytes)
            .ok_or_else(|| HarvestError::InvalidInput("Pixel buffer size mismatch".to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSnapshot {
    #[serde(default)]
    pub ready_state: u8,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub frame: Option<RasterSnapshot>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShadowRootSnapshot {
    #[serde(default)]
    pub mode: ShadowMode,
    #[serde(default)]
    pub children: Vec<NodeSnapshot>,
}

fn decode_base64(payload: &str) -> Option<Vec<u8>> {
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(&compact)
        .or_else(|_| base64::engine::general_purpose::STANDARD_NO_PAD.decode(&compact))
        .ok()
}
