//! Core data types flowing through the extraction pipeline.

use serde::{Deserialize, Serialize};

use crate::document::NodeId;

/// Margin (in CSS pixels) added on every side of the touch point.
pub const REGION_MARGIN: f64 = 24.0;

/// A discovered image reference moving through the pipeline.
///
/// Before normalization `data` holds the raw reference (embedded, local-file,
/// blob, or remote). Afterwards it is either an embedded `data:` URL, or it is
/// absent and `url` carries a bare reference for the destination to resolve.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub must_upload: bool,
}

impl Candidate {
    /// A freshly discovered, not yet normalized reference.
    pub fn raw(data: impl Into<String>) -> Self {
        Self {
            data: Some(data.into()),
            ..Self::default()
        }
    }

    /// A reference the destination resolves itself; nothing is uploaded.
    pub fn url_only(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// True when `data` is absent or already self-contained.
    pub fn is_settled(&self) -> bool {
        self.data.as_deref().map_or(true, is_embedded)
    }
}

/// Whether a reference is an embedded (`data:`) payload.
pub fn is_embedded(reference: &str) -> bool {
    reference
        .get(..5)
        .is_some_and(|p| p.eq_ignore_ascii_case("data:"))
}

/// Addressing mechanism of a raw reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Embedded,
    LocalFile,
    Blob,
    Other,
}

impl Scheme {
    pub fn of(reference: &str) -> Self {
        let prefix = reference
            .split_once(':')
            .map(|(s, _)| s.to_ascii_lowercase())
            .unwrap_or_default();
        match prefix.as_str() {
            "data" => Scheme::Embedded,
            "file" => Scheme::LocalFile,
            "blob" => Scheme::Blob,
            _ => Scheme::Other,
        }
    }
}

/// An axis-aligned rectangle in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.right() && y >= self.top && y <= self.bottom()
    }
}

/// The document-space rectangle around the touch point used to prune traversal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialRegion {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

impl SpatialRegion {
    /// Region around a viewport point, shifted into document space by the scroll offset.
    pub fn around(x: f64, y: f64, scroll: (f64, f64)) -> Self {
        let (cx, cy) = (x + scroll.0, y + scroll.1);
        Self {
            top: cy - REGION_MARGIN,
            bottom: cy + REGION_MARGIN,
            left: cx - REGION_MARGIN,
            right: cx + REGION_MARGIN,
        }
    }

    /// Overlap test against a viewport rect. Touching edges count as overlap.
    pub fn intersects(&self, rect: &Rect, scroll: (f64, f64)) -> bool {
        let left = rect.left + scroll.0;
        let top = rect.top + scroll.1;
        let right = rect.right() + scroll.0;
        let bottom = rect.bottom() + scroll.1;

        !(right < self.left || left > self.right || bottom < self.top || top > self.bottom)
    }
}

/// The node the user interacted with and where, in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchTarget {
    pub node: NodeId,
    pub x: f64,
    pub y: f64,
}

/// Whether the destination receives uploaded bytes or a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchMode {
    #[default]
    Select,
    SelectUpload,
}

impl SearchMode {
    pub fn requires_upload(self) -> bool {
        matches!(self, SearchMode::SelectUpload)
    }
}

/// Where the extraction was triggered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InvocationOrigin {
    Action,
    ContextMenu,
}

/// Host platform; decides whether remote fetches need a referrer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Chromium,
    Gecko,
}

impl Platform {
    pub fn requires_referrer_token(self) -> bool {
        matches!(self, Platform::Gecko)
    }
}

/// The persisted options the pipeline reads at invocation time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Scan the whole page even when the target is an `<img>`.
    pub img_full_parse: bool,
    pub search_mode_action: SearchMode,
    pub search_mode_context_menu: SearchMode,
}

impl Settings {
    pub fn search_mode(&self, origin: InvocationOrigin) -> SearchMode {
        match origin {
            InvocationOrigin::Action => self.search_mode_action,
            InvocationOrigin::ContextMenu => self.search_mode_context_menu,
        }
    }
}

/// Errors that can occur while harvesting images.
#[derive(thiserror::Error, Debug)]
pub enum HarvestError {
    #[error("Touch target missing")]
    MissingTarget,

    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Malformed style value: {0}")]
    MalformedStyle(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Convenience result type.
pub type HarvestResult<T> = Result<T, HarvestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_detection() {
        assert_eq!(Scheme::of("data:image/png;base64,AAAA"), Scheme::Embedded);
        assert_eq!(Scheme::of("DATA:image/png;base64,AAAA"), Scheme::Embedded);
        assert_eq!(Scheme::of("file:///tmp/a.jpg"), Scheme::LocalFile);
        assert_eq!(Scheme::of("blob:https://x/1234"), Scheme::Blob);
        assert_eq!(Scheme::of("https://x/a.png"), Scheme::Other);
        assert_eq!(Scheme::of("relative/path.png"), Scheme::Other);
    }

    #[test]
    fn test_region_overlap() {
        let region = SpatialRegion::around(100.0, 100.0, (0.0, 0.0));
        let inside = Rect {
            left: 90.0,
            top: 90.0,
            width: 5.0,
            height: 5.0,
        };
        let edge = Rect {
            left: 124.0,
            top: 50.0,
            width: 10.0,
            height: 100.0,
        };
        let outside = Rect {
            left: 200.0,
            top: 200.0,
            width: 10.0,
            height: 10.0,
        };
        assert!(region.intersects(&inside, (0.0, 0.0)));
        assert!(region.intersects(&edge, (0.0, 0.0)));
        assert!(!region.intersects(&outside, (0.0, 0.0)));
    }

    #[test]
    fn test_region_accounts_for_scroll() {
        let scroll = (0.0, 500.0);
        let region = SpatialRegion::around(100.0, 100.0, scroll);
        assert_eq!(region.top, 576.0);
        let rect = Rect {
            left: 90.0,
            top: 90.0,
            width: 20.0,
            height: 20.0,
        };
        assert!(region.intersects(&rect, scroll));
        assert!(!region.intersects(&rect, (0.0, 0.0)));
    }

    #[test]
    fn test_candidate_serialization() {
        let c = Candidate::url_only("https://x/a.png");
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json, serde_json::json!({ "url": "https://x/a.png" }));

        let c = Candidate {
            data: Some("data:image/png;base64,AA==".into()),
            url: Some("https://x/a.png".into()),
            filename: Some("a_1234abcd.png".into()),
            must_upload: true,
        };
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["mustUpload"], true);
    }

    #[test]
    fn test_settings_defaults_and_modes() {
        let s: Settings =
            serde_json::from_str(r#"{"searchModeContextMenu":"selectUpload"}"#).unwrap();
        assert!(!s.img_full_parse);
        assert_eq!(s.search_mode(InvocationOrigin::Action), SearchMode::Select);
        assert!(s.search_mode(InvocationOrigin::ContextMenu).requires_upload());
    }
}
