//! Loading pages from disk and locating the touch target.

use std::path::{Path, PathBuf};

use url::Url;

use image_harvest::{parse_html, Document, TouchTarget};

use crate::error::{CliError, CliResult};

/// Where the page comes from.
#[derive(Debug, Clone)]
pub enum PageSource {
    /// JSON page snapshot from a renderer.
    Snapshot(PathBuf),
    /// Static markup; the base URL defaults to the file's own `file:` URL.
    Html {
        path: PathBuf,
        base_url: Option<String>,
    },
}

/// Read and parse a page.
pub fn load_document(source: &PageSource) -> CliResult<Document> {
    match source {
        PageSource::Snapshot(path) => {
            let raw = std::fs::read_to_string(path)?;
            Ok(Document::from_json(&raw)?)
        }
        PageSource::Html { path, base_url } => {
            let raw = std::fs::read_to_string(path)?;
            let base = match base_url {
                Some(url) => url.clone(),
                None => file_url(path)?,
            };
            Ok(parse_html(&raw, &base)?)
        }
    }
}

fn file_url(path: &Path) -> CliResult<String> {
    let absolute = std::fs::canonicalize(path)?;
    Url::from_file_path(&absolute)
        .map(String::from)
        .map_err(|_| {
            CliError::InvalidInput(format!("Cannot build a file URL for {}", absolute.display()))
        })
}

/// Find the touch target by element id, or by hit-testing the point.
///
/// An id match without an explicit point uses the centre of the element's
/// rect (or the origin when it has none). Returns `None` when nothing
/// matches; the pipeline reports that as a missing target.
pub fn resolve_target(
    document: &Document,
    target_id: Option<&str>,
    point: Option<(f64, f64)>,
) -> Option<TouchTarget> {
    let node = match (target_id, point) {
        (Some(id), _) => document.element_by_id(id),
        (None, Some((x, y))) => document.hit_test(x, y),
        (None, None) => None,
    };

    let Some(node) = node else {
        tracing::warn!("No touch target matched id={target_id:?} point={point:?}");
        return None;
    };

    let (x, y) = point.unwrap_or_else(|| {
        document
            .get(node)
            .and_then(|n| n.rect)
            .map(|r| (r.left + r.width / 2.0, r.top + r.height / 2.0))
            .unwrap_or((0.0, 0.0))
    });
    Some(TouchTarget { node, x, y })
}
