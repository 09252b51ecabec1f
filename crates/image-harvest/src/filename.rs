//! Filename normalization for uploaded candidates.

use percent_encoding::percent_decode_str;
use uuid::Uuid;

/// Stem used when no usable name hint exists.
pub const DEFAULT_STEM: &str = "image";

const MAX_STEM_CHARS: usize = 64;

/// Build a sanitized, uniquely suffixed filename: `<stem>_<8 hex>.<ext>`.
///
/// `name` may be a bare filename, a path, or a URL path segment; any directory
/// part and existing extension are removed and percent-escapes decoded.
pub fn normalize_filename(name: Option<&str>, ext: &str) -> String {
    let stem = name.map(sanitize_stem).unwrap_or_default();
    let stem = if stem.is_empty() {
        DEFAULT_STEM.to_string()
    } else {
        stem
    };
    let suffix = &Uuid::new_v4().simple().to_string()[..8];
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    format!("{stem}_{suffix}.{ext}")
}

/// The extension of a filename-like hint, lowercased, if any.
pub fn extension_of(name: &str) -> Option<String> {
    let base = base_name(name);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn base_name(name: &str) -> &str {
    let name = name.split(['?', '#']).next().unwrap_or(name);
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

fn sanitize_stem(name: &str) -> String {
    let decoded = percent_decode_str(base_name(name)).decode_utf8_lossy().to_string();
    let stem = match decoded.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => decoded,
    };

    let mut out = String::with_capacity(stem.len());
    let mut last_was_sep = false;
    for c in stem.chars() {
        let safe = c.is_alphanumeric() || c == '-';
        if safe {
            out.push(c);
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }

    out.trim_matches('_').chars().take(MAX_STEM_CHARS).collect()
}
