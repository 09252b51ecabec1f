//! CSS value scanning: `url(...)` tokens and inline declaration blocks.

use std::sync::OnceLock;

use regex::Regex;

use crate::document::Declarations;
use crate::types::{HarvestError, HarvestResult};

fn url_function_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)url\(\s*(?:"((?:[^"\\]|\\.)*)"|'((?:[^'\\]|\\.)*)'|([^"'()\s]*))\s*\)"#)
            .expect("url() regex is valid")
    })
}

/// Every URL referenced through a CSS `url()` function in `value`, in order.
///
/// Quoted and unquoted forms are accepted. An opened `url(` that never closes
/// is a malformed value and fails the whole scan; `url(` inside a quoted
/// string is plain text.
pub fn extract_urls(value: &str) -> HarvestResult<Vec<String>> {
    let mut urls = Vec::new();

    for caps in url_function_re().captures_iter(value) {
        let token = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| unescape(m.as_str()))
            .unwrap_or_default();
        let token = token.trim();
        if !token.is_empty() {
            urls.push(token.to_string());
        }
    }

    let rest = url_function_re().replace_all(value, " ");
    if has_bare_url_open(&rest) {
        return Err(HarvestError::MalformedStyle(truncate(value, 80)));
    }

    Ok(urls)
}

/// Whether `url(` occurs outside every quoted string.
fn has_bare_url_open(text: &str) -> bool {
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (idx, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' | '\'' => match quote {
                Some(q) if q == c => quote = None,
                None => quote = Some(c),
                _ => {}
            },
            'u' | 'U' if quote.is_none() => {
                let opens = text
                    .get(idx..idx + 4)
                    .is_some_and(|s| s.eq_ignore_ascii_case("url("));
                if opens {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

fn unescape(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn truncate(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &value[..idx]),
        None => value.to_string(),
    }
}

/// Parse a `style` attribute into declarations.
///
/// Splitting respects quotes and parentheses so `url(data:…;base64,…)` stays
/// in one piece. `!important` is dropped; later duplicates win.
pub fn parse_declarations(block: &str) -> Declarations {
    let mut decls = Declarations::new();
    for item in split_top_level(block, ';') {
        let Some((property, value)) = item.split_once(':') else {
            continue;
        };
        let property = property.trim().to_ascii_lowercase();
        let mut value = value.trim();
        if let Some(stripped) = strip_important(value) {
            value = stripped;
        }
        if property.is_empty() || value.is_empty() {
            continue;
        }
        decls.insert(property, value.to_string());
    }
    decls
}

fn strip_important(value: &str) -> Option<&str> {
    let lower = value.to_ascii_lowercase();
    let idx = lower.rfind("!important")?;
    lower[idx + "!important".len()..]
        .trim()
        .is_empty()
        .then(|| value[..idx].trim_end())
}

fn split_top_level(input: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0usize;

    for (idx, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' | '\'' => match quote {
                Some(q) if q == c => quote = None,
                None => quote = Some(c),
                _ => {}
            },
            '(' if quote.is_none() => depth += 1,
            ')' if quote.is_none() => depth = (depth - 1).max(0),
            _ if c == sep && quote.is_none() && depth == 0 => {
                parts.push(&input[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts.into_iter().filter(|p| !p.trim().is_empty()).collect()
}
