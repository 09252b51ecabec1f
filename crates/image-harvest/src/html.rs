//! Static HTML loading via the `scraper` crate.
//!
//! Produces a [`Document`] without layout or cascade: inline `style`
//! attributes stand in for computed style and no node has a rect, so every
//! node is eligible during the spatial walk.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::css::parse_declarations;
use crate::document::{Document, Node, NodeId, NodeKind, ShadowMode};
use crate::types::{HarvestError, HarvestResult};

/// Parse markup fetched from (or saved as) `base_url`.
pub fn parse_html(html: &str, base_url: &str) -> HarvestResult<Document> {
    let parsed = Html::parse_document(html);
    let mut document = Document::new(base_url);

    if let Ok(sel) = Selector::parse("base[href]") {
        let href = parsed
            .select(&sel)
            .next()
            .and_then(|el| el.value().attr("href"));
        if let Some(href) = href {
            let base = Url::parse(base_url)
                .and_then(|u| u.join(href))
                .or_else(|_| Url::parse(href))
                .map_err(|e| HarvestError::InvalidInput(format!("Invalid <base href>: {e}")))?;
            document.set_base(base);
        }
    }

    insert_element(&mut document, parsed.root_element(), None);
    tracing::debug!("Parsed {} nodes from {base_url}", document.len());
    Ok(document)
}

fn insert_element(document: &mut Document, el: ElementRef<'_>, parent: Option<NodeId>) -> NodeId {
    let element = el.value();
    let mut node = Node::new(element.name());
    for (name, value) in element.attrs() {
        node.attributes.insert(name.to_ascii_lowercase(), value.to_string());
    }
    if let Some(style) = element.attr("style") {
        node.inline_style = parse_declarations(style);
        node.computed_style = node.inline_style.clone();
    }
    if node.kind == NodeKind::Image {
        node.current_src = current_source(document, &node);
    }

    let id = document.push(node, parent);
    let mut shadow_attached = false;

    for child in el.children().filter_map(ElementRef::wrap) {
        if !shadow_attached {
            if let Some(mode) = declarative_shadow_mode(child) {
                let children = child
                    .children()
                    .filter_map(ElementRef::wrap)
                    .map(|inner| insert_element(document, inner, Some(id)))
                    .collect();
                document.attach_shadow(id, mode, children);
                shadow_attached = true;
                continue;
            }
        }
        let child_id = insert_element(document, child, Some(id));
        document.append_child(id, child_id);
    }

    id
}

fn declarative_shadow_mode(el: ElementRef<'_>) -> Option<ShadowMode> {
    if el.value().name() != "template" {
        return None;
    }
    let mode = el
        .value()
        .attr("shadowrootmode")
        .or_else(|| el.value().attr("shadowroot"))?;
    match mode.to_ascii_lowercase().as_str() {
        "open" => Some(ShadowMode::Open),
        "closed" => Some(ShadowMode::Closed),
        _ => None,
    }
}

/// `src`, falling back to the first `srcset` candidate, resolved against the base.
fn current_source(document: &Document, node: &Node) -> Option<String> {
    let src = node.attr("src").filter(|s| !s.trim().is_empty());
    let candidate = src.or_else(|| {
        node.attr("srcset")
            .and_then(|set| set.split(',').next())
            .and_then(|entry| entry.split_whitespace().next())
    })?;
    document.resolve(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Expansion;

    #[test]
    fn test_builds_tree_with_styles_and_sources() {
        let doc = parse_html(
            r#"<html><head><base href="https://cdn.example/assets/"></head>
               <body>
                 <div id="hero" style="background-image: url(hero.jpg); color: red">
                   <img id="a" src="a.png">
                   <img id="b" srcset="b-1x.png 1x, b-2x.png 2x">
                 </div>
               </body></html>"#,
            "https://example.com/page",
        )
        .unwrap();

        assert_eq!(doc.node(doc.root()).unwrap().tag, "html");
        let hero = doc.node(doc.element_by_id("hero").unwrap()).unwrap();
        assert_eq!(
            hero.computed_style.get("background-image").map(String::as_str),
            Some("url(hero.jpg)")
        );
        assert!(hero.rect.is_none());

        let a = doc.node(doc.element_by_id("a").unwrap()).unwrap();
        assert_eq!(a.current_src.as_deref(), Some("https://cdn.example/assets/a.png"));
        let b = doc.node(doc.element_by_id("b").unwrap()).unwrap();
        assert_eq!(b.current_src.as_deref(), Some("https://cdn.example/assets/b-1x.png"));
    }

    #[test]
    fn test_declarative_shadow_root() {
        let doc = parse_html(
            r#"<html><body><div id="host"><template shadowrootmode="closed"><img id="inner" src="/s.png"></template><span id="light"></span></div></body></html>"#,
            "https://example.com/",
        )
        .unwrap();

        let host = doc.element_by_id("host").unwrap();
        let inner = doc.element_by_id("inner").unwrap();
        let light = doc.element_by_id("light").unwrap();
        assert_eq!(doc.expand(host, Expansion::ShadowRoot), &[inner]);
        assert_eq!(doc.expand(host, Expansion::Children), &[light]);
        assert_eq!(
            doc.node(inner).unwrap().current_src.as_deref(),
            Some("https://example.com/s.png")
        );
    }
}
