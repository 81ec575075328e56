//! Pulls region labels and the background rectangle out of a saved store page.
//!
//! The page is HTML with an inline SVG floor map. Only two pieces matter:
//! `<text class="adjacency-name ...">` elements (one per region) and the
//! `<g id="background">` group whose geometry spans the whole map.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use common_types::{LabelSpec, ReferenceRect, RouteError};
use log::{debug, info, warn};
use regex::{Captures, Regex};
use roxmltree::{Document, Node};
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MarkupError {
    #[error("no adjacency labels found")]
    NoLabels,

    #[error("background group missing or holds fewer than two coordinate pairs")]
    MissingBackground,

    #[error("background group is not well-formed: {0}")]
    Xml(String),
}

impl From<MarkupError> for RouteError {
    fn from(e: MarkupError) -> Self {
        RouteError::Markup(e.to_string())
    }
}

/// Everything the route engine needs from the page.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreMarkup {
    pub labels: Vec<LabelSpec>,
    pub reference: ReferenceRect,
}

static TEXT_ELEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<text\b[^>]*>.*?</text>").expect("invalid text regex"));
static BACKGROUND_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<g\b[^>]*\bid\s*=\s*["']background["'][^>]*>"#).expect("invalid background regex")
});
static GROUP_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(/?)g\b[^>]*?(/?)>").expect("invalid group regex"));
static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?").expect("invalid number regex")
});
static NAMED_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&([A-Za-z][A-Za-z0-9]*);").expect("invalid entity regex"));
static NS_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[<\s/]([A-Za-z_][\w.-]*):[A-Za-z_]").expect("invalid prefix regex")
});

/// HTML named entities that show up in store pages, as code points.
const HTML_ENTITIES: &[(&str, u32)] = &[
    ("nbsp", 160),
    ("copy", 169),
    ("reg", 174),
    ("deg", 176),
    ("frac12", 189),
    ("times", 215),
    ("egrave", 232),
    ("eacute", 233),
    ("ntilde", 241),
    ("ndash", 8211),
    ("mdash", 8212),
    ("lsquo", 8216),
    ("rsquo", 8217),
    ("ldquo", 8220),
    ("rdquo", 8221),
    ("hellip", 8230),
    ("trade", 8482),
];

/// Make a fragment cut out of an HTML page parseable on its own.
///
/// HTML named entities become character references (unknown ones are kept as
/// literal text), and the fragment is wrapped in an element declaring every
/// namespace prefix it uses, since the declarations usually sit on an
/// enclosing `<svg>` that is not part of the fragment.
fn standalone(fragment: &str) -> String {
    let decoded = NAMED_ENTITY.replace_all(fragment, |caps: &Captures| {
        let name = &caps[1];
        if matches!(name, "amp" | "lt" | "gt" | "quot" | "apos") {
            return caps[0].to_string();
        }
        match HTML_ENTITIES.iter().find(|(n, _)| *n == name) {
            Some((_, code)) => format!("&#{code};"),
            None => format!("&amp;{name};"),
        }
    });

    let prefixes: BTreeSet<&str> = NS_PREFIX
        .captures_iter(&decoded)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|p| !matches!(*p, "xml" | "xmlns"))
        .collect();
    let mut out = String::from("<fragment");
    for prefix in prefixes {
        out.push_str(&format!(" xmlns:{prefix}=\"urn:aisle-route:{prefix}\""));
    }
    out.push('>');
    out.push_str(&decoded);
    out.push_str("</fragment>");
    out
}

pub fn parse_store_markup(markup: &str) -> Result<StoreMarkup, MarkupError> {
    let labels = extract_labels(markup);
    if labels.is_empty() {
        return Err(MarkupError::NoLabels);
    }
    let reference = extract_reference(markup)?;
    info!(
        "Markup: {} labels, background ({:.1}, {:.1}) .. ({:.1}, {:.1})",
        labels.len(),
        reference.min_x,
        reference.min_y,
        reference.max_x,
        reference.max_y
    );
    Ok(StoreMarkup { labels, reference })
}

/// Every parseable adjacency label, in document order.
pub fn extract_labels(markup: &str) -> Vec<LabelSpec> {
    let mut out = Vec::new();
    for m in TEXT_ELEMENT.find_iter(markup) {
        let fragment = m.as_str();
        if !fragment.contains("adjacency-name") {
            continue;
        }
        let wrapped = standalone(fragment);
        let doc = match Document::parse(&wrapped) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Skipping unparseable label element: {e}");
                continue;
            }
        };
        let Some(text) = doc.root_element().first_element_child() else {
            continue;
        };
        match label_from_node(text) {
            Some(label) => out.push(label),
            None => warn!("Skipping label element with missing attributes: {fragment}"),
        }
    }
    out
}

fn label_from_node(node: Node) -> Option<LabelSpec> {
    let class = node.attribute("class")?;
    if !class.split_whitespace().any(|c| c == "adjacency-name") {
        return None;
    }
    let name: String = node
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if name.is_empty() {
        return None;
    }
    Some(LabelSpec {
        source_x: parse_length(node.attribute("x")?)?,
        source_y: parse_length(node.attribute("y")?)?,
        font_size: node.attribute("font-size").and_then(parse_length).unwrap_or(0.0),
        name,
    })
}

fn parse_length(s: &str) -> Option<f64> {
    s.trim().trim_end_matches("px").trim().parse::<f64>().ok()
}

/// Slice of `markup` covering the background group, nested groups included.
fn background_fragment(markup: &str) -> Option<&str> {
    let open = BACKGROUND_OPEN.find(markup)?;
    let mut depth = 1usize;
    for tag in GROUP_TAG.captures_iter(&markup[open.end()..]) {
        let closing = !tag[1].is_empty();
        let self_closing = !tag[2].is_empty();
        if closing {
            depth -= 1;
            if depth == 0 {
                let end = open.end() + tag.get(0)?.end();
                return Some(&markup[open.start()..end]);
            }
        } else if !self_closing {
            depth += 1;
        }
    }
    None
}

/// Min/max over every coordinate the background group draws.
pub fn extract_reference(markup: &str) -> Result<ReferenceRect, MarkupError> {
    let fragment = background_fragment(markup).ok_or(MarkupError::MissingBackground)?;
    let wrapped = standalone(fragment);
    let doc = Document::parse(&wrapped).map_err(|e| MarkupError::Xml(e.to_string()))?;

    let mut corners: Vec<(f64, f64)> = Vec::new();
    for node in doc.descendants().filter(|n| n.is_element()) {
        if let Some(points) = node.attribute("points") {
            corners.extend(number_pairs(points));
        }
        if let Some(d) = node.attribute("d") {
            corners.extend(number_pairs(d));
        }
        if node.tag_name().name() == "rect" {
            let num = |a: &str| node.attribute(a).and_then(parse_length);
            if let (Some(x), Some(y), Some(w), Some(h)) =
                (num("x"), num("y"), num("width"), num("height"))
            {
                corners.push((x, y));
                corners.push((x + w, y + h));
            }
        }
    }
    debug!("Background group holds {} coordinate pairs", corners.len());
    ReferenceRect::from_corners(&corners).ok_or(MarkupError::MissingBackground)
}

/// Consecutive numbers read as (x, y) pairs. Path commands are skipped, so
/// only absolute path coordinates give meaningful corners.
fn number_pairs(s: &str) -> Vec<(f64, f64)> {
    let nums: Vec<f64> = NUMBER
        .find_iter(s)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect();
    nums.chunks_exact(2).map(|c| (c[0], c[1])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"<html><body><div class="FloorMap_svgMapStyles">
<svg viewBox="0 0 500 400">
<g id="background" role="group" aria-labelledby="background-vo">
  <title id="background-vo">background</title>
  <g class="outline"><polygon points="273.4,-265.06 4434,-265.06 4434,3236 273.4,3236" fill="#f7f7f7"></polygon></g>
</g>
<g id="labels">
<text class="adjacency-name normal-format-store" font-family="Helvetica, Verdana" text-anchor="middle" x="500.5" y="120" font-size="14">Dairy</text>
<text class="adjacency-name normal-format-store" font-family="Helvetica, Verdana" text-anchor="middle" x="900" y="-40.25" font-size="14px">Health &amp; Beauty</text>
<text class="aisle-number" x="1" y="2">A12</text>
<text class="adjacency-name normal-format-store" x="bogus" y="3">Broken</text>
<text class="adjacency-name normal-format-store" x="300" y="3000" font-size="12">Entrance</text>
</g>
</svg></div></body></html>"##;

    #[test]
    fn parses_labels_and_reference() {
        let parsed = parse_store_markup(PAGE).unwrap();
        let names: Vec<&str> = parsed.labels.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Dairy", "Health & Beauty", "Entrance"]);

        let dairy = &parsed.labels[0];
        assert_eq!(dairy.source_x, 500.5);
        assert_eq!(dairy.source_y, 120.0);
        assert_eq!(dairy.font_size, 14.0);
        assert_eq!(parsed.labels[1].font_size, 14.0);
        assert_eq!(parsed.labels[1].source_y, -40.25);

        assert_eq!(
            parsed.reference,
            ReferenceRect { min_x: 273.4, min_y: -265.06, max_x: 4434.0, max_y: 3236.0 }
        );
    }

    #[test]
    fn nested_groups_stay_inside_background() {
        let fragment = background_fragment(PAGE).unwrap();
        assert!(fragment.ends_with("</g>"));
        assert!(fragment.contains("polygon"));
        assert!(!fragment.contains("labels"));
    }

    #[test]
    fn rect_background_is_supported() {
        let page = r#"<g id="background"><rect x="10" y="20" width="100" height="50"/></g>"#;
        let r = extract_reference(page).unwrap();
        assert_eq!(r, ReferenceRect { min_x: 10.0, min_y: 20.0, max_x: 110.0, max_y: 70.0 });
    }

    #[test]
    fn namespaced_background_and_html_entities_parse() {
        let page = r##"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink">
<g id="background"><polygon points="0,0 200,0 200,100 0,100"/><use xlink:href="#a"/></g>
<text class="adjacency-name" x="10" y="20" font-size="12">Dairy&nbsp;Case</text>
<text class="adjacency-name" x="30" y="40" font-size="12">Beer &amp; Wine&trade;</text>
<text class="adjacency-name" xml:space="preserve" x="50" y="60" font-size="12">Caf&eacute; &bogus;</text>
<text class="adjacency-name" x="70" y="80" font-size="12">Entrance</text>
</svg>"##;
        let parsed = parse_store_markup(page).unwrap();
        let names: Vec<&str> = parsed.labels.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Dairy Case", "Beer & Wine\u{2122}", "Caf\u{e9} &bogus;", "Entrance"]
        );
        assert_eq!(
            parsed.reference,
            ReferenceRect { min_x: 0.0, min_y: 0.0, max_x: 200.0, max_y: 100.0 }
        );
    }

    #[test]
    fn undeclared_prefixes_inside_labels_are_tolerated() {
        let page = r#"<text class="adjacency-name" x="1" y="2" sodipodi:role="line">Produce</text>"#;
        let labels = extract_labels(page);
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].name, "Produce");
    }

    #[test]
    fn missing_pieces_are_errors() {
        assert!(matches!(parse_store_markup("<svg></svg>"), Err(MarkupError::NoLabels)));

        let no_background =
            r#"<text class="adjacency-name" x="1" y="2" font-size="3">Dairy</text>"#;
        assert!(matches!(
            parse_store_markup(no_background),
            Err(MarkupError::MissingBackground)
        ));

        let empty_background = r#"<g id="background"><title>bg</title></g>"#;
        assert!(matches!(
            extract_reference(empty_background),
            Err(MarkupError::MissingBackground)
        ));
    }
}
