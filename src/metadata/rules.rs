//! Ordered meta-tag and structured-data rules.
//!
//! Each field has a list of sources tried in order; the first non-empty value
//! wins. Sources are Open Graph and Twitter card tags, plain `<meta>` and
//! `<link>` tags, JSON-LD blocks, and finally document elements.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::models::Metadata;
use crate::utils::collapse_whitespace;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static META: Lazy<Selector> = Lazy::new(|| selector("meta"));
static LINK: Lazy<Selector> = Lazy::new(|| selector("link"));
static JSON_LD: Lazy<Selector> = Lazy::new(|| selector(r#"script[type="application/ld+json"]"#));
static TITLE: Lazy<Selector> = Lazy::new(|| selector("title"));
static H1: Lazy<Selector> = Lazy::new(|| selector("h1"));
static REL_AUTHOR: Lazy<Selector> = Lazy::new(|| selector(r#"[rel="author"]"#));

/// Parsed page plus its JSON-LD nodes.
struct Page {
    document: Html,
    json_ld: Vec<Value>,
    base: Url,
}

impl Page {
    fn parse(html: &str, base: &Url) -> Self {
        let document = Html::parse_document(html);
        let json_ld = json_ld_nodes(&document);
        Self {
            document,
            json_ld,
            base: base.clone(),
        }
    }

    /// First non-empty `content` of a `<meta>` whose `property` or `name`
    /// equals one of `keys`, in key order.
    fn meta(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| {
            self.document
                .select(&META)
                .filter(|meta| {
                    let el = meta.value();
                    [el.attr("property"), el.attr("name")]
                        .into_iter()
                        .flatten()
                        .any(|v| v.trim().eq_ignore_ascii_case(key))
                })
                .find_map(|meta| non_empty(meta.value().attr("content")))
        })
    }

    /// First non-empty `href` of a `<link>` whose `rel` tokens contain one of
    /// `rels`, in rel order.
    fn link(&self, rels: &[&str]) -> Option<String> {
        rels.iter().find_map(|rel| {
            self.document
                .select(&LINK)
                .filter(|link| {
                    link.value()
                        .attr("rel")
                        .is_some_and(|v| v.split_whitespace().any(|t| t.eq_ignore_ascii_case(rel)))
                })
                .find_map(|link| non_empty(link.value().attr("href")))
        })
    }

    fn json_ld(&self, pick: impl Fn(&Value) -> Option<String>) -> Option<String> {
        self.json_ld
            .iter()
            .find_map(|node| pick(node).and_then(|v| non_empty(Some(&v))))
    }

    fn element_text(&self, selector: &Selector) -> Option<String> {
        self.document
            .select(selector)
            .map(|el| text_of(&el))
            .find(|text| !text.is_empty())
    }

    fn absolute(&self, value: String) -> String {
        match self.base.join(value.trim()) {
            Ok(url) => url.to_string(),
            Err(_) => value,
        }
    }

    fn favicon(&self) -> Option<String> {
        if !self.base.has_host() {
            return None;
        }
        self.base.join("/favicon.ico").ok().map(String::from)
    }
}

/// Run every field rule over `html`, resolving relative URLs against `base`
/// (the post-redirect URL of the page).
pub fn extract_page_metadata(html: &str, base: &Url) -> Metadata {
    let page = Page::parse(html, base);

    let title = page
        .meta(&["og:title", "twitter:title"])
        .or_else(|| page.json_ld(|n| str_field(n, "headline").or_else(|| str_field(n, "name"))))
        .or_else(|| page.element_text(&TITLE))
        .or_else(|| page.element_text(&H1));

    let description = page
        .meta(&["og:description", "twitter:description", "description"])
        .or_else(|| page.json_ld(|n| str_field(n, "description")));

    let image_url = page
        .meta(&[
            "og:image",
            "og:image:url",
            "og:image:secure_url",
            "twitter:image",
            "twitter:image:src",
        ])
        .or_else(|| page.link(&["image_src"]))
        .or_else(|| page.json_ld(|n| n.get("image").and_then(url_like)))
        .map(|v| page.absolute(v));

    let source_url = page
        .meta(&["og:url"])
        .or_else(|| page.link(&["canonical"]))
        .map(|v| page.absolute(v))
        .or_else(|| Some(base.to_string()));

    let logo_url = page
        .meta(&["og:logo"])
        .or_else(|| page.link(&["apple-touch-icon", "icon"]))
        .or_else(|| page.json_ld(|n| n.get("publisher")?.get("logo").and_then(url_like)))
        .map(|v| page.absolute(v))
        .or_else(|| page.favicon());

    let publisher = page
        .meta(&["og:site_name", "application-name"])
        .or_else(|| page.json_ld(|n| str_field(n.get("publisher")?, "name")));

    let byline = page
        .meta(&["author", "article:author"])
        .or_else(|| page.json_ld(|n| n.get("author").and_then(person_name)))
        .or_else(|| page.element_text(&REL_AUTHOR));

    Metadata {
        title,
        description,
        image_url,
        source_url,
        logo_url,
        publisher,
        byline,
    }
}

/// Top-level JSON-LD objects, with `@graph` members and arrays flattened.
fn json_ld_nodes(document: &Html) -> Vec<Value> {
    let mut nodes = Vec::new();
    for script in document.select(&JSON_LD) {
        let raw: String = script.text().collect();
        match serde_json::from_str::<Value>(raw.trim()) {
            Ok(value) => flatten_json_ld(value, &mut nodes),
            Err(e) => debug!(error = %e, "Ignoring malformed JSON-LD block"),
        }
    }
    nodes
}

fn flatten_json_ld(value: Value, nodes: &mut Vec<Value>) {
    match value {
        Value::Array(items) => items.into_iter().for_each(|v| flatten_json_ld(v, nodes)),
        Value::Object(mut map) => {
            let graph = map.remove("@graph");
            nodes.push(Value::Object(map));
            if let Some(graph) = graph {
                flatten_json_ld(graph, nodes);
            }
        }
        _ => {}
    }
}

fn str_field(node: &Value, key: &str) -> Option<String> {
    node.get(key)?.as_str().map(str::to_string)
}

/// A string, an object's `url`, or the first entry of an array of either.
fn url_like(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("url").and_then(url_like),
        Value::Array(items) => items.first().and_then(url_like),
        _ => None,
    }
}

/// A string, an object's `name`, or the first entry of an array of either.
fn person_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("name").and_then(person_name),
        Value::Array(items) => items.first().and_then(person_name),
        _ => None,
    }
}

fn text_of(element: &ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(collapse_whitespace)
        .filter(|v| !v.is_empty())
}
