//! Article extraction: fetch a detail page and pull out its readable body.
//!
//! [`ArticleExtractor`] is the seam the coordinator drives; [`PageExtractor`]
//! is the HTTP + HTML implementation. Decorators such as
//! [`crate::retry::RetryExtractor`] and [`crate::cache::CachedExtractor`]
//! wrap any implementation.
//!
//! # Readability heuristics
//!
//! - Title: `og:title`, then the first `<h1>`, then `<title>`
//! - Date: `article:published_time` style meta tags, `<time datetime>`, then
//!   JSON-LD `datePublished`
//! - Body container: `<article>`, `[itemprop=articleBody]`, `<main>`, else the
//!   element whose direct `<p>` children carry the most text
//! - Inside the container, block-level text (paragraphs, headings, list
//!   items, quotes) outside boilerplate elements is joined with blank lines

use chrono::Utc;
use ego_tree::NodeId;
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::CrawlError;
use crate::http::get_text;
use crate::models::ArticleRecord;
use crate::utils::collapse_whitespace;

/// Retrieves a single article and extracts its body.
///
/// One attempt per call. Implementations return a record whose `content` is
/// non-empty, or an error.
pub trait ArticleExtractor {
    async fn extract(&self, url: &str) -> Result<ArticleRecord, CrawlError>;
}

/// Extractor that fetches pages over HTTP and parses them with `scraper`.
#[derive(Debug, Clone)]
pub struct PageExtractor {
    client: Client,
}

impl PageExtractor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl ArticleExtractor for PageExtractor {
    #[instrument(level = "info", skip(self))]
    async fn extract(&self, url: &str) -> Result<ArticleRecord, CrawlError> {
        let html = get_text(&self.client, url).await?;
        let page = extract_from_html(&html);
        if page.content.is_empty() {
            return Err(CrawlError::extraction(url, "no readable content"));
        }
        debug!(bytes = page.content.len(), "Extracted article body");

        Ok(ArticleRecord {
            title: page.title.unwrap_or_default(),
            link: url.to_string(),
            published_at: page.published_at,
            content: page.content,
            extracted_at: Utc::now(),
        })
    }
}

/// What the heuristics found in one HTML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub title: Option<String>,
    pub published_at: Option<String>,
    /// Body text; empty when nothing readable was found.
    pub content: String,
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

static OG_TITLE: Lazy<Selector> = Lazy::new(|| selector(r#"meta[property="og:title"]"#));
static H1: Lazy<Selector> = Lazy::new(|| selector("h1"));
static TITLE: Lazy<Selector> = Lazy::new(|| selector("title"));
static DATE_META: Lazy<Selector> = Lazy::new(|| {
    selector(
        r#"meta[property="article:published_time"], meta[name="pubdate"], meta[name="publishdate"], meta[name="date"], meta[itemprop="datePublished"]"#,
    )
});
static TIME: Lazy<Selector> = Lazy::new(|| selector("time[datetime]"));
static JSON_LD: Lazy<Selector> = Lazy::new(|| selector(r#"script[type="application/ld+json"]"#));
static CONTAINERS: Lazy<Vec<Selector>> = Lazy::new(|| {
    vec![
        selector("article"),
        selector(r#"[itemprop="articleBody"]"#),
        selector("main"),
    ]
});
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| selector("p"));
static BODY: Lazy<Selector> = Lazy::new(|| selector("body"));
static BLOCKS: Lazy<Selector> =
    Lazy::new(|| selector("p, h2, h3, h4, li, blockquote, pre"));

/// Elements whose text never belongs to the article body.
const BOILERPLATE: &[&str] = &[
    "nav", "aside", "header", "footer", "form", "script", "style", "noscript", "figure", "button",
];
const BLOCK_TAGS: &[&str] = &["p", "h2", "h3", "h4", "li", "blockquote", "pre"];

/// Run the readability heuristics over a document. Pure and deterministic.
pub fn extract_from_html(html: &str) -> ExtractedPage {
    let doc = Html::parse_document(html);
    ExtractedPage {
        title: extract_title(&doc),
        published_at: extract_published(&doc),
        content: find_container(&doc)
            .map(|container| container_text(container))
            .unwrap_or_default(),
    }
}

fn extract_title(doc: &Html) -> Option<String> {
    let og = doc
        .select(&OG_TITLE)
        .find_map(|el| el.value().attr("content"))
        .map(collapse_whitespace);
    let h1 = || doc.select(&H1).next().map(|el| element_text(el));
    let title = || doc.select(&TITLE).next().map(|el| element_text(el));

    og.filter(|t| !t.is_empty())
        .or_else(|| h1().filter(|t| !t.is_empty()))
        .or_else(|| title().filter(|t| !t.is_empty()))
}

fn extract_published(doc: &Html) -> Option<String> {
    let from_meta = doc
        .select(&DATE_META)
        .filter_map(|el| el.value().attr("content"))
        .map(str::trim)
        .find(|c| !c.is_empty())
        .map(str::to_string);
    if from_meta.is_some() {
        return from_meta;
    }

    let from_time = doc
        .select(&TIME)
        .filter_map(|el| el.value().attr("datetime"))
        .map(str::trim)
        .find(|c| !c.is_empty())
        .map(str::to_string);
    if from_time.is_some() {
        return from_time;
    }

    doc.select(&JSON_LD)
        .filter_map(|el| serde_json::from_str::<Value>(&el.text().collect::<String>()).ok())
        .find_map(|v| json_ld_date(&v))
}

/// `datePublished` from a JSON-LD value, searching arrays and `@graph`.
fn json_ld_date(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => items.iter().find_map(json_ld_date),
        Value::Object(obj) => obj
            .get("datePublished")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| obj.get("@graph").and_then(json_ld_date)),
        _ => None,
    }
}

fn find_container(doc: &Html) -> Option<ElementRef<'_>> {
    for sel in CONTAINERS.iter() {
        let best = doc
            .select(sel)
            .filter(|el| !has_boilerplate_ancestor(*el))
            .max_by_key(|el| element_text(*el).len());
        if let Some(el) = best.filter(|el| !element_text(*el).is_empty()) {
            return Some(el);
        }
    }
    densest_paragraph_parent(doc).or_else(|| doc.select(&BODY).next())
}

/// The element whose direct `<p>` children hold the most text. Ties go to the
/// element seen first in document order.
fn densest_paragraph_parent(doc: &Html) -> Option<ElementRef<'_>> {
    let mut scores: Vec<(NodeId, usize)> = Vec::new();
    for p in doc.select(&PARAGRAPH) {
        if has_boilerplate_ancestor(p) {
            continue;
        }
        let Some(parent) = p.parent().and_then(ElementRef::wrap) else {
            continue;
        };
        let len = element_text(p).len();
        match scores.iter_mut().find(|(id, _)| *id == parent.id()) {
            Some((_, score)) => *score += len,
            None => scores.push((parent.id(), len)),
        }
    }
    scores
        .into_iter()
        .rev()
        .filter(|(_, score)| *score > 0)
        .max_by_key(|(_, score)| *score)
        .and_then(|(id, _)| doc.tree.get(id))
        .and_then(ElementRef::wrap)
}

fn container_text(container: ElementRef<'_>) -> String {
    let blocks: Vec<String> = container
        .select(&BLOCKS)
        .filter(|el| !is_nested_or_boilerplate(*el, container.id()))
        .map(|el| element_text(el))
        .filter(|t| !t.is_empty())
        .collect();
    if !blocks.is_empty() {
        return blocks.join("\n\n");
    }
    visible_text(container)
}

/// Skip blocks inside other blocks (their text is already counted) and
/// anything under a boilerplate element, looking up to the container.
fn is_nested_or_boilerplate(el: ElementRef<'_>, container: NodeId) -> bool {
    for ancestor in el.ancestors() {
        if ancestor.id() == container {
            return false;
        }
        if let Some(e) = ancestor.value().as_element() {
            if BOILERPLATE.contains(&e.name()) || BLOCK_TAGS.contains(&e.name()) {
                return true;
            }
        }
    }
    false
}

fn has_boilerplate_ancestor(el: ElementRef<'_>) -> bool {
    el.ancestors().any(|a| {
        a.value()
            .as_element()
            .is_some_and(|e| BOILERPLATE.contains(&e.name()))
    })
}

/// Text of every text node under `container` that is not inside boilerplate.
fn visible_text(container: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in container.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().take_while(|a| a.id() != container.id()).any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| BOILERPLATE.contains(&e.name()))
        });
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    collapse_whitespace(&out)
}

fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}
