//! Feed parsing: RSS 2.0, RSS 1.0 (RDF) and Atom.
//!
//! The root element picks the dialect, then a streaming pass over the
//! document collects the direct children of every `<item>` / `<entry>`.
//! Children are matched on their qualified name, so extension elements such
//! as `dc:title`, `media:title` or `atom:link` never shadow the item's own
//! `title` and `link`. Anything that is not well-formed XML with a known feed
//! root is a [`CrawlError::Parse`].

use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesRef, BytesStart, Event};
use tracing::{debug, warn};

use super::resolve_link;
use crate::error::CrawlError;
use crate::models::ListItem;
use crate::utils::collapse_whitespace;

#[derive(Debug, Clone, Copy)]
enum Dialect {
    Rss,
    Rdf,
    Atom,
}

impl Dialect {
    fn entry_name(self) -> &'static str {
        match self {
            Dialect::Rss | Dialect::Rdf => "item",
            Dialect::Atom => "entry",
        }
    }
}

/// Item children we read.
#[derive(Debug, Clone, Copy)]
enum Field {
    Title,
    Link,
    AtomLink,
    Guid,
    Published,
    Updated,
}

/// Values gathered from one item or entry. The first non-blank value of a
/// field wins.
#[derive(Debug, Default)]
struct RawEntry {
    title: Option<String>,
    link: Option<String>,
    /// `(rel, href)` of every Atom `<link>`.
    atom_links: Vec<(Option<String>, String)>,
    guid: Option<String>,
    guid_not_permalink: bool,
    published: Option<String>,
    updated: Option<String>,
}

impl RawEntry {
    fn open(&mut self, field: Field, e: &BytesStart) -> Result<(), CrawlError> {
        match field {
            Field::AtomLink => {
                if let Some(href) = attribute(e, "href")?.filter(|h| !h.trim().is_empty()) {
                    self.atom_links.push((attribute(e, "rel")?, href));
                }
            }
            Field::Guid => {
                self.guid_not_permalink = attribute(e, "isPermaLink")?
                    .is_some_and(|p| p.trim().eq_ignore_ascii_case("false"));
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, field: Field, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let slot = match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Guid => &mut self.guid,
            Field::Published => &mut self.published,
            Field::Updated => &mut self.updated,
            Field::AtomLink => return,
        };
        if slot.is_none() {
            *slot = Some(text.to_string());
        }
    }

    /// Title, link and date, with the fallbacks each dialect allows.
    fn into_parts(self) -> (Option<String>, Option<String>, Option<String>) {
        // rel="alternate" is the default when rel is absent
        let atom_link = self
            .atom_links
            .iter()
            .find(|(rel, _)| rel.as_deref().is_none_or(|r| r == "alternate"))
            .or_else(|| self.atom_links.first())
            .map(|(_, href)| href.clone());
        let guid_link = self
            .guid
            .filter(|_| !self.guid_not_permalink)
            .filter(|g| g.starts_with("http"));

        (
            self.title,
            self.link.or(atom_link).or(guid_link),
            self.published.or(self.updated),
        )
    }
}

/// An item or entry whose end tag has not been seen yet.
struct OpenEntry {
    depth: usize,
    prefix: String,
    raw: RawEntry,
}

/// Parse a feed document into list items, resolving relative links against
/// `base_url`. Entries without a usable link are skipped.
pub fn parse_feed(xml: &str, base_url: &str) -> Result<Vec<ListItem>, CrawlError> {
    let xml = scrub_html_entities_for_xml(xml.trim_start_matches('\u{feff}'));
    let dialect = sniff_dialect(&xml)?;
    let raw = read_entries(&xml, dialect)?;

    let total = raw.len();
    let items: Vec<ListItem> = raw
        .into_iter()
        .map(RawEntry::into_parts)
        .filter_map(|(title, link, published_at)| {
            let link = link.and_then(|l| resolve_link(base_url, &l))?;
            Some(ListItem {
                title: collapse_whitespace(title.as_deref().unwrap_or_default()),
                link,
                published_at,
            })
        })
        .collect();

    if items.len() < total {
        warn!(skipped = total - items.len(), "Feed entries without a link were skipped");
    }
    debug!(?dialect, count = items.len(), "Parsed feed entries");
    Ok(items)
}

/// Walk the document once and collect every item or entry in document order.
fn read_entries(xml: &str, dialect: Dialect) -> Result<Vec<RawEntry>, CrawlError> {
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    let mut open: Option<OpenEntry> = None;
    let mut capture: Option<(Field, String)> = None;
    let mut entries = Vec::new();

    loop {
        match reader.read_event().map_err(parse_error)? {
            Event::Start(e) => {
                depth += 1;
                let name = qualified_name(&e);
                match open.as_mut() {
                    None if local_part(&name) == dialect.entry_name() => {
                        open = Some(OpenEntry {
                            depth,
                            prefix: prefix_part(&name).to_string(),
                            raw: RawEntry::default(),
                        });
                    }
                    Some(entry) if depth == entry.depth + 1 => {
                        if let Some(field) = field_for(dialect, &entry.prefix, &name) {
                            entry.raw.open(field, &e)?;
                            capture = Some((field, String::new()));
                        }
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                if let Some(entry) = open.as_mut().filter(|entry| depth == entry.depth) {
                    if let Some(field) = field_for(dialect, &entry.prefix, &qualified_name(&e)) {
                        entry.raw.open(field, &e)?;
                    }
                }
            }
            Event::Text(t) => {
                if let Some((_, buf)) = capture.as_mut() {
                    buf.push_str(&t.decode().map_err(parse_error)?);
                }
            }
            Event::CData(c) => {
                if let Some((_, buf)) = capture.as_mut() {
                    buf.push_str(&c.decode().map_err(parse_error)?);
                }
            }
            Event::GeneralRef(r) => {
                if let Some((_, buf)) = capture.as_mut() {
                    buf.push_str(&resolve_reference(&r)?);
                }
            }
            Event::End(_) => {
                if let Some(entry) = open.as_mut() {
                    if depth == entry.depth + 1 {
                        if let Some((field, text)) = capture.take() {
                            entry.raw.close(field, &text);
                        }
                    } else if depth == entry.depth {
                        if let Some(done) = open.take() {
                            entries.push(done.raw);
                        }
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 {
        return Err(CrawlError::Parse("document ends inside an open element".into()));
    }
    Ok(entries)
}

/// Map an item child to the field it feeds. Children must carry the item's
/// own prefix; `dc:date` is accepted in every dialect as a date fallback.
fn field_for(dialect: Dialect, prefix: &str, name: &str) -> Option<Field> {
    if name == "dc:date" {
        return Some(Field::Published);
    }
    let local = if prefix.is_empty() {
        (!name.contains(':')).then_some(name)?
    } else {
        name.strip_prefix(prefix)?.strip_prefix(':')?
    };
    match (dialect, local) {
        (_, "title") => Some(Field::Title),
        (Dialect::Atom, "link") => Some(Field::AtomLink),
        (_, "link") => Some(Field::Link),
        (Dialect::Rss, "guid") => Some(Field::Guid),
        (Dialect::Atom, "published") | (Dialect::Rss | Dialect::Rdf, "pubDate") => Some(Field::Published),
        (Dialect::Atom, "updated") => Some(Field::Updated),
        _ => None,
    }
}

fn qualified_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn local_part(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

fn prefix_part(name: &str) -> &str {
    name.split_once(':').map(|(prefix, _)| prefix).unwrap_or_default()
}

fn attribute(e: &BytesStart, key: &str) -> Result<Option<String>, CrawlError> {
    match e.try_get_attribute(key).map_err(parse_error)? {
        Some(attr) => Ok(Some(attr.unescape_value().map_err(parse_error)?.into_owned())),
        None => Ok(None),
    }
}

/// Character references and the five predefined entities resolve; anything
/// else is kept verbatim.
fn resolve_reference(r: &BytesRef) -> Result<String, CrawlError> {
    if let Some(c) = r.resolve_char_ref().map_err(parse_error)? {
        return Ok(c.to_string());
    }
    let name = r.decode().map_err(parse_error)?;
    Ok(match resolve_predefined_entity(&name) {
        Some(text) => text.to_string(),
        None => format!("&{name};"),
    })
}

/// Find the root element and map it to a feed dialect.
fn sniff_dialect(xml: &str) -> Result<Dialect, CrawlError> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase();
                return match name.as_str() {
                    "rss" => Ok(Dialect::Rss),
                    "rdf" => Ok(Dialect::Rdf),
                    "feed" => Ok(Dialect::Atom),
                    other => Err(CrawlError::Parse(format!("unsupported feed root <{other}>"))),
                };
            }
            Ok(Event::Text(t)) if t.iter().all(u8::is_ascii_whitespace) => continue,
            Ok(Event::Decl(_)) | Ok(Event::Comment(_)) | Ok(Event::DocType(_)) | Ok(Event::PI(_)) => {
                continue;
            }
            Ok(Event::Eof) => return Err(CrawlError::Parse("document has no root element".into())),
            Ok(_) => return Err(CrawlError::Parse("content before the root element".into())),
            Err(e) => return Err(parse_error(e)),
        }
    }
}

fn parse_error(e: impl std::fmt::Display) -> CrawlError {
    CrawlError::Parse(e.to_string())
}

/// HTML named entities that feeds often contain but XML does not define.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}
