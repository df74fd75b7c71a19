//! Source classification and list retrieval.
//!
//! A source is either a feed document or an HTTP endpoint that returns a JSON
//! array. [`classify`] picks the strategy from the URL alone and
//! [`ListFetcher`] retrieves the list with it, normalizing both shapes to
//! [`ListItem`].
//!
//! | Format | Module | Accepted shapes |
//! |--------|--------|-----------------|
//! | RSS | [`rss`] | RSS 2.0, RSS 1.0 (RDF), Atom |
//! | JSON list | [`json_list`] | top-level array of objects with `url`/`link` |
//!
//! A source either yields its whole list or fails: network errors, malformed
//! feeds and unexpected JSON shapes never produce a partial list.

pub mod json_list;
pub mod rss;

use reqwest::Client;
use tracing::{info, instrument};
use url::Url;

use crate::error::CrawlError;
use crate::http::get_text;
use crate::models::{ListItem, SourceDescriptor, SourceFormat};

/// Path suffixes that mark a feed document.
const FEED_EXTENSIONS: &[&str] = &[".xml", ".rss", ".atom", ".rdf"];
/// Substrings anywhere in the URL that mark a feed.
const FEED_TOKENS: &[&str] = &["rss", "feed", "atom"];

/// Decide how a source's list should be fetched.
///
/// Never fails: anything that does not look like a feed is treated as a JSON
/// list and rejected later with a schema error if it is not one.
pub fn classify(url: &str) -> SourceFormat {
    let lower = url.trim().to_ascii_lowercase();
    let path = match Url::parse(&lower) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => lower.split(['?', '#']).next().unwrap_or_default().to_string(),
    };

    let feed_like = FEED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
        || FEED_TOKENS.iter().any(|token| lower.contains(token));
    if feed_like {
        SourceFormat::Rss
    } else {
        SourceFormat::JsonList
    }
}

/// Resolve an entry's link against the source URL.
///
/// Returns `None` for blank links. Absolute links come back unchanged; relative
/// ones are joined onto `base` when it parses as a URL.
pub(crate) fn resolve_link(base: &str, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match Url::parse(base).and_then(|b| b.join(raw)) {
        Ok(joined) => Some(joined.to_string()),
        Err(_) => Some(raw.to_string()),
    }
}

/// Retrieves the item list of a source.
#[derive(Debug, Clone)]
pub struct ListFetcher {
    client: Client,
}

impl ListFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Fetch and normalize the list of `source`, in the source's own order.
    #[instrument(level = "info", skip_all, fields(url = %source.url, format = ?source.format))]
    pub async fn fetch_list(&self, source: &SourceDescriptor) -> Result<Vec<ListItem>, CrawlError> {
        let body = get_text(&self.client, &source.url).await?;
        let items = parse_list_body(source, &body)?;
        info!(count = items.len(), "Fetched source list");
        Ok(items)
    }
}

/// Parse an already fetched list body according to the source's format.
pub fn parse_list_body(source: &SourceDescriptor, body: &str) -> Result<Vec<ListItem>, CrawlError> {
    match source.format {
        SourceFormat::Rss => rss::parse_feed(body, &source.url),
        SourceFormat::JsonList => json_list::parse_list(body, &source.url),
        SourceFormat::Unknown => {
            if body.trim_start_matches('\u{feff}').trim_start().starts_with('<') {
                rss::parse_feed(body, &source.url)
            } else {
                json_list::parse_list(body, &source.url)
            }
        }
    }
}
