//! Data models shared across the pipeline.
//!
//! - [`SourceDescriptor`] / [`SourceFormat`]: what kind of endpoint a source is
//! - [`ListItem`]: a lightweight reference to an article, before extraction
//! - [`ArticleRecord`]: a fully extracted article
//! - [`CrawlOutcome`]: everything one crawl produced, successes and failures
//!
//! `ArticleRecord` serializes with camelCase field names (`publishedAt`,
//! `extractedAt`) because that is the shape downstream consumers read.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::sources::classify;

/// How the item list of a source is retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceFormat {
    /// RSS 2.0, RSS 1.0 (RDF) or Atom feed document.
    Rss,
    /// HTTP endpoint returning a top-level JSON array.
    JsonList,
    /// Not decided from the URL; the response body decides.
    Unknown,
}

/// A source URL together with its list-retrieval strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub url: String,
    pub format: SourceFormat,
}

impl SourceDescriptor {
    /// Build a descriptor, inferring the format from the URL.
    pub fn classify(url: &str) -> Self {
        Self {
            url: url.to_string(),
            format: classify(url),
        }
    }

    /// Build a descriptor with a caller-chosen format.
    pub fn with_format(url: &str, format: SourceFormat) -> Self {
        Self {
            url: url.to_string(),
            format,
        }
    }
}

/// One entry of a source's list. `link` is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    pub title: String,
    pub link: String,
    /// Publication date verbatim as the source gave it.
    pub published_at: Option<String>,
}

/// An article whose body was extracted successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleRecord {
    pub title: String,
    pub link: String,
    pub published_at: Option<String>,
    /// Readable article body; never empty.
    pub content: String,
    pub extracted_at: DateTime<Utc>,
}

impl ArticleRecord {
    /// Combine an extracted page with the list entry that pointed at it.
    ///
    /// Values from the list win when present; the page fills the gaps. The
    /// link is always the list's link so it stays the identity key.
    pub fn merged_with(self, item: &ListItem) -> Self {
        let title = if item.title.trim().is_empty() {
            self.title
        } else {
            item.title.clone()
        };
        let published_at = item
            .published_at
            .clone()
            .filter(|d| !d.trim().is_empty())
            .or(self.published_at);

        Self {
            title,
            link: item.link.clone(),
            published_at,
            content: self.content,
            extracted_at: self.extracted_at,
        }
    }
}

/// A list item whose extraction failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlFailure {
    pub link: String,
    pub title: String,
    pub reason: String,
}

/// The result of crawling one source (or several, once merged).
///
/// Both sequences keep the order of the source list. For a crawl that ran to
/// completion every list item is in exactly one of them. When the crawl was
/// cancelled, `incomplete` is set and `unattempted` counts the items that were
/// never started; those appear in neither sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlOutcome {
    pub source: String,
    pub successes: Vec<ArticleRecord>,
    pub failures: Vec<CrawlFailure>,
    pub incomplete: bool,
    pub unattempted: usize,
}

impl CrawlOutcome {
    /// Number of list items this outcome accounts for.
    pub fn accounted(&self) -> usize {
        self.successes.len() + self.failures.len() + self.unattempted
    }

    /// Fold several per-source outcomes into one collection.
    ///
    /// Successes are deduplicated by `link`, keeping the first occurrence.
    /// Failures are kept as they are.
    pub fn merge(outcomes: Vec<CrawlOutcome>) -> CrawlOutcome {
        let source = outcomes.iter().map(|o| o.source.as_str()).join(",");
        let incomplete = outcomes.iter().any(|o| o.incomplete);
        let unattempted = outcomes.iter().map(|o| o.unattempted).sum();

        let mut successes = Vec::new();
        let mut failures = Vec::new();
        for outcome in outcomes {
            successes.extend(outcome.successes);
            failures.extend(outcome.failures);
        }
        let successes = successes
            .into_iter()
            .unique_by(|r| r.link.clone())
            .collect::<Vec<ArticleRecord>>();

        CrawlOutcome {
            source,
            successes,
            failures,
            incomplete,
            unattempted,
        }
    }
}
