//! Command-line interface definitions for news_harvest.
//!
//! All options can be given as flags or environment variables.

use clap::Parser;

use crate::crawl::DEFAULT_CONCURRENCY;
use crate::http::DEFAULT_USER_AGENT;
use crate::models::SourceFormat;

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # One RSS feed, default output file
/// news_harvest https://news.cctv.com/rss/rollnews.xml
///
/// # A JSON API and a feed, 4 extractions at a time, reuse earlier bodies
/// news_harvest -c 4 --resume -o out/news.json https://api.example.com/news https://example.com/feed
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Source URLs (RSS/Atom feeds or JSON list endpoints)
    #[arg(required = true, env = "NEWS_SOURCES", value_delimiter = ',')]
    pub sources: Vec<String>,

    /// Output file for the extracted articles
    #[arg(short, long, env = "NEWS_OUTPUT", default_value = "news_result.json")]
    pub output: String,

    /// Maximum number of article pages fetched at once
    #[arg(short, long, env = "CRAWL_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Per-request timeout in seconds
    #[arg(long, env = "CRAWL_TIMEOUT_SECS", default_value_t = 20)]
    pub timeout_secs: u64,

    /// User-Agent header sent with every request
    #[arg(long, env = "CRAWL_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Retries per article page after a network failure
    #[arg(long, env = "CRAWL_RETRIES", default_value_t = 0)]
    pub retries: usize,

    /// Initial backoff between retries, in milliseconds
    #[arg(long, default_value_t = 500)]
    pub retry_base_ms: u64,

    /// Treat every source as this format instead of guessing from its URL
    #[arg(long, value_enum)]
    pub format: Option<SourceFormat>,

    /// Reuse article bodies already present in the output file
    #[arg(long)]
    pub resume: bool,
}
