//! # news_harvest
//!
//! A news acquisition pipeline: reads item lists from RSS/Atom feeds or JSON
//! list APIs, extracts the readable body of every linked article, and writes
//! a deduplicated JSON collection for downstream consumers.
//!
//! ## Usage
//!
//! ```sh
//! news_harvest -o news_result.json https://news.cctv.com/rss/rollnews.xml
//! ```
//!
//! ## Architecture
//!
//! 1. **Classification**: decide per source whether it is a feed or a JSON list
//! 2. **Listing**: fetch and normalize the item list (all-or-nothing per source)
//! 3. **Extraction**: fetch and parse every article page, a bounded number at a
//!    time, recording failures without stopping the batch
//! 4. **Output**: merge all sources, drop duplicate links, write one JSON file

use std::error::Error;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cache;
mod cli;
mod crawl;
mod error;
mod extract;
mod http;
mod models;
mod outputs;
mod retry;
mod sources;
mod utils;

use cache::CachedExtractor;
use cli::Cli;
use crawl::{CrawlCoordinator, CrawlSettings};
use extract::PageExtractor;
use models::CrawlOutcome;
use outputs::ResultSink;
use outputs::json::JsonFileSink;
use retry::RetryExtractor;
use sources::ListFetcher;
use utils::ensure_writable_parent;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news_harvest starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    // Early check: fail before crawling if the results cannot be written
    if let Err(e) = ensure_writable_parent(&args.output).await {
        error!(path = %args.output, error = %e, "Output location is not writable");
        return Err(e);
    }

    let client = http::build_client(Duration::from_secs(args.timeout_secs), &args.user_agent)?;
    let sink = JsonFileSink::new(&args.output);

    let seed = if args.resume {
        sink.load().await.unwrap_or_else(|e| {
            warn!(error = %e, "Could not read previous results; starting with an empty cache");
            Vec::new()
        })
    } else {
        Vec::new()
    };

    let extractor = CachedExtractor::with_records(
        RetryExtractor::new(
            PageExtractor::new(client.clone()),
            args.retries,
            Duration::from_millis(args.retry_base_ms),
        ),
        seed,
    );
    info!(cached = extractor.len(), "Content cache ready");

    // Ctrl-C stops new extractions; finished work is still written
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; finishing in-flight articles");
                cancel.cancel();
            }
        });
    }

    let coordinator = CrawlCoordinator::new(
        ListFetcher::new(client),
        extractor,
        CrawlSettings {
            concurrency: args.concurrency,
            format: args.format,
        },
        cancel.clone(),
    );

    // ---- Crawl every source ----
    let mut outcomes = Vec::new();
    for source in &args.sources {
        if cancel.is_cancelled() {
            warn!(%source, "Skipping source after interrupt");
            continue;
        }
        match coordinator.crawl(source).await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => error!(%source, error = %e, "Source failed; no items taken from it"),
        }
    }

    if outcomes.is_empty() {
        error!("No source produced a list; leaving the output untouched");
        return Err("no source produced a list".into());
    }

    let merged = CrawlOutcome::merge(outcomes);
    for failure in &merged.failures {
        debug!(link = %failure.link, title = %failure.title, reason = %failure.reason, "Recorded failure");
    }
    info!(
        articles = merged.successes.len(),
        failed = merged.failures.len(),
        unattempted = merged.unattempted,
        accounted = merged.accounted(),
        incomplete = merged.incomplete,
        "All sources crawled"
    );

    // ---- Output ----
    if let Err(e) = sink.persist(&merged).await {
        error!(path = %args.output, error = %e, "Failed to write results");
        return Err(e.into());
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        path = %sink.path().display(),
        "Execution complete"
    );

    Ok(())
}
