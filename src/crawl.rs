//! Crawl coordination: one source in, one [`CrawlOutcome`] out.
//!
//! The list stage is all-or-nothing. Once a list exists, every item is
//! extracted as an independent unit of work, at most `concurrency` at a time.
//! A failing item is recorded and never stops the others. Results arrive in
//! completion order and are put back into list order before the outcome is
//! assembled, so the outcome does not depend on scheduling.
//!
//! Cancellation is cooperative: once the token fires no new extraction is
//! started, in-flight ones finish, and the outcome is flagged incomplete with
//! the number of items that were never attempted.

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::error::CrawlError;
use crate::extract::ArticleExtractor;
use crate::models::{ArticleRecord, CrawlFailure, CrawlOutcome, ListItem, SourceDescriptor, SourceFormat};
use crate::sources::ListFetcher;
use crate::utils::truncate_for_log;

pub const DEFAULT_CONCURRENCY: usize = 8;

/// Knobs for a [`CrawlCoordinator`].
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    /// Maximum number of extractions in flight. Values below 1 count as 1.
    pub concurrency: usize,
    /// Skip URL classification and use this format for every source.
    pub format: Option<SourceFormat>,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            format: None,
        }
    }
}

/// Per-item result, tagged with the item's list index.
enum Slot {
    Extracted(ArticleRecord),
    Failed(CrawlFailure),
    NotAttempted,
}

pub struct CrawlCoordinator<E> {
    lists: ListFetcher,
    extractor: E,
    settings: CrawlSettings,
    cancel: CancellationToken,
}

impl<E> CrawlCoordinator<E>
where
    E: ArticleExtractor,
{
    pub fn new(lists: ListFetcher, extractor: E, settings: CrawlSettings, cancel: CancellationToken) -> Self {
        Self {
            lists,
            extractor,
            settings,
            cancel,
        }
    }

    /// Crawl one source: classify, fetch the list, extract every item.
    ///
    /// Fails only when the list cannot be obtained.
    #[instrument(level = "info", skip(self))]
    pub async fn crawl(&self, source_url: &str) -> Result<CrawlOutcome, CrawlError> {
        let source = match self.settings.format {
            Some(format) => SourceDescriptor::with_format(source_url, format),
            None => SourceDescriptor::classify(source_url),
        };
        info!(format = ?source.format, "Classified source");

        let items = self.lists.fetch_list(&source).await?;
        Ok(self.extract_all(&source.url, &items).await)
    }

    /// Extract every item of an already fetched list.
    #[instrument(level = "info", skip_all, fields(%source, items = items.len()))]
    pub async fn extract_all(&self, source: &str, items: &[ListItem]) -> CrawlOutcome {
        let concurrency = self.settings.concurrency.max(1);

        let mut slots: Vec<(usize, Slot)> = stream::iter(items.iter().enumerate())
            .map(|(index, item)| async move { (index, self.extract_one(index, item).await) })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        slots.sort_by_key(|(index, _)| *index);

        let mut outcome = CrawlOutcome {
            source: source.to_string(),
            ..CrawlOutcome::default()
        };
        for (_, slot) in slots {
            match slot {
                Slot::Extracted(record) => outcome.successes.push(record),
                Slot::Failed(failure) => outcome.failures.push(failure),
                Slot::NotAttempted => outcome.unattempted += 1,
            }
        }
        outcome.incomplete = outcome.unattempted > 0;

        info!(
            total = items.len(),
            successful = outcome.successes.len(),
            failed = outcome.failures.len(),
            unattempted = outcome.unattempted,
            "Completed source crawl"
        );
        if outcome.incomplete {
            warn!(unattempted = outcome.unattempted, "Crawl cancelled before every item was attempted");
        }
        outcome
    }

    async fn extract_one(&self, index: usize, item: &ListItem) -> Slot {
        if self.cancel.is_cancelled() {
            return Slot::NotAttempted;
        }

        let result = self.extractor.extract(&item.link).await.and_then(|record| {
            if record.content.trim().is_empty() {
                Err(CrawlError::extraction(&item.link, "empty content"))
            } else {
                Ok(record)
            }
        });

        match result {
            Ok(record) => {
                info!(index, title = %item.title, link = %item.link, "✔ Extracted article");
                Slot::Extracted(record.merged_with(item))
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(
                    index,
                    title = %item.title,
                    link = %item.link,
                    reason = %truncate_for_log(&reason, 300),
                    "✖ Extraction failed"
                );
                Slot::Failed(CrawlFailure {
                    link: item.link.clone(),
                    title: item.title.clone(),
                    reason,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::PageExtractor;
    use crate::http::{build_client, DEFAULT_USER_AGENT};
    use chrono::Utc;
    use std::collections::HashMap;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Answers from a fixed table; unknown links fail. An optional delay per
    /// link shuffles completion order.
    #[derive(Default)]
    struct Scripted {
        bodies: HashMap<String, String>,
        delays_ms: HashMap<String, u64>,
        cancel_on: Option<(String, CancellationToken)>,
    }

    impl ArticleExtractor for Scripted {
        async fn extract(&self, url: &str) -> Result<ArticleRecord, CrawlError> {
            if let Some((link, token)) = &self.cancel_on {
                if link == url {
                    token.cancel();
                }
            }
            if let Some(ms) = self.delays_ms.get(url) {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            let content = self
                .bodies
                .get(url)
                .ok_or_else(|| CrawlError::fetch(url, "http status 404"))?;
            Ok(ArticleRecord {
                title: "page title".into(),
                link: url.to_string(),
                published_at: None,
                content: content.clone(),
                extracted_at: Utc::now(),
            })
        }
    }

    fn client() -> reqwest::Client {
        build_client(Duration::from_secs(5), DEFAULT_USER_AGENT).unwrap()
    }

    fn coordinator<E: ArticleExtractor>(extractor: E, concurrency: usize, cancel: CancellationToken) -> CrawlCoordinator<E> {
        CrawlCoordinator::new(
            ListFetcher::new(client()),
            extractor,
            CrawlSettings {
                concurrency,
                format: None,
            },
            cancel,
        )
    }

    fn items(n: usize) -> Vec<ListItem> {
        (1..=n)
            .map(|i| ListItem {
                title: format!("T{i}"),
                link: format!("http://x/{i}"),
                published_at: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_failure_is_isolated_and_order_preserved() {
        let mut scripted = Scripted::default();
        scripted.bodies.insert("http://x/1".into(), "body1".into());
        scripted.bodies.insert("http://x/3".into(), "body3".into());

        let outcome = coordinator(scripted, 4, CancellationToken::new())
            .extract_all("src", &items(3))
            .await;

        let links: Vec<&str> = outcome.successes.iter().map(|r| r.link.as_str()).collect();
        assert_eq!(links, vec!["http://x/1", "http://x/3"]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].link, "http://x/2");
        assert_eq!(outcome.failures[0].title, "T2");
        assert!(outcome.failures[0].reason.contains("404"));
        assert_eq!(outcome.successes.len() + outcome.failures.len(), 3);
        assert!(!outcome.incomplete);
    }

    #[tokio::test]
    async fn test_results_are_reordered_after_concurrent_completion() {
        let list = items(5);
        let mut scripted = Scripted::default();
        for (i, item) in list.iter().enumerate() {
            scripted.bodies.insert(item.link.clone(), format!("body{}", i + 1));
            // earlier items finish last
            scripted.delays_ms.insert(item.link.clone(), (5 - i as u64) * 20);
        }

        let outcome = coordinator(scripted, 5, CancellationToken::new())
            .extract_all("src", &list)
            .await;

        let contents: Vec<&str> = outcome.successes.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["body1", "body2", "body3", "body4", "body5"]);
        assert_eq!(outcome.successes[0].title, "T1");
    }

    #[tokio::test]
    async fn test_empty_content_counts_as_failure() {
        let mut scripted = Scripted::default();
        scripted.bodies.insert("http://x/1".into(), "  \n ".into());

        let outcome = coordinator(scripted, 2, CancellationToken::new())
            .extract_all("src", &items(1))
            .await;
        assert!(outcome.successes.is_empty());
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].reason.starts_with("extraction error"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_attempts_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = coordinator(Scripted::default(), 2, cancel)
            .extract_all("src", &items(3))
            .await;
        assert!(outcome.incomplete);
        assert_eq!(outcome.unattempted, 3);
        assert!(outcome.successes.is_empty());
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_crawl_keeps_completed_items() {
        let cancel = CancellationToken::new();
        let mut scripted = Scripted::default();
        for item in items(4) {
            scripted.bodies.insert(item.link.clone(), "body".into());
        }
        scripted.cancel_on = Some(("http://x/2".into(), cancel.clone()));

        let outcome = coordinator(scripted, 1, cancel)
            .extract_all("src", &items(4))
            .await;

        let links: Vec<&str> = outcome.successes.iter().map(|r| r.link.as_str()).collect();
        assert_eq!(links, vec!["http://x/1", "http://x/2"]);
        assert_eq!(outcome.unattempted, 2);
        assert!(outcome.incomplete);
        assert_eq!(outcome.accounted(), 4);
    }

    async fn page(server: &MockServer, at: &str, status: u16, html: &str) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(ResponseTemplate::new(status).set_body_raw(html.to_string(), "text/html"))
            .mount(server)
            .await;
    }

    fn live_coordinator() -> CrawlCoordinator<PageExtractor> {
        CrawlCoordinator::new(
            ListFetcher::new(client()),
            PageExtractor::new(client()),
            CrawlSettings::default(),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_json_source_with_reachable_page() {
        let server = MockServer::start().await;
        let link = format!("{}/1", server.uri());
        let list = format!(r#"[{{"title":"T1","url":"{link}","date":"2024-01-01"}}]"#);
        Mock::given(method("GET"))
            .and(path("/api/news"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(list, "application/json"))
            .mount(&server)
            .await;
        page(&server, "/1", 200, "<html><body><article><p>body1</p></article></body></html>").await;

        let outcome = live_coordinator()
            .crawl(&format!("{}/api/news", server.uri()))
            .await
            .unwrap();

        assert_eq!(outcome.successes.len(), 1);
        let record = &outcome.successes[0];
        assert_eq!(record.title, "T1");
        assert_eq!(record.link, link);
        assert_eq!(record.published_at.as_deref(), Some("2024-01-01"));
        assert_eq!(record.content, "body1");
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn test_json_source_with_unreachable_page() {
        let server = MockServer::start().await;
        let link = format!("{}/1", server.uri());
        let list = format!(r#"[{{"title":"T1","url":"{link}","date":"2024-01-01"}}]"#);
        Mock::given(method("GET"))
            .and(path("/api/news"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(list, "application/json"))
            .mount(&server)
            .await;

        let outcome = live_coordinator()
            .crawl(&format!("{}/api/news", server.uri()))
            .await
            .unwrap();

        assert!(outcome.successes.is_empty());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].link, link);
        assert_eq!(outcome.failures[0].title, "T1");
        assert!(outcome.failures[0].reason.starts_with("fetch error"));
    }

    #[tokio::test]
    async fn test_malformed_feed_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rss/news.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<<< definitely not a feed"))
            .mount(&server)
            .await;

        let err = live_coordinator()
            .crawl(&format!("{}/rss/news.xml", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::Parse(_)));
    }

    #[tokio::test]
    async fn test_non_array_json_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/news"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data":[]}"#))
            .mount(&server)
            .await;

        let err = live_coordinator()
            .crawl(&format!("{}/api/news", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::Schema(_)));
    }

    #[tokio::test]
    async fn test_middle_item_failure_over_http() {
        let server = MockServer::start().await;
        let entries: Vec<String> = (1..=3)
            .map(|i| format!(r#"{{"title":"T{i}","link":"{}/{i}"}}"#, server.uri()))
            .collect();
        Mock::given(method("GET"))
            .and(path("/api/news"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(format!("[{}]", entries.join(",")), "application/json"),
            )
            .mount(&server)
            .await;
        page(&server, "/1", 200, "<article><p>one</p></article>").await;
        page(&server, "/2", 500, "oops").await;
        page(&server, "/3", 200, "<article><p>three</p></article>").await;

        let outcome = live_coordinator()
            .crawl(&format!("{}/api/news", server.uri()))
            .await
            .unwrap();

        let titles: Vec<&str> = outcome.successes.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["T1", "T3"]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].title, "T2");
        assert_eq!(outcome.successes.len() + outcome.failures.len(), 3);
    }
}
