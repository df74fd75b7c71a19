//! Consumer-side content cache keyed by article link.
//!
//! [`CachedExtractor`] answers from records it already holds when their body
//! is non-empty, and only calls the wrapped extractor otherwise. Successful
//! extractions are remembered for the rest of the run. The cache is usually
//! seeded from the previous run's output file.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use crate::error::CrawlError;
use crate::extract::ArticleExtractor;
use crate::models::ArticleRecord;

pub struct CachedExtractor<T> {
    inner: T,
    records: Mutex<HashMap<String, ArticleRecord>>,
}

impl<T> CachedExtractor<T>
where
    T: ArticleExtractor,
{
    /// Wrap `inner`, pre-loading `records`. Records with a blank body are
    /// ignored.
    pub fn with_records(inner: T, records: Vec<ArticleRecord>) -> Self {
        let records = records
            .into_iter()
            .filter(|r| !r.content.trim().is_empty())
            .map(|r| (r.link.clone(), r))
            .collect();
        Self {
            inner,
            records: Mutex::new(records),
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or_default()
    }

    fn lookup(&self, url: &str) -> Option<ArticleRecord> {
        self.records.lock().ok()?.get(url).cloned()
    }

    fn remember(&self, record: &ArticleRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.insert(record.link.clone(), record.clone());
        }
    }
}

impl<T> ArticleExtractor for CachedExtractor<T>
where
    T: ArticleExtractor,
{
    async fn extract(&self, url: &str) -> Result<ArticleRecord, CrawlError> {
        if let Some(hit) = self.lookup(url) {
            debug!(%url, "Content cache hit");
            return Ok(hit);
        }
        let record = self.inner.extract(url).await?;
        self.remember(&record);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    impl ArticleExtractor for Counting {
        async fn extract(&self, url: &str) -> Result<ArticleRecord, CrawlError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(record(url, "fresh"))
        }
    }

    fn record(link: &str, content: &str) -> ArticleRecord {
        ArticleRecord {
            title: "t".into(),
            link: link.into(),
            published_at: None,
            content: content.into(),
            extracted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_seeded_body_short_circuits_extraction() {
        let cache = CachedExtractor::with_records(
            Counting::default(),
            vec![record("http://x/1", "cached body"), record("http://x/2", "   ")],
        );
        assert_eq!(cache.len(), 1);

        let hit = cache.extract("http://x/1").await.unwrap();
        assert_eq!(hit.content, "cached body");
        assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 0);

        let miss = cache.extract("http://x/2").await.unwrap();
        assert_eq!(miss.content, "fresh");
        assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remembers_successful_extractions() {
        let cache = CachedExtractor::with_records(Counting::default(), Vec::new());
        cache.extract("http://x/3").await.unwrap();
        cache.extract("http://x/3").await.unwrap();
        assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }
}
