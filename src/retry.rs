//! Retries for article extraction.
//!
//! Only [`CrawlError::Fetch`] is retried. A page that was fetched but had no
//! readable body fails the same way on every attempt, so it is returned at
//! once. Delays double from `base_delay`, are capped at 30s, and get up to
//! 250ms of jitter.

use std::time::{Duration as StdDuration, Instant};

use rand::{Rng, rng};
use tokio::time::sleep;
use tracing::{error, instrument, warn};

use crate::error::CrawlError;
use crate::extract::ArticleExtractor;
use crate::models::ArticleRecord;

/// Wraps an [`ArticleExtractor`]; `max_retries == 0` means one attempt.
#[derive(Debug)]
pub struct RetryExtractor<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryExtractor<T>
where
    T: ArticleExtractor,
{
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }

    fn delay_for(&self, attempt: usize) -> StdDuration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + StdDuration::from_millis(jitter_ms)
    }
}

impl<T> ArticleExtractor for RetryExtractor<T>
where
    T: ArticleExtractor,
{
    #[instrument(level = "debug", skip(self))]
    async fn extract(&self, url: &str) -> Result<ArticleRecord, CrawlError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.extract(url).await {
                Ok(record) => return Ok(record),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        if self.max_retries > 0 {
                            error!(
                                attempt,
                                max = self.max_retries,
                                elapsed_ms_total = total_t0.elapsed().as_millis(),
                                error = %e,
                                "extract() exhausted retries"
                            );
                        }
                        return Err(e);
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_t0.elapsed().as_millis(),
                        ?delay,
                        error = %e,
                        "extract() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
