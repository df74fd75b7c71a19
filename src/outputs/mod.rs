//! Durable output for crawl results.
//!
//! A [`ResultSink`] receives the merged [`CrawlOutcome`] once crawling is
//! done. Only the success sequence is written; failures stay in the logs.
//!
//! # Submodules
//!
//! - [`json`]: writes the records as a JSON array to a single file
//!
//! # Output Shape
//!
//! ```text
//! [
//!   {
//!     "title": "...",
//!     "link": "https://...",
//!     "publishedAt": "2024-01-01",
//!     "content": "...",
//!     "extractedAt": "2024-01-01T08:00:00Z"
//!   }
//! ]
//! ```

pub mod json;

use crate::error::CrawlError;
use crate::models::CrawlOutcome;

/// Somewhere a crawl's records can be stored.
///
/// A failed `persist` leaves the caller's outcome untouched.
pub trait ResultSink {
    async fn persist(&self, outcome: &CrawlOutcome) -> Result<(), CrawlError>;
}
