//! Error taxonomy for the acquisition pipeline.
//!
//! List-stage errors ([`CrawlError::Parse`], [`CrawlError::Schema`],
//! [`CrawlError::Fetch`]) abort a whole source. Per-item errors raised while
//! extracting an article are captured by the coordinator and recorded as
//! failures instead of propagating.

use thiserror::Error;

/// Every way the pipeline can fail.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The feed document is not well-formed XML or not a known feed dialect.
    #[error("parse error: {0}")]
    Parse(String),

    /// The JSON list endpoint returned something other than a top-level array.
    #[error("schema error: {0}")]
    Schema(String),

    /// Network-level or HTTP status failure.
    #[error("fetch error for {url}: {message}")]
    Fetch { url: String, message: String },

    /// The page was fetched but no readable body could be extracted.
    #[error("extraction error for {url}: {message}")]
    Extraction { url: String, message: String },

    /// Writing or reading the result file failed.
    #[error("persistence error at {path}: {message}")]
    Persistence { path: String, message: String },
}

impl CrawlError {
    pub fn fetch(url: &str, message: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.to_string(),
            message: message.into(),
        }
    }

    pub fn extraction(url: &str, message: impl Into<String>) -> Self {
        Self::Extraction {
            url: url.to_string(),
            message: message.into(),
        }
    }

    pub fn persistence(path: &str, message: impl Into<String>) -> Self {
        Self::Persistence {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Fetch { .. })
    }
}
