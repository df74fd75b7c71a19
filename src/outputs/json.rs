//! JSON file output.
//!
//! The records are pretty-printed to a temporary sibling of the target file
//! and then renamed over it, so readers never observe a half-written file.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{error, info, instrument};

use super::ResultSink;
use crate::error::CrawlError;
use crate::models::{ArticleRecord, CrawlOutcome};

/// Writes the success sequence of an outcome to one JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display(&self) -> String {
        self.path.display().to_string()
    }

    /// Read the records back. A missing file is an empty collection.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn load(&self) -> Result<Vec<ArticleRecord>, CrawlError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CrawlError::persistence(&self.display(), e.to_string())),
        };
        let records: Vec<ArticleRecord> = serde_json::from_str(&raw)
            .map_err(|e| CrawlError::persistence(&self.display(), e.to_string()))?;
        info!(count = records.len(), "Loaded previous results");
        Ok(records)
    }
}

impl ResultSink for JsonFileSink {
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    async fn persist(&self, outcome: &CrawlOutcome) -> Result<(), CrawlError> {
        let path = self.display();
        let json = serde_json::to_string_pretty(&outcome.successes)
            .map_err(|e| CrawlError::persistence(&path, e.to_string()))?;

        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        if let Err(e) = fs::write(&tmp_path, json).await {
            error!(error = %e, "Failed to write results");
            return Err(CrawlError::persistence(&path, e.to_string()));
        }
        if let Err(e) = fs::rename(&tmp_path, &self.path).await {
            error!(error = %e, "Failed to move results into place");
            let _ = fs::remove_file(&tmp_path).await;
            return Err(CrawlError::persistence(&path, e.to_string()));
        }

        info!(count = outcome.successes.len(), "Wrote results");
        Ok(())
    }
}
