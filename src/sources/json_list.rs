//! JSON list sources: an endpoint returning a top-level array of objects.
//!
//! Each element contributes a title (`title`), a link (`url`, falling back to
//! `link`) and a date (`pubDate`, falling back to `date`).

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::resolve_link;
use crate::error::CrawlError;
use crate::models::ListItem;
use crate::utils::collapse_whitespace;

const LINK_FIELDS: &[&str] = &["url", "link"];
const DATE_FIELDS: &[&str] = &["pubDate", "date"];

/// Parse a JSON list body. Anything but a top-level array is a schema error.
pub fn parse_list(body: &str, base_url: &str) -> Result<Vec<ListItem>, CrawlError> {
    let value: Value = serde_json::from_str(body.trim_start_matches('\u{feff}'))
        .map_err(|e| CrawlError::Schema(format!("body is not JSON: {e}")))?;

    let entries = match value {
        Value::Array(entries) => entries,
        other => {
            return Err(CrawlError::Schema(format!(
                "expected a top-level array, got {}",
                kind(&other)
            )));
        }
    };

    let total = entries.len();
    let items: Vec<ListItem> = entries
        .iter()
        .filter_map(|entry| entry.as_object())
        .filter_map(|obj| {
            let link = first_field(obj, LINK_FIELDS).and_then(|l| resolve_link(base_url, &l))?;
            Some(ListItem {
                title: first_field(obj, &["title"])
                    .map(|t| collapse_whitespace(&t))
                    .unwrap_or_default(),
                link,
                published_at: first_field(obj, DATE_FIELDS),
            })
        })
        .collect();

    if items.len() < total {
        warn!(skipped = total - items.len(), "List entries without a link were skipped");
    }
    debug!(count = items.len(), "Parsed JSON list entries");
    Ok(items)
}

/// First of `keys` holding a non-empty string or a number.
fn first_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match obj.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
