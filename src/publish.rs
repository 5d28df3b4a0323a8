use serde::Deserialize;
use thiserror::Error;

use crate::timeline::TimelineEntry;

const INDEX_NAME: &str = "nest";
const DOC_TYPE: &str = "video";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to encode timeline entry: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("the index reported errors for the uploaded batch")]
    IndexErrors,
}

#[derive(Deserialize)]
struct BulkResponse {
    errors: bool,
}

/// Pushes the recovered timeline to an external search index. Decoupled
/// from recovery: a failure here never disturbs video files already on
/// disk.
pub struct TimelinePublisher {
    client: reqwest::Client,
    base_url: String,
}

impl TimelinePublisher {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Upload the whole timeline as one bulk request, each entry keyed by
    /// the named sort field's value.
    pub async fn publish(
        &self,
        entries: &[TimelineEntry],
        sort_key: &str,
    ) -> Result<(), PublishError> {
        if entries.is_empty() {
            return Ok(());
        }

        let url = format!("{}/{}/_bulk", self.base_url, INDEX_NAME);
        let response: BulkResponse = self
            .client
            .post(&url)
            .header("Content-Type", "application/x-ndjson")
            .body(bulk_body(entries, sort_key)?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.errors {
            return Err(PublishError::IndexErrors);
        }
        tracing::info!(entries = entries.len(), url = %url, "timeline uploaded");
        Ok(())
    }
}

/// One action line plus one document line per entry, newline-terminated.
fn bulk_body(entries: &[TimelineEntry], sort_key: &str) -> Result<String, serde_json::Error> {
    let mut body = String::new();
    for entry in entries {
        let doc = serde_json::to_value(entry)?;
        let action = serde_json::json!({
            "index": {
                "_index": INDEX_NAME,
                "_type": DOC_TYPE,
                "_id": doc.get(sort_key).cloned().unwrap_or(serde_json::Value::Null),
            }
        });
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(&doc.to_string());
        body.push('\n');
    }
    Ok(body)
}
