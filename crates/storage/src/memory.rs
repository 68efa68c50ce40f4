//! REST client for the cross-session memory service.
//!
//! Prior task summaries are read before a run and injected as advisory
//! context; a one-line summary is written back after a successful run. Both
//! directions are best-effort: the memory service being down never fails a
//! run.

use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use webpilot_core::{Error, Result};

/// One remembered task from an earlier session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryItem {
    pub task: String,
    pub summary: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MemoryListResponse {
    #[serde(default)]
    memories: Vec<MemoryItem>,
}

pub struct MemoryClient {
    client: Client,
    api_base: String,
}

impl MemoryClient {
    pub fn new(api_base: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the most recent task summaries and render them as an advisory
    /// context block. Returns `None` when the store has nothing.
    pub async fn recent_context(&self, limit: usize) -> Result<Option<String>> {
        let url = format!("{}/v1/memories?limit={}", self.api_base, limit);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Storage(format!("Memory read failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Storage(format!(
                "Memory read returned {}",
                response.status()
            )));
        }

        let list: MemoryListResponse = response
            .json()
            .await
            .map_err(|e| Error::Storage(format!("Memory read returned invalid JSON: {}", e)))?;

        if list.memories.is_empty() {
            return Ok(None);
        }

        debug!(count = list.memories.len(), "Loaded memory context");
        Ok(Some(render_context(&list.memories)))
    }

    /// Record a finished run. Failures are the caller's to swallow; this
    /// client only reports them.
    pub async fn record_run(&self, task: &str, summary: &str) -> Result<()> {
        let url = format!("{}/v1/memories", self.api_base);
        let item = MemoryItem {
            task: task.to_string(),
            summary: summary.to_string(),
            created_at: Some(Utc::now().to_rfc3339()),
        };
        let response = self
            .client
            .post(&url)
            .json(&item)
            .send()
            .await
            .map_err(|e| Error::Storage(format!("Memory write failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Storage(format!(
                "Memory write returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Write a run summary, logging instead of propagating on failure.
    pub async fn record_run_best_effort(&self, task: &str, summary: &str) {
        if let Err(e) = self.record_run(task, summary).await {
            warn!(error = %e, "Failed to record run in memory service");
        }
    }
}

fn render_context(items: &[MemoryItem]) -> String {
    let mut out = String::new();
    for item in items {
        out.push_str("- Task: ");
        out.push_str(item.task.trim());
        out.push_str("\n  Outcome: ");
        out.push_str(item.summary.trim());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_context() {
        let items = vec![
            MemoryItem {
                task: "check the weather".to_string(),
                summary: "Found 18°C in Ghent".to_string(),
                created_at: None,
            },
            MemoryItem {
                task: "get page title".to_string(),
                summary: "Example Domain".to_string(),
                created_at: None,
            },
        ];
        let block = render_context(&items);
        assert!(block.contains("- Task: check the weather"));
        assert!(block.contains("Outcome: Example Domain"));
        assert_eq!(block.lines().count(), 4);
    }

    #[test]
    fn test_list_response_tolerates_missing_field() {
        let parsed: MemoryListResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.memories.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_store_is_an_error_not_a_panic() {
        let client = MemoryClient::new("http://127.0.0.1:1");
        let err = client.recent_context(5).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        // Best-effort write swallows the same failure.
        client.record_run_best_effort("t", "s").await;
    }
}
