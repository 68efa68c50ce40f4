//! Managed backend: a hosted sandbox service that runs the browser and
//! accepts execute/action RPCs keyed by session id.
//!
//! Every call is a short-lived, independently timed-out HTTP request with a
//! bearer credential. No connection is held by this layer; fault isolation
//! comes for free from the per-call transport.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use webpilot_core::types::BackendKind;
use webpilot_core::{Error, Result};

use crate::{BrowserAction, PageInfo, SandboxBackend, Screenshot};

pub struct ManagedBackend {
    client: Client,
    api_base: String,
    api_key: String,
    session_id: String,
}

impl ManagedBackend {
    pub fn new(api_base: &str, api_key: &str, session_id: &str, call_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(call_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            session_id: session_id.to_string(),
        }
    }

    fn session_url(&self, path: &str) -> String {
        format!("{}/v1/sessions/{}/{}", self.api_base, self.session_id, path)
    }

    async fn rpc(&self, path: &str, body: Value) -> Result<Value> {
        let url = self.session_url(path);
        debug!(url = %url, "Managed sandbox RPC");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("Sandbox RPC {} timed out", path))
                } else {
                    Error::Tool(format!("Sandbox RPC {} failed: {}", path, e))
                }
            })?;

        let status = response.status();
        let payload: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            let message = payload
                .get("error")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("Sandbox RPC {} returned {}", path, status));
            return Err(Error::Tool(message));
        }

        Ok(payload)
    }
}

#[async_trait]
impl SandboxBackend for ManagedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Managed
    }

    async fn list_pages(&self) -> Result<Vec<PageInfo>> {
        let payload = self.rpc("pages", json!({"op": "list"})).await?;
        let pages = payload
            .get("pages")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(pages
            .iter()
            .filter_map(|p| serde_json::from_value(p.clone()).ok())
            .collect())
    }

    async fn close_page(&self, page_id: &str) -> Result<()> {
        self.rpc("pages", json!({"op": "close", "pageId": page_id}))
            .await?;
        Ok(())
    }

    async fn focus_page(&self, page_id: &str) -> Result<()> {
        self.rpc("pages", json!({"op": "activate", "pageId": page_id}))
            .await?;
        Ok(())
    }

    async fn run_action(&self, action: &BrowserAction) -> Result<Value> {
        let params = match action {
            BrowserAction::Navigate { url } => json!({"url": url}),
            BrowserAction::Click { x, y, button } => json!({"x": x, "y": y, "button": button}),
            BrowserAction::Move { x, y } => json!({"x": x, "y": y}),
            BrowserAction::TypeText { text } => json!({"text": text}),
            BrowserAction::KeyPress { key } => json!({"key": key}),
            BrowserAction::Scroll { x, y, delta_x, delta_y } => {
                json!({"x": x, "y": y, "deltaX": delta_x, "deltaY": delta_y})
            }
        };
        let payload = self
            .rpc("action", json!({"action": action.name(), "params": params}))
            .await?;
        Ok(payload.get("result").cloned().unwrap_or(payload))
    }

    async fn run_code(&self, code: &str) -> Result<Value> {
        let payload = self.rpc("code", json!({"code": code})).await?;
        if payload.get("success").and_then(|v| v.as_bool()) == Some(false) {
            let message = payload
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("Code execution failed");
            return Err(Error::Tool(message.to_string()));
        }
        Ok(payload.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn screenshot(&self, full_page: bool) -> Result<Screenshot> {
        let payload = self
            .rpc("action", json!({"action": "screenshot", "params": {"fullPage": full_page}}))
            .await?;
        let result = payload.get("result").unwrap_or(&payload);

        // The service reports size and content type; any inline encoding it
        // returns is dropped here to keep traces small.
        let byte_count = result
            .get("byteCount")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .or_else(|| {
                result
                    .get("data")
                    .and_then(|v| v.as_str())
                    .map(|data| data.len() / 4 * 3)
            })
            .unwrap_or(0);
        let content_type = result
            .get("contentType")
            .and_then(|v| v.as_str())
            .unwrap_or("image/png")
            .to_string();

        Ok(Screenshot {
            byte_count,
            content_type,
            preview_base64: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_url() {
        let backend = ManagedBackend::new(
            "https://sandbox.example.com/",
            "key",
            "sess-42",
            Duration::from_secs(30),
        );
        assert_eq!(
            backend.session_url("action"),
            "https://sandbox.example.com/v1/sessions/sess-42/action"
        );
    }

    #[test]
    fn test_kind() {
        let backend =
            ManagedBackend::new("https://s.example.com", "k", "s", Duration::from_secs(30));
        assert_eq!(backend.kind(), BackendKind::Managed);
    }
}
