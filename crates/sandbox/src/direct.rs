//! Direct backend: drives the browser protocol itself over a remote-debugging
//! WebSocket endpoint.
//!
//! The connection is a scoped resource. Every operation opens a fresh
//! transport, locates the first browser context, resolves or creates the
//! primary page, executes, and closes the transport on every exit path. No
//! connection is ever held across tool calls; one call's transport failure
//! cannot corrupt a later call.

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use webpilot_core::types::BackendKind;
use webpilot_core::{Error, Result};

use crate::cdp::CdpClient;
use crate::{BrowserAction, PageInfo, SandboxBackend, Screenshot};

pub struct DirectBackend {
    ws_url: String,
    call_timeout: Duration,
    preview_chars: usize,
}

/// One attached page session on a live transport. Dropping the guard (or the
/// client inside it) aborts the socket tasks, so the transport is released on
/// every exit path even when an operation errors mid-way.
struct PageSession {
    client: CdpClient,
    session_id: String,
}

impl PageSession {
    async fn page_command(&self, method: &str, params: Value) -> Result<Value> {
        self.client
            .command(Some(&self.session_id), method, params)
            .await
    }
}

impl DirectBackend {
    pub fn new(ws_url: &str, call_timeout: Duration, preview_chars: usize) -> Self {
        Self {
            ws_url: ws_url.to_string(),
            call_timeout,
            preview_chars,
        }
    }

    /// Open the transport only (no page attachment). Used for page
    /// enumeration and lifecycle commands.
    async fn connect(&self) -> Result<CdpClient> {
        CdpClient::connect(&self.ws_url, self.call_timeout).await
    }

    /// Open the transport and attach to the primary page: the first page
    /// target in enumeration order, or a fresh blank one if none exists.
    async fn attach_primary(&self) -> Result<PageSession> {
        let client = self.connect().await?;
        let result = self.attach_primary_on(&client).await;
        match result {
            Ok(session_id) => Ok(PageSession { client, session_id }),
            Err(e) => {
                client.close();
                Err(e)
            }
        }
    }

    /// Resolve-or-create the primary page and attach to it. Failures here
    /// mean the connection itself is unusable, so they are all
    /// connector-class.
    async fn attach_primary_on(&self, client: &CdpClient) -> Result<String> {
        let pages = client
            .page_targets()
            .await
            .map_err(|e| Error::Sandbox(format!("No browser context found: {}", e.message())))?;

        let target_id = match pages.first().and_then(|t| t.get("targetId")).and_then(|v| v.as_str())
        {
            Some(id) => id.to_string(),
            None => {
                debug!("No page target open, creating one");
                client
                    .create_target("about:blank")
                    .await
                    .map_err(|e| Error::Sandbox(e.message()))?
            }
        };

        client
            .attach(&target_id)
            .await
            .map_err(|e| Error::Sandbox(e.message()))
    }
}

/// Map a named key to its CDP (key, code, windowsVirtualKeyCode) triple.
/// Single printable characters pass through as text keys.
fn named_key(key: &str) -> Option<(&'static str, &'static str, i32)> {
    match key.to_lowercase().as_str() {
        "enter" | "return" => Some(("Enter", "Enter", 13)),
        "tab" => Some(("Tab", "Tab", 9)),
        "escape" | "esc" => Some(("Escape", "Escape", 27)),
        "backspace" => Some(("Backspace", "Backspace", 8)),
        "delete" => Some(("Delete", "Delete", 46)),
        "space" => Some((" ", "Space", 32)),
        "up" | "arrowup" => Some(("ArrowUp", "ArrowUp", 38)),
        "down" | "arrowdown" => Some(("ArrowDown", "ArrowDown", 40)),
        "left" | "arrowleft" => Some(("ArrowLeft", "ArrowLeft", 37)),
        "right" | "arrowright" => Some(("ArrowRight", "ArrowRight", 39)),
        "pageup" => Some(("PageUp", "PageUp", 33)),
        "pagedown" => Some(("PageDown", "PageDown", 34)),
        "home" => Some(("Home", "Home", 36)),
        "end" => Some(("End", "End", 35)),
        _ => None,
    }
}

impl DirectBackend {
    async fn dispatch_key(&self, session: &PageSession, key: &str) -> Result<()> {
        let (key_name, code, vk, text) = match named_key(key) {
            Some((k, c, vk)) => (k.to_string(), c.to_string(), Some(vk), None),
            None => {
                let mut chars = key.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => (key.to_string(), format!("Key{}", c.to_uppercase()), None, Some(key.to_string())),
                    _ => {
                        return Err(Error::Tool(format!("Unknown key: {}", key)));
                    }
                }
            }
        };

        for event_type in ["keyDown", "keyUp"] {
            let mut params = json!({
                "type": event_type,
                "key": key_name,
                "code": code,
            });
            if let Some(vk) = vk {
                params["windowsVirtualKeyCode"] = json!(vk);
                params["nativeVirtualKeyCode"] = json!(vk);
            }
            if event_type == "keyDown" {
                if let Some(t) = &text {
                    params["text"] = json!(t);
                }
            }
            session.page_command("Input.dispatchKeyEvent", params).await?;
        }
        Ok(())
    }

    async fn mouse_event(
        &self,
        session: &PageSession,
        event_type: &str,
        x: f64,
        y: f64,
        extra: Value,
    ) -> Result<()> {
        let mut params = json!({
            "type": event_type,
            "x": x,
            "y": y,
        });
        if let Some(obj) = extra.as_object() {
            for (k, v) in obj {
                params[k.as_str()] = v.clone();
            }
        }
        session.page_command("Input.dispatchMouseEvent", params).await?;
        Ok(())
    }

    async fn navigate(&self, session: &PageSession, url: &str) -> Result<Value> {
        session.page_command("Page.enable", json!({})).await?;
        let mut loaded = session.client.subscribe_event("Page.loadEventFired").await;

        let nav = session
            .page_command("Page.navigate", json!({"url": url}))
            .await?;
        if let Some(err) = nav.get("errorText").and_then(|v| v.as_str()) {
            return Err(Error::Tool(format!("Navigation to {} failed: {}", url, err)));
        }

        // Wait for DOM-ready; a slow page falls through to a readyState check
        // rather than failing the call outright.
        if tokio::time::timeout(self.call_timeout, loaded.recv()).await.is_err() {
            let state = self
                .evaluate(session, "document.readyState")
                .await
                .ok()
                .and_then(|v| v.as_str().map(|s| s.to_string()))
                .unwrap_or_default();
            if state != "interactive" && state != "complete" {
                return Err(Error::Timeout(format!(
                    "Navigation to {} did not reach DOM-ready in {:?}",
                    url, self.call_timeout
                )));
            }
        }

        let info = self
            .evaluate(session, "({url: window.location.href, title: document.title})")
            .await?;
        Ok(json!({
            "url": info.get("url").cloned().unwrap_or(json!(url)),
            "title": info.get("title").cloned().unwrap_or(Value::Null),
        }))
    }

    /// Runtime.evaluate with by-value result and exception surfacing.
    async fn evaluate(&self, session: &PageSession, expression: &str) -> Result<Value> {
        let result = session
            .page_command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(exception) = result.get("exceptionDetails") {
            let text = exception
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(|v| v.as_str())
                .or_else(|| exception.get("text").and_then(|v| v.as_str()))
                .unwrap_or("Script threw an exception");
            return Err(Error::Tool(format!("Script error: {}", text)));
        }

        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }
}

#[async_trait]
impl SandboxBackend for DirectBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Direct
    }

    async fn list_pages(&self) -> Result<Vec<PageInfo>> {
        let client = self.connect().await?;
        let result = client.page_targets().await;
        client.close();
        let targets = result?;
        Ok(targets
            .iter()
            .filter_map(|t| {
                Some(PageInfo {
                    id: t.get("targetId")?.as_str()?.to_string(),
                    url: t.get("url").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                    title: t.get("title").and_then(|v| v.as_str()).map(|s| s.to_string()),
                })
            })
            .collect())
    }

    async fn close_page(&self, page_id: &str) -> Result<()> {
        let client = self.connect().await?;
        let result = client
            .command(None, "Target.closeTarget", json!({"targetId": page_id}))
            .await;
        client.close();
        result.map(|_| ())
    }

    async fn focus_page(&self, page_id: &str) -> Result<()> {
        let client = self.connect().await?;
        let result = client
            .command(None, "Target.activateTarget", json!({"targetId": page_id}))
            .await;
        client.close();
        result.map(|_| ())
    }

    async fn run_action(&self, action: &BrowserAction) -> Result<Value> {
        let session = self.attach_primary().await?;
        let result = self.run_action_on(&session, action).await;
        session.client.close();
        result
    }

    async fn run_code(&self, code: &str) -> Result<Value> {
        let session = self.attach_primary().await?;
        // The snippet evaluates inside the remote page's JavaScript context;
        // the host process never interprets it. `return` hands a value back.
        let wrapped = format!("(async () => {{ {} }})()", code);
        let result = self.evaluate(&session, &wrapped).await;
        session.client.close();
        result
    }

    async fn screenshot(&self, full_page: bool) -> Result<Screenshot> {
        let session = self.attach_primary().await?;
        let result = async {
            let mut params = json!({"format": "png"});
            if full_page {
                params["captureBeyondViewport"] = json!(true);
            }
            let result = session.page_command("Page.captureScreenshot", params).await?;
            let data = result
                .get("data")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::Tool("No screenshot data returned".to_string()))?;

            let bytes = base64::engine::general_purpose::STANDARD
                .decode(data)
                .map_err(|e| Error::Tool(format!("Invalid screenshot encoding: {}", e)))?;

            let preview: String = data.chars().take(self.preview_chars).collect();
            Ok(Screenshot {
                byte_count: bytes.len(),
                content_type: "image/png".to_string(),
                preview_base64: Some(preview),
            })
        }
        .await;
        session.client.close();
        result
    }
}

impl DirectBackend {
    async fn run_action_on(&self, session: &PageSession, action: &BrowserAction) -> Result<Value> {
        match action {
            BrowserAction::Navigate { url } => self.navigate(session, url).await,
            BrowserAction::Click { x, y, button } => {
                self.mouse_event(
                    session,
                    "mousePressed",
                    *x,
                    *y,
                    json!({"button": button, "clickCount": 1}),
                )
                .await?;
                self.mouse_event(
                    session,
                    "mouseReleased",
                    *x,
                    *y,
                    json!({"button": button, "clickCount": 1}),
                )
                .await?;
                Ok(json!({"success": true, "x": x, "y": y, "button": button}))
            }
            BrowserAction::Move { x, y } => {
                self.mouse_event(session, "mouseMoved", *x, *y, json!({})).await?;
                Ok(json!({"success": true, "x": x, "y": y}))
            }
            BrowserAction::TypeText { text } => {
                session
                    .page_command("Input.insertText", json!({"text": text}))
                    .await?;
                Ok(json!({"success": true, "chars": text.chars().count()}))
            }
            BrowserAction::KeyPress { key } => {
                self.dispatch_key(session, key).await?;
                Ok(json!({"success": true, "key": key}))
            }
            BrowserAction::Scroll { x, y, delta_x, delta_y } => {
                self.mouse_event(
                    session,
                    "mouseWheel",
                    *x,
                    *y,
                    json!({"deltaX": delta_x, "deltaY": delta_y}),
                )
                .await?;
                Ok(json!({"success": true, "deltaX": delta_x, "deltaY": delta_y}))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_key_mapping() {
        assert_eq!(named_key("enter"), Some(("Enter", "Enter", 13)));
        assert_eq!(named_key("Return"), Some(("Enter", "Enter", 13)));
        assert_eq!(named_key("ArrowDown"), Some(("ArrowDown", "ArrowDown", 40)));
        assert_eq!(named_key("pageup"), Some(("PageUp", "PageUp", 33)));
        assert_eq!(named_key("q"), None); // printable chars pass through as text keys
        assert_eq!(named_key("F13"), None);
    }

    #[test]
    fn test_action_names() {
        assert_eq!(BrowserAction::Navigate { url: "https://example.com".into() }.name(), "navigate");
        assert_eq!(
            BrowserAction::Click { x: 1.0, y: 2.0, button: "left".into() }.name(),
            "click"
        );
        assert_eq!(
            BrowserAction::Scroll { x: 0.0, y: 0.0, delta_x: 0.0, delta_y: 120.0 }.name(),
            "scroll"
        );
    }
}
