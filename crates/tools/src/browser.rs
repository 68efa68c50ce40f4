//! The fixed browser-control tool catalog.
//!
//! Identical schema surface for both sandbox backends; only the transport
//! underneath differs. Parameter validation happens before dispatch and a
//! validation failure never reaches the backend.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;
use webpilot_core::{Error, Result};
use webpilot_sandbox::BrowserAction;

use crate::{Tool, ToolContext, ToolSchema};

const WAIT_DEFAULT_MS: u64 = 1000;
const WAIT_MAX_MS: u64 = 30_000;

fn require_number(params: &Value, field: &str) -> Option<f64> {
    params.get(field).and_then(|v| v.as_f64())
}

fn require_string<'a>(params: &'a Value, field: &str) -> Option<&'a str> {
    params.get(field).and_then(|v| v.as_str())
}

/// Load a URL on the active page and wait for DOM-ready.
pub struct NavigateTool;

#[async_trait]
impl Tool for NavigateTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "navigate",
            description: "Navigate the active page to a URL and wait until the document is ready. Returns the final URL and page title.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "Absolute http(s) URL to load"}
                },
                "required": ["url"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        let url = require_string(params, "url")
            .ok_or_else(|| Error::Validation("navigate action requires 'url'".to_string()))?;
        let parsed = url::Url::parse(url)
            .map_err(|_| Error::Validation(format!("navigate action requires a well-formed URL, got '{}'", url)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Validation(format!(
                "navigate action requires an http(s) URL, got '{}'",
                url
            )));
        }
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let url = params["url"].as_str().unwrap_or_default().to_string();
        debug!(url = %url, "navigate");
        ctx.backend.run_action(&BrowserAction::Navigate { url }).await
    }
}

/// Synthesize a mouse click at viewport coordinates.
pub struct ClickTool;

#[async_trait]
impl Tool for ClickTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "click",
            description: "Click at a viewport coordinate on the active page.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "x": {"type": "number", "description": "X coordinate in CSS pixels"},
                    "y": {"type": "number", "description": "Y coordinate in CSS pixels"},
                    "button": {"type": "string", "enum": ["left", "middle", "right"], "description": "Mouse button, default left"}
                },
                "required": ["x", "y"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        if require_number(params, "x").is_none() || require_number(params, "y").is_none() {
            return Err(Error::Validation("click action requires 'x' and 'y'".to_string()));
        }
        if let Some(button) = require_string(params, "button") {
            if !["left", "middle", "right"].contains(&button) {
                return Err(Error::Validation(format!(
                    "click button must be left, middle or right, got '{}'",
                    button
                )));
            }
        }
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let action = BrowserAction::Click {
            x: params["x"].as_f64().unwrap_or(0.0),
            y: params["y"].as_f64().unwrap_or(0.0),
            button: require_string(&params, "button").unwrap_or("left").to_string(),
        };
        ctx.backend.run_action(&action).await
    }
}

/// Move the pointer without clicking.
pub struct MoveTool;

#[async_trait]
impl Tool for MoveTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "move",
            description: "Move the mouse pointer to a viewport coordinate without clicking.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "x": {"type": "number"},
                    "y": {"type": "number"}
                },
                "required": ["x", "y"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        if require_number(params, "x").is_none() || require_number(params, "y").is_none() {
            return Err(Error::Validation("move action requires 'x' and 'y'".to_string()));
        }
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let action = BrowserAction::Move {
            x: params["x"].as_f64().unwrap_or(0.0),
            y: params["y"].as_f64().unwrap_or(0.0),
        };
        ctx.backend.run_action(&action).await
    }
}

/// Synthesize keystrokes for literal text.
pub struct TypeTextTool;

#[async_trait]
impl Tool for TypeTextTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "type_text",
            description: "Type literal text into the currently focused element.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string", "description": "Text to type"}
                },
                "required": ["text"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        match require_string(params, "text") {
            Some(text) if !text.is_empty() => Ok(()),
            _ => Err(Error::Validation("type_text action requires 'text'".to_string())),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let action = BrowserAction::TypeText {
            text: params["text"].as_str().unwrap_or_default().to_string(),
        };
        ctx.backend.run_action(&action).await
    }
}

/// Press a single named key.
pub struct KeyPressTool;

#[async_trait]
impl Tool for KeyPressTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "key_press",
            description: "Press a single named key, e.g. Enter, Tab, Escape, ArrowDown, or a single character.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "key": {"type": "string", "description": "Key name"}
                },
                "required": ["key"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        match require_string(params, "key") {
            Some(key) if !key.is_empty() => Ok(()),
            _ => Err(Error::Validation("key_press action requires 'key'".to_string())),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let action = BrowserAction::KeyPress {
            key: params["key"].as_str().unwrap_or_default().to_string(),
        };
        ctx.backend.run_action(&action).await
    }
}

/// Scroll the viewport/content by a delta.
pub struct ScrollTool;

#[async_trait]
impl Tool for ScrollTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "scroll",
            description: "Scroll the page by a pixel delta. Positive deltaY scrolls down.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "x": {"type": "number", "description": "Pointer X position, default 0"},
                    "y": {"type": "number", "description": "Pointer Y position, default 0"},
                    "deltaX": {"type": "number", "description": "Horizontal scroll delta, default 0"},
                    "deltaY": {"type": "number", "description": "Vertical scroll delta, default 600"}
                }
            }),
        }
    }

    fn validate(&self, _params: &Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let action = BrowserAction::Scroll {
            x: require_number(&params, "x").unwrap_or(0.0),
            y: require_number(&params, "y").unwrap_or(0.0),
            delta_x: require_number(&params, "deltaX").unwrap_or(0.0),
            delta_y: require_number(&params, "deltaY").unwrap_or(600.0),
        };
        ctx.backend.run_action(&action).await
    }
}

/// Pause before the next action.
pub struct WaitTool;

#[async_trait]
impl Tool for WaitTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "wait",
            description: "Pause before the next action. Default 1000 ms, capped at 30000 ms.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "waitMs": {"type": "integer", "description": "Milliseconds to wait"}
                }
            }),
        }
    }

    fn validate(&self, _params: &Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, _ctx: ToolContext, params: Value) -> Result<Value> {
        let ms = clamp_wait_ms(params.get("waitMs").and_then(|v| v.as_u64()));
        sleep(Duration::from_millis(ms)).await;
        Ok(json!({"waitedMs": ms}))
    }
}

fn clamp_wait_ms(requested: Option<u64>) -> u64 {
    requested.unwrap_or(WAIT_DEFAULT_MS).min(WAIT_MAX_MS)
}

/// Capture the viewport or full page. Only size and content type enter the
/// trace; the direct backend adds a bounded base64 preview.
pub struct ScreenshotTool;

#[async_trait]
impl Tool for ScreenshotTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "screenshot",
            description: "Capture the current viewport (or the full page). Returns byte count and content type, not the image itself.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "fullPage": {"type": "boolean", "description": "Capture beyond the viewport, default false"}
                }
            }),
        }
    }

    fn validate(&self, _params: &Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let full_page = params.get("fullPage").and_then(|v| v.as_bool()).unwrap_or(false);
        let shot = ctx.backend.screenshot(full_page).await?;
        let mut out = json!({
            "byteCount": shot.byte_count,
            "contentType": shot.content_type,
        });
        if let Some(preview) = shot.preview_base64 {
            out["previewBase64"] = json!(preview);
        }
        Ok(out)
    }
}

/// Run an arbitrary snippet inside the sandboxed page context. Exposed under
/// one name and shape on both backends.
pub struct ExecuteCodeTool;

#[async_trait]
impl Tool for ExecuteCodeTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "execute_code",
            description: "Run a JavaScript snippet in the sandboxed page context with access to the page's own globals. Use `return` to hand a value back. For anything the high-level tools cannot express, including explicit multi-page work.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "code": {"type": "string", "description": "JavaScript source to run"}
                },
                "required": ["code"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        match require_string(params, "code") {
            Some(code) if !code.trim().is_empty() => Ok(()),
            _ => Err(Error::Validation(
                "execute_code action requires non-empty 'code'".to_string(),
            )),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let code = params["code"].as_str().unwrap_or_default();
        let result = ctx.backend.run_code(code).await?;
        Ok(json!({"success": true, "result": result}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigate_validation() {
        let tool = NavigateTool;
        assert!(tool.validate(&json!({"url": "https://example.com"})).is_ok());
        assert!(tool.validate(&json!({"url": "http://example.com/a?b=c"})).is_ok());

        let err = tool.validate(&json!({})).unwrap_err();
        assert_eq!(err.message(), "navigate action requires 'url'");
        assert!(tool.validate(&json!({"url": "not a url"})).is_err());
        assert!(tool.validate(&json!({"url": "file:///etc/passwd"})).is_err());
    }

    #[test]
    fn test_click_validation() {
        let tool = ClickTool;
        assert!(tool.validate(&json!({"x": 100, "y": 200})).is_ok());
        assert!(tool.validate(&json!({"x": 10.5, "y": 20.5, "button": "right"})).is_ok());

        let err = tool.validate(&json!({"x": 100})).unwrap_err();
        assert_eq!(err.message(), "click action requires 'x' and 'y'");
        assert!(tool.validate(&json!({"x": "100", "y": 200})).is_err());
        assert!(tool.validate(&json!({"x": 1, "y": 2, "button": "side"})).is_err());
    }

    #[test]
    fn test_type_text_validation() {
        let tool = TypeTextTool;
        assert!(tool.validate(&json!({"text": "hello"})).is_ok());

        // Scenario: empty text is rejected with a descriptive message.
        let err = tool.validate(&json!({"text": ""})).unwrap_err();
        assert_eq!(err.message(), "type_text action requires 'text'");
        assert_eq!(tool.validate(&json!({})).unwrap_err().message(), "type_text action requires 'text'");
    }

    #[test]
    fn test_key_press_validation() {
        let tool = KeyPressTool;
        assert!(tool.validate(&json!({"key": "Enter"})).is_ok());
        assert_eq!(
            tool.validate(&json!({})).unwrap_err().message(),
            "key_press action requires 'key'"
        );
    }

    #[test]
    fn test_execute_code_validation() {
        let tool = ExecuteCodeTool;
        assert!(tool.validate(&json!({"code": "return document.title"})).is_ok());
        assert!(tool.validate(&json!({"code": "   "})).is_err());
        assert!(tool.validate(&json!({})).is_err());
    }

    #[test]
    fn test_scroll_and_wait_accept_empty_params() {
        assert!(ScrollTool.validate(&json!({})).is_ok());
        assert!(WaitTool.validate(&json!({})).is_ok());
        assert!(ScreenshotTool.validate(&json!({})).is_ok());
    }

    #[test]
    fn test_wait_clamping() {
        assert_eq!(clamp_wait_ms(None), 1000);
        assert_eq!(clamp_wait_ms(Some(250)), 250);
        assert_eq!(clamp_wait_ms(Some(60_000)), 30_000);
    }

    #[tokio::test]
    async fn test_wait_reports_waited_ms() {
        let ctx = crate::testutil::stub_context();
        let out = WaitTool.execute(ctx, json!({"waitMs": 1})).await.unwrap();
        assert_eq!(out["waitedMs"], 1);
    }
}
