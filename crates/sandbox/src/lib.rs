//! Sandbox backend abstraction.
//!
//! Two structurally different execution models hide behind one trait: a
//! managed remote-execution RPC service keyed by session id, and a raw
//! remote-debugging WebSocket connection this layer drives itself. Everything
//! above (tool catalog, agent loop, trace) depends only on the trait.

pub mod cdp;
pub mod direct;
pub mod managed;
pub mod normalize;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use webpilot_core::types::BackendKind;
use webpilot_core::Result;

pub use direct::DirectBackend;
pub use managed::ManagedBackend;
pub use normalize::{normalize_session, NormalizationReport};

/// One open page (tab) in the sandboxed browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageInfo {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// A high-level browser action, validated before it reaches a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BrowserAction {
    Navigate { url: String },
    Click { x: f64, y: f64, button: String },
    Move { x: f64, y: f64 },
    TypeText { text: String },
    KeyPress { key: String },
    Scroll { x: f64, y: f64, delta_x: f64, delta_y: f64 },
}

impl BrowserAction {
    pub fn name(&self) -> &'static str {
        match self {
            BrowserAction::Navigate { .. } => "navigate",
            BrowserAction::Click { .. } => "click",
            BrowserAction::Move { .. } => "move",
            BrowserAction::TypeText { .. } => "type_text",
            BrowserAction::KeyPress { .. } => "key_press",
            BrowserAction::Scroll { .. } => "scroll",
        }
    }
}

/// Screenshot metadata. Full binary payloads never enter a trace; the direct
/// backend may carry a bounded base64 preview, the managed backend none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Screenshot {
    pub byte_count: usize,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_base64: Option<String>,
}

/// Capability surface both backend variants implement.
///
/// Operation-level failures come back as `Error::Tool`/`Error::Timeout` and
/// are absorbed into the run trace; `Error::Sandbox` means the connector
/// itself is unusable and the run must abort.
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Enumerate open pages in the browser context.
    async fn list_pages(&self) -> Result<Vec<PageInfo>>;

    /// Close one page by id.
    async fn close_page(&self, page_id: &str) -> Result<()>;

    /// Bring one page to the foreground.
    async fn focus_page(&self, page_id: &str) -> Result<()>;

    /// Execute one high-level action against the active page.
    async fn run_action(&self, action: &BrowserAction) -> Result<Value>;

    /// Execute a raw code snippet with page/context/browser bindings and
    /// return its value.
    async fn run_code(&self, code: &str) -> Result<Value>;

    /// Capture the current viewport (or full page).
    async fn screenshot(&self, full_page: bool) -> Result<Screenshot>;
}
