pub mod browser;
pub mod registry;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use webpilot_core::Result;
use webpilot_sandbox::SandboxBackend;

pub use registry::ToolRegistry;

/// Truncate a string to at most `max_chars` bytes, respecting UTF-8 char
/// boundaries.
pub fn safe_truncate(s: &str, max_chars: usize) -> &str {
    if s.len() <= max_chars {
        return s;
    }
    let mut end = max_chars;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Everything a tool needs at execution time: the sandbox backend the run is
/// bound to. Read-only for the duration of a run.
#[derive(Clone)]
pub struct ToolContext {
    pub backend: Arc<dyn SandboxBackend>,
}

pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> ToolSchema;
    /// Reject malformed parameters before anything reaches the backend
    /// transport.
    fn validate(&self, params: &Value) -> Result<()>;
    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value>;
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use webpilot_core::types::BackendKind;
    use webpilot_sandbox::{BrowserAction, PageInfo, Screenshot};

    /// Records how often the transport was reached; everything succeeds.
    #[derive(Default)]
    pub(crate) struct StubBackend {
        actions: AtomicUsize,
    }

    impl StubBackend {
        pub(crate) fn action_count(&self) -> usize {
            self.actions.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SandboxBackend for StubBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Managed
        }

        async fn list_pages(&self) -> Result<Vec<PageInfo>> {
            Ok(vec![])
        }

        async fn close_page(&self, _page_id: &str) -> Result<()> {
            Ok(())
        }

        async fn focus_page(&self, _page_id: &str) -> Result<()> {
            Ok(())
        }

        async fn run_action(&self, _action: &BrowserAction) -> Result<Value> {
            self.actions.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"success": true}))
        }

        async fn run_code(&self, _code: &str) -> Result<Value> {
            self.actions.fetch_add(1, Ordering::SeqCst);
            Ok(json!(null))
        }

        async fn screenshot(&self, _full_page: bool) -> Result<Screenshot> {
            self.actions.fetch_add(1, Ordering::SeqCst);
            Ok(Screenshot {
                byte_count: 0,
                content_type: "image/png".to_string(),
                preview_base64: None,
            })
        }
    }

    pub(crate) fn stub_context() -> ToolContext {
        ToolContext {
            backend: Arc::new(StubBackend::default()),
        }
    }
}
