//! Session normalization: collapse a multi-tab browser session down to one
//! active page before the agent starts.
//!
//! Normalization is strictly best-effort. Failures are logged and never
//! raised; a run proceeds against whatever page state exists.

use tracing::{debug, info, warn};

use crate::{PageInfo, SandboxBackend};

/// What normalization did to the session.
#[derive(Debug, Clone, serde::Serialize)]
pub struct NormalizationReport {
    pub pages_before: usize,
    pub pages_after: usize,
    pub primary_url: Option<String>,
}

impl NormalizationReport {
    fn noop() -> Self {
        Self {
            pages_before: 0,
            pages_after: 0,
            primary_url: None,
        }
    }
}

/// Internal browser surfaces that never qualify as the primary page.
fn is_internal_url(url: &str) -> bool {
    url.starts_with("chrome-extension://")
        || url.starts_with("chrome://")
        || url.starts_with("devtools://")
        || url.starts_with("edge://")
}

/// Pick the primary page: the first page whose URL is neither internal nor
/// the blank placeholder; if none qualifies, the first page in enumeration
/// order.
fn pick_primary(pages: &[PageInfo]) -> Option<usize> {
    if pages.is_empty() {
        return None;
    }
    pages
        .iter()
        .position(|p| !is_internal_url(&p.url) && p.url != "about:blank")
        .or(Some(0))
}

/// Close all but one page and bring the survivor to the foreground.
pub async fn normalize_session(backend: &dyn SandboxBackend) -> NormalizationReport {
    let pages = match backend.list_pages().await {
        Ok(pages) => pages,
        Err(e) => {
            warn!(error = %e, "Failed to enumerate pages, skipping normalization");
            return NormalizationReport::noop();
        }
    };

    let pages_before = pages.len();
    let primary_index = match pick_primary(&pages) {
        Some(i) => i,
        None => {
            debug!("No pages open, nothing to normalize");
            return NormalizationReport::noop();
        }
    };
    let primary = &pages[primary_index];

    let mut closed = 0usize;
    for (i, page) in pages.iter().enumerate() {
        if i == primary_index {
            continue;
        }
        match backend.close_page(&page.id).await {
            Ok(()) => closed += 1,
            Err(e) => {
                // One page refusing to close must not abort the rest.
                warn!(page = %page.id, url = %page.url, error = %e, "Failed to close extra page");
            }
        }
    }

    if let Err(e) = backend.focus_page(&primary.id).await {
        warn!(page = %primary.id, error = %e, "Failed to focus primary page");
    }

    let report = NormalizationReport {
        pages_before,
        pages_after: pages_before - closed,
        primary_url: Some(primary.url.clone()),
    };
    info!(
        pages_before = report.pages_before,
        pages_after = report.pages_after,
        primary_url = %primary.url,
        "Session normalized"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BrowserAction, Screenshot};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;
    use webpilot_core::types::BackendKind;
    use webpilot_core::{Error, Result};

    /// Backend stub over a fixed page list, recording lifecycle calls.
    struct StubBackend {
        pages: Mutex<Vec<PageInfo>>,
        closed: Mutex<Vec<String>>,
        focused: Mutex<Vec<String>>,
        fail_close: Option<String>,
    }

    impl StubBackend {
        fn new(urls: &[&str]) -> Self {
            let pages = urls
                .iter()
                .enumerate()
                .map(|(i, url)| PageInfo {
                    id: format!("page-{}", i),
                    url: url.to_string(),
                    title: None,
                })
                .collect();
            Self {
                pages: Mutex::new(pages),
                closed: Mutex::new(Vec::new()),
                focused: Mutex::new(Vec::new()),
                fail_close: None,
            }
        }
    }

    #[async_trait]
    impl SandboxBackend for StubBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Direct
        }

        async fn list_pages(&self) -> Result<Vec<PageInfo>> {
            Ok(self.pages.lock().unwrap().clone())
        }

        async fn close_page(&self, page_id: &str) -> Result<()> {
            if self.fail_close.as_deref() == Some(page_id) {
                return Err(Error::Tool(format!("cannot close {}", page_id)));
            }
            self.closed.lock().unwrap().push(page_id.to_string());
            self.pages.lock().unwrap().retain(|p| p.id != page_id);
            Ok(())
        }

        async fn focus_page(&self, page_id: &str) -> Result<()> {
            self.focused.lock().unwrap().push(page_id.to_string());
            Ok(())
        }

        async fn run_action(&self, _action: &BrowserAction) -> Result<Value> {
            unreachable!("normalization never dispatches actions")
        }

        async fn run_code(&self, _code: &str) -> Result<Value> {
            unreachable!("normalization never runs code")
        }

        async fn screenshot(&self, _full_page: bool) -> Result<Screenshot> {
            unreachable!("normalization never takes screenshots")
        }
    }

    #[test]
    fn test_pick_primary_skips_internal_and_blank() {
        let pages = vec![
            PageInfo { id: "a".into(), url: "chrome-extension://abc/bg.html".into(), title: None },
            PageInfo { id: "b".into(), url: "about:blank".into(), title: None },
            PageInfo { id: "c".into(), url: "https://example.com".into(), title: None },
        ];
        assert_eq!(pick_primary(&pages), Some(2));
    }

    #[test]
    fn test_pick_primary_falls_back_to_first() {
        let pages = vec![
            PageInfo { id: "a".into(), url: "about:blank".into(), title: None },
            PageInfo { id: "b".into(), url: "chrome://newtab".into(), title: None },
        ];
        assert_eq!(pick_primary(&pages), Some(0));
        assert_eq!(pick_primary(&[]), None);
    }

    #[tokio::test]
    async fn test_normalize_closes_extras_and_focuses_primary() {
        let backend = StubBackend::new(&[
            "about:blank",
            "https://example.com",
            "https://other.example.org",
        ]);
        let report = normalize_session(&backend).await;
        assert_eq!(report.pages_before, 3);
        assert_eq!(report.pages_after, 1);
        assert_eq!(report.primary_url.as_deref(), Some("https://example.com"));
        assert_eq!(*backend.closed.lock().unwrap(), vec!["page-0", "page-2"]);
        assert_eq!(*backend.focused.lock().unwrap(), vec!["page-1"]);
    }

    #[tokio::test]
    async fn test_normalize_single_page_is_noop() {
        let backend = StubBackend::new(&["https://example.com"]);
        let report = normalize_session(&backend).await;
        assert_eq!(report.pages_before, 1);
        assert_eq!(report.pages_after, 1);
        assert!(backend.closed.lock().unwrap().is_empty());

        // Idempotence: running again leaves the counts at 1/1.
        let report = normalize_session(&backend).await;
        assert_eq!(report.pages_before, 1);
        assert_eq!(report.pages_after, 1);
    }

    #[tokio::test]
    async fn test_normalize_zero_pages_is_noop() {
        let backend = StubBackend::new(&[]);
        let report = normalize_session(&backend).await;
        assert_eq!(report.pages_before, 0);
        assert_eq!(report.pages_after, 0);
        assert!(report.primary_url.is_none());
    }

    #[tokio::test]
    async fn test_normalize_tolerates_close_failure() {
        let mut backend = StubBackend::new(&[
            "https://example.com",
            "https://stuck.example.org",
            "https://third.example.net",
        ]);
        backend.fail_close = Some("page-1".to_string());
        let report = normalize_session(&backend).await;
        // page-1 refused to close; page-2 still got closed.
        assert_eq!(report.pages_before, 3);
        assert_eq!(report.pages_after, 2);
        assert_eq!(*backend.closed.lock().unwrap(), vec!["page-2"]);
        assert_eq!(*backend.focused.lock().unwrap(), vec!["page-0"]);
    }
}
