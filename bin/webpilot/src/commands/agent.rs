//! Request-to-run assembly shared by the gateway and the CLI.
//!
//! Resolves the sandbox backend and LLM endpoint, normalizes the session,
//! drives the agent loop under the wall-clock ceiling, and reads/writes the
//! memory service around the run.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use webpilot_agent::{AgentRunner, RunResult};
use webpilot_core::types::BackendKind;
use webpilot_core::{Config, Error};
use webpilot_providers::resolve_endpoint;
use webpilot_sandbox::{normalize_session, DirectBackend, ManagedBackend, SandboxBackend};
use webpilot_storage::MemoryClient;
use webpilot_tools::ToolRegistry;

/// One agent-run request, source-agnostic (HTTP body or CLI flags).
#[derive(Debug, Clone, Default)]
pub struct RunParams {
    pub task: String,
    pub session_id: Option<String>,
    pub cdp_ws_url: Option<String>,
    pub provider: Option<String>,
}

/// Failure classes the request boundary maps onto HTTP statuses.
#[derive(Debug)]
pub enum RunFailure {
    /// Malformed or missing request fields (400).
    BadRequest(String),
    /// The selected backend is not configured on this server (503).
    Unavailable(String),
    /// Everything else (500).
    Internal(String),
}

impl RunFailure {
    pub fn message(&self) -> &str {
        match self {
            RunFailure::BadRequest(m) | RunFailure::Unavailable(m) | RunFailure::Internal(m) => m,
        }
    }
}

/// A finished run plus the metadata the response contract wants.
#[derive(Debug)]
pub struct RunOutput {
    pub result: RunResult,
    pub llm_provider: String,
    pub llm_model: String,
    pub llm_role: String,
    pub memory_enabled: bool,
    pub sandbox_provider: BackendKind,
}

/// Pick the backend for this request: explicit request field wins, then the
/// configured/environment default, and unrecognized values mean managed.
fn resolve_backend_kind(config: &Config, params: &RunParams) -> BackendKind {
    let name = params
        .provider
        .as_deref()
        .unwrap_or(&config.sandbox.default_provider);
    BackendKind::parse(name)
}

fn build_backend(
    config: &Config,
    params: &RunParams,
    kind: BackendKind,
) -> Result<Arc<dyn SandboxBackend>, RunFailure> {
    let call_timeout = Duration::from_secs(config.limits.call_timeout_secs);
    match kind {
        BackendKind::Direct => {
            let ws_url = params
                .cdp_ws_url
                .as_deref()
                .or(config.sandbox.direct.cdp_ws_url.as_deref())
                .ok_or_else(|| {
                    RunFailure::BadRequest(
                        "Direct sandbox requires a cdpWsUrl (in the request or as a configured default)"
                            .to_string(),
                    )
                })?;
            Ok(Arc::new(DirectBackend::new(
                ws_url,
                call_timeout,
                config.limits.screenshot_preview_chars,
            )))
        }
        BackendKind::Managed => {
            let (api_base, api_key) = config.managed_credential().ok_or_else(|| {
                RunFailure::Unavailable(
                    "Managed sandbox is not configured (missing api base or credential)".to_string(),
                )
            })?;
            let session_id = params.session_id.as_deref().ok_or_else(|| {
                RunFailure::BadRequest("Managed sandbox requires 'sessionId'".to_string())
            })?;
            Ok(Arc::new(ManagedBackend::new(
                api_base,
                api_key,
                session_id,
                call_timeout,
            )))
        }
    }
}

/// Validate, assemble and execute one run. All validation and
/// backend-availability failures surface before any model call is made.
pub async fn execute_run(config: &Config, params: RunParams) -> Result<RunOutput, RunFailure> {
    let task = params.task.trim().to_string();
    if task.is_empty() {
        return Err(RunFailure::BadRequest("'task' is required".to_string()));
    }

    let kind = resolve_backend_kind(config, &params);
    let backend = build_backend(config, &params, kind)?;

    let resolved = resolve_endpoint(&config.llm).await.map_err(|e| match e {
        Error::Config(m) => RunFailure::Unavailable(m),
        other => RunFailure::Internal(other.message()),
    })?;
    let role = "agent";
    let provider = resolved
        .provider_for_role(role)
        .map_err(|e| RunFailure::Unavailable(e.message()))?;
    let llm_model = provider.model().to_string();

    let memory = config.memory.api_base.as_deref().map(MemoryClient::new);
    let memory_context = match &memory {
        Some(client) => match client.recent_context(config.memory.context_limit).await {
            Ok(context) => context,
            Err(e) => {
                warn!(error = %e, "Memory read failed, running without context");
                None
            }
        },
        None => None,
    };

    // Best-effort: a failed normalization still lets the run proceed.
    let report = normalize_session(backend.as_ref()).await;
    info!(
        backend = kind.as_str(),
        pages_before = report.pages_before,
        pages_after = report.pages_after,
        "Starting agent run"
    );

    let runner = AgentRunner::new(
        Arc::new(provider),
        ToolRegistry::with_defaults(),
        backend,
        config.limits.max_steps,
    );

    let run_timeout = Duration::from_secs(config.limits.run_timeout_secs);
    let result = match tokio::time::timeout(run_timeout, runner.run(&task, memory_context.as_deref()))
        .await
    {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => return Err(RunFailure::Internal(e.message())),
        Err(_) => {
            return Err(RunFailure::Internal(format!(
                "Run exceeded the {}s wall-clock ceiling",
                config.limits.run_timeout_secs
            )))
        }
    };

    if let Some(client) = &memory {
        let summary = if result.response.is_empty() {
            format!("Run stopped after {} steps with no final answer", result.step_count)
        } else {
            result.response.clone()
        };
        client.record_run_best_effort(&task, &summary).await;
    }

    Ok(RunOutput {
        result,
        llm_provider: resolved.name.clone(),
        llm_model,
        llm_role: role.to_string(),
        memory_enabled: memory.is_some(),
        sandbox_provider: kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct_params(task: &str) -> RunParams {
        RunParams {
            task: task.to_string(),
            provider: Some("direct".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_backend_kind_precedence() {
        let mut config = Config::default();
        config.sandbox.default_provider = "direct".to_string();

        // Explicit request field wins over the configured default.
        let params = RunParams {
            provider: Some("managed".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_backend_kind(&config, &params), BackendKind::Managed);

        // No request field: configured default applies.
        let params = RunParams::default();
        assert_eq!(resolve_backend_kind(&config, &params), BackendKind::Direct);

        // Unrecognized values fall back to managed.
        let params = RunParams {
            provider: Some("daytona".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_backend_kind(&config, &params), BackendKind::Managed);
    }

    #[tokio::test]
    async fn test_empty_task_is_bad_request() {
        let config = Config::default();
        let err = execute_run(&config, direct_params("   ")).await.unwrap_err();
        assert!(matches!(err, RunFailure::BadRequest(_)));
        assert_eq!(err.message(), "'task' is required");
    }

    #[tokio::test]
    async fn test_direct_without_endpoint_is_bad_request() {
        // No cdpWsUrl in the request and none configured: client error before
        // any model call.
        let config = Config::default();
        let err = execute_run(&config, direct_params("get the title"))
            .await
            .unwrap_err();
        assert!(matches!(err, RunFailure::BadRequest(_)));
        assert!(err.message().contains("cdpWsUrl"));
    }

    #[tokio::test]
    async fn test_managed_without_credential_is_unavailable() {
        let config = Config::default();
        let params = RunParams {
            task: "anything".to_string(),
            session_id: Some("sess-1".to_string()),
            ..Default::default()
        };
        let err = execute_run(&config, params).await.unwrap_err();
        assert!(matches!(err, RunFailure::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_managed_without_session_id_is_bad_request() {
        let mut config = Config::default();
        config.sandbox.managed.api_base = Some("https://sandbox.example.com".to_string());
        config.sandbox.managed.api_key = Some("key".to_string());
        let params = RunParams {
            task: "anything".to_string(),
            ..Default::default()
        };
        let err = execute_run(&config, params).await.unwrap_err();
        assert!(matches!(err, RunFailure::BadRequest(_)));
        assert!(err.message().contains("sessionId"));
    }
}
