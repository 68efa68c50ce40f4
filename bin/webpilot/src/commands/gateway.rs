//! HTTP gateway: frames the agent-run contract plus the voice proxy and a
//! health probe.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use webpilot_core::Config;

use super::agent::{execute_run, RunFailure, RunParams};

#[derive(Clone)]
struct GatewayState {
    config: Arc<Config>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentRunRequest {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    task: String,
    #[serde(default)]
    cdp_ws_url: Option<String>,
    #[serde(default)]
    provider: Option<String>,
}

fn failure_response(failure: &RunFailure) -> Response {
    let status = match failure {
        RunFailure::BadRequest(_) => StatusCode::BAD_REQUEST,
        RunFailure::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        RunFailure::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({"success": false, "error": failure.message()})),
    )
        .into_response()
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({"ok": true}))
}

async fn agent_run_handler(
    State(state): State<GatewayState>,
    Json(request): Json<AgentRunRequest>,
) -> Response {
    let params = RunParams {
        task: request.task,
        session_id: request.session_id,
        cdp_ws_url: request.cdp_ws_url,
        provider: request.provider,
    };

    match execute_run(&state.config, params).await {
        Ok(output) => {
            let body = json!({
                "success": true,
                "response": output.result.response,
                "executedCodes": output.result.executed_codes,
                "detailedSteps": output.result.detailed_steps,
                "stepCount": output.result.step_count,
                "stopReason": output.result.stop_reason,
                "usage": output.result.usage,
                "llmProvider": output.llm_provider,
                "llmModel": output.llm_model,
                "llmRole": output.llm_role,
                "memoryEnabled": output.memory_enabled,
                "sandboxProvider": output.sandbox_provider.as_str(),
            });
            Json(body).into_response()
        }
        Err(failure) => {
            error!(error = failure.message(), "Agent run failed");
            failure_response(&failure)
        }
    }
}

fn build_router(config: Arc<Config>) -> Router {
    let state = GatewayState {
        config: config.clone(),
    };
    Router::new()
        .route("/v1/health", get(health_handler))
        .route("/v1/agent/run", post(agent_run_handler))
        .with_state(state)
        .nest("/v1/voice", webpilot_voice::router(&config.voice))
        .layer(CorsLayer::permissive())
}

pub async fn run_gateway(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let router = build_router(Arc::new(config));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Gateway listening");
    axum::serve(listener, router).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_parsing_camel_case() {
        let parsed: AgentRunRequest = serde_json::from_str(
            r#"{"sessionId": "s-1", "task": "get title", "cdpWsUrl": "ws://h:9222/devtools/browser/x", "provider": "direct"}"#,
        )
        .unwrap();
        assert_eq!(parsed.session_id.as_deref(), Some("s-1"));
        assert_eq!(parsed.task, "get title");
        assert_eq!(parsed.cdp_ws_url.as_deref(), Some("ws://h:9222/devtools/browser/x"));
        assert_eq!(parsed.provider.as_deref(), Some("direct"));
    }

    #[test]
    fn test_request_fields_default() {
        let parsed: AgentRunRequest = serde_json::from_str(r#"{"task": "t"}"#).unwrap();
        assert!(parsed.session_id.is_none());
        assert!(parsed.cdp_ws_url.is_none());
        assert!(parsed.provider.is_none());
    }

    #[test]
    fn test_failure_status_mapping() {
        let r = failure_response(&RunFailure::BadRequest("'task' is required".into()));
        assert_eq!(r.status(), StatusCode::BAD_REQUEST);
        let r = failure_response(&RunFailure::Unavailable("not configured".into()));
        assert_eq!(r.status(), StatusCode::SERVICE_UNAVAILABLE);
        let r = failure_response(&RunFailure::Internal("boom".into()));
        assert_eq!(r.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_router_builds() {
        let _router = build_router(Arc::new(Config::default()));
    }
}
