//! LLM endpoint resolution.
//!
//! Configured endpoints are probed in priority order; the first one whose
//! `/models` route answers is selected. The result is an opaque descriptor
//! (endpoint, credentials, models keyed by role) that the rest of the system
//! never looks inside.

use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use webpilot_core::config::LlmConfig;
use webpilot_core::{Error, Result};

use crate::OpenAIProvider;

/// The selected inference endpoint.
#[derive(Debug, Clone)]
pub struct ResolvedProvider {
    pub name: String,
    pub api_base: String,
    pub api_key: String,
    pub models_by_role: HashMap<String, String>,
    max_tokens: u32,
    temperature: f32,
}

impl ResolvedProvider {
    /// Model id for a role, falling back to the "agent" role.
    pub fn model_for_role(&self, role: &str) -> Option<&str> {
        self.models_by_role
            .get(role)
            .or_else(|| self.models_by_role.get("agent"))
            .map(String::as_str)
    }

    /// Build a chat provider bound to the given role's model.
    pub fn provider_for_role(&self, role: &str) -> Result<OpenAIProvider> {
        let model = self
            .model_for_role(role)
            .ok_or_else(|| Error::Config(format!("No model configured for role '{}'", role)))?;
        Ok(OpenAIProvider::new(
            &self.api_base,
            &self.api_key,
            model,
            self.max_tokens,
            self.temperature,
        ))
    }
}

/// Probe a single endpoint's `/models` route.
async fn probe(client: &Client, api_base: &str, api_key: &str) -> bool {
    let url = format!("{}/models", api_base.trim_end_matches('/'));
    match client
        .get(&url)
        .header("Authorization", format!("Bearer {}", api_key))
        .send()
        .await
    {
        Ok(resp) => {
            let ok = resp.status().is_success();
            debug!(url = %url, status = %resp.status(), reachable = ok, "Endpoint probe");
            ok
        }
        Err(e) => {
            debug!(url = %url, error = %e, "Endpoint probe failed");
            false
        }
    }
}

/// Resolve the inference endpoint to use for a run.
///
/// Endpoints are tried in configured order; the first reachable one wins. If
/// none answers the probe, the first configured endpoint is used anyway (the
/// probe is a routing hint, and some relays reject `/models` while serving
/// chat completions). No endpoints configured at all is a config error.
pub async fn resolve_endpoint(config: &LlmConfig) -> Result<ResolvedProvider> {
    if config.endpoints.is_empty() {
        return Err(Error::Config(
            "No LLM endpoints configured. Add at least one entry under llm.endpoints.".to_string(),
        ));
    }

    let client = Client::builder()
        .timeout(Duration::from_secs(config.probe_timeout_secs))
        .build()
        .unwrap_or_else(|_| Client::new());

    for endpoint in &config.endpoints {
        if probe(&client, &endpoint.api_base, &endpoint.api_key).await {
            info!(endpoint = %endpoint.name, api_base = %endpoint.api_base, "LLM endpoint selected");
            return Ok(ResolvedProvider {
                name: endpoint.name.clone(),
                api_base: endpoint.api_base.clone(),
                api_key: endpoint.api_key.clone(),
                models_by_role: endpoint.models.clone(),
                max_tokens: config.max_tokens,
                temperature: config.temperature,
            });
        }
        warn!(endpoint = %endpoint.name, "LLM endpoint unreachable, trying next");
    }

    let first = &config.endpoints[0];
    warn!(
        endpoint = %first.name,
        "No LLM endpoint answered the reachability probe, using the first configured one"
    );
    Ok(ResolvedProvider {
        name: first.name.clone(),
        api_base: first.api_base.clone(),
        api_key: first.api_key.clone(),
        models_by_role: first.models.clone(),
        max_tokens: config.max_tokens,
        temperature: config.temperature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use webpilot_core::config::LlmEndpointConfig;

    fn endpoint(name: &str, base: &str) -> LlmEndpointConfig {
        let mut models = HashMap::new();
        models.insert("agent".to_string(), format!("{}-agent-model", name));
        LlmEndpointConfig {
            name: name.to_string(),
            api_base: base.to_string(),
            api_key: "key".to_string(),
            models,
        }
    }

    #[test]
    fn test_model_for_role_falls_back_to_agent() {
        let mut models = HashMap::new();
        models.insert("agent".to_string(), "main-model".to_string());
        let resolved = ResolvedProvider {
            name: "primary".to_string(),
            api_base: "https://api.example.com/v1".to_string(),
            api_key: "k".to_string(),
            models_by_role: models,
            max_tokens: 4096,
            temperature: 0.7,
        };
        assert_eq!(resolved.model_for_role("agent"), Some("main-model"));
        assert_eq!(resolved.model_for_role("summary"), Some("main-model"));
    }

    #[tokio::test]
    async fn test_resolve_requires_configuration() {
        let config = LlmConfig::default();
        let result = resolve_endpoint(&config).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_first_when_unreachable() {
        // Unroutable addresses: every probe fails fast, first endpoint wins.
        let mut config = LlmConfig {
            endpoints: vec![
                endpoint("primary", "http://127.0.0.1:1/v1"),
                endpoint("secondary", "http://127.0.0.1:1/v2"),
            ],
            ..Default::default()
        };
        config.probe_timeout_secs = 1;
        let resolved = resolve_endpoint(&config).await.unwrap();
        assert_eq!(resolved.name, "primary");
        assert_eq!(resolved.model_for_role("agent"), Some("primary-agent-model"));
    }
}
