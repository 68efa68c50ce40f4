use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::Result;

/// One candidate LLM endpoint, probed in listed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmEndpointConfig {
    pub name: String,
    pub api_base: String,
    #[serde(default)]
    pub api_key: String,
    /// Model id per role, e.g. {"agent": "...", "summary": "..."}.
    #[serde(default = "default_models")]
    pub models: HashMap<String, String>,
}

fn default_models() -> HashMap<String, String> {
    let mut m = HashMap::new();
    m.insert("agent".to_string(), "gpt-4o".to_string());
    m
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    #[serde(default)]
    pub endpoints: Vec<LlmEndpointConfig>,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_probe_timeout_secs() -> u64 {
    3
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.7
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            probe_timeout_secs: default_probe_timeout_secs(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ManagedSandboxConfig {
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DirectSandboxConfig {
    /// Default remote-debugging WebSocket endpoint, used when a request does
    /// not carry its own.
    #[serde(default)]
    pub cdp_ws_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxConfig {
    /// Default backend when a request does not name one: "managed" or "direct".
    #[serde(default = "default_sandbox_provider")]
    pub default_provider: String,
    #[serde(default)]
    pub managed: ManagedSandboxConfig,
    #[serde(default)]
    pub direct: DirectSandboxConfig,
}

fn default_sandbox_provider() -> String {
    "managed".to_string()
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            default_provider: default_sandbox_provider(),
            managed: ManagedSandboxConfig::default(),
            direct: DirectSandboxConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryConfig {
    /// Base URL of the memory service. Memory is disabled when unset.
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default = "default_memory_context_limit")]
    pub context_limit: usize,
}

fn default_memory_context_limit() -> usize {
    5
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            api_base: None,
            context_limit: default_memory_context_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    #[serde(default)]
    pub stt_url: Option<String>,
    #[serde(default)]
    pub tts_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8790
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitsConfig {
    /// Agent loop step ceiling.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Per tool/RPC call timeout.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    /// Whole-run wall clock, enforced at the request boundary.
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    /// Longest base64 screenshot preview embedded in a trace (direct backend).
    #[serde(default = "default_screenshot_preview_chars")]
    pub screenshot_preview_chars: usize,
}

fn default_max_steps() -> u32 {
    20
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_run_timeout_secs() -> u64 {
    300
}

fn default_screenshot_preview_chars() -> usize {
    256
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            call_timeout_secs: default_call_timeout_secs(),
            run_timeout_secs: default_run_timeout_secs(),
            screenshot_preview_chars: default_screenshot_preview_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl Config {
    /// Default config file location: `~/.webpilot/config.yaml`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".webpilot")
            .join("config.yaml")
    }

    /// Load config from the given path (or the default location), then apply
    /// environment overrides. A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_yaml::from_str(&content)?
        } else {
            debug!(path = %path.display(), "Config file not found, using defaults");
            Config::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment variables win over file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("WEBPILOT_SANDBOX_PROVIDER") {
            if !v.is_empty() {
                self.sandbox.default_provider = v;
            }
        }
        if let Ok(v) = std::env::var("WEBPILOT_MANAGED_API_BASE") {
            if !v.is_empty() {
                self.sandbox.managed.api_base = Some(v);
            }
        }
        if let Ok(v) = std::env::var("WEBPILOT_MANAGED_API_KEY") {
            if !v.is_empty() {
                self.sandbox.managed.api_key = Some(v);
            }
        }
        if let Ok(v) = std::env::var("WEBPILOT_CDP_WS_URL") {
            if !v.is_empty() {
                self.sandbox.direct.cdp_ws_url = Some(v);
            }
        }
        if let Ok(v) = std::env::var("WEBPILOT_MEMORY_URL") {
            if !v.is_empty() {
                self.memory.api_base = Some(v);
            }
        }
    }

    /// Whether the managed backend has a usable credential configured.
    pub fn managed_credential(&self) -> Option<(&str, &str)> {
        let base = self.sandbox.managed.api_base.as_deref()?;
        let key = self.sandbox.managed.api_key.as_deref()?;
        if key.is_empty() {
            warn!("Managed sandbox api_key is empty");
            return None;
        }
        Some((base, key))
    }
}
