use serde::{Deserialize, Serialize};
use tracing::warn;

/// Which sandbox backend executes a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Managed,
    Direct,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Managed => "managed",
            BackendKind::Direct => "direct",
        }
    }

    /// Parse a provider name. Unrecognized values fall back to the managed
    /// backend rather than erroring.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "direct" => BackendKind::Direct,
            "managed" => BackendKind::Managed,
            other => {
                if !other.is_empty() {
                    warn!(provider = other, "Unrecognized sandbox provider, using managed");
                }
                BackendKind::Managed
            }
        }
    }
}

/// One tool call requested by the model. Serializes to the OpenAI-compatible
/// wire format `{id, type: "function", function: {name, arguments}}`.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl Serialize for ToolInvocation {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("type", "function")?;
        map.serialize_entry("function", &serde_json::json!({
            "name": self.name,
            "arguments": self.arguments.to_string()
        }))?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for ToolInvocation {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let obj = value.as_object().ok_or_else(|| serde::de::Error::custom("expected object"))?;

        let id = obj.get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        // Wire format: {id, type, function: {name, arguments}}
        if let Some(func) = obj.get("function").and_then(|v| v.as_object()) {
            let name = func.get("name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let arguments = match func.get("arguments") {
                Some(serde_json::Value::String(s)) => {
                    serde_json::from_str(s).unwrap_or_else(|e| {
                        warn!(error = %e, raw = %s, "Failed to parse tool call arguments as JSON, using empty object");
                        serde_json::Value::Object(serde_json::Map::new())
                    })
                }
                Some(v) => v.clone(),
                None => serde_json::Value::Object(serde_json::Map::new()),
            };
            return Ok(ToolInvocation { id, name, arguments });
        }

        // Flat format: {id, name, arguments}
        let name = obj.get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let arguments = obj.get("arguments")
            .cloned()
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        Ok(ToolInvocation { id, name, arguments })
    }
}

/// Result of executing one ToolInvocation. Exactly one outcome exists per
/// invocation; failures carry a message instead of a payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub invocation_id: String,
    pub output: serde_json::Value,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn ok(invocation_id: &str, output: serde_json::Value) -> Self {
        Self {
            invocation_id: invocation_id.to_string(),
            output,
            success: true,
            error: None,
        }
    }

    pub fn failure(invocation_id: &str, message: &str) -> Self {
        Self {
            invocation_id: invocation_id.to_string(),
            output: serde_json::Value::Null,
            success: false,
            error: Some(message.to_string()),
        }
    }
}

/// One content item inside an AgentStep. The tag is `kind` because tool
/// invocations already carry a `type: "function"` field on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepContent {
    Text { text: String },
    ToolCall(ToolInvocation),
    ToolResult(ToolOutcome),
}

/// One round of model reasoning plus the tool calls/results it produced.
/// Steps are append-only; their order is the authoritative execution trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStep {
    pub content: Vec<StepContent>,
    pub finish_reason: String,
}

impl AgentStep {
    pub fn new() -> Self {
        Self {
            content: Vec::new(),
            finish_reason: String::new(),
        }
    }
}

impl Default for AgentStep {
    fn default() -> Self {
        Self::new()
    }
}

/// Why the agent loop terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    #[serde(rename = "stopped-by-model")]
    Model,
    #[serde(rename = "stopped-by-step-limit")]
    StepLimit,
}

/// A chat message in provider wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolInvocation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: serde_json::Value::String(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: serde_json::Value::String(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: "assistant".to_string(),
            content: serde_json::Value::String(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn tool_result(tool_call_id: &str, content: &str) -> Self {
        Self {
            role: "tool".to_string(),
            content: serde_json::Value::String(content.to_string()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.to_string()),
            name: None,
        }
    }
}

/// A model response: text content and/or tool calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolInvocation>,
    pub finish_reason: String,
    pub usage: serde_json::Value,
}

impl Default for LLMResponse {
    fn default() -> Self {
        Self {
            content: None,
            tool_calls: Vec::new(),
            finish_reason: String::new(),
            usage: serde_json::Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!(BackendKind::parse("managed"), BackendKind::Managed);
        assert_eq!(BackendKind::parse("direct"), BackendKind::Direct);
        assert_eq!(BackendKind::parse("DIRECT"), BackendKind::Direct);
        // Unrecognized values fall back to managed
        assert_eq!(BackendKind::parse("e2b"), BackendKind::Managed);
        assert_eq!(BackendKind::parse(""), BackendKind::Managed);
    }

    #[test]
    fn test_tool_invocation_roundtrip_wire_format() {
        let inv = ToolInvocation {
            id: "call_1".to_string(),
            name: "click".to_string(),
            arguments: json!({"x": 100, "y": 200}),
        };
        let serialized = serde_json::to_value(&inv).unwrap();
        assert_eq!(serialized["type"], "function");
        assert_eq!(serialized["function"]["name"], "click");

        let parsed: ToolInvocation = serde_json::from_value(serialized).unwrap();
        assert_eq!(parsed.id, "call_1");
        assert_eq!(parsed.name, "click");
        assert_eq!(parsed.arguments["x"], 100);
    }

    #[test]
    fn test_tool_invocation_flat_format() {
        let parsed: ToolInvocation =
            serde_json::from_value(json!({"id": "c1", "name": "navigate", "arguments": {"url": "https://example.com"}}))
                .unwrap();
        assert_eq!(parsed.name, "navigate");
        assert_eq!(parsed.arguments["url"], "https://example.com");
    }

    #[test]
    fn test_step_content_tagged_serialization() {
        let item = StepContent::Text { text: "done".to_string() };
        let v = serde_json::to_value(&item).unwrap();
        assert_eq!(v["kind"], "text");

        let outcome = ToolOutcome::failure("c1", "navigation timed out");
        let v = serde_json::to_value(StepContent::ToolResult(outcome)).unwrap();
        assert_eq!(v["kind"], "tool_result");
        assert_eq!(v["success"], false);
        assert_eq!(v["error"], "navigation timed out");

        // Invocations keep their wire-level `type: "function"` untouched.
        let call = StepContent::ToolCall(ToolInvocation {
            id: "c2".to_string(),
            name: "click".to_string(),
            arguments: json!({"x": 1, "y": 2}),
        });
        let v = serde_json::to_value(&call).unwrap();
        assert_eq!(v["kind"], "tool_call");
        assert_eq!(v["type"], "function");
    }

    #[test]
    fn test_stop_reason_serialization() {
        assert_eq!(
            serde_json::to_value(StopReason::StepLimit).unwrap(),
            json!("stopped-by-step-limit")
        );
        assert_eq!(serde_json::to_value(StopReason::Model).unwrap(), json!("stopped-by-model"));
    }
}
