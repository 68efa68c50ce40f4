//! Trace extraction: converts the heterogeneous step/content stream into a
//! flat, typed record of what happened, independent of which backend ran it.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use webpilot_core::types::{AgentStep, StepContent};

/// One classified content item of a step.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceItem {
    ToolCall {
        id: String,
        tool: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        arguments: Value,
    },
    ToolResult {
        id: String,
        output: Value,
        success: bool,
        /// False when no tool call with this id exists in the same step; the
        /// item is passed through rather than dropped.
        matched: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Text {
        text: String,
    },
}

/// One step of the detailed trace.
#[derive(Debug, Clone, Serialize)]
pub struct DetailedStep {
    pub finish_reason: String,
    pub items: Vec<TraceItem>,
}

/// Backward-compatible flat trace entry: one code-execute call paired with
/// its outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutedCode {
    pub code: String,
    pub result: Value,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

const CODE_TOOL: &str = "execute_code";

/// Walk every step's content in order and classify each item. Tool results
/// are matched to calls by id equality within the same step.
pub fn extract(steps: &[AgentStep]) -> (Vec<DetailedStep>, Vec<ExecutedCode>) {
    let mut detailed = Vec::with_capacity(steps.len());
    let mut executed_codes = Vec::new();

    for step in steps {
        // Calls seen in this step, by invocation id.
        let mut calls: HashMap<&str, (&str, Option<String>)> = HashMap::new();
        for item in &step.content {
            if let StepContent::ToolCall(inv) = item {
                let code = if inv.name == CODE_TOOL {
                    inv.arguments
                        .get("code")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string())
                } else {
                    None
                };
                calls.insert(inv.id.as_str(), (inv.name.as_str(), code));
            }
        }

        let mut items = Vec::with_capacity(step.content.len());
        for item in &step.content {
            match item {
                StepContent::Text { text } => {
                    items.push(TraceItem::Text { text: text.clone() });
                }
                StepContent::ToolCall(inv) => {
                    let code = calls.get(inv.id.as_str()).and_then(|(_, c)| c.clone());
                    items.push(TraceItem::ToolCall {
                        id: inv.id.clone(),
                        tool: inv.name.clone(),
                        code,
                        arguments: inv.arguments.clone(),
                    });
                }
                StepContent::ToolResult(outcome) => {
                    let matched = calls.contains_key(outcome.invocation_id.as_str());
                    items.push(TraceItem::ToolResult {
                        id: outcome.invocation_id.clone(),
                        output: outcome.output.clone(),
                        success: outcome.success,
                        matched,
                        error: outcome.error.clone(),
                    });

                    if let Some((name, Some(code))) = calls.get(outcome.invocation_id.as_str()) {
                        if *name == CODE_TOOL {
                            executed_codes.push(ExecutedCode {
                                code: code.clone(),
                                result: outcome.output.clone(),
                                success: outcome.success,
                                error: outcome.error.clone(),
                            });
                        }
                    }
                }
            }
        }

        detailed.push(DetailedStep {
            finish_reason: step.finish_reason.clone(),
            items,
        });
    }

    (detailed, executed_codes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use webpilot_core::types::{ToolInvocation, ToolOutcome};

    fn step(content: Vec<StepContent>) -> AgentStep {
        AgentStep {
            content,
            finish_reason: "tool_calls".to_string(),
        }
    }

    fn call(id: &str, name: &str, args: Value) -> StepContent {
        StepContent::ToolCall(ToolInvocation {
            id: id.to_string(),
            name: name.to_string(),
            arguments: args,
        })
    }

    #[test]
    fn test_extract_classifies_in_order() {
        let steps = vec![step(vec![
            StepContent::Text { text: "Navigating first.".to_string() },
            call("c1", "navigate", json!({"url": "https://example.com"})),
            StepContent::ToolResult(ToolOutcome::ok(
                "c1",
                json!({"url": "https://example.com", "title": "Example Domain"}),
            )),
        ])];

        let (detailed, codes) = extract(&steps);
        assert_eq!(detailed.len(), 1);
        assert_eq!(detailed[0].items.len(), 3);
        assert!(matches!(detailed[0].items[0], TraceItem::Text { .. }));
        assert!(matches!(detailed[0].items[1], TraceItem::ToolCall { .. }));
        match &detailed[0].items[2] {
            TraceItem::ToolResult { matched, success, .. } => {
                assert!(matched);
                assert!(success);
            }
            other => panic!("expected tool result, got {:?}", other),
        }
        assert!(codes.is_empty());
    }

    #[test]
    fn test_executed_codes_pair_call_with_outcome() {
        let steps = vec![step(vec![
            call("c1", "execute_code", json!({"code": "return document.title"})),
            StepContent::ToolResult(ToolOutcome::ok("c1", json!("Example Domain"))),
            call("c2", "execute_code", json!({"code": "return window.scrollY"})),
            StepContent::ToolResult(ToolOutcome::failure("c2", "Script error: boom")),
        ])];

        let (detailed, codes) = extract(&steps);
        assert_eq!(codes.len(), 2);
        assert_eq!(codes[0].code, "return document.title");
        assert!(codes[0].success);
        assert_eq!(codes[0].result, json!("Example Domain"));
        assert_eq!(codes[1].code, "return window.scrollY");
        assert!(!codes[1].success);
        assert_eq!(codes[1].error.as_deref(), Some("Script error: boom"));

        // Round-trip: every executed-code entry corresponds to exactly one
        // call/result pair in the detailed trace.
        let call_ids: Vec<&str> = detailed[0]
            .items
            .iter()
            .filter_map(|i| match i {
                TraceItem::ToolCall { id, code: Some(_), .. } => Some(id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(call_ids.len(), codes.len());
    }

    #[test]
    fn test_unmatched_result_passes_through() {
        let steps = vec![step(vec![StepContent::ToolResult(ToolOutcome::ok(
            "ghost",
            json!({"leftover": true}),
        ))])];

        let (detailed, _) = extract(&steps);
        match &detailed[0].items[0] {
            TraceItem::ToolResult { id, matched, .. } => {
                assert_eq!(id, "ghost");
                assert!(!matched);
            }
            other => panic!("expected unmatched tool result, got {:?}", other),
        }
    }

    #[test]
    fn test_results_do_not_match_across_steps() {
        let steps = vec![
            step(vec![call("c1", "execute_code", json!({"code": "return 1"}))]),
            step(vec![StepContent::ToolResult(ToolOutcome::ok("c1", json!(1)))]),
        ];
        let (detailed, codes) = extract(&steps);
        // Matching is per step by contract; the late result stays unresolved.
        match &detailed[1].items[0] {
            TraceItem::ToolResult { matched, .. } => assert!(!matched),
            other => panic!("expected tool result, got {:?}", other),
        }
        assert!(codes.is_empty());
    }
}
