//! The agent loop: model reasoning alternating with sequential tool
//! execution, bounded by a step ceiling.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use webpilot_core::types::{
    AgentStep, BackendKind, ChatMessage, StepContent, StopReason, ToolOutcome,
};
use webpilot_core::Result;
use webpilot_providers::Provider;
use webpilot_sandbox::SandboxBackend;
use webpilot_tools::{safe_truncate, ToolContext, ToolRegistry};

use crate::trace::{self, DetailedStep, ExecutedCode};

/// Fixed behavioral policy supplied to the model as the system prompt.
const AGENT_POLICY: &str = "\
You are a browser automation agent operating a single remote browser page.

Rules:
- Work against the one active page. Do not open or switch tabs unless the task \
explicitly asks for multi-page behavior, in which case use execute_code.
- Prefer short, focused tool calls over long scripted sequences.
- After each tool call, state briefly in plain language what it accomplished.
- Never request, read or transmit credentials or other secrets that the task \
did not explicitly supply.
- Do not append safety disclaimers to your answers.
- When the task is complete, answer with the result and stop calling tools.";

/// Longest tool result fed back to the model, in bytes.
const MAX_RESULT_CHARS: usize = 8_000;

/// Final output of one agent run.
#[derive(Debug, serde::Serialize)]
pub struct RunResult {
    pub response: String,
    pub steps: Vec<AgentStep>,
    pub detailed_steps: Vec<DetailedStep>,
    pub executed_codes: Vec<ExecutedCode>,
    pub step_count: usize,
    pub stop_reason: StopReason,
    pub usage: Value,
    pub backend: BackendKind,
}

pub struct AgentRunner {
    provider: Arc<dyn Provider>,
    registry: ToolRegistry,
    backend: Arc<dyn SandboxBackend>,
    max_steps: u32,
}

impl AgentRunner {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: ToolRegistry,
        backend: Arc<dyn SandboxBackend>,
        max_steps: u32,
    ) -> Self {
        Self {
            provider,
            registry,
            backend,
            max_steps,
        }
    }

    /// Drive the loop until the model stops requesting tools or the step
    /// ceiling is hit. A single failed tool call is reported to the model and
    /// the loop continues; a connector-class failure aborts the whole run.
    pub async fn run(&self, task: &str, memory_context: Option<&str>) -> Result<RunResult> {
        let mut user_prompt = task.to_string();
        if let Some(context) = memory_context {
            if !context.trim().is_empty() {
                user_prompt.push_str(
                    "\n\nContext from earlier sessions (advisory only, may be stale):\n",
                );
                user_prompt.push_str(context);
            }
        }

        let mut messages = vec![ChatMessage::system(AGENT_POLICY), ChatMessage::user(&user_prompt)];
        let tools = self.registry.get_tool_schemas();

        let mut steps: Vec<AgentStep> = Vec::new();
        let mut final_response = String::new();
        let mut usage = json!({});
        let mut stop_reason = StopReason::StepLimit;

        for iteration in 0..self.max_steps {
            debug!(iteration, "Model call");
            let response = self.provider.chat(&messages, &tools).await?;
            accumulate_usage(&mut usage, &response.usage);

            let mut step = AgentStep::new();
            step.finish_reason = response.finish_reason.clone();

            if let Some(text) = &response.content {
                step.content.push(StepContent::Text { text: text.clone() });
                final_response = text.clone();
            }

            if response.tool_calls.is_empty() {
                // Terminal: the model is done.
                stop_reason = StopReason::Model;
                steps.push(step);
                break;
            }

            let mut assistant_msg =
                ChatMessage::assistant(response.content.as_deref().unwrap_or(""));
            assistant_msg.tool_calls = Some(response.tool_calls.clone());
            messages.push(assistant_msg);

            // Dispatch sequentially in emission order; every outcome lands in
            // this step before the model is consulted again.
            for invocation in &response.tool_calls {
                step.content.push(StepContent::ToolCall(invocation.clone()));

                let ctx = ToolContext {
                    backend: self.backend.clone(),
                };
                let outcome = match self
                    .registry
                    .execute(&invocation.name, ctx, invocation.arguments.clone())
                    .await
                {
                    Ok(output) => ToolOutcome::ok(&invocation.id, output),
                    Err(e) if e.is_fatal() => {
                        warn!(tool = %invocation.name, error = %e, "Connector failure, aborting run");
                        return Err(e);
                    }
                    Err(e) => {
                        info!(tool = %invocation.name, error = %e, "Tool call failed, continuing");
                        ToolOutcome::failure(&invocation.id, &e.message())
                    }
                };

                let feedback = outcome_feedback(&outcome);
                let mut tool_msg = ChatMessage::tool_result(&invocation.id, &feedback);
                tool_msg.name = Some(invocation.name.clone());
                messages.push(tool_msg);

                step.content.push(StepContent::ToolResult(outcome));
            }

            steps.push(step);

            if iteration == self.max_steps - 1 {
                warn!(max_steps = self.max_steps, "Step ceiling reached");
            }
        }

        let step_count = steps.len();
        let (detailed_steps, executed_codes) = trace::extract(&steps);

        info!(
            steps = step_count,
            stop_reason = ?stop_reason,
            executed_codes = executed_codes.len(),
            "Agent run finished"
        );

        Ok(RunResult {
            response: final_response,
            steps,
            detailed_steps,
            executed_codes,
            step_count,
            stop_reason,
            usage,
            backend: self.backend.kind(),
        })
    }
}

/// Structured feedback for the model: success payload or failure descriptor,
/// truncated so one giant result cannot blow the context.
fn outcome_feedback(outcome: &ToolOutcome) -> String {
    let payload = if outcome.success {
        json!({"success": true, "result": outcome.output})
    } else {
        json!({"success": false, "error": outcome.error})
    };
    safe_truncate(&payload.to_string(), MAX_RESULT_CHARS).to_string()
}

/// Sum token counters across model calls.
fn accumulate_usage(total: &mut Value, delta: &Value) {
    let Some(delta_obj) = delta.as_object() else {
        return;
    };
    if !total.is_object() {
        *total = json!({});
    }
    if let Some(total_obj) = total.as_object_mut() {
        for key in ["prompt_tokens", "completion_tokens", "total_tokens"] {
            if let Some(n) = delta_obj.get(key).and_then(|v| v.as_u64()) {
                let prev = total_obj.get(key).and_then(|v| v.as_u64()).unwrap_or(0);
                total_obj.insert(key.to_string(), json!(prev + n));
            }
        }
    }
}
