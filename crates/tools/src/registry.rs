use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use webpilot_core::{Error, Result};

use crate::browser::{
    ClickTool, ExecuteCodeTool, KeyPressTool, MoveTool, NavigateTool, ScreenshotTool, ScrollTool,
    TypeTextTool, WaitTool,
};
use crate::{Tool, ToolContext};

#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// The fixed browser-control catalog, identical for both backends.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(NavigateTool));
        registry.register(Arc::new(ClickTool));
        registry.register(Arc::new(MoveTool));
        registry.register(Arc::new(TypeTextTool));
        registry.register(Arc::new(KeyPressTool));
        registry.register(Arc::new(ScrollTool));
        registry.register(Arc::new(WaitTool));
        registry.register(Arc::new(ScreenshotTool));
        registry.register(Arc::new(ExecuteCodeTool));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        debug!(name = schema.name, "Registering tool");
        self.tools.insert(schema.name.to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Schemas in OpenAI function-calling shape, for the model.
    pub fn get_tool_schemas(&self) -> Vec<Value> {
        self.tools
            .values()
            .map(|tool| {
                let schema = tool.schema();
                json!({
                    "type": "function",
                    "function": {
                        "name": schema.name,
                        "description": schema.description,
                        "parameters": schema.parameters
                    }
                })
            })
            .collect()
    }

    /// Validate and execute one tool call. Parameter-shape failures come back
    /// as errors before the backend transport is touched.
    pub async fn execute(&self, name: &str, ctx: ToolContext, params: Value) -> Result<Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| Error::Tool(format!("Unknown tool: {}", name)))?;

        if let Err(e) = tool.validate(&params) {
            warn!(tool = name, error = %e, "Tool validation failed");
            return Err(e);
        }

        debug!(tool = name, "Executing tool");
        tool.execute(ctx, params).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
