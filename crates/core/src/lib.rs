pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::{
    AgentStep, BackendKind, ChatMessage, LLMResponse, StepContent, StopReason, ToolInvocation,
    ToolOutcome,
};
