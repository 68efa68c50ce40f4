pub mod runtime;
pub mod trace;

pub use runtime::{AgentRunner, RunResult};
pub use trace::{DetailedStep, ExecutedCode, TraceItem};
