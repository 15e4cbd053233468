//! Agent Module
//!
//! The diagnostic ReAct agent, the response/evaluation agent, LLM providers
//! and the trace sink they report to.

mod provider;
mod react;
mod response;
pub mod runtime;
pub mod trace;
mod types;

pub use provider::{provider_from_config, LLMProvider, OllamaProvider, OpenAICompatibleProvider};
pub use react::{AgentResponse, DiagnosticAgent, ReActStep, FAILURE_SENTINEL};
pub use response::{EvaluationReport, ResponseAgent, SUMMARY_SYSTEM_PROMPT};
pub use runtime::query_agent;
pub use trace::{ConsoleTrace, NullTrace, TraceLevel, TraceSink};
pub use types::{diagnostic_prompt, AgentConfig, ModelProfile, DIAGNOSTIC_QUERY};

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("LLM provider error: {0}")]
    Provider(String),
    #[error("Tool error: {0}")]
    Tool(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Reached maximum steps ({0}) without a final answer")]
    MaxStepsExceeded(usize),
    #[error("Reasoning step exceeded {0:?}")]
    StepTimeout(Duration),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type AgentResult<T> = Result<T, AgentError>;
