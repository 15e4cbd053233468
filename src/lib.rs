//! Reasoning Diagnostic Agency
//!
//! A two-agent root-cause pipeline:
//! - Diagnostic agent: ReAct loop over MCP tools (playbook retrieval + mock telemetry)
//! - Response agent: one-sentence summaries or rubric/embedding scoring
//! - A2A transport so the diagnostic agent can run as a separate service
//! - A fixed two-node orchestration graph threading the conversation between them

pub mod a2a;
pub mod agent;
pub mod config;
pub mod evaluation;
pub mod jsonrpc;
pub mod knowledge;
pub mod orchestrator;
pub mod services;
pub mod stats;
pub mod telemetry;
pub mod tools;
pub mod utils;

// Re-exports for convenience
pub use agent::{DiagnosticAgent, ResponseAgent};
pub use config::DiagnosticsConfig;
pub use knowledge::DiagnosticKb;
pub use orchestrator::{ConversationState, DiagnosticGraph};
pub use tools::ToolRegistry;
