//! Inter-agent transport.
//!
//! The diagnostic agent runs as its own process behind an A2A endpoint. Callers
//! resolve its card, then exchange one JSON envelope over `message/stream`.

pub mod client;
pub mod types;

pub use client::{execute_a2a_agent, A2aClient, A2aError, CLIENT_TIMEOUT};
pub use types::{
    A2aEvent, A2aMessage, A2aPart, A2aRole, AgentCapabilities, AgentCard, AgentSkill,
    DiagnosticRequest, MessageSendParams, PromptInput, TaskState, TaskStatus, TaskStatusUpdate,
    AGENT_CARD_PATH,
};
