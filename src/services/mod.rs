//! Network-facing services
//!
//! - `mcp`: tool servers over stdio (subprocess) and HTTP
//! - `a2a`: the diagnostic agent behind the inter-agent transport

pub mod a2a;
pub mod mcp;

pub use a2a::{diagnostic_agent_card, AgentExecutor, DiagnosticAgentExecutor};
pub use mcp::{serve_http, serve_stdio, McpService};
