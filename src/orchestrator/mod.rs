//! Orchestrator Module
//!
//! Threads a conversation through the fixed Diagnostic -> Response graph.

pub mod graph;
pub mod message;

pub use graph::{
    evaluation_report, DiagnosticGraph, DiagnosticNode, DiagnosticService, GraphError, GraphNode,
    NodeId, RemoteDiagnostic, ResponseMode, ResponseNode,
};
pub use message::{ConversationState, Message, MessageContent, Part, Role};
