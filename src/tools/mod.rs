//! Tool System Module
//!
//! Named, schema-described capabilities the diagnostic agent can invoke.
//! Tools arrive from three channels (stdio MCP, HTTP MCP, in-process) and are
//! collected by a `ToolRegistryBuilder` into an immutable `ToolRegistry`.

mod kb;
mod mcp;
mod telemetry;

pub use kb::{FailureAnalysisKbTool, KB_TOOL_NAME};
pub use mcp::{McpClient, McpError, McpProxyTool, McpToolDefinition, PROTOCOL_VERSION};
pub use telemetry::{telemetry_tools, TelemetryTool};

use crate::agent::AgentResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Output from a tool execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolOutput {
    /// Whether the tool execution was successful
    pub success: bool,
    /// The output data (string, JSON object, etc.)
    pub data: Value,
    /// Human-readable summary of the output, shown to the model
    pub summary: String,
    /// Error message if success is false
    pub error: Option<String>,
}

impl ToolOutput {
    pub fn success(data: impl Into<Value>, summary: impl Into<String>) -> Self {
        Self {
            success: true,
            data: data.into(),
            summary: summary.into(),
            error: None,
        }
    }

    /// Structured result, summarized as its compact JSON text.
    pub fn success_json(data: Value) -> Self {
        let summary = data.to_string();
        Self::success(data, summary)
    }

    pub fn success_str(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            success: true,
            summary: content.clone(),
            data: Value::String(content),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            data: Value::Null,
            summary: format!("Error: {}", error),
            error: Some(error),
        }
    }
}

/// A tool call request parsed from LLM output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub name: String,
    #[serde(default, alias = "arguments")]
    pub parameters: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }

    /// Identity of a call: tool name plus canonical (key-sorted) arguments.
    pub fn dedup_key(&self) -> String {
        let mut canonical = String::new();
        write_canonical(&self.parameters, &mut canonical);
        format!("{}:{}", self.name, canonical)
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// Where a tool was registered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Subprocess speaking MCP over stdin/stdout
    Pipe,
    /// MCP over local HTTP
    Network,
    /// Same process, no transport
    InProcess,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Pipe => write!(f, "pipe"),
            Channel::Network => write!(f, "network"),
            Channel::InProcess => write!(f, "in-process"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Option<Value>,
    pub channel: Channel,
}

/// Trait for tools that can be executed by agents
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name of the tool
    fn name(&self) -> String;

    fn description(&self) -> String;

    /// JSON schema for the tool's parameters
    fn parameters(&self) -> Value;

    /// JSON schema for the tool's result, when declared
    fn output_schema(&self) -> Option<Value> {
        None
    }

    async fn execute(&self, params: Value) -> AgentResult<ToolOutput>;
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate tool '{name}' (registered from {first} and {second})")]
    DuplicateTool {
        name: String,
        first: Channel,
        second: Channel,
    },
    #[error("failed to list tools: {0}")]
    Channel(#[from] McpError),
}

struct RegisteredTool {
    descriptor: ToolDescriptor,
    handler: Arc<dyn Tool>,
}

/// Collects tools from every channel. Name clashes are reported by `build`.
#[derive(Default)]
pub struct ToolRegistryBuilder {
    pending: Vec<(Channel, Arc<dyn Tool>)>,
}

impl ToolRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, channel: Channel, tool: Arc<dyn Tool>) -> Self {
        self.pending.push((channel, tool));
        self
    }

    /// Register every tool the MCP server advertises.
    pub async fn register_mcp(mut self, client: Arc<McpClient>) -> Result<Self, RegistryError> {
        let channel = client.channel();
        let definitions = client.list_tools().await?;
        info!(
            "Discovered {} tools from MCP server '{}'",
            definitions.len(),
            client.name()
        );
        for definition in definitions {
            let proxy: Arc<dyn Tool> = Arc::new(McpProxyTool::new(client.clone(), definition));
            self.pending.push((channel, proxy));
        }
        Ok(self)
    }

    pub fn build(self) -> Result<ToolRegistry, RegistryError> {
        let mut order = Vec::with_capacity(self.pending.len());
        let mut tools: HashMap<String, RegisteredTool> = HashMap::new();

        for (channel, handler) in self.pending {
            let name = handler.name();
            if let Some(existing) = tools.get(&name) {
                return Err(RegistryError::DuplicateTool {
                    name,
                    first: existing.descriptor.channel,
                    second: channel,
                });
            }
            let descriptor = ToolDescriptor {
                name: name.clone(),
                description: handler.description(),
                input_schema: handler.parameters(),
                output_schema: handler.output_schema(),
                channel,
            };
            order.push(name.clone());
            tools.insert(name, RegisteredTool { descriptor, handler });
        }

        Ok(ToolRegistry { order, tools })
    }
}

/// Immutable name -> tool mapping, fixed at startup.
pub struct ToolRegistry {
    order: Vec<String>,
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::new()
    }

    /// Descriptors in registration order.
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.descriptor.clone())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|t| t.handler.clone())
    }

    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name).map(|t| &t.descriptor)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Run a call. Unknown tools and handler errors come back as a failed
    /// output so the agent can see them; nothing is retried.
    pub async fn invoke(&self, call: &ToolCall) -> ToolOutput {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!("Model requested unknown tool: {}", call.name);
            return ToolOutput::failure(format!("Unknown tool: {}", call.name));
        };

        debug!("Invoking tool {} with {}", call.name, call.parameters);
        match tool.handler.execute(call.parameters.clone()).await {
            Ok(output) => output,
            Err(e) => {
                warn!("Tool {} failed: {}", call.name, e);
                ToolOutput::failure(e.to_string())
            }
        }
    }

    /// Tool listing for the model prompt.
    pub fn tools_prompt(&self) -> String {
        if self.order.is_empty() {
            return "No tools available for this task.\n".to_string();
        }

        let mut prompt = String::from("Available Tools:\n\n");
        for descriptor in self.list_tools() {
            prompt.push_str(&format!(
                "- {}: {} (params: {})\n",
                descriptor.name,
                descriptor.description,
                serde_json::to_string(&descriptor.input_schema).unwrap_or_default()
            ));
        }
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentError;
    use serde_json::json;

    struct EchoTool(&'static str);

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> String {
            self.0.to_string()
        }
        fn description(&self) -> String {
            "Echoes its parameters".to_string()
        }
        fn parameters(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, params: Value) -> AgentResult<ToolOutput> {
            Ok(ToolOutput::success_json(params))
        }
    }

    struct BrokenTool;

    #[async_trait]
    impl Tool for BrokenTool {
        fn name(&self) -> String {
            "broken".to_string()
        }
        fn description(&self) -> String {
            "Always fails".to_string()
        }
        fn parameters(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _params: Value) -> AgentResult<ToolOutput> {
            Err(AgentError::Tool("backend unavailable".to_string()))
        }
    }

    #[test]
    fn test_duplicate_names_rejected_at_build() {
        let err = ToolRegistry::builder()
            .register(Channel::Network, Arc::new(EchoTool("query_service_info")))
            .register(Channel::Pipe, Arc::new(EchoTool("query_service_info")))
            .build()
            .err()
            .unwrap();
        match err {
            RegistryError::DuplicateTool { name, first, second } => {
                assert_eq!(name, "query_service_info");
                assert_eq!(first, Channel::Network);
                assert_eq!(second, Channel::Pipe);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_list_tools_keeps_registration_order() {
        let registry = ToolRegistry::builder()
            .register(Channel::Network, Arc::new(EchoTool("b_tool")))
            .register(Channel::InProcess, Arc::new(EchoTool("a_tool")))
            .build()
            .unwrap();
        let names: Vec<String> = registry.list_tools().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["b_tool", "a_tool"]);
        assert_eq!(registry.descriptor("a_tool").unwrap().channel, Channel::InProcess);
    }

    #[tokio::test]
    async fn test_invoke_failures_are_tool_level() {
        let registry = ToolRegistry::builder()
            .register(Channel::InProcess, Arc::new(BrokenTool))
            .build()
            .unwrap();

        let unknown = registry.invoke(&ToolCall::new("missing", json!({}))).await;
        assert!(!unknown.success);
        assert!(unknown.summary.contains("Unknown tool"));

        let broken = registry.invoke(&ToolCall::new("broken", json!({}))).await;
        assert!(!broken.success);
        assert!(broken.error.unwrap().contains("backend unavailable"));
    }

    #[test]
    fn test_dedup_key_ignores_key_order() {
        let a = ToolCall::new("t", json!({"x": 1, "y": 2}));
        let b = ToolCall::new("t", json!({"y": 2, "x": 1}));
        assert_eq!(a.dedup_key(), b.dedup_key());
        assert_ne!(a.dedup_key(), ToolCall::new("t", json!({"x": 2, "y": 2})).dedup_key());
    }

    #[test]
    fn test_tools_prompt_lists_every_tool() {
        let registry = ToolRegistry::builder()
            .register(Channel::InProcess, Arc::new(EchoTool("echo")))
            .build()
            .unwrap();
        let prompt = registry.tools_prompt();
        assert!(prompt.contains("- echo: Echoes its parameters"));
    }
}
