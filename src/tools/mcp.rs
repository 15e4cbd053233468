//! Model Context Protocol (MCP) Client
//!
//! Connects to MCP servers over a subprocess pipe (newline-delimited
//! JSON-RPC on stdin/stdout) or over local HTTP, and exposes their tools
//! through the `Tool` trait.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{Channel, Tool, ToolOutput};
use crate::agent::{AgentError, AgentResult};
use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use crate::utils::sse;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SESSION_HEADER: &str = "mcp-session-id";

#[derive(Debug, Error)]
pub enum McpError {
    #[error("failed to spawn MCP server '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("MCP pipe I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("MCP HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid MCP message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("MCP Error: {message} (code {code})")]
    Rpc { code: i64, message: String },
    #[error("MCP server closed the connection")]
    Closed,
    #[error("MCP response missing result and error")]
    MissingResult,
}

/// MCP tool definition as advertised by `tools/list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
    #[serde(rename = "outputSchema", default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

struct StdioTransport {
    _child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl StdioTransport {
    async fn write(&mut self, message: &JsonRpcRequest) -> Result<(), McpError> {
        let line = serde_json::to_string(message)? + "\n";
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Read lines until the response carrying `id` arrives.
    async fn read_response(&mut self, id: &Value) -> Result<JsonRpcResponse, McpError> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.stdout.read_line(&mut line).await? == 0 {
                return Err(McpError::Closed);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(response) if &response.id == id => return Ok(response),
                Ok(_) => debug!("Skipping unrelated MCP message: {}", trimmed),
                Err(e) => debug!("Skipping non JSON-RPC line ({}): {}", e, trimmed),
            }
        }
    }
}

struct HttpTransport {
    client: reqwest::Client,
    url: String,
    session: Mutex<Option<String>>,
}

impl HttpTransport {
    async fn post(&self, message: &JsonRpcRequest) -> Result<Option<JsonRpcResponse>, McpError> {
        let mut request = self
            .client
            .post(&self.url)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(message);
        if let Some(session) = self.session.lock().await.as_ref() {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request.send().await?.error_for_status()?;
        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.session.lock().await = Some(session.to_string());
        }

        let Some(id) = message.id.as_ref() else {
            return Ok(None);
        };

        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let body = response.text().await?;

        if is_stream {
            let found = sse::decode_all(&body)
                .into_iter()
                .filter_map(|event| serde_json::from_str::<JsonRpcResponse>(&event).ok())
                .filter(|r| &r.id == id)
                .last();
            return found.map(Some).ok_or(McpError::Closed);
        }
        Ok(Some(serde_json::from_str(&body)?))
    }
}

enum McpTransport {
    Stdio(Mutex<StdioTransport>),
    Http(HttpTransport),
}

/// A connected MCP server
pub struct McpClient {
    name: String,
    transport: McpTransport,
    counter: AtomicU64,
}

impl McpClient {
    /// Spawn `command` and speak MCP over its stdin/stdout.
    pub async fn spawn_stdio(
        name: &str,
        command: &Path,
        args: &[String],
    ) -> Result<Arc<Self>, McpError> {
        info!("Spawning MCP server '{}' via {:?} {:?}...", name, command, args);

        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| McpError::Spawn {
                command: command.display().to_string(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or(McpError::Closed)?;
        let stdout = child.stdout.take().ok_or(McpError::Closed)?;

        let client = Arc::new(Self {
            name: name.to_string(),
            transport: McpTransport::Stdio(Mutex::new(StdioTransport {
                _child: child,
                stdin,
                stdout: BufReader::new(stdout),
            })),
            counter: AtomicU64::new(0),
        });
        client.initialize().await?;
        Ok(client)
    }

    /// Connect to a streamable-HTTP MCP endpoint such as `http://localhost:8000/mcp`.
    pub async fn connect_http(name: &str, url: &str) -> Result<Arc<Self>, McpError> {
        info!("Connecting to MCP server '{}' at {}...", name, url);
        let client = Arc::new(Self {
            name: name.to_string(),
            transport: McpTransport::Http(HttpTransport {
                client: reqwest::Client::new(),
                url: url.to_string(),
                session: Mutex::new(None),
            }),
            counter: AtomicU64::new(0),
        });
        client.initialize().await?;
        Ok(client)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> Channel {
        match self.transport {
            McpTransport::Stdio(_) => Channel::Pipe,
            McpTransport::Http(_) => Channel::Network,
        }
    }

    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let id = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let request = JsonRpcRequest::new(id, method, params);
        debug!("MCP Request to {}: {} #{}", self.name, method, id);

        let response = match &self.transport {
            McpTransport::Stdio(pipe) => {
                let mut pipe = pipe.lock().await;
                pipe.write(&request).await?;
                pipe.read_response(&json!(id)).await?
            }
            McpTransport::Http(http) => http.post(&request).await?.ok_or(McpError::Closed)?,
        };

        if let Some(error) = response.error {
            return Err(McpError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        response.result.ok_or(McpError::MissingResult)
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let notification = JsonRpcRequest::notification(method, params);
        match &self.transport {
            McpTransport::Stdio(pipe) => pipe.lock().await.write(&notification).await,
            McpTransport::Http(http) => http.post(&notification).await.map(|_| ()),
        }
    }

    async fn initialize(&self) -> Result<(), McpError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        let result = self.call("initialize", Some(params)).await?;
        debug!(
            "MCP server {} initialized: {}",
            self.name,
            result["serverInfo"]
        );
        self.notify("notifications/initialized", None).await
    }

    pub async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
        let result = self.call("tools/list", None).await?;
        Ok(serde_json::from_value(result["tools"].clone())?)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, McpError> {
        let params = json!({
            "name": name,
            "arguments": arguments
        });
        self.call("tools/call", Some(params)).await
    }
}

/// A Tool implementation that proxies to an MCP server
pub struct McpProxyTool {
    server: Arc<McpClient>,
    definition: McpToolDefinition,
}

impl McpProxyTool {
    pub fn new(server: Arc<McpClient>, definition: McpToolDefinition) -> Self {
        Self { server, definition }
    }
}

#[async_trait]
impl Tool for McpProxyTool {
    // Names stay unprefixed; the registry rejects clashes across servers.
    fn name(&self) -> String {
        self.definition.name.clone()
    }

    fn description(&self) -> String {
        self.definition
            .description
            .clone()
            .unwrap_or_else(|| format!("MCP tool from {}", self.server.name))
    }

    fn parameters(&self) -> Value {
        self.definition.input_schema.clone()
    }

    fn output_schema(&self) -> Option<Value> {
        self.definition.output_schema.clone()
    }

    async fn execute(&self, params: Value) -> AgentResult<ToolOutput> {
        let arguments = if params.is_null() { json!({}) } else { params };
        let result = self
            .server
            .call_tool(&self.definition.name, arguments)
            .await
            .map_err(|e| AgentError::Tool(format!("MCP call failed: {}", e)))?;
        Ok(tool_output_from_result(result))
    }
}

/// Map a `tools/call` result onto a `ToolOutput`.
pub(crate) fn tool_output_from_result(result: Value) -> ToolOutput {
    let text: String = result["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|block| block["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if result["isError"].as_bool().unwrap_or(false) {
        return ToolOutput::failure(text);
    }

    match result.get("structuredContent") {
        Some(structured) if !structured.is_null() => {
            let summary = if text.is_empty() {
                structured.to_string()
            } else {
                text
            };
            ToolOutput::success(structured.clone(), summary)
        }
        _ => {
            let data = serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text.clone()));
            ToolOutput::success(data, text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_content_preferred_for_data() {
        let out = tool_output_from_result(json!({
            "content": [{"type": "text", "text": "{\"average_cpu_load_percent\":98}"}],
            "structuredContent": {"average_cpu_load_percent": 98},
            "isError": false
        }));
        assert!(out.success);
        assert_eq!(out.data["average_cpu_load_percent"], 98);
        assert_eq!(out.summary, "{\"average_cpu_load_percent\":98}");
    }

    #[test]
    fn test_text_blocks_are_concatenated() {
        let out = tool_output_from_result(json!({
            "content": [{"type": "text", "text": "[\"a\","}, {"type": "text", "text": "\"b\"]"}]
        }));
        assert!(out.success);
        assert_eq!(out.data, json!(["a", "b"]));
    }

    #[test]
    fn test_is_error_maps_to_failure() {
        let out = tool_output_from_result(json!({
            "content": [{"type": "text", "text": "missing service_id"}],
            "isError": true
        }));
        assert!(!out.success);
        assert_eq!(out.error.as_deref(), Some("missing service_id"));
    }

    #[test]
    fn test_definition_accepts_missing_optional_fields() {
        let def: McpToolDefinition =
            serde_json::from_value(json!({"name": "failure_analysis_kb"})).unwrap();
        assert!(def.description.is_none());
        assert!(def.output_schema.is_none());
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_is_spawn_error() {
        let err = McpClient::spawn_stdio("kb", Path::new("/nonexistent/mcp_local_server"), &[])
            .await
            .err()
            .unwrap();
        assert!(matches!(err, McpError::Spawn { .. }));
    }
}
