//! MCP servers: one dispatcher, served over stdio lines or HTTP POST.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::diagnostic_prompt;
use crate::jsonrpc::{
    JsonRpcRequest, JsonRpcResponse, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
};
use crate::tools::{ToolCall, ToolRegistry, PROTOCOL_VERSION};

const SESSION_HEADER: &str = "mcp-session-id";
const PROMPT_NAME: &str = "get_llm_prompt";

/// Answers MCP requests against a fixed tool registry.
pub struct McpService {
    name: String,
    tools: Arc<ToolRegistry>,
    prompts: bool,
}

impl McpService {
    pub fn new(name: impl Into<String>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            name: name.into(),
            tools,
            prompts: false,
        }
    }

    /// Also offer the diagnostic instruction prompt.
    pub fn with_diagnostic_prompt(mut self) -> Self {
        self.prompts = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle one request. Notifications get no response.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.jsonrpc != "2.0" {
            let id = request.id.unwrap_or(Value::Null);
            return Some(JsonRpcResponse::failure(id, INVALID_REQUEST, "jsonrpc must be \"2.0\""));
        }
        let Some(id) = request.id.clone() else {
            debug!("{}: notification {}", self.name, request.method);
            return None;
        };
        let params = request.params.unwrap_or(Value::Null);

        let outcome = match request.method.as_str() {
            "initialize" => Ok(self.initialize_result()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.list_tools()),
            "tools/call" => self.call_tool(&params).await,
            "prompts/list" => Ok(self.list_prompts()),
            "prompts/get" => self.get_prompt(&params),
            other => Err((METHOD_NOT_FOUND, format!("Method not found: {}", other))),
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err((code, message)) => {
                warn!("{}: {} failed: {}", self.name, request.method, message);
                JsonRpcResponse::failure(id, code, message)
            }
        })
    }

    fn initialize_result(&self) -> Value {
        let mut capabilities = json!({ "tools": { "listChanged": false } });
        if self.prompts {
            capabilities["prompts"] = json!({ "listChanged": false });
        }
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": capabilities,
            "serverInfo": {
                "name": self.name,
                "version": env!("CARGO_PKG_VERSION")
            }
        })
    }

    fn list_tools(&self) -> Value {
        let tools: Vec<Value> = self
            .tools
            .list_tools()
            .into_iter()
            .map(|d| {
                let mut tool = json!({
                    "name": d.name,
                    "description": d.description,
                    "inputSchema": d.input_schema,
                });
                if let Some(schema) = d.output_schema {
                    tool["outputSchema"] = schema;
                }
                tool
            })
            .collect();
        json!({ "tools": tools })
    }

    async fn call_tool(&self, params: &Value) -> Result<Value, (i64, String)> {
        let name = params["name"]
            .as_str()
            .ok_or_else(|| (INVALID_PARAMS, "tools/call requires a tool name".to_string()))?;
        let arguments = match params.get("arguments") {
            Some(Value::Null) | None => json!({}),
            Some(args) => args.clone(),
        };

        let output = self.tools.invoke(&ToolCall::new(name, arguments)).await;
        if !output.success {
            let message = output.error.unwrap_or(output.summary);
            return Ok(json!({
                "content": [{ "type": "text", "text": message }],
                "isError": true
            }));
        }

        let mut result = json!({
            "content": [{ "type": "text", "text": output.summary }],
            "isError": false
        });
        if output.data.is_object() {
            result["structuredContent"] = output.data;
        }
        Ok(result)
    }

    fn list_prompts(&self) -> Value {
        if !self.prompts {
            return json!({ "prompts": [] });
        }
        json!({
            "prompts": [{
                "name": PROMPT_NAME,
                "description": "Generates a prompt for the LLM to use to answer the query",
                "arguments": [{ "name": "query", "required": true }]
            }]
        })
    }

    fn get_prompt(&self, params: &Value) -> Result<Value, (i64, String)> {
        let name = params["name"].as_str().unwrap_or_default();
        if !self.prompts || name != PROMPT_NAME {
            return Err((INVALID_PARAMS, format!("Unknown prompt: {}", name)));
        }
        let query = params["arguments"]["query"]
            .as_str()
            .ok_or_else(|| (INVALID_PARAMS, "prompt requires a 'query' argument".to_string()))?;
        Ok(json!({
            "description": "Diagnostic instruction prompt",
            "messages": [{
                "role": "user",
                "content": { "type": "text", "text": diagnostic_prompt(query) }
            }]
        }))
    }
}

/// Serve newline-delimited JSON-RPC until the reader closes.
pub async fn serve_lines<R, W>(service: &McpService, reader: R, mut writer: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
            Ok(request) => service.handle(request).await,
            Err(e) => Some(JsonRpcResponse::failure(
                Value::Null,
                PARSE_ERROR,
                format!("Parse error: {}", e),
            )),
        };
        if let Some(response) = response {
            let frame = serde_json::to_string(&response)? + "\n";
            writer.write_all(frame.as_bytes()).await?;
            writer.flush().await?;
        }
    }
    info!("{}: stdin closed, shutting down", service.name);
    Ok(())
}

/// Serve on this process's stdin/stdout.
pub async fn serve_stdio(service: McpService) -> anyhow::Result<()> {
    info!("{}: serving MCP over stdio", service.name);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    serve_lines(&service, stdin, tokio::io::stdout()).await
}

async fn mcp_handler(State(service): State<Arc<McpService>>, body: Bytes) -> Response {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            let failure = JsonRpcResponse::failure(Value::Null, PARSE_ERROR, format!("Parse error: {}", e));
            return (StatusCode::BAD_REQUEST, Json(failure)).into_response();
        }
    };

    let is_initialize = request.method == "initialize";
    let Some(response) = service.handle(request).await else {
        return StatusCode::ACCEPTED.into_response();
    };

    let mut headers = HeaderMap::new();
    if is_initialize {
        let session = Uuid::new_v4().simple().to_string();
        if let Ok(value) = HeaderValue::from_str(&session) {
            headers.insert(SESSION_HEADER, value);
        }
    }
    (headers, Json(response)).into_response()
}

/// `POST /mcp` router.
pub fn router(service: Arc<McpService>) -> Router {
    Router::new()
        .route("/mcp", post(mcp_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

pub async fn serve_http(service: McpService, bind: &str) -> anyhow::Result<()> {
    let name = service.name.clone();
    let app = router(Arc::new(service));
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("{}: serving MCP at http://{}/mcp", name, listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{telemetry_tools, Channel};

    fn telemetry_service() -> McpService {
        let mut builder = ToolRegistry::builder();
        for tool in telemetry_tools() {
            builder = builder.register(Channel::InProcess, tool);
        }
        McpService::new("MCP-HTTP-Server", Arc::new(builder.build().unwrap()))
    }

    fn request(id: i64, method: &str, params: Value) -> JsonRpcRequest {
        JsonRpcRequest::new(id, method, Some(params))
    }

    #[tokio::test]
    async fn test_initialize_reports_protocol_version() {
        let response = telemetry_service()
            .handle(request(1, "initialize", json!({})))
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert!(result["capabilities"].get("prompts").is_none());
    }

    #[tokio::test]
    async fn test_tools_list_and_call() {
        let service = telemetry_service();
        let listed = service.handle(request(2, "tools/list", json!({}))).await.unwrap();
        assert_eq!(listed.result.unwrap()["tools"].as_array().unwrap().len(), 9);

        let called = service
            .handle(request(
                3,
                "tools/call",
                json!({"name": "query_average_cpu_load", "arguments": {"deployment_id": "d", "time_window": 1}}),
            ))
            .await
            .unwrap();
        let result = called.result.unwrap();
        assert_eq!(result["isError"], false);
        assert_eq!(result["structuredContent"]["average_cpu_load_percent"], 98);
    }

    #[tokio::test]
    async fn test_bad_arguments_are_tool_errors() {
        let response = telemetry_service()
            .handle(request(4, "tools/call", json!({"name": "query_service_info", "arguments": {}})))
            .await
            .unwrap();
        assert!(response.error.is_none());
        assert_eq!(response.result.unwrap()["isError"], true);
    }

    #[tokio::test]
    async fn test_unknown_method_and_notification() {
        let service = telemetry_service();
        let response = service.handle(request(5, "resources/list", json!({}))).await.unwrap();
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);

        let note = JsonRpcRequest::notification("notifications/initialized", None);
        assert!(service.handle(note).await.is_none());
    }

    #[tokio::test]
    async fn test_prompt_wraps_query() {
        let service = telemetry_service().with_diagnostic_prompt();
        let response = service
            .handle(request(6, "prompts/get", json!({"name": PROMPT_NAME, "arguments": {"query": "alert X"}})))
            .await
            .unwrap();
        let text = response.result.unwrap()["messages"][0]["content"]["text"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(text.contains("Query: alert X"));
        assert!(text.contains("failure analysis KB"));
    }

    #[tokio::test]
    async fn test_stdio_lines_skip_notifications_and_report_parse_errors() {
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n",
            "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n",
            "not json\n"
        );
        let mut output = Vec::new();
        serve_lines(&telemetry_service(), input.as_bytes(), &mut output)
            .await
            .unwrap();

        let frames: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["id"], 1);
        assert_eq!(frames[1]["error"]["code"], PARSE_ERROR);
    }
}
