//! A2A server for the diagnostic agent.

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::a2a::{
    A2aEvent, A2aMessage, A2aRole, AgentCapabilities, AgentCard, AgentSkill, DiagnosticRequest,
    MessageSendParams, TaskState, TaskStatus, TaskStatusUpdate, AGENT_CARD_PATH,
};
use crate::agent::query_agent;
use crate::config::DiagnosticsConfig;
use crate::jsonrpc::{
    JsonRpcRequest, JsonRpcResponse, INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR,
};

/// A2A code for operations the agent does not offer.
pub const UNSUPPORTED_OPERATION: i64 = -32004;

/// Turns the text of an incoming message into the agent's reply text.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn execute(&self, input: &str) -> anyhow::Result<String>;
}

/// Parses the diagnostic envelope and runs a freshly wired diagnostic agent.
pub struct DiagnosticAgentExecutor {
    config: DiagnosticsConfig,
}

impl DiagnosticAgentExecutor {
    pub fn new(config: DiagnosticsConfig) -> Self {
        info!("DiagnosticAgentExecutor initialized");
        Self { config }
    }
}

#[async_trait]
impl AgentExecutor for DiagnosticAgentExecutor {
    async fn execute(&self, input: &str) -> anyhow::Result<String> {
        let request: DiagnosticRequest = serde_json::from_str(input)?;
        let prompt = request.prompt.to_text();
        println!("model: {}", request.model.as_deref().unwrap_or("default"));
        println!("prompt received: {}", prompt);

        let result = query_agent(&prompt, request.model.as_deref(), request.log_level, &self.config).await;
        println!("Result received: {}", result);
        Ok(result)
    }
}

pub fn diagnostic_agent_card(url: &str) -> AgentCard {
    AgentCard {
        name: "Diagnostic Agent".to_string(),
        description: "Performs root cause analysis".to_string(),
        url: url.to_string(),
        version: "1.0.0".to_string(),
        default_input_modes: vec!["text".to_string()],
        default_output_modes: vec!["text".to_string()],
        capabilities: AgentCapabilities { streaming: true },
        skills: vec![AgentSkill {
            id: "DiagnosticSkill".to_string(),
            name: "Diagnostic Agent Skills".to_string(),
            description: "Performs root cause analysis".to_string(),
            tags: vec!["diagnostics".to_string(), "root-cause".to_string()],
            examples: ["X", "Y", "Z"]
                .iter()
                .map(|alert| format!("What is the root cause of alert {}?", alert))
                .collect(),
        }],
    }
}

#[derive(Clone)]
struct A2aState {
    card: Arc<AgentCard>,
    executor: Arc<dyn AgentExecutor>,
}

async fn card_handler(State(state): State<A2aState>) -> Json<AgentCard> {
    Json(state.card.as_ref().clone())
}

fn failure(id: Value, code: i64, message: impl Into<String>) -> Response {
    Json(JsonRpcResponse::failure(id, code, message)).into_response()
}

fn event_data(response: &JsonRpcResponse) -> Event {
    match serde_json::to_string(response) {
        Ok(data) => Event::default().data(data),
        Err(e) => Event::default().data(format!("{{\"error\": \"{}\"}}", e)),
    }
}

async fn rpc_handler(State(state): State<A2aState>, body: Bytes) -> Response {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            let response = JsonRpcResponse::failure(Value::Null, PARSE_ERROR, format!("Parse error: {}", e));
            return (StatusCode::BAD_REQUEST, Json(response)).into_response();
        }
    };
    let id = request.id.clone().unwrap_or(Value::Null);

    match request.method.as_str() {
        "message/send" | "message/stream" => {}
        "tasks/cancel" => {
            return failure(id, UNSUPPORTED_OPERATION, "Task cancellation is not supported");
        }
        other => return failure(id, METHOD_NOT_FOUND, format!("Method not found: {}", other)),
    }

    let params: MessageSendParams = match request
        .params
        .clone()
        .map(serde_json::from_value::<MessageSendParams>)
        .transpose()
    {
        Ok(Some(params)) => params,
        Ok(None) => return failure(id, INVALID_PARAMS, "missing message"),
        Err(e) => return failure(id, INVALID_PARAMS, format!("invalid message: {}", e)),
    };
    let Some(text) = params.message.first_text().map(str::to_string) else {
        return failure(id, INVALID_PARAMS, "message has no text part");
    };

    if request.method == "message/send" {
        return match run_executor(&state, &text).await {
            Ok(event) => Json(JsonRpcResponse::success(id, event)).into_response(),
            Err(message) => failure(id, INTERNAL_ERROR, message),
        };
    }

    let (tx, rx) = mpsc::unbounded_channel::<Result<Event, Infallible>>();
    tokio::spawn(async move {
        let working = A2aEvent::StatusUpdate(TaskStatusUpdate {
            task_id: Uuid::new_v4().to_string(),
            context_id: Uuid::new_v4().to_string(),
            status: TaskStatus {
                state: TaskState::Working,
            },
            is_final: false,
        });
        if let Ok(value) = serde_json::to_value(&working) {
            let _ = tx.send(Ok(event_data(&JsonRpcResponse::success(id.clone(), value))));
        }

        let response = match run_executor(&state, &text).await {
            Ok(event) => JsonRpcResponse::success(id, event),
            Err(message) => JsonRpcResponse::failure(id, INTERNAL_ERROR, message),
        };
        let _ = tx.send(Ok(event_data(&response)));
    });

    Sse::new(UnboundedReceiverStream::new(rx)).into_response()
}

/// Run the executor and wrap its reply as an agent message event.
async fn run_executor(state: &A2aState, text: &str) -> Result<Value, String> {
    match state.executor.execute(text).await {
        Ok(reply) => {
            let event = A2aEvent::Message(A2aMessage::text(A2aRole::Agent, reply));
            serde_json::to_value(&event).map_err(|e| e.to_string())
        }
        Err(e) => {
            error!("Agent execution failed: {:#}", e);
            Err(format!("Agent execution failed: {}", e))
        }
    }
}

/// Card at the well-known path, JSON-RPC at the root.
pub fn router(card: AgentCard, executor: Arc<dyn AgentExecutor>) -> Router {
    let state = A2aState {
        card: Arc::new(card),
        executor,
    };
    Router::new()
        .route(AGENT_CARD_PATH, get(card_handler))
        .route("/", post(rpc_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(card: AgentCard, executor: Arc<dyn AgentExecutor>, bind: &str) -> anyhow::Result<()> {
    let app = router(card, executor);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    match listener.local_addr() {
        Ok(addr) => info!("A2A agent listening on http://{}", addr),
        Err(e) => warn!("A2A agent bound but address unknown: {}", e),
    }
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    struct Echo;

    #[async_trait]
    impl AgentExecutor for Echo {
        async fn execute(&self, input: &str) -> anyhow::Result<String> {
            Ok(format!("echo: {}", input))
        }
    }

    fn app() -> Router {
        router(diagnostic_agent_card("http://localhost:9001/"), Arc::new(Echo))
    }

    async fn post_json(body: Value) -> Value {
        let response = app()
            .oneshot(
                Request::post("/")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_card_is_served() {
        let response = app()
            .oneshot(Request::get(AGENT_CARD_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let card: AgentCard = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(card.name, "Diagnostic Agent");
        assert_eq!(card.skills[0].id, "DiagnosticSkill");
        assert!(card.capabilities.streaming);
    }

    #[tokio::test]
    async fn test_message_send_replies_with_agent_text() {
        let message = A2aMessage::text(A2aRole::User, "hello");
        let reply = post_json(json!({
            "jsonrpc": "2.0", "id": "1", "method": "message/send",
            "params": {"message": message}
        }))
        .await;
        assert_eq!(reply["result"]["kind"], "message");
        assert_eq!(reply["result"]["role"], "agent");
        assert_eq!(reply["result"]["parts"][0]["text"], "echo: hello");
    }

    #[tokio::test]
    async fn test_cancel_is_unsupported() {
        let reply = post_json(json!({
            "jsonrpc": "2.0", "id": 2, "method": "tasks/cancel", "params": {"id": "t"}
        }))
        .await;
        assert_eq!(reply["error"]["code"], UNSUPPORTED_OPERATION);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let reply = post_json(json!({"jsonrpc": "2.0", "id": 3, "method": "tasks/get"})).await;
        assert_eq!(reply["error"]["code"], METHOD_NOT_FOUND);
    }
}
