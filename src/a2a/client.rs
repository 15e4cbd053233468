//! Streaming A2A client.

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use super::types::{
    A2aEvent, A2aMessage, A2aRole, AgentCard, DiagnosticRequest, MessageSendParams, PromptInput,
    AGENT_CARD_PATH,
};
use crate::agent::TraceLevel;
use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use crate::utils::SseDecoder;

/// A diagnostic run can take minutes; the transport waits this long.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Error)]
pub enum A2aError {
    #[error("Failed to fetch the public agent card from {url}: {reason}")]
    Discovery { url: String, reason: String },
    #[error("A2A transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("A2A agent returned error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("A2A agent returned no result")]
    EmptyResponse,
    #[error("A2A result is not a message: {0}")]
    WrongShape(String),
    #[error("A2A reply has no text part")]
    NoText,
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub struct A2aClient {
    http: reqwest::Client,
    card: AgentCard,
}

impl A2aClient {
    /// Fetch the agent card under `base_url`. Any failure is a discovery error.
    pub async fn resolve(base_url: &str) -> Result<Self, A2aError> {
        let http = reqwest::Client::builder()
            .timeout(CLIENT_TIMEOUT)
            .build()?;
        let url = format!("{}{}", base_url.trim_end_matches('/'), AGENT_CARD_PATH);
        info!("Retrieving agent card at {}", url);

        let discovery = |reason: String| A2aError::Discovery {
            url: url.clone(),
            reason,
        };
        let response = http
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| discovery(e.to_string()))?;
        let card: AgentCard = response.json().await.map_err(|e| discovery(e.to_string()))?;

        debug!("Resolved agent '{}' at {}", card.name, card.url);
        Ok(Self { http, card })
    }

    pub fn card(&self) -> &AgentCard {
        &self.card
    }

    /// Send one text message over `message/stream` and return the reply text.
    ///
    /// The stream is read to the end; the last event decides the outcome.
    pub async fn send(&self, text: &str) -> Result<String, A2aError> {
        let params = MessageSendParams {
            message: A2aMessage::text(A2aRole::User, text),
        };
        let request = JsonRpcRequest::new(
            Uuid::new_v4().to_string(),
            "message/stream",
            Some(serde_json::to_value(&params)?),
        );

        let response = self
            .http
            .post(&self.card.url)
            .header(ACCEPT, "text/event-stream, application/json")
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/event-stream"));

        let last = if is_stream {
            read_stream(response).await?
        } else {
            let body: JsonRpcResponse = response.json().await?;
            rpc_result(body)?
        };

        let result = last.ok_or(A2aError::EmptyResponse)?;
        let event: A2aEvent =
            serde_json::from_value(result.clone()).map_err(|_| A2aError::WrongShape(result.to_string()))?;
        match event {
            A2aEvent::Message(message) => message
                .first_text()
                .map(str::to_string)
                .ok_or(A2aError::NoText),
            A2aEvent::StatusUpdate(update) => Err(A2aError::WrongShape(format!(
                "stream ended on status {:?}",
                update.status.state
            ))),
        }
    }
}

fn rpc_result(response: JsonRpcResponse) -> Result<Option<Value>, A2aError> {
    if let Some(error) = response.error {
        return Err(A2aError::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    Ok(response.result)
}

/// Consume the SSE body. Only the last event decides the outcome; earlier
/// events are progress and are not validated.
async fn read_stream(response: reqwest::Response) -> Result<Option<Value>, A2aError> {
    let mut decoder = SseDecoder::new();
    let mut pending: Vec<u8> = Vec::new();
    let mut events = Vec::new();

    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        pending.extend_from_slice(&chunk?);
        events.extend(decoder.push(&drain_utf8(&mut pending)));
    }
    if !pending.is_empty() {
        // A truncated sequence at end of body.
        events.extend(decoder.push(&String::from_utf8_lossy(&pending)));
    }
    events.extend(decoder.finish());

    let Some(last) = events.pop() else {
        return Ok(None);
    };
    debug!("A2A stream carried {} progress events", events.len());
    let response: JsonRpcResponse = serde_json::from_str(&last)?;
    rpc_result(response)
}

/// Take the decodable prefix of `pending`. Invalid bytes become U+FFFD; an
/// incomplete trailing sequence stays in `pending` for the next chunk.
fn drain_utf8(pending: &mut Vec<u8>) -> String {
    let mut text = String::new();
    loop {
        match std::str::from_utf8(pending) {
            Ok(valid) => {
                text.push_str(valid);
                pending.clear();
                return text;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                text.push_str(&String::from_utf8_lossy(&pending[..valid]));
                match e.error_len() {
                    Some(bad) => {
                        text.push(char::REPLACEMENT_CHARACTER);
                        pending.drain(..valid + bad);
                    }
                    None => {
                        pending.drain(..valid);
                        return text;
                    }
                }
            }
        }
    }
}

/// Send a diagnostic request to the agent at `base_url` and return its answer.
pub async fn execute_a2a_agent(
    base_url: &str,
    user: &str,
    prompt: PromptInput,
    model: Option<String>,
    log_level: TraceLevel,
) -> Result<String, A2aError> {
    let client = A2aClient::resolve(base_url).await?;
    println!("A2AClient initialized.");

    let envelope = DiagnosticRequest {
        user: user.to_string(),
        prompt,
        model,
        log_level,
    };

    println!("prompting agent");
    let text = client.send(&serde_json::to_string(&envelope)?).await?;
    println!("Response from agent = {}", text);
    Ok(text)
}
