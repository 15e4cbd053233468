//! A2A wire types: agent card, messages, stream events and the request envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::agent::TraceLevel;

/// Well-known path of the public agent card, relative to the agent's base URL.
pub const AGENT_CARD_PATH: &str = "/.well-known/agent-card.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    pub url: String,
    pub version: String,
    #[serde(default)]
    pub default_input_modes: Vec<String>,
    #[serde(default)]
    pub default_output_modes: Vec<String>,
    #[serde(default)]
    pub capabilities: AgentCapabilities,
    #[serde(default)]
    pub skills: Vec<AgentSkill>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentCapabilities {
    #[serde(default)]
    pub streaming: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum A2aRole {
    User,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum A2aPart {
    Text { text: String },
    Data { data: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct A2aMessage {
    pub role: A2aRole,
    pub parts: Vec<A2aPart>,
    pub message_id: String,
}

impl A2aMessage {
    /// Single text part with a fresh message id.
    pub fn text(role: A2aRole, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![A2aPart::Text { text: text.into() }],
            message_id: Uuid::new_v4().simple().to_string(),
        }
    }

    /// Text of the first part, if it is a text part.
    pub fn first_text(&self) -> Option<&str> {
        match self.parts.first() {
            Some(A2aPart::Text { text }) => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Submitted,
    Working,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusUpdate {
    pub task_id: String,
    pub context_id: String,
    pub status: TaskStatus,
    #[serde(rename = "final")]
    pub is_final: bool,
}

/// Result payload of `message/send` and of each `message/stream` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum A2aEvent {
    Message(A2aMessage),
    StatusUpdate(TaskStatusUpdate),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSendParams {
    pub message: A2aMessage,
}

/// The prompt as sent by the caller: plain text or a list of text/object items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PromptInput {
    Text(String),
    Items(Vec<Value>),
}

impl PromptInput {
    /// Flatten to the text handed to the agent. Objects are rendered as JSON.
    pub fn to_text(&self) -> String {
        match self {
            PromptInput::Text(text) => text.clone(),
            PromptInput::Items(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<&str> for PromptInput {
    fn from(text: &str) -> Self {
        PromptInput::Text(text.to_string())
    }
}

/// JSON envelope carried in the single text part of a diagnostic request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticRequest {
    #[serde(default)]
    pub user: String,
    pub prompt: PromptInput,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub log_level: TraceLevel,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_card_uses_camel_case() {
        let card = AgentCard {
            name: "Diagnostic Agent".to_string(),
            description: "Performs root cause analysis".to_string(),
            url: "http://localhost:9001/".to_string(),
            version: "1.0.0".to_string(),
            default_input_modes: vec!["text".to_string()],
            default_output_modes: vec!["text".to_string()],
            capabilities: AgentCapabilities { streaming: true },
            skills: vec![],
        };
        let value = serde_json::to_value(&card).unwrap();
        assert_eq!(value["defaultInputModes"], json!(["text"]));
        assert_eq!(value["capabilities"]["streaming"], true);
    }

    #[test]
    fn test_event_kinds() {
        let message = A2aEvent::Message(A2aMessage::text(A2aRole::Agent, "done"));
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["kind"], "message");
        assert_eq!(value["parts"][0], json!({"kind": "text", "text": "done"}));

        let update: A2aEvent = serde_json::from_value(json!({
            "kind": "status-update",
            "taskId": "t",
            "contextId": "c",
            "status": {"state": "working"},
            "final": false
        }))
        .unwrap();
        assert!(matches!(update, A2aEvent::StatusUpdate(u) if u.status.state == TaskState::Working));
    }

    #[test]
    fn test_envelope_accepts_text_or_items() {
        let text: DiagnosticRequest =
            serde_json::from_str(r#"{"user": "", "prompt": "why?", "log_level": 1}"#).unwrap();
        assert_eq!(text.prompt.to_text(), "why?");
        assert_eq!(text.log_level, TraceLevel::Verbose);
        assert!(text.model.is_none());

        let items: DiagnosticRequest = serde_json::from_value(json!({
            "prompt": ["alert fired", {"service_id": "abc"}],
            "model": "granite4:32b-a9b-h"
        }))
        .unwrap();
        assert_eq!(items.prompt.to_text(), "alert fired\n{\"service_id\":\"abc\"}");
        assert_eq!(items.log_level, TraceLevel::Normal);
    }
}
