//! Conversation messages and the append-only state threaded through the graph.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Part {
    Text { text: String },
    Data { data: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<Part>),
}

impl MessageContent {
    /// Plain text view; data parts are skipped.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    Part::Text { text } => Some(text.as_str()),
                    Part::Data { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// First data part, if any.
    pub fn data(&self) -> Option<&Value> {
        match self {
            MessageContent::Text(_) => None,
            MessageContent::Parts(parts) => parts.iter().find_map(|part| match part {
                Part::Data { data } => Some(data),
                Part::Text { .. } => None,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant_parts(parts: Vec<Part>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Parts(parts),
        }
    }

    pub fn text(&self) -> String {
        self.content.text()
    }
}

/// Ordered message log. Message 0 is always the user's query and nothing is
/// ever removed or rewritten.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(query)],
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn query(&self) -> &Message {
        &self.messages[0]
    }

    pub fn first_assistant(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.role == Role::Assistant)
    }

    pub fn last(&self) -> &Message {
        &self.messages[self.messages.len() - 1]
    }

    /// Append a node's delta.
    pub fn merge(&mut self, delta: Vec<Message>) {
        self.messages.extend(delta);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_appends_and_keeps_query_first() {
        let mut state = ConversationState::new("why is it slow?");
        state.merge(vec![Message::assistant("overloaded")]);
        state.merge(vec![Message::assistant("It is overloaded.")]);

        assert_eq!(state.len(), 3);
        assert_eq!(state.query().text(), "why is it slow?");
        assert_eq!(state.query().role, Role::User);
        assert_eq!(state.first_assistant().unwrap().text(), "overloaded");
        assert_eq!(state.last().text(), "It is overloaded.");
    }

    #[test]
    fn test_parts_text_and_data() {
        let message = Message::assistant_parts(vec![
            Part::Text { text: "scored".to_string() },
            Part::Data { data: json!({"score": 67}) },
        ]);
        assert_eq!(message.text(), "scored");
        assert_eq!(message.content.data().unwrap()["score"], 67);

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["content"][1]["type"], "data");
    }
}
