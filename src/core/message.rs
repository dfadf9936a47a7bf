use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::ChatMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }

    /// Role string used on the wire. Local `model` messages travel as
    /// `assistant`.
    pub fn to_api_role(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "assistant",
        }
    }
}

/// One conversation entry. Messages are immutable once appended, except the
/// trailing model message, which is extended in place by successive stream
/// fragments until the stream ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub role: Role,
    pub content: String,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub images: Vec<String>,
    /// Set when a failed turn leaves its error text in this message.
    #[serde(default)]
    pub is_error: bool,
}

impl Message {
    pub fn user(id: u64, content: impl Into<String>, images: Vec<String>) -> Self {
        Self {
            id,
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now().timestamp_millis(),
            images,
            is_error: false,
        }
    }

    /// The empty trailing message a streamed response accumulates into.
    pub fn model_placeholder(id: u64) -> Self {
        Self {
            id,
            role: Role::Model,
            content: String::new(),
            timestamp: Utc::now().timestamp_millis(),
            images: Vec::new(),
            is_error: false,
        }
    }

    pub fn model(id: u64, content: impl Into<String>, images: Vec<String>) -> Self {
        Self {
            images,
            ..Self::model_placeholder(id)
        }
        .with_content(content)
    }

    fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn push_fragment(&mut self, fragment: &str) {
        self.content.push_str(fragment);
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    pub fn is_model(&self) -> bool {
        self.role == Role::Model
    }
}

/// Builds the outgoing message list: persona system prompt first, then the
/// history with local roles mapped to wire roles. When `final_user_content`
/// is set it replaces the content of the last user message (the vision
/// bridge splices an image description in this way).
pub fn to_api_messages(
    system_prompt: &str,
    history: &[Message],
    final_user_content: Option<&str>,
) -> Vec<ChatMessage> {
    let mut api_messages = Vec::with_capacity(history.len() + 1);
    api_messages.push(ChatMessage::new("system", system_prompt));

    let last_user_idx = history.iter().rposition(|m| m.is_user());
    for (idx, message) in history.iter().enumerate() {
        if message.is_model() && message.content.is_empty() {
            // Trailing placeholder for the response being produced.
            continue;
        }
        let content = match (final_user_content, last_user_idx) {
            (Some(replacement), Some(last)) if idx == last => replacement,
            _ => message.content.as_str(),
        };
        api_messages.push(ChatMessage::new(message.role.to_api_role(), content));
    }
    api_messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_messages_start_with_system_prompt_and_map_roles() {
        let history = vec![
            Message::user(1, "hi", Vec::new()),
            Message::model(2, "hello", Vec::new()),
            Message::user(3, "more", Vec::new()),
        ];
        let api = to_api_messages("persona", &history, None);
        assert_eq!(api.len(), 4);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[0].content, "persona");
        assert_eq!(api[1].role, "user");
        assert_eq!(api[2].role, "assistant");
        assert_eq!(api[3].content, "more");
    }

    #[test]
    fn trailing_placeholder_is_not_transmitted() {
        let history = vec![
            Message::user(1, "hi", Vec::new()),
            Message::model_placeholder(2),
        ];
        let api = to_api_messages("persona", &history, None);
        assert_eq!(api.len(), 2);
    }

    #[test]
    fn final_user_content_replaces_only_the_last_user_message() {
        let history = vec![
            Message::user(1, "first", Vec::new()),
            Message::model(2, "reply", Vec::new()),
            Message::user(3, "look at this", vec!["data:image/png;base64,AA==".into()]),
        ];
        let api = to_api_messages("persona", &history, Some("spliced"));
        assert_eq!(api[1].content, "first");
        assert_eq!(api[3].content, "spliced");
    }
}
