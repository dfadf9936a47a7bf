//! Wire payloads for the chat-completion and image-generation endpoints.
//!
//! Upstream providers disagree on where reasoning tokens live
//! (`delta.reasoning` vs `delta.reasoning_content`) and on the casing of
//! inline image fields (`inline_data` vs `inlineData`). All of that is
//! absorbed here, at the transport boundary: serde aliases accept every
//! shape we know about, and [`DeltaEvent::from_payload`] collapses a raw
//! SSE payload into a single internal event type. Nothing downstream ever
//! probes JSON shapes.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Clone, Debug)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    /// Asks providers that support a separate reasoning channel to use it.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub include_reasoning: bool,
}

#[derive(Deserialize)]
pub struct ChatResponseDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, alias = "reasoning_content")]
    pub reasoning: Option<String>,
}

#[derive(Deserialize)]
pub struct ChatResponseChoice {
    pub delta: ChatResponseDelta,
}

#[derive(Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatResponseChoice>,
}

/// One normalized upstream delta. Each SSE frame carries at most one of the
/// two payload kinds; everything else (empty deltas, keep-alives, frames we
/// cannot parse) is `Ignorable` so a single corrupt frame never aborts the
/// stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaEvent {
    Reasoning(String),
    Content(String),
    Ignorable,
}

impl DeltaEvent {
    /// Maps a raw `data:` payload (already stripped of the sentinel, never
    /// `[DONE]`) into one internal event.
    pub fn from_payload(payload: &str) -> DeltaEvent {
        let response: ChatResponse = match serde_json::from_str(payload) {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!("skipping malformed stream frame: {err}");
                return DeltaEvent::Ignorable;
            }
        };

        let Some(choice) = response.choices.first() else {
            return DeltaEvent::Ignorable;
        };

        if let Some(reasoning) = choice.delta.reasoning.as_deref() {
            if !reasoning.is_empty() {
                return DeltaEvent::Reasoning(reasoning.to_string());
            }
        }
        if let Some(content) = choice.delta.content.as_deref() {
            if !content.is_empty() {
                return DeltaEvent::Content(content.to_string());
            }
        }
        DeltaEvent::Ignorable
    }
}

// --- generateContent-style image endpoint ---

#[derive(Serialize, Debug)]
pub struct GenerateContentRequest {
    pub contents: Vec<GenerateContent>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct GenerateContent {
    #[serde(default)]
    pub parts: Vec<GeneratePart>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct GeneratePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(
        default,
        alias = "inlineData",
        rename = "inline_data",
        skip_serializing_if = "Option::is_none"
    )]
    pub inline_data: Option<InlineData>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct InlineData {
    #[serde(alias = "mimeType", rename = "mime_type")]
    pub mime_type: String,
    pub data: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<GenerateCandidate>,
}

#[derive(Deserialize, Debug, Default)]
pub struct GenerateCandidate {
    #[serde(default)]
    pub content: Option<GenerateContent>,
}
