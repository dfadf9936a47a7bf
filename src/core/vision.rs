//! Vision bridge.
//!
//! The chat upstreams take text only. An attached image is pre-analyzed by
//! a vision-capable endpoint and the resulting description is spliced into
//! the outgoing user prompt. Analysis failure degrades to a placeholder
//! description; it never fails the turn.

use tracing::debug;

use crate::api::{
    GenerateContent, GenerateContentRequest, GenerateContentResponse, GeneratePart, InlineData,
};
use crate::core::error::ChatError;
use crate::utils::url::construct_api_url;

/// Splits a `data:<mime>;base64,<payload>` URL into its mime type and
/// base64 payload. Returns `None` for anything else.
pub(crate) fn split_data_url(data_url: &str) -> Option<(&str, &str)> {
    let rest = data_url.strip_prefix("data:")?;
    let (mime, payload) = rest.split_once(";base64,")?;
    if mime.is_empty() || !mime.contains('/') {
        return None;
    }
    Some((mime, payload))
}

pub struct VisionBridge {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl VisionBridge {
    pub fn new(client: reqwest::Client, base_url: String, api_key: String, model: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
            model,
        }
    }

    /// Describes an attached image. Always returns usable text; transport
    /// or parse failures fall back to a placeholder.
    pub async fn describe(&self, image_data_url: &str) -> String {
        match self.try_describe(image_data_url).await {
            Ok(description) => description,
            Err(err) => {
                debug!("image analysis unavailable: {err}");
                "Image analysis unavailable.".to_string()
            }
        }
    }

    async fn try_describe(&self, image_data_url: &str) -> Result<String, ChatError> {
        // Malformed data URLs still get a request; the upstream rejects or
        // ignores the empty payload and we degrade from there.
        let (mime_type, data) = split_data_url(image_data_url).unwrap_or(("image/jpeg", ""));

        let request = GenerateContentRequest {
            contents: vec![GenerateContent {
                parts: vec![
                    GeneratePart {
                        text: Some("Analyze this image in technical detail.".to_string()),
                        inline_data: None,
                    },
                    GeneratePart {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: mime_type.to_string(),
                            data: data.to_string(),
                        }),
                    },
                ],
            }],
        };

        let url = format!(
            "{}?key={}",
            construct_api_url(&self.base_url, &format!("models/{}:generateContent", self.model)),
            self.api_key
        );

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(ChatError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::Upstream {
                status: Some(status.as_u16()),
                message: "image analysis request failed".to_string(),
            });
        }

        let parsed: GenerateContentResponse =
            response.json().await.map_err(ChatError::from_reqwest)?;
        let description = parsed
            .candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .and_then(|content| content.parts.iter().find_map(|part| part.text.clone()))
            .unwrap_or_else(|| "No analysis data.".to_string());
        Ok(description)
    }
}

/// Builds the prompt that substitutes an image description for the image
/// itself.
pub fn bridge_prompt(description: &str, question: &str) -> String {
    format!(
        "[SYSTEM: User uploaded an image. Analysis: {description}]\n\nUser Question: {question}"
    )
}
