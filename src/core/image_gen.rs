//! Image generation client.
//!
//! Talks to a `generateContent`-style endpoint. The upstream is routinely
//! overloaded, so 429/503 responses are retried with exponential backoff
//! before surfacing as a rate-limit error. "The model answered with text
//! but no image" is a typed failure, never a partial success.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::{debug, warn};

use crate::api::{
    GenerateContent, GenerateContentRequest, GenerateContentResponse, GeneratePart, InlineData,
};
use crate::core::error::ChatError;
use crate::core::vision::split_data_url;
use crate::utils::url::construct_api_url;

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    /// Narrative text accompanying the generation.
    pub narrative: String,
    /// Data URLs, in the order the upstream produced them.
    pub images: Vec<String>,
}

pub struct ImageGenClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ImageGenClient {
    pub fn new(client: reqwest::Client, base_url: String, api_key: String, model: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
            model,
        }
    }

    pub async fn generate(
        &self,
        prompt: &str,
        reference_images: &[String],
    ) -> Result<GeneratedImage, ChatError> {
        let request = build_request(prompt, reference_images);
        let url = format!(
            "{}?key={}",
            construct_api_url(&self.base_url, &format!("models/{}:generateContent", self.model)),
            self.api_key
        );

        let response = self.send_with_retry(&url, &request).await?;
        parse_generated(response, &self.model)
    }

    async fn send_with_retry(
        &self,
        url: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, ChatError> {
        let mut backoff = INITIAL_BACKOFF;
        let mut last_status = 429;

        for attempt in 1..=MAX_ATTEMPTS {
            match self
                .client
                .post(url)
                .header("Content-Type", "application/json")
                .json(request)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json().await.map_err(ChatError::from_reqwest);
                    }
                    if status.as_u16() != 429 && status.as_u16() != 503 {
                        let body = response.text().await.unwrap_or_default();
                        return Err(ChatError::Upstream {
                            status: Some(status.as_u16()),
                            message: body,
                        });
                    }
                    last_status = status.as_u16();
                    warn!(
                        status = status.as_u16(),
                        attempt, "image endpoint busy, backing off"
                    );
                }
                Err(e) => {
                    if attempt == MAX_ATTEMPTS {
                        return Err(ChatError::from_reqwest(e));
                    }
                    debug!("image request failed, retrying: {e}");
                }
            }

            if attempt < MAX_ATTEMPTS {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }

        Err(ChatError::RateLimited {
            status: last_status,
        })
    }
}

fn build_request(prompt: &str, reference_images: &[String]) -> GenerateContentRequest {
    let mut parts = vec![GeneratePart {
        text: Some(prompt.to_string()),
        inline_data: None,
    }];
    for image in reference_images {
        if let Some((mime_type, data)) = split_data_url(image) {
            parts.push(GeneratePart {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: mime_type.to_string(),
                    data: data.to_string(),
                }),
            });
        }
    }
    GenerateContentRequest {
        contents: vec![GenerateContent { parts }],
    }
}

fn parse_generated(
    response: GenerateContentResponse,
    model: &str,
) -> Result<GeneratedImage, ChatError> {
    let mut images = Vec::new();
    let mut narrative = String::new();

    let parts = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts)
        .unwrap_or_default();

    for part in parts {
        if let Some(inline) = part.inline_data {
            // Corrupt image payloads are dropped, same policy as corrupt
            // stream frames.
            if BASE64.decode(inline.data.as_bytes()).is_err() {
                debug!("dropping image part with undecodable payload");
                continue;
            }
            images.push(format!("data:{};base64,{}", inline.mime_type, inline.data));
        } else if let Some(text) = part.text {
            narrative.push_str(&text);
        }
    }

    if images.is_empty() {
        if narrative.is_empty() {
            return Err(ChatError::NoImageReturned { narrative: None });
        }
        return Err(ChatError::NoImageReturned {
            narrative: Some(narrative),
        });
    }

    if narrative.is_empty() {
        narrative = format!("Generated by **{model}**.");
    }
    Ok(GeneratedImage { narrative, images })
}
