use futures_util::StreamExt;
use memchr::memchr;
use tokio::sync::mpsc;
use tracing::debug;

use crate::api::{ChatMessage, ChatRequest, DeltaEvent};
use crate::core::reasoning::ThinkTagNormalizer;
use crate::utils::url::construct_api_url;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamErrorKind {
    /// Upstream 429/503; the UI offers a wait-and-retry affordance.
    RateLimited,
    /// Any other non-2xx or transport failure.
    Upstream,
}

#[derive(Clone, Debug)]
pub enum StreamMessage {
    /// One normalized text piece, in upstream order.
    Chunk(String),
    Error {
        kind: StreamErrorKind,
        status: Option<u16>,
        message: String,
    },
    End,
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Processes one framed line. Returns true when the terminal sentinel was
/// seen and the stream is finished.
fn process_sse_line(
    line: &str,
    normalizer: &mut ThinkTagNormalizer,
    tx: &mpsc::UnboundedSender<(StreamMessage, u64)>,
    stream_id: u64,
) -> bool {
    let Some(payload) = extract_data_payload(line) else {
        return false;
    };

    if payload == "[DONE]" {
        finish_stream(normalizer, tx, stream_id);
        return true;
    }

    // Malformed payloads come back as Ignorable; a single corrupt frame
    // never aborts the stream.
    for piece in normalizer.push(DeltaEvent::from_payload(payload)) {
        let _ = tx.send((StreamMessage::Chunk(piece), stream_id));
    }
    false
}

/// Normal termination: balance the marker pair if the upstream stopped
/// mid-reasoning, then signal the end. Cancellation never comes through
/// here.
fn finish_stream(
    normalizer: &mut ThinkTagNormalizer,
    tx: &mpsc::UnboundedSender<(StreamMessage, u64)>,
    stream_id: u64,
) {
    if let Some(closer) = normalizer.finish() {
        let _ = tx.send((StreamMessage::Chunk(closer.to_string()), stream_id));
    }
    let _ = tx.send((StreamMessage::End, stream_id));
}

fn error_kind_for_status(status: u16) -> StreamErrorKind {
    if status == 429 || status == 503 {
        StreamErrorKind::RateLimited
    } else {
        StreamErrorKind::Upstream
    }
}

/// Pulls a short human-readable summary out of an error body, which is
/// usually JSON with the message buried at one of a few well-known spots.
fn summarize_error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<no body>".to_string();
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let summary = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .or_else(|| value.get("error").and_then(|v| v.as_str()))
            .or_else(|| value.get("message").and_then(|v| v.as_str()));
        if let Some(summary) = summary {
            let collapsed = summary.split_whitespace().collect::<Vec<_>>().join(" ");
            if !collapsed.is_empty() {
                return collapsed;
            }
        }
    }
    trimmed.to_string()
}

pub struct StreamParams {
    pub client: reqwest::Client,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Request a separate reasoning channel where the provider has one.
    pub include_reasoning: bool,
    pub api_messages: Vec<ChatMessage>,
    pub cancel_token: tokio_util::sync::CancellationToken,
    pub stream_id: u64,
}

/// Spawns streaming chat completions and forwards normalized fragments over
/// a single channel, tagged with the stream id they belong to. The receiver
/// is a produce-once sequence: fragments arrive in upstream order, and a
/// cancelled stream simply goes quiet.
#[derive(Clone)]
pub struct ChatStreamService {
    tx: mpsc::UnboundedSender<(StreamMessage, u64)>,
}

impl ChatStreamService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(StreamMessage, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn spawn_stream(&self, params: StreamParams) {
        let tx_clone = self.tx.clone();
        tokio::spawn(async move {
            let StreamParams {
                client,
                base_url,
                api_key,
                model,
                include_reasoning,
                api_messages,
                cancel_token,
                stream_id,
            } = params;

            let request = ChatRequest {
                model,
                messages: api_messages,
                stream: true,
                include_reasoning,
            };

            tokio::select! {
                _ = async {
                    let chat_url = construct_api_url(&base_url, "chat/completions");
                    let response = client
                        .post(chat_url)
                        .header("Content-Type", "application/json")
                        .header("Authorization", format!("Bearer {api_key}"))
                        .json(&request)
                        .send()
                        .await;

                    let response = match response {
                        Ok(response) => response,
                        Err(e) => {
                            let _ = tx_clone.send((
                                StreamMessage::Error {
                                    kind: StreamErrorKind::Upstream,
                                    status: None,
                                    message: e.to_string(),
                                },
                                stream_id,
                            ));
                            let _ = tx_clone.send((StreamMessage::End, stream_id));
                            return;
                        }
                    };

                    let status = response.status();
                    if !status.is_success() {
                        let body = response
                            .text()
                            .await
                            .unwrap_or_else(|_| String::new());
                        debug!(status = status.as_u16(), "chat request failed");
                        let _ = tx_clone.send((
                            StreamMessage::Error {
                                kind: error_kind_for_status(status.as_u16()),
                                status: Some(status.as_u16()),
                                message: summarize_error_body(&body),
                            },
                            stream_id,
                        ));
                        let _ = tx_clone.send((StreamMessage::End, stream_id));
                        return;
                    }

                    let mut normalizer = ThinkTagNormalizer::new();
                    let mut stream = response.bytes_stream();
                    let mut buffer: Vec<u8> = Vec::new();

                    while let Some(chunk) = stream.next().await {
                        // Buffered data does not outlive a cancellation.
                        if cancel_token.is_cancelled() {
                            return;
                        }

                        if let Ok(chunk_bytes) = chunk {
                            buffer.extend_from_slice(&chunk_bytes);

                            while let Some(newline_pos) = memchr(b'\n', &buffer) {
                                let line_str = match std::str::from_utf8(&buffer[..newline_pos]) {
                                    Ok(s) => s.trim(),
                                    Err(e) => {
                                        debug!("invalid UTF-8 in stream: {e}");
                                        buffer.drain(..=newline_pos);
                                        continue;
                                    }
                                };

                                let done = process_sse_line(
                                    line_str,
                                    &mut normalizer,
                                    &tx_clone,
                                    stream_id,
                                );
                                buffer.drain(..=newline_pos);
                                if done {
                                    return;
                                }
                            }
                        }
                    }

                    // Connection closed without the sentinel; still a normal
                    // termination from the normalizer's point of view.
                    finish_stream(&mut normalizer, &tx_clone, stream_id);
                } => {}
                _ = cancel_token.cancelled() => {}
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain_chunks(rx: &mut mpsc::UnboundedReceiver<(StreamMessage, u64)>) -> (String, bool) {
        let mut text = String::new();
        let mut ended = false;
        while let Ok((message, _)) = rx.try_recv() {
            match message {
                StreamMessage::Chunk(chunk) => text.push_str(&chunk),
                StreamMessage::End => ended = true,
                StreamMessage::Error { message, .. } => panic!("unexpected error: {message}"),
            }
        }
        (text, ended)
    }

    #[test]
    fn handles_sentinel_spacing_variants() {
        let (service, mut rx) = ChatStreamService::new();
        let mut normalizer = ThinkTagNormalizer::new();

        assert!(!process_sse_line(
            r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#,
            &mut normalizer,
            &service.tx,
            1,
        ));
        assert!(!process_sse_line(
            r#"data:{"choices":[{"delta":{"content":" World"}}]}"#,
            &mut normalizer,
            &service.tx,
            1,
        ));
        assert!(process_sse_line("data: [DONE]", &mut normalizer, &service.tx, 1));

        let (text, ended) = drain_chunks(&mut rx);
        assert_eq!(text, "Hello World");
        assert!(ended);
    }

    #[test]
    fn reasoning_stream_is_wrapped_and_closed_on_content() {
        let (service, mut rx) = ChatStreamService::new();
        let mut normalizer = ThinkTagNormalizer::new();

        for line in [
            r#"data: {"choices":[{"delta":{"reasoning":"plan"}}]}"#,
            r#"data: {"choices":[{"delta":{"reasoning":" more"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"answer"}}]}"#,
        ] {
            assert!(!process_sse_line(line, &mut normalizer, &service.tx, 7));
        }
        assert!(process_sse_line("data: [DONE]", &mut normalizer, &service.tx, 7));

        let (text, ended) = drain_chunks(&mut rx);
        assert_eq!(text, "<think>plan more</think>answer");
        assert!(ended);
    }

    #[test]
    fn reasoning_only_stream_is_closed_at_the_sentinel() {
        let (service, mut rx) = ChatStreamService::new();
        let mut normalizer = ThinkTagNormalizer::new();

        process_sse_line(
            r#"data: {"choices":[{"delta":{"reasoning":"all thought"}}]}"#,
            &mut normalizer,
            &service.tx,
            2,
        );
        assert!(process_sse_line("data: [DONE]", &mut normalizer, &service.tx, 2));

        let (text, ended) = drain_chunks(&mut rx);
        assert_eq!(text, "<think>all thought</think>");
        assert!(ended);
    }

    #[test]
    fn malformed_frame_between_valid_frames_is_skipped() {
        let (service, mut rx) = ChatStreamService::new();
        let mut normalizer = ThinkTagNormalizer::new();

        for line in [
            r#"data: {"choices":[{"delta":{"content":"before"}}]}"#,
            "data: {not json",
            r#"data: {"choices":[{"delta":{"content":" after"}}]}"#,
        ] {
            assert!(!process_sse_line(line, &mut normalizer, &service.tx, 3));
        }

        let (text, _) = drain_chunks(&mut rx);
        assert_eq!(text, "before after");
    }

    #[test]
    fn non_data_lines_are_ignored() {
        let (service, mut rx) = ChatStreamService::new();
        let mut normalizer = ThinkTagNormalizer::new();

        assert!(!process_sse_line("", &mut normalizer, &service.tx, 4));
        assert!(!process_sse_line(": keep-alive", &mut normalizer, &service.tx, 4));
        assert!(!process_sse_line("event: ping", &mut normalizer, &service.tx, 4));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn status_mapping_distinguishes_rate_limits() {
        assert_eq!(error_kind_for_status(429), StreamErrorKind::RateLimited);
        assert_eq!(error_kind_for_status(503), StreamErrorKind::RateLimited);
        assert_eq!(error_kind_for_status(500), StreamErrorKind::Upstream);
        assert_eq!(error_kind_for_status(404), StreamErrorKind::Upstream);
    }

    #[test]
    fn error_body_summaries_collapse_whitespace() {
        assert_eq!(
            summarize_error_body(r#"{"error":{"message":"model  \n overloaded"}}"#),
            "model overloaded"
        );
        assert_eq!(summarize_error_body(r#"{"error":"down"}"#), "down");
        assert_eq!(summarize_error_body("plain failure"), "plain failure");
        assert_eq!(summarize_error_body("   "), "<no body>");
    }
}
