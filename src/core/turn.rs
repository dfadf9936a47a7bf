//! Single-turn orchestration.
//!
//! A submitted turn moves through `Idle -> LimitCheck -> (Denied -> Idle) |
//! (Approved -> Streaming -> (Aborted | Failed | Completed) -> Idle)`. Quota
//! is charged on the first non-empty chunk rather than at request time or
//! stream end: a request that fails before producing output costs nothing,
//! while a response that dies after one token still counts exactly once.
//!
//! One logical request is in flight at a time. [`ChatController::submit`]
//! returns an explicit [`StreamHandle`] owned by the caller; cancelling it
//! discards the partial response without surfacing an error and without
//! rolling back quota.

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::chat_stream::{
    ChatStreamService, StreamErrorKind, StreamMessage, StreamParams,
};
use crate::core::error::ChatError;
use crate::core::image_gen::ImageGenClient;
use crate::core::ledger::Ledger;
use crate::core::message::{self, Message};
use crate::core::models::{ActionKind, ModelTier};
use crate::core::persona;
use crate::core::vision::{bridge_prompt, VisionBridge};

/// Connection parameters for the chat-completion endpoint.
pub struct SessionConfig {
    pub base_url: String,
    pub api_key: String,
    pub tier: ModelTier,
}

/// Caller-owned handle for one in-flight stream.
#[derive(Debug)]
pub struct StreamHandle {
    pub stream_id: u64,
    cancel_token: CancellationToken,
}

impl StreamHandle {
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

#[derive(Debug)]
enum TurnState {
    Idle,
    Streaming {
        stream_id: u64,
        message_id: u64,
        charged: bool,
        charge_vision: bool,
    },
}

/// What the UI should do with one stream message it relayed in.
#[derive(Debug)]
pub enum TurnUpdate {
    /// The message with this id grew; re-render it.
    Delta { message_id: u64 },
    /// The turn finished normally.
    Completed { message_id: u64 },
    /// The turn failed; `QuotaExceeded` never appears here (it is decided
    /// before any I/O) and `Cancelled` never appears (cancelled streams go
    /// quiet instead).
    Failed(ChatError),
    /// Stale stream id or empty fragment; nothing to do.
    Ignored,
}

pub struct ChatController {
    client: reqwest::Client,
    config: SessionConfig,
    stream: ChatStreamService,
    ledger: Ledger,
    vision: Option<VisionBridge>,
    image_gen: Option<ImageGenClient>,
    messages: Vec<Message>,
    state: TurnState,
    next_stream_id: u64,
    next_message_id: u64,
}

impl ChatController {
    /// Builds a controller and the receiver its stream fragments arrive on.
    /// The UI owns the receiver and feeds everything it yields back into
    /// [`Self::on_stream_message`].
    pub fn new(
        client: reqwest::Client,
        config: SessionConfig,
        ledger: Ledger,
    ) -> (
        Self,
        tokio::sync::mpsc::UnboundedReceiver<(StreamMessage, u64)>,
    ) {
        let (stream, rx) = ChatStreamService::new();
        (
            Self {
                client,
                config,
                stream,
                ledger,
                vision: None,
                image_gen: None,
                messages: Vec::new(),
                state: TurnState::Idle,
                next_stream_id: 1,
                next_message_id: 1,
            },
            rx,
        )
    }

    pub fn with_vision_bridge(mut self, bridge: VisionBridge) -> Self {
        self.vision = Some(bridge);
        self
    }

    pub fn with_image_gen(mut self, client: ImageGenClient) -> Self {
        self.image_gen = Some(client);
        self
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.state, TurnState::Streaming { .. })
    }

    pub fn tier(&self) -> ModelTier {
        self.config.tier
    }

    pub fn set_tier(&mut self, tier: ModelTier) {
        self.config.tier = tier;
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }

    /// Starts a streamed chat turn. Limit checks happen before any I/O;
    /// a denial returns [`ChatError::QuotaExceeded`] synchronously.
    pub async fn submit(
        &mut self,
        input: &str,
        images: Vec<String>,
    ) -> Result<StreamHandle, ChatError> {
        if self.is_busy() {
            return Err(ChatError::Busy);
        }

        let tier = self.config.tier;
        let charge_vision = !images.is_empty();
        if charge_vision {
            self.ledger
                .check_limit(tier, ActionKind::Vision)
                .into_result()?;
        }
        self.ledger
            .check_limit(tier, ActionKind::Text)
            .into_result()?;

        let final_user_content = self.bridged_content(input, &images).await;

        let user_id = self.alloc_message_id();
        self.messages.push(Message::user(user_id, input, images));
        let message_id = self.alloc_message_id();
        self.messages.push(Message::model_placeholder(message_id));

        let api_messages = message::to_api_messages(
            &persona::system_prompt(tier),
            &self.messages,
            final_user_content.as_deref(),
        );

        let stream_id = self.alloc_stream_id();
        let cancel_token = CancellationToken::new();
        debug!(stream_id, tier = tier.id(), "starting chat stream");
        self.stream.spawn_stream(StreamParams {
            client: self.client.clone(),
            base_url: self.config.base_url.clone(),
            api_key: self.config.api_key.clone(),
            model: tier.upstream_model().to_string(),
            include_reasoning: tier.has_reasoning_channel(),
            api_messages,
            cancel_token: cancel_token.clone(),
            stream_id,
        });

        self.state = TurnState::Streaming {
            stream_id,
            message_id,
            charged: false,
            charge_vision,
        };
        Ok(StreamHandle {
            stream_id,
            cancel_token,
        })
    }

    /// An attached image always travels as a description spliced into the
    /// outgoing prompt; the chat wire types are text-only on every tier.
    /// Without a configured bridge the splice carries a placeholder
    /// description.
    async fn bridged_content(&self, input: &str, images: &[String]) -> Option<String> {
        let image = images.first()?;
        let description = match self.vision.as_ref() {
            Some(bridge) => bridge.describe(image).await,
            None => "Image analysis unavailable.".to_string(),
        };
        Some(bridge_prompt(&description, input))
    }

    /// Applies one message from the stream receiver. Messages from stale
    /// stream ids (a cancelled or superseded turn) are ignored.
    pub fn on_stream_message(&mut self, message: StreamMessage, stream_id: u64) -> TurnUpdate {
        let TurnState::Streaming {
            stream_id: current,
            message_id,
            charged,
            charge_vision,
        } = &mut self.state
        else {
            return TurnUpdate::Ignored;
        };
        if *current != stream_id {
            return TurnUpdate::Ignored;
        }
        let message_id = *message_id;

        match message {
            StreamMessage::Chunk(fragment) => {
                if fragment.is_empty() {
                    return TurnUpdate::Ignored;
                }
                if !*charged {
                    *charged = true;
                    let charge_vision = *charge_vision;
                    let tier = self.config.tier;
                    self.ledger.consume(tier, ActionKind::Text);
                    if charge_vision {
                        self.ledger.consume(tier, ActionKind::Vision);
                    }
                    // Accounting writes must never abort a running turn.
                    if let Err(err) = self.ledger.persist() {
                        warn!("failed to persist ledger: {err}");
                    }
                }
                if let Some(entry) = self.messages.iter_mut().find(|m| m.id == message_id) {
                    entry.push_fragment(&fragment);
                }
                TurnUpdate::Delta { message_id }
            }
            StreamMessage::Error {
                kind,
                status,
                message,
            } => {
                self.state = TurnState::Idle;
                let err = match kind {
                    StreamErrorKind::RateLimited => ChatError::RateLimited {
                        status: status.unwrap_or(429),
                    },
                    StreamErrorKind::Upstream => ChatError::Upstream { status, message },
                };
                // The placeholder becomes the error bubble; partial output
                // already streamed into it is kept.
                if let Some(entry) = self.messages.iter_mut().find(|m| m.id == message_id) {
                    entry.is_error = true;
                    if entry.content.is_empty() {
                        entry.content = err.to_string();
                    }
                }
                TurnUpdate::Failed(err)
            }
            StreamMessage::End => {
                self.state = TurnState::Idle;
                self.discard_if_empty(message_id);
                TurnUpdate::Completed { message_id }
            }
        }
    }

    /// Cancels an in-flight turn. The partial response is discarded, no
    /// error surfaces, and quota that was already consumed stays consumed.
    pub fn cancel(&mut self, handle: &StreamHandle) {
        handle.cancel();
        if let TurnState::Streaming {
            stream_id,
            message_id,
            ..
        } = self.state
        {
            if stream_id == handle.stream_id {
                self.messages.retain(|m| m.id != message_id);
                self.state = TurnState::Idle;
            }
        }
    }

    /// Runs one image-generation turn. Unlike chat, the call is not
    /// streamed; quota is consumed only on success, so failed generations
    /// cost nothing.
    pub async fn generate_image(
        &mut self,
        prompt: &str,
        reference_images: Vec<String>,
    ) -> Result<u64, ChatError> {
        if self.is_busy() {
            return Err(ChatError::Busy);
        }
        let tier = self.config.tier;
        self.ledger
            .check_limit(tier, ActionKind::ImageGen)
            .into_result()?;

        // The prompt enters history before the call and stays there when
        // the generation fails.
        let user_id = self.alloc_message_id();
        self.messages
            .push(Message::user(user_id, prompt, reference_images.clone()));

        let Some(client) = self.image_gen.as_ref() else {
            return Err(ChatError::Upstream {
                status: None,
                message: "image generation is not configured".to_string(),
            });
        };

        let generated = client.generate(prompt, &reference_images).await?;

        self.ledger.consume(tier, ActionKind::ImageGen);
        if let Err(err) = self.ledger.persist() {
            warn!("failed to persist ledger: {err}");
        }

        let message_id = self.alloc_message_id();
        self.messages.push(Message::model(
            message_id,
            generated.narrative,
            generated.images,
        ));
        Ok(message_id)
    }

    fn discard_if_empty(&mut self, message_id: u64) {
        if let Some(idx) = self.messages.iter().position(|m| m.id == message_id) {
            if self.messages[idx].content.is_empty() {
                self.messages.remove(idx);
            }
        }
    }

    fn alloc_message_id(&mut self) -> u64 {
        let id = self.next_message_id;
        self.next_message_id += 1;
        id
    }

    fn alloc_stream_id(&mut self) -> u64 {
        let id = self.next_stream_id;
        self.next_stream_id += 1;
        id
    }
}
