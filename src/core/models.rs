use serde::{Deserialize, Serialize};

/// Request kinds the ledger accounts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    Text,
    ImageGen,
    Vision,
}

impl ActionKind {
    /// Human-readable label used in quota-denied messages.
    pub fn label(self) -> &'static str {
        match self {
            ActionKind::Text => "message",
            ActionKind::ImageGen => "image generation",
            ActionKind::Vision => "image analysis",
        }
    }
}

/// Per-tier daily allowance, one slot per action kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierQuota {
    pub text: u32,
    pub image_gen: u32,
    pub vision: u32,
}

impl TierQuota {
    pub fn for_action(self, action: ActionKind) -> u32 {
        match action {
            ActionKind::Text => self.text,
            ActionKind::ImageGen => self.image_gen,
            ActionKind::Vision => self.vision,
        }
    }
}

/// The closed set of model selections offered by the client. Each tier maps
/// to one upstream model and carries its own capability and quota profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelTier {
    Fast,
    Balanced,
    DeepReasoning,
    Coder,
}

impl ModelTier {
    pub const ALL: [ModelTier; 4] = [
        ModelTier::Fast,
        ModelTier::Balanced,
        ModelTier::DeepReasoning,
        ModelTier::Coder,
    ];

    pub fn id(self) -> &'static str {
        match self {
            ModelTier::Fast => "fast",
            ModelTier::Balanced => "balanced",
            ModelTier::DeepReasoning => "deep-reasoning",
            ModelTier::Coder => "coder",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ModelTier::Fast => "Palaver Fast",
            ModelTier::Balanced => "Palaver Pro",
            ModelTier::DeepReasoning => "Palaver Super Pro",
            ModelTier::Coder => "Palaver Coder",
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            ModelTier::Fast => "FAST",
            ModelTier::Balanced => "SMART",
            ModelTier::DeepReasoning => "REASONING",
            ModelTier::Coder => "DEV",
        }
    }

    /// Upstream model identifier sent on the wire.
    pub fn upstream_model(self) -> &'static str {
        match self {
            ModelTier::Fast => "meta-llama/llama-3.3-70b-instruct:free",
            ModelTier::Balanced => "mistralai/mistral-large-2402",
            ModelTier::DeepReasoning => "deepseek/deepseek-r1:free",
            ModelTier::Coder => "meta-llama/llama-3-70b-instruct",
        }
    }

    /// Whether the upstream accepts image input natively. Attachment flows
    /// still travel as spliced descriptions; embedding UIs use this flag to
    /// decide what to offer.
    pub fn supports_images(self) -> bool {
        matches!(self, ModelTier::Balanced)
    }

    /// Whether exhausted daily text quota may fall back to wallet credits.
    pub fn credit_eligible(self) -> bool {
        matches!(self, ModelTier::Balanced | ModelTier::DeepReasoning)
    }

    /// Whether the upstream emits reasoning on a separate channel. The other
    /// tiers are asked to think inline via their persona prompt.
    pub fn has_reasoning_channel(self) -> bool {
        matches!(self, ModelTier::DeepReasoning)
    }

    pub fn quota(self) -> TierQuota {
        match self {
            ModelTier::Fast => TierQuota {
                text: 20,
                image_gen: 2,
                vision: 2,
            },
            ModelTier::Balanced => TierQuota {
                text: 15,
                image_gen: 1,
                vision: 1,
            },
            ModelTier::DeepReasoning => TierQuota {
                text: 3,
                image_gen: 1,
                vision: 1,
            },
            ModelTier::Coder => TierQuota {
                text: 5,
                image_gen: 0,
                vision: 0,
            },
        }
    }
}

impl TryFrom<&str> for ModelTier {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "fast" => Ok(ModelTier::Fast),
            "balanced" => Ok(ModelTier::Balanced),
            "deep-reasoning" => Ok(ModelTier::DeepReasoning),
            "coder" => Ok(ModelTier::Coder),
            _ => Err(format!("invalid model tier: {value}")),
        }
    }
}
