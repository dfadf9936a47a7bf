//! Per-tier persona prompts.
//!
//! Every tier speaks as the same product persona. Tiers without a native
//! reasoning channel get the synthetic-thinking block appended, which asks
//! the upstream to emit its plan inside literal `<think>` tags so the rest
//! of the pipeline sees one uniform shape.

use crate::core::models::ModelTier;

const SYNTHETIC_THINKING: &str = "\
[IMPORTANT INSTRUCTION]
You are a Deep Reasoning AI.
Before answering, you MUST start a structured thought process block.
1. Start with <think>.
2. Break down the user's request logically.
3. Plan your response step-by-step.
4. End with </think>.
5. Finally, provide the answer.
DO NOT put conversational filler inside the think block. Only logic.";

pub fn system_prompt(tier: ModelTier) -> String {
    match tier {
        ModelTier::Fast => {
            "You are Palaver Fast. Helpful, fast, witty companion. Speak naturally.".to_string()
        }
        ModelTier::Balanced => format!(
            "You are Palaver Pro. Intelligent and balanced. {SYNTHETIC_THINKING}"
        ),
        ModelTier::DeepReasoning => "You are Palaver Super Pro. You are a deep reasoning \
             engine. Output your thought process naturally."
            .to_string(),
        ModelTier::Coder => format!(
            "You are Palaver Coder. Expert developer. {SYNTHETIC_THINKING}"
        ),
    }
}
