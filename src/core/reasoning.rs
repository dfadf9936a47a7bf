//! Reasoning-stream normalization.
//!
//! Upstreams disagree about how reasoning reaches us: some emit it on a
//! separate delta channel, some inline literal `<think>` tags because their
//! persona prompt asked for them, some produce none at all. The normalizer
//! guarantees that whatever arrives, the accumulated response text contains
//! the marker pair at most once, with reasoning inside and the answer
//! outside.

use crate::api::DeltaEvent;

pub const THINK_OPEN: &str = "<think>";
pub const THINK_CLOSE: &str = "</think>";

/// Per-response state. Created when a streamed response begins and discarded
/// when it terminates; never persisted.
#[derive(Debug, Default)]
pub struct ThinkTagNormalizer {
    opened: bool,
    closed: bool,
}

impl ThinkTagNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one normalized delta event, returning the text pieces to emit,
    /// in order. At most two pieces: a marker and the fragment itself.
    pub fn push(&mut self, event: DeltaEvent) -> Vec<String> {
        let mut pieces = Vec::with_capacity(2);
        match event {
            DeltaEvent::Reasoning(fragment) => {
                if !self.opened {
                    self.opened = true;
                    pieces.push(THINK_OPEN.to_string());
                }
                pieces.push(fragment);
            }
            DeltaEvent::Content(fragment) => {
                if self.opened && !self.closed {
                    self.closed = true;
                    pieces.push(THINK_CLOSE.to_string());
                }
                pieces.push(fragment);
            }
            DeltaEvent::Ignorable => {}
        }
        pieces
    }

    /// Called at normal stream end only. Balances the marker pair when the
    /// upstream stopped mid-reasoning. Cancelled streams must not call this;
    /// their partial output is discarded by the caller.
    pub fn finish(&mut self) -> Option<&'static str> {
        if self.opened && !self.closed {
            self.closed = true;
            Some(THINK_CLOSE)
        } else {
            None
        }
    }
}

/// How a message's reasoning block, if any, terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningPhase {
    /// No `<think>` marker present; plain answer.
    None,
    /// Opener seen but no closer yet; the response is still streaming.
    InProgress,
    /// Balanced pair; reasoning is complete and an answer may follow.
    Complete,
}

/// Split of accumulated response text into its reasoning and answer parts.
///
/// This is the consumer-side counterpart of the normalizer: renderers must
/// cope with no markers at all, an unterminated opener, and a balanced pair
/// followed by answer text. Empty input yields an empty split, never an
/// error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThinkSplit<'a> {
    pub reasoning: Option<&'a str>,
    pub phase: ReasoningPhase,
    pub answer: &'a str,
}

impl<'a> ThinkSplit<'a> {
    pub fn parse(content: &'a str) -> Self {
        let Some(open) = content.find(THINK_OPEN) else {
            return Self {
                reasoning: None,
                phase: ReasoningPhase::None,
                answer: content,
            };
        };
        let after_open = &content[open + THINK_OPEN.len()..];
        match after_open.find(THINK_CLOSE) {
            Some(close) => Self {
                reasoning: Some(&after_open[..close]),
                phase: ReasoningPhase::Complete,
                answer: &after_open[close + THINK_CLOSE.len()..],
            },
            None => Self {
                reasoning: Some(after_open),
                phase: ReasoningPhase::InProgress,
                answer: "",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(events: Vec<DeltaEvent>, finish: bool) -> String {
        let mut normalizer = ThinkTagNormalizer::new();
        let mut out = String::new();
        for event in events {
            for piece in normalizer.push(event) {
                out.push_str(&piece);
            }
        }
        if finish {
            if let Some(closer) = normalizer.finish() {
                out.push_str(closer);
            }
        }
        out
    }

    #[test]
    fn reasoning_then_content_yields_one_balanced_pair() {
        let out = collect(
            vec![
                DeltaEvent::Reasoning("step 1".into()),
                DeltaEvent::Reasoning(" step 2".into()),
                DeltaEvent::Content("answer".into()),
                DeltaEvent::Content(" more".into()),
            ],
            true,
        );
        assert_eq!(out, "<think>step 1 step 2</think>answer more");
        assert_eq!(out.matches(THINK_OPEN).count(), 1);
        assert_eq!(out.matches(THINK_CLOSE).count(), 1);
    }

    #[test]
    fn content_only_stream_carries_no_markers() {
        let out = collect(
            vec![
                DeltaEvent::Content("plain".into()),
                DeltaEvent::Content(" answer".into()),
            ],
            true,
        );
        assert_eq!(out, "plain answer");
    }

    #[test]
    fn reasoning_only_stream_gets_synthesized_closer_at_end() {
        let out = collect(
            vec![
                DeltaEvent::Reasoning("thinking".into()),
                DeltaEvent::Reasoning(" hard".into()),
            ],
            true,
        );
        assert_eq!(out, "<think>thinking hard</think>");
    }

    #[test]
    fn cancelled_stream_is_left_unbalanced() {
        let out = collect(vec![DeltaEvent::Reasoning("partial".into())], false);
        assert_eq!(out, "<think>partial");
    }

    #[test]
    fn ignorable_events_emit_nothing() {
        let out = collect(
            vec![
                DeltaEvent::Ignorable,
                DeltaEvent::Reasoning("a".into()),
                DeltaEvent::Ignorable,
                DeltaEvent::Content("b".into()),
            ],
            true,
        );
        assert_eq!(out, "<think>a</think>b");
    }

    #[test]
    fn interleavings_never_emit_closer_before_opener() {
        // Content first: no markers until reasoning shows up, which this
        // upstream contract says cannot happen after content. Even if it
        // does, the pair stays ordered.
        let out = collect(
            vec![
                DeltaEvent::Content("pre".into()),
                DeltaEvent::Reasoning("late".into()),
                DeltaEvent::Content("post".into()),
            ],
            true,
        );
        let open = out.find(THINK_OPEN).unwrap();
        let close = out.find(THINK_CLOSE).unwrap();
        assert!(open < close);
        assert_eq!(out.matches(THINK_OPEN).count(), 1);
        assert_eq!(out.matches(THINK_CLOSE).count(), 1);
    }

    #[test]
    fn finish_is_idempotent() {
        let mut normalizer = ThinkTagNormalizer::new();
        normalizer.push(DeltaEvent::Reasoning("x".into()));
        assert_eq!(normalizer.finish(), Some(THINK_CLOSE));
        assert_eq!(normalizer.finish(), None);
    }

    #[test]
    fn split_handles_all_render_shapes() {
        let plain = ThinkSplit::parse("just an answer");
        assert_eq!(plain.phase, ReasoningPhase::None);
        assert_eq!(plain.answer, "just an answer");
        assert!(plain.reasoning.is_none());

        let streaming = ThinkSplit::parse("<think>still going");
        assert_eq!(streaming.phase, ReasoningPhase::InProgress);
        assert_eq!(streaming.reasoning, Some("still going"));
        assert_eq!(streaming.answer, "");

        let done = ThinkSplit::parse("<think>plan</think>final");
        assert_eq!(done.phase, ReasoningPhase::Complete);
        assert_eq!(done.reasoning, Some("plan"));
        assert_eq!(done.answer, "final");
    }

    #[test]
    fn split_of_empty_content_is_an_empty_state() {
        let empty = ThinkSplit::parse("");
        assert_eq!(empty.phase, ReasoningPhase::None);
        assert_eq!(empty.answer, "");
        assert!(empty.reasoning.is_none());
    }
}
