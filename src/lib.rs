//! Palaver is the core library of a chat client that fronts several remote LLM
//! backends behind one persona while enforcing a client-side daily usage quota
//! and a credit wallet for overflow messages.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns conversation state, tier selection, the reasoning-stream
//!   normalizer, the usage/wallet ledger, and streaming orchestration.
//! - [`api`] defines the wire payloads exchanged with chat-completion and
//!   image-generation endpoints, plus the single normalization step that maps
//!   every accepted wire shape into one internal delta event type.
//! - [`utils`] holds URL construction and tracing setup shared by the rest of
//!   the crate.
//!
//! There is no binary entrypoint: a UI embeds [`core::turn::ChatController`],
//! drives the stream receiver it hands back, and renders the incremental text
//! it produces.

pub mod api;
pub mod core;
pub mod utils;
