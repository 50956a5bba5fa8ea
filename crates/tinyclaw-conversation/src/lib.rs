//! Conversation lifecycle tracking: the registry that owns every running
//! conversation's fan-out/fan-in state, plus the per-team transcript writer.
//!
//! Grounded on `clawhive-core/src/peer_registry.rs` for the
//! registry-over-HashMap shape, and `clawhive-memory/src/session.rs` for the
//! JSONL transcript append idiom.

pub mod registry;
pub mod transcript;

pub use registry::ConversationRegistry;
pub use transcript::TranscriptWriter;
