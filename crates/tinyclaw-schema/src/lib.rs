//! Shared wire and domain types for the TinyClaw queue processor core.
//!
//! Every type here is designed to round-trip through `serde_json`/`serde_yaml`
//! tolerantly: unknown fields are ignored on read, and every optional field
//! carries `#[serde(default)]` so a record written by an older version of the
//! daemon still parses.

pub mod conversation;
pub mod messages;
pub mod routing;
pub mod settings;
pub mod tags;

pub use conversation::*;
pub use messages::*;
pub use routing::*;
pub use settings::*;
pub use tags::*;
