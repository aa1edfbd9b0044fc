//! SiteDesk Protocol
//!
//! Shared types crossing the engine boundary: normalized inbound events
//! from channel adapters, outbound response descriptors for renderers,
//! and the identity/site types both sides agree on. Serialized as JSON
//! over the HTTP ingress.

use uuid::Uuid;

// Re-exports
pub mod event;
pub mod response;
pub mod types;

pub use event::{EventKind, InboundEvent};
pub use response::{MenuOption, Response};
pub use types::*;

/// Generate a new unique ID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
