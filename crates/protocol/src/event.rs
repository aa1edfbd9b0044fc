//! Channel → Engine events
//!
//! Channel adapters (WhatsApp, SMS, web chat, ...) normalize whatever
//! they receive into one of these before it reaches the engine. The
//! engine never sees channel-specific wire formats.

use serde::{Deserialize, Serialize};

/// A normalized inbound event for one address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    /// External identity key (e.g. phone number).
    pub address: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Payload variants of an inbound event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// Free-form text typed by the user.
    Text { body: String },

    /// A structured selection (tapping a menu option).
    Selection { id: String },

    /// An attachment, bytes base64-encoded by the channel adapter.
    Attachment {
        filename: Option<String>,
        mime_type: String,
        data_base64: String,
    },
}

impl InboundEvent {
    /// Convenience constructor for text events.
    pub fn text(address: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            kind: EventKind::Text { body: body.into() },
        }
    }

    /// Convenience constructor for selection events.
    pub fn selection(address: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            kind: EventKind::Selection { id: id.into() },
        }
    }
}
