//! Conversational session state
//!
//! One `Session` per external address. The `data` payload is split into
//! two zones the type system keeps apart: `persistent` fields that must
//! survive flow completion and delegation round-trips, and `scratch`
//! fields a flow accumulates step by step and throws away when it
//! finishes. Handlers that run a flow only ever merge into `scratch`;
//! nothing a step writes can reach the persistent zone.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sitedesk_protocol::{Role, SiteContext};

/// Soft expiry for idle sessions. An older session hydrates as cleared,
/// so a returning user lands on the menu instead of a stale step.
pub const SESSION_TTL_HOURS: i64 = 12;

/// Open string-keyed map holding a flow's step-by-step scratch fields.
pub type Scratch = Map<String, Value>;

/// Names of the multi-step workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    ActivityLog,
    MaterialRequest,
    InventoryTxn,
    InvoiceTrack,
    Booking,
    /// Marker intent held by a privileged session while delegating.
    Delegate,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::ActivityLog => "activity_log",
            Intent::MaterialRequest => "material_request",
            Intent::InventoryTxn => "inventory_txn",
            Intent::InvoiceTrack => "invoice_track",
            Intent::Booking => "booking",
            Intent::Delegate => "delegate",
        }
    }

    pub fn parse(s: &str) -> Option<Intent> {
        match s {
            "activity_log" => Some(Intent::ActivityLog),
            "material_request" => Some(Intent::MaterialRequest),
            "inventory_txn" => Some(Intent::InventoryTxn),
            "invoice_track" => Some(Intent::InvoiceTrack),
            "booking" => Some(Intent::Booking),
            "delegate" => Some(Intent::Delegate),
            _ => None,
        }
    }
}

/// The delegated flow's own `(intent, step, scratch)`, nested under the
/// outer session so it cannot collide with the outer flow fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InnerFlow {
    pub intent: Option<Intent>,
    pub step: Option<String>,
    #[serde(default)]
    pub scratch: Scratch,
}

/// Fields that survive `data` replacement during flow steps: the site
/// selection and the delegation markers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistentFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_role: Option<Role>,
    #[serde(default)]
    pub is_delegated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acting_as: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_site: Option<SiteContext>,
    #[serde(default)]
    pub site_selection_shown: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner: Option<InnerFlow>,
}

/// The two-zone session payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(default)]
    pub persistent: PersistentFields,
    #[serde(default)]
    pub scratch: Scratch,
}

/// Per-address conversational state.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub address: String,
    pub intent: Option<Intent>,
    pub step: Option<String>,
    pub data: SessionData,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            intent: None,
            step: None,
            data: SessionData::default(),
            updated_at: Utc::now(),
        }
    }

    /// No active flow.
    pub fn is_idle(&self) -> bool {
        self.intent.is_none()
    }

    /// `intent` set with `step` unset can only come from a bad write.
    /// The dispatcher treats this as corrupted and resets.
    pub fn is_corrupted(&self) -> bool {
        self.intent.is_some() && self.step.is_none()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now - self.updated_at > Duration::hours(SESSION_TTL_HOURS)
    }

    pub fn site(&self) -> Option<&SiteContext> {
        self.data.persistent.selected_site.as_ref()
    }

    /// Enter a flow at the given step.
    pub fn start_flow(&mut self, intent: Intent, step: &str) {
        self.intent = Some(intent);
        self.step = Some(step.to_string());
        self.data.scratch = Scratch::new();
        self.touch();
    }

    /// Leave the active flow, keeping the persistent zone intact.
    /// Used on completion, abandonment, and error recovery.
    pub fn clear_flow(&mut self) {
        self.intent = None;
        self.step = None;
        self.data.scratch = Scratch::new();
        self.touch();
    }

    /// Full reset to the null/null/{} state, persistent zone included.
    pub fn reset(&mut self) {
        self.intent = None;
        self.step = None;
        self.data = SessionData::default();
        self.touch();
    }

    /// Apply a partial update: `intent`/`step` replace wholesale when
    /// present, `scratch` entries merge into the existing scratch map.
    pub fn apply(&mut self, patch: SessionPatch) {
        if let Some(intent) = patch.intent {
            self.intent = intent;
        }
        if let Some(step) = patch.step {
            self.step = step;
        }
        for (k, v) in patch.scratch {
            self.data.scratch.insert(k, v);
        }
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Partial session update with the store's merge semantics.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    /// `Some(None)` clears the intent; `None` leaves it untouched.
    pub intent: Option<Option<Intent>>,
    pub step: Option<Option<String>>,
    pub scratch: Scratch,
}
