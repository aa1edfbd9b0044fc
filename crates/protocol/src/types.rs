//! Core types shared across the protocol

use serde::{Deserialize, Serialize};

/// Role of a conversation participant.
///
/// `Admin` is the privileged role that may delegate into the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Employee,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Employee => "employee",
            Role::Customer => "customer",
        }
    }
}

/// A resolved identity behind an address.
///
/// Identity resolution (including OTP verification) happens outside the
/// engine; the engine trusts this mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub address: String,
    pub role: Role,
    pub verified: bool,
    pub display_name: Option<String>,
}

/// A (site id, site name) pair scoped to a session or delegation frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteContext {
    pub site_id: String,
    pub site_name: String,
}

/// Durable record categories produced by completed flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Activity,
    MaterialRequest,
    InventoryTxn,
    Invoice,
    Booking,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Activity => "activity",
            RecordType::MaterialRequest => "material_request",
            RecordType::InventoryTxn => "inventory_txn",
            RecordType::Invoice => "invoice",
            RecordType::Booking => "booking",
        }
    }
}
