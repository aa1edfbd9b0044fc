//! Engine → Channel response descriptors
//!
//! The engine emits an ordered list of these per inbound event. A
//! channel renderer turns them into actual messages; ordering and any
//! send delays are the renderer's concern, not the engine's.

use serde::{Deserialize, Serialize};

/// One selectable option inside a menu response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuOption {
    pub id: String,
    pub label: String,
}

impl MenuOption {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Abstract outbound response fragments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Ask the user for the next piece of input.
    Prompt { text: String },

    /// Ask the user to pick one of a fixed set of options.
    Menu {
        text: String,
        options: Vec<MenuOption>,
    },

    /// Acknowledge something that just happened (flow complete, site
    /// auto-selected, delegation started, ...).
    Confirmation { text: String },

    /// A user-visible failure (validation hint, upload failure, generic
    /// apology for an internal error).
    Failure { text: String },
}

impl Response {
    pub fn prompt(text: impl Into<String>) -> Self {
        Response::Prompt { text: text.into() }
    }

    pub fn menu(text: impl Into<String>, options: Vec<MenuOption>) -> Self {
        Response::Menu {
            text: text.into(),
            options,
        }
    }

    pub fn confirmation(text: impl Into<String>) -> Self {
        Response::Confirmation { text: text.into() }
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Response::Failure { text: text.into() }
    }
}
