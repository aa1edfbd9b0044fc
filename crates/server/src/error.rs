//! Engine error taxonomy
//!
//! Validation problems are not errors — they flow back to the user as
//! prompts. This enum covers the failures of external collaborators
//! (storage, record sink, attachment store) and corrupted state that the
//! engine recovers from without crashing the conversation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("storage task failed: {0}")]
    StorageJoin(#[from] tokio::task::JoinError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("record sink unavailable: {0}")]
    Sink(String),
}
