//! Error types for templar-core.

use thiserror::Error;

/// Errors from encoding the materials ledger into an artifact header.
#[derive(Debug, Error)]
pub enum MaterialsError {
    /// The ledger could not be serialized as JSON.
    #[error("BOM serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
