//! Errors from the projection layer.

use regmap_core::Diagnostics;
use thiserror::Error;

/// Convenience alias for results within the observe crate.
pub type Result<T> = std::result::Result<T, ObserveError>;

/// Errors that can occur while projecting a register map.
#[derive(Debug, Error)]
pub enum ObserveError {
    #[error("no such entity: '{path}'")]
    UnknownEntity { path: String },

    #[error("register map failed verification: {0}")]
    Verification(#[from] Diagnostics),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
