//! Error types for lochist-core.

use lochist_types::ValidationError;

use crate::flags::FlagStoreError;

/// Result type for lochist-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while managing a location subscription.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The location provider refused or failed the call.
    #[error("Location provider error: {0}")]
    Provider(String),

    /// The persisted subscription flag could not be read or written.
    #[error("Flag store error: {0}")]
    Flags(#[from] FlagStoreError),

    /// The location request cadence is unusable.
    #[error("Invalid location request: {0}")]
    InvalidRequest(#[from] ValidationError),
}

impl Error {
    /// Create a provider error from any displayable message.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }
}
