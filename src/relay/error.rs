//! Error taxonomy for the relay core.
use crate::relay::roles::Role;
use crate::storage::StoreError;

/// Failures surfaced by relay operations.
///
/// Only [RelayError::StoreUnavailable] at startup is fatal. Everything else is
/// recovered inside the event loop and turned into a reply (or silence).
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("state store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("no free alias left for role {role}")]
    AliasSpaceExhausted { role: Role },

    #[error("alias not found: {0}")]
    AliasNotFound(String),

    #[error("delivery failed: {0}")]
    Delivery(String),
}

pub type RelayResult<T> = Result<T, RelayError>;
