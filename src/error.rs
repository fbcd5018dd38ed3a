//! Error taxonomy for the catalog layer.
//!
//! A point-lookup miss is not an error: it surfaces as `None`. Everything that
//! reaches the document store can fail with [`CatalogError::StoreUnavailable`],
//! which callers may retry; this layer never retries on its own.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    /// The underlying store call failed (connectivity, permission, quota).
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A record read from the store does not satisfy the catalog schema.
    #[error("invalid record: {0}")]
    Validation(String),

    /// A pagination cursor that this service did not mint.
    #[error("invalid pagination cursor")]
    InvalidCursor,
}

impl CatalogError {
    /// Whether a caller may reasonably retry the failed call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CatalogError::StoreUnavailable(_))
    }
}

impl From<sqlx::Error> for CatalogError {
    fn from(err: sqlx::Error) -> Self {
        CatalogError::StoreUnavailable(err.to_string())
    }
}

impl From<validator::ValidationErrors> for CatalogError {
    fn from(err: validator::ValidationErrors) -> Self {
        CatalogError::Validation(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
