//! Storage error types and result alias.
//!
//! # Error Types
//!
//! - [`StorageError::NotFound`] - No authority is stored under the identity
//! - [`StorageError::AlreadyExists`] - `create` found an existing authority
//! - [`StorageError::Conflict`] - Compare-and-swap lost to a concurrent write
//! - [`StorageError::Rejected`] - The authority failed validation
//! - [`StorageError::Serialization`] - A stored record could not be encoded or decoded
//!
//! # Example
//!
//! ```
//! use trustgate_ca::{CertAuthId, CertAuthType};
//! use trustgate_ca_store::{StorageError, StorageResult};
//!
//! fn lookup(id: &CertAuthId) -> StorageResult<()> {
//!     Err(StorageError::not_found(id.clone()))
//! }
//!
//! let id = CertAuthId::new(CertAuthType::Host, "root");
//! assert!(lookup(&id).unwrap_err().to_string().contains("host/root"));
//! ```

use std::sync::Arc;

use thiserror::Error;
use trustgate_ca::{AuthorityError, CertAuthId};

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors returned by [`CertAuthorityStore`](crate::CertAuthorityStore)
/// implementations.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`; downstream match expressions
/// must include a wildcard arm.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// No authority is stored under the identity.
    #[error("certificate authority not found: {id}")]
    NotFound {
        /// The identity that was looked up.
        id: CertAuthId,
    },

    /// An authority already exists under the identity.
    #[error("certificate authority already exists: {id}")]
    AlreadyExists {
        /// The conflicting identity.
        id: CertAuthId,
    },

    /// The stored authority did not match the expected value.
    ///
    /// Re-read and retry the compare-and-swap.
    #[error("certificate authority {id} was modified concurrently")]
    Conflict {
        /// The contended identity.
        id: CertAuthId,
    },

    /// The authority failed validation and was not written.
    #[error("certificate authority rejected: {0}")]
    Rejected(#[source] AuthorityError),

    /// A stored record could not be encoded or decoded.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },
}

impl StorageError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(id: CertAuthId) -> Self {
        Self::NotFound { id }
    }

    /// Creates a new `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(id: CertAuthId) -> Self {
        Self::AlreadyExists { id }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(id: CertAuthId) -> Self {
        Self::Conflict { id }
    }

    /// Creates a new `Serialization` error with a message and source error.
    #[must_use]
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Returns `true` when retrying after a fresh read may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns `true` for [`StorageError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<AuthorityError> for StorageError {
    fn from(err: AuthorityError) -> Self {
        match err {
            err @ AuthorityError::Serialization { .. } => {
                Self::serialization_with_source("failed to encode or decode authority", err)
            },
            other => Self::Rejected(other),
        }
    }
}
