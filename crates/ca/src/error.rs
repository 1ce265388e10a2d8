//! Error types and result alias for certificate authority operations.
//!
//! Every failure in this crate is a deterministic function of its input:
//! retrying with the same authority always reproduces the same error.
//!
//! # Error Types
//!
//! - [`AuthorityError::Parse`] - Malformed certificate or private key bytes
//! - [`AuthorityError::Validation`] - A parseable authority violates a policy rule
//! - [`AuthorityError::Serialization`] - The persisted form could not be encoded or decoded
//!
//! # Example
//!
//! ```
//! use trustgate_ca::{AuthorityError, AuthorityResult};
//!
//! fn reject() -> AuthorityResult<()> {
//!     Err(AuthorityError::validation("cluster name is required"))
//! }
//!
//! assert!(reject().unwrap_err().is_validation());
//! ```

use std::{fmt, sync::Arc};

use thiserror::Error;

use crate::types::{CertAuthType, KeyPurpose};

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for certificate authority operations.
pub type AuthorityResult<T> = Result<T, AuthorityError>;

/// Which half of a key pair failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyField {
    /// The public certificate (or public key) bytes.
    Certificate,
    /// The private key bytes.
    PrivateKey,
}

impl fmt::Display for KeyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Certificate => f.write_str("certificate"),
            Self::PrivateKey => f.write_str("private key"),
        }
    }
}

/// The authority a parse failure belongs to, when known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityContext {
    /// Trust domain of the owning authority.
    pub cluster_name: String,
    /// Type of the owning authority.
    pub ca_type: CertAuthType,
}

impl fmt::Display for AuthorityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, " (authority {} of cluster {:?})", self.ca_type, self.cluster_name)
    }
}

/// Formats an optional authority context for error messages.
struct OptionalContext<'a>(&'a Option<AuthorityContext>);

impl fmt::Display for OptionalContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(ctx) => ctx.fmt(f),
            None => Ok(()),
        }
    }
}

/// Errors produced by key parsing, validation and trust pool construction.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`; downstream match expressions
/// must include a wildcard arm.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthorityError {
    /// Certificate or private key bytes could not be parsed.
    #[error("failed to parse {purpose} {field}: {message}{}", OptionalContext(.authority))]
    Parse {
        /// Which half of the key pair failed.
        field: KeyField,
        /// The signing purpose the key pair belongs to.
        purpose: KeyPurpose,
        /// Owning authority, if known at the failure site.
        authority: Option<AuthorityContext>,
        /// Description of the parse failure.
        message: String,
        /// The underlying parser error.
        #[source]
        source: Option<BoxError>,
    },

    /// A structurally parseable authority violates a policy rule.
    #[error("invalid certificate authority: {reason}")]
    Validation {
        /// Human-readable reason for rejection.
        reason: String,
        /// The underlying error, e.g. the parse failure that caused rejection.
        #[source]
        source: Option<BoxError>,
    },

    /// Encoding or decoding of the persisted representation failed.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
        /// The underlying error that caused serialization to fail.
        #[source]
        source: Option<BoxError>,
    },
}

impl AuthorityError {
    /// Creates a new `Parse` error without authority context.
    #[must_use]
    pub fn parse(field: KeyField, purpose: KeyPurpose, message: impl Into<String>) -> Self {
        Self::Parse { field, purpose, authority: None, message: message.into(), source: None }
    }

    /// Creates a new `Parse` error with a source error.
    #[must_use]
    pub fn parse_with_source(
        field: KeyField,
        purpose: KeyPurpose,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Parse {
            field,
            purpose,
            authority: None,
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Creates a new `Validation` error with the given reason.
    #[must_use]
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation { reason: reason.into(), source: None }
    }

    /// Creates a new `Validation` error caused by another error.
    #[must_use]
    pub fn validation_with_source(reason: impl Into<String>, source: AuthorityError) -> Self {
        Self::Validation { reason: reason.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Serialization` error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into(), source: None }
    }

    /// Creates a new `Serialization` error with a message and source error.
    #[must_use]
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Attaches the owning authority to a `Parse` error.
    ///
    /// Other variants are returned unchanged.
    #[must_use]
    pub fn with_authority(self, cluster_name: &str, ca_type: CertAuthType) -> Self {
        match self {
            Self::Parse { field, purpose, message, source, .. } => Self::Parse {
                field,
                purpose,
                authority: Some(AuthorityContext {
                    cluster_name: cluster_name.to_owned(),
                    ca_type,
                }),
                message,
                source,
            },
            other => other,
        }
    }

    /// Returns `true` for [`AuthorityError::Parse`].
    #[must_use]
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }

    /// Returns `true` for [`AuthorityError::Validation`].
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Returns the validation reason, if this is a `Validation` error.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Validation { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Errors raised when a validation policy is malformed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// A lower bound exceeds its upper bound.
    #[error("{field}: minimum {min} exceeds maximum {max}")]
    InvalidRange {
        /// Name of the offending field.
        field: String,
        /// Configured lower bound.
        min: usize,
        /// Configured upper bound.
        max: usize,
    },
}
