//! Certificate authority key sets, equivalence, validation and trust pools.
//!
//! A [`CertAuthority`] holds the signing keys one cluster uses for one kind
//! of trust (host, user, database, identity provider, ...). Each authority
//! carries two [`KeySet`]s: the **active** keys it signs and verifies with,
//! and the **additional** keys staged during rotation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │            Storage, TLS and rotation collaborators           │
//! ├───────────────┬──────────────────┬───────────────────────────┤
//! │  validate()   │  equivalent()    │  TrustPool::build()       │
//! │  (pre-write)  │  (change filter) │  (active TLS certs only)  │
//! ├───────────────┴──────────────────┴───────────────────────────┤
//! │   CertAuthority ─► KeySet (active, additional) ─► KeyPair    │
//! ├──────────────────────────────────────────────────────────────┤
//! │              codec (versioned JSON envelope)                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use trustgate_ca::{CertAuthType, CertAuthority, KeyPair, KeyPurpose, equivalent, validate};
//!
//! let mut ca = CertAuthority::builder()
//!     .ca_type(CertAuthType::SamlIdp)
//!     .cluster_name("idp.example.com")
//!     .build();
//!
//! // A SAML IdP signs with exactly one TLS key pair.
//! let err = validate(&ca).unwrap_err();
//! assert_eq!(err.reason(), Some("SAML IdP CA must have exactly one active key pair"));
//!
//! let copy = ca.clone();
//! assert!(equivalent(&ca, &copy));
//!
//! ca.add_active(KeyPurpose::Tls, KeyPair::public_only(b"-----BEGIN CERTIFICATE-----".to_vec()));
//! assert!(!equivalent(&ca, &copy));
//! ```
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the [`testutil`] module with `rcgen`-backed generators for TLS,
//!   SSH and JWT key material and ready-to-validate authority fixtures.

#![deny(unsafe_code)]

pub mod cert_authority;
pub mod codec;
mod encoding;
pub mod equivalence;
pub mod error;
pub mod key_pair;
pub mod key_set;
pub mod policy;
pub mod role_map;
pub mod rotation;
pub mod ssh;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
pub mod trust_pool;
pub mod types;
pub mod validation;

pub use cert_authority::CertAuthority;
pub use equivalence::equivalent;
pub use error::{AuthorityContext, AuthorityError, AuthorityResult, BoxError, ConfigError, KeyField};
pub use key_pair::{
    JwtPublicKey, KeyMaterial, KeyPair, ParsedCertificate, PrivateKeyFormat, PrivateKeyType,
    TlsCertificate,
};
pub use key_set::KeySet;
pub use policy::{KeyCardinality, KeyRequirements, ValidationPolicy};
pub use role_map::{CompiledRoleMap, RoleMap, RoleMapping};
pub use rotation::{Rotation, RotationMode, RotationPhase, RotationSchedule, RotationState};
pub use trust_pool::TrustPool;
pub use types::{CertAuthId, CertAuthType, KeyPurpose, ResourceId};
pub use validation::{Validator, validate};
pub use zeroize::Zeroizing;
