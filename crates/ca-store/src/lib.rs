//! Storage, change events and caching for certificate authorities.
//!
//! This crate is the persistence side of `trustgate-ca`. Stores validate
//! every authority before writing it and use equivalence to skip writes
//! that would not change trust state. A [`CertAuthorityCache`] follows the
//! store's event stream and builds trust pools from its copy.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐   Put / Delete   ┌─────────────────────────┐
//! │   CertAuthorityStore     │─────────────────►│   CertAuthorityCache    │
//! │ validate ─► equivalent?  │   (broadcast)    │ equivalent? ─► replace  │
//! │       ─► marshal ─► map  │                  │        ─► TrustPool     │
//! └──────────────────────────┘                  └─────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use trustgate_ca::{CertAuthType, CertAuthority};
//! use trustgate_ca_store::{CertAuthorityStore, MemoryCertAuthorityStore, StorageError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryCertAuthorityStore::new();
//!
//!     // A host authority needs active SSH and TLS keys; this one has none.
//!     let ca = CertAuthority::builder().ca_type(CertAuthType::Host).cluster_name("root").build();
//!     let err = store.upsert_cert_authority(&ca).await.unwrap_err();
//!     assert!(matches!(err, StorageError::Rejected(_)));
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]

pub mod cache;
pub mod error;
pub mod metrics;
pub mod store;

pub use cache::{CacheConfig, CacheUpdate, CertAuthorityCache};
pub use error::{BoxError, StorageError, StorageResult};
pub use metrics::{CacheMetrics, CacheMetricsSnapshot};
pub use store::{
    CertAuthorityEvent, CertAuthorityStore, DEFAULT_EVENT_CAPACITY, MemoryCertAuthorityStore,
    WriteOutcome,
};
