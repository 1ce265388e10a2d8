//! Verification pools built from active TLS certificates.

use std::fmt;

use rustls::RootCertStore;

use crate::{
    cert_authority::CertAuthority,
    error::{AuthorityError, AuthorityResult, KeyField},
    types::KeyPurpose,
};

/// Trust anchors collected from a set of authorities.
///
/// Only **active** TLS certificates are included. Additional keys staged
/// for rotation are never trusted through a pool.
#[derive(Clone)]
pub struct TrustPool {
    roots: RootCertStore,
    count: usize,
}

impl fmt::Debug for TrustPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustPool").field("count", &self.count).finish()
    }
}

impl TrustPool {
    /// Builds a pool from the active TLS certificates of `authorities`, in
    /// traversal order.
    ///
    /// An empty input produces an empty pool.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::Parse`] naming the owning authority when
    /// any active TLS certificate fails to parse. No pool is returned in
    /// that case.
    pub fn build<'a>(
        authorities: impl IntoIterator<Item = &'a CertAuthority>,
    ) -> AuthorityResult<Self> {
        let mut roots = RootCertStore::empty();
        let mut count = 0;

        for ca in authorities {
            for key_pair in ca.active_keys_for(KeyPurpose::Tls) {
                let with_ca = |e: AuthorityError| e.with_authority(&ca.cluster_name, ca.ca_type);
                let cert = key_pair.parse_tls_certificate().map_err(with_ca)?;
                roots.add(cert.der).map_err(|e| {
                    with_ca(AuthorityError::parse_with_source(
                        KeyField::Certificate,
                        KeyPurpose::Tls,
                        "certificate is not a usable trust anchor",
                        e,
                    ))
                })?;
                count += 1;
            }
            tracing::trace!(
                cluster_name = %ca.cluster_name,
                ca_type = %ca.ca_type,
                count,
                "added authority to trust pool"
            );
        }

        tracing::debug!(count, "built trust pool");
        Ok(Self { roots, count })
    }

    /// Number of certificates added.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Returns `true` when the pool holds no certificates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Borrows the underlying root store.
    #[must_use]
    pub fn roots(&self) -> &RootCertStore {
        &self.roots
    }

    /// Consumes the pool, returning the root store for a TLS config.
    #[must_use]
    pub fn into_roots(self) -> RootCertStore {
        self.roots
    }
}
