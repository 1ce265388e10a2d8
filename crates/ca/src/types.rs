//! Identifiers and enumerations shared across the crate.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::AuthorityError;

/// Storage-assigned, monotonically increasing identifier of a stored
/// authority revision.
///
/// Carries no semantic meaning: two authorities that differ only by
/// resource ID are equivalent.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ResourceId(pub i64);

impl ResourceId {
    /// Returns the identifier following this one.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl From<i64> for ResourceId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<ResourceId> for i64 {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of trust an authority establishes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertAuthType {
    /// Signs host certificates for nodes and services.
    Host,
    /// Signs user certificates.
    User,
    /// Signs database server certificates.
    #[serde(rename = "db")]
    Database,
    /// Signs database client certificates.
    #[serde(rename = "db_client")]
    DatabaseClient,
    /// Signs certificates for agentless OpenSSH nodes.
    #[serde(rename = "openssh")]
    OpenSsh,
    /// Signs JWTs for application access.
    Jwt,
    /// Signs SAML assertions as an identity provider.
    SamlIdp,
    /// Signs OIDC ID tokens as an identity provider.
    OidcIdp,
    /// Issues SPIFFE SVIDs.
    Spiffe,
}

impl CertAuthType {
    /// Every known authority type, in declaration order.
    pub const ALL: [CertAuthType; 9] = [
        Self::Host,
        Self::User,
        Self::Database,
        Self::DatabaseClient,
        Self::OpenSsh,
        Self::Jwt,
        Self::SamlIdp,
        Self::OidcIdp,
        Self::Spiffe,
    ];

    /// Returns the canonical string name of this type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::User => "user",
            Self::Database => "db",
            Self::DatabaseClient => "db_client",
            Self::OpenSsh => "openssh",
            Self::Jwt => "jwt",
            Self::SamlIdp => "saml_idp",
            Self::OidcIdp => "oidc_idp",
            Self::Spiffe => "spiffe",
        }
    }
}

impl fmt::Display for CertAuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertAuthType {
    type Err = AuthorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AuthorityError::validation(format!("unknown authority type {s:?}")))
    }
}

/// The purpose a key pair signs for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPurpose {
    /// OpenSSH certificate signing.
    Ssh,
    /// X.509 certificate signing.
    Tls,
    /// JWT signing.
    Jwt,
}

impl KeyPurpose {
    /// Every purpose, in key set order.
    pub const ALL: [KeyPurpose; 3] = [Self::Ssh, Self::Tls, Self::Jwt];
}

impl fmt::Display for KeyPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ssh => f.write_str("SSH"),
            Self::Tls => f.write_str("TLS"),
            Self::Jwt => f.write_str("JWT"),
        }
    }
}

/// Storage identity of an authority: one authority per type per cluster.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CertAuthId {
    /// Authority type.
    #[serde(rename = "type")]
    pub ca_type: CertAuthType,
    /// Trust domain the authority signs for.
    #[serde(rename = "domain")]
    pub cluster_name: String,
}

impl CertAuthId {
    /// Creates a new identity.
    pub fn new(ca_type: CertAuthType, cluster_name: impl Into<String>) -> Self {
        Self { ca_type, cluster_name: cluster_name.into() }
    }
}

impl fmt::Display for CertAuthId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ca_type, self.cluster_name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_ca_type_string_roundtrip() {
        for ca_type in CertAuthType::ALL {
            let parsed: CertAuthType = ca_type.as_str().parse().expect("known type");
            assert_eq!(parsed, ca_type);
        }
    }

    #[test]
    fn test_ca_type_serde_matches_display() {
        for ca_type in CertAuthType::ALL {
            let json = serde_json::to_string(&ca_type).unwrap();
            assert_eq!(json, format!("\"{ca_type}\""));
        }
    }

    #[test]
    fn test_unknown_ca_type_rejected() {
        let err = "kubernetes".parse::<CertAuthType>().unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_resource_id_next_saturates() {
        assert_eq!(ResourceId(1).next(), ResourceId(2));
        assert_eq!(ResourceId(i64::MAX).next(), ResourceId(i64::MAX));
    }

    #[test]
    fn test_cert_auth_id_display() {
        let id = CertAuthId::new(CertAuthType::SamlIdp, "example.com");
        assert_eq!(id.to_string(), "saml_idp/example.com");
    }
}
