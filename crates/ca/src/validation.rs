//! Well-formedness checks run before an authority is persisted.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. the cluster name is non-empty,
//! 2. rotation state, phase and schedule agree,
//! 3. the role map compiles,
//! 4. active key counts satisfy the type's [`KeyRequirements`],
//! 5. every active certificate parses,
//! 6. every local active private key parses.
//!
//! All certificates are checked before any private key, so a record with
//! both a bad certificate and a bad key always reports the certificate.
//! Validation is a pure function of the authority and the policy.

use crate::{
    cert_authority::CertAuthority,
    error::{AuthorityError, AuthorityResult},
    key_pair::KeyPair,
    policy::{KeyRequirements, ValidationPolicy},
    types::{CertAuthType, KeyPurpose},
};

/// Reason reported when a certificate does not parse.
pub const UNPARSEABLE_CERTIFICATE: &str = "unparseable certificate";

/// Reason reported when a local private key does not parse.
pub const UNPARSEABLE_PRIVATE_KEY: &str = "unparseable private key";

/// Validates authorities against a [`ValidationPolicy`].
#[derive(Clone, Debug, Default)]
pub struct Validator {
    policy: ValidationPolicy,
}

impl Validator {
    /// Creates a validator applying `policy`.
    #[must_use]
    pub fn new(policy: ValidationPolicy) -> Self {
        Self { policy }
    }

    /// Returns the policy in effect.
    #[must_use]
    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Checks that `ca` is well formed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::Validation`] describing the first failed
    /// check. Parse failures are attached as the error source.
    pub fn validate(&self, ca: &CertAuthority) -> AuthorityResult<()> {
        self.check(ca).inspect_err(|err| {
            tracing::warn!(
                cluster_name = %ca.cluster_name,
                ca_type = %ca.ca_type,
                error = %err,
                "rejected certificate authority"
            );
        })
    }

    fn check(&self, ca: &CertAuthority) -> AuthorityResult<()> {
        if ca.cluster_name.is_empty() {
            return Err(AuthorityError::validation("cluster name is required"));
        }
        ca.rotation.check()?;
        ca.role_map.check()?;

        let requirements = self.policy.requirements(ca.ca_type);
        for (purpose, rule) in requirements.constrained() {
            let count = ca.active_count(purpose);
            if !rule.allows(count) {
                tracing::debug!(%purpose, count, %rule, "key cardinality violated");
                return Err(AuthorityError::validation(cardinality_reason(
                    ca.ca_type,
                    &requirements,
                    purpose,
                )));
            }
        }

        let keys: Vec<(KeyPurpose, &KeyPair)> = if self.policy.verify_additional_keys {
            ca.active_keys.iter().chain(ca.additional_keys.iter()).collect()
        } else {
            ca.active_keys.iter().collect()
        };

        for &(purpose, key_pair) in &keys {
            key_pair.parse_certificate(purpose).map_err(|e| {
                AuthorityError::validation_with_source(
                    UNPARSEABLE_CERTIFICATE,
                    e.with_authority(&ca.cluster_name, ca.ca_type),
                )
            })?;
        }
        for &(purpose, key_pair) in &keys {
            key_pair.parse_private_key(purpose).map_err(|e| {
                AuthorityError::validation_with_source(
                    UNPARSEABLE_PRIVATE_KEY,
                    e.with_authority(&ca.cluster_name, ca.ca_type),
                )
            })?;
        }
        Ok(())
    }
}

/// Validates `ca` with the default policy.
///
/// # Errors
///
/// See [`Validator::validate`].
pub fn validate(ca: &CertAuthority) -> AuthorityResult<()> {
    Validator::default().validate(ca)
}

fn cardinality_reason(
    ca_type: CertAuthType,
    requirements: &KeyRequirements,
    purpose: KeyPurpose,
) -> String {
    let rule = requirements.get(purpose);
    let plural = if rule.max().unwrap_or(rule.min()) == 1 { "" } else { "s" };
    // Name the purpose only when the type constrains more than one.
    if requirements.constrained().count() > 1 {
        format!("{} CA must have {rule} active {purpose} key pair{plural}", label(ca_type))
    } else {
        format!("{} CA must have {rule} active key pair{plural}", label(ca_type))
    }
}

fn label(ca_type: CertAuthType) -> &'static str {
    match ca_type {
        CertAuthType::SamlIdp => "SAML IdP",
        CertAuthType::OidcIdp => "OIDC IdP",
        CertAuthType::Jwt => "JWT",
        CertAuthType::Spiffe => "SPIFFE",
        CertAuthType::OpenSsh => "OpenSSH",
        other => other.as_str(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::error::Error as _;

    use rstest::rstest;

    use super::*;
    use crate::{
        error::KeyField,
        key_pair::PrivateKeyType,
        role_map::{RoleMap, RoleMapping},
        rotation::{Rotation, RotationPhase},
        testutil,
    };

    fn saml_with(keys: Vec<KeyPair>) -> CertAuthority {
        let mut ca = CertAuthority::builder()
            .ca_type(CertAuthType::SamlIdp)
            .cluster_name("idp.example.com")
            .build();
        for kp in keys {
            ca.add_active(KeyPurpose::Tls, kp);
        }
        ca
    }

    fn with_private_key(kp: KeyPair, key: &[u8], key_type: PrivateKeyType) -> KeyPair {
        KeyPair::builder().cert(kp.cert).private_key(key.to_vec()).key_type(key_type).build()
    }

    #[rstest]
    #[case::no_keys(vec![], Some("SAML IdP CA must have exactly one active key pair"))]
    #[case::two_keys(
        vec![testutil::tls_key_pair("a"), testutil::tls_key_pair("b")],
        Some("SAML IdP CA must have exactly one active key pair")
    )]
    #[case::empty_private_key(
        vec![testutil::tls_key_pair("a").without_private_key()],
        None
    )]
    #[case::garbage_raw_private_key(
        vec![with_private_key(testutil::tls_key_pair("a"), b"garbage", PrivateKeyType::Raw)],
        Some(UNPARSEABLE_PRIVATE_KEY)
    )]
    #[case::garbage_certificate(
        vec![KeyPair::builder().cert(b"garbage".to_vec()).build()],
        Some(UNPARSEABLE_CERTIFICATE)
    )]
    #[case::pkcs11_garbage_private_key(
        vec![with_private_key(testutil::tls_key_pair("a"), b"garbage", PrivateKeyType::Pkcs11)],
        None
    )]
    #[case::valid(vec![testutil::tls_key_pair("a")], None)]
    fn test_saml_idp_key_rules(#[case] keys: Vec<KeyPair>, #[case] expected: Option<&str>) {
        let result = validate(&saml_with(keys));
        match expected {
            None => assert!(result.is_ok(), "unexpected error: {result:?}"),
            Some(reason) => assert_eq!(result.unwrap_err().reason(), Some(reason)),
        }
    }

    #[test]
    fn test_relaxed_saml_allows_no_keys() {
        let validator = Validator::new(ValidationPolicy::builder().relaxed_saml_idp(true).build());
        assert!(validator.validate(&saml_with(vec![])).is_ok());
        let err = validator
            .validate(&saml_with(vec![testutil::tls_key_pair("a"), testutil::tls_key_pair("b")]))
            .unwrap_err();
        assert_eq!(err.reason(), Some("SAML IdP CA must have at most one active key pair"));
    }

    #[test]
    fn test_certificate_error_reported_before_private_key_error() {
        let mut ca = saml_with(vec![]);
        ca.ca_type = CertAuthType::Database;
        ca.add_active(
            KeyPurpose::Tls,
            with_private_key(testutil::tls_key_pair("a"), b"garbage", PrivateKeyType::Raw),
        );
        ca.add_active(KeyPurpose::Tls, KeyPair::builder().cert(b"garbage".to_vec()).build());

        let err = validate(&ca).unwrap_err();
        assert_eq!(err.reason(), Some(UNPARSEABLE_CERTIFICATE));
    }

    #[test]
    fn test_parse_error_is_source_with_authority() {
        let ca = saml_with(vec![KeyPair::builder().cert(b"garbage".to_vec()).build()]);
        let err = validate(&ca).unwrap_err();
        let source = err.source().unwrap().to_string();
        assert!(source.starts_with("failed to parse TLS certificate"), "{source}");
        assert!(source.contains("saml_idp"));
        assert!(source.contains("idp.example.com"));

        let direct = ca.active_keys.tls[0]
            .parse_certificate(KeyPurpose::Tls)
            .unwrap_err()
            .with_authority(&ca.cluster_name, ca.ca_type);
        assert!(matches!(direct, AuthorityError::Parse { field: KeyField::Certificate, .. }));
    }

    #[test]
    fn test_empty_cluster_name() {
        let mut ca = testutil::cert_authority(CertAuthType::Host, "c");
        ca.cluster_name.clear();
        assert_eq!(validate(&ca).unwrap_err().reason(), Some("cluster name is required"));
    }

    #[test]
    fn test_host_requires_ssh_and_tls() {
        let mut ca = testutil::cert_authority(CertAuthType::Host, "root");
        assert!(validate(&ca).is_ok());

        ca.active_keys.ssh.clear();
        assert_eq!(
            validate(&ca).unwrap_err().reason(),
            Some("host CA must have at least one active SSH key pair")
        );
    }

    #[test]
    fn test_every_type_fixture_validates() {
        for ca_type in CertAuthType::ALL {
            let ca = testutil::cert_authority(ca_type, "root.example.com");
            assert!(validate(&ca).is_ok(), "{ca_type} fixture should validate");
        }
    }

    #[test]
    fn test_additional_keys_checked_only_when_enabled() {
        let mut ca = testutil::cert_authority(CertAuthType::Database, "root");
        ca.add_additional(KeyPurpose::Tls, KeyPair::builder().cert(b"garbage".to_vec()).build());
        assert!(validate(&ca).is_ok());

        let strict =
            Validator::new(ValidationPolicy::builder().verify_additional_keys(true).build());
        assert_eq!(strict.validate(&ca).unwrap_err().reason(), Some(UNPARSEABLE_CERTIFICATE));
    }

    #[test]
    fn test_rotation_and_role_map_checked() {
        let mut ca = testutil::cert_authority(CertAuthType::User, "root");
        ca.rotation = Rotation::builder().phase(RotationPhase::Init).build();
        assert!(validate(&ca).unwrap_err().reason().unwrap().contains("standby state"));

        let mut ca = testutil::cert_authority(CertAuthType::User, "root");
        ca.role_map = RoleMap(vec![RoleMapping::new("^(open$", ["x"])]);
        assert!(validate(&ca).unwrap_err().reason().unwrap().contains("role map"));
    }

    #[test]
    fn test_validate_is_idempotent() {
        let good = testutil::cert_authority(CertAuthType::Spiffe, "root");
        let bad = saml_with(vec![]);
        for _ in 0..3 {
            assert!(validate(&good).is_ok());
            assert_eq!(
                validate(&bad).unwrap_err().to_string(),
                validate(&bad).unwrap_err().to_string()
            );
        }
    }
}
