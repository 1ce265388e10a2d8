//! Key material and authority fixtures for tests.
//!
//! Every helper generates fresh keys with `rcgen`, so fixtures never share
//! private material. Enable the `testutil` feature to use them from another
//! crate:
//!
//! ```toml
//! [dev-dependencies]
//! trustgate-ca = { path = "../ca", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use trustgate_ca::{CertAuthType, testutil::cert_authority};
//!
//! let ca = cert_authority(CertAuthType::Host, "root.example.com");
//! assert!(trustgate_ca::validate(&ca).is_ok());
//! ```

use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, PKCS_ED25519};

use crate::{
    cert_authority::CertAuthority,
    key_pair::KeyPair,
    policy::KeyRequirements,
    ssh,
    types::{CertAuthType, KeyPurpose},
};

/// Generates a self-signed CA certificate with `CN={common_name}` and its
/// PKCS#8 private key.
///
/// # Panics
///
/// Panics if key generation or self-signing fails.
#[must_use]
pub fn tls_key_pair(common_name: &str) -> KeyPair {
    let key = rcgen::KeyPair::generate().expect("generate TLS key");
    let mut params = CertificateParams::new(Vec::<String>::new()).expect("certificate params");
    params.distinguished_name.push(DnType::CommonName, common_name);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let cert = params.self_signed(&key).expect("self-sign certificate");

    KeyPair::builder().cert(cert.pem().into_bytes()).private_key(key.serialize_pem().into_bytes()).build()
}

/// Generates an Ed25519 SSH key: an authorized-keys public line and a
/// PKCS#8 private key.
///
/// # Panics
///
/// Panics if key generation fails.
#[must_use]
pub fn ssh_key_pair() -> KeyPair {
    let key = rcgen::KeyPair::generate_for(&PKCS_ED25519).expect("generate SSH key");
    let public: &[u8; 32] = key.public_key_raw().try_into().expect("Ed25519 public key is 32 bytes");
    let line = ssh::ed25519_authorized_key(public, Some("trustgate-test"));

    KeyPair::builder().cert(line.into_bytes()).private_key(key.serialize_pem().into_bytes()).build()
}

/// Generates a JWT signing key: a PEM SubjectPublicKeyInfo and its
/// PKCS#8 private key.
///
/// # Panics
///
/// Panics if key generation fails.
#[must_use]
pub fn jwt_key_pair() -> KeyPair {
    let key = rcgen::KeyPair::generate().expect("generate JWT key");
    KeyPair::builder()
        .cert(key.public_key_pem().into_bytes())
        .private_key(key.serialize_pem().into_bytes())
        .build()
}

/// Generates a key pair of the given purpose.
#[must_use]
pub fn key_pair(purpose: KeyPurpose, cluster_name: &str) -> KeyPair {
    match purpose {
        KeyPurpose::Ssh => ssh_key_pair(),
        KeyPurpose::Tls => tls_key_pair(cluster_name),
        KeyPurpose::Jwt => jwt_key_pair(),
    }
}

/// Builds an authority that satisfies the built-in key requirements of
/// `ca_type`, with one freshly generated key per required purpose.
#[must_use]
pub fn cert_authority(ca_type: CertAuthType, cluster_name: &str) -> CertAuthority {
    let mut ca = CertAuthority::builder().ca_type(ca_type).cluster_name(cluster_name).build();
    for (purpose, rule) in KeyRequirements::builtin(ca_type).constrained() {
        for _ in 0..rule.min() {
            ca.add_active(purpose, key_pair(purpose, cluster_name));
        }
    }
    ca
}
