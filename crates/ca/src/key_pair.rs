//! A single signing identity held by a certificate authority.
//!
//! A [`KeyPair`] carries public material (`cert`), optional private material
//! (`private_key`) and a [`PrivateKeyType`] describing where the private half
//! actually lives. Parsing is purpose-dependent:
//!
//! | Purpose | `cert` | `private_key` |
//! |---------|--------|---------------|
//! | SSH | authorized-keys line | PEM (`OPENSSH`, PKCS#8, PKCS#1, SEC1) |
//! | TLS | X.509 certificate, PEM or DER | PEM (PKCS#8, PKCS#1, SEC1) |
//! | JWT | `PUBLIC KEY`, PEM or DER | PEM (PKCS#8, PKCS#1, SEC1) |

use std::fmt;

use chrono::{DateTime, Utc};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use serde::{Deserialize, Serialize};
use x509_parser::{
    der_parser::der::{DerObject, Tag, parse_der},
    prelude::{FromDer, X509Certificate},
    x509::SubjectPublicKeyInfo,
};
use zeroize::Zeroizing;

use crate::{
    encoding::{base64_bytes, base64_secret},
    error::{AuthorityError, AuthorityResult, KeyField},
    ssh::{self, SshPublicKey},
    types::KeyPurpose,
};

/// PEM tag of an X.509 certificate.
const PEM_CERTIFICATE: &str = "CERTIFICATE";

/// PEM tag of a SubjectPublicKeyInfo.
const PEM_PUBLIC_KEY: &str = "PUBLIC KEY";

/// PEM tag of an OpenSSH private key container.
const PEM_OPENSSH_PRIVATE_KEY: &str = "OPENSSH PRIVATE KEY";

/// Where the private half of a key pair is stored.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrivateKeyType {
    /// Private key bytes are stored in the record.
    #[default]
    Raw,
    /// Private key is held by a PKCS#11 HSM.
    Pkcs11,
    /// Private key is held by Google Cloud KMS.
    GcpKms,
    /// Private key is held by AWS KMS.
    AwsKms,
}

/// How the `private_key` bytes of a key pair are treated.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KeyMaterial {
    /// The bytes are the key itself and must parse when present.
    Local,
    /// The bytes are an opaque handle into an external key store and are
    /// never parsed.
    External,
}

impl PrivateKeyType {
    /// Returns how private key bytes of this type are handled.
    ///
    /// New key stores only need a new arm here.
    #[must_use]
    pub fn material(self) -> KeyMaterial {
        match self {
            Self::Raw => KeyMaterial::Local,
            Self::Pkcs11 | Self::GcpKms | Self::AwsKms => KeyMaterial::External,
        }
    }
}

/// Encoding of a parsed private key.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PrivateKeyFormat {
    /// PKCS#1 RSA private key.
    Pkcs1,
    /// PKCS#8 private key.
    Pkcs8,
    /// SEC1 elliptic curve private key.
    Sec1,
    /// `openssh-key-v1` container.
    OpenSsh,
}

/// A parsed X.509 certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsCertificate {
    /// DER encoding of the certificate.
    pub der: CertificateDer<'static>,
    /// Subject distinguished name.
    pub subject: String,
    /// Issuer distinguished name.
    pub issuer: String,
    /// Start of the validity period.
    pub not_before: Option<DateTime<Utc>>,
    /// End of the validity period.
    pub not_after: Option<DateTime<Utc>>,
    /// Whether the certificate asserts the CA basic constraint.
    pub is_ca: bool,
}

/// A parsed JWT verification key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JwtPublicKey {
    /// Dotted OID of the key algorithm.
    pub algorithm_oid: String,
    /// DER encoding of the SubjectPublicKeyInfo.
    pub spki_der: Vec<u8>,
}

/// Public material of a key pair, parsed according to its purpose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCertificate {
    /// An OpenSSH public key.
    Ssh(SshPublicKey),
    /// An X.509 certificate.
    Tls(TlsCertificate),
    /// A JWT verification key.
    Jwt(JwtPublicKey),
}

/// One signing identity: public material, optional private material and
/// its storage mode.
///
/// `Debug` output never includes private key bytes.
///
/// # Example
///
/// ```
/// use trustgate_ca::{KeyPair, PrivateKeyType};
///
/// let kp = KeyPair::builder()
///     .cert(b"-----BEGIN CERTIFICATE-----".to_vec())
///     .key_type(PrivateKeyType::Pkcs11)
///     .build();
///
/// assert!(!kp.has_private_key());
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
pub struct KeyPair {
    /// Public certificate or public key bytes.
    #[serde(with = "base64_bytes", default)]
    #[builder(into)]
    pub cert: Vec<u8>,

    /// Private key bytes; empty when the key is held externally or the
    /// record is public-only.
    #[serde(with = "base64_secret", default, skip_serializing_if = "base64_secret::is_empty")]
    #[builder(default, into)]
    pub private_key: Zeroizing<Vec<u8>>,

    /// Where the private key lives.
    #[serde(default)]
    #[builder(default)]
    pub key_type: PrivateKeyType,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("cert_len", &self.cert.len())
            .field("has_private_key", &self.has_private_key())
            .field("key_type", &self.key_type)
            .finish()
    }
}

impl KeyPair {
    /// Creates a key pair with no private material.
    pub fn public_only(cert: impl Into<Vec<u8>>) -> Self {
        Self { cert: cert.into(), private_key: Zeroizing::default(), key_type: PrivateKeyType::Raw }
    }

    /// Returns `true` when private key bytes are present.
    #[must_use]
    pub fn has_private_key(&self) -> bool {
        !self.private_key.is_empty()
    }

    /// Returns a copy with private key bytes cleared.
    #[must_use]
    pub fn without_private_key(&self) -> Self {
        Self { cert: self.cert.clone(), private_key: Zeroizing::default(), key_type: self.key_type }
    }

    /// Parses `cert` according to `purpose`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::Parse`] with [`KeyField::Certificate`] when
    /// the bytes are empty or malformed.
    pub fn parse_certificate(&self, purpose: KeyPurpose) -> AuthorityResult<ParsedCertificate> {
        match purpose {
            KeyPurpose::Ssh => ssh::parse_authorized_key(&self.cert)
                .map(ParsedCertificate::Ssh)
                .map_err(|e| cert_error(purpose, "invalid OpenSSH public key", e)),
            KeyPurpose::Tls => self.parse_tls_certificate().map(ParsedCertificate::Tls),
            KeyPurpose::Jwt => parse_jwt_public_key(&self.cert).map(ParsedCertificate::Jwt),
        }
    }

    /// Parses `cert` as a PEM or DER X.509 certificate.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::Parse`] when the PEM framing or the DER
    /// body is malformed.
    pub fn parse_tls_certificate(&self) -> AuthorityResult<TlsCertificate> {
        let der = decode_pem_or_der(&self.cert, PEM_CERTIFICATE, KeyPurpose::Tls)?;
        let (_, cert) = X509Certificate::from_der(&der)
            .map_err(|e| cert_error(KeyPurpose::Tls, "invalid X.509 certificate", e))?;

        let validity = cert.validity();
        let parsed = TlsCertificate {
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            not_before: DateTime::from_timestamp(validity.not_before.timestamp(), 0),
            not_after: DateTime::from_timestamp(validity.not_after.timestamp(), 0),
            is_ca: cert.is_ca(),
            der: CertificateDer::from(der.clone()),
        };
        Ok(parsed)
    }

    /// Parses `private_key`.
    ///
    /// Returns `Ok(None)` without inspecting the bytes when they are empty
    /// or when [`PrivateKeyType::material`] says the key is held
    /// externally.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::Parse`] with [`KeyField::PrivateKey`] when
    /// local key bytes are present but cannot be parsed.
    pub fn parse_private_key(
        &self,
        purpose: KeyPurpose,
    ) -> AuthorityResult<Option<PrivateKeyFormat>> {
        if self.private_key.is_empty() || self.key_type.material() == KeyMaterial::External {
            return Ok(None);
        }

        if purpose == KeyPurpose::Ssh {
            if let Ok(block) = pem::parse(self.private_key.as_slice()) {
                if block.tag() == PEM_OPENSSH_PRIVATE_KEY {
                    ssh::check_openssh_private_key(block.contents()).map_err(|e| {
                        AuthorityError::parse_with_source(
                            KeyField::PrivateKey,
                            purpose,
                            "invalid OpenSSH private key",
                            e,
                        )
                    })?;
                    return Ok(Some(PrivateKeyFormat::OpenSsh));
                }
            }
        }

        parse_der_private_key(self.private_key.as_slice(), purpose).map(Some)
    }
}

/// Parses a PEM private key and checks its ASN.1 structure.
///
/// Only the encoding is checked. Whether a signer exists for the key
/// algorithm is left to whoever signs with it.
fn parse_der_private_key(pem_bytes: &[u8], purpose: KeyPurpose) -> AuthorityResult<PrivateKeyFormat> {
    let mut reader = pem_bytes;
    let key = rustls_pemfile::private_key(&mut reader)
        .map_err(|e| {
            AuthorityError::parse_with_source(
                KeyField::PrivateKey,
                purpose,
                "malformed PEM private key",
                e,
            )
        })?
        .ok_or_else(|| {
            AuthorityError::parse(KeyField::PrivateKey, purpose, "no PEM private key found")
        })?;

    let encoding = match key {
        PrivateKeyDer::Pkcs1(_) => PrivateKeyFormat::Pkcs1,
        PrivateKeyDer::Sec1(_) => PrivateKeyFormat::Sec1,
        PrivateKeyDer::Pkcs8(_) => PrivateKeyFormat::Pkcs8,
        _ => {
            return Err(AuthorityError::parse(
                KeyField::PrivateKey,
                purpose,
                "unsupported private key encoding",
            ));
        },
    };
    check_private_key_der(key.secret_der(), encoding).map_err(|reason| {
        AuthorityError::parse(
            KeyField::PrivateKey,
            purpose,
            format!("invalid {encoding:?} private key: {reason}"),
        )
    })?;
    Ok(encoding)
}

/// Checks the top-level fields of a DER private key.
///
/// - PKCS#1: `SEQUENCE { version, n, e, d, p, q, dp, dq, qinv, .. }`
/// - SEC1: `SEQUENCE { 1, OCTET STRING key, [0] params?, [1] public? }`
/// - PKCS#8: `SEQUENCE { version, AlgorithmIdentifier, OCTET STRING key, .. }`
fn check_private_key_der(der: &[u8], format: PrivateKeyFormat) -> Result<(), &'static str> {
    let (rest, key) = parse_der(der).map_err(|_| "malformed DER")?;
    if !rest.is_empty() {
        return Err("trailing bytes after key");
    }
    let fields = key.as_sequence().map_err(|_| "not a SEQUENCE")?;
    let Some((version, fields)) = fields.split_first() else {
        return Err("missing version");
    };
    let version = version.as_u32().map_err(|_| "version is not an INTEGER")?;

    match format {
        PrivateKeyFormat::Pkcs1 => {
            if version > 1 {
                return Err("unknown version");
            }
            if fields.len() < 8 || fields[..8].iter().any(|f| f.header.tag() != Tag::Integer) {
                return Err("missing RSA parameters");
            }
        },
        PrivateKeyFormat::Sec1 => {
            if version != 1 {
                return Err("unknown version");
            }
            fields.first().filter(|f| is_key_octets(f)).ok_or("missing key octets")?;
        },
        PrivateKeyFormat::Pkcs8 => {
            if version > 1 {
                return Err("unknown version");
            }
            let [algorithm, octets, ..] = fields else {
                return Err("missing algorithm or key octets");
            };
            algorithm
                .as_sequence()
                .ok()
                .and_then(|a| a.first())
                .and_then(|oid| oid.as_oid().ok())
                .ok_or("missing algorithm identifier")?;
            if !is_key_octets(octets) {
                return Err("missing key octets");
            }
        },
        PrivateKeyFormat::OpenSsh => return Err("not a DER encoding"),
    }
    Ok(())
}

/// Returns `true` for a non-empty OCTET STRING.
fn is_key_octets(field: &DerObject<'_>) -> bool {
    field.header.tag() == Tag::OctetString && field.as_slice().is_ok_and(|b| !b.is_empty())
}

/// Parses a PEM or DER SubjectPublicKeyInfo.
fn parse_jwt_public_key(bytes: &[u8]) -> AuthorityResult<JwtPublicKey> {
    let der = decode_pem_or_der(bytes, PEM_PUBLIC_KEY, KeyPurpose::Jwt)?;
    let (_, spki) = SubjectPublicKeyInfo::from_der(&der)
        .map_err(|e| cert_error(KeyPurpose::Jwt, "invalid public key", e))?;
    Ok(JwtPublicKey { algorithm_oid: spki.algorithm.algorithm.to_id_string(), spki_der: der.clone() })
}

/// Tag byte of a DER `SEQUENCE`, the outer type of certificates and SPKIs.
const DER_SEQUENCE: u8 = 0x30;

/// Returns the DER body of `bytes`.
///
/// Input that starts with a DER `SEQUENCE` is taken as-is; anything else
/// must be PEM whose first block carries `tag`.
fn decode_pem_or_der(bytes: &[u8], tag: &str, purpose: KeyPurpose) -> AuthorityResult<Vec<u8>> {
    match bytes.first() {
        None => return Err(AuthorityError::parse(KeyField::Certificate, purpose, "empty")),
        Some(&DER_SEQUENCE) => return Ok(bytes.to_vec()),
        Some(_) => {},
    }
    let block = pem::parse(bytes).map_err(|e| cert_error(purpose, "malformed PEM", e))?;
    if block.tag() != tag {
        return Err(AuthorityError::parse(
            KeyField::Certificate,
            purpose,
            format!("expected PEM block {tag:?}, found {:?}", block.tag()),
        ));
    }
    Ok(block.into_contents())
}

fn cert_error(
    purpose: KeyPurpose,
    message: &str,
    source: impl std::error::Error + Send + Sync + 'static,
) -> AuthorityError {
    AuthorityError::parse_with_source(KeyField::Certificate, purpose, message, source)
}
