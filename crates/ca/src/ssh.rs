//! OpenSSH public key and private key container parsing.
//!
//! Only the framing is checked here: the algorithm name, the wire-format
//! fields each algorithm requires, and the `openssh-key-v1` private key
//! envelope. No signature operations are performed.

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::{Buf, Bytes};
use thiserror::Error;

/// Magic prefix of the `OPENSSH PRIVATE KEY` container.
const OPENSSH_PRIVATE_KEY_MAGIC: &[u8] = b"openssh-key-v1\0";

/// Suffix shared by all OpenSSH certificate algorithm names.
const CERT_SUFFIX: &str = "-cert-v01@openssh.com";

/// Public key algorithms accepted for CA keys.
const KEY_ALGORITHMS: &[&str] = &[
    "ssh-ed25519",
    "ssh-rsa",
    "ecdsa-sha2-nistp256",
    "ecdsa-sha2-nistp384",
    "ecdsa-sha2-nistp521",
];

/// Errors raised while decoding OpenSSH key material.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SshKeyError {
    /// The input is not valid UTF-8 text.
    #[error("key is not valid UTF-8")]
    NotUtf8,
    /// No key line was found in the input.
    #[error("no key found")]
    Empty,
    /// The algorithm was present but the base64 key data was not.
    #[error("missing key data after algorithm {0:?}")]
    MissingKeyData(String),
    /// The key data is not valid base64.
    #[error("invalid base64 key data: {0}")]
    Base64(String),
    /// A wire-format field ran past the end of the buffer.
    #[error("truncated {0}")]
    Truncated(&'static str),
    /// The textual algorithm differs from the algorithm encoded in the blob.
    #[error("algorithm {declared:?} does not match encoded algorithm {encoded:?}")]
    AlgorithmMismatch {
        /// Algorithm named in the text.
        declared: String,
        /// Algorithm found inside the blob.
        encoded: String,
    },
    /// The algorithm is not one of the accepted key types.
    #[error("unsupported key algorithm {0:?}")]
    UnsupportedAlgorithm(String),
    /// Bytes remain after the last expected field.
    #[error("{0} trailing bytes after key")]
    TrailingData(usize),
    /// The private key container is malformed.
    #[error("invalid openssh private key: {0}")]
    InvalidPrivateKey(&'static str),
}

/// An OpenSSH public key decoded from authorized-keys format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshPublicKey {
    /// Key algorithm, e.g. `ssh-ed25519`.
    pub algorithm: String,
    /// Wire-format key blob.
    pub blob: Bytes,
    /// Trailing comment, if any.
    pub comment: Option<String>,
}

impl SshPublicKey {
    /// Returns `true` when the key is an OpenSSH certificate rather than a
    /// plain public key.
    #[must_use]
    pub fn is_certificate(&self) -> bool {
        self.algorithm.ends_with(CERT_SUFFIX)
    }

    /// Renders the key in authorized-keys format, without the comment.
    #[must_use]
    pub fn to_authorized_key(&self) -> String {
        format!("{} {}", self.algorithm, STANDARD.encode(&self.blob))
    }
}

/// Parses the first key line of authorized-keys formatted input.
///
/// Blank lines and `#` comments are skipped. The line must have the form
/// `<algorithm> <base64 blob> [comment]`.
///
/// # Errors
///
/// Returns [`SshKeyError`] when the text or the wire-format blob is
/// malformed, or the algorithm is not supported.
pub fn parse_authorized_key(input: &[u8]) -> Result<SshPublicKey, SshKeyError> {
    let text = std::str::from_utf8(input).map_err(|_| SshKeyError::NotUtf8)?;
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .ok_or(SshKeyError::Empty)?;

    let mut fields = line.splitn(3, char::is_whitespace);
    let algorithm = fields.next().ok_or(SshKeyError::Empty)?.to_owned();
    let data = fields
        .next()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| SshKeyError::MissingKeyData(algorithm.clone()))?;
    let comment = fields.next().map(str::trim).filter(|c| !c.is_empty()).map(str::to_owned);

    let base = algorithm.strip_suffix(CERT_SUFFIX).unwrap_or(&algorithm);
    if !KEY_ALGORITHMS.contains(&base) {
        return Err(SshKeyError::UnsupportedAlgorithm(algorithm));
    }

    let blob = Bytes::from(STANDARD.decode(data).map_err(|e| SshKeyError::Base64(e.to_string()))?);
    check_blob(&algorithm, blob.clone())?;

    Ok(SshPublicKey { algorithm, blob, comment })
}

/// Checks that `blob` carries the wire fields required by `algorithm`.
fn check_blob(algorithm: &str, mut blob: Bytes) -> Result<(), SshKeyError> {
    let encoded = read_string(&mut blob, "algorithm")?;
    if encoded.as_ref() != algorithm.as_bytes() {
        return Err(SshKeyError::AlgorithmMismatch {
            declared: algorithm.to_owned(),
            encoded: String::from_utf8_lossy(&encoded).into_owned(),
        });
    }

    // Certificates carry a nonce, the key, and signed metadata; the
    // envelope is validated by whoever verifies the signature.
    if algorithm.ends_with(CERT_SUFFIX) {
        read_string(&mut blob, "certificate nonce")?;
        return Ok(());
    }

    match algorithm {
        "ssh-ed25519" => {
            let key = read_string(&mut blob, "ed25519 key")?;
            if key.len() != 32 {
                return Err(SshKeyError::Truncated("ed25519 key"));
            }
        },
        "ssh-rsa" => {
            read_string(&mut blob, "rsa exponent")?;
            read_string(&mut blob, "rsa modulus")?;
        },
        _ => {
            read_string(&mut blob, "ecdsa curve")?;
            read_string(&mut blob, "ecdsa point")?;
        },
    }

    if blob.has_remaining() {
        return Err(SshKeyError::TrailingData(blob.remaining()));
    }
    Ok(())
}

/// Checks the framing of an `openssh-key-v1` private key container.
///
/// `contents` are the PEM-decoded bytes of an `OPENSSH PRIVATE KEY` block.
///
/// # Errors
///
/// Returns [`SshKeyError::InvalidPrivateKey`] or [`SshKeyError::Truncated`]
/// when the container is malformed.
pub fn check_openssh_private_key(contents: &[u8]) -> Result<(), SshKeyError> {
    let rest = contents
        .strip_prefix(OPENSSH_PRIVATE_KEY_MAGIC)
        .ok_or(SshKeyError::InvalidPrivateKey("missing openssh-key-v1 magic"))?;
    let mut buf = Bytes::copy_from_slice(rest);

    read_string(&mut buf, "cipher name")?;
    read_string(&mut buf, "kdf name")?;
    read_string(&mut buf, "kdf options")?;
    if buf.remaining() < 4 {
        return Err(SshKeyError::Truncated("key count"));
    }
    let count = buf.get_u32();
    if count == 0 {
        return Err(SshKeyError::InvalidPrivateKey("container holds no keys"));
    }
    for _ in 0..count {
        read_string(&mut buf, "public key")?;
    }
    let private = read_string(&mut buf, "private key section")?;
    if private.is_empty() {
        return Err(SshKeyError::InvalidPrivateKey("empty private key section"));
    }
    Ok(())
}

/// Reads one length-prefixed SSH `string`.
fn read_string(buf: &mut Bytes, what: &'static str) -> Result<Bytes, SshKeyError> {
    if buf.remaining() < 4 {
        return Err(SshKeyError::Truncated(what));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(SshKeyError::Truncated(what));
    }
    Ok(buf.split_to(len))
}

/// Encodes an SSH `string` field.
pub(crate) fn write_string(out: &mut Vec<u8>, value: &[u8]) {
    out.extend_from_slice(&(value.len() as u32).to_be_bytes());
    out.extend_from_slice(value);
}

/// Renders an Ed25519 public key in authorized-keys format.
#[must_use]
pub fn ed25519_authorized_key(public_key: &[u8; 32], comment: Option<&str>) -> String {
    let mut blob = Vec::with_capacity(51);
    write_string(&mut blob, b"ssh-ed25519");
    write_string(&mut blob, public_key);
    match comment {
        Some(c) => format!("ssh-ed25519 {} {c}", STANDARD.encode(&blob)),
        None => format!("ssh-ed25519 {}", STANDARD.encode(&blob)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn sample_key() -> String {
        ed25519_authorized_key(&[7u8; 32], Some("host-ca@example.com"))
    }

    #[test]
    fn test_parse_ed25519_key() {
        let key = parse_authorized_key(sample_key().as_bytes()).expect("valid key");
        assert_eq!(key.algorithm, "ssh-ed25519");
        assert_eq!(key.comment.as_deref(), Some("host-ca@example.com"));
        assert!(!key.is_certificate());
    }

    #[test]
    fn test_authorized_key_roundtrip_drops_comment() {
        let key = parse_authorized_key(sample_key().as_bytes()).unwrap();
        let again = parse_authorized_key(key.to_authorized_key().as_bytes()).unwrap();
        assert_eq!(again.blob, key.blob);
        assert!(again.comment.is_none());
    }

    #[test]
    fn test_skips_blank_and_comment_lines() {
        let input = format!("\n# trusted host CA\n{}\n", sample_key());
        assert!(parse_authorized_key(input.as_bytes()).is_ok());
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(parse_authorized_key(b"").unwrap_err(), SshKeyError::Empty);
        assert!(matches!(
            parse_authorized_key(b"ssh-ed25519").unwrap_err(),
            SshKeyError::MissingKeyData(_)
        ));
        assert!(matches!(
            parse_authorized_key(b"ssh-ed25519 !!!notbase64").unwrap_err(),
            SshKeyError::Base64(_)
        ));
        assert!(matches!(
            parse_authorized_key(b"ssh-dss AAAA").unwrap_err(),
            SshKeyError::UnsupportedAlgorithm(_)
        ));
    }

    #[test]
    fn test_rejects_algorithm_mismatch() {
        let line = sample_key().replacen("ssh-ed25519", "ssh-rsa", 1);
        assert!(matches!(
            parse_authorized_key(line.as_bytes()).unwrap_err(),
            SshKeyError::AlgorithmMismatch { .. }
        ));
    }

    #[test]
    fn test_rejects_short_ed25519_key() {
        let mut blob = Vec::new();
        write_string(&mut blob, b"ssh-ed25519");
        write_string(&mut blob, &[1u8; 16]);
        let line = format!("ssh-ed25519 {}", STANDARD.encode(&blob));
        assert_eq!(
            parse_authorized_key(line.as_bytes()).unwrap_err(),
            SshKeyError::Truncated("ed25519 key")
        );
    }

    #[test]
    fn test_openssh_private_key_framing() {
        let mut body = OPENSSH_PRIVATE_KEY_MAGIC.to_vec();
        write_string(&mut body, b"none");
        write_string(&mut body, b"none");
        write_string(&mut body, b"");
        body.extend_from_slice(&1u32.to_be_bytes());
        write_string(&mut body, b"public");
        write_string(&mut body, b"private");
        assert!(check_openssh_private_key(&body).is_ok());

        assert!(check_openssh_private_key(b"not a key").is_err());
        assert!(check_openssh_private_key(&body[..body.len() - 3]).is_err());
    }
}
