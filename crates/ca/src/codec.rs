//! Persisted representation of a certificate authority.
//!
//! Authorities are stored as JSON wrapped in a versioned envelope:
//!
//! ```json
//! { "kind": "cert_authority", "version": "v2", "spec": { "type": "host", ... } }
//! ```
//!
//! Byte fields are base64 encoded and timestamps are RFC 3339. Any offset
//! is accepted on input and normalized to UTC, so a record written with a
//! local offset decodes to an authority [`equivalent`](crate::equivalent)
//! to the one marshaled.

use serde::{Deserialize, Serialize};

use crate::{
    cert_authority::CertAuthority,
    error::{AuthorityError, AuthorityResult},
    types::ResourceId,
};

/// Envelope `kind` of a certificate authority record.
pub const KIND: &str = "cert_authority";

/// Envelope `version` written by [`marshal`].
pub const VERSION: &str = "v2";

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    kind: &'a str,
    version: &'a str,
    spec: &'a CertAuthority,
}

#[derive(Deserialize)]
struct Envelope {
    kind: String,
    version: String,
    spec: CertAuthority,
}

/// Encodes `ca` for storage.
///
/// # Errors
///
/// Returns [`AuthorityError::Serialization`] if JSON encoding fails.
pub fn marshal(ca: &CertAuthority) -> AuthorityResult<Vec<u8>> {
    serde_json::to_vec(&EnvelopeRef { kind: KIND, version: VERSION, spec: ca })
        .map_err(|e| AuthorityError::serialization_with_source("failed to encode authority", e))
}

/// Decodes a stored authority.
///
/// # Errors
///
/// Returns [`AuthorityError::Serialization`] when the bytes are not a
/// well-formed record or the envelope kind or version is not recognized.
pub fn unmarshal(bytes: &[u8]) -> AuthorityResult<CertAuthority> {
    let envelope: Envelope = serde_json::from_slice(bytes)
        .map_err(|e| AuthorityError::serialization_with_source("failed to decode authority", e))?;
    if envelope.kind != KIND {
        return Err(AuthorityError::serialization(format!(
            "unexpected record kind {:?}, expected {KIND:?}",
            envelope.kind
        )));
    }
    if envelope.version != VERSION {
        return Err(AuthorityError::serialization(format!(
            "unsupported authority version {:?}",
            envelope.version
        )));
    }
    Ok(envelope.spec)
}

/// Decodes a stored authority and stamps it with the revision the storage
/// layer read it at.
///
/// # Errors
///
/// See [`unmarshal`].
pub fn unmarshal_with_resource_id(
    bytes: &[u8],
    resource_id: ResourceId,
) -> AuthorityResult<CertAuthority> {
    let mut ca = unmarshal(bytes)?;
    ca.resource_id = resource_id;
    Ok(ca)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::{FixedOffset, TimeZone, Utc};

    use super::*;
    use crate::{
        rotation::{Rotation, RotationPhase, RotationState},
        testutil,
        types::{CertAuthType, KeyPurpose},
    };

    #[test]
    fn test_roundtrip_preserves_everything() {
        let mut ca = testutil::cert_authority(CertAuthType::Spiffe, "root.example.com");
        ca.resource_id = ResourceId(11);

        let back = unmarshal(&marshal(&ca).unwrap()).unwrap();
        assert_eq!(back, ca);
        assert!(back.is_equivalent(&ca));
        assert!(back.active_keys_for(KeyPurpose::Tls)[0].has_private_key());
    }

    #[test]
    fn test_envelope_shape() {
        let ca = CertAuthority::builder().ca_type(CertAuthType::User).cluster_name("c").build();
        let value: serde_json::Value = serde_json::from_slice(&marshal(&ca).unwrap()).unwrap();
        assert_eq!(value["kind"], KIND);
        assert_eq!(value["version"], VERSION);
        assert_eq!(value["spec"]["type"], "user");
        assert_eq!(value["spec"]["cluster_name"], "c");
    }

    #[test]
    fn test_offset_timestamps_normalize() {
        let offset = FixedOffset::west_opt(8 * 3600).unwrap();
        let started = offset.with_ymd_and_hms(2024, 11, 3, 1, 30, 0).unwrap();

        let mut ca = testutil::cert_authority(CertAuthType::Host, "root");
        ca.rotation = Rotation::builder()
            .state(RotationState::InProgress)
            .phase(RotationPhase::Init)
            .started(started.with_timezone(&Utc))
            .build();

        // Rewrite the stored timestamp with its original offset.
        let encoded = String::from_utf8(marshal(&ca).unwrap()).unwrap();
        let local = encoded.replace("2024-11-03T09:30:00Z", "2024-11-03T01:30:00-08:00");
        assert_ne!(encoded, local);

        let decoded = unmarshal(local.as_bytes()).unwrap();
        assert!(decoded.is_equivalent(&ca));
        assert_eq!(decoded.rotation.started.unwrap().to_rfc3339(), "2024-11-03T09:30:00+00:00");
    }

    #[test]
    fn test_unmarshal_with_resource_id() {
        let ca = testutil::cert_authority(CertAuthType::Database, "root");
        let back = unmarshal_with_resource_id(&marshal(&ca).unwrap(), ResourceId(99)).unwrap();
        assert_eq!(back.resource_id, ResourceId(99));
        assert!(back.is_equivalent(&ca));
    }

    #[test]
    fn test_rejects_unknown_kind_and_version() {
        let ca = CertAuthority::builder().ca_type(CertAuthType::Host).cluster_name("c").build();
        let encoded = String::from_utf8(marshal(&ca).unwrap()).unwrap();

        let wrong_kind = encoded.replace(KIND, "role");
        let err = unmarshal(wrong_kind.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("unexpected record kind"));

        let wrong_version = encoded.replace("\"v2\"", "\"v1\"");
        let err = unmarshal(wrong_version.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("unsupported authority version"));
    }

    #[test]
    fn test_rejects_garbage() {
        let err = unmarshal(b"{not json").unwrap_err();
        assert!(matches!(err, AuthorityError::Serialization { .. }));
    }
}
