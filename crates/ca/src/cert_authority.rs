//! The certificate authority aggregate.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    equivalence,
    key_pair::KeyPair,
    key_set::KeySet,
    role_map::RoleMap,
    rotation::Rotation,
    types::{CertAuthId, CertAuthType, KeyPurpose, ResourceId},
};

/// A signing authority of one type for one cluster.
///
/// Owns its active and additional key sets. Values are treated as
/// copy-on-write: clone before mutating a value other readers may hold.
///
/// # Example
///
/// ```
/// use trustgate_ca::{CertAuthType, CertAuthority, KeyPair, KeyPurpose};
///
/// let mut ca = CertAuthority::builder()
///     .ca_type(CertAuthType::Host)
///     .cluster_name("root.example.com")
///     .build();
///
/// ca.add_active(KeyPurpose::Tls, KeyPair::public_only(b"cert".to_vec()));
/// ca.add_additional(KeyPurpose::Tls, KeyPair::public_only(b"next".to_vec()));
///
/// assert_eq!(ca.active_count(KeyPurpose::Tls), 1);
/// assert_eq!(ca.all_count(KeyPurpose::Tls), 2);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
pub struct CertAuthority {
    /// Authority type.
    #[serde(rename = "type")]
    pub ca_type: CertAuthType,

    /// Trust domain this authority signs for.
    #[builder(into)]
    pub cluster_name: String,

    /// Keys currently trusted and used for signing.
    #[serde(default)]
    #[builder(default)]
    pub active_keys: KeySet,

    /// Keys staged for rotation.
    #[serde(default)]
    #[builder(default)]
    pub additional_keys: KeySet,

    /// Rotation bookkeeping.
    #[serde(default)]
    #[builder(default)]
    pub rotation: Rotation,

    /// Storage revision. Not part of the authority's identity.
    #[serde(default)]
    #[builder(default)]
    pub resource_id: ResourceId,

    /// Roles granted through this authority.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    #[builder(default)]
    pub roles: BTreeSet<String>,

    /// Mapping of roles from a trusted remote cluster.
    #[serde(default, skip_serializing_if = "RoleMap::is_empty")]
    #[builder(default)]
    pub role_map: RoleMap,
}

impl CertAuthority {
    /// Returns the storage identity of this authority.
    #[must_use]
    pub fn id(&self) -> CertAuthId {
        CertAuthId::new(self.ca_type, self.cluster_name.clone())
    }

    /// Appends an active key pair.
    pub fn add_active(&mut self, purpose: KeyPurpose, key_pair: KeyPair) {
        self.active_keys.push(purpose, key_pair);
    }

    /// Appends an additional (staged) key pair.
    pub fn add_additional(&mut self, purpose: KeyPurpose, key_pair: KeyPair) {
        self.additional_keys.push(purpose, key_pair);
    }

    /// Number of active key pairs for `purpose`.
    #[must_use]
    pub fn active_count(&self, purpose: KeyPurpose) -> usize {
        self.active_keys.len(purpose)
    }

    /// Number of active plus additional key pairs for `purpose`.
    #[must_use]
    pub fn all_count(&self, purpose: KeyPurpose) -> usize {
        self.active_keys.len(purpose) + self.additional_keys.len(purpose)
    }

    /// Active key pairs for `purpose`.
    #[must_use]
    pub fn active_keys_for(&self, purpose: KeyPurpose) -> &[KeyPair] {
        self.active_keys.keys_for(purpose)
    }

    /// Active then additional key pairs for `purpose`.
    pub fn all_keys_for(&self, purpose: KeyPurpose) -> impl Iterator<Item = &KeyPair> {
        self.active_keys.keys_for(purpose).iter().chain(self.additional_keys.keys_for(purpose))
    }

    /// Returns `true` when any active key pair can sign locally.
    #[must_use]
    pub fn has_active_private_keys(&self) -> bool {
        self.active_keys.has_private_keys()
    }

    /// Returns a copy with every private key removed from both key sets.
    #[must_use]
    pub fn without_secrets(&self) -> Self {
        Self {
            active_keys: self.active_keys.without_private_keys(),
            additional_keys: self.additional_keys.without_private_keys(),
            ..self.clone()
        }
    }

    /// Returns `true` when `other` describes the same trust state.
    ///
    /// See [`equivalent`](crate::equivalent).
    #[must_use]
    pub fn is_equivalent(&self, other: &CertAuthority) -> bool {
        equivalence::equivalent(self, other)
    }
}
