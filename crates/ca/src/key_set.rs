//! Ordered key pair collections, one sequence per signing purpose.

use serde::{Deserialize, Serialize};

use crate::{key_pair::KeyPair, types::KeyPurpose};

/// Key pairs of one authority generation, grouped by signing purpose.
///
/// Each sequence keeps insertion order; the first entry is the primary
/// signer. Duplicates are allowed, which happens while rotation windows
/// overlap.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySet {
    /// OpenSSH signing keys.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ssh: Vec<KeyPair>,
    /// X.509 signing keys.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tls: Vec<KeyPair>,
    /// JWT signing keys.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jwt: Vec<KeyPair>,
}

impl KeySet {
    /// Creates an empty key set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the key pairs for `purpose`.
    #[must_use]
    pub fn keys_for(&self, purpose: KeyPurpose) -> &[KeyPair] {
        match purpose {
            KeyPurpose::Ssh => &self.ssh,
            KeyPurpose::Tls => &self.tls,
            KeyPurpose::Jwt => &self.jwt,
        }
    }

    /// Returns the mutable sequence for `purpose`.
    pub fn keys_for_mut(&mut self, purpose: KeyPurpose) -> &mut Vec<KeyPair> {
        match purpose {
            KeyPurpose::Ssh => &mut self.ssh,
            KeyPurpose::Tls => &mut self.tls,
            KeyPurpose::Jwt => &mut self.jwt,
        }
    }

    /// Appends a key pair for `purpose`.
    pub fn push(&mut self, purpose: KeyPurpose, key_pair: KeyPair) {
        self.keys_for_mut(purpose).push(key_pair);
    }

    /// Returns the number of key pairs for `purpose`.
    #[must_use]
    pub fn len(&self, purpose: KeyPurpose) -> usize {
        self.keys_for(purpose).len()
    }

    /// Returns `true` when no purpose holds any key pair.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ssh.is_empty() && self.tls.is_empty() && self.jwt.is_empty()
    }

    /// Removes every key pair.
    pub fn clear(&mut self) {
        self.ssh.clear();
        self.tls.clear();
        self.jwt.clear();
    }

    /// Iterates over all key pairs with their purpose, SSH first, then TLS,
    /// then JWT.
    pub fn iter(&self) -> impl Iterator<Item = (KeyPurpose, &KeyPair)> {
        KeyPurpose::ALL
            .into_iter()
            .flat_map(move |purpose| self.keys_for(purpose).iter().map(move |kp| (purpose, kp)))
    }

    /// Returns `true` when any key pair carries private key bytes.
    #[must_use]
    pub fn has_private_keys(&self) -> bool {
        self.iter().any(|(_, kp)| kp.has_private_key())
    }

    /// Returns a copy with every private key cleared.
    #[must_use]
    pub fn without_private_keys(&self) -> Self {
        let strip = |keys: &[KeyPair]| keys.iter().map(KeyPair::without_private_key).collect();
        Self { ssh: strip(&self.ssh), tls: strip(&self.tls), jwt: strip(&self.jwt) }
    }
}
