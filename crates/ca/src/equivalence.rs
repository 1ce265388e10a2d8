//! Semantic comparison of certificate authority snapshots.
//!
//! Storage assigns a fresh [`ResourceId`](crate::ResourceId) on every write,
//! so a read-after-write copy differs from what was written in that field
//! alone. [`equivalent`] compares every other field explicitly and ignores
//! the resource ID, which lets caches and watchers skip updates that do not
//! change the trust state.
//!
//! The comparison allocates nothing. Identity and cheap scalar fields are
//! compared before key material.

use std::ptr;

use crate::{cert_authority::CertAuthority, key_pair::KeyPair, key_set::KeySet, types::KeyPurpose};

/// Returns `true` when `a` and `b` describe the same trust state.
///
/// Compares type, cluster name, roles, role map, rotation and both key
/// sets. [`CertAuthority::resource_id`] is not compared.
///
/// # Example
///
/// ```
/// use trustgate_ca::{CertAuthType, CertAuthority, ResourceId, equivalent};
///
/// let a = CertAuthority::builder()
///     .ca_type(CertAuthType::User)
///     .cluster_name("example.com")
///     .build();
/// let mut b = a.clone();
/// b.resource_id = ResourceId(42);
///
/// assert!(equivalent(&a, &b));
/// ```
#[must_use]
pub fn equivalent(a: &CertAuthority, b: &CertAuthority) -> bool {
    if ptr::eq(a, b) {
        return true;
    }

    // Exhaustive destructuring: adding a field to `CertAuthority` fails to
    // compile here until it is either compared or listed as ignored.
    let CertAuthority {
        ca_type,
        cluster_name,
        active_keys,
        additional_keys,
        rotation,
        resource_id: _,
        roles,
        role_map,
    } = a;

    *ca_type == b.ca_type
        && *cluster_name == b.cluster_name
        && roles.len() == b.roles.len()
        && key_set_shape_eq(active_keys, &b.active_keys)
        && key_set_shape_eq(additional_keys, &b.additional_keys)
        && *roles == b.roles
        && *role_map == b.role_map
        && *rotation == b.rotation
        && key_set_eq(active_keys, &b.active_keys)
        && key_set_eq(additional_keys, &b.additional_keys)
}

/// Compares key counts per purpose.
fn key_set_shape_eq(a: &KeySet, b: &KeySet) -> bool {
    KeyPurpose::ALL.iter().all(|&p| a.len(p) == b.len(p))
}

/// Compares key pairs per purpose, in order.
fn key_set_eq(a: &KeySet, b: &KeySet) -> bool {
    KeyPurpose::ALL.iter().all(|&p| {
        a.keys_for(p).iter().zip(b.keys_for(p)).all(|(x, y)| key_pair_eq(x, y))
    })
}

fn key_pair_eq(a: &KeyPair, b: &KeyPair) -> bool {
    a.key_type == b.key_type
        && a.cert == b.cert
        && a.private_key.as_slice() == b.private_key.as_slice()
}
