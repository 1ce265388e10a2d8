//! Property tests for authority equivalence and the persisted codec.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeSet;

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use proptest::prelude::*;
use trustgate_ca::{
    CertAuthType, CertAuthority, KeyPair, KeyPurpose, PrivateKeyType, ResourceId, Rotation,
    codec, equivalent,
};

fn arb_ca_type() -> impl Strategy<Value = CertAuthType> {
    proptest::sample::select(CertAuthType::ALL.to_vec())
}

fn arb_key_type() -> impl Strategy<Value = PrivateKeyType> {
    prop_oneof![
        Just(PrivateKeyType::Raw),
        Just(PrivateKeyType::Pkcs11),
        Just(PrivateKeyType::GcpKms),
        Just(PrivateKeyType::AwsKms),
    ]
}

fn arb_key_pair() -> impl Strategy<Value = KeyPair> {
    (
        proptest::collection::vec(any::<u8>(), 1..64),
        proptest::collection::vec(any::<u8>(), 0..32),
        arb_key_type(),
    )
        .prop_map(|(cert, private_key, key_type)| {
            KeyPair::builder().cert(cert).private_key(private_key).key_type(key_type).build()
        })
}

fn arb_purpose() -> impl Strategy<Value = KeyPurpose> {
    proptest::sample::select(KeyPurpose::ALL.to_vec())
}

/// A timestamp paired with an arbitrary offset, both representing the same
/// instant.
fn arb_instant() -> impl Strategy<Value = (DateTime<Utc>, DateTime<FixedOffset>)> {
    (0i64..4_000_000_000, -12i32..=14).prop_map(|(secs, hours)| {
        let utc = Utc.timestamp_opt(secs, 0).unwrap();
        let offset = FixedOffset::east_opt(hours * 3600).unwrap();
        (utc, utc.with_timezone(&offset))
    })
}

prop_compose! {
    fn arb_cert_authority()(
        ca_type in arb_ca_type(),
        cluster_name in "[a-z]{1,12}(\\.[a-z]{2,6}){0,2}",
        active in proptest::collection::vec((arb_purpose(), arb_key_pair()), 0..4),
        additional in proptest::collection::vec((arb_purpose(), arb_key_pair()), 0..3),
        roles in proptest::collection::btree_set("[a-z]{1,8}", 0..4),
        resource_id in any::<i64>(),
        last_rotated in proptest::option::of(arb_instant()),
    ) -> CertAuthority {
        let mut ca = CertAuthority::builder()
            .ca_type(ca_type)
            .cluster_name(cluster_name)
            .roles(roles)
            .resource_id(ResourceId(resource_id))
            .build();
        for (purpose, kp) in active {
            ca.add_active(purpose, kp);
        }
        for (purpose, kp) in additional {
            ca.add_additional(purpose, kp);
        }
        if let Some((utc, _)) = last_rotated {
            ca.rotation = Rotation::builder().last_rotated(utc).build();
        }
        ca
    }
}

proptest! {
    /// An authority is equivalent to itself and to any clone.
    #[test]
    fn clone_is_equivalent(ca in arb_cert_authority()) {
        prop_assert!(equivalent(&ca, &ca));
        prop_assert!(equivalent(&ca, &ca.clone()));
    }

    /// Equivalence does not depend on argument order.
    #[test]
    fn equivalence_is_symmetric(a in arb_cert_authority(), b in arb_cert_authority()) {
        prop_assert_eq!(equivalent(&a, &b), equivalent(&b, &a));
    }

    /// Resource IDs never affect equivalence.
    #[test]
    fn resource_id_is_ignored(ca in arb_cert_authority(), other_id in any::<i64>()) {
        let mut copy = ca.clone();
        copy.resource_id = ResourceId(other_id);
        prop_assert!(equivalent(&ca, &copy));
    }

    /// Adding a role the authority does not hold breaks equivalence.
    #[test]
    fn new_role_breaks_equivalence(ca in arb_cert_authority(), role in "[A-Z]{1,8}") {
        let mut copy = ca.clone();
        prop_assume!(copy.roles.insert(role));
        prop_assert!(!equivalent(&ca, &copy));
    }

    /// Marshal then unmarshal yields an equivalent authority.
    #[test]
    fn codec_roundtrip_is_equivalent(ca in arb_cert_authority()) {
        let bytes = codec::marshal(&ca).unwrap();
        let back = codec::unmarshal(&bytes).unwrap();
        prop_assert!(equivalent(&ca, &back));
        prop_assert_eq!(back.resource_id, ca.resource_id);
    }

    /// A timestamp written with any offset decodes to the same instant.
    #[test]
    fn offset_timestamps_are_equivalent(
        ca in arb_cert_authority(),
        (utc, local) in arb_instant(),
    ) {
        let mut ca = ca;
        ca.rotation = Rotation::builder().last_rotated(utc).build();

        // Re-encode the record, swapping the UTC timestamp for the local one.
        let mut value: serde_json::Value =
            serde_json::from_slice(&codec::marshal(&ca).unwrap()).unwrap();
        value["spec"]["rotation"]["last_rotated"] = serde_json::Value::String(local.to_rfc3339());

        let back = codec::unmarshal(&serde_json::to_vec(&value).unwrap()).unwrap();
        prop_assert!(equivalent(&ca, &back));
        prop_assert_eq!(back.rotation.last_rotated, Some(utc));
    }
}

#[test]
fn roles_from_set() {
    let ca = CertAuthority::builder()
        .ca_type(CertAuthType::User)
        .cluster_name("c")
        .roles(BTreeSet::from(["a".to_owned(), "b".to_owned()]))
        .build();
    let mut reordered = ca.clone();
    reordered.roles = BTreeSet::from(["b".to_owned(), "a".to_owned()]);
    assert!(equivalent(&ca, &reordered));
}
