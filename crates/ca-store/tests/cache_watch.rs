//! A cache following a store's event stream.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{sync::Arc, time::Duration};

use trustgate_ca::{CertAuthType, KeyPurpose, testutil};
use trustgate_ca_store::{
    CacheConfig, CertAuthorityCache, CertAuthorityStore, MemoryCertAuthorityStore,
};

/// Polls until `check` holds or a second passes.
async fn eventually(check: impl Fn() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn cache_follows_store_writes() {
    let store = MemoryCertAuthorityStore::new();
    let cache = Arc::new(CertAuthorityCache::default());

    let seeded = testutil::cert_authority(CertAuthType::Database, "seeded");
    store.create_cert_authority(&seeded).await.unwrap();

    let events = store.subscribe();
    assert_eq!(cache.sync(&store).await.unwrap(), 1);

    let watcher = {
        let (cache, store) = (Arc::clone(&cache), store.clone());
        tokio::spawn(async move { cache.watch(&store, events).await })
    };

    let mut second = testutil::cert_authority(CertAuthType::Database, "second");
    store.upsert_cert_authority(&second).await.unwrap();
    eventually(|| cache.len() == 2).await;
    assert_eq!(cache.trust_pool(CertAuthType::Database).unwrap().count(), 2);

    // Re-writing the same authority produces no event, so nothing is applied.
    let applied = cache.metrics_snapshot().applied;
    assert!(!store.upsert_cert_authority(&second).await.unwrap().is_written());

    second.add_active(KeyPurpose::Tls, testutil::tls_key_pair("second-2"));
    store.upsert_cert_authority(&second).await.unwrap();
    eventually(|| cache.metrics_snapshot().applied == applied + 1).await;
    assert_eq!(cache.trust_pool(CertAuthType::Database).unwrap().count(), 3);

    store.delete_cert_authority(&seeded.id()).await.unwrap();
    eventually(|| cache.get(&seeded.id()).is_none()).await;

    watcher.abort();
}

#[tokio::test]
async fn cached_copies_have_no_private_keys_by_default() {
    let store = MemoryCertAuthorityStore::new();
    store
        .create_cert_authority(&testutil::cert_authority(CertAuthType::Host, "root"))
        .await
        .unwrap();

    let public = CertAuthorityCache::default();
    public.sync(&store).await.unwrap();
    assert!(public.list(CertAuthType::Host).iter().all(|ca| !ca.has_active_private_keys()));

    let full = CertAuthorityCache::new(CacheConfig::builder().load_keys(true).build());
    full.sync(&store).await.unwrap();
    assert!(full.list(CertAuthType::Host).iter().all(|ca| ca.has_active_private_keys()));
}

#[tokio::test]
async fn resync_is_suppressed_when_nothing_changed() {
    let store = MemoryCertAuthorityStore::new();
    for cluster in ["a", "b", "c"] {
        store
            .create_cert_authority(&testutil::cert_authority(CertAuthType::User, cluster))
            .await
            .unwrap();
    }

    let cache = CertAuthorityCache::default();
    assert_eq!(cache.sync(&store).await.unwrap(), 3);
    assert_eq!(cache.sync(&store).await.unwrap(), 0);

    let snapshot = cache.metrics_snapshot();
    assert_eq!(snapshot.applied, 3);
    assert_eq!(snapshot.suppressed, 3);
    assert_eq!(snapshot.reconciles, 2);
}

#[tokio::test]
async fn keyed_cache_keeps_private_keys_across_events() {
    let store = MemoryCertAuthorityStore::new();
    let mut ca = testutil::cert_authority(CertAuthType::Database, "root");
    store.create_cert_authority(&ca).await.unwrap();

    let cache = Arc::new(CertAuthorityCache::new(CacheConfig::builder().load_keys(true).build()));
    let events = store.subscribe();
    cache.sync(&store).await.unwrap();
    assert!(cache.get(&ca.id()).unwrap().has_active_private_keys());

    let watcher = {
        let (cache, store) = (Arc::clone(&cache), store.clone());
        tokio::spawn(async move { cache.watch(&store, events).await })
    };

    ca.add_active(KeyPurpose::Tls, testutil::tls_key_pair("root-2"));
    store.upsert_cert_authority(&ca).await.unwrap();
    eventually(|| {
        cache.get(&ca.id()).is_some_and(|cached| cached.active_count(KeyPurpose::Tls) == 2)
    })
    .await;

    let cached = cache.get(&ca.id()).unwrap();
    assert!(cached.active_keys.tls.iter().all(|kp| kp.has_private_key()));
    assert!(trustgate_ca::equivalent(&cached, &ca));

    watcher.abort();
}
