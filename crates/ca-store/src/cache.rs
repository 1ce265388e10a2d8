//! Read-side cache of certificate authorities fed by store events.
//!
//! The cache keeps the last known copy of every authority and builds trust
//! pools from it. Updates [`equivalent`](trustgate_ca::equivalent) to the
//! cached copy are dropped, so a store that rewrites an unchanged authority
//! (or a reconcile that re-reads the same state) never invalidates pools
//! downstream.
//!
//! # Wiring
//!
//! Subscribe before the initial sync so no write falls between the two:
//!
//! ```
//! use std::sync::Arc;
//!
//! use trustgate_ca_store::{CertAuthorityCache, CertAuthorityStore, MemoryCertAuthorityStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryCertAuthorityStore::new();
//!     let cache = Arc::new(CertAuthorityCache::default());
//!
//!     let events = store.subscribe();
//!     cache.sync(&store).await?;
//!
//!     let watcher = {
//!         let (cache, store) = (Arc::clone(&cache), store.clone());
//!         tokio::spawn(async move { cache.watch(&store, events).await })
//!     };
//!
//!     assert!(cache.is_empty());
//!     watcher.abort();
//!     Ok(())
//! }
//! ```

use std::{collections::BTreeMap, sync::Arc};

use parking_lot::RwLock;
use tokio::sync::broadcast::{self, error::RecvError};
use trustgate_ca::{
    AuthorityResult, CertAuthId, CertAuthType, CertAuthority, TrustPool, equivalent,
};

use crate::{
    error::StorageResult,
    metrics::{CacheMetrics, CacheMetricsSnapshot},
    store::{CertAuthorityEvent, CertAuthorityStore},
};

/// Cache behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, bon::Builder)]
pub struct CacheConfig {
    /// Drop updates equivalent to the cached copy.
    #[builder(default = true)]
    pub suppress_equivalent: bool,

    /// Hold private keys. Syncs list with keys, and events (which never
    /// carry keys) are followed by a keyed read from the store.
    #[builder(default)]
    pub load_keys: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// What an update did to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheUpdate {
    /// The authority was added or replaced.
    Applied,
    /// The update matched the cached copy and was dropped.
    Suppressed,
    /// The authority was removed.
    Removed,
    /// A delete named an authority the cache did not hold.
    Missing,
}

/// Equivalence-aware copy of stored authorities.
#[derive(Debug, Default)]
pub struct CertAuthorityCache {
    config: CacheConfig,
    entries: RwLock<BTreeMap<CertAuthId, Arc<CertAuthority>>>,
    metrics: CacheMetrics,
}

impl CertAuthorityCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self { config, entries: RwLock::default(), metrics: CacheMetrics::new() }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Stores `ca` unless the cached copy is equivalent.
    pub fn put(&self, ca: CertAuthority) -> CacheUpdate {
        let id = ca.id();
        let mut entries = self.entries.write();
        if self.config.suppress_equivalent {
            if let Some(cached) = entries.get(&id) {
                if equivalent(cached, &ca) {
                    self.metrics.record_suppressed();
                    tracing::trace!(%id, "suppressed equivalent update");
                    return CacheUpdate::Suppressed;
                }
            }
        }
        entries.insert(id.clone(), Arc::new(ca));
        self.metrics.record_applied();
        tracing::debug!(%id, "cached certificate authority");
        CacheUpdate::Applied
    }

    /// Removes the cached copy of `id`.
    pub fn remove(&self, id: &CertAuthId) -> CacheUpdate {
        if self.entries.write().remove(id).is_none() {
            return CacheUpdate::Missing;
        }
        self.metrics.record_deleted();
        tracing::debug!(%id, "evicted certificate authority");
        CacheUpdate::Removed
    }

    /// Applies one store event as delivered.
    ///
    /// Put events carry no private keys. A cache with
    /// [`CacheConfig::load_keys`] set should use
    /// [`apply_from`](Self::apply_from) instead.
    pub fn apply(&self, event: CertAuthorityEvent) -> CacheUpdate {
        match event {
            CertAuthorityEvent::Put(ca) => self.put(ca),
            CertAuthorityEvent::Delete(id) => self.remove(&id),
        }
    }

    /// Applies one store event, re-reading the authority with its private
    /// keys when [`CacheConfig::load_keys`] is set.
    ///
    /// An authority deleted before the re-read is evicted.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the re-read fails.
    pub async fn apply_from<S>(
        &self,
        store: &S,
        event: CertAuthorityEvent,
    ) -> StorageResult<CacheUpdate>
    where
        S: CertAuthorityStore + ?Sized,
    {
        let id = match event {
            CertAuthorityEvent::Put(ca) if self.config.load_keys => ca.id(),
            event => return Ok(self.apply(event)),
        };
        match store.get_cert_authority(&id, true).await {
            Ok(keyed) => Ok(self.put(keyed)),
            Err(err) if err.is_not_found() => Ok(self.remove(&id)),
            Err(err) => Err(err),
        }
    }

    /// Replaces the cached view with `snapshot`.
    ///
    /// Authorities absent from the snapshot are removed; equivalent ones
    /// keep their cached copy. Returns the number of entries that changed.
    pub fn reconcile(&self, snapshot: Vec<CertAuthority>) -> usize {
        let fresh: BTreeMap<CertAuthId, CertAuthority> =
            snapshot.into_iter().map(|ca| (ca.id(), ca)).collect();

        let stale: Vec<CertAuthId> =
            self.entries.read().keys().filter(|id| !fresh.contains_key(*id)).cloned().collect();

        let mut changed = 0;
        for id in &stale {
            if self.remove(id) == CacheUpdate::Removed {
                changed += 1;
            }
        }
        for ca in fresh.into_values() {
            if self.put(ca) == CacheUpdate::Applied {
                changed += 1;
            }
        }

        self.metrics.record_reconcile();
        tracing::debug!(changed, removed = stale.len(), "reconciled authority cache");
        changed
    }

    /// Reloads every authority from `store`.
    ///
    /// # Errors
    ///
    /// Returns the store's error; the cache is left unchanged.
    pub async fn sync<S>(&self, store: &S) -> StorageResult<usize>
    where
        S: CertAuthorityStore + ?Sized,
    {
        let snapshot = store.list_all_cert_authorities(self.config.load_keys).await?;
        Ok(self.reconcile(snapshot))
    }

    /// Applies events until the channel closes.
    ///
    /// Each event goes through [`apply_from`](Self::apply_from). When the
    /// receiver lags behind and events are lost, the cache re-syncs from
    /// `store` and continues.
    ///
    /// # Errors
    ///
    /// Returns the store's error if a re-read or re-sync fails.
    pub async fn watch<S>(
        &self,
        store: &S,
        mut events: broadcast::Receiver<CertAuthorityEvent>,
    ) -> StorageResult<()>
    where
        S: CertAuthorityStore + ?Sized,
    {
        loop {
            match events.recv().await {
                Ok(event) => {
                    self.apply_from(store, event).await?;
                },
                Err(RecvError::Lagged(missed)) => {
                    self.metrics.record_lagged();
                    tracing::warn!(missed, "authority event stream lagged, re-syncing");
                    self.sync(store).await?;
                },
                Err(RecvError::Closed) => return Ok(()),
            }
        }
    }

    /// Returns the cached copy of `id`.
    #[must_use]
    pub fn get(&self, id: &CertAuthId) -> Option<Arc<CertAuthority>> {
        self.entries.read().get(id).cloned()
    }

    /// Returns the cached authorities of `ca_type`, ordered by cluster name.
    #[must_use]
    pub fn list(&self, ca_type: CertAuthType) -> Vec<Arc<CertAuthority>> {
        self.entries.read().values().filter(|ca| ca.ca_type == ca_type).cloned().collect()
    }

    /// Builds a trust pool from the cached authorities of `ca_type`.
    ///
    /// # Errors
    ///
    /// See [`TrustPool::build`].
    pub fn trust_pool(&self, ca_type: CertAuthType) -> AuthorityResult<TrustPool> {
        let authorities = self.list(ca_type);
        let pool = TrustPool::build(authorities.iter().map(|ca| &**ca))?;
        self.metrics.record_pool_built();
        Ok(pool)
    }

    /// Number of cached authorities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Live counters.
    #[must_use]
    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Current counter values.
    #[must_use]
    pub fn metrics_snapshot(&self) -> CacheMetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use trustgate_ca::{KeyPurpose, ResourceId, testutil};

    use super::*;

    fn db(cluster: &str) -> CertAuthority {
        testutil::cert_authority(CertAuthType::Database, cluster)
    }

    #[test]
    fn test_put_suppresses_equivalent() {
        let cache = CertAuthorityCache::default();
        let ca = db("root");
        assert_eq!(cache.put(ca.clone()), CacheUpdate::Applied);

        let mut reread = ca.clone();
        reread.resource_id = ResourceId(77);
        assert_eq!(cache.put(reread), CacheUpdate::Suppressed);
        assert_eq!(cache.get(&ca.id()).unwrap().resource_id, ca.resource_id);

        let mut changed = ca;
        changed.roles.insert("db-admin".to_owned());
        assert_eq!(cache.put(changed), CacheUpdate::Applied);

        let snapshot = cache.metrics_snapshot();
        assert_eq!((snapshot.applied, snapshot.suppressed), (2, 1));
    }

    #[test]
    fn test_suppression_can_be_disabled() {
        let cache = CertAuthorityCache::new(CacheConfig::builder().suppress_equivalent(false).build());
        let ca = db("root");
        cache.put(ca.clone());
        assert_eq!(cache.put(ca), CacheUpdate::Applied);
    }

    #[test]
    fn test_apply_delete() {
        let cache = CertAuthorityCache::default();
        let ca = db("root");
        cache.apply(CertAuthorityEvent::Put(ca.clone()));
        assert_eq!(cache.apply(CertAuthorityEvent::Delete(ca.id())), CacheUpdate::Removed);
        assert_eq!(cache.apply(CertAuthorityEvent::Delete(ca.id())), CacheUpdate::Missing);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_apply_from_rereads_keys() {
        use crate::store::{CertAuthorityStore, MemoryCertAuthorityStore};

        let store = MemoryCertAuthorityStore::new();
        let ca = db("root");
        store.create_cert_authority(&ca).await.unwrap();
        let event = CertAuthorityEvent::Put(ca.without_secrets());

        let public = CertAuthorityCache::default();
        public.apply_from(&store, event.clone()).await.unwrap();
        assert!(!public.get(&ca.id()).unwrap().has_active_private_keys());

        let keyed = CertAuthorityCache::new(CacheConfig::builder().load_keys(true).build());
        assert_eq!(keyed.apply_from(&store, event.clone()).await.unwrap(), CacheUpdate::Applied);
        assert!(keyed.get(&ca.id()).unwrap().has_active_private_keys());
        assert!(equivalent(&keyed.get(&ca.id()).unwrap(), &ca));

        // Deleted before the re-read: the entry goes away.
        store.delete_cert_authority(&ca.id()).await.unwrap();
        assert_eq!(keyed.apply_from(&store, event).await.unwrap(), CacheUpdate::Removed);
        assert!(keyed.is_empty());
    }

    #[test]
    fn test_reconcile_adds_removes_and_keeps() {
        let cache = CertAuthorityCache::default();
        let keep = db("keep");
        let gone = db("gone");
        cache.put(keep.clone());
        cache.put(gone.clone());

        let added = db("added");
        let changed = cache.reconcile(vec![keep.clone(), added.clone()]);

        assert_eq!(changed, 2);
        assert!(cache.get(&gone.id()).is_none());
        assert!(cache.get(&added.id()).is_some());
        assert_eq!(cache.metrics_snapshot().suppressed, 1);
    }

    #[test]
    fn test_trust_pool_per_type() {
        let cache = CertAuthorityCache::default();
        cache.put(db("a"));
        let mut b = db("b");
        b.add_active(KeyPurpose::Tls, testutil::tls_key_pair("b-2"));
        cache.put(b);
        cache.put(testutil::cert_authority(CertAuthType::Jwt, "a"));

        assert_eq!(cache.trust_pool(CertAuthType::Database).unwrap().count(), 3);
        assert_eq!(cache.trust_pool(CertAuthType::Jwt).unwrap().count(), 0);
        assert_eq!(cache.trust_pool(CertAuthType::Host).unwrap().count(), 0);
        assert_eq!(cache.metrics_snapshot().pools_built, 3);
    }
}
