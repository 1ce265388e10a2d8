//! Storage trait and in-memory implementation for certificate authorities.
//!
//! Every write validates the authority first and assigns a fresh
//! [`ResourceId`]. Writes that would store an authority
//! [`equivalent`](trustgate_ca::equivalent) to the current one are skipped,
//! so watchers only hear about real changes.
//!
//! # Write Paths
//!
//! ```text
//!                 ┌────────────┐  invalid   ┌──────────────┐
//!   authority ───►│  validate  │───────────►│   Rejected   │
//!                 └─────┬──────┘            └──────────────┘
//!                       │ ok
//!                 ┌─────▼──────┐ equivalent ┌──────────────┐
//!                 │  compare   │───────────►│  Unchanged   │
//!                 └─────┬──────┘            └──────────────┘
//!                       │ differs
//!                 ┌─────▼──────┐            ┌──────────────┐
//!                 │   write    │───────────►│  Put event   │
//!                 └────────────┘            └──────────────┘
//! ```

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use trustgate_ca::{
    CertAuthId, CertAuthType, CertAuthority, ResourceId, ValidationPolicy, Validator, codec,
    equivalent,
};

use crate::error::{StorageError, StorageResult};

/// Default capacity of the change event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// A change to a stored authority.
///
/// Put events carry the authority without private keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertAuthorityEvent {
    /// The authority was created or changed.
    Put(CertAuthority),
    /// The authority was deleted.
    Delete(CertAuthId),
}

impl CertAuthorityEvent {
    /// Identity of the authority the event is about.
    #[must_use]
    pub fn id(&self) -> CertAuthId {
        match self {
            Self::Put(ca) => ca.id(),
            Self::Delete(id) => id.clone(),
        }
    }
}

/// Result of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The authority was stored under a new resource ID.
    Written(ResourceId),
    /// The stored authority was already equivalent; nothing was written.
    Unchanged(ResourceId),
}

impl WriteOutcome {
    /// Resource ID of the authority now stored.
    #[must_use]
    pub fn resource_id(&self) -> ResourceId {
        match self {
            Self::Written(id) | Self::Unchanged(id) => *id,
        }
    }

    /// Returns `true` when a write happened.
    #[must_use]
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written(_))
    }
}

/// Persistence layer for certificate authorities.
///
/// One authority is stored per [`CertAuthId`]. Implementations must
/// validate every authority before writing it and must report writes
/// through [`subscribe`](Self::subscribe).
#[async_trait]
pub trait CertAuthorityStore: Send + Sync {
    /// Stores a new authority.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Rejected`] if validation fails or
    /// [`StorageError::AlreadyExists`] if the identity is taken.
    async fn create_cert_authority(&self, ca: &CertAuthority) -> StorageResult<ResourceId>;

    /// Stores an authority, replacing any existing one.
    ///
    /// Returns [`WriteOutcome::Unchanged`] without writing or emitting an
    /// event when the stored authority is equivalent to `ca`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Rejected`] if validation fails.
    async fn upsert_cert_authority(&self, ca: &CertAuthority) -> StorageResult<WriteOutcome>;

    /// Replaces the stored authority with `new` only if it is still
    /// equivalent to `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Rejected`] if `new` fails validation or names
    /// a different identity than `expected`, [`StorageError::NotFound`] if
    /// nothing is stored, or [`StorageError::Conflict`] if the stored
    /// authority has changed.
    async fn compare_and_swap_cert_authority(
        &self,
        new: &CertAuthority,
        expected: &CertAuthority,
    ) -> StorageResult<ResourceId>;

    /// Reads one authority. Private keys are stripped unless `load_keys`
    /// is set.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if nothing is stored under `id`.
    async fn get_cert_authority(
        &self,
        id: &CertAuthId,
        load_keys: bool,
    ) -> StorageResult<CertAuthority>;

    /// Lists all authorities of one type, ordered by cluster name.
    async fn list_cert_authorities(
        &self,
        ca_type: CertAuthType,
        load_keys: bool,
    ) -> StorageResult<Vec<CertAuthority>>;

    /// Deletes one authority.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if nothing is stored under `id`.
    async fn delete_cert_authority(&self, id: &CertAuthId) -> StorageResult<()>;

    /// Subscribes to changes written after this call.
    fn subscribe(&self) -> broadcast::Receiver<CertAuthorityEvent>;

    /// Lists authorities of every type.
    ///
    /// The default implementation calls
    /// [`list_cert_authorities`](Self::list_cert_authorities) once per type.
    async fn list_all_cert_authorities(&self, load_keys: bool) -> StorageResult<Vec<CertAuthority>> {
        let mut all = Vec::new();
        for ca_type in CertAuthType::ALL {
            all.extend(self.list_cert_authorities(ca_type, load_keys).await?);
        }
        Ok(all)
    }
}

#[derive(Debug)]
struct Record {
    resource_id: ResourceId,
    bytes: Vec<u8>,
}

impl Record {
    fn decode(&self, load_keys: bool) -> StorageResult<CertAuthority> {
        let ca = codec::unmarshal_with_resource_id(&self.bytes, self.resource_id)?;
        Ok(if load_keys { ca } else { ca.without_secrets() })
    }
}

#[derive(Debug, Default)]
struct State {
    records: BTreeMap<CertAuthId, Record>,
    last_resource_id: ResourceId,
}

impl State {
    /// Encodes `ca` under the next resource ID.
    fn encode(&mut self, ca: &CertAuthority) -> StorageResult<Record> {
        let resource_id = self.last_resource_id.next();
        let mut stamped = ca.clone();
        stamped.resource_id = resource_id;
        let bytes = codec::marshal(&stamped)?;
        self.last_resource_id = resource_id;
        Ok(Record { resource_id, bytes })
    }
}

/// In-memory implementation of [`CertAuthorityStore`].
///
/// Authorities are kept in their marshaled form, so every read goes
/// through the codec the way a persistent backend would. Clones share the
/// same state.
///
/// # Examples
///
/// ```
/// use trustgate_ca::{CertAuthId, CertAuthType, CertAuthority};
/// use trustgate_ca_store::{CertAuthorityStore, MemoryCertAuthorityStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryCertAuthorityStore::new();
///     let id = CertAuthId::new(CertAuthType::Host, "root");
///
///     let missing = store.get_cert_authority(&id, false).await.unwrap_err();
///     assert!(missing.is_not_found());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryCertAuthorityStore {
    state: Arc<RwLock<State>>,
    validator: Arc<Validator>,
    events: broadcast::Sender<CertAuthorityEvent>,
}

impl Default for MemoryCertAuthorityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCertAuthorityStore {
    /// Creates an empty store that validates with the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(ValidationPolicy::default())
    }

    /// Creates an empty store that validates with `policy`.
    #[must_use]
    pub fn with_policy(policy: ValidationPolicy) -> Self {
        let (events, _) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(State::default())),
            validator: Arc::new(Validator::new(policy)),
            events,
        }
    }

    /// Number of stored authorities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    /// Returns `true` when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }

    fn validate(&self, ca: &CertAuthority) -> StorageResult<()> {
        self.validator.validate(ca).map_err(StorageError::Rejected)
    }

    fn publish(&self, event: CertAuthorityEvent) {
        // No receivers is not an error.
        let receivers = self.events.send(event).unwrap_or(0);
        tracing::trace!(receivers, "published authority event");
    }
}

#[async_trait]
impl CertAuthorityStore for MemoryCertAuthorityStore {
    #[tracing::instrument(skip(self, ca), fields(id = %ca.id()))]
    async fn create_cert_authority(&self, ca: &CertAuthority) -> StorageResult<ResourceId> {
        self.validate(ca)?;
        let id = ca.id();

        let mut state = self.state.write();
        if state.records.contains_key(&id) {
            return Err(StorageError::already_exists(id));
        }
        let record = state.encode(ca)?;
        let resource_id = record.resource_id;
        state.records.insert(id, record);
        drop(state);

        tracing::debug!(%resource_id, "created certificate authority");
        self.publish(CertAuthorityEvent::Put(stamped_public(ca, resource_id)));
        Ok(resource_id)
    }

    #[tracing::instrument(skip(self, ca), fields(id = %ca.id()))]
    async fn upsert_cert_authority(&self, ca: &CertAuthority) -> StorageResult<WriteOutcome> {
        self.validate(ca)?;
        let id = ca.id();

        let mut state = self.state.write();
        if let Some(existing) = state.records.get(&id) {
            if equivalent(&existing.decode(true)?, ca) {
                tracing::debug!(resource_id = %existing.resource_id, "skipped equivalent write");
                return Ok(WriteOutcome::Unchanged(existing.resource_id));
            }
        }
        let record = state.encode(ca)?;
        let resource_id = record.resource_id;
        state.records.insert(id, record);
        drop(state);

        tracing::debug!(%resource_id, "stored certificate authority");
        self.publish(CertAuthorityEvent::Put(stamped_public(ca, resource_id)));
        Ok(WriteOutcome::Written(resource_id))
    }

    #[tracing::instrument(skip(self, new, expected), fields(id = %new.id()))]
    async fn compare_and_swap_cert_authority(
        &self,
        new: &CertAuthority,
        expected: &CertAuthority,
    ) -> StorageResult<ResourceId> {
        let id = new.id();
        if id != expected.id() {
            return Err(StorageError::Rejected(trustgate_ca::AuthorityError::validation(format!(
                "compare and swap of {id} against {}",
                expected.id()
            ))));
        }
        self.validate(new)?;

        let mut state = self.state.write();
        let current = state.records.get(&id).ok_or_else(|| StorageError::not_found(id.clone()))?;
        if !equivalent(&current.decode(true)?, expected) {
            return Err(StorageError::conflict(id));
        }
        let record = state.encode(new)?;
        let resource_id = record.resource_id;
        state.records.insert(id, record);
        drop(state);

        tracing::debug!(%resource_id, "swapped certificate authority");
        self.publish(CertAuthorityEvent::Put(stamped_public(new, resource_id)));
        Ok(resource_id)
    }

    #[tracing::instrument(skip(self))]
    async fn get_cert_authority(
        &self,
        id: &CertAuthId,
        load_keys: bool,
    ) -> StorageResult<CertAuthority> {
        let state = self.state.read();
        state.records.get(id).ok_or_else(|| StorageError::not_found(id.clone()))?.decode(load_keys)
    }

    #[tracing::instrument(skip(self))]
    async fn list_cert_authorities(
        &self,
        ca_type: CertAuthType,
        load_keys: bool,
    ) -> StorageResult<Vec<CertAuthority>> {
        let state = self.state.read();
        state
            .records
            .iter()
            .filter(|(id, _)| id.ca_type == ca_type)
            .map(|(_, record)| record.decode(load_keys))
            .collect()
    }

    #[tracing::instrument(skip(self))]
    async fn delete_cert_authority(&self, id: &CertAuthId) -> StorageResult<()> {
        let removed = self.state.write().records.remove(id);
        if removed.is_none() {
            return Err(StorageError::not_found(id.clone()));
        }
        tracing::debug!("deleted certificate authority");
        self.publish(CertAuthorityEvent::Delete(id.clone()));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<CertAuthorityEvent> {
        self.events.subscribe()
    }
}

/// Public copy of `ca` as it now reads back from storage.
fn stamped_public(ca: &CertAuthority, resource_id: ResourceId) -> CertAuthority {
    let mut public = ca.without_secrets();
    public.resource_id = resource_id;
    public
}
