use async_trait::async_trait;
use progress_core::model::{AttemptKind, AttemptRecord, UserId};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::Notify;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

/// Errors surfaced by the on-device key-value adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Errors surfaced by remote attempt stores.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemoteError {
    /// Network or transport failure; the store could not be reached.
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    /// The store answered but refused the request.
    #[error("remote rejected request: {0}")]
    Rejected(String),

    #[error("remote response could not be decoded: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IdentityError {
    #[error("no signed-in user")]
    SignedOut,

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

//
// ─── CONTRACTS ────────────────────────────────────────────────────────────────
//

/// On-device persistent key-value store holding JSON-encoded strings.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a raw value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a raw value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be stored.
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a key. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend rejects the removal.
    async fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    /// List every stored key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn get_all_keys(&self) -> Result<Vec<String>, StorageError>;

    /// Remove several keys at once.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend rejects the removal.
    async fn multi_remove(&self, keys: &[String]) -> Result<(), StorageError>;
}

/// Row filter for the remote attempts table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFilter {
    pub user: UserId,
    /// Empty means every kind.
    pub kinds: Vec<AttemptKind>,
}

impl AttemptFilter {
    #[must_use]
    pub fn for_user(user: UserId) -> Self {
        Self {
            user,
            kinds: Vec::new(),
        }
    }

    #[must_use]
    pub fn kind(mut self, kind: AttemptKind) -> Self {
        self.kinds.push(kind);
        self
    }

    #[must_use]
    pub fn matches(&self, user: &UserId, kind: AttemptKind) -> bool {
        &self.user == user && (self.kinds.is_empty() || self.kinds.contains(&kind))
    }
}

/// Authoritative remote table of attempts.
#[async_trait]
pub trait RemoteAttemptStore: Send + Sync {
    /// Insert one attempt for `user`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` on transport failure or rejection.
    async fn insert(&self, user: &UserId, record: &AttemptRecord) -> Result<(), RemoteError>;

    /// Delete every row matching `filter`, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` on transport failure or rejection.
    async fn delete(&self, filter: &AttemptFilter) -> Result<u64, RemoteError>;

    /// Select rows matching `filter`, newest first, at most `limit`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` on transport failure, rejection, or undecodable rows.
    async fn select(
        &self,
        filter: &AttemptFilter,
        limit: usize,
    ) -> Result<Vec<AttemptRecord>, RemoteError>;
}

/// Resolves the currently signed-in user.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns `IdentityError` when no user is resolvable; callers treat this as offline.
    async fn current_user(&self) -> Result<UserId, IdentityError>;
}

//
// ─── IN-MEMORY ADAPTERS ───────────────────────────────────────────────────────
//

/// Simple in-memory key-value store for testing and prototyping.
///
/// Writes can be switched off to simulate a failing device store.
#[derive(Clone, Default)]
pub struct InMemoryKeyValueStore {
    items: Arc<Mutex<BTreeMap<String, String>>>,
    read_only: Arc<AtomicBool>,
}

impl InMemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every write and removal fails with `StorageError::Connection`.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    fn ensure_writable(&self) -> Result<(), StorageError> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("store is read-only".into()));
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, StorageError> {
        self.items
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.ensure_writable()?;
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.ensure_writable()?;
        self.lock()?.remove(key);
        Ok(())
    }

    async fn get_all_keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<(), StorageError> {
        self.ensure_writable()?;
        let mut guard = self.lock()?;
        for key in keys {
            guard.remove(key);
        }
        Ok(())
    }
}

/// In-memory remote table with an offline switch and an optional delete gate.
#[derive(Clone, Default)]
pub struct InMemoryRemoteStore {
    rows: Arc<Mutex<Vec<(UserId, AttemptRecord)>>>,
    offline: Arc<AtomicBool>,
    delete_gate: Arc<Mutex<Option<Arc<Notify>>>>,
}

impl InMemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every call fails with `RemoteError::Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Every row stored for `user`, in insertion order.
    #[must_use]
    pub fn rows_for(&self, user: &UserId) -> Vec<AttemptRecord> {
        self.rows
            .lock()
            .map(|rows| {
                rows.iter()
                    .filter(|(owner, _)| owner == user)
                    .map(|(_, record)| record.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Hold every subsequent `delete` until the returned gate is notified.
    ///
    /// Used to observe reads while a remote deletion is still in flight.
    #[must_use]
    pub fn hold_deletes(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        if let Ok(mut slot) = self.delete_gate.lock() {
            *slot = Some(Arc::clone(&gate));
        }
        gate
    }

    fn current_gate(&self) -> Option<Arc<Notify>> {
        self.delete_gate.lock().ok().and_then(|slot| slot.clone())
    }

    fn ensure_online(&self) -> Result<(), RemoteError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("remote store offline".into()));
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<(UserId, AttemptRecord)>>, RemoteError> {
        self.rows
            .lock()
            .map_err(|e| RemoteError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl RemoteAttemptStore for InMemoryRemoteStore {
    async fn insert(&self, user: &UserId, record: &AttemptRecord) -> Result<(), RemoteError> {
        self.ensure_online()?;
        self.lock()?.push((user.clone(), record.clone()));
        Ok(())
    }

    async fn delete(&self, filter: &AttemptFilter) -> Result<u64, RemoteError> {
        if let Some(gate) = self.current_gate() {
            gate.notified().await;
        }
        self.ensure_online()?;
        let mut guard = self.lock()?;
        let before = guard.len();
        guard.retain(|(user, record)| !filter.matches(user, record.kind));
        Ok(u64::try_from(before - guard.len()).unwrap_or(u64::MAX))
    }

    async fn select(
        &self,
        filter: &AttemptFilter,
        limit: usize,
    ) -> Result<Vec<AttemptRecord>, RemoteError> {
        self.ensure_online()?;
        let guard = self.lock()?;
        let mut found: Vec<AttemptRecord> = guard
            .iter()
            .filter(|(user, record)| filter.matches(user, record.kind))
            .map(|(_, record)| record.clone())
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found.truncate(limit);
        Ok(found)
    }
}

/// Remote store used when no backend is configured. Always unavailable.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisconnectedRemote;

#[async_trait]
impl RemoteAttemptStore for DisconnectedRemote {
    async fn insert(&self, _user: &UserId, _record: &AttemptRecord) -> Result<(), RemoteError> {
        Err(RemoteError::Unavailable("no remote configured".into()))
    }

    async fn delete(&self, _filter: &AttemptFilter) -> Result<u64, RemoteError> {
        Err(RemoteError::Unavailable("no remote configured".into()))
    }

    async fn select(
        &self,
        _filter: &AttemptFilter,
        _limit: usize,
    ) -> Result<Vec<AttemptRecord>, RemoteError> {
        Err(RemoteError::Unavailable("no remote configured".into()))
    }
}

/// Identity provider with a fixed (or absent) user.
#[derive(Clone, Debug, Default)]
pub struct StaticIdentity {
    user: Option<UserId>,
}

impl StaticIdentity {
    #[must_use]
    pub fn signed_in(user: UserId) -> Self {
        Self { user: Some(user) }
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self { user: None }
    }

    #[must_use]
    pub fn new(user: Option<UserId>) -> Self {
        Self { user }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user(&self) -> Result<UserId, IdentityError> {
        self.user.clone().ok_or(IdentityError::SignedOut)
    }
}

//
// ─── AGGREGATE ────────────────────────────────────────────────────────────────
//

/// Aggregates the external collaborators behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub local: Arc<dyn KeyValueStore>,
    pub remote: Arc<dyn RemoteAttemptStore>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl Storage {
    #[must_use]
    pub fn new(
        local: Arc<dyn KeyValueStore>,
        remote: Arc<dyn RemoteAttemptStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            local,
            remote,
            identity,
        }
    }

    /// Fully offline storage: in-memory device store, no remote, no user.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryKeyValueStore::new()),
            Arc::new(DisconnectedRemote),
            Arc::new(StaticIdentity::signed_out()),
        )
    }
}
