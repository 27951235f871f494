use std::sync::Arc;
use std::time::Duration;

use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use thiserror::Error;

use crate::repository::{IdentityProvider, KeyValueStore, RemoteAttemptStore, Storage};

mod kv_repo;
mod migrate;

pub use migrate::latest_version;

/// Pool tuning for the device database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqliteStoreOptions {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Milliseconds a writer waits on a locked database before failing.
    pub busy_timeout_ms: u32,
}

impl Default for SqliteStoreOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout_ms: 5_000,
        }
    }
}

/// Device key-value store persisted in a single `SQLite` table.
#[derive(Clone)]
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("database schema version {found} is newer than supported version {supported}")]
    UnknownSchema { found: i64, supported: i64 },
}

impl SqliteKeyValueStore {
    /// Connect with [`SqliteStoreOptions::default`].
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the pool cannot be opened.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        Self::connect_with(database_url, SqliteStoreOptions::default()).await
    }

    /// Open a WAL-mode pool with the given tuning.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the connection or its pragmas fail.
    pub async fn connect_with(
        database_url: &str,
        options: SqliteStoreOptions,
    ) -> Result<Self, SqliteInitError> {
        let busy = format!("PRAGMA busy_timeout = {};", options.busy_timeout_ms);
        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections.max(1))
            .acquire_timeout(options.acquire_timeout)
            .after_connect(move |conn, _meta| {
                let busy = busy.clone();
                Box::pin(async move {
                    sqlx::query("PRAGMA journal_mode = WAL;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query(&busy).execute(&mut *conn).await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Apply pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if a migration fails or the file was written
    /// by a newer schema.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }

    /// Applied schema version. Call after [`Self::migrate`].
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the bookkeeping table cannot be read.
    pub async fn schema_version(&self) -> Result<i64, SqliteInitError> {
        migrate::current_version(&self.pool).await
    }
}

impl Storage {
    /// Build a `Storage` whose device store is backed by `SQLite`.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if connection or migrations cannot be
    /// completed.
    pub async fn sqlite(
        database_url: &str,
        remote: Arc<dyn RemoteAttemptStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<Self, SqliteInitError> {
        let store = SqliteKeyValueStore::connect(database_url).await?;
        store.migrate().await?;
        let local: Arc<dyn KeyValueStore> = Arc::new(store);
        Ok(Self::new(local, remote, identity))
    }
}
