//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::{IdentityError, RemoteError, StorageError};
use storage::sqlite::SqliteInitError;

/// Failures inside a progress operation. Public operations absorb these and
/// degrade; they surface only in logs and outcome reports.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServiceError {
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `RestRemoteStore` configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RestRemoteError {
    #[error("remote base url is empty")]
    EmptyUrl,
    #[error("remote api key is empty")]
    EmptyKey,
    #[error("http client setup failed: {0}")]
    Client(#[from] reqwest::Error),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    RestRemote(#[from] RestRemoteError),
}
