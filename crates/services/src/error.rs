//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::StorageError;

/// Why a progress lookup produced no data.
///
/// The fail-soft operations on `ProgressStore` turn both variants into empty
/// results; the `try_*` operations return them so callers can tell
/// "nobody signed in" from "the backend failed".
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("no learner is signed in")]
    Anonymous,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by an `AuthProvider`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    #[error("auth service unavailable: {0}")]
    Unavailable(String),
    #[error("auth service returned status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("malformed auth response: {0}")]
    Malformed(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
