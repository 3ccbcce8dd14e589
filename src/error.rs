// src/error.rs

//! Crate-wide error type
//!
//! Expected outcomes (a blob that already exists, a package that could not
//! be mirrored, an invalid upload) are modelled as result enums by the
//! components that produce them. This type carries the failures that
//! callers should map to a server error.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    /// A parent directory of the requested path is missing
    #[error("Directory not found for path: {0}")]
    DirectoryNotFound(String),

    #[error("Invalid storage path: {0}")]
    InvalidPath(String),

    /// The path already holds different bytes
    #[error("Storage conflict at {0}: existing content differs")]
    StorageConflict(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("Invalid version '{0}'")]
    InvalidVersion(String),

    #[error("Invalid package: {0}")]
    InvalidPackage(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The search backend rejected a batch that can no longer be split
    #[error("Search batch of {0} action(s) rejected as too large")]
    SearchBatchTooLarge(usize),

    /// The search backend accepted a batch but failed some documents
    #[error("Search backend failed {failed} of {total} document(s): {keys:?}")]
    SearchPartialFailure {
        failed: usize,
        total: usize,
        keys: Vec<String>,
    },

    #[error("Search backend error: {0}")]
    SearchBackend(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// True for the not-found family of storage errors
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::DirectoryNotFound(_))
    }
}
