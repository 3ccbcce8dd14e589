// src/storage/mod.rs

//! Content storage
//!
//! A path-keyed blob store whose writes never overwrite: `put` first tries
//! an exclusive create, and when the path is already taken compares the
//! stored bytes with the new ones to decide between `AlreadyExists` and
//! `Conflict`.
//!
//! Backends:
//! - [`FileStorage`] - local directory tree
//! - [`DatabaseStorage`] - SQLite blob table
//! - [`ObjectStorage`] - any `object_store` backend (memory, local, S3)
//! - [`NullStorage`] - discards everything

mod database;
mod file;
mod null;
mod object;
mod package;

pub use database::DatabaseStorage;
pub use file::FileStorage;
pub use null::NullStorage;
pub use object::ObjectStorage;
pub use package::{BlobKind, PackageStorage};

use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Streaming handle to stored content
pub type ContentReader = Pin<Box<dyn AsyncRead + Send>>;

/// Outcome of a conflict-checked write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutResult {
    /// The content was written
    Success,
    /// Identical content was already stored at the path
    AlreadyExists,
    /// Different content is already stored at the path; nothing was written
    Conflict,
}

/// A blob store with conflict-detecting, idempotent writes
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Open the content at `path`, or `Error::NotFound`
    async fn get(&self, path: &str, cancel: &CancellationToken) -> Result<ContentReader>;

    /// Store `content` at `path` without ever replacing existing bytes
    async fn put(
        &self,
        path: &str,
        content: Bytes,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<PutResult>;

    /// Remove the content at `path`; a missing path is not an error
    async fn delete(&self, path: &str, cancel: &CancellationToken) -> Result<()>;

    /// A locator an external client can fetch the content from
    async fn download_uri(&self, path: &str, cancel: &CancellationToken) -> Result<Url>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Decide the result of a put that lost the exclusive create
pub(crate) fn compare_existing(existing: &[u8], content: &[u8]) -> PutResult {
    if existing == content {
        PutResult::AlreadyExists
    } else {
        PutResult::Conflict
    }
}

/// Drain a reader into memory
pub async fn read_to_bytes(mut reader: ContentReader) -> Result<Bytes> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(Bytes::from(buf))
}

/// Storage paths are always relative, '/'-separated and free of '..'
pub(crate) fn validate_path(path: &str) -> Result<()> {
    if path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(Error::InvalidPath(path.to_string()));
    }
    Ok(())
}
