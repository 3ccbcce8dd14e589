// src/storage/null.rs
//! Storage sink that keeps nothing

use super::{ContentReader, PutResult, StorageService};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Accepts every write and discards it
#[derive(Debug, Default)]
pub struct NullStorage;

#[async_trait]
impl StorageService for NullStorage {
    async fn get(&self, path: &str, _cancel: &CancellationToken) -> Result<ContentReader> {
        Err(Error::NotFound(path.to_string()))
    }

    async fn put(
        &self,
        _path: &str,
        _content: Bytes,
        _content_type: &str,
        _cancel: &CancellationToken,
    ) -> Result<PutResult> {
        Ok(PutResult::Success)
    }

    async fn delete(&self, _path: &str, _cancel: &CancellationToken) -> Result<()> {
        Ok(())
    }

    async fn download_uri(&self, path: &str, _cancel: &CancellationToken) -> Result<Url> {
        Err(Error::Unsupported(format!("null storage cannot locate {}", path)))
    }

    fn name(&self) -> &str {
        "null"
    }
}
