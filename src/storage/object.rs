// src/storage/object.rs
//! Object store backed storage
//!
//! Wraps any `object_store` implementation. `PutMode::Create` is the
//! exclusive create; an `AlreadyExists` answer falls through to comparing
//! the stored bytes. S3-compatible stores need conditional puts enabled
//! (`AWS_CONDITIONAL_PUT=etag`) for `PutMode::Create` to be accepted.

use super::{ContentReader, PutResult, StorageService, compare_existing, validate_path};
use crate::cancel;
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::path::Path as ObjPath;
use object_store::prefix::PrefixStore;
use object_store::{Attribute, ObjectStore, PutMode, PutOptions, PutPayload};
use std::sync::Arc;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

pub type DynStore = Arc<dyn ObjectStore>;

pub struct ObjectStorage {
    store: DynStore,
    public_url: Option<Url>,
    /// Local filesystem stores reject object attributes
    content_type_attribute: bool,
}

impl ObjectStorage {
    pub fn new(store: DynStore) -> Self {
        Self {
            store,
            public_url: None,
            content_type_attribute: true,
        }
    }

    /// Resolve a store from a URL such as `memory:///`, `file:///srv/feed`
    /// or `s3://bucket/prefix`
    ///
    /// S3 credentials and options are read from `AWS_*` environment variables.
    pub fn from_url(url: &Url) -> Result<Self> {
        let options = std::env::vars()
            .filter(|(key, _)| key.starts_with("AWS_"))
            .map(|(key, value)| (key.to_ascii_lowercase(), value));
        let (store, prefix) = object_store::parse_url_opts(url, options)?;

        let store: DynStore = Arc::from(store);
        let store: DynStore = if prefix.as_ref().is_empty() {
            store
        } else {
            Arc::new(PrefixStore::new(store, prefix))
        };

        let mut storage = Self::new(store);
        storage.content_type_attribute = url.scheme() != "file";
        Ok(storage)
    }

    /// Base URL that stored paths are published under
    pub fn with_public_url(mut self, mut url: Url) -> Self {
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        self.public_url = Some(url);
        self
    }

    async fn existing_bytes(&self, location: &ObjPath) -> Result<Bytes> {
        let result = self.store.get(location).await?;
        Ok(result.bytes().await?)
    }
}

#[async_trait]
impl StorageService for ObjectStorage {
    async fn get(&self, path: &str, cancel: &CancellationToken) -> Result<ContentReader> {
        validate_path(path)?;
        let location = ObjPath::from(path);

        let result = cancel::run(cancel, async {
            match self.store.get(&location).await {
                Ok(result) => Ok(result),
                Err(object_store::Error::NotFound { .. }) => Err(Error::NotFound(path.to_string())),
                Err(e) => Err(e.into()),
            }
        })
        .await?;

        let stream = result.into_stream().map_err(std::io::Error::other);
        Ok(Box::pin(StreamReader::new(stream)) as ContentReader)
    }

    async fn put(
        &self,
        path: &str,
        content: Bytes,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<PutResult> {
        validate_path(path)?;
        let location = ObjPath::from(path);

        let mut options = PutOptions {
            mode: PutMode::Create,
            ..Default::default()
        };
        if self.content_type_attribute {
            options
                .attributes
                .insert(Attribute::ContentType, content_type.to_string().into());
        }

        let result = cancel::run(cancel, async {
            let payload = PutPayload::from_bytes(content.clone());
            match self.store.put_opts(&location, payload, options).await {
                Ok(_) => Ok(PutResult::Success),
                Err(object_store::Error::AlreadyExists { .. }) => {
                    let existing = self.existing_bytes(&location).await?;
                    Ok(compare_existing(&existing, &content))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await?;

        debug!("Stored {} in object store ({} bytes): {:?}", path, content.len(), result);
        Ok(result)
    }

    async fn delete(&self, path: &str, cancel: &CancellationToken) -> Result<()> {
        validate_path(path)?;
        let location = ObjPath::from(path);

        cancel::run(cancel, async {
            match self.store.delete(&location).await {
                Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn download_uri(&self, path: &str, _cancel: &CancellationToken) -> Result<Url> {
        validate_path(path)?;
        let base = self.public_url.as_ref().ok_or_else(|| {
            Error::Unsupported(format!("no public URL configured to locate {}", path))
        })?;
        base.join(path)
            .map_err(|e| Error::InvalidPath(format!("{}: {}", path, e)))
    }

    fn name(&self) -> &str {
        "object-store"
    }
}
