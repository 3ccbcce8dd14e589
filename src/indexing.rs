// src/indexing.rs

//! Package indexing
//!
//! Turns an uploaded or mirrored `.nupkg` into stored content, a catalog
//! row and search documents, in that order. The catalog row is the commit
//! point: content written before a failed insert is identical on retry.

use crate::catalog::{AddResult, PackageCatalog};
use crate::error::Result;
use crate::nupkg::PackageArchive;
use crate::search::SearchIndexer;
use crate::storage::PackageStorage;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Outcome of indexing one archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexingResult {
    Success,
    /// The archive could not be read
    InvalidPackage,
    /// The catalog already holds this id and version
    PackageAlreadyExists,
}

#[async_trait]
pub trait PackageIndexer: Send + Sync {
    async fn index(&self, archive: Bytes, cancel: &CancellationToken) -> Result<IndexingResult>;
}

pub struct PackageIndexingService {
    catalog: Arc<dyn PackageCatalog>,
    storage: PackageStorage,
    search: Arc<SearchIndexer>,
}

impl PackageIndexingService {
    pub fn new(catalog: Arc<dyn PackageCatalog>, storage: PackageStorage, search: Arc<SearchIndexer>) -> Self {
        Self {
            catalog,
            storage,
            search,
        }
    }
}

#[async_trait]
impl PackageIndexer for PackageIndexingService {
    async fn index(&self, archive: Bytes, cancel: &CancellationToken) -> Result<IndexingResult> {
        let parsed = match PackageArchive::read(&archive) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!("Uploaded package is invalid: {}", e);
                return Ok(IndexingResult::InvalidPackage);
            }
        };
        let package = parsed.package;
        let version = package.version.to_normalized_string();

        if self.catalog.exists(&package.id, &package.version, cancel).await? {
            info!("Package {} {} already exists", package.id, version);
            return Ok(IndexingResult::PackageAlreadyExists);
        }

        info!("Validated package {} {}, persisting content to storage...", package.id, version);
        if let Err(e) = self
            .storage
            .save(&package, archive, parsed.manifest, parsed.readme, parsed.icon, cancel)
            .await
        {
            error!("Failed to persist package {} {} content to storage: {}", package.id, version, e);
            return Err(e);
        }

        info!("Persisted package {} {} content, saving metadata to the catalog...", package.id, version);
        if self.catalog.add(&package, cancel).await? == AddResult::PackageAlreadyExists {
            warn!("Package {} {} metadata already exists in the catalog", package.id, version);
            return Ok(IndexingResult::PackageAlreadyExists);
        }

        info!("Saved package {} {} metadata. Indexing in search...", package.id, version);
        self.search.index_package(&package.id, cancel).await?;

        info!("Indexed package {} {}", package.id, version);
        Ok(IndexingResult::Success)
    }
}
