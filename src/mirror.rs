// src/mirror.rs

//! Merged local and upstream package view
//!
//! Reads consult the local catalog and, when mirroring is enabled, the
//! upstream feed. A version missing locally is downloaded and indexed on
//! demand, after which the local copy is authoritative. Anything that
//! could not be mirrored looks exactly like a package that never existed.
//!
//! Concurrent requests for the same missing version may each download and
//! index it; storage conflict checks keep the outcome consistent.

use crate::catalog::PackageCatalog;
use crate::error::{Error, Result};
use crate::indexing::{IndexingResult, PackageIndexer};
use crate::metrics::RegistryMetrics;
use crate::model::Package;
use crate::search::SearchIndexer;
use crate::upstream::UpstreamClient;
use crate::version::PackageVersion;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct PackageService {
    catalog: Arc<dyn PackageCatalog>,
    upstream: Arc<dyn UpstreamClient>,
    indexer: Arc<dyn PackageIndexer>,
    search: Arc<SearchIndexer>,
    metrics: Arc<RegistryMetrics>,
    /// Ids matching any of these are never taken from upstream
    exclude: Vec<Regex>,
}

impl PackageService {
    pub fn new(
        catalog: Arc<dyn PackageCatalog>,
        upstream: Arc<dyn UpstreamClient>,
        indexer: Arc<dyn PackageIndexer>,
        search: Arc<SearchIndexer>,
        metrics: Arc<RegistryMetrics>,
    ) -> Self {
        Self {
            catalog,
            upstream,
            indexer,
            search,
            metrics,
            exclude: Vec::new(),
        }
    }

    pub fn with_exclusions(mut self, exclude: Vec<Regex>) -> Self {
        self.exclude = exclude;
        self
    }

    fn mirrors(&self, id: &str) -> bool {
        self.upstream.is_enabled() && !self.exclude.iter().any(|re| re.is_match(id))
    }

    /// Every known version of `id`, ascending
    pub async fn find_versions(&self, id: &str, cancel: &CancellationToken) -> Result<Vec<PackageVersion>> {
        let upstream = if self.mirrors(id) {
            match self.upstream.list_versions(id, cancel).await {
                Ok(versions) => versions,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    warn!("Failed to list upstream versions of {}: {}", id, e);
                    self.metrics.record_upstream_error();
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let local: Vec<PackageVersion> = self
            .catalog
            .find(id, true, cancel)
            .await?
            .into_iter()
            .map(|p| p.version)
            .collect();

        if upstream.is_empty() {
            return Ok(local);
        }

        let mut versions = upstream;
        if !local.is_empty() {
            versions.extend(local);
        }
        versions.sort();
        versions.dedup();
        Ok(versions)
    }

    /// Every known version of `id` with metadata, ascending
    ///
    /// Where both sides know a version, the local copy wins.
    pub async fn find_packages(&self, id: &str, cancel: &CancellationToken) -> Result<Vec<Package>> {
        let upstream = if self.mirrors(id) {
            match self.upstream.list_packages(id, cancel).await {
                Ok(packages) => packages,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    warn!("Failed to list upstream packages of {}: {}", id, e);
                    self.metrics.record_upstream_error();
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let local = self.catalog.find(id, true, cancel).await?;

        if upstream.is_empty() {
            return Ok(local);
        }
        if local.is_empty() {
            let mut upstream = upstream;
            upstream.sort_by(|a, b| a.version.cmp(&b.version));
            return Ok(upstream);
        }

        let mut merged: BTreeMap<PackageVersion, Package> =
            upstream.into_iter().map(|p| (p.version.clone(), p)).collect();
        for package in local {
            merged.insert(package.version.clone(), package);
        }
        Ok(merged.into_values().collect())
    }

    /// The package, mirrored first if needed; unlisted versions included
    pub async fn find_or_null(
        &self,
        id: &str,
        version: &PackageVersion,
        cancel: &CancellationToken,
    ) -> Result<Option<Package>> {
        if !self.mirror_on_demand(id, version, cancel).await? {
            return Ok(None);
        }
        self.catalog.find_one(id, version, true, cancel).await
    }

    pub async fn exists(&self, id: &str, version: &PackageVersion, cancel: &CancellationToken) -> Result<bool> {
        self.mirror_on_demand(id, version, cancel).await
    }

    /// Record a download and push the new counters to search
    pub async fn add_download(&self, id: &str, version: &PackageVersion, cancel: &CancellationToken) -> Result<()> {
        self.catalog.add_download(id, version, cancel).await?;
        self.search.update_downloads(id, cancel).await
    }

    /// Make sure (id, version) is in the local catalog
    ///
    /// Returns true when it already was or was just indexed from upstream.
    /// Upstream and indexing failures are logged and reported as false;
    /// only local catalog failures and cancellation are errors.
    pub async fn mirror_on_demand(
        &self,
        id: &str,
        version: &PackageVersion,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        if self.catalog.exists(id, version, cancel).await? {
            self.metrics.record_mirror_hit();
            return Ok(true);
        }

        if !self.mirrors(id) {
            debug!("Package {} {} is not local and not mirrored", id, version);
            return Ok(false);
        }

        info!("Package {} {} does not exist locally. Checking upstream feed...", id, version);
        self.metrics.record_upstream_fetch();

        match self.fetch_and_index(id, version, cancel).await {
            Ok(mirrored) => Ok(mirrored),
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                error!("Failed to index package {} {} from upstream: {}", id, version, e);
                self.metrics.record_upstream_error();
                Ok(false)
            }
        }
    }

    async fn fetch_and_index(&self, id: &str, version: &PackageVersion, cancel: &CancellationToken) -> Result<bool> {
        let Some(archive) = self.upstream.download_or_none(id, version, cancel).await? else {
            warn!("Upstream feed does not have package {} {}", id, version);
            self.metrics.record_upstream_miss();
            return Ok(false);
        };

        info!("Downloaded package {} {} ({} bytes), indexing...", id, version, archive.len());
        let result = self.indexer.index(archive, cancel).await?;
        info!(
            "Finished indexing package {} {} from upstream feed with result {:?}",
            id, version, result
        );

        if result == IndexingResult::Success {
            self.metrics.record_package_mirrored();
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
