// src/upstream/mod.rs

//! Upstream package feed clients
//!
//! The mirror consults an upstream feed for versions and packages it does
//! not have locally. "Not found" is an empty answer, never an error; errors
//! are reserved for transport and protocol failures.

mod v3;

pub use v3::V3UpstreamClient;

use crate::error::Result;
use crate::model::Package;
use crate::version::PackageVersion;
use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Every version the upstream has for `id`
    async fn list_versions(&self, id: &str, cancel: &CancellationToken) -> Result<Vec<PackageVersion>>;

    /// Metadata for every version the upstream has for `id`
    async fn list_packages(&self, id: &str, cancel: &CancellationToken) -> Result<Vec<Package>>;

    /// The package archive, or `None` if the upstream does not have it
    async fn download_or_none(
        &self,
        id: &str,
        version: &PackageVersion,
        cancel: &CancellationToken,
    ) -> Result<Option<Bytes>>;

    /// Whether this client talks to a real feed
    fn is_enabled(&self) -> bool {
        true
    }

    /// Client name for logging
    fn name(&self) -> &str;
}

/// Stand-in used when mirroring is turned off
#[derive(Debug, Default)]
pub struct DisabledUpstream;

#[async_trait]
impl UpstreamClient for DisabledUpstream {
    async fn list_versions(&self, _id: &str, _cancel: &CancellationToken) -> Result<Vec<PackageVersion>> {
        Ok(Vec::new())
    }

    async fn list_packages(&self, _id: &str, _cancel: &CancellationToken) -> Result<Vec<Package>> {
        Ok(Vec::new())
    }

    async fn download_or_none(
        &self,
        _id: &str,
        _version: &PackageVersion,
        _cancel: &CancellationToken,
    ) -> Result<Option<Bytes>> {
        Ok(None)
    }

    fn is_enabled(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "disabled"
    }
}
