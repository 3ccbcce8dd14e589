// src/catalog/mod.rs

//! Package catalog
//!
//! The local index of published packages: metadata and listing state,
//! independent of where their content is stored. Ids and versions are
//! matched case-insensitively.

mod sqlite;

pub use sqlite::SqliteCatalog;

use crate::error::Result;
use crate::model::Package;
use crate::version::PackageVersion;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Outcome of inserting a package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddResult {
    Success,
    PackageAlreadyExists,
}

#[async_trait]
pub trait PackageCatalog: Send + Sync {
    /// Insert a new package version
    async fn add(&self, package: &Package, cancel: &CancellationToken) -> Result<AddResult>;

    /// Whether (id, version) is known, listed or not
    async fn exists(&self, id: &str, version: &PackageVersion, cancel: &CancellationToken) -> Result<bool>;

    /// Every version of `id`, ordered by version
    async fn find(&self, id: &str, include_unlisted: bool, cancel: &CancellationToken) -> Result<Vec<Package>>;

    /// One version of `id`
    async fn find_one(
        &self,
        id: &str,
        version: &PackageVersion,
        include_unlisted: bool,
        cancel: &CancellationToken,
    ) -> Result<Option<Package>>;

    /// Hide a version from listings; returns false when it does not exist
    async fn unlist(&self, id: &str, version: &PackageVersion, cancel: &CancellationToken) -> Result<bool>;

    /// Undo `unlist`; returns false when the version does not exist
    async fn relist(&self, id: &str, version: &PackageVersion, cancel: &CancellationToken) -> Result<bool>;

    /// Increment the download counter of a version
    async fn add_download(&self, id: &str, version: &PackageVersion, cancel: &CancellationToken) -> Result<()>;

    /// Remove a version entirely; returns false when it does not exist
    async fn hard_delete(&self, id: &str, version: &PackageVersion, cancel: &CancellationToken) -> Result<bool>;

    /// Every distinct package id, in original casing
    async fn package_ids(&self, cancel: &CancellationToken) -> Result<Vec<String>>;
}
