// src/storage/package.rs
//! Package content layout
//!
//! Each package version owns one directory:
//!
//! ```text
//! packages/{id}/{version}/{id}.{version}.nupkg
//! packages/{id}/{version}/{id}.nuspec
//! packages/{id}/{version}/readme
//! packages/{id}/{version}/icon
//! ```
//!
//! where `{id}` is the lowercased id and `{version}` the lowercased
//! normalized version (no build metadata). Blobs are written archive first;
//! a conflict on any of them aborts the save.

use super::{ContentReader, PutResult, StorageService};
use crate::error::{Error, Result};
use crate::model::Package;
use crate::version::PackageVersion;
use bytes::Bytes;
use std::sync::Arc;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;

const PACKAGES_PATH_PREFIX: &str = "packages";

/// The files stored for one package version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum BlobKind {
    Archive,
    Manifest,
    Readme,
    Icon,
}

impl BlobKind {
    pub fn content_type(self) -> &'static str {
        match self {
            BlobKind::Archive => "binary/octet-stream",
            BlobKind::Manifest => "text/plain",
            BlobKind::Readme => "text/markdown",
            BlobKind::Icon => "image/xyz",
        }
    }
}

/// Stores and retrieves the content blobs of packages
#[derive(Clone)]
pub struct PackageStorage {
    storage: Arc<dyn StorageService>,
}

impl PackageStorage {
    pub fn new(storage: Arc<dyn StorageService>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn StorageService> {
        &self.storage
    }

    /// Storage path of one blob of a package version
    pub fn blob_path(id: &str, version: &PackageVersion, kind: BlobKind) -> String {
        let lower_id = id.to_lowercase();
        let lower_version = version.to_normalized_string().to_lowercase();
        let file_name = match kind {
            BlobKind::Archive => format!("{}.{}.nupkg", lower_id, lower_version),
            BlobKind::Manifest => format!("{}.nuspec", lower_id),
            BlobKind::Readme => "readme".to_string(),
            BlobKind::Icon => "icon".to_string(),
        };
        format!("{}/{}/{}/{}", PACKAGES_PATH_PREFIX, lower_id, lower_version, file_name)
    }

    pub fn archive_path(id: &str, version: &PackageVersion) -> String {
        Self::blob_path(id, version, BlobKind::Archive)
    }

    pub fn manifest_path(id: &str, version: &PackageVersion) -> String {
        Self::blob_path(id, version, BlobKind::Manifest)
    }

    pub fn readme_path(id: &str, version: &PackageVersion) -> String {
        Self::blob_path(id, version, BlobKind::Readme)
    }

    pub fn icon_path(id: &str, version: &PackageVersion) -> String {
        Self::blob_path(id, version, BlobKind::Icon)
    }

    /// Store a package's content
    ///
    /// Replaying a save with identical content succeeds. Readme and icon are
    /// only written when given. Blobs written before a conflict are left in
    /// place; a retry with the same content finds them identical.
    pub async fn save(
        &self,
        package: &Package,
        archive: Bytes,
        manifest: Bytes,
        readme: Option<Bytes>,
        icon: Option<Bytes>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        info!(
            "Storing package {} {} ({} storage)",
            package.id,
            package.version.to_normalized_string(),
            self.storage.name()
        );

        let blobs = [
            (BlobKind::Archive, Some(archive)),
            (BlobKind::Manifest, Some(manifest)),
            (BlobKind::Readme, readme),
            (BlobKind::Icon, icon),
        ];

        for (kind, content) in blobs {
            let Some(content) = content else {
                continue;
            };
            let path = Self::blob_path(&package.id, &package.version, kind);

            match self.storage.put(&path, content, kind.content_type(), cancel).await? {
                PutResult::Success => {}
                PutResult::AlreadyExists => {
                    info!("Package {} {} {} already stored at {}", package.id, package.version, kind, path);
                }
                PutResult::Conflict => {
                    error!(
                        "Package {} {} {} conflicts with existing content at {}",
                        package.id, package.version, kind, path
                    );
                    return Err(Error::StorageConflict(path));
                }
            }
        }

        Ok(())
    }

    /// Open one blob of a package version
    pub async fn get(
        &self,
        id: &str,
        version: &PackageVersion,
        kind: BlobKind,
        cancel: &CancellationToken,
    ) -> Result<ContentReader> {
        let path = Self::blob_path(id, version, kind);
        match self.storage.get(&path, cancel).await {
            Err(Error::DirectoryNotFound(_)) => {
                warn!(
                    "Unable to find the '{}' folder for package {} {}. If content was stored \
                     by an older release, make sure the folder names are lowercased.",
                    PACKAGES_PATH_PREFIX, id, version
                );
                Err(Error::NotFound(path))
            }
            other => other,
        }
    }

    pub async fn get_archive(
        &self,
        id: &str,
        version: &PackageVersion,
        cancel: &CancellationToken,
    ) -> Result<ContentReader> {
        self.get(id, version, BlobKind::Archive, cancel).await
    }

    pub async fn get_manifest(
        &self,
        id: &str,
        version: &PackageVersion,
        cancel: &CancellationToken,
    ) -> Result<ContentReader> {
        self.get(id, version, BlobKind::Manifest, cancel).await
    }

    pub async fn get_readme(
        &self,
        id: &str,
        version: &PackageVersion,
        cancel: &CancellationToken,
    ) -> Result<ContentReader> {
        self.get(id, version, BlobKind::Readme, cancel).await
    }

    pub async fn get_icon(
        &self,
        id: &str,
        version: &PackageVersion,
        cancel: &CancellationToken,
    ) -> Result<ContentReader> {
        self.get(id, version, BlobKind::Icon, cancel).await
    }

    /// Locator for a blob that clients can download directly
    pub async fn download_uri(
        &self,
        id: &str,
        version: &PackageVersion,
        kind: BlobKind,
        cancel: &CancellationToken,
    ) -> Result<Url> {
        let path = Self::blob_path(id, version, kind);
        self.storage.download_uri(&path, cancel).await
    }

    /// Remove every blob of a package version; missing blobs are ignored
    pub async fn delete(
        &self,
        id: &str,
        version: &PackageVersion,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for kind in BlobKind::iter() {
            let path = Self::blob_path(id, version, kind);
            self.storage.delete(&path, cancel).await?;
        }
        Ok(())
    }
}
