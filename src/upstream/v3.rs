// src/upstream/v3.rs
//! NuGet V3 protocol client
//!
//! Resolves the feed's service index once, then uses:
//! - `PackageBaseAddress/3.0.0` (flat container) for version lists and archives
//! - `RegistrationsBaseUrl` for package metadata

use super::UpstreamClient;
use crate::cancel;
use crate::error::{Error, Result};
use crate::model::{Package, PackageDependency};
use crate::version::PackageVersion;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

const PACKAGE_BASE_ADDRESS: &[&str] = &["PackageBaseAddress/3.0.0"];

/// Preferred first; 3.6.0 includes SemVer 2 packages
const REGISTRATIONS_BASE_URL: &[&str] = &[
    "RegistrationsBaseUrl/3.6.0",
    "RegistrationsBaseUrl/3.4.0",
    "RegistrationsBaseUrl",
];

const AUTHOR_SEPARATORS: &[char] = &[',', ';', '\t', '\n', '\r'];

#[derive(Debug)]
struct Endpoints {
    package_base: Url,
    registrations_base: Url,
}

pub struct V3UpstreamClient {
    client: reqwest::Client,
    service_index: Url,
    endpoints: OnceCell<Endpoints>,
}

impl V3UpstreamClient {
    /// Create a client for the feed whose service index is at `service_index`
    pub fn new(service_index: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("nuvault/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Upstream(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            service_index,
            endpoints: OnceCell::new(),
        })
    }

    async fn endpoints(&self, cancel: &CancellationToken) -> Result<&Endpoints> {
        self.endpoints
            .get_or_try_init(|| async {
                let index: ServiceIndex = self
                    .get_json(self.service_index.clone(), cancel)
                    .await?
                    .ok_or_else(|| {
                        Error::Upstream(format!("Service index {} not found", self.service_index))
                    })?;

                let endpoints = Endpoints {
                    package_base: index.resource(PACKAGE_BASE_ADDRESS)?,
                    registrations_base: index.resource(REGISTRATIONS_BASE_URL)?,
                };
                info!(
                    "Resolved upstream {}: packages at {}, registrations at {}",
                    self.service_index, endpoints.package_base, endpoints.registrations_base
                );
                Ok::<_, Error>(endpoints)
            })
            .await
    }

    /// GET and decode JSON; 404 is `None`
    async fn get_json<T: DeserializeOwned>(&self, url: Url, cancel: &CancellationToken) -> Result<Option<T>> {
        cancel::run(cancel, async {
            debug!("GET {}", url);
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| Error::Upstream(format!("Failed to fetch {}: {e}", url)))?;

            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !response.status().is_success() {
                return Err(Error::Upstream(format!("{} returned HTTP {}", url, response.status())));
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| Error::Upstream(format!("Failed to read {}: {e}", url)))?;
            Ok(Some(serde_json::from_slice(&body)?))
        })
        .await
    }

    fn join(base: &Url, relative: &str) -> Result<Url> {
        base.join(relative)
            .map_err(|e| Error::Upstream(format!("Invalid upstream URL {}{}: {e}", base, relative)))
    }
}

#[async_trait]
impl UpstreamClient for V3UpstreamClient {
    async fn list_versions(&self, id: &str, cancel: &CancellationToken) -> Result<Vec<PackageVersion>> {
        let endpoints = self.endpoints(cancel).await?;
        let url = Self::join(&endpoints.package_base, &format!("{}/index.json", id.to_lowercase()))?;

        let Some(index) = self.get_json::<FlatContainerIndex>(url, cancel).await? else {
            return Ok(Vec::new());
        };

        let mut versions = Vec::with_capacity(index.versions.len());
        for version in &index.versions {
            match PackageVersion::parse(version) {
                Ok(v) => versions.push(v),
                Err(_) => warn!("Skipping unparseable upstream version {} {}", id, version),
            }
        }
        Ok(versions)
    }

    async fn list_packages(&self, id: &str, cancel: &CancellationToken) -> Result<Vec<Package>> {
        let endpoints = self.endpoints(cancel).await?;
        let url = Self::join(
            &endpoints.registrations_base,
            &format!("{}/index.json", id.to_lowercase()),
        )?;

        let Some(index) = self.get_json::<RegistrationIndex>(url, cancel).await? else {
            return Ok(Vec::new());
        };

        let mut packages = Vec::new();
        for page in index.items {
            let leaves = match page.items {
                Some(items) => items,
                None => {
                    let page_url = Url::parse(&page.id)
                        .map_err(|e| Error::Upstream(format!("Invalid page URL {}: {e}", page.id)))?;
                    match self.get_json::<RegistrationPage>(page_url, cancel).await? {
                        Some(full) => full.items.unwrap_or_default(),
                        None => Vec::new(),
                    }
                }
            };

            for leaf in leaves {
                match leaf.catalog_entry.into_package() {
                    Ok(package) => packages.push(package),
                    Err(e) => warn!("Skipping upstream package entry for {}: {}", id, e),
                }
            }
        }

        Ok(packages)
    }

    async fn download_or_none(
        &self,
        id: &str,
        version: &PackageVersion,
        cancel: &CancellationToken,
    ) -> Result<Option<Bytes>> {
        let endpoints = self.endpoints(cancel).await?;
        let lower_id = id.to_lowercase();
        let lower_version = version.to_normalized_string().to_lowercase();
        let url = Self::join(
            &endpoints.package_base,
            &format!("{0}/{1}/{0}.{1}.nupkg", lower_id, lower_version),
        )?;

        cancel::run(cancel, async {
            info!("Downloading {} {} from {}", id, lower_version, url);
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| Error::Upstream(format!("Failed to download {}: {e}", url)))?;

            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !response.status().is_success() {
                return Err(Error::Upstream(format!("{} returned HTTP {}", url, response.status())));
            }

            let data = response
                .bytes()
                .await
                .map_err(|e| Error::Upstream(format!("Failed to read {}: {e}", url)))?;
            Ok(Some(data))
        })
        .await
    }

    fn name(&self) -> &str {
        "v3"
    }
}

#[derive(Debug, Deserialize)]
struct ServiceIndex {
    #[serde(default)]
    resources: Vec<ServiceResource>,
}

impl ServiceIndex {
    /// First resource matching the earliest type in `types`
    fn resource(&self, types: &[&str]) -> Result<Url> {
        for wanted in types {
            if let Some(resource) = self.resources.iter().find(|r| r.resource_type.contains(wanted)) {
                let mut url = Url::parse(&resource.id)
                    .map_err(|e| Error::Upstream(format!("Invalid resource URL {}: {e}", resource.id)))?;
                if !url.path().ends_with('/') {
                    let path = format!("{}/", url.path());
                    url.set_path(&path);
                }
                return Ok(url);
            }
        }
        Err(Error::Upstream(format!("Service index has no {} resource", types[0])))
    }
}

#[derive(Debug, Deserialize)]
struct ServiceResource {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@type")]
    resource_type: OneOrMany,
}

/// JSON fields that feeds emit either as a string or as an array of strings
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn contains(&self, value: &str) -> bool {
        match self {
            OneOrMany::One(s) => s == value,
            OneOrMany::Many(v) => v.iter().any(|s| s == value),
        }
    }

    fn split(self, separators: &[char]) -> Vec<String> {
        let values = match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        };
        values
            .iter()
            .flat_map(|v| v.split(separators))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct FlatContainerIndex {
    #[serde(default)]
    versions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RegistrationIndex {
    #[serde(default)]
    items: Vec<RegistrationPage>,
}

#[derive(Debug, Deserialize)]
struct RegistrationPage {
    #[serde(rename = "@id")]
    id: String,
    items: Option<Vec<RegistrationLeaf>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationLeaf {
    catalog_entry: CatalogEntry,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogEntry {
    id: String,
    version: String,
    authors: Option<OneOrMany>,
    description: Option<String>,
    icon_url: Option<String>,
    language: Option<String>,
    license_url: Option<String>,
    listed: Option<bool>,
    min_client_version: Option<String>,
    project_url: Option<String>,
    published: Option<String>,
    #[serde(default)]
    require_license_acceptance: bool,
    summary: Option<String>,
    tags: Option<OneOrMany>,
    title: Option<String>,
    dependency_groups: Option<Vec<DependencyGroup>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DependencyGroup {
    target_framework: Option<String>,
    dependencies: Option<Vec<Dependency>>,
}

#[derive(Debug, Deserialize)]
struct Dependency {
    id: String,
    range: Option<String>,
}

fn parse_published(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").map(|dt| dt.and_utc()))
        .ok()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

impl CatalogEntry {
    fn into_package(self) -> Result<Package> {
        let version = PackageVersion::parse(&self.version)?;
        let published = self.published.as_deref().and_then(parse_published);
        // Unlisted packages carry a 1900 publish date on nuget.org
        let listed = self.listed.unwrap_or(true) && published.is_none_or(|p| p.year() != 1900);

        let mut dependencies = Vec::new();
        for group in self.dependency_groups.unwrap_or_default() {
            let deps = group.dependencies.unwrap_or_default();
            if deps.is_empty() {
                dependencies.push(PackageDependency {
                    id: None,
                    version_range: None,
                    target_framework: group.target_framework.clone(),
                });
            }
            for dep in deps {
                dependencies.push(PackageDependency {
                    id: Some(dep.id),
                    version_range: dep.range,
                    target_framework: group.target_framework.clone(),
                });
            }
        }

        let mut package = Package::new(self.id, version);
        package.authors = self.authors.map(|a| a.split(AUTHOR_SEPARATORS)).unwrap_or_default();
        package.description = self.description.unwrap_or_default();
        package.listed = listed;
        package.published = published.unwrap_or_else(Utc::now);
        package.require_license_acceptance = self.require_license_acceptance;
        package.language = non_empty(self.language);
        package.min_client_version = non_empty(self.min_client_version);
        package.summary = non_empty(self.summary);
        package.title = non_empty(self.title);
        package.icon_url = non_empty(self.icon_url);
        package.license_url = non_empty(self.license_url);
        package.project_url = non_empty(self.project_url);
        package.tags = self.tags.map(|t| t.split(&[',', ';', ' ', '\t', '\n', '\r'])).unwrap_or_default();
        package.dependencies = dependencies;
        Ok(package)
    }
}
