// src/model/package.rs

use crate::version::PackageVersion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{Display, EnumString};

/// Whether a version needs a SemVer 2 aware client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
pub enum SemVerLevel {
    #[default]
    Unknown,
    SemVer2,
}

impl SemVerLevel {
    pub fn for_version(version: &PackageVersion) -> Self {
        if version.is_semver2() {
            SemVerLevel::SemVer2
        } else {
            SemVerLevel::Unknown
        }
    }
}

/// A package id plus version
///
/// Ids compare case-insensitively; the casing given at publish time is kept
/// for display.
#[derive(Debug, Clone)]
pub struct PackageIdentity {
    pub id: String,
    pub version: PackageVersion,
}

impl PackageIdentity {
    pub fn new(id: impl Into<String>, version: PackageVersion) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }

    pub fn lower_id(&self) -> String {
        self.id.to_lowercase()
    }

    pub fn lower_version(&self) -> String {
        self.version.to_normalized_string().to_lowercase()
    }
}

impl PartialEq for PackageIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.id.eq_ignore_ascii_case(&other.id) && self.version == other.version
    }
}

impl Eq for PackageIdentity {}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version.to_normalized_string())
    }
}

/// One dependency inside a target framework group
///
/// A group with no dependencies is still recorded, with `id` unset, so the
/// framework itself is not lost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDependency {
    pub id: Option<String>,
    pub version_range: Option<String>,
    pub target_framework: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageType {
    pub name: String,
    pub version: Option<String>,
}

/// A published package version and its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub id: String,
    pub version: PackageVersion,
    pub authors: Vec<String>,
    pub description: String,
    pub downloads: i64,
    pub has_readme: bool,
    pub has_embedded_icon: bool,
    pub has_embedded_license: bool,
    pub is_prerelease: bool,
    pub listed: bool,
    pub semver_level: SemVerLevel,
    pub published: DateTime<Utc>,
    pub require_license_acceptance: bool,
    pub language: Option<String>,
    pub min_client_version: Option<String>,
    pub release_notes: Option<String>,
    pub summary: Option<String>,
    pub title: Option<String>,
    pub icon_url: Option<String>,
    pub license_url: Option<String>,
    pub project_url: Option<String>,
    pub repository_url: Option<String>,
    pub repository_type: Option<String>,
    pub tags: Vec<String>,
    pub dependencies: Vec<PackageDependency>,
    pub package_types: Vec<PackageType>,
    pub target_frameworks: Vec<String>,
}

impl Package {
    /// A listed package with empty metadata; prerelease and SemVer level
    /// are derived from the version
    pub fn new(id: impl Into<String>, version: PackageVersion) -> Self {
        Self {
            id: id.into(),
            is_prerelease: version.is_prerelease(),
            semver_level: SemVerLevel::for_version(&version),
            version,
            authors: Vec::new(),
            description: String::new(),
            downloads: 0,
            has_readme: false,
            has_embedded_icon: false,
            has_embedded_license: false,
            listed: true,
            published: Utc::now(),
            require_license_acceptance: false,
            language: None,
            min_client_version: None,
            release_notes: None,
            summary: None,
            title: None,
            icon_url: None,
            license_url: None,
            project_url: None,
            repository_url: None,
            repository_type: None,
            tags: Vec::new(),
            dependencies: Vec::new(),
            package_types: Vec::new(),
            target_frameworks: Vec::new(),
        }
    }

    pub fn identity(&self) -> PackageIdentity {
        PackageIdentity::new(self.id.clone(), self.version.clone())
    }

    /// Icon either embedded in the archive or referenced by URL
    pub fn has_icon(&self) -> bool {
        self.has_embedded_icon || self.icon_url.is_some()
    }

    pub fn is_semver2(&self) -> bool {
        self.semver_level == SemVerLevel::SemVer2
    }
}

/// All known versions of one package id
#[derive(Debug, Clone)]
pub struct PackageRegistration {
    pub package_id: String,
    pub packages: Vec<Package>,
}

impl PackageRegistration {
    pub fn new(package_id: impl Into<String>, packages: Vec<Package>) -> Self {
        Self {
            package_id: package_id.into(),
            packages,
        }
    }
}
