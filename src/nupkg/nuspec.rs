// src/nupkg/nuspec.rs

//! `.nuspec` manifest model
//!
//! Only the metadata the registry indexes is modelled; unknown elements
//! are skipped.

use crate::error::{Error, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Nuspec {
    pub metadata: NuspecMetadata,
}

impl Nuspec {
    pub fn parse(xml: &str) -> Result<Self> {
        let xml = xml.trim_start_matches('\u{feff}');
        quick_xml::de::from_str(xml).map_err(|e| Error::InvalidPackage(format!("Invalid nuspec: {e}")))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NuspecMetadata {
    #[serde(rename = "@minClientVersion")]
    pub min_client_version: Option<String>,
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub authors: String,
    pub description: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub release_notes: Option<String>,
    pub language: Option<String>,
    pub tags: Option<String>,
    pub icon: Option<String>,
    pub icon_url: Option<String>,
    pub readme: Option<String>,
    pub license: Option<NuspecLicense>,
    pub license_url: Option<String>,
    pub project_url: Option<String>,
    pub require_license_acceptance: Option<String>,
    pub repository: Option<NuspecRepository>,
    pub dependencies: Option<NuspecDependencies>,
    pub package_types: Option<NuspecPackageTypes>,
}

#[derive(Debug, Deserialize)]
pub struct NuspecLicense {
    #[serde(rename = "@type")]
    pub license_type: Option<String>,
    #[serde(rename = "$text", default)]
    pub value: String,
}

impl NuspecLicense {
    /// A license file shipped inside the archive
    pub fn is_file(&self) -> bool {
        self.license_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("file"))
    }
}

#[derive(Debug, Deserialize)]
pub struct NuspecRepository {
    #[serde(rename = "@type")]
    pub repository_type: Option<String>,
    #[serde(rename = "@url")]
    pub url: Option<String>,
}

/// Either framework-specific groups or a flat dependency list
#[derive(Debug, Default, Deserialize)]
pub struct NuspecDependencies {
    #[serde(rename = "group", default)]
    pub groups: Vec<NuspecDependencyGroup>,
    #[serde(rename = "dependency", default)]
    pub dependencies: Vec<NuspecDependency>,
}

#[derive(Debug, Deserialize)]
pub struct NuspecDependencyGroup {
    #[serde(rename = "@targetFramework")]
    pub target_framework: Option<String>,
    #[serde(rename = "dependency", default)]
    pub dependencies: Vec<NuspecDependency>,
}

#[derive(Debug, Deserialize)]
pub struct NuspecDependency {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@version")]
    pub version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NuspecPackageTypes {
    #[serde(rename = "packageType", default)]
    pub package_types: Vec<NuspecPackageType>,
}

#[derive(Debug, Deserialize)]
pub struct NuspecPackageType {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@version")]
    pub version: Option<String>,
}
