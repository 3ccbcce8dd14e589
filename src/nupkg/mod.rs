// src/nupkg/mod.rs

//! Package archive (`.nupkg`) reading
//!
//! A `.nupkg` is a zip file with a `.nuspec` manifest at its root. Reading
//! an archive yields the catalog [`Package`] plus the blobs the registry
//! stores next to the archive: the manifest, and the readme and icon when
//! the manifest points at them.

pub mod nuspec;

use crate::error::{Error, Result};
use crate::model::{Package, PackageDependency, PackageType};
use crate::version::PackageVersion;
use bytes::Bytes;
use nuspec::{Nuspec, NuspecDependency};
use std::io::{Cursor, Read};
use zip::ZipArchive;

const AUTHOR_SEPARATORS: &[char] = &[',', ';', '\t', '\n', '\r'];
const TAG_SEPARATORS: &[char] = &[',', ';', ' ', '\t', '\n', '\r'];

/// Largest uncompressed entry read from an archive
const MAX_ENTRY_SIZE: u64 = 256 * 1024 * 1024;

/// Folders whose first-level children are target framework monikers
const FRAMEWORK_FOLDERS: &[&str] = &["lib", "ref", "build", "buildTransitive"];

/// A parsed package archive
#[derive(Debug)]
pub struct PackageArchive {
    pub package: Package,
    pub manifest: Bytes,
    pub readme: Option<Bytes>,
    pub icon: Option<Bytes>,
}

impl PackageArchive {
    /// Parse an archive held in memory
    pub fn read(data: &[u8]) -> Result<Self> {
        let mut zip = ZipArchive::new(Cursor::new(data)).map_err(invalid)?;

        let entries: Vec<String> = zip.file_names().map(str::to_string).collect();
        let manifest_name = entries
            .iter()
            .find(|name| !name.contains('/') && name.to_ascii_lowercase().ends_with(".nuspec"))
            .cloned()
            .ok_or_else(|| Error::InvalidPackage("archive has no .nuspec manifest".to_string()))?;

        let manifest = read_entry(&mut zip, &manifest_name)?;
        let xml = std::str::from_utf8(&manifest)
            .map_err(|e| Error::InvalidPackage(format!("manifest is not UTF-8: {e}")))?;
        let metadata = Nuspec::parse(xml)?.metadata;

        let readme = match &metadata.readme {
            Some(path) => Some(read_referenced(&mut zip, &entries, path, "readme")?),
            None => None,
        };
        let icon = match &metadata.icon {
            Some(path) => Some(read_referenced(&mut zip, &entries, path, "icon")?),
            None => None,
        };

        let version = PackageVersion::parse(&metadata.version)
            .map_err(|_| Error::InvalidPackage(format!("invalid version '{}'", metadata.version)))?;
        if metadata.id.trim().is_empty() {
            return Err(Error::InvalidPackage("package id is empty".to_string()));
        }

        let mut package = Package::new(metadata.id.trim(), version);
        package.authors = split_list(&metadata.authors, AUTHOR_SEPARATORS);
        package.description = metadata.description.unwrap_or_default();
        package.has_readme = readme.is_some();
        package.has_embedded_icon = icon.is_some();
        package.has_embedded_license = metadata.license.as_ref().is_some_and(|l| l.is_file());
        package.require_license_acceptance = metadata
            .require_license_acceptance
            .as_deref()
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
        package.language = non_empty(metadata.language);
        package.min_client_version = non_empty(metadata.min_client_version);
        package.release_notes = non_empty(metadata.release_notes);
        package.summary = non_empty(metadata.summary);
        package.title = non_empty(metadata.title);
        package.icon_url = non_empty(metadata.icon_url);
        package.license_url = non_empty(metadata.license_url);
        package.project_url = non_empty(metadata.project_url);
        if let Some(repository) = metadata.repository {
            package.repository_url = non_empty(repository.url);
            package.repository_type = non_empty(repository.repository_type);
        }
        package.tags = metadata
            .tags
            .as_deref()
            .map(|t| split_list(t, TAG_SEPARATORS))
            .unwrap_or_default();
        package.dependencies = metadata
            .dependencies
            .map(|deps| dependencies(deps.groups, deps.dependencies))
            .unwrap_or_default();
        package.package_types = metadata
            .package_types
            .map(|types| {
                types
                    .package_types
                    .into_iter()
                    .map(|t| PackageType {
                        name: t.name,
                        version: t.version,
                    })
                    .collect()
            })
            .unwrap_or_default();
        package.target_frameworks = target_frameworks(&entries);

        Ok(Self {
            package,
            manifest: Bytes::from(manifest),
            readme: readme.map(Bytes::from),
            icon: icon.map(Bytes::from),
        })
    }
}

fn invalid(err: zip::result::ZipError) -> Error {
    Error::InvalidPackage(format!("unreadable archive: {err}"))
}

fn read_entry(zip: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Result<Vec<u8>> {
    let entry = zip.by_name(name).map_err(invalid)?;
    if entry.size() > MAX_ENTRY_SIZE {
        return Err(Error::InvalidPackage(format!(
            "{} declares {} bytes, more than the {} byte limit",
            name,
            entry.size(),
            MAX_ENTRY_SIZE
        )));
    }

    // The declared size is untrusted; bound the read itself too
    let mut buf = Vec::new();
    entry
        .take(MAX_ENTRY_SIZE + 1)
        .read_to_end(&mut buf)
        .map_err(|e| Error::InvalidPackage(format!("failed to read {}: {e}", name)))?;
    if buf.len() as u64 > MAX_ENTRY_SIZE {
        return Err(Error::InvalidPackage(format!("{} is larger than {} bytes", name, MAX_ENTRY_SIZE)));
    }
    Ok(buf)
}

/// Read a file the manifest points at, matching the path case-insensitively
fn read_referenced(
    zip: &mut ZipArchive<Cursor<&[u8]>>,
    entries: &[String],
    path: &str,
    what: &str,
) -> Result<Vec<u8>> {
    let wanted = path.trim().replace('\\', "/");
    let wanted = wanted.trim_start_matches("./").trim_start_matches('/');
    let name = entries
        .iter()
        .find(|name| name.eq_ignore_ascii_case(wanted))
        .ok_or_else(|| Error::InvalidPackage(format!("{} '{}' is missing from the archive", what, path)))?;
    read_entry(zip, name)
}

fn split_list(value: &str, separators: &[char]) -> Vec<String> {
    value
        .split(separators)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Flatten dependency groups; a group without dependencies keeps an entry
/// with no id so its framework is still recorded
fn dependencies(
    groups: Vec<nuspec::NuspecDependencyGroup>,
    ungrouped: Vec<NuspecDependency>,
) -> Vec<PackageDependency> {
    let mut result = Vec::new();

    for dep in ungrouped {
        result.push(PackageDependency {
            id: Some(dep.id),
            version_range: dep.version,
            target_framework: None,
        });
    }

    for group in groups {
        if group.dependencies.is_empty() {
            result.push(PackageDependency {
                id: None,
                version_range: None,
                target_framework: group.target_framework.clone(),
            });
        }
        for dep in group.dependencies {
            result.push(PackageDependency {
                id: Some(dep.id),
                version_range: dep.version,
                target_framework: group.target_framework.clone(),
            });
        }
    }

    result
}

/// Distinct, lowercased framework folder names such as `lib/net6.0/`
fn target_frameworks(entries: &[String]) -> Vec<String> {
    let mut frameworks: Vec<String> = Vec::new();
    for name in entries {
        let mut parts = name.split('/');
        let (Some(folder), Some(tfm), Some(_file)) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        if !FRAMEWORK_FOLDERS.iter().any(|f| f.eq_ignore_ascii_case(folder)) || tfm.is_empty() {
            continue;
        }
        let tfm = tfm.to_lowercase();
        if !frameworks.contains(&tfm) {
            frameworks.push(tfm);
        }
    }
    frameworks.sort();
    frameworks
}
