// src/search/filters.rs

use crate::model::Package;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// The four compatibility partitions of the search index
///
/// Bit 0 admits prerelease versions, bit 1 admits SemVer 2 versions. The
/// variant names are part of every document key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
pub enum SearchFilters {
    #[default]
    Default = 0,
    IncludePrerelease = 1,
    IncludeSemVer2 = 2,
    IncludePrereleaseAndSemVer2 = 3,
}

impl SearchFilters {
    pub fn new(include_prerelease: bool, include_semver2: bool) -> Self {
        match (include_prerelease, include_semver2) {
            (false, false) => SearchFilters::Default,
            (true, false) => SearchFilters::IncludePrerelease,
            (false, true) => SearchFilters::IncludeSemVer2,
            (true, true) => SearchFilters::IncludePrereleaseAndSemVer2,
        }
    }

    pub fn includes_prerelease(self) -> bool {
        (self as u8) & 1 != 0
    }

    pub fn includes_semver2(self) -> bool {
        (self as u8) & 2 != 0
    }

    /// Whether `package` belongs to this partition; unlisted versions
    /// belong to none
    pub fn matches(self, package: &Package) -> bool {
        package.listed
            && (self.includes_prerelease() || !package.is_prerelease)
            && (self.includes_semver2() || !package.is_semver2())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::PackageVersion;
    use strum::IntoEnumIterator;

    fn package(version: &str) -> Package {
        Package::new("MyLib", PackageVersion::parse(version).unwrap())
    }

    #[test]
    fn test_names_and_order() {
        let names: Vec<String> = SearchFilters::iter().map(|f| f.to_string()).collect();
        assert_eq!(
            names,
            ["Default", "IncludePrerelease", "IncludeSemVer2", "IncludePrereleaseAndSemVer2"]
        );
        assert_eq!(SearchFilters::new(true, true), SearchFilters::IncludePrereleaseAndSemVer2);
        assert_eq!(SearchFilters::new(false, true), SearchFilters::IncludeSemVer2);
    }

    #[test]
    fn test_partition_membership() {
        let stable = package("1.0.0");
        let beta = package("2.0.0-beta");
        let semver2 = package("3.0.0+meta");

        let members = |filter: SearchFilters| -> Vec<bool> {
            [&stable, &beta, &semver2].iter().map(|p| filter.matches(p)).collect()
        };

        assert_eq!(members(SearchFilters::Default), [true, false, false]);
        assert_eq!(members(SearchFilters::IncludePrerelease), [true, true, false]);
        assert_eq!(members(SearchFilters::IncludeSemVer2), [true, false, true]);
        assert_eq!(members(SearchFilters::IncludePrereleaseAndSemVer2), [true, true, true]);
    }

    #[test]
    fn test_unlisted_matches_nothing() {
        let mut unlisted = package("1.0.0");
        unlisted.listed = false;
        assert!(SearchFilters::iter().all(|f| !f.matches(&unlisted)));
    }
}
