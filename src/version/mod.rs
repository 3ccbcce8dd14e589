// src/version/mod.rs

//! Package version parsing and comparison
//!
//! Feed versions have the form `major.minor[.patch[.revision]][-release][+metadata]`.
//! Release labels follow SemVer 2 precedence (compared case-insensitively),
//! and build metadata never participates in equality or ordering.

use crate::error::{Error, Result};
use semver::{BuildMetadata, Prerelease};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A parsed package version
#[derive(Debug, Clone)]
pub struct PackageVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub revision: u64,
    /// Release labels as written, without the leading '-'
    release: String,
    /// Build metadata as written, without the leading '+'
    metadata: Option<String>,
    /// Lowercased release labels, used for precedence
    precedence: Prerelease,
}

impl PackageVersion {
    /// Parse a version string
    ///
    /// Examples:
    /// - "1.0" → 1.0.0
    /// - "1.2.3.4" → 1.2.3.4
    /// - "2.0.0-Beta.1+sha.abc" → release "Beta.1", metadata "sha.abc"
    pub fn parse(s: &str) -> Result<Self> {
        let input = s.trim();
        let invalid = || Error::InvalidVersion(s.to_string());

        let (rest, metadata) = match input.split_once('+') {
            Some((r, m)) => {
                if m.is_empty() || BuildMetadata::new(m).is_err() {
                    return Err(invalid());
                }
                (r, Some(m.to_string()))
            }
            None => (input, None),
        };

        let (numbers, release) = match rest.split_once('-') {
            Some((n, r)) => {
                if r.is_empty() {
                    return Err(invalid());
                }
                (n, r.to_string())
            }
            None => (rest, String::new()),
        };

        let parts: Vec<&str> = numbers.split('.').collect();
        if parts.len() < 2 || parts.len() > 4 {
            return Err(invalid());
        }

        let mut values = [0u64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            *slot = part.parse().map_err(|_| invalid())?;
        }

        let precedence = if release.is_empty() {
            Prerelease::EMPTY
        } else {
            Prerelease::new(&release.to_ascii_lowercase()).map_err(|_| invalid())?
        };

        Ok(Self {
            major: values[0],
            minor: values[1],
            patch: values[2],
            revision: values[3],
            release,
            metadata,
            precedence,
        })
    }

    /// Release labels, empty for a stable version
    pub fn release(&self) -> &str {
        &self.release
    }

    pub fn metadata(&self) -> Option<&str> {
        self.metadata.as_deref()
    }

    pub fn is_prerelease(&self) -> bool {
        !self.release.is_empty()
    }

    /// Versions that older SemVer 1 clients cannot understand
    pub fn is_semver2(&self) -> bool {
        self.metadata.is_some() || self.release.contains('.')
    }

    /// `major.minor.patch[.revision][-release]`, revision only when non-zero
    pub fn to_normalized_string(&self) -> String {
        let mut out = format!("{}.{}.{}", self.major, self.minor, self.patch);
        if self.revision > 0 {
            out.push_str(&format!(".{}", self.revision));
        }
        if !self.release.is_empty() {
            out.push('-');
            out.push_str(&self.release);
        }
        out
    }

    /// Normalized form plus build metadata
    pub fn to_full_string(&self) -> String {
        match &self.metadata {
            Some(metadata) => format!("{}+{}", self.to_normalized_string(), metadata),
            None => self.to_normalized_string(),
        }
    }

    fn numbers(&self) -> (u64, u64, u64, u64) {
        (self.major, self.minor, self.patch, self.revision)
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_full_string())
    }
}

impl FromStr for PackageVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PackageVersion {}

impl Hash for PackageVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.numbers().hash(state);
        self.precedence.as_str().hash(state);
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.numbers()
            .cmp(&other.numbers())
            .then_with(|| self.precedence.cmp(&other.precedence))
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for PackageVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_full_string())
    }
}

impl<'de> Deserialize<'de> for PackageVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
