// src/config.rs
//! Configuration file parsing for the registry
//!
//! Supports TOML configuration files with the following sections:
//! - [database] - Catalog database location
//! - [storage] - Package content backend
//! - [mirror] - Upstream feed and read-through caching
//! - [search] - Search index backend and batching
//! - [registry] - Deletion behavior

use crate::deletion::PackageDeletionBehavior;
use crate::search::{DEFAULT_API_VERSION, DEFAULT_MAX_BATCH_ACTIONS};
use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub database: DatabaseSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub mirror: MirrorSection,

    #[serde(default)]
    pub search: SearchSection,

    #[serde(default)]
    pub registry: RegistrySection,
}

/// Catalog database section
#[derive(Debug, Deserialize)]
pub struct DatabaseSection {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/nuvault.db")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    #[default]
    FileSystem,
    Database,
    ObjectStore,
    Null,
}

/// Package content section
#[derive(Debug, Deserialize)]
pub struct StorageSection {
    #[serde(rename = "type", default)]
    pub storage_type: StorageType,

    /// Root directory for file system storage
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,

    /// Object store location (`memory:///`, `file:///...`, `s3://bucket/prefix`)
    pub url: Option<String>,

    /// Base URL clients download object store content from
    pub public_url: Option<String>,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            storage_type: StorageType::default(),
            path: default_storage_path(),
            url: None,
            public_url: None,
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("data")
}

/// Upstream mirror section
#[derive(Debug, Deserialize)]
pub struct MirrorSection {
    #[serde(default)]
    pub enabled: bool,

    /// V3 service index of the upstream feed
    pub package_source: Option<String>,

    /// HTTP timeout for upstream requests
    #[serde(default = "default_mirror_timeout")]
    pub timeout: String,

    /// Package id patterns never taken from upstream
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for MirrorSection {
    fn default() -> Self {
        Self {
            enabled: false,
            package_source: None,
            timeout: default_mirror_timeout(),
            exclude: Vec::new(),
        }
    }
}

fn default_mirror_timeout() -> String {
    "600s".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    #[default]
    Memory,
    Azure,
    Null,
}

/// Search index section
#[derive(Debug, Deserialize)]
pub struct SearchSection {
    #[serde(rename = "type", default)]
    pub search_type: SearchType,

    /// Snapshot file for the memory backend; unset keeps it in-process only
    #[serde(default = "default_search_path")]
    pub path: Option<PathBuf>,

    /// Search service endpoint (azure)
    pub endpoint: Option<String>,

    #[serde(default = "default_index")]
    pub index: String,

    pub api_key: Option<String>,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_search_timeout")]
    pub timeout: String,

    /// Most actions sent in one request
    #[serde(default = "default_max_batch_actions")]
    pub max_batch_actions: usize,

    /// Largest request body the memory backend accepts (e.g. "16MB")
    pub max_batch_bytes: Option<String>,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            search_type: SearchType::default(),
            path: default_search_path(),
            endpoint: None,
            index: default_index(),
            api_key: None,
            api_version: default_api_version(),
            timeout: default_search_timeout(),
            max_batch_actions: default_max_batch_actions(),
            max_batch_bytes: None,
        }
    }
}

fn default_search_path() -> Option<PathBuf> {
    Some(PathBuf::from("data/search.json"))
}

fn default_index() -> String {
    "packages".to_string()
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_search_timeout() -> String {
    "30s".to_string()
}

fn default_max_batch_actions() -> usize {
    DEFAULT_MAX_BATCH_ACTIONS
}

/// Registry behavior section
#[derive(Debug, Default, Deserialize)]
pub struct RegistrySection {
    #[serde(default)]
    pub package_deletion_behavior: PackageDeletionBehavior,
}

/// A package's actions must fit in one batch
const MIN_BATCH_ACTIONS: usize = 4;

impl RegistryConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: RegistryConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.storage.storage_type {
            StorageType::FileSystem if self.storage.path.as_os_str().is_empty() => {
                anyhow::bail!("storage.path is required for file_system storage");
            }
            StorageType::ObjectStore => {
                let url = self
                    .storage
                    .url
                    .as_deref()
                    .context("storage.url is required for object_store storage")?;
                Url::parse(url).with_context(|| format!("Invalid storage.url: {}", url))?;
            }
            _ => {}
        }
        if let Some(public_url) = &self.storage.public_url {
            Url::parse(public_url).with_context(|| format!("Invalid storage.public_url: {}", public_url))?;
        }

        if self.mirror.enabled {
            let source = self
                .mirror
                .package_source
                .as_deref()
                .context("mirror.package_source is required when mirroring is enabled")?;
            Url::parse(source).with_context(|| format!("Invalid mirror.package_source: {}", source))?;
        }
        self.mirror_timeout()?;
        self.exclude_patterns()?;

        if self.search.max_batch_actions < MIN_BATCH_ACTIONS {
            anyhow::bail!(
                "search.max_batch_actions must be at least {}, got {}",
                MIN_BATCH_ACTIONS,
                self.search.max_batch_actions
            );
        }
        if self.search.search_type == SearchType::Azure {
            let endpoint = self
                .search
                .endpoint
                .as_deref()
                .context("search.endpoint is required for azure search")?;
            Url::parse(endpoint).with_context(|| format!("Invalid search.endpoint: {}", endpoint))?;
            if self.search.api_key.as_deref().is_none_or(str::is_empty) {
                anyhow::bail!("search.api_key is required for azure search");
            }
        }
        self.search_timeout()?;
        self.max_batch_bytes()?;

        Ok(())
    }

    pub fn mirror_timeout(&self) -> Result<Duration> {
        parse_duration(&self.mirror.timeout)
    }

    pub fn search_timeout(&self) -> Result<Duration> {
        parse_duration(&self.search.timeout)
    }

    /// Compiled `mirror.exclude` patterns
    pub fn exclude_patterns(&self) -> Result<Vec<Regex>> {
        self.mirror
            .exclude
            .iter()
            .map(|pattern| {
                Regex::new(pattern).with_context(|| format!("Invalid mirror.exclude pattern: {}", pattern))
            })
            .collect()
    }

    pub fn max_batch_bytes(&self) -> Result<Option<u64>> {
        self.search.max_batch_bytes.as_deref().map(parse_size).transpose()
    }
}

/// Parse a human-readable size string (e.g., "16MB", "1GB", "512KB")
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim().to_uppercase();

    let (num_str, multiplier) = if let Some(num) = s.strip_suffix("GB") {
        (num, 1024u64 * 1024 * 1024)
    } else if let Some(num) = s.strip_suffix("MB") {
        (num, 1024u64 * 1024)
    } else if let Some(num) = s.strip_suffix("KB") {
        (num, 1024u64)
    } else if let Some(num) = s.strip_suffix('B') {
        (num, 1u64)
    } else {
        (s.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .with_context(|| format!("Invalid size number: {}", num_str))?;

    Ok((num * multiplier as f64) as u64)
}

/// Parse a human-readable duration string (e.g., "15m", "1h", "30s")
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();

    let (num_str, multiplier) = if let Some(num) = s.strip_suffix('h') {
        (num, 60 * 60)
    } else if let Some(num) = s.strip_suffix('m') {
        (num, 60)
    } else if let Some(num) = s.strip_suffix('s') {
        (num, 1)
    } else {
        (s.as_str(), 1)
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .with_context(|| format!("Invalid duration number: {}", num_str))?;

    Ok(Duration::from_secs(num * multiplier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("1KB").unwrap(), 1024);
        assert_eq!(parse_size("16MB").unwrap(), 16 * 1024 * 1024);
        assert_eq!(parse_size("1.5GB").unwrap(), (1.5 * 1024.0 * 1024.0 * 1024.0) as u64);
        assert!(parse_size("lots").is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("600s").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("15m").unwrap(), Duration::from_secs(15 * 60));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.storage.storage_type, StorageType::FileSystem);
        assert_eq!(config.search.search_type, SearchType::Memory);
        assert_eq!(config.search.max_batch_actions, 1000);
        assert_eq!(config.registry.package_deletion_behavior, PackageDeletionBehavior::Unlist);
        assert!(!config.mirror.enabled);
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[database]
path = "/var/lib/nuvault/nuvault.db"

[storage]
type = "object_store"
url = "s3://packages/nuvault"
public_url = "https://cdn.example.com/"

[mirror]
enabled = true
package_source = "https://api.nuget.org/v3/index.json"
timeout = "2m"
exclude = ["^Internal\\."]

[search]
type = "azure"
endpoint = "https://example.search.windows.net"
api_key = "secret"
max_batch_actions = 500

[registry]
package_deletion_behavior = "hard_delete"
"#;
        let config: RegistryConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.storage.storage_type, StorageType::ObjectStore);
        assert_eq!(config.mirror_timeout().unwrap(), Duration::from_secs(120));
        assert!(config.exclude_patterns().unwrap()[0].is_match("Internal.Tools"));
        assert_eq!(config.search.index, "packages");
        assert_eq!(config.registry.package_deletion_behavior, PackageDeletionBehavior::HardDelete);
    }

    #[test]
    fn test_mirror_requires_source() {
        let config: RegistryConfig = toml::from_str("[mirror]\nenabled = true\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_exclude_pattern() {
        let config: RegistryConfig = toml::from_str("[mirror]\nexclude = [\"(unclosed\"]\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_batch_limit_must_hold_a_package() {
        let config: RegistryConfig = toml::from_str("[search]\nmax_batch_actions = 0\n").unwrap();
        assert!(config.validate().is_err());

        let config: RegistryConfig = toml::from_str("[search]\nmax_batch_actions = 4\n").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_azure_requires_credentials() {
        let config: RegistryConfig =
            toml::from_str("[search]\ntype = \"azure\"\nendpoint = \"https://example.search.windows.net\"\n")
                .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_object_store_requires_url() {
        let config: RegistryConfig = toml::from_str("[storage]\ntype = \"object_store\"\n").unwrap();
        assert!(config.validate().is_err());
    }
}
