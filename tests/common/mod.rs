// tests/common/mod.rs

//! Shared helpers for integration tests: package archives, a throwaway
//! registry and a fake upstream feed.

#![allow(dead_code)]

use bytes::Bytes;
use nuvault::{Registry, RegistryConfig};
use std::io::{Cursor, Write};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::SimpleFileOptions;

/// Build a .nupkg with a minimal manifest plus `files`
pub fn nupkg(id: &str, version: &str, files: &[(&str, &[u8])]) -> Bytes {
    nupkg_with_metadata(id, version, "", files)
}

pub fn nupkg_with_metadata(id: &str, version: &str, extra_metadata: &str, files: &[(&str, &[u8])]) -> Bytes {
    let nuspec = format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd">
  <metadata>
    <id>{id}</id>
    <version>{version}</version>
    <authors>Integration</authors>
    <description>{id} for integration tests</description>
    {extra_metadata}
  </metadata>
</package>"#
    );

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    zip.start_file(format!("{}.nuspec", id), options).unwrap();
    zip.write_all(nuspec.as_bytes()).unwrap();
    for (name, data) in files {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    Bytes::from(zip.finish().unwrap().into_inner())
}

/// A config rooted in `temp_dir` with file storage and a persisted memory index
pub fn config(temp_dir: &TempDir) -> RegistryConfig {
    let mut config = RegistryConfig::default();
    config.database.path = temp_dir.path().join("nuvault.db");
    config.storage.path = temp_dir.path().join("content");
    config.search.path = Some(temp_dir.path().join("search.json"));
    config
}

/// Open a registry on a fresh temp dir; keep the TempDir alive
pub fn registry() -> (TempDir, Registry) {
    let temp_dir = TempDir::new().unwrap();
    let registry = Registry::open(&config(&temp_dir)).unwrap();
    (temp_dir, registry)
}

/// One package served by [`upstream_feed`]
pub struct UpstreamPackage {
    pub id: &'static str,
    pub version: &'static str,
    pub listed: bool,
}

impl UpstreamPackage {
    pub fn new(id: &'static str, version: &'static str) -> Self {
        Self {
            id,
            version,
            listed: true,
        }
    }
}

/// Start a V3 feed serving `packages`, all under a single package id
pub async fn upstream_feed(packages: &[UpstreamPackage]) -> MockServer {
    let server = MockServer::start().await;
    let uri = server.uri();

    Mock::given(method("GET"))
        .and(path("/v3/index.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "version": "3.0.0",
            "resources": [
                { "@id": format!("{}/flat/", uri), "@type": "PackageBaseAddress/3.0.0" },
                { "@id": format!("{}/reg/", uri), "@type": "RegistrationsBaseUrl/3.6.0" }
            ]
        })))
        .mount(&server)
        .await;

    if let Some(first) = packages.first() {
        let lower_id = first.id.to_lowercase();
        let versions: Vec<String> = packages.iter().map(|p| p.version.to_lowercase()).collect();

        Mock::given(method("GET"))
            .and(path(format!("/flat/{}/index.json", lower_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "versions": versions })))
            .mount(&server)
            .await;

        let leaves: Vec<serde_json::Value> = packages
            .iter()
            .map(|p| {
                serde_json::json!({
                    "catalogEntry": {
                        "id": p.id,
                        "version": p.version,
                        "authors": "Upstream",
                        "description": format!("{} from upstream", p.id),
                        "listed": p.listed,
                        "published": "2021-06-01T00:00:00+00:00"
                    }
                })
            })
            .collect();
        Mock::given(method("GET"))
            .and(path(format!("/reg/{}/index.json", lower_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{ "@id": format!("{}/reg/{}/page.json", uri, lower_id), "items": leaves }]
            })))
            .mount(&server)
            .await;

        for package in packages {
            let lower_version = package.version.to_lowercase();
            Mock::given(method("GET"))
                .and(path(format!(
                    "/flat/{0}/{1}/{0}.{1}.nupkg",
                    lower_id, lower_version
                )))
                .respond_with(
                    ResponseTemplate::new(200).set_body_bytes(nupkg(package.id, package.version, &[]).to_vec()),
                )
                .mount(&server)
                .await;
        }
    }

    // Anything else is unknown to the feed
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .with_priority(10)
        .mount(&server)
        .await;

    server
}

/// A registry that mirrors from `server`
pub fn mirroring_registry(server: &MockServer) -> (TempDir, Registry) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = config(&temp_dir);
    config.mirror.enabled = true;
    config.mirror.package_source = Some(format!("{}/v3/index.json", server.uri()));
    config.mirror.timeout = "10s".to_string();
    let registry = Registry::open(&config).unwrap();
    (temp_dir, registry)
}
