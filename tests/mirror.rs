// tests/mirror.rs

//! Read-through mirroring against a fake V3 feed.

mod common;

use common::UpstreamPackage;
use nuvault::{IndexingResult, PackageIndexer, PackageVersion, Registry};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn v(s: &str) -> PackageVersion {
    PackageVersion::parse(s).unwrap()
}

#[tokio::test]
async fn test_fetch_mirrors_once() {
    let server = common::upstream_feed(&[UpstreamPackage::new("Remote.Lib", "1.0.0")]).await;
    let (temp_dir, registry) = common::mirroring_registry(&server);
    let token = CancellationToken::new();

    let package = registry
        .packages
        .find_or_null("remote.lib", &v("1.0.0"), &token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(package.id, "Remote.Lib");
    assert!(
        temp_dir
            .path()
            .join("content/packages/remote.lib/1.0.0/remote.lib.1.0.0.nupkg")
            .exists()
    );

    // Second lookup is served locally
    assert!(registry.packages.exists("Remote.Lib", &v("1.0.0"), &token).await.unwrap());

    let snapshot = registry.metrics.snapshot();
    assert_eq!(snapshot.upstream_fetches, 1);
    assert_eq!(snapshot.packages_mirrored, 1);
    assert_eq!(snapshot.mirror_hits, 1);
}

#[tokio::test]
async fn test_unknown_upstream_version_is_absent() {
    let server = common::upstream_feed(&[UpstreamPackage::new("Remote.Lib", "1.0.0")]).await;
    let (_temp_dir, registry) = common::mirroring_registry(&server);
    let token = CancellationToken::new();

    assert!(
        registry
            .packages
            .find_or_null("Remote.Lib", &v("9.9.9"), &token)
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(registry.metrics.snapshot().upstream_misses, 1);
}

#[tokio::test]
async fn test_versions_merge_local_and_upstream() {
    let server = common::upstream_feed(&[
        UpstreamPackage::new("Remote.Lib", "1.0.0"),
        UpstreamPackage::new("Remote.Lib", "2.0.0"),
    ])
    .await;
    let (_temp_dir, registry) = common::mirroring_registry(&server);
    let token = CancellationToken::new();

    let pushed = common::nupkg("Remote.Lib", "1.5.0", &[]);
    assert_eq!(
        registry.indexer.index(pushed, &token).await.unwrap(),
        IndexingResult::Success
    );

    let versions = registry.packages.find_versions("Remote.Lib", &token).await.unwrap();
    assert_eq!(versions, vec![v("1.0.0"), v("1.5.0"), v("2.0.0")]);

    let packages = registry.packages.find_packages("Remote.Lib", &token).await.unwrap();
    let descriptions: Vec<&str> = packages.iter().map(|p| p.description.as_str()).collect();
    assert_eq!(
        descriptions,
        vec![
            "Remote.Lib from upstream",
            "Remote.Lib for integration tests",
            "Remote.Lib from upstream",
        ]
    );
}

#[tokio::test]
async fn test_local_metadata_wins() {
    let server = common::upstream_feed(&[UpstreamPackage::new("Remote.Lib", "1.0.0")]).await;
    let (_temp_dir, registry) = common::mirroring_registry(&server);
    let token = CancellationToken::new();

    // Mirror it, then list again
    assert!(registry.packages.exists("Remote.Lib", &v("1.0.0"), &token).await.unwrap());
    let packages = registry.packages.find_packages("Remote.Lib", &token).await.unwrap();
    assert_eq!(packages.len(), 1);
    assert_eq!(packages[0].description, "Remote.Lib for integration tests");
}

#[tokio::test]
async fn test_excluded_ids_stay_local() {
    let server = common::upstream_feed(&[UpstreamPackage::new("Internal.Lib", "1.0.0")]).await;
    let temp_dir = TempDir::new().unwrap();
    let mut config = common::config(&temp_dir);
    config.mirror.enabled = true;
    config.mirror.package_source = Some(format!("{}/v3/index.json", server.uri()));
    config.mirror.exclude = vec!["^Internal\\.".to_string()];
    let registry = Registry::open(&config).unwrap();
    let token = CancellationToken::new();

    assert!(!registry.packages.exists("Internal.Lib", &v("1.0.0"), &token).await.unwrap());
    assert!(registry.packages.find_versions("Internal.Lib", &token).await.unwrap().is_empty());
    assert_eq!(registry.metrics.snapshot().upstream_fetches, 0);
}

#[tokio::test]
async fn test_unreachable_upstream_degrades_to_local() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = common::config(&temp_dir);
    config.mirror.enabled = true;
    // Nothing listens on the discard port
    config.mirror.package_source = Some("http://127.0.0.1:9/v3/index.json".to_string());
    config.mirror.timeout = "5s".to_string();
    let registry = Registry::open(&config).unwrap();
    let token = CancellationToken::new();

    registry
        .indexer
        .index(common::nupkg("MyLib", "1.0.0", &[]), &token)
        .await
        .unwrap();

    let versions = registry.packages.find_versions("MyLib", &token).await.unwrap();
    assert_eq!(versions, vec![v("1.0.0")]);
    assert!(!registry.packages.exists("MyLib", &v("2.0.0"), &token).await.unwrap());
    assert!(registry.metrics.snapshot().upstream_errors >= 1);
}

#[tokio::test]
async fn test_mirroring_disabled() {
    let server = common::upstream_feed(&[UpstreamPackage::new("Remote.Lib", "1.0.0")]).await;
    let (_temp_dir, registry) = common::registry();
    let token = CancellationToken::new();

    assert!(!registry.packages.exists("Remote.Lib", &v("1.0.0"), &token).await.unwrap());
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}
