// src/catalog/sqlite.rs

//! SQLite catalog
//!
//! List-valued metadata (authors, tags, dependencies, package types,
//! frameworks) is stored as JSON text columns.

use super::{AddResult, PackageCatalog};
use crate::cancel;
use crate::db::SharedConnection;
use crate::error::{Error, Result};
use crate::model::{Package, SemVerLevel};
use crate::version::PackageVersion;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const PACKAGE_COLUMNS: &str = "id, version, authors, description, downloads, has_readme,
    has_embedded_icon, has_embedded_license, is_prerelease, listed, semver_level, published,
    require_license_acceptance, language, min_client_version, release_notes, summary, title,
    icon_url, license_url, project_url, repository_url, repository_type, tags, dependencies,
    package_types, target_frameworks";

pub struct SqliteCatalog {
    conn: SharedConnection,
}

impl SqliteCatalog {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn insert(conn: &Connection, package: &Package) -> Result<()> {
        conn.execute(
            "INSERT INTO packages (id, lower_id, version, lower_version, authors, description,
                downloads, has_readme, has_embedded_icon, has_embedded_license, is_prerelease,
                listed, semver_level, published, require_license_acceptance, language,
                min_client_version, release_notes, summary, title, icon_url, license_url,
                project_url, repository_url, repository_type, tags, dependencies, package_types,
                target_frameworks)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29)",
            params![
                &package.id,
                package.id.to_lowercase(),
                package.version.to_full_string(),
                lower_version(&package.version),
                serde_json::to_string(&package.authors)?,
                &package.description,
                package.downloads,
                package.has_readme,
                package.has_embedded_icon,
                package.has_embedded_license,
                package.is_prerelease,
                package.listed,
                package.semver_level.to_string(),
                package.published.to_rfc3339(),
                package.require_license_acceptance,
                &package.language,
                &package.min_client_version,
                &package.release_notes,
                &package.summary,
                &package.title,
                &package.icon_url,
                &package.license_url,
                &package.project_url,
                &package.repository_url,
                &package.repository_type,
                serde_json::to_string(&package.tags)?,
                serde_json::to_string(&package.dependencies)?,
                serde_json::to_string(&package.package_types)?,
                serde_json::to_string(&package.target_frameworks)?,
            ],
        )?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Package> {
        let version: String = row.get(1)?;
        let semver_level: String = row.get(10)?;
        let published: String = row.get(11)?;

        Ok(Package {
            id: row.get(0)?,
            version: PackageVersion::parse(&version).map_err(|e| conversion_error(1, e))?,
            authors: json_column(row, 2)?,
            description: row.get(3)?,
            downloads: row.get(4)?,
            has_readme: row.get(5)?,
            has_embedded_icon: row.get(6)?,
            has_embedded_license: row.get(7)?,
            is_prerelease: row.get(8)?,
            listed: row.get(9)?,
            semver_level: semver_level
                .parse::<SemVerLevel>()
                .map_err(|e| conversion_error(10, e))?,
            published: DateTime::parse_from_rfc3339(&published)
                .map_err(|e| conversion_error(11, e))?
                .with_timezone(&Utc),
            require_license_acceptance: row.get(12)?,
            language: row.get(13)?,
            min_client_version: row.get(14)?,
            release_notes: row.get(15)?,
            summary: row.get(16)?,
            title: row.get(17)?,
            icon_url: row.get(18)?,
            license_url: row.get(19)?,
            project_url: row.get(20)?,
            repository_url: row.get(21)?,
            repository_type: row.get(22)?,
            tags: json_column(row, 23)?,
            dependencies: json_column(row, 24)?,
            package_types: json_column(row, 25)?,
            target_frameworks: json_column(row, 26)?,
        })
    }

    fn set_listed(&self, id: &str, version: &PackageVersion, listed: bool) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE packages SET listed = ?1 WHERE lower_id = ?2 AND lower_version = ?3",
            params![listed, id.to_lowercase(), lower_version(version)],
        )?;
        Ok(changed > 0)
    }
}

fn lower_version(version: &PackageVersion) -> String {
    version.to_normalized_string().to_lowercase()
}

fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row, column: usize) -> rusqlite::Result<T> {
    let text: String = row.get(column)?;
    serde_json::from_str(&text).map_err(|e| conversion_error(column, e))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[async_trait]
impl PackageCatalog for SqliteCatalog {
    async fn add(&self, package: &Package, cancel: &CancellationToken) -> Result<AddResult> {
        cancel::check(cancel)?;
        let conn = self.conn.lock();

        match Self::insert(&conn, package) {
            Ok(()) => {
                debug!("Added {} {} to catalog", package.id, package.version);
                Ok(AddResult::Success)
            }
            Err(Error::Database(e)) if is_unique_violation(&e) => Ok(AddResult::PackageAlreadyExists),
            Err(e) => Err(e),
        }
    }

    async fn exists(&self, id: &str, version: &PackageVersion, cancel: &CancellationToken) -> Result<bool> {
        cancel::check(cancel)?;
        let conn = self.conn.lock();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM packages WHERE lower_id = ?1 AND lower_version = ?2",
                params![id.to_lowercase(), lower_version(version)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    async fn find(&self, id: &str, include_unlisted: bool, cancel: &CancellationToken) -> Result<Vec<Package>> {
        cancel::check(cancel)?;
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM packages WHERE lower_id = ?1 AND (listed = 1 OR ?2)",
            PACKAGE_COLUMNS
        ))?;
        let mut packages = stmt
            .query_map(params![id.to_lowercase(), include_unlisted], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        packages.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(packages)
    }

    async fn find_one(
        &self,
        id: &str,
        version: &PackageVersion,
        include_unlisted: bool,
        cancel: &CancellationToken,
    ) -> Result<Option<Package>> {
        cancel::check(cancel)?;
        let conn = self.conn.lock();
        let package = conn
            .query_row(
                &format!(
                    "SELECT {} FROM packages
                     WHERE lower_id = ?1 AND lower_version = ?2 AND (listed = 1 OR ?3)",
                    PACKAGE_COLUMNS
                ),
                params![id.to_lowercase(), lower_version(version), include_unlisted],
                Self::from_row,
            )
            .optional()?;
        Ok(package)
    }

    async fn unlist(&self, id: &str, version: &PackageVersion, cancel: &CancellationToken) -> Result<bool> {
        cancel::check(cancel)?;
        self.set_listed(id, version, false)
    }

    async fn relist(&self, id: &str, version: &PackageVersion, cancel: &CancellationToken) -> Result<bool> {
        cancel::check(cancel)?;
        self.set_listed(id, version, true)
    }

    async fn add_download(&self, id: &str, version: &PackageVersion, cancel: &CancellationToken) -> Result<()> {
        cancel::check(cancel)?;
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE packages SET downloads = downloads + 1 WHERE lower_id = ?1 AND lower_version = ?2",
            params![id.to_lowercase(), lower_version(version)],
        )?;
        Ok(())
    }

    async fn hard_delete(&self, id: &str, version: &PackageVersion, cancel: &CancellationToken) -> Result<bool> {
        cancel::check(cancel)?;
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM packages WHERE lower_id = ?1 AND lower_version = ?2",
            params![id.to_lowercase(), lower_version(version)],
        )?;
        Ok(deleted > 0)
    }

    async fn package_ids(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        cancel::check(cancel)?;
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT MIN(id) FROM packages GROUP BY lower_id ORDER BY lower_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }
}
