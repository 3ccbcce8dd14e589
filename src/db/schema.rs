// src/db/schema.rs

//! Catalog schema and migrations
//!
//! The schema is versioned through a `schema_version` table; `migrate`
//! applies every missing version in order.

use crate::error::{Error, Result};
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    debug!("Current schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        _ => Err(Error::Unsupported(format!(
            "unknown schema migration version {}",
            version
        ))),
    }
}

/// Initial schema
///
/// - packages: one row per (id, version), list-valued metadata as JSON
/// - package_contents: blobs for the database storage backend
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE packages (
            key INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL,
            lower_id TEXT NOT NULL,
            version TEXT NOT NULL,
            lower_version TEXT NOT NULL,
            authors TEXT NOT NULL DEFAULT '[]',
            description TEXT NOT NULL DEFAULT '',
            downloads INTEGER NOT NULL DEFAULT 0,
            has_readme INTEGER NOT NULL DEFAULT 0,
            has_embedded_icon INTEGER NOT NULL DEFAULT 0,
            has_embedded_license INTEGER NOT NULL DEFAULT 0,
            is_prerelease INTEGER NOT NULL DEFAULT 0,
            listed INTEGER NOT NULL DEFAULT 1,
            semver_level TEXT NOT NULL DEFAULT 'Unknown'
                CHECK(semver_level IN ('Unknown', 'SemVer2')),
            published TEXT NOT NULL,
            require_license_acceptance INTEGER NOT NULL DEFAULT 0,
            language TEXT,
            min_client_version TEXT,
            release_notes TEXT,
            summary TEXT,
            title TEXT,
            icon_url TEXT,
            license_url TEXT,
            project_url TEXT,
            repository_url TEXT,
            repository_type TEXT,
            tags TEXT NOT NULL DEFAULT '[]',
            dependencies TEXT NOT NULL DEFAULT '[]',
            package_types TEXT NOT NULL DEFAULT '[]',
            target_frameworks TEXT NOT NULL DEFAULT '[]',
            UNIQUE(lower_id, lower_version)
        );

        CREATE INDEX idx_packages_lower_id ON packages(lower_id);

        CREATE TABLE package_contents (
            path TEXT PRIMARY KEY,
            content_type TEXT NOT NULL,
            data BLOB NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        ",
    )?;

    debug!("Schema version 1 created");
    Ok(())
}
