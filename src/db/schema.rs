// src/db/schema.rs

//! Registry schema definitions and migrations
//!
//! This module defines the SQLite schema for the registry and provides
//! a migration system to evolve the schema over time.

use crate::error::{Error, Result};
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the schema version tracking table
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

/// Set the schema version
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
        info!("Applying registry migration to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    Ok(())
}

/// Apply a specific migration version
fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        2 => migrate_v2(conn),
        _ => Err(Error::InvalidInput(format!(
            "Unknown registry migration version: {}",
            version
        ))),
    }
}

/// Initial schema - Version 1
///
/// - holons: Current state of each holon (draft or latest published)
/// - holon_versions: One immutable row per published revision
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 1");

    conn.execute_batch(
        "
        CREATE TABLE holons (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            kind TEXT NOT NULL,
            created_by TEXT NOT NULL,
            version TEXT NOT NULL,
            version_sequence INTEGER NOT NULL DEFAULT 0,
            is_published INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            manifest TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT
        );

        CREATE INDEX idx_holons_kind_name ON holons(kind, name);
        CREATE INDEX idx_holons_created_by ON holons(created_by);

        CREATE TABLE holon_versions (
            holon_id TEXT NOT NULL REFERENCES holons(id) ON DELETE CASCADE,
            version_sequence INTEGER NOT NULL CHECK(version_sequence > 0),
            version TEXT NOT NULL,
            is_published INTEGER NOT NULL DEFAULT 1,
            manifest TEXT NOT NULL,
            published_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (holon_id, version_sequence)
        );
        ",
    )?;

    Ok(())
}

/// Version 2 - download and installation records
///
/// One row per materialized copy of a revision. `parent_id` is set when the
/// copy is a dependency nested inside another holon's source tree.
fn migrate_v2(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 2");

    conn.execute_batch(
        "
        CREATE TABLE installations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            holon_id TEXT NOT NULL,
            version_sequence INTEGER NOT NULL,
            kind TEXT NOT NULL,
            name TEXT NOT NULL,
            version TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('downloaded', 'installed', 'uninstalled')),
            parent_id TEXT,
            downloaded_path TEXT,
            downloaded_on TEXT,
            downloaded_by TEXT,
            installed_path TEXT,
            installed_on TEXT,
            installed_by TEXT,
            uninstalled_on TEXT,
            uninstalled_by TEXT,
            manifest TEXT NOT NULL
        );

        CREATE INDEX idx_installations_holon ON installations(holon_id, version_sequence);
        CREATE INDEX idx_installations_status ON installations(kind, status);
        ",
    )?;

    Ok(())
}
