// src/db/models.rs

//! Data models for registry entities
//!
//! This module maps the registry tables onto Rust structs and provides
//! methods for creating, reading, updating, and deleting records. Manifests
//! are stored as JSON text and parsed on the way out, so a damaged row
//! surfaces as `ManifestCorrupt` rather than a database error.

use crate::error::{Error, Result};
use crate::kind::HolonKind;
use crate::manifest::Artifact;
use crate::session::ActorId;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, msg)),
    )
}

fn uuid_col(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s).map_err(|e| conversion_error(idx, format!("Invalid uuid '{}': {}", s, e)))
}

fn opt_uuid_col(row: &Row, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| {
        Uuid::parse_str(&s).map_err(|e| conversion_error(idx, format!("Invalid uuid '{}': {}", s, e)))
    })
    .transpose()
}

fn opt_time_col(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, format!("Invalid timestamp '{}': {}", s, e)))
    })
    .transpose()
}

fn parse_manifest(holon_id: &str, json: &str) -> Result<Artifact> {
    Artifact::from_json(json).map_err(|e| {
        Error::ManifestCorrupt(format!("registry descriptor of holon {}: {}", holon_id, e))
    })
}

/// Filter for holon listings
#[derive(Debug, Clone, Default)]
pub struct HolonQuery {
    pub kind: Option<HolonKind>,
    pub created_by: Option<ActorId>,
    pub published: Option<bool>,
    pub include_inactive: bool,
}

impl HolonQuery {
    pub fn kind(kind: HolonKind) -> Self {
        Self {
            kind: Some(kind),
            include_inactive: true,
            ..Self::default()
        }
    }
}

/// Current state of each holon (holons table)
pub struct HolonRecord;

impl HolonRecord {
    /// Insert or replace the current descriptor of a holon
    pub fn save(conn: &Connection, artifact: &Artifact) -> Result<()> {
        let manifest = artifact.to_json()?;
        conn.execute(
            "INSERT INTO holons (id, name, description, kind, created_by, version,
                                 version_sequence, is_published, is_active, manifest)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                version = excluded.version,
                version_sequence = excluded.version_sequence,
                is_published = excluded.is_published,
                is_active = excluded.is_active,
                manifest = excluded.manifest,
                updated_at = CURRENT_TIMESTAMP",
            params![
                artifact.id.to_string(),
                &artifact.name,
                &artifact.description,
                artifact.kind.as_ref(),
                artifact.created_by.to_string(),
                &artifact.version,
                artifact.version_sequence,
                artifact.is_published,
                artifact.is_active,
                manifest,
            ],
        )?;
        Ok(())
    }

    /// Find a holon by ID
    pub fn find_by_id(conn: &Connection, id: Uuid) -> Result<Option<Artifact>> {
        let key = id.to_string();
        let json: Option<String> = conn
            .query_row("SELECT manifest FROM holons WHERE id = ?1", [&key], |row| {
                row.get(0)
            })
            .optional()?;
        json.map(|json| parse_manifest(&key, &json)).transpose()
    }

    /// List holons matching `query`, ordered by name then id
    pub fn list(conn: &Connection, query: &HolonQuery) -> Result<Vec<Artifact>> {
        let mut stmt = conn.prepare(
            "SELECT id, manifest FROM holons
             WHERE (?1 IS NULL OR kind = ?1)
               AND (?2 IS NULL OR created_by = ?2)
               AND (?3 IS NULL OR is_published = ?3)
               AND (?4 OR is_active = 1)
             ORDER BY name, id",
        )?;

        let rows = stmt
            .query_map(
                params![
                    query.kind.map(|k| k.as_ref().to_string()),
                    query.created_by.map(|a| a.to_string()),
                    query.published,
                    query.include_inactive,
                ],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.iter()
            .map(|(id, json)| parse_manifest(id, json))
            .collect()
    }

    /// Delete a holon; returns whether a row existed
    pub fn delete(conn: &Connection, id: Uuid) -> Result<bool> {
        let removed = conn.execute("DELETE FROM holons WHERE id = ?1", [id.to_string()])?;
        Ok(removed > 0)
    }
}

/// One published revision (holon_versions table)
pub struct VersionRecord;

impl VersionRecord {
    /// Highest allocated sequence for a holon, 0 when never published
    pub fn max_sequence(conn: &Connection, holon_id: Uuid) -> Result<u32> {
        let max: Option<u32> = conn.query_row(
            "SELECT MAX(version_sequence) FROM holon_versions WHERE holon_id = ?1",
            [holon_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(max.unwrap_or(0))
    }

    /// Record a new revision; the artifact carries its allocated sequence
    pub fn insert(conn: &Connection, artifact: &Artifact) -> Result<()> {
        conn.execute(
            "INSERT INTO holon_versions (holon_id, version_sequence, version, is_published, manifest)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                artifact.id.to_string(),
                artifact.version_sequence,
                &artifact.version,
                artifact.is_published,
                artifact.to_json()?,
            ],
        )?;
        Ok(())
    }

    /// Replace the stored descriptor of an existing revision
    pub fn update(conn: &Connection, artifact: &Artifact) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE holon_versions SET is_published = ?3, manifest = ?4
             WHERE holon_id = ?1 AND version_sequence = ?2",
            params![
                artifact.id.to_string(),
                artifact.version_sequence,
                artifact.is_published,
                artifact.to_json()?,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Find one revision
    pub fn find(conn: &Connection, holon_id: Uuid, sequence: u32) -> Result<Option<Artifact>> {
        let key = holon_id.to_string();
        let json: Option<String> = conn
            .query_row(
                "SELECT manifest FROM holon_versions WHERE holon_id = ?1 AND version_sequence = ?2",
                params![&key, sequence],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|json| parse_manifest(&key, &json)).transpose()
    }

    /// Highest revision, optionally only among published ones
    pub fn find_latest(conn: &Connection, holon_id: Uuid, published_only: bool) -> Result<Option<Artifact>> {
        let key = holon_id.to_string();
        let json: Option<String> = conn
            .query_row(
                "SELECT manifest FROM holon_versions
                 WHERE holon_id = ?1 AND (?2 = 0 OR is_published = 1)
                 ORDER BY version_sequence DESC LIMIT 1",
                params![&key, published_only],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|json| parse_manifest(&key, &json)).transpose()
    }

    /// Every revision of a holon, oldest first
    pub fn list_for(conn: &Connection, holon_id: Uuid) -> Result<Vec<Artifact>> {
        let key = holon_id.to_string();
        let mut stmt = conn.prepare(
            "SELECT manifest FROM holon_versions WHERE holon_id = ?1 ORDER BY version_sequence",
        )?;
        let rows = stmt
            .query_map([&key], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.iter().map(|json| parse_manifest(&key, json)).collect()
    }

    /// Drop every revision of a holon
    pub fn delete_all(conn: &Connection, holon_id: Uuid) -> Result<usize> {
        Ok(conn.execute(
            "DELETE FROM holon_versions WHERE holon_id = ?1",
            [holon_id.to_string()],
        )?)
    }
}

/// State of one materialized copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStatus {
    Downloaded,
    Installed,
    Uninstalled,
}

impl InstallStatus {
    pub fn as_str(&self) -> &str {
        match self {
            InstallStatus::Downloaded => "downloaded",
            InstallStatus::Installed => "installed",
            InstallStatus::Uninstalled => "uninstalled",
        }
    }
}

impl FromStr for InstallStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "downloaded" => Ok(InstallStatus::Downloaded),
            "installed" => Ok(InstallStatus::Installed),
            "uninstalled" => Ok(InstallStatus::Uninstalled),
            _ => Err(format!("Invalid install status: {}", s)),
        }
    }
}

/// A downloaded or installed copy of one revision (installations table)
#[derive(Debug, Clone)]
pub struct Installation {
    pub id: Option<i64>,
    pub holon_id: Uuid,
    pub version_sequence: u32,
    pub kind: HolonKind,
    pub name: String,
    pub version: String,
    pub status: InstallStatus,
    /// Holon whose source tree owns this copy (nested dependency)
    pub parent_id: Option<Uuid>,
    pub downloaded_path: Option<PathBuf>,
    pub downloaded_on: Option<DateTime<Utc>>,
    pub downloaded_by: Option<ActorId>,
    pub installed_path: Option<PathBuf>,
    pub installed_on: Option<DateTime<Utc>>,
    pub installed_by: Option<ActorId>,
    pub uninstalled_on: Option<DateTime<Utc>>,
    pub uninstalled_by: Option<ActorId>,
    manifest_json: String,
}

const INSTALLATION_COLUMNS: &str = "id, holon_id, version_sequence, kind, name, version, status, parent_id,
     downloaded_path, downloaded_on, downloaded_by, installed_path, installed_on, installed_by,
     uninstalled_on, uninstalled_by, manifest";

impl Installation {
    /// Record for `artifact` in the given state; timestamps are set by the caller
    pub fn new(artifact: &Artifact, status: InstallStatus) -> Result<Self> {
        Ok(Self {
            id: None,
            holon_id: artifact.id,
            version_sequence: artifact.version_sequence,
            kind: artifact.kind,
            name: artifact.name.clone(),
            version: artifact.version.clone(),
            status,
            parent_id: None,
            downloaded_path: None,
            downloaded_on: None,
            downloaded_by: None,
            installed_path: None,
            installed_on: None,
            installed_by: None,
            uninstalled_on: None,
            uninstalled_by: None,
            manifest_json: artifact.to_json()?,
        })
    }

    /// Descriptor of the installed revision
    pub fn manifest(&self) -> Result<Artifact> {
        parse_manifest(&self.holon_id.to_string(), &self.manifest_json)
    }

    /// Replace the stored descriptor
    pub fn set_manifest(&mut self, artifact: &Artifact) -> Result<()> {
        self.manifest_json = artifact.to_json()?;
        Ok(())
    }

    /// Insert this record into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO installations (holon_id, version_sequence, kind, name, version, status, parent_id,
                 downloaded_path, downloaded_on, downloaded_by, installed_path, installed_on, installed_by,
                 uninstalled_on, uninstalled_by, manifest)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                self.holon_id.to_string(),
                self.version_sequence,
                self.kind.as_ref(),
                &self.name,
                &self.version,
                self.status.as_str(),
                self.parent_id.map(|p| p.to_string()),
                self.downloaded_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
                self.downloaded_on.map(|t| t.to_rfc3339()),
                self.downloaded_by.map(|a| a.to_string()),
                self.installed_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
                self.installed_on.map(|t| t.to_rfc3339()),
                self.installed_by.map(|a| a.to_string()),
                self.uninstalled_on.map(|t| t.to_rfc3339()),
                self.uninstalled_by.map(|a| a.to_string()),
                &self.manifest_json,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Insert or update depending on whether the record has an id
    pub fn save(&mut self, conn: &Connection) -> Result<i64> {
        match self.id {
            None => self.insert(conn),
            Some(id) => {
                conn.execute(
                    "UPDATE installations SET status = ?2, downloaded_path = ?3, downloaded_on = ?4,
                         downloaded_by = ?5, installed_path = ?6, installed_on = ?7, installed_by = ?8,
                         uninstalled_on = ?9, uninstalled_by = ?10, manifest = ?11
                     WHERE id = ?1",
                    params![
                        id,
                        self.status.as_str(),
                        self.downloaded_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
                        self.downloaded_on.map(|t| t.to_rfc3339()),
                        self.downloaded_by.map(|a| a.to_string()),
                        self.installed_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
                        self.installed_on.map(|t| t.to_rfc3339()),
                        self.installed_by.map(|a| a.to_string()),
                        self.uninstalled_on.map(|t| t.to_rfc3339()),
                        self.uninstalled_by.map(|a| a.to_string()),
                        &self.manifest_json,
                    ],
                )?;
                Ok(id)
            }
        }
    }

    /// Find the record of one revision owned by `parent_id` (None = top level)
    pub fn find_for(
        conn: &Connection,
        holon_id: Uuid,
        version_sequence: u32,
        parent_id: Option<Uuid>,
    ) -> Result<Option<Self>> {
        let sql = format!(
            "SELECT {} FROM installations
             WHERE holon_id = ?1 AND version_sequence = ?2 AND parent_id IS ?3
             ORDER BY id DESC LIMIT 1",
            INSTALLATION_COLUMNS
        );
        Ok(conn
            .query_row(
                &sql,
                params![
                    holon_id.to_string(),
                    version_sequence,
                    parent_id.map(|p| p.to_string())
                ],
                Self::from_row,
            )
            .optional()?)
    }

    /// Nested copy of a holon inside `parent_id`, any revision
    pub fn find_nested(conn: &Connection, holon_id: Uuid, parent_id: Uuid) -> Result<Option<Self>> {
        let sql = format!(
            "SELECT {} FROM installations
             WHERE holon_id = ?1 AND parent_id = ?2 AND status != 'uninstalled'
             ORDER BY id DESC LIMIT 1",
            INSTALLATION_COLUMNS
        );
        Ok(conn
            .query_row(
                &sql,
                params![holon_id.to_string(), parent_id.to_string()],
                Self::from_row,
            )
            .optional()?)
    }

    /// Top-level records of a holon in a state, newest revision first
    pub fn find_with_status(
        conn: &Connection,
        holon_id: Uuid,
        status: InstallStatus,
    ) -> Result<Vec<Self>> {
        let sql = format!(
            "SELECT {} FROM installations
             WHERE holon_id = ?1 AND status = ?2 AND parent_id IS NULL
             ORDER BY version_sequence DESC, id DESC",
            INSTALLATION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![holon_id.to_string(), status.as_str()], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Top-level records in a state, optionally of one kind
    pub fn list_by_status(
        conn: &Connection,
        kind: Option<HolonKind>,
        status: InstallStatus,
    ) -> Result<Vec<Self>> {
        let sql = format!(
            "SELECT {} FROM installations
             WHERE (?1 IS NULL OR kind = ?1) AND status = ?2 AND parent_id IS NULL
             ORDER BY name, version_sequence",
            INSTALLATION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![kind.map(|k| k.as_ref().to_string()), status.as_str()],
                Self::from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Every record of a holon
    pub fn list_for_holon(conn: &Connection, holon_id: Uuid) -> Result<Vec<Self>> {
        let sql = format!(
            "SELECT {} FROM installations WHERE holon_id = ?1 ORDER BY id",
            INSTALLATION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([holon_id.to_string()], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Drop every record of a holon
    pub fn delete_for_holon(conn: &Connection, holon_id: Uuid) -> Result<usize> {
        Ok(conn.execute(
            "DELETE FROM installations WHERE holon_id = ?1",
            [holon_id.to_string()],
        )?)
    }

    /// Convert a database row to an Installation
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let kind_str: String = row.get(3)?;
        let kind = HolonKind::from_str(&kind_str)
            .map_err(|e| conversion_error(3, format!("Invalid kind '{}': {}", kind_str, e)))?;
        let status_str: String = row.get(6)?;
        let status = status_str.parse::<InstallStatus>().map_err(|e| conversion_error(6, e))?;

        Ok(Self {
            id: Some(row.get(0)?),
            holon_id: uuid_col(row, 1)?,
            version_sequence: row.get(2)?,
            kind,
            name: row.get(4)?,
            version: row.get(5)?,
            status,
            parent_id: opt_uuid_col(row, 7)?,
            downloaded_path: row.get::<_, Option<String>>(8)?.map(PathBuf::from),
            downloaded_on: opt_time_col(row, 9)?,
            downloaded_by: opt_uuid_col(row, 10)?,
            installed_path: row.get::<_, Option<String>>(11)?.map(PathBuf::from),
            installed_on: opt_time_col(row, 12)?,
            installed_by: opt_uuid_col(row, 13)?,
            uninstalled_on: opt_time_col(row, 14)?,
            uninstalled_by: opt_uuid_col(row, 15)?,
            manifest_json: row.get(16)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::error::ErrorKind;

    fn artifact(name: &str, kind: HolonKind) -> Artifact {
        Artifact::new(name, format!("{} holon", name), kind, Uuid::new_v4(), "tester")
    }

    #[test]
    fn test_holon_save_and_find() {
        let conn = db::open_in_memory().unwrap();
        let mut moon = artifact("Moon", HolonKind::Library);
        HolonRecord::save(&conn, &moon).unwrap();

        moon.description = "updated".to_string();
        HolonRecord::save(&conn, &moon).unwrap();

        let found = HolonRecord::find_by_id(&conn, moon.id).unwrap().unwrap();
        assert_eq!(found.description, "updated");
        assert!(HolonRecord::find_by_id(&conn, Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_holon_list_filters_and_orders() {
        let conn = db::open_in_memory().unwrap();
        let b = artifact("Bravo", HolonKind::Library);
        let a = artifact("Alpha", HolonKind::Library);
        let mut inactive = artifact("Charlie", HolonKind::Library);
        inactive.is_active = false;
        let runtime = artifact("Delta", HolonKind::Runtime);
        for h in [&b, &a, &inactive, &runtime] {
            HolonRecord::save(&conn, h).unwrap();
        }

        let query = HolonQuery {
            kind: Some(HolonKind::Library),
            ..HolonQuery::default()
        };
        let names: Vec<String> = HolonRecord::list(&conn, &query)
            .unwrap()
            .into_iter()
            .map(|h| h.name)
            .collect();
        assert_eq!(names, vec!["Alpha", "Bravo"]);

        let all = HolonRecord::list(&conn, &HolonQuery::kind(HolonKind::Library)).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_corrupt_descriptor_is_manifest_corrupt() {
        let conn = db::open_in_memory().unwrap();
        let moon = artifact("Moon", HolonKind::Library);
        HolonRecord::save(&conn, &moon).unwrap();
        conn.execute(
            "UPDATE holons SET manifest = 'garbage' WHERE id = ?1",
            [moon.id.to_string()],
        )
        .unwrap();

        let err = HolonRecord::find_by_id(&conn, moon.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ManifestCorrupt);
    }

    #[test]
    fn test_version_records() {
        let conn = db::open_in_memory().unwrap();
        let mut moon = artifact("Moon", HolonKind::Library);
        HolonRecord::save(&conn, &moon).unwrap();
        assert_eq!(VersionRecord::max_sequence(&conn, moon.id).unwrap(), 0);

        for seq in 1..=3 {
            moon.version_sequence = seq;
            moon.is_published = seq != 3;
            VersionRecord::insert(&conn, &moon).unwrap();
        }

        assert_eq!(VersionRecord::max_sequence(&conn, moon.id).unwrap(), 3);
        let latest = VersionRecord::find_latest(&conn, moon.id, true).unwrap().unwrap();
        assert_eq!(latest.version_sequence, 2);
        let seqs: Vec<u32> = VersionRecord::list_for(&conn, moon.id)
            .unwrap()
            .iter()
            .map(|v| v.version_sequence)
            .collect();
        assert_eq!(seqs, vec![1, 2, 3]);

        assert_eq!(VersionRecord::delete_all(&conn, moon.id).unwrap(), 3);
        assert!(VersionRecord::find(&conn, moon.id, 1).unwrap().is_none());
    }

    #[test]
    fn test_installation_lifecycle() {
        let conn = db::open_in_memory().unwrap();
        let mut moon = artifact("Moon", HolonKind::Library);
        moon.version_sequence = 1;
        let actor = Uuid::new_v4();

        let mut record = Installation::new(&moon, InstallStatus::Downloaded).unwrap();
        record.downloaded_path = Some(PathBuf::from("/d/Moon_v1.0.0.olib"));
        record.downloaded_on = Some(Utc::now());
        record.downloaded_by = Some(actor);
        record.insert(&conn).unwrap();

        let mut found = Installation::find_for(&conn, moon.id, 1, None).unwrap().unwrap();
        assert_eq!(found.status, InstallStatus::Downloaded);
        assert_eq!(found.downloaded_by, Some(actor));
        assert_eq!(found.manifest().unwrap().name, "Moon");

        found.status = InstallStatus::Installed;
        found.installed_path = Some(PathBuf::from("/i/Library/Moon_v1.0.0"));
        found.save(&conn).unwrap();

        let installed =
            Installation::list_by_status(&conn, Some(HolonKind::Library), InstallStatus::Installed)
                .unwrap();
        assert_eq!(installed.len(), 1);
        assert!(Installation::find_for(&conn, moon.id, 1, Some(Uuid::new_v4()))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_nested_records_are_separate() {
        let conn = db::open_in_memory().unwrap();
        let mut moon = artifact("Moon", HolonKind::Library);
        moon.version_sequence = 1;
        let parent = Uuid::new_v4();

        let mut top = Installation::new(&moon, InstallStatus::Installed).unwrap();
        top.insert(&conn).unwrap();
        let mut nested = Installation::new(&moon, InstallStatus::Installed).unwrap();
        nested.parent_id = Some(parent);
        nested.insert(&conn).unwrap();

        assert!(Installation::find_nested(&conn, moon.id, parent).unwrap().is_some());
        let top_level =
            Installation::list_by_status(&conn, None, InstallStatus::Installed).unwrap();
        assert_eq!(top_level.len(), 1);
        assert_eq!(Installation::list_for_holon(&conn, moon.id).unwrap().len(), 2);
    }
}
