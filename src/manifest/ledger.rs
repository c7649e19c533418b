// src/manifest/ledger.rs

//! Version ledger
//!
//! Every publish allocates the next `version_sequence` for a holon and
//! records an immutable revision row. Allocation runs inside an immediate
//! transaction, so two publishers of the same holon always receive
//! distinct, increasing sequences.

use super::Artifact;
use crate::db::{self, models::HolonRecord, models::VersionRecord};
use crate::error::{Error, Result};
use rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

fn holon_not_found(id: Uuid) -> Error {
    Error::NotFound(format!("holon {}", id))
}

/// Allocate the next sequence for `artifact` and record a pending revision
///
/// The revision is stored unpublished; [`commit_version`] flips it once the
/// package bytes are durable, [`discard_version`] drops it on failure.
pub fn register_version(conn: &mut Connection, artifact: &Artifact) -> Result<u32> {
    db::transaction(conn, |tx| {
        if HolonRecord::find_by_id(tx, artifact.id)?.is_none() {
            return Err(holon_not_found(artifact.id));
        }

        let sequence = VersionRecord::max_sequence(tx, artifact.id)? + 1;
        let mut pending = artifact.clone();
        pending.version_sequence = sequence;
        pending.number_of_versions = sequence;
        pending.is_published = false;
        VersionRecord::insert(tx, &pending)?;

        debug!("Allocated version {} for holon '{}'", sequence, artifact.name);
        Ok(sequence)
    })
}

/// Store the final descriptor of a revision and make it the holon's current state
pub fn commit_version(conn: &mut Connection, artifact: &Artifact) -> Result<()> {
    db::transaction(conn, |tx| {
        if !VersionRecord::update(tx, artifact)? {
            return Err(Error::NotFound(format!(
                "version {} of holon '{}'",
                artifact.version_sequence, artifact.name
            )));
        }
        HolonRecord::save(tx, artifact)
    })
}

/// Drop a revision that never became durable
pub fn discard_version(conn: &Connection, id: Uuid, sequence: u32) -> Result<()> {
    conn.execute(
        "DELETE FROM holon_versions WHERE holon_id = ?1 AND version_sequence = ?2",
        rusqlite::params![id.to_string(), sequence],
    )?;
    Ok(())
}

/// Highest recorded revision
pub fn load_latest(conn: &Connection, id: Uuid) -> Result<Artifact> {
    VersionRecord::find_latest(conn, id, false)?.ok_or_else(|| {
        Error::NotFound(format!("no versions recorded for holon {}", id))
    })
}

/// Highest published revision
pub fn load_latest_published(conn: &Connection, id: Uuid) -> Result<Option<Artifact>> {
    VersionRecord::find_latest(conn, id, true)
}

/// One revision
pub fn load_version(conn: &Connection, id: Uuid, sequence: u32) -> Result<Artifact> {
    VersionRecord::find(conn, id, sequence)?.ok_or_else(|| {
        Error::NotFound(format!("version {} of holon {}", sequence, id))
    })
}

/// Every revision, oldest first
pub fn list_versions(conn: &Connection, id: Uuid) -> Result<Vec<Artifact>> {
    if HolonRecord::find_by_id(conn, id)?.is_none() {
        return Err(holon_not_found(id));
    }
    VersionRecord::list_for(conn, id)
}
