// src/db/mod.rs

//! Registry database
//!
//! SQLite holds the authoritative record of every holon: the current
//! (draft or published) manifest, each published revision, and every
//! download/installation of a revision.

pub mod models;
pub mod schema;

use crate::error::Result;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use tracing::{debug, info};

/// Create the database file (and its directory) and bring the schema up to date
pub fn init(db_path: impl AsRef<Path>) -> Result<()> {
    let db_path = db_path.as_ref();
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let conn = open(db_path)?;
    schema::migrate(&conn)?;
    info!("Registry initialized at {}", db_path.display());
    Ok(())
}

/// Open an existing database with the engine's pragmas applied
pub fn open(db_path: impl AsRef<Path>) -> Result<Connection> {
    let conn = Connection::open(db_path.as_ref())?;
    configure(&conn)?;
    debug!("Opened registry {}", db_path.as_ref().display());
    Ok(conn)
}

/// In-memory registry with the current schema (tests, ephemeral sessions)
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    schema::migrate(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(())
}

/// Run `f` inside an immediate transaction, committing on success
///
/// `BEGIN IMMEDIATE` takes the write lock up front, so read-then-write
/// sequences (such as allocating the next version sequence) cannot race
/// with another writer.
pub fn transaction<T, F>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&Transaction<'_>) -> Result<T>,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}
