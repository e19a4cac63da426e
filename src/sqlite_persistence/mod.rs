//! Shared SQLite schema versioning.
//!
//! Each store owns its own database file and declares an ordered list of
//! [`VersionedSchema`] entries. On open, the stored `user_version` pragma is
//! compared against the declared versions and every missing `up` batch is
//! applied in order.

use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// One schema version: the batch of SQL that brings a database from the
/// previous version up to `version`.
pub struct VersionedSchema {
    pub version: i64,
    pub up: &'static str,
}

/// Read the SQLite `user_version` pragma.
pub fn schema_version(conn: &Connection) -> Result<i64> {
    let version: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .context("Failed to read user_version")?;
    Ok(version)
}

/// Apply every schema newer than the stored version, in order, stamping
/// `user_version` after each batch.
pub fn migrate(conn: &Connection, schemas: &[VersionedSchema]) -> Result<()> {
    let current = schema_version(conn)?;
    let latest = schemas.last().map(|s| s.version).unwrap_or(0);
    if current > latest {
        bail!(
            "Database version {} is newer than supported version {}",
            current,
            latest
        );
    }
    for schema in schemas.iter().filter(|s| s.version > current) {
        conn.execute_batch(schema.up)
            .with_context(|| format!("Failed to apply schema version {}", schema.version))?;
        conn.pragma_update(None, "user_version", schema.version)
            .with_context(|| format!("Failed to stamp schema version {}", schema.version))?;
    }
    Ok(())
}
