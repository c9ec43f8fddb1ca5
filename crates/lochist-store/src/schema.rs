//! Database schema creation and compatibility checks.
//!
//! An existing database is never rewritten: if its structure does not match
//! what this version expects, opening fails with [`Error::SchemaMismatch`]
//! and the file is left untouched.

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Expected `(name, declared type)` of every column in `locations`, in order.
const EXPECTED_COLUMNS: [(&str, &str); 4] = [
    ("id", "INTEGER"),
    ("latitude", "REAL"),
    ("longitude", "REAL"),
    ("captured_at_millis", "INTEGER"),
];

/// Initialize the schema on a fresh database or verify an existing one.
pub fn initialize(conn: &Connection) -> Result<()> {
    let version = get_schema_version(conn)?;

    match version {
        0 if table_exists(conn, "locations")? => {
            // Created by something else; adopt it only if the layout matches.
            verify_locations_table(conn)?;
            info!("Adopting existing locations table at schema version {SCHEMA_VERSION}");
            let tx = conn.unchecked_transaction()?;
            create_schema_v1(&tx)?;
            set_schema_version(&tx, SCHEMA_VERSION)?;
            tx.commit()?;
        }
        0 => {
            debug!("Creating schema version {SCHEMA_VERSION}");
            let tx = conn.unchecked_transaction()?;
            create_schema_v1(&tx)?;
            set_schema_version(&tx, SCHEMA_VERSION)?;
            tx.commit()?;
        }
        SCHEMA_VERSION => verify_locations_table(conn)?,
        v if v > SCHEMA_VERSION => {
            return Err(Error::SchemaMismatch(format!(
                "database schema version {v} is newer than supported version {SCHEMA_VERSION}"
            )));
        }
        v => {
            return Err(Error::SchemaMismatch(format!(
                "database schema version {v} has no migration to version {SCHEMA_VERSION}"
            )));
        }
    }

    Ok(())
}

/// Get the current schema version, 0 if untracked.
pub(crate) fn get_schema_version(conn: &Connection) -> Result<i32> {
    if !table_exists(conn, "schema_version")? {
        return Ok(0);
    }

    conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))
        .optional()?
        .ok_or_else(|| Error::SchemaMismatch("schema_version table has no version row".to_string()))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
        [name],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Compare the live `locations` columns with [`EXPECTED_COLUMNS`].
fn verify_locations_table(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare("PRAGMA table_info(locations)")?;
    let columns = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let matches = columns.len() == EXPECTED_COLUMNS.len()
        && columns
            .iter()
            .zip(EXPECTED_COLUMNS.iter())
            .all(|((name, ty), (want_name, want_ty))| {
                name.eq_ignore_ascii_case(want_name) && ty.eq_ignore_ascii_case(want_ty)
            });

    if matches {
        Ok(())
    } else {
        let found = columns
            .iter()
            .map(|(name, ty)| format!("{name} {ty}"))
            .collect::<Vec<_>>()
            .join(", ");
        Err(Error::SchemaMismatch(format!(
            "locations table has columns ({found}), expected (id INTEGER, latitude REAL, \
             longitude REAL, captured_at_millis INTEGER)"
        )))
    }
}

/// Create the initial schema (version 1).
fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS locations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            latitude REAL NOT NULL CHECK (latitude BETWEEN -90 AND 90),
            longitude REAL NOT NULL CHECK (longitude BETWEEN -180 AND 180),
            captured_at_millis INTEGER NOT NULL CHECK (captured_at_millis >= 0)
        );
        CREATE INDEX IF NOT EXISTS idx_locations_captured_at
            ON locations(captured_at_millis);
        "#,
    )?;

    Ok(())
}
