//! Main store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params, params_from_iter};
use time::format_description::well_known::Rfc3339;
use tracing::{debug, error, info};

use lochist_types::{CandidateRecord, LocationRecord};

use crate::error::{Error, Result};
use crate::models::{LOCATION_COLUMNS, StoreStats, location_from_row};
use crate::queries::LocationQuery;
use crate::schema;

/// How long a statement waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-based store for location history.
///
/// The connection sits behind a mutex, so a `Store` can be shared between
/// threads (usually in an `Arc`). Writers are serialized and every batch is
/// a single transaction, so readers see either all of a batch or none of it.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create a database at the given path.
    ///
    /// Fails with [`Error::SchemaMismatch`] if the file holds a layout this
    /// version does not understand; the file is not modified in that case.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Close the database, reporting any error SQLite raises while closing.
    ///
    /// Dropping a `Store` also closes it, but silently.
    pub fn close(self) -> Result<()> {
        let conn = self.conn.into_inner().unwrap_or_else(PoisonError::into_inner);
        conn.close().map_err(|(_, e)| Error::StorageUnavailable(e))
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a half-written batch
        // behind: the open transaction rolls back when it is dropped.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// Write operations
impl Store {
    /// Insert a batch of candidates atomically.
    ///
    /// Ids are assigned in slice order. Every candidate is validated before
    /// anything is written; on any failure nothing from the batch is stored
    /// and the whole batch should be retried by the caller.
    pub fn insert_batch(&self, candidates: &[CandidateRecord]) -> Result<usize> {
        if candidates.is_empty() {
            return Ok(0);
        }

        for candidate in candidates {
            candidate.validate()?;
        }

        let attempted = candidates.len();
        let mut conn = self.conn();
        write_batch(&mut conn, candidates).map_err(|source| {
            error!("Batch of {} locations rolled back: {}", attempted, source);
            Error::BatchInsert { attempted, source }
        })?;

        debug!("Inserted batch of {} locations", attempted);
        Ok(attempted)
    }
}

fn write_batch(conn: &mut Connection, candidates: &[CandidateRecord]) -> rusqlite::Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO locations (latitude, longitude, captured_at_millis)
             VALUES (?1, ?2, ?3)",
        )?;
        for candidate in candidates {
            stmt.execute(params![
                candidate.latitude,
                candidate.longitude,
                candidate.captured_at_millis
            ])?;
        }
    }
    tx.commit()
}

// Read operations
impl Store {
    /// Records captured in `[from_inclusive, to_exclusive)`, newest first.
    ///
    /// Ties on `captured_at_millis` are ordered by descending `id`. An empty
    /// or inverted range returns an empty vector.
    pub fn query_range(&self, from_inclusive: i64, to_exclusive: i64) -> Result<Vec<LocationRecord>> {
        if from_inclusive >= to_exclusive {
            debug!(
                "Empty range [{}, {}), skipping query",
                from_inclusive, to_exclusive
            );
            return Ok(Vec::new());
        }
        self.query(&LocationQuery::range(from_inclusive, to_exclusive))
    }

    /// Every stored record, newest first.
    pub fn query_all(&self) -> Result<Vec<LocationRecord>> {
        self.query(&LocationQuery::new())
    }

    /// Query records with filters.
    pub fn query(&self, query: &LocationQuery) -> Result<Vec<LocationRecord>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&sql)?;
        let records = stmt
            .query_map(params_from_iter(params.iter()), location_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// The most recently captured record.
    pub fn latest(&self) -> Result<Option<LocationRecord>> {
        let records = self.query(&LocationQuery::new().limit(1))?;
        Ok(records.into_iter().next())
    }

    /// Get a record by id.
    pub fn get(&self, id: i64) -> Result<Option<LocationRecord>> {
        let conn = self.conn();
        let record = conn
            .query_row(
                &format!("SELECT {LOCATION_COLUMNS} FROM locations WHERE id = ?"),
                [id],
                location_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Count stored records.
    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM locations", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Record count and capture time span.
    pub fn stats(&self) -> Result<StoreStats> {
        let stats = self.conn().query_row(
            "SELECT COUNT(*), MIN(captured_at_millis), MAX(captured_at_millis) FROM locations",
            [],
            |row| {
                Ok(StoreStats {
                    count: row.get::<_, i64>(0)? as u64,
                    oldest_millis: row.get(1)?,
                    newest_millis: row.get(2)?,
                })
            },
        )?;
        Ok(stats)
    }
}

// Export operations
impl Store {
    /// Export matching records as CSV.
    ///
    /// Columns: `id,latitude,longitude,captured_at_millis,captured_at`, the
    /// last one in RFC 3339 (UTC).
    pub fn export_csv(&self, query: &LocationQuery) -> Result<String> {
        let records = self.query(query)?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record([
            "id",
            "latitude",
            "longitude",
            "captured_at_millis",
            "captured_at",
        ])?;

        for record in &records {
            let captured_at = record
                .captured_at()
                .and_then(|t| t.format(&Rfc3339).ok())
                .unwrap_or_default();
            writer.write_record([
                record.id.to_string(),
                record.latitude.to_string(),
                record.longitude.to_string(),
                record.captured_at_millis.to_string(),
                captured_at,
            ])?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| Error::Csv(csv::Error::from(e.into_error())))?;

        info!("Exported {} locations to CSV", records.len());
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
