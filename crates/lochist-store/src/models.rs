//! Row mapping and summary models.

use rusqlite::Row;
use serde::Serialize;

use lochist_types::LocationRecord;

/// Column list matching [`location_from_row`].
pub(crate) const LOCATION_COLUMNS: &str = "id, latitude, longitude, captured_at_millis";

/// Map one `locations` row, selected with [`LOCATION_COLUMNS`], to a record.
pub(crate) fn location_from_row(row: &Row<'_>) -> rusqlite::Result<LocationRecord> {
    Ok(LocationRecord {
        id: row.get(0)?,
        latitude: row.get(1)?,
        longitude: row.get(2)?,
        captured_at_millis: row.get(3)?,
    })
}

/// Summary of the stored history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Number of stored records.
    pub count: u64,
    /// Earliest capture time (epoch ms), if any records exist.
    pub oldest_millis: Option<i64>,
    /// Latest capture time (epoch ms), if any records exist.
    pub newest_millis: Option<i64>,
}
