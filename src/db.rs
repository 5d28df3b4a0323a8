use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

/// Value of `gop_start_rowid` marking the first record of a new group of
/// pictures. Such records carry fresh codec parameter sets.
pub const GOP_START_SENTINEL: i64 = -1;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("frame database not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read frame database: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// One row of the camera's frame table, read in capture order.
#[derive(Debug, Clone)]
pub struct RawFrameRecord {
    /// Monotone store identity; defines processing order.
    pub order_key: i64,
    /// Capture time in milliseconds since epoch.
    pub timestamp_ms: i64,
    pub gop_start_rowid: i64,
    pub sps: Option<Vec<u8>>,
    pub pps: Option<Vec<u8>>,
    /// Compressed frame payload, always present.
    pub payload: Vec<u8>,
    /// True when this record finishes the current recording chunk.
    pub chunk_complete: bool,
}

impl RawFrameRecord {
    /// True when this record opens a new group of pictures.
    pub fn starts_gop(&self) -> bool {
        self.gop_start_rowid == GOP_START_SENTINEL
    }

    /// Codec parameter sets, present only on records that begin a group.
    pub fn parameter_sets(&self) -> Option<(&[u8], &[u8])> {
        match (&self.sps, &self.pps) {
            (Some(sps), Some(pps)) if !sps.is_empty() && !pps.is_empty() => Some((sps, pps)),
            _ => None,
        }
    }
}

/// Read-only handle on the recorder's embedded database.
#[derive(Debug)]
pub struct FrameDatabase {
    conn: Connection,
}

impl FrameDatabase {
    /// Open the frame database. A missing file is fatal before any output
    /// is produced.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if !path.exists() {
            return Err(DbError::NotFound(path.to_path_buf()));
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Self { conn })
    }

    /// Read every frame record, ordered by rowid.
    ///
    /// A fixed projection of named columns; the table's physical column
    /// order is irrelevant.
    pub fn read_frame_records(&self) -> Result<Vec<RawFrameRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT rowid, frame_time, gop_start_rowid, sps_bytes, pps_bytes, \
             frame_bytes, chunk_complete \
             FROM frame_raw_data_table ORDER BY rowid",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(RawFrameRecord {
                order_key: row.get("rowid")?,
                timestamp_ms: row.get("frame_time")?,
                gop_start_rowid: row.get("gop_start_rowid")?,
                sps: row.get("sps_bytes")?,
                pps: row.get("pps_bytes")?,
                payload: row.get("frame_bytes")?,
                chunk_complete: row.get::<_, Option<i64>>("chunk_complete")?.unwrap_or(0) != 0,
            })
        })?;

        let mut records = Vec::new();
        for record in rows {
            records.push(record?);
        }
        Ok(records)
    }
}
