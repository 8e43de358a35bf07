//! Read access to the Messages store (`chat.db`).
//!
//! Only the tables needed to reconstruct one conversation are touched:
//!
//! ```sql
//! message                 (ROWID, handle_id, text, date, is_from_me, cache_has_attachments, ...)
//! chat                    (ROWID, guid, ...)          -- guid is "<service>;-;<account>"
//! chat_handle_join        (chat_id, handle_id)
//! message_attachment_join (message_id, attachment_id)
//! attachment              (ROWID, filename, ...)      -- filename often starts with "~/"
//! ```
//!
//! `message.date` counts from the Apple epoch (2001-01-01 UTC). Stores written by
//! macOS 10.13 and later use nanoseconds, older ones use seconds.
//!
//! The database is opened **read-only**.

use crate::config::SortOrder;
use crate::error::StoreError;
use chrono::{DateTime, Local};
use rusqlite::{Connection, OpenFlags, Row, backup::Backup};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::debug;

/// Seconds between the Unix epoch and 2001-01-01T00:00:00Z.
const APPLE_EPOCH_OFFSET: i64 = 978_307_200;

/// Raw dates above this magnitude are nanoseconds rather than seconds.
const NANOSECOND_THRESHOLD: u64 = 100_000_000_000;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// One exported conversation entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    pub id: i64,
    pub is_from_me: bool,
    pub text: Option<String>,
    pub timestamp: DateTime<Local>,
    pub has_attachment: bool,
    /// Attachment path as the store knows it. Only meaningful with `has_attachment`.
    pub attachment_source_path: Option<String>,
}

/// Which rows to fetch and in what order.
#[derive(Debug, Clone, Copy)]
pub struct RecordQuery<'a> {
    pub chat_guid: &'a str,
    pub order: SortOrder,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

/// Anything that can produce the ordered message rows of a conversation.
pub trait RecordSource {
    fn fetch(&self, query: &RecordQuery<'_>) -> Result<Vec<MessageRecord>, StoreError>;
}

/// [`RecordSource`] backed by a Messages SQLite database.
pub struct SqliteStore {
    conn: Connection,
    // Keeps the snapshot file alive for as long as `conn` reads from it.
    _snapshot: Option<NamedTempFile>,
}

impl SqliteStore {
    /// Open the database in place, read-only.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            conn: open_read_only(path)?,
            _snapshot: None,
        })
    }

    /// Copy the database to a temporary file with the online-backup API and read
    /// from the copy, so a running Messages process cannot change rows mid-query.
    pub fn open_snapshot(path: &Path) -> Result<Self, StoreError> {
        let src = open_read_only(path)?;
        let tmp = NamedTempFile::new().map_err(StoreError::SnapshotFile)?;
        let snapshot_err = |source| StoreError::Snapshot {
            path: path.to_path_buf(),
            source,
        };

        {
            let mut dst = Connection::open(tmp.path()).map_err(snapshot_err)?;
            let backup = Backup::new(&src, &mut dst).map_err(snapshot_err)?;
            backup
                .run_to_completion(1000, Duration::from_millis(5), None)
                .map_err(snapshot_err)?;
        }
        drop(src);
        debug!(snapshot = %tmp.path().display(), "database snapshot complete");

        Ok(Self {
            conn: open_read_only(tmp.path())?,
            _snapshot: Some(tmp),
        })
    }
}

/// A database file that is opened when rows are first requested, so connection
/// failures surface from the fetch stage.
#[derive(Debug, Clone)]
pub struct DatabaseFile {
    pub path: PathBuf,
    pub snapshot: bool,
}

impl RecordSource for DatabaseFile {
    fn fetch(&self, query: &RecordQuery<'_>) -> Result<Vec<MessageRecord>, StoreError> {
        let store = if self.snapshot {
            SqliteStore::open_snapshot(&self.path)?
        } else {
            SqliteStore::open(&self.path)?
        };
        store.fetch(query)
    }
}

fn open_read_only(path: &Path) -> Result<Connection, StoreError> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|source| StoreError::Open {
        path: path.to_path_buf(),
        source,
    })
}

impl RecordSource for SqliteStore {
    fn fetch(&self, query: &RecordQuery<'_>) -> Result<Vec<MessageRecord>, StoreError> {
        let sql = build_query(query);
        debug!(%sql, guid = query.chat_guid, "fetching messages");

        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map([query.chat_guid], map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

/// SQL for one conversation. The guid is bound as `?1`; ordering and paging are
/// typed values, so they are inlined.
pub fn build_query(query: &RecordQuery<'_>) -> String {
    let mut sql = String::from(
        "SELECT m.ROWID, m.is_from_me, m.text, m.date, m.cache_has_attachments, a.filename \
         FROM message m \
         LEFT OUTER JOIN message_attachment_join maj ON maj.message_id = m.ROWID \
         LEFT OUTER JOIN attachment a ON a.ROWID = maj.attachment_id \
         WHERE m.handle_id = (\
         SELECT handle_id FROM chat_handle_join WHERE chat_id = (\
         SELECT ROWID FROM chat WHERE guid = ?1))",
    );

    sql.push_str(" ORDER BY m.date ");
    sql.push_str(query.order.as_sql());

    match (query.limit, query.skip) {
        (Some(limit), _) => sql.push_str(&format!(" LIMIT {}", limit)),
        // SQLite only accepts OFFSET after a LIMIT clause.
        (None, Some(_)) => sql.push_str(" LIMIT -1"),
        (None, None) => {}
    }
    if let Some(skip) = query.skip {
        sql.push_str(&format!(" OFFSET {}", skip));
    }
    sql
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<MessageRecord> {
    let raw_date: i64 = row.get(3)?;
    let timestamp =
        apple_time_to_local(raw_date).ok_or(rusqlite::Error::IntegralValueOutOfRange(3, raw_date))?;

    Ok(MessageRecord {
        id: row.get(0)?,
        is_from_me: row.get::<_, Option<bool>>(1)?.unwrap_or(false),
        text: row.get(2)?,
        timestamp,
        has_attachment: row.get::<_, Option<bool>>(4)?.unwrap_or(false),
        attachment_source_path: row.get(5)?,
    })
}

/// Convert a `message.date` value into local wall-clock time.
pub fn apple_time_to_local(raw: i64) -> Option<DateTime<Local>> {
    let (secs, nanos) = if raw.unsigned_abs() > NANOSECOND_THRESHOLD {
        (raw.div_euclid(NANOS_PER_SEC), raw.rem_euclid(NANOS_PER_SEC) as u32)
    } else {
        (raw, 0)
    };
    let unix = secs.checked_add(APPLE_EPOCH_OFFSET)?;
    DateTime::from_timestamp(unix, nanos).map(|utc| utc.with_timezone(&Local))
}
