//! SQLite-backed tracking persistence.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use super::types::{PersistenceError, TrackingPersistence, SCHEMA_VERSION};
use crate::tracking::{FuzzyDate, MediaFormat, TrackedUser, TrackingSnapshot, WatchItem};

const LAST_UPDATED_KEY: &str = "last_updated";

/// SQLite-backed tracking persistence.
pub struct SqliteTrackingPersistence {
    conn: Mutex<Connection>,
}

impl SqliteTrackingPersistence {
    /// Open (or create) the database file and migrate it to the current schema.
    pub fn new(path: &Path) -> Result<Self, PersistenceError> {
        let mut conn = Connection::open(path)?;
        Self::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (useful for testing).
    pub fn in_memory() -> Result<Self, PersistenceError> {
        let mut conn = Connection::open_in_memory()?;
        Self::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Wrap an existing connection, migrating it first.
    pub fn from_connection(mut conn: Connection) -> Result<Self, PersistenceError> {
        Self::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Schema version currently recorded in the database.
    pub fn schema_version(&self) -> Result<i64, PersistenceError> {
        let conn = self.lock()?;
        Ok(read_user_version(&conn)?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, PersistenceError> {
        self.conn.lock().map_err(|_| PersistenceError::Poisoned)
    }

    fn migrate(conn: &mut Connection) -> Result<(), PersistenceError> {
        let version = read_user_version(conn)?;
        if version > SCHEMA_VERSION {
            return Err(PersistenceError::UnsupportedVersion { found: version });
        }
        if version == SCHEMA_VERSION {
            return Ok(());
        }

        let tx = conn.transaction()?;
        match version {
            0 => create_schema(&tx)?,
            1 => {
                info!("Migrating tracking database from schema 1 to 2");
                migrate_v1_to_v2(&tx)?;
            }
            found => return Err(PersistenceError::UnsupportedVersion { found }),
        }
        tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        tx.commit()?;
        Ok(())
    }

    fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<WatchItem> {
        let id: i64 = row.get(0)?;
        let format: Option<String> = row.get(2)?;
        let year: Option<i32> = row.get(3)?;
        let month: Option<u32> = row.get(4)?;
        let day: Option<u32> = row.get(5)?;
        let download_time: Option<String> = row.get(12)?;

        let start_date = (year.is_some() || month.is_some() || day.is_some())
            .then_some(FuzzyDate { year, month, day });

        Ok(WatchItem {
            id: id as u64,
            title: row.get(1)?,
            format: format.as_deref().and_then(MediaFormat::parse),
            start_date,
            manual: row.get(6)?,
            is_setup: row.get(7)?,
            no_results: row.get(8)?,
            is_blacklisted: row.get(9)?,
            observe: row.get(10)?,
            is_stalled: row.get(11)?,
            download_time: download_time.as_deref().and_then(parse_timestamp),
        })
    }
}

fn read_user_version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
}

fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS watch_items (
            id INTEGER PRIMARY KEY,
            title TEXT,
            format TEXT,
            start_year INTEGER,
            start_month INTEGER,
            start_day INTEGER,
            manual TEXT,
            is_setup INTEGER NOT NULL DEFAULT 0,
            no_results INTEGER NOT NULL DEFAULT 0,
            is_blacklisted INTEGER NOT NULL DEFAULT 0,
            observe TEXT,
            is_stalled INTEGER NOT NULL DEFAULT 0,
            download_time TEXT
        );

        CREATE TABLE IF NOT EXISTS tracked_users (
            username TEXT PRIMARY KEY,
            last_updated TEXT
        );

        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )
}

// Schema 1 had no format, no_results, blacklist, observe or stall tracking,
// flagged seederless items with `no_seeders` and kept a `work_active` meta flag.
fn migrate_v1_to_v2(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        ALTER TABLE watch_items ADD COLUMN format TEXT DEFAULT 'TV';
        ALTER TABLE watch_items ADD COLUMN no_results INTEGER NOT NULL DEFAULT 0;
        ALTER TABLE watch_items ADD COLUMN is_blacklisted INTEGER NOT NULL DEFAULT 0;
        ALTER TABLE watch_items ADD COLUMN observe TEXT;
        ALTER TABLE watch_items ADD COLUMN is_stalled INTEGER NOT NULL DEFAULT 0;
        ALTER TABLE watch_items DROP COLUMN no_seeders;
        DELETE FROM meta WHERE key = 'work_active';
        "#,
    )
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

impl TrackingPersistence for SqliteTrackingPersistence {
    fn load(&self) -> Result<TrackingSnapshot, PersistenceError> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, title, format, start_year, start_month, start_day, manual, is_setup,
                    no_results, is_blacklisted, observe, is_stalled, download_time
             FROM watch_items ORDER BY id",
        )?;
        let items = stmt
            .query_map([], Self::row_to_item)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt =
            conn.prepare("SELECT username, last_updated FROM tracked_users ORDER BY username")?;
        let users = stmt
            .query_map([], |row| {
                let last_updated: Option<String> = row.get(1)?;
                Ok(TrackedUser {
                    username: row.get(0)?,
                    last_updated: last_updated.as_deref().and_then(parse_timestamp),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let last_updated: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![LAST_UPDATED_KEY],
                |row| row.get(0),
            )
            .optional()?;
        let last_updated = match last_updated {
            Some(raw) => Some(parse_timestamp(&raw).ok_or_else(|| {
                PersistenceError::Corrupt(format!("invalid last update time: {}", raw))
            })?),
            None => None,
        };

        Ok(TrackingSnapshot {
            items,
            users,
            last_updated,
        })
    }

    fn save(&self, snapshot: &TrackingSnapshot) -> Result<(), PersistenceError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM watch_items", [])?;
        tx.execute("DELETE FROM tracked_users", [])?;
        {
            let mut insert_item = tx.prepare(
                "INSERT INTO watch_items (id, title, format, start_year, start_month, start_day,
                    manual, is_setup, no_results, is_blacklisted, observe, is_stalled,
                    download_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for item in &snapshot.items {
                let date = item.start_date.unwrap_or_default();
                insert_item.execute(params![
                    item.id as i64,
                    item.title,
                    item.format.map(|f| f.as_str()),
                    date.year,
                    date.month,
                    date.day,
                    item.manual,
                    item.is_setup,
                    item.no_results,
                    item.is_blacklisted,
                    item.observe,
                    item.is_stalled,
                    item.download_time.map(|t| t.to_rfc3339()),
                ])?;
            }

            let mut insert_user =
                tx.prepare("INSERT INTO tracked_users (username, last_updated) VALUES (?1, ?2)")?;
            for user in &snapshot.users {
                insert_user.execute(params![
                    user.username,
                    user.last_updated.map(|t| t.to_rfc3339()),
                ])?;
            }
        }

        match snapshot.last_updated {
            Some(time) => {
                tx.execute(
                    "INSERT INTO meta (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![LAST_UPDATED_KEY, time.to_rfc3339()],
                )?;
            }
            None => {
                tx.execute("DELETE FROM meta WHERE key = ?1", params![LAST_UPDATED_KEY])?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}
