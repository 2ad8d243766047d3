//! SQLite-backed local store.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use super::schema::LOCAL_STORE_VERSIONED_SCHEMAS;
use super::{LocalStore, StoreCounts};
use crate::records::{DownloadRecord, DownloadStatus, SearchHistoryEntry, SettingEntry};
use crate::sqlite_persistence::BASE_DB_VERSION;

/// SQLite-backed local store.
///
/// Stores the three synchronized record kinds in a single database file.
pub struct SqliteLocalStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLocalStore {
    /// Create a new SqliteLocalStore.
    ///
    /// Opens an existing database or creates a new one with the current schema.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = if db_path.as_ref().exists() {
            Connection::open_with_flags(
                &db_path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                    | rusqlite::OpenFlags::SQLITE_OPEN_URI
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?
        } else {
            let conn = Connection::open(&db_path)?;
            LOCAL_STORE_VERSIONED_SCHEMAS
                .last()
                .context("No schemas defined")?
                .create(&conn)?;
            info!("Created new local store database at {:?}", db_path.as_ref());
            conn
        };

        // Read the database version
        let db_version = conn
            .query_row("PRAGMA user_version;", [], |row| row.get::<usize, i64>(0))
            .context("Failed to read database version")?
            - BASE_DB_VERSION as i64;

        if db_version < 0 {
            bail!(
                "Local store database version {} is too old, does not contain base db version {}",
                db_version,
                BASE_DB_VERSION
            );
        }
        let version = db_version as usize;

        let schema_count = LOCAL_STORE_VERSIONED_SCHEMAS.len();
        if version >= schema_count {
            bail!(
                "Local store database version {} is too new (max supported: {})",
                version,
                schema_count - 1
            );
        }

        // Validate schema matches expected structure
        LOCAL_STORE_VERSIONED_SCHEMAS
            .get(version)
            .context("Failed to get schema")?
            .validate(&conn)?;

        // Run migrations if needed
        Self::migrate_if_needed(&conn, version)?;

        Ok(SqliteLocalStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store for testing.
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        LOCAL_STORE_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;

        Ok(SqliteLocalStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run any pending migrations.
    fn migrate_if_needed(conn: &Connection, current_version: usize) -> Result<()> {
        let target_version = LOCAL_STORE_VERSIONED_SCHEMAS.len() - 1;

        if current_version >= target_version {
            return Ok(());
        }

        info!(
            "Migrating local store database from version {} to {}",
            current_version, target_version
        );

        for schema in LOCAL_STORE_VERSIONED_SCHEMAS
            .iter()
            .skip(current_version + 1)
        {
            if let Some(migration_fn) = schema.migration {
                info!("Running local store migration to version {}", schema.version);
                migration_fn(conn)?;
            }
        }

        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + target_version),
            [],
        )?;

        Ok(())
    }

    /// Helper to convert a database row to a DownloadRecord.
    fn row_to_download(row: &rusqlite::Row) -> rusqlite::Result<DownloadRecord> {
        Ok(DownloadRecord {
            id: row.get("id")?,
            title: row.get("title")?,
            url: row.get("url")?,
            format: row.get("format")?,
            path: row.get("path")?,
            timestamp: row.get("timestamp")?,
            status: DownloadStatus::from_str(&row.get::<_, String>("status")?)
                .unwrap_or(DownloadStatus::Pending),
            platform: row.get("platform")?,
            thumbnail: row.get("thumbnail")?,
            size_bytes: row
                .get::<_, Option<i64>>("size_bytes")?
                .map(|bytes| bytes as u64),
        })
    }

    /// Helper to convert a database row to a SearchHistoryEntry.
    fn row_to_history(row: &rusqlite::Row) -> rusqlite::Result<SearchHistoryEntry> {
        Ok(SearchHistoryEntry {
            id: row.get("id")?,
            query: row.get("query")?,
            timestamp: row.get("timestamp")?,
            title: row.get("title")?,
            thumbnail: row.get("thumbnail")?,
        })
    }

    fn insert_download(conn: &Connection, record: &DownloadRecord) -> Result<()> {
        conn.execute(
            r#"INSERT INTO downloads (
                id, title, url, format, path, timestamp, status, platform,
                thumbnail, size_bytes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
            rusqlite::params![
                record.id,
                record.title,
                record.url,
                record.format,
                record.path,
                record.timestamp,
                record.status.as_str(),
                record.platform,
                record.thumbnail,
                record.size_bytes.map(|bytes| bytes as i64),
            ],
        )?;
        Ok(())
    }

    fn insert_history(conn: &Connection, entry: &SearchHistoryEntry) -> Result<()> {
        conn.execute(
            r#"INSERT INTO search_history (id, query, timestamp, title, thumbnail)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            rusqlite::params![
                entry.id,
                entry.query,
                entry.timestamp,
                entry.title,
                entry.thumbnail,
            ],
        )?;
        Ok(())
    }
}

impl LocalStore for SqliteLocalStore {
    // === Downloads ===

    fn list_downloads(&self) -> Result<Vec<DownloadRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM downloads ORDER BY timestamp DESC, id ASC")?;
        let records = stmt
            .query_map([], Self::row_to_download)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn get_download(&self, id: &str) -> Result<Option<DownloadRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM downloads WHERE id = ?1")?;
        let record = stmt.query_row([id], Self::row_to_download).optional()?;
        Ok(record)
    }

    fn add_download(&self, record: &DownloadRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::insert_download(&conn, record)
    }

    fn update_download_status(&self, id: &str, status: DownloadStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE downloads SET status = ?1 WHERE id = ?2",
            rusqlite::params![status.as_str(), id],
        )?;
        if updated == 0 {
            bail!("Download not found: {}", id);
        }
        Ok(())
    }

    fn delete_download(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM downloads WHERE id = ?1", [id])?;
        Ok(())
    }

    fn clear_downloads(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM downloads", [])?;
        Ok(())
    }

    fn replace_downloads(&self, records: &[DownloadRecord]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM downloads", [])?;
        for record in records {
            Self::insert_download(&tx, record)?;
        }
        tx.commit()?;
        Ok(())
    }

    // === Search history ===

    fn list_search_history(&self) -> Result<Vec<SearchHistoryEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM search_history ORDER BY timestamp DESC, id ASC")?;
        let entries = stmt
            .query_map([], Self::row_to_history)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn add_search_history(&self, entry: &SearchHistoryEntry, max_entries: usize) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        Self::insert_history(&tx, entry)?;
        // Trim to the cap, dropping the oldest entries
        tx.execute(
            r#"DELETE FROM search_history WHERE id NOT IN (
                SELECT id FROM search_history ORDER BY timestamp DESC, id ASC LIMIT ?1
            )"#,
            [max_entries],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete_search_history(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM search_history WHERE id = ?1", [id])?;
        Ok(())
    }

    fn clear_search_history(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM search_history", [])?;
        Ok(())
    }

    fn replace_search_history(&self, entries: &[SearchHistoryEntry]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM search_history", [])?;
        for entry in entries {
            Self::insert_history(&tx, entry)?;
        }
        tx.commit()?;
        Ok(())
    }

    // === Settings ===

    fn get_setting(&self, key: &str) -> Result<Option<SettingEntry>> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value.map(|value| SettingEntry::new(key, value)))
    }

    fn get_all_settings(&self) -> Result<Vec<SettingEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT key, value FROM settings ORDER BY key ASC")?;
        let entries = stmt
            .query_map([], |row| {
                Ok(SettingEntry {
                    key: row.get(0)?,
                    value: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn save_setting(&self, entry: &SettingEntry) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO settings (key, value) VALUES (?1, ?2)
               ON CONFLICT(key) DO UPDATE SET value = excluded.value"#,
            rusqlite::params![entry.key, entry.value],
        )?;
        Ok(())
    }

    fn delete_setting(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM settings WHERE key = ?1", [key])?;
        Ok(())
    }

    fn replace_settings(&self, entries: &[SettingEntry]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM settings", [])?;
        for entry in entries {
            tx.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)",
                rusqlite::params![entry.key, entry.value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // === Status ===

    fn counts(&self) -> Result<StoreCounts> {
        let conn = self.conn.lock().unwrap();
        let downloads: i64 =
            conn.query_row("SELECT COUNT(*) FROM downloads", [], |row| row.get(0))?;
        let search_history: i64 =
            conn.query_row("SELECT COUNT(*) FROM search_history", [], |row| row.get(0))?;
        let settings: i64 =
            conn.query_row("SELECT COUNT(*) FROM settings", [], |row| row.get(0))?;
        Ok(StoreCounts {
            downloads: downloads as usize,
            search_history: search_history as usize,
            settings: settings as usize,
        })
    }
}
