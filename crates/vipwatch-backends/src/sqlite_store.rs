//! SQLite-backed profile store and detection log.
//!
//! Analytics read the log through `idx_detection_logs_date` with an explicit
//! `INDEXED BY`, so a missing index is reported as such instead of silently
//! degrading into a full scan.

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use tokio_rusqlite::Connection;
use vipwatch_core::analytics;
use vipwatch_core::types::DATE_FORMAT;
use vipwatch_core::{
    AnalyticsSummary, DetectionEvent, MatchedIdentity, Profile, ProfileStore, StoreError,
};

/// Name of the secondary index on `detection_logs(detection_date)`.
pub const DATE_INDEX: &str = "idx_detection_logs_date";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS profiles (
    face_id       TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    category      TEXT NOT NULL,
    notes         TEXT,
    date_of_birth TEXT,
    last_visit    TEXT NOT NULL,
    tags          TEXT NOT NULL DEFAULT '[]'
);
CREATE TABLE IF NOT EXISTS detection_logs (
    log_id         TEXT PRIMARY KEY,
    timestamp      TEXT NOT NULL,
    detection_date TEXT NOT NULL,
    detection_hour INTEGER NOT NULL,
    is_vip         INTEGER NOT NULL,
    face_id        TEXT,
    vip_name       TEXT,
    vip_category   TEXT
);
";

const DATE_INDEX_DDL: &str =
    "CREATE INDEX IF NOT EXISTS idx_detection_logs_date ON detection_logs(detection_date);";

const PROFILE_COLUMNS: &str = "face_id, name, category, notes, date_of_birth, last_visit, tags";

/// Schema provisioning switches applied when the store is opened.
#[derive(Debug, Clone, Copy)]
pub struct SchemaOptions {
    /// Create the date index on the detection log if it is absent.
    pub provision_date_index: bool,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            provision_date_index: true,
        }
    }
}

/// Profile row as stored; `tags` is a JSON array.
struct ProfileRow {
    face_id: String,
    name: String,
    category: String,
    notes: Option<String>,
    date_of_birth: Option<String>,
    last_visit: String,
    tags: String,
}

impl ProfileRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            face_id: row.get(0)?,
            name: row.get(1)?,
            category: row.get(2)?,
            notes: row.get(3)?,
            date_of_birth: row.get(4)?,
            last_visit: row.get(5)?,
            tags: row.get(6)?,
        })
    }

    fn into_profile(self) -> Result<Profile, StoreError> {
        let tags: Vec<String> = serde_json::from_str(&self.tags)
            .map_err(|e| StoreError::Corrupt(format!("tags of {}: {e}", self.face_id)))?;
        Ok(Profile {
            face_id: self.face_id,
            name: self.name,
            category: self.category,
            notes: self.notes,
            date_of_birth: self.date_of_birth,
            last_visit: self.last_visit,
            tags,
        })
    }
}

fn store_error(err: tokio_rusqlite::Error) -> StoreError {
    match err {
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(_, Some(msg)))
            if msg.starts_with("no such index") =>
        {
            StoreError::IndexMissing(DATE_INDEX.to_string())
        }
        other => StoreError::Backend(other.to_string()),
    }
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    pub async fn open(path: &Path, options: SchemaOptions) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Backend(format!("{}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path).await.map_err(store_error)?;
        tracing::info!(path = %path.display(), "profile store opened");
        Self::init(conn, options).await
    }

    /// Private in-memory database; contents are lost when the store is dropped.
    pub async fn open_in_memory(options: SchemaOptions) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await.map_err(store_error)?;
        Self::init(conn, options).await
    }

    async fn init(conn: Connection, options: SchemaOptions) -> Result<Self, StoreError> {
        conn.call(move |c| {
            c.execute_batch(SCHEMA)?;
            if options.provision_date_index {
                c.execute_batch(DATE_INDEX_DDL)?;
            }
            Ok(())
        })
        .await
        .map_err(store_error)?;

        if !options.provision_date_index {
            tracing::warn!(index = DATE_INDEX, "date index provisioning disabled; analytics need it");
        }
        Ok(Self { conn })
    }

    /// Whether the date index currently exists.
    pub async fn has_date_index(&self) -> Result<bool, StoreError> {
        self.conn
            .call(|c| {
                let found = c
                    .query_row(
                        "SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?1",
                        [DATE_INDEX],
                        |_| Ok(()),
                    )
                    .optional()?;
                Ok(found.is_some())
            })
            .await
            .map_err(store_error)
    }
}

#[async_trait]
impl ProfileStore for SqliteStore {
    async fn get(&self, face_id: &str) -> Result<Option<Profile>, StoreError> {
        let face_id = face_id.to_string();
        let row = self
            .conn
            .call(move |c| {
                let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE face_id = ?1");
                Ok(c.query_row(&sql, [face_id], ProfileRow::from_row).optional()?)
            })
            .await
            .map_err(store_error)?;
        row.map(ProfileRow::into_profile).transpose()
    }

    async fn list(&self) -> Result<Vec<Profile>, StoreError> {
        let rows = self
            .conn
            .call(|c| {
                let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY name, face_id");
                let mut stmt = c.prepare(&sql)?;
                let rows = stmt
                    .query_map([], ProfileRow::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
            .map_err(store_error)?;
        rows.into_iter().map(ProfileRow::into_profile).collect()
    }

    async fn upsert(&self, profile: &Profile) -> Result<(), StoreError> {
        let tags = serde_json::to_string(&profile.tags)
            .map_err(|e| StoreError::Corrupt(format!("tags: {e}")))?;
        let p = profile.clone();
        self.conn
            .call(move |c| {
                c.execute(
                    "INSERT OR REPLACE INTO profiles
                         (face_id, name, category, notes, date_of_birth, last_visit, tags)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![p.face_id, p.name, p.category, p.notes, p.date_of_birth, p.last_visit, tags],
                )?;
                Ok(())
            })
            .await
            .map_err(store_error)
    }

    async fn delete(&self, face_id: &str) -> Result<(), StoreError> {
        let face_id = face_id.to_string();
        self.conn
            .call(move |c| {
                c.execute("DELETE FROM profiles WHERE face_id = ?1", [face_id])?;
                Ok(())
            })
            .await
            .map_err(store_error)
    }

    async fn touch_last_visit(&self, face_id: &str, timestamp: &str) -> Result<(), StoreError> {
        let (face_id, timestamp) = (face_id.to_string(), timestamp.to_string());
        self.conn
            .call(move |c| {
                c.execute(
                    "UPDATE profiles SET last_visit = ?2 WHERE face_id = ?1",
                    [face_id, timestamp],
                )?;
                Ok(())
            })
            .await
            .map_err(store_error)
    }

    async fn append_log(&self, event: &DetectionEvent) -> Result<(), StoreError> {
        let e = event.clone();
        self.conn
            .call(move |c| {
                let (face_id, name, category) = match &e.identity {
                    Some(id) => (Some(&id.face_id), Some(&id.name), Some(&id.category)),
                    None => (None, None, None),
                };
                c.execute(
                    "INSERT INTO detection_logs
                         (log_id, timestamp, detection_date, detection_hour, is_vip, face_id, vip_name, vip_category)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        e.log_id,
                        e.timestamp,
                        e.detection_date,
                        e.detection_hour,
                        e.identity.is_some(),
                        face_id,
                        name,
                        category
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(store_error)
    }

    async fn aggregate(&self, date: NaiveDate) -> Result<AnalyticsSummary, StoreError> {
        let key = date.format(DATE_FORMAT).to_string();
        let date_key = key.clone();
        let events = self
            .conn
            .call(move |c| {
                // Rows come back in index order: (detection_date, rowid).
                let sql = format!(
                    "SELECT log_id, timestamp, detection_date, detection_hour, is_vip, face_id, vip_name, vip_category
                     FROM detection_logs INDEXED BY {DATE_INDEX}
                     WHERE detection_date = ?1"
                );
                let mut stmt = c.prepare(&sql)?;
                let events = stmt
                    .query_map([date_key], |row| {
                        let is_vip: bool = row.get(4)?;
                        let identity = if is_vip {
                            Some(MatchedIdentity {
                                face_id: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                                name: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                                category: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                            })
                        } else {
                            None
                        };
                        Ok(DetectionEvent {
                            log_id: row.get(0)?,
                            timestamp: row.get(1)?,
                            detection_date: row.get(2)?,
                            detection_hour: row.get(3)?,
                            identity,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(events)
            })
            .await
            .map_err(store_error)?;

        tracing::debug!(date = %key, events = events.len(), "aggregating detection log");
        Ok(analytics::summarize(&key, &events))
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}
