//! `CheckpointStore` backends: one JSON file per key, a SQLite table, or an
//! in-process map.

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use trailstop_core::{CheckpointStore, Result, TradingError};

fn persistence(context: &str, err: impl std::fmt::Display) -> TradingError {
    TradingError::Persistence(format!("{context}: {err}"))
}

/// Keys become file names. Accepts the instrument symbol character set
/// (`[A-Za-z0-9._-]`) but nothing that could name a parent or hidden path.
fn file_key(key: &str) -> Result<&str> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && !key.contains("..")
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if valid {
        Ok(key)
    } else {
        Err(TradingError::Persistence(format!("invalid checkpoint key: {key:?}")))
    }
}

/// Stores each key as `<dir>/<key>.json`.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write leaves the previous checkpoint intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        Ok(self.dir.join(format!("{}.json", file_key(key)?)))
    }
}

#[async_trait]
impl CheckpointStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(persistence(&format!("read {}", path.display()), e)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| persistence(&format!("create {}", self.dir.display()), e))?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value)
            .await
            .map_err(|e| persistence(&format!("write {}", tmp.display()), e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| persistence(&format!("rename to {}", path.display()), e))?;
        Ok(())
    }
}

/// `SQLite` table `checkpoints(key, value, updated_at)`.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file and runs migrations.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the connection or migrations fail.
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| persistence("create database directory", e))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| persistence("connect", e))?;
        Self::migrate(pool).await
    }

    /// In-memory database, one connection so every query sees the same data.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the connection or migrations fail.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| persistence("connect", e))?;
        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| persistence("migrate", e))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl CheckpointStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query_as::<_, (String,)>("SELECT value FROM checkpoints WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| persistence("select checkpoint", e))?;
        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r"
            INSERT INTO checkpoints (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            ",
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| persistence("upsert checkpoint", e))?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_json_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested"));

        assert!(store.get("NIFTY").await.unwrap().is_none());
        store.set("NIFTY", r#"{"a":1}"#).await.unwrap();
        store.set("NIFTY", r#"{"a":2}"#).await.unwrap();
        assert_eq!(store.get("NIFTY").await.unwrap().as_deref(), Some(r#"{"a":2}"#));
        assert!(!dir.path().join("nested/NIFTY.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_json_file_store_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let err = store.set("../escape", "{}").await.unwrap_err();
        assert!(matches!(err, TradingError::Persistence(_)));
        for key in ["..", ".hidden", "a/b", "BTC..USD", ""] {
            assert!(store.set(key, "{}").await.is_err(), "{key:?} accepted");
        }
    }

    #[tokio::test]
    async fn test_json_file_store_accepts_dotted_symbols() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        store.set("BTC.USD", "{}").await.unwrap();
        assert_eq!(store.get("BTC.USD").await.unwrap().as_deref(), Some("{}"));
        assert!(dir.path().join("BTC.USD.json").exists());
    }

    #[tokio::test]
    async fn test_sqlite_store_upserts() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(store.get("NIFTY").await.unwrap().is_none());
        store.set("NIFTY", "one").await.unwrap();
        store.set("NIFTY", "two").await.unwrap();
        assert_eq!(store.get("NIFTY").await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_sqlite_store_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db/checkpoints.db");
        {
            let store = SqliteStore::connect(&path).await.unwrap();
            store.set("NIFTY", "persisted").await.unwrap();
        }
        let store = SqliteStore::connect(&path).await.unwrap();
        assert_eq!(store.get("NIFTY").await.unwrap().as_deref(), Some("persisted"));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(store.get("other").await.unwrap().is_none());
    }
}
