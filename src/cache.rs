//! SQLite-backed TTL cache for provider responses.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, anyhow};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Provider response cache stored in a local SQLite database.
pub struct SqliteCache {
    conn: Mutex<Connection>,
    ttl: Duration,
}

impl SqliteCache {
    /// Opens the on-disk cache database, creating its directory and schema when missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the database cannot be opened.
    pub fn new(ttl_minutes: u64) -> anyhow::Result<Self> {
        let db_path = cache_db_path();
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create cache directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(&db_path)
            .with_context(|| format!("failed to open sqlite cache at {}", db_path.display()))?;
        Self::from_connection(conn, ttl_minutes)
    }

    #[cfg(test)]
    pub fn in_memory(ttl_minutes: u64) -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite cache")?;
        Self::from_connection(conn, ttl_minutes)
    }

    fn from_connection(conn: Connection, ttl_minutes: u64) -> anyhow::Result<Self> {
        conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS provider_cache (
  cache_key TEXT PRIMARY KEY,
  payload TEXT NOT NULL,
  expires_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_provider_cache_expires_at ON provider_cache (expires_at);
"#,
        )
        .context("failed to initialize sqlite cache schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
            ttl: Duration::from_secs(ttl_minutes.max(1) * 60),
        })
    }

    /// Returns the cached payload for `key`, or `None` when absent or expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQLite query fails or the stored payload no longer decodes.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        let Some(payload) = self.get(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&payload)
            .map(Some)
            .with_context(|| format!("failed to decode cached payload for {key}"))
    }

    /// Stores `value` under `key` with a fresh expiry.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the SQLite write fails.
    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let payload = serde_json::to_string(value)
            .with_context(|| format!("failed to encode cache payload for {key}"))?;
        self.set(key, &payload)
    }

    /// Deletes every expired row and returns how many were removed.
    pub fn purge_expired(&self) -> anyhow::Result<usize> {
        let now = unix_now()?;
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM provider_cache WHERE expires_at <= ?1",
            params![now],
        )
        .context("failed to purge expired sqlite cache entries")
    }

    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let now = unix_now()?;
        let conn = self.lock()?;

        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT payload, expires_at FROM provider_cache WHERE cache_key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("failed to query sqlite cache entry")?;

        match row {
            Some((payload, expires_at)) if expires_at > now => Ok(Some(payload)),
            Some(_) => {
                conn.execute(
                    "DELETE FROM provider_cache WHERE cache_key = ?1",
                    params![key],
                )
                .context("failed to delete expired sqlite cache entry")?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, payload: &str) -> anyhow::Result<()> {
        let ttl_seconds =
            i64::try_from(self.ttl.as_secs()).context("cache ttl seconds exceeds i64 range")?;
        let expires_at = unix_now()?
            .checked_add(ttl_seconds)
            .ok_or_else(|| anyhow!("cache expiry timestamp overflow"))?;
        let conn = self.lock()?;

        conn.execute(
            r#"
INSERT INTO provider_cache (cache_key, payload, expires_at)
VALUES (?1, ?2, ?3)
ON CONFLICT(cache_key) DO UPDATE SET
  payload = excluded.payload,
  expires_at = excluded.expires_at
"#,
            params![key, payload, expires_at],
        )
        .context("failed to upsert sqlite cache entry")?;

        Ok(())
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("sqlite cache mutex poisoned"))
    }
}

fn cache_db_path() -> PathBuf {
    if let Some(explicit) = env::var_os("INSTALL_GUARD_CACHE_DB_PATH") {
        return PathBuf::from(explicit);
    }

    let home = env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .or_else(|| env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    home.join(".cache").join("install-guard").join("cache.db")
}

fn unix_now() -> anyhow::Result<i64> {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before unix epoch")?;
    i64::try_from(since_epoch.as_secs()).context("unix timestamp exceeds i64 range")
}
