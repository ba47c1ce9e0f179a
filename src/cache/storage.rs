//! SQLite implementation of the result cache.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::Result;

/// Schema for the cache table.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    expires_at INTEGER NOT NULL
);
"#;

/// SQLite-backed cache for gateway query results.
///
/// The connection sits behind an async mutex: [`CacheStorage::transact`]
/// yields a guard, and a fetch-or-populate sequence (read absent → run the
/// gateway → write) holds it for the whole sequence, so concurrent callers
/// on the same key cannot interleave.
pub struct CacheStorage {
  conn: Mutex<Connection>,
}

impl CacheStorage {
  /// Open or create the cache database inside `dir`.
  pub fn open(dir: &Path) -> Result<Self> {
    std::fs::create_dir_all(dir)?;

    let conn = Connection::open(dir.join("cache.db"))?;
    conn.execute_batch(CACHE_SCHEMA)?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Take exclusive access for one composed sequence of cache operations.
  pub async fn transact(&self) -> CacheTransaction<'_> {
    CacheTransaction {
      conn: self.conn.lock().await,
    }
  }
}

/// Exclusive access to the cache for one composed sequence of operations.
pub struct CacheTransaction<'a> {
  conn: MutexGuard<'a, Connection>,
}

impl CacheTransaction<'_> {
  /// Look up a key. Expired entries are reclaimed here, on access; there is
  /// no background sweeper.
  pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
    let row: Option<(Vec<u8>, i64)> = self
      .conn
      .query_row(
        "SELECT value, expires_at FROM cache_entries WHERE key = ?",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()?;

    match row {
      Some((value, expires_at)) if expires_at > Utc::now().timestamp() => Ok(Some(value)),
      Some(_) => {
        debug!(key, "Reclaiming expired cache entry");
        self
          .conn
          .execute("DELETE FROM cache_entries WHERE key = ?", params![key])?;
        Ok(None)
      }
      None => Ok(None),
    }
  }

  pub fn set(&self, key: &str, value: &[u8], ttl_seconds: i64) -> Result<()> {
    let expires_at = Utc::now().timestamp() + ttl_seconds;
    self.conn.execute(
      "INSERT OR REPLACE INTO cache_entries (key, value, expires_at) VALUES (?, ?, ?)",
      params![key, value, expires_at],
    )?;
    Ok(())
  }

  pub fn remove(&self, key: &str) -> Result<()> {
    self
      .conn
      .execute("DELETE FROM cache_entries WHERE key = ?", params![key])?;
    Ok(())
  }

  /// Delete every entry whose key contains `needle`.
  ///
  /// Brute-force substring matching can hit unrelated keys. A false positive
  /// only costs an extra gateway call, while an exact-match scheme that
  /// misses a key would keep serving stale data, so the bias is toward
  /// over-invalidation.
  pub fn invalidate_matching(&self, needle: &str) -> Result<usize> {
    let mut stmt = self.conn.prepare("SELECT key FROM cache_entries")?;
    let keys: Vec<String> = stmt
      .query_map([], |row| row.get(0))?
      .collect::<std::result::Result<_, _>>()?;

    let mut removed = 0;
    for key in keys.iter().filter(|k| k.contains(needle)) {
      debug!(key = key.as_str(), "Uncaching value");
      removed += self
        .conn
        .execute("DELETE FROM cache_entries WHERE key = ?", params![key])?;
    }
    Ok(removed)
  }
}
