//! Durable key/value store backing the workboard record set.
//!
//! Values are stored as JSON: easy to read for humans, should we ever need
//! to debug inside the database file.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};

/// Schema for the store table. `expires_at` is NULL for entries that never
/// expire (the record set itself).
const DB_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_entries (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    expires_at INTEGER
);
"#;

/// Key/value store with optional per-entry expiry.
///
/// Unlike the result cache, nothing here ever waits on the gateway while
/// holding the lock: callers complete remote lookups before opening a
/// transaction, so a plain sync mutex suffices.
pub struct Database {
  conn: Mutex<Connection>,
}

impl Database {
  /// Open or create the database inside `dir`.
  pub fn open(dir: &Path) -> Result<Self> {
    std::fs::create_dir_all(dir)?;

    let conn = Connection::open(dir.join("workboard.db"))?;
    conn.execute_batch(DB_SCHEMA)?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Take exclusive access for one read-modify-write sequence.
  pub fn transact(&self) -> Result<DbTransaction<'_>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| Error::LockPoisoned(e.to_string()))?;
    Ok(DbTransaction { conn })
  }
}

/// Exclusive access to the store for one composed sequence of operations.
pub struct DbTransaction<'a> {
  conn: MutexGuard<'a, Connection>,
}

impl DbTransaction<'_> {
  pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
    match self.get_raw(key)? {
      Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
      None => Ok(None),
    }
  }

  pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl_seconds: Option<i64>) -> Result<()> {
    let raw = serde_json::to_vec(value)?;
    let expires_at = ttl_seconds.map(|ttl| Utc::now().timestamp() + ttl);
    self.conn.execute(
      "INSERT OR REPLACE INTO kv_entries (key, value, expires_at) VALUES (?, ?, ?)",
      params![key, raw, expires_at],
    )?;
    Ok(())
  }

  pub fn contains(&self, key: &str) -> Result<bool> {
    Ok(self.get_raw(key)?.is_some())
  }

  /// Expired entries are reclaimed on access, not by a background sweeper.
  fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
    let row: Option<(Vec<u8>, Option<i64>)> = self
      .conn
      .query_row(
        "SELECT value, expires_at FROM kv_entries WHERE key = ?",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()?;

    match row {
      Some((value, None)) => Ok(Some(value)),
      Some((value, Some(expires_at))) if expires_at > Utc::now().timestamp() => Ok(Some(value)),
      Some(_) => {
        self
          .conn
          .execute("DELETE FROM kv_entries WHERE key = ?", params![key])?;
        Ok(None)
      }
      None => Ok(None),
    }
  }
}
