//! SQLite-backed partition store.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use crate::error::CacheError;
use crate::fetch::StoredResponse;

use super::traits::PartitionStore;

/// Persistent partition store on a single SQLite database.
///
/// Insertion order is the rowid sequence: `INSERT OR REPLACE` assigns a new
/// rowid, so overwriting a key also moves it to the back of the FIFO.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

/// Schema for partition tables.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS partitions (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS entries (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    partition TEXT NOT NULL,
    request_key TEXT NOT NULL,
    response BLOB NOT NULL,
    UNIQUE (partition, request_key)
);

CREATE INDEX IF NOT EXISTS idx_entries_partition ON entries(partition, seq);
"#;

impl SqliteStore {
  /// Open the store at the default location.
  pub fn open() -> Result<Self, CacheError> {
    let path = Self::default_path()?;
    Self::open_at(&path)
  }

  /// Open the store at an explicit path, creating parent directories.
  pub fn open_at(path: &Path) -> Result<Self, CacheError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| CacheError::Storage(format!("failed to create cache directory: {}", e)))?;
    }

    let conn = Connection::open(path).map_err(|e| {
      CacheError::Storage(format!("failed to open cache database at {}: {}", path.display(), e))
    })?;

    conn
      .execute_batch(SCHEMA)
      .map_err(|e| CacheError::Storage(format!("failed to run migrations: {}", e)))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn default_path() -> Result<std::path::PathBuf, CacheError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| CacheError::Storage("could not determine data directory".into()))?;

    Ok(data_dir.join("cachefront").join("cache.db"))
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CacheError> {
    self
      .conn
      .lock()
      .map_err(|e| CacheError::Storage(format!("lock poisoned: {}", e)))
  }
}

impl PartitionStore for SqliteStore {
  fn open(&self, partition: &str) -> Result<(), CacheError> {
    let conn = self.lock()?;

    conn
      .execute(
        "INSERT OR IGNORE INTO partitions (name) VALUES (?)",
        params![partition],
      )
      .map_err(|e| CacheError::Storage(format!("failed to open partition: {}", e)))?;

    Ok(())
  }

  fn get(&self, partition: &str, key: &str) -> Result<Option<StoredResponse>, CacheError> {
    let conn = self.lock()?;

    let blob: Option<Vec<u8>> = conn
      .query_row(
        "SELECT response FROM entries WHERE partition = ? AND request_key = ?",
        params![partition, key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| CacheError::Storage(format!("failed to read entry: {}", e)))?;

    match blob {
      Some(data) => {
        let response: StoredResponse = serde_json::from_slice(&data)
          .map_err(|e| CacheError::Storage(format!("failed to deserialize entry: {}", e)))?;
        Ok(Some(response))
      }
      None => Ok(None),
    }
  }

  fn put(&self, partition: &str, key: &str, response: &StoredResponse) -> Result<(), CacheError> {
    let data = serde_json::to_vec(response)
      .map_err(|e| CacheError::Storage(format!("failed to serialize entry: {}", e)))?;

    let conn = self.lock()?;

    conn
      .execute(
        "INSERT OR IGNORE INTO partitions (name) VALUES (?)",
        params![partition],
      )
      .map_err(|e| CacheError::Storage(format!("failed to open partition: {}", e)))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO entries (partition, request_key, response) VALUES (?, ?, ?)",
        params![partition, key, data],
      )
      .map_err(|e| CacheError::Storage(format!("failed to write entry: {}", e)))?;

    Ok(())
  }

  fn delete(&self, partition: &str, key: &str) -> Result<bool, CacheError> {
    let conn = self.lock()?;

    let affected = conn
      .execute(
        "DELETE FROM entries WHERE partition = ? AND request_key = ?",
        params![partition, key],
      )
      .map_err(|e| CacheError::Storage(format!("failed to delete entry: {}", e)))?;

    Ok(affected > 0)
  }

  fn list_keys(&self, partition: &str) -> Result<Vec<String>, CacheError> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT request_key FROM entries WHERE partition = ? ORDER BY seq")
      .map_err(|e| CacheError::Storage(format!("failed to prepare key listing: {}", e)))?;

    let keys = stmt
      .query_map(params![partition], |row| row.get(0))
      .map_err(|e| CacheError::Storage(format!("failed to list keys: {}", e)))?
      .collect::<Result<Vec<String>, _>>()
      .map_err(|e| CacheError::Storage(format!("failed to list keys: {}", e)))?;

    Ok(keys)
  }

  fn delete_partition(&self, partition: &str) -> Result<(), CacheError> {
    let conn = self.lock()?;

    conn
      .execute("DELETE FROM entries WHERE partition = ?", params![partition])
      .map_err(|e| CacheError::Storage(format!("failed to delete partition entries: {}", e)))?;

    conn
      .execute("DELETE FROM partitions WHERE name = ?", params![partition])
      .map_err(|e| CacheError::Storage(format!("failed to delete partition: {}", e)))?;

    Ok(())
  }

  fn list_partitions(&self) -> Result<Vec<String>, CacheError> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT name FROM partitions ORDER BY name")
      .map_err(|e| CacheError::Storage(format!("failed to prepare partition listing: {}", e)))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| CacheError::Storage(format!("failed to list partitions: {}", e)))?
      .collect::<Result<Vec<String>, _>>()
      .map_err(|e| CacheError::Storage(format!("failed to list partitions: {}", e)))?;

    Ok(names)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn open_temp() -> (tempfile::TempDir, SqliteStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open_at(&dir.path().join("cache.db")).unwrap();
    (dir, store)
  }

  fn response(body: &str) -> StoredResponse {
    StoredResponse::snapshot(200, Vec::new(), body.as_bytes().to_vec())
  }

  #[test]
  fn test_put_get_roundtrip() {
    let (_dir, store) = open_temp();

    store.put("data-v1", "GET https://a/1", &response("one")).unwrap();

    let got = store.get("data-v1", "GET https://a/1").unwrap().unwrap();
    assert_eq!(got.body, b"one");
    assert_eq!(got.status, 200);

    assert!(store.get("data-v1", "GET https://a/2").unwrap().is_none());
  }

  #[test]
  fn test_keys_in_insertion_order() {
    let (_dir, store) = open_temp();

    store.put("data-v1", "a", &response("1")).unwrap();
    store.put("data-v1", "b", &response("2")).unwrap();
    store.put("data-v1", "c", &response("3")).unwrap();

    assert_eq!(store.list_keys("data-v1").unwrap(), vec!["a", "b", "c"]);
  }

  #[test]
  fn test_overwrite_moves_key_to_back() {
    let (_dir, store) = open_temp();

    store.put("data-v1", "a", &response("1")).unwrap();
    store.put("data-v1", "b", &response("2")).unwrap();
    store.put("data-v1", "a", &response("1b")).unwrap();

    assert_eq!(store.list_keys("data-v1").unwrap(), vec!["b", "a"]);
    let got = store.get("data-v1", "a").unwrap().unwrap();
    assert_eq!(got.body, b"1b");
  }

  #[test]
  fn test_partition_lifecycle() {
    let (_dir, store) = open_temp();

    store.open("shell-v1").unwrap();
    store.put("data-v1", "a", &response("1")).unwrap();

    let mut names = store.list_partitions().unwrap();
    names.sort();
    assert_eq!(names, vec!["data-v1", "shell-v1"]);

    store.delete_partition("data-v1").unwrap();
    assert_eq!(store.list_partitions().unwrap(), vec!["shell-v1"]);
    assert!(store.get("data-v1", "a").unwrap().is_none());

    // Deleting an absent partition is not an error
    store.delete_partition("data-v0").unwrap();
  }

  #[test]
  fn test_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");

    {
      let store = SqliteStore::open_at(&path).unwrap();
      store.put("static-v1", "k", &response("shell")).unwrap();
    }

    let store = SqliteStore::open_at(&path).unwrap();
    let got = store.get("static-v1", "k").unwrap().unwrap();
    assert_eq!(got.body, b"shell");
  }
}
