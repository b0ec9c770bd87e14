//! In-memory partition store.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::CacheError;
use crate::fetch::StoredResponse;

use super::traits::PartitionStore;

/// Non-persistent store: each partition is a vec in insertion order.
///
/// Used when persistence is disabled and throughout the test suite.
#[derive(Default)]
pub struct MemoryStore {
  partitions: Mutex<HashMap<String, Vec<(String, StoredResponse)>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(
    &self,
  ) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<(String, StoredResponse)>>>, CacheError>
  {
    self
      .partitions
      .lock()
      .map_err(|e| CacheError::Storage(format!("lock poisoned: {}", e)))
  }
}

impl PartitionStore for MemoryStore {
  fn open(&self, partition: &str) -> Result<(), CacheError> {
    self.lock()?.entry(partition.to_string()).or_default();
    Ok(())
  }

  fn get(&self, partition: &str, key: &str) -> Result<Option<StoredResponse>, CacheError> {
    let partitions = self.lock()?;

    Ok(partitions.get(partition).and_then(|entries| {
      entries
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, response)| response.clone())
    }))
  }

  fn put(&self, partition: &str, key: &str, response: &StoredResponse) -> Result<(), CacheError> {
    let mut partitions = self.lock()?;
    let entries = partitions.entry(partition.to_string()).or_default();

    // Replacing a key gives it a fresh insertion position
    entries.retain(|(k, _)| k != key);
    entries.push((key.to_string(), response.clone()));

    Ok(())
  }

  fn delete(&self, partition: &str, key: &str) -> Result<bool, CacheError> {
    let mut partitions = self.lock()?;

    match partitions.get_mut(partition) {
      Some(entries) => {
        let before = entries.len();
        entries.retain(|(k, _)| k != key);
        Ok(entries.len() < before)
      }
      None => Ok(false),
    }
  }

  fn list_keys(&self, partition: &str) -> Result<Vec<String>, CacheError> {
    let partitions = self.lock()?;

    Ok(
      partitions
        .get(partition)
        .map(|entries| entries.iter().map(|(k, _)| k.clone()).collect())
        .unwrap_or_default(),
    )
  }

  fn delete_partition(&self, partition: &str) -> Result<(), CacheError> {
    self.lock()?.remove(partition);
    Ok(())
  }

  fn list_partitions(&self) -> Result<Vec<String>, CacheError> {
    let partitions = self.lock()?;

    let mut names: Vec<String> = partitions.keys().cloned().collect();
    names.sort();
    Ok(names)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn response(body: &str) -> StoredResponse {
    StoredResponse::snapshot(200, Vec::new(), body.as_bytes().to_vec())
  }

  #[test]
  fn test_insertion_order_and_overwrite() {
    let store = MemoryStore::new();

    store.put("data-v1", "a", &response("1")).unwrap();
    store.put("data-v1", "b", &response("2")).unwrap();
    store.put("data-v1", "a", &response("1b")).unwrap();

    assert_eq!(store.list_keys("data-v1").unwrap(), vec!["b", "a"]);
    assert_eq!(store.get("data-v1", "a").unwrap().unwrap().body, b"1b");
  }

  #[test]
  fn test_open_is_lazy_and_idempotent() {
    let store = MemoryStore::new();

    assert!(store.list_partitions().unwrap().is_empty());

    store.open("shell-v1").unwrap();
    store.open("shell-v1").unwrap();
    assert_eq!(store.list_partitions().unwrap(), vec!["shell-v1"]);
    assert!(store.list_keys("shell-v1").unwrap().is_empty());
  }

  #[test]
  fn test_delete() {
    let store = MemoryStore::new();

    store.put("image-v1", "a", &response("1")).unwrap();
    assert!(store.delete("image-v1", "a").unwrap());
    assert!(!store.delete("image-v1", "a").unwrap());
    assert!(store.get("image-v1", "a").unwrap().is_none());
  }

  #[test]
  fn test_delete_partition() {
    let store = MemoryStore::new();

    store.put("data-v1", "a", &response("1")).unwrap();
    store.put("image-v1", "b", &response("2")).unwrap();

    store.delete_partition("data-v1").unwrap();
    assert_eq!(store.list_partitions().unwrap(), vec!["image-v1"]);
  }
}
