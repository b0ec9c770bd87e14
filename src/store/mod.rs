//! Named, versioned cache partitions.
//!
//! A partition is an ordered map from request key to stored response.
//! Partition names are derived from a kind plus the deployed version tag
//! (`data-v3`), so a version bump produces a disjoint set of partitions
//! instead of mutating old ones. Two backends implement the same trait: a
//! persistent SQLite store and an in-memory store for tests and
//! non-persistent mode.

use chrono::{DateTime, Utc};

use crate::error::CacheError;

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::PartitionStore;

/// The partition kinds one deployed version owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKind {
  /// Precached shell assets; unbounded, curated set.
  Static,
  /// The canonical navigation document; unbounded (one entry in practice).
  Shell,
  /// Daily data resources; bounded, FIFO-evicted.
  Data,
  /// Images; bounded, FIFO-evicted.
  Image,
}

impl PartitionKind {
  pub const ALL: [PartitionKind; 4] = [
    PartitionKind::Static,
    PartitionKind::Shell,
    PartitionKind::Data,
    PartitionKind::Image,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      PartitionKind::Static => "static",
      PartitionKind::Shell => "shell",
      PartitionKind::Data => "data",
      PartitionKind::Image => "image",
    }
  }
}

/// Partition name for a kind under a version tag.
pub fn partition_name(kind: PartitionKind, version: &str) -> String {
  format!("{}-{}", kind.as_str(), version)
}

/// Most recent `stored_at` among a partition's entries, `None` when empty.
pub fn newest_stored_at<S: PartitionStore + ?Sized>(
  store: &S,
  partition: &str,
) -> Result<Option<DateTime<Utc>>, CacheError> {
  let mut newest = None;
  for key in store.list_keys(partition)? {
    if let Some(entry) = store.get(partition, &key)? {
      if newest.map_or(true, |at| entry.stored_at > at) {
        newest = Some(entry.stored_at);
      }
    }
  }
  Ok(newest)
}

/// Store double that injects read or write failures on demand.
#[cfg(test)]
pub mod mock {
  use std::sync::atomic::{AtomicBool, Ordering};

  use super::*;
  use crate::fetch::StoredResponse;

  /// Wraps a [`MemoryStore`] and fails `get` or `put` when armed. Seeding
  /// goes through [`FaultyStore::seed`], which bypasses the injection.
  #[derive(Default)]
  pub struct FaultyStore {
    inner: MemoryStore,
    fail_puts: AtomicBool,
    fail_gets: AtomicBool,
  }

  impl FaultyStore {
    pub fn new() -> Self {
      Self::default()
    }

    pub fn fail_puts(&self, on: bool) {
      self.fail_puts.store(on, Ordering::SeqCst);
    }

    pub fn fail_gets(&self, on: bool) {
      self.fail_gets.store(on, Ordering::SeqCst);
    }

    /// Write directly to the backing store, ignoring the armed failures.
    pub fn seed(
      &self,
      partition: &str,
      key: &str,
      response: &StoredResponse,
    ) -> Result<(), CacheError> {
      self.inner.put(partition, key, response)
    }

    /// The backing store, for asserting what actually got written.
    pub fn backing(&self) -> &MemoryStore {
      &self.inner
    }
  }

  impl PartitionStore for FaultyStore {
    fn open(&self, partition: &str) -> Result<(), CacheError> {
      self.inner.open(partition)
    }

    fn get(&self, partition: &str, key: &str) -> Result<Option<StoredResponse>, CacheError> {
      if self.fail_gets.load(Ordering::SeqCst) {
        return Err(CacheError::Storage("injected read failure".to_string()));
      }
      self.inner.get(partition, key)
    }

    fn put(&self, partition: &str, key: &str, response: &StoredResponse) -> Result<(), CacheError> {
      if self.fail_puts.load(Ordering::SeqCst) {
        return Err(CacheError::Storage("injected write failure".to_string()));
      }
      self.inner.put(partition, key, response)
    }

    fn delete(&self, partition: &str, key: &str) -> Result<bool, CacheError> {
      self.inner.delete(partition, key)
    }

    fn list_keys(&self, partition: &str) -> Result<Vec<String>, CacheError> {
      self.inner.list_keys(partition)
    }

    fn delete_partition(&self, partition: &str) -> Result<(), CacheError> {
      self.inner.delete_partition(partition)
    }

    fn list_partitions(&self) -> Result<Vec<String>, CacheError> {
      self.inner.list_partitions()
    }
  }
}
