//! The partition store primitive.

use crate::error::CacheError;
use crate::fetch::StoredResponse;

/// Storage backend for named cache partitions.
///
/// Keys are unique within a partition and `list_keys` returns them in
/// insertion order; replacing an existing key gives it a fresh insertion
/// position (last-writer-wins). Partitions come into existence lazily on
/// `open` or first `put`.
pub trait PartitionStore: Send + Sync {
  /// Ensure a partition exists. Idempotent.
  fn open(&self, partition: &str) -> Result<(), CacheError>;

  /// Look up a stored response by request key.
  fn get(&self, partition: &str, key: &str) -> Result<Option<StoredResponse>, CacheError>;

  /// Insert or replace a stored response. Creates the partition if needed.
  fn put(&self, partition: &str, key: &str, response: &StoredResponse) -> Result<(), CacheError>;

  /// Remove one entry. Returns whether it existed.
  fn delete(&self, partition: &str, key: &str) -> Result<bool, CacheError>;

  /// All keys in the partition, oldest insertion first.
  fn list_keys(&self, partition: &str) -> Result<Vec<String>, CacheError>;

  /// Remove a partition and everything in it. Removing an absent partition
  /// is not an error.
  fn delete_partition(&self, partition: &str) -> Result<(), CacheError>;

  /// Names of all partitions that currently exist.
  fn list_partitions(&self) -> Result<Vec<String>, CacheError>;
}
