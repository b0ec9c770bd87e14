//! FIFO eviction for bounded partitions.

use tracing::debug;

use crate::error::CacheError;
use crate::store::PartitionStore;

/// Trim a partition down to `max` entries, oldest insertion first.
///
/// Reads the key list fresh on every pass, so concurrent passes over the
/// same partition are safe; each may delete slightly different "oldest"
/// entries, which the weak FIFO-only guarantee allows. Returns the number
/// of entries removed.
pub fn enforce_limit<S: PartitionStore + ?Sized>(
  store: &S,
  partition: &str,
  max: usize,
) -> Result<usize, CacheError> {
  let keys = store.list_keys(partition)?;
  if keys.len() <= max {
    return Ok(0);
  }

  let excess = keys.len() - max;
  for key in &keys[..excess] {
    store.delete(partition, key)?;
  }

  debug!(partition, removed = excess, "evicted oldest entries");
  Ok(excess)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fetch::StoredResponse;
  use crate::store::MemoryStore;

  fn response(body: &str) -> StoredResponse {
    StoredResponse::snapshot(200, Vec::new(), body.as_bytes().to_vec())
  }

  #[test]
  fn test_under_limit_is_untouched() {
    let store = MemoryStore::new();
    store.put("data-v1", "a", &response("1")).unwrap();
    store.put("data-v1", "b", &response("2")).unwrap();

    assert_eq!(enforce_limit(&store, "data-v1", 3).unwrap(), 0);
    assert_eq!(store.list_keys("data-v1").unwrap(), vec!["a", "b"]);
  }

  #[test]
  fn test_survivors_are_most_recent_max_keys() {
    let store = MemoryStore::new();
    for i in 0..7 {
      store
        .put("data-v1", &format!("k{}", i), &response("x"))
        .unwrap();
    }

    assert_eq!(enforce_limit(&store, "data-v1", 3).unwrap(), 4);
    assert_eq!(store.list_keys("data-v1").unwrap(), vec!["k4", "k5", "k6"]);
  }

  #[test]
  fn test_overwritten_key_survives_as_newest() {
    let store = MemoryStore::new();
    store.put("data-v1", "old", &response("1")).unwrap();
    store.put("data-v1", "mid", &response("2")).unwrap();
    store.put("data-v1", "old", &response("1b")).unwrap();

    assert_eq!(enforce_limit(&store, "data-v1", 1).unwrap(), 1);
    assert_eq!(store.list_keys("data-v1").unwrap(), vec!["old"]);
  }

  #[test]
  fn test_bound_holds_after_any_write_sequence() {
    let store = MemoryStore::new();
    let max = 4;

    for i in 0..20 {
      store
        .put("image-v1", &format!("k{}", i % 7), &response("x"))
        .unwrap();
      enforce_limit(&store, "image-v1", max).unwrap();
      assert!(store.list_keys("image-v1").unwrap().len() <= max);
    }
  }
}
