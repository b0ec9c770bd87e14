//! Error taxonomy for cache, network, and lifecycle operations.

use thiserror::Error;

/// Failures that can surface from the dispatcher, the partition store, or the
/// lifecycle manager.
///
/// `Storage` errors on best-effort writes are logged and swallowed after the
/// response has been determined. `Precache` is fatal to the install
/// transition: the new version must not activate with an incomplete precache.
#[derive(Debug, Error)]
pub enum CacheError {
  /// A network fetch could not complete.
  #[error("network failure: {0}")]
  Network(String),

  /// A partition read, write, or delete failed.
  #[error("storage failure: {0}")]
  Storage(String),

  /// A required static asset could not be fetched during install.
  #[error("precache population failed for {url}: {reason}")]
  Precache { url: String, reason: String },
}
