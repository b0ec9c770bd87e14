//! Version lifecycle: install-time precache population and activate-time
//! cleanup.
//!
//! Install opens every partition the new version needs and populates the
//! static set from the precache list, all-or-nothing. Activate deletes every
//! partition outside the retained set for the current version, claims open
//! clients, and opportunistically enables the host's navigation preload.

use futures::future::try_join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use crate::error::CacheError;
use crate::fetch::{Fetch, Request};
use crate::store::{partition_name, PartitionKind, PartitionStore};

/// Partition names considered current for a version. Everything else is
/// garbage from a previous generation.
pub fn retained_partitions(version: &str) -> BTreeSet<String> {
  PartitionKind::ALL
    .iter()
    .map(|kind| partition_name(*kind, version))
    .collect()
}

/// Runs the install and activate transitions for one deployed version.
pub struct LifecycleManager<S, N> {
  store: Arc<S>,
  network: Arc<N>,
  version: String,
  origin: Url,
  precache: Vec<Url>,
}

impl<S, N> LifecycleManager<S, N>
where
  S: PartitionStore,
  N: Fetch,
{
  pub fn new(store: Arc<S>, network: Arc<N>, version: String, origin: Url, precache: Vec<Url>) -> Self {
    Self {
      store,
      network,
      version,
      origin,
      precache,
    }
  }

  /// Install transition: open the version's partitions and populate the
  /// static precache set.
  ///
  /// All-or-nothing: every listed URL must be same-origin and fetch with a
  /// success status, otherwise the transition fails and nothing is written.
  /// The offline fallback chain depends on this set being complete.
  pub async fn install(&self) -> Result<(), CacheError> {
    for kind in PartitionKind::ALL {
      self.store.open(&partition_name(kind, &self.version))?;
    }

    // Fetch everything before writing anything: a single failure aborts
    // the transition with the static partition untouched.
    let fetched = try_join_all(self.precache.iter().map(|url| async move {
      if url.origin() != self.origin.origin() {
        return Err(CacheError::Precache {
          url: url.to_string(),
          reason: "precache URLs must be same-origin".to_string(),
        });
      }

      let request = Request::get(url.clone());
      let response = self
        .network
        .fetch(&request)
        .await
        .map_err(|e| CacheError::Precache {
          url: url.to_string(),
          reason: e.to_string(),
        })?;

      if !response.is_success() {
        return Err(CacheError::Precache {
          url: url.to_string(),
          reason: format!("status {}", response.status),
        });
      }

      Ok((request.cache_key(), response))
    }))
    .await?;

    let static_partition = partition_name(PartitionKind::Static, &self.version);
    for (key, response) in &fetched {
      self.store.put(&static_partition, key, response)?;
    }

    info!(
      partition = %static_partition,
      assets = fetched.len(),
      "precache populated"
    );
    Ok(())
  }

  /// Activate transition: delete partitions from previous generations,
  /// claim open clients, enable the navigation preload fast path if the
  /// host offers one.
  pub async fn activate(&self) -> Result<(), CacheError> {
    let retained = retained_partitions(&self.version);

    for name in self.store.list_partitions()? {
      if !retained.contains(&name) {
        self.store.delete_partition(&name)?;
        info!(partition = %name, "deleted stale partition");
      }
    }

    info!(version = %self.version, "claimed open clients");

    // Navigation preload is a host capability; failure to enable it is
    // non-fatal and ignored. This host has none to enable.
    debug!("navigation preload not offered by host");

    Ok(())
  }
}
