//! The strategy dispatcher: one request in, one response out.
//!
//! Each request is classified into a policy bucket and served by that
//! bucket's strategy against its own partition. The response to the caller
//! is always determined before any cache write: writes and eviction run as
//! detached tasks, and their failures are logged, never surfaced.

use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::error::CacheError;
use crate::eviction;
use crate::fetch::{Fetch, Request, StoredResponse};
use crate::policy::{Classifier, PolicyBucket};
use crate::store::{partition_name, PartitionKind, PartitionStore};

/// Canonical key for the shell partition's single document entry. All
/// navigations share it regardless of URL.
const DOCUMENT_KEY: &str = "GET document";

/// Dispatcher settings derived from configuration.
pub struct DispatchSettings {
  pub version: String,
  pub data_limit: usize,
  pub image_limit: usize,
  pub offline_body: String,
  pub offline_content_type: String,
  /// The precached root document URL, the second link in the navigation
  /// fallback chain.
  pub root_url: Url,
}

/// Serves requests from cache and/or network per their policy bucket.
///
/// Stateless between requests apart from the partitions themselves, so
/// concurrent requests are independent tasks.
pub struct Dispatcher<S, N> {
  store: Arc<S>,
  network: Arc<N>,
  classifier: Classifier,
  settings: DispatchSettings,
  root_key: String,
}

impl<S, N> Dispatcher<S, N>
where
  S: PartitionStore + 'static,
  N: Fetch + 'static,
{
  pub fn new(
    store: Arc<S>,
    network: Arc<N>,
    classifier: Classifier,
    settings: DispatchSettings,
  ) -> Self {
    let root_key = format!("GET {}", settings.root_url);
    Self {
      store,
      network,
      classifier,
      settings,
      root_key,
    }
  }

  /// Handle one intercepted request. `preload` is a response the host
  /// environment already has in flight for this request, if any.
  pub async fn handle(
    &self,
    request: &Request,
    preload: Option<StoredResponse>,
  ) -> Result<StoredResponse, CacheError> {
    let bucket = self.classifier.classify(request);
    debug!(bucket = bucket.as_str(), url = %request.url, "dispatching request");

    match bucket {
      PolicyBucket::RevalidatedData => self.stale_while_revalidate(request).await,
      PolicyBucket::VersionedShell => self.network_first_shell(request, preload).await,
      PolicyBucket::PrecachedStatic => self.cache_first_static(request).await,
      PolicyBucket::CachedImage => self.cache_first_image(request).await,
      PolicyBucket::Passthrough => self.network.fetch(request).await,
    }
  }

  /// Stale-while-revalidate for daily data resources. A cached entry is
  /// returned immediately while a detached task refreshes it; a miss waits
  /// for the network and surfaces its failure.
  async fn stale_while_revalidate(&self, request: &Request) -> Result<StoredResponse, CacheError> {
    let partition = partition_name(PartitionKind::Data, &self.settings.version);
    let key = request.cache_key();

    if let Some(cached) = self.read_entry(&partition, &key) {
      self.spawn_refresh(partition, key, request.clone(), self.settings.data_limit);
      return Ok(cached);
    }

    let fetched = self.network.fetch(request).await?;
    if fetched.is_success() {
      self.spawn_store(partition, key, fetched.clone(), Some(self.settings.data_limit));
    }
    Ok(fetched)
  }

  /// Network-first navigation. A successful HTML result refreshes the
  /// canonical shell entry; on network failure the fallback chain is shell
  /// entry, precached root document, synthesized offline document. The
  /// last link never fails.
  async fn network_first_shell(
    &self,
    request: &Request,
    preload: Option<StoredResponse>,
  ) -> Result<StoredResponse, CacheError> {
    let partition = partition_name(PartitionKind::Shell, &self.settings.version);

    let fetched = match preload {
      Some(response) => Ok(response),
      None => self.network.fetch(request).await,
    };

    match fetched {
      Ok(response) => {
        if response.is_success() && response.is_html() {
          self.spawn_store(partition, DOCUMENT_KEY.to_string(), response.clone(), None);
        }
        Ok(response)
      }
      Err(err) => {
        debug!(url = %request.url, error = %err, "navigation fetch failed, using fallback chain");

        if let Some(shell) = self.read_entry(&partition, DOCUMENT_KEY) {
          return Ok(shell);
        }

        let static_partition = partition_name(PartitionKind::Static, &self.settings.version);
        if let Some(root) = self.read_entry(&static_partition, &self.root_key) {
          return Ok(root);
        }

        Ok(self.offline_document())
      }
    }
  }

  /// Cache-first for precached shell assets. A miss falls through to the
  /// network without writing; population happens at install time.
  async fn cache_first_static(&self, request: &Request) -> Result<StoredResponse, CacheError> {
    let partition = partition_name(PartitionKind::Static, &self.settings.version);

    if let Some(cached) = self.read_entry(&partition, &request.cache_key()) {
      return Ok(cached);
    }

    self.network.fetch(request).await
  }

  /// Cache-first images with a bounded partition. The network fallback is
  /// restricted to allowed origins; anything else fails closed.
  async fn cache_first_image(&self, request: &Request) -> Result<StoredResponse, CacheError> {
    let partition = partition_name(PartitionKind::Image, &self.settings.version);
    let key = request.cache_key();

    if let Some(cached) = self.read_entry(&partition, &key) {
      return Ok(cached);
    }

    if !self.classifier.image_origin_allowed(&request.url) {
      return Err(CacheError::Network(format!(
        "cross-origin image fetch rejected: {}",
        request.url
      )));
    }

    let fetched = self.network.fetch(request).await?;
    if fetched.is_success() {
      self.spawn_store(partition, key, fetched.clone(), Some(self.settings.image_limit));
    }
    Ok(fetched)
  }

  /// The guaranteed terminal navigation fallback.
  fn offline_document(&self) -> StoredResponse {
    StoredResponse::snapshot(
      200,
      vec![(
        "content-type".to_string(),
        self.settings.offline_content_type.clone(),
      )],
      self.settings.offline_body.clone().into_bytes(),
    )
  }

  /// Read an entry, treating storage failures as a miss.
  fn read_entry(&self, partition: &str, key: &str) -> Option<StoredResponse> {
    match self.store.get(partition, key) {
      Ok(entry) => entry,
      Err(err) => {
        warn!(partition, key, error = %err, "cache read failed, treating as miss");
        None
      }
    }
  }

  /// Detached best-effort write, with eviction for bounded partitions.
  /// The caller's response is already determined when this runs.
  fn spawn_store(
    &self,
    partition: String,
    key: String,
    response: StoredResponse,
    limit: Option<usize>,
  ) {
    let store = Arc::clone(&self.store);

    tokio::spawn(async move {
      if let Err(err) = store.put(&partition, &key, &response) {
        warn!(partition = %partition, key = %key, error = %err, "cache write failed");
        return;
      }
      if let Some(max) = limit {
        if let Err(err) = eviction::enforce_limit(store.as_ref(), &partition, max) {
          warn!(partition = %partition, error = %err, "eviction failed");
        }
      }
    });
  }

  /// Detached background refresh for stale-while-revalidate. Runs to
  /// completion even if the original caller goes away.
  fn spawn_refresh(&self, partition: String, key: String, request: Request, limit: usize) {
    let store = Arc::clone(&self.store);
    let network = Arc::clone(&self.network);

    tokio::spawn(async move {
      match network.fetch(&request).await {
        Ok(response) if response.is_success() => {
          if let Err(err) = store.put(&partition, &key, &response) {
            warn!(partition = %partition, key = %key, error = %err, "refresh write failed");
            return;
          }
          if let Err(err) = eviction::enforce_limit(store.as_ref(), &partition, limit) {
            warn!(partition = %partition, error = %err, "eviction failed");
          }
        }
        Ok(response) => {
          debug!(key = %key, status = response.status, "refresh returned non-success, keeping cached entry");
        }
        Err(err) => {
          debug!(key = %key, error = %err, "background refresh failed");
        }
      }
    });
  }
}
