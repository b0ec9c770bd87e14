//! The worker: one deployed version's state machine with its three entry
//! points (install/activate, request interception, control messages).

use color_eyre::Result;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::control::ControlMessage;
use crate::error::CacheError;
use crate::fetch::{Fetch, Request, StoredResponse};
use crate::lifecycle::LifecycleManager;
use crate::policy::Classifier;
use crate::store::PartitionStore;
use crate::strategy::{DispatchSettings, Dispatcher};

/// Lifecycle state of this worker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Not yet activated; partitions may be cold.
  Installing,
  /// Activated; strategies apply to all requests.
  Active,
  /// A newer instance has activated. This instance takes no further
  /// lifecycle action; cleanup belongs to the incoming instance.
  Superseded,
}

/// Ties the lifecycle manager and strategy dispatcher together for one
/// version of the deployed app.
pub struct Worker<S, N> {
  state: WorkerState,
  store: Arc<S>,
  lifecycle: LifecycleManager<S, N>,
  dispatcher: Dispatcher<S, N>,
}

impl<S, N> Worker<S, N>
where
  S: PartitionStore + 'static,
  N: Fetch + 'static,
{
  pub fn new(store: Arc<S>, network: Arc<N>, config: &Config) -> Result<Self> {
    let origin = config.origin_url()?;

    let classifier = Classifier::new(
      origin.clone(),
      config.compiled_data_patterns()?,
      config.precache.iter().cloned(),
      config.image_origin_urls()?,
    );

    let settings = DispatchSettings {
      version: config.version.clone(),
      data_limit: config.limits.data,
      image_limit: config.limits.image,
      offline_body: config.offline.body.clone(),
      offline_content_type: config.offline.content_type.clone(),
      root_url: origin.join("/")?,
    };

    let lifecycle = LifecycleManager::new(
      Arc::clone(&store),
      Arc::clone(&network),
      config.version.clone(),
      origin,
      config.precache_urls()?,
    );

    let dispatcher = Dispatcher::new(Arc::clone(&store), network, classifier, settings);

    Ok(Self {
      state: WorkerState::Installing,
      store,
      lifecycle,
      dispatcher,
    })
  }

  #[cfg(test)]
  pub fn state(&self) -> WorkerState {
    self.state
  }

  /// Install-time then activate-time transition. Precache population must
  /// complete before the worker becomes active.
  pub async fn install_and_activate(&mut self) -> Result<(), CacheError> {
    self.lifecycle.install().await?;
    self.lifecycle.activate().await?;
    self.state = WorkerState::Active;
    Ok(())
  }

  /// Per-request interception: exactly one response or a propagated
  /// failure.
  pub async fn handle(
    &self,
    request: &Request,
    preload: Option<StoredResponse>,
  ) -> Result<StoredResponse, CacheError> {
    self.dispatcher.handle(request, preload).await
  }

  /// Mark this instance as replaced by a newer one.
  #[cfg(test)]
  pub fn supersede(&mut self) {
    self.state = WorkerState::Superseded;
  }

  /// Apply a control command. Fire-and-forget from the sender's side;
  /// effects are observed on subsequent requests.
  pub async fn on_message(&mut self, message: ControlMessage) -> Result<(), CacheError> {
    match message {
      ControlMessage::SkipWaiting => {
        if self.state == WorkerState::Superseded {
          return Ok(());
        }
        // The precache must be complete before this version may activate;
        // a failed install leaves the previous generation in place.
        if self.state == WorkerState::Installing {
          self.lifecycle.install().await?;
        }
        self.lifecycle.activate().await?;
        self.state = WorkerState::Active;
        info!("activated ahead of the waiting period");
      }
      ControlMessage::PurgeCaches => {
        for name in self.store.list_partitions()? {
          self.store.delete_partition(&name)?;
        }
        info!("purged all cache partitions");
      }
    }
    Ok(())
  }
}
