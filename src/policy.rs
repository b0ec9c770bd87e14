//! Request classification into policy buckets.
//!
//! Classification is pure and deterministic: an ordered list of
//! (bucket, predicate) rules evaluated top-down, first match wins. Non-GET
//! requests never match a caching bucket. Nothing in here touches storage or
//! the network.

use regex::Regex;
use std::collections::BTreeSet;
use url::Url;

use crate::fetch::{Destination, Request};

/// The policy bucket a request falls into, which selects the strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyBucket {
  /// Stale-while-revalidate against the data partition.
  RevalidatedData,
  /// Network-first navigation with the shell fallback chain.
  VersionedShell,
  /// Cache-first from the precached static set.
  PrecachedStatic,
  /// Cache-first image with bounded storage.
  CachedImage,
  /// Forwarded to the network untouched.
  Passthrough,
}

impl PolicyBucket {
  pub fn as_str(&self) -> &'static str {
    match self {
      PolicyBucket::RevalidatedData => "revalidated-data",
      PolicyBucket::VersionedShell => "versioned-shell",
      PolicyBucket::PrecachedStatic => "precached-static",
      PolicyBucket::CachedImage => "cached-image",
      PolicyBucket::Passthrough => "passthrough",
    }
  }
}

/// Ordered classification rules. Adding a rule here changes priority, so
/// each predicate is tested independently below.
const RULES: &[(PolicyBucket, fn(&Classifier, &Request) -> bool)] = &[
  (PolicyBucket::RevalidatedData, Classifier::is_data_resource),
  (PolicyBucket::VersionedShell, Classifier::is_navigation),
  (PolicyBucket::PrecachedStatic, Classifier::is_static_asset),
  (PolicyBucket::CachedImage, Classifier::is_cacheable_image),
];

/// Stateless request classifier.
pub struct Classifier {
  origin: Url,
  data_patterns: Vec<Regex>,
  static_paths: BTreeSet<String>,
  /// Extra origins the image bucket may fetch from. Empty means strict
  /// same-origin (fail closed).
  image_origins: Vec<Url>,
}

impl Classifier {
  pub fn new(
    origin: Url,
    data_patterns: Vec<Regex>,
    static_paths: impl IntoIterator<Item = String>,
    image_origins: Vec<Url>,
  ) -> Self {
    Self {
      origin,
      data_patterns,
      static_paths: static_paths.into_iter().collect(),
      image_origins,
    }
  }

  /// Classify a request. First matching rule wins; no rule means
  /// passthrough (fallthrough is not an error).
  pub fn classify(&self, request: &Request) -> PolicyBucket {
    if !request.method.is_get() {
      return PolicyBucket::Passthrough;
    }

    for (bucket, predicate) in RULES {
      if predicate(self, request) {
        return *bucket;
      }
    }

    PolicyBucket::Passthrough
  }

  fn is_same_origin(&self, url: &Url) -> bool {
    url.origin() == self.origin.origin()
  }

  /// Whether the image bucket may fetch from this URL's origin.
  pub fn image_origin_allowed(&self, url: &Url) -> bool {
    self.is_same_origin(url)
      || self
        .image_origins
        .iter()
        .any(|allowed| allowed.origin() == url.origin())
  }

  fn is_data_resource(&self, request: &Request) -> bool {
    self.is_same_origin(&request.url)
      && self
        .data_patterns
        .iter()
        .any(|pattern| pattern.is_match(request.url.path()))
  }

  fn is_navigation(&self, request: &Request) -> bool {
    request.is_navigation()
  }

  fn is_static_asset(&self, request: &Request) -> bool {
    self.is_same_origin(&request.url) && self.static_paths.contains(request.url.path())
  }

  fn is_cacheable_image(&self, request: &Request) -> bool {
    request.destination == Destination::Image && self.image_origin_allowed(&request.url)
  }
}
