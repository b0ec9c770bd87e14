//! Request/response model and the network fetch primitive.
//!
//! A [`Request`] is the unit the dispatcher classifies; a [`StoredResponse`]
//! is an immutable snapshot of a network response, suitable both for
//! returning to the caller and for persisting into a cache partition. The
//! [`Fetch`] trait abstracts the network so tests can script it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::CacheError;

/// HTTP method. Only GET requests ever touch the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Head,
  Post,
  Put,
  Delete,
  Patch,
  Options,
}

impl Method {
  pub fn is_get(&self) -> bool {
    matches!(self, Method::Get)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Head => "HEAD",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Delete => "DELETE",
      Method::Patch => "PATCH",
      Method::Options => "OPTIONS",
    }
  }
}

impl std::str::FromStr for Method {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_uppercase().as_str() {
      "GET" => Ok(Method::Get),
      "HEAD" => Ok(Method::Head),
      "POST" => Ok(Method::Post),
      "PUT" => Ok(Method::Put),
      "DELETE" => Ok(Method::Delete),
      "PATCH" => Ok(Method::Patch),
      "OPTIONS" => Ok(Method::Options),
      other => Err(format!("unknown HTTP method: {}", other)),
    }
  }
}

/// How the client is using the request. Navigation means a top-level
/// document load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestMode {
  #[default]
  Default,
  Navigate,
}

/// What kind of resource the request is for, as declared by the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Destination {
  #[default]
  Other,
  Document,
  Image,
}

/// An inbound request to be intercepted.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub mode: RequestMode,
  pub destination: Destination,
}

impl Request {
  /// A plain GET request with default mode and destination.
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::Get,
      url,
      mode: RequestMode::Default,
      destination: Destination::Other,
    }
  }

  pub fn with_mode(mut self, mode: RequestMode) -> Self {
    self.mode = mode;
    self
  }

  pub fn with_destination(mut self, destination: Destination) -> Self {
    self.destination = destination;
    self
  }

  pub fn with_method(mut self, method: Method) -> Self {
    self.method = method;
    self
  }

  /// Partition lookup key: method plus full URL, query included.
  pub fn cache_key(&self) -> String {
    format!("{} {}", self.method.as_str(), self.url)
  }

  pub fn is_navigation(&self) -> bool {
    self.mode == RequestMode::Navigate
  }
}

/// An immutable snapshot of a network response.
///
/// Snapshots are never mutated in place; a refresh replaces the partition
/// entry wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResponse {
  pub status: u16,
  /// Header name/value pairs as received. Names are lowercased.
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  /// When this snapshot was taken.
  pub stored_at: DateTime<Utc>,
}

impl StoredResponse {
  pub fn snapshot(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
    Self {
      status,
      headers,
      body,
      stored_at: Utc::now(),
    }
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn content_type(&self) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
      .map(|(_, value)| value.as_str())
  }

  /// Whether this looks like a document we could serve as an app shell.
  pub fn is_html(&self) -> bool {
    self
      .content_type()
      .map(|ct| ct.starts_with("text/html"))
      .unwrap_or(false)
  }
}

/// The network fetch primitive: request in, response snapshot or failure out.
///
/// Non-success statuses are still responses; `Err` means the fetch itself
/// could not complete (DNS, connect, TLS, abort).
#[async_trait]
pub trait Fetch: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<StoredResponse, CacheError>;
}

/// Real network client backed by reqwest.
#[derive(Clone)]
pub struct NetworkClient {
  client: reqwest::Client,
}

impl NetworkClient {
  pub fn new() -> Result<Self, CacheError> {
    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| CacheError::Network(format!("failed to build HTTP client: {}", e)))?;

    Ok(Self { client })
  }
}

impl From<Method> for reqwest::Method {
  fn from(method: Method) -> Self {
    match method {
      Method::Get => reqwest::Method::GET,
      Method::Head => reqwest::Method::HEAD,
      Method::Post => reqwest::Method::POST,
      Method::Put => reqwest::Method::PUT,
      Method::Delete => reqwest::Method::DELETE,
      Method::Patch => reqwest::Method::PATCH,
      Method::Options => reqwest::Method::OPTIONS,
    }
  }
}

#[async_trait]
impl Fetch for NetworkClient {
  async fn fetch(&self, request: &Request) -> Result<StoredResponse, CacheError> {
    let response = self
      .client
      .request(request.method.into(), request.url.clone())
      .send()
      .await
      .map_err(|e| CacheError::Network(format!("{}: {}", request.url, e)))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .map(|(name, value)| {
        (
          name.as_str().to_string(),
          String::from_utf8_lossy(value.as_bytes()).into_owned(),
        )
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| CacheError::Network(format!("{}: {}", request.url, e)))?
      .to_vec();

    Ok(StoredResponse::snapshot(status, headers, body))
  }
}

/// Scripted fetcher for tests: responds per-URL, fails everything else.
#[cfg(test)]
pub mod mock {
  use std::collections::HashMap;
  use std::sync::Mutex;

  use super::*;

  pub enum Script {
    Respond(StoredResponse),
    Fail,
  }

  pub struct ScriptedFetch {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<String>>,
  }

  impl ScriptedFetch {
    pub fn new() -> Self {
      Self {
        scripts: Mutex::new(HashMap::new()),
        calls: Mutex::new(Vec::new()),
      }
    }

    pub fn respond(self, url: &str, response: StoredResponse) -> Self {
      self.set(url, Script::Respond(response));
      self
    }

    pub fn fail(self, url: &str) -> Self {
      self.set(url, Script::Fail);
      self
    }

    /// Rescript a URL mid-test, e.g. to simulate the network going away.
    pub fn set(&self, url: &str, script: Script) {
      self.scripts.lock().unwrap().insert(url.to_string(), script);
    }

    pub fn call_count(&self) -> usize {
      self.calls.lock().unwrap().len()
    }
  }

  #[async_trait]
  impl Fetch for ScriptedFetch {
    async fn fetch(&self, request: &Request) -> Result<StoredResponse, CacheError> {
      self.calls.lock().unwrap().push(request.cache_key());

      match self.scripts.lock().unwrap().get(request.url.as_str()) {
        Some(Script::Respond(response)) => Ok(response.clone()),
        Some(Script::Fail) | None => {
          Err(CacheError::Network(format!("unreachable: {}", request.url)))
        }
      }
    }
  }

  pub fn html(body: &str) -> StoredResponse {
    StoredResponse::snapshot(
      200,
      vec![("content-type".into(), "text/html; charset=utf-8".into())],
      body.as_bytes().to_vec(),
    )
  }

  pub fn json(body: &str) -> StoredResponse {
    StoredResponse::snapshot(
      200,
      vec![("content-type".into(), "application/json".into())],
      body.as_bytes().to_vec(),
    )
  }

  pub fn png(body: &[u8]) -> StoredResponse {
    StoredResponse::snapshot(
      200,
      vec![("content-type".into(), "image/png".into())],
      body.to_vec(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_cache_key_includes_query() {
    let url = Url::parse("https://example.com/data/news-2024-01-01.json?page=2").unwrap();
    let request = Request::get(url);
    assert_eq!(
      request.cache_key(),
      "GET https://example.com/data/news-2024-01-01.json?page=2"
    );
  }

  #[test]
  fn test_method_parse() {
    assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
    assert_eq!("POST".parse::<Method>().unwrap(), Method::Post);
    assert!("FETCH".parse::<Method>().is_err());
  }

  #[test]
  fn test_html_detection() {
    let response = StoredResponse::snapshot(
      200,
      vec![("content-type".into(), "text/html; charset=utf-8".into())],
      Vec::new(),
    );
    assert!(response.is_html());

    let response = StoredResponse::snapshot(
      200,
      vec![("content-type".into(), "application/json".into())],
      Vec::new(),
    );
    assert!(!response.is_html());

    let response = StoredResponse::snapshot(200, Vec::new(), Vec::new());
    assert!(!response.is_html());
  }

  #[test]
  fn test_success_range() {
    assert!(StoredResponse::snapshot(200, Vec::new(), Vec::new()).is_success());
    assert!(StoredResponse::snapshot(204, Vec::new(), Vec::new()).is_success());
    assert!(!StoredResponse::snapshot(304, Vec::new(), Vec::new()).is_success());
    assert!(!StoredResponse::snapshot(404, Vec::new(), Vec::new()).is_success());
  }
}
