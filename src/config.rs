use color_eyre::{eyre::eyre, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Origin the app is served from, e.g. "https://news.example"
  pub origin: String,
  /// Deployed generation tag; bump to invalidate every partition
  #[serde(default = "default_version")]
  pub version: String,
  /// Same-origin paths precached at install time. Doubles as the
  /// static-asset allow list for classification.
  #[serde(default = "default_precache")]
  pub precache: Vec<String>,
  /// Path regexes classified as revalidated data resources
  #[serde(default = "default_data_patterns")]
  pub data_patterns: Vec<String>,
  /// Extra origins the image bucket may fetch from (default: none,
  /// strict same-origin)
  #[serde(default)]
  pub image_origins: Vec<String>,
  #[serde(default)]
  pub limits: Limits,
  #[serde(default)]
  pub offline: OfflinePage,
  /// Cache database location (default: $XDG_DATA_HOME/cachefront/cache.db)
  #[serde(default)]
  pub cache_path: Option<PathBuf>,
}

/// Maximum entry counts for the bounded partitions. The static and shell
/// partitions are small curated sets and carry no limit.
#[derive(Debug, Clone, Deserialize)]
pub struct Limits {
  #[serde(default = "default_data_limit")]
  pub data: usize,
  #[serde(default = "default_image_limit")]
  pub image: usize,
}

impl Default for Limits {
  fn default() -> Self {
    Self {
      data: default_data_limit(),
      image: default_image_limit(),
    }
  }
}

/// The synthesized document served when a navigation has no network and no
/// cached shell.
#[derive(Debug, Clone, Deserialize)]
pub struct OfflinePage {
  #[serde(default = "default_offline_body")]
  pub body: String,
  #[serde(default = "default_offline_content_type")]
  pub content_type: String,
}

impl Default for OfflinePage {
  fn default() -> Self {
    Self {
      body: default_offline_body(),
      content_type: default_offline_content_type(),
    }
  }
}

fn default_version() -> String {
  "v1".to_string()
}

fn default_precache() -> Vec<String> {
  ["/", "/index.html", "/manifest.json", "/icons/icon-192.png", "/icons/icon-512.png"]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_data_patterns() -> Vec<String> {
  vec![r"^/data/news-\d{4}-\d{2}-\d{2}\.json$".to_string()]
}

fn default_data_limit() -> usize {
  30
}

fn default_image_limit() -> usize {
  60
}

fn default_offline_body() -> String {
  "<!doctype html>\n<html>\n<head><meta charset=\"utf-8\"><title>Offline</title></head>\n\
   <body><h1>You're offline</h1><p>The latest news will load when you're back online.</p></body>\n\
   </html>\n"
    .to_string()
}

fn default_offline_content_type() -> String {
  "text/html; charset=utf-8".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./cachefront.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/cachefront/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/cachefront/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("cachefront.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("cachefront").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// The app origin as a parsed URL.
  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin {}: {}", self.origin, e))
  }

  /// Precache paths resolved against the origin.
  pub fn precache_urls(&self) -> Result<Vec<Url>> {
    let origin = self.origin_url()?;
    self
      .precache
      .iter()
      .map(|path| {
        origin
          .join(path)
          .map_err(|e| eyre!("Invalid precache path {}: {}", path, e))
      })
      .collect()
  }

  /// Compiled data-resource patterns.
  pub fn compiled_data_patterns(&self) -> Result<Vec<Regex>> {
    self
      .data_patterns
      .iter()
      .map(|p| Regex::new(p).map_err(|e| eyre!("Invalid data pattern {}: {}", p, e)))
      .collect()
  }

  /// Allow-listed extra origins for the image bucket.
  pub fn image_origin_urls(&self) -> Result<Vec<Url>> {
    self
      .image_origins
      .iter()
      .map(|o| Url::parse(o).map_err(|e| eyre!("Invalid image origin {}: {}", o, e)))
      .collect()
  }
}
