use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::types::Request;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Base URL that relative request targets resolve against
  pub origin: String,
  pub namespaces: NamespaceConfig,
  pub routing: RoutingConfig,
  /// Request headers that take part in cache keys (content negotiation)
  pub key_headers: Vec<String>,
  /// Assets cached into the static namespace on install
  pub precache: Vec<String>,
  pub network: NetworkConfig,
  /// SQLite cache file (defaults to $XDG_DATA_HOME/offline-proxy/cache.db)
  pub cache_path: Option<PathBuf>,
  /// Write logs to this file instead of stderr
  pub log_file: Option<PathBuf>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:8080/".to_string(),
      namespaces: NamespaceConfig::default(),
      routing: RoutingConfig::default(),
      key_headers: Vec::new(),
      precache: DEFAULT_PRECACHE.iter().map(|s| s.to_string()).collect(),
      network: NetworkConfig::default(),
      cache_path: None,
      log_file: None,
    }
  }
}

const DEFAULT_PRECACHE: &[&str] = &[
  "./index.html",
  "./manifest.json",
  "https://fonts.googleapis.com/css2?family=Syne:wght@400;700;800&family=Space+Mono:wght@400;700&display=swap",
  "https://cdnjs.cloudflare.com/ajax/libs/Chart.js/4.4.1/chart.umd.min.js",
  "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js",
  "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css",
];

/// Names and version of the two live namespaces.
///
/// Bumping `version` makes every older namespace stale on next activation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NamespaceConfig {
  #[serde(rename = "static")]
  pub static_name: String,
  #[serde(rename = "dynamic")]
  pub dynamic_name: String,
  pub version: u32,
}

impl Default for NamespaceConfig {
  fn default() -> Self {
    Self {
      static_name: "cadastre-ci".to_string(),
      dynamic_name: "cadastre-data".to_string(),
      version: 1,
    }
  }
}

/// Marker tokens used to classify request URLs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
  /// Matched against the URL path; network-first
  pub data_marker: String,
  /// Matched against the host; cache-first with refill
  pub tile_host_marker: String,
  /// Matched against the URL path; cache-first with refill
  pub tile_path_marker: String,
}

impl Default for RoutingConfig {
  fn default() -> Self {
    Self {
      data_marker: "donnees_cadastre.json".to_string(),
      tile_host_marker: "tile".to_string(),
      tile_path_marker: "tiles".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
  pub timeout_secs: u64,
  pub user_agent: String,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      timeout_secs: 30,
      user_agent: concat!("offline-proxy/", env!("CARGO_PKG_VERSION")).to_string(),
    }
  }
}

impl NetworkConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offline-proxy.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offline-proxy/config.yaml
  ///
  /// Built-in defaults are used when no file is found.
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

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    config.with_env_overrides().validated()
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("offline-proxy.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offline-proxy").join("config.yaml");
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

  /// OFFLINE_PROXY_ORIGIN replaces the configured origin.
  fn with_env_overrides(self) -> Self {
    match std::env::var("OFFLINE_PROXY_ORIGIN") {
      Ok(origin) if !origin.trim().is_empty() => Config {
        origin: origin.trim().to_string(),
        ..self
      },
      _ => self,
    }
  }

  fn validated(self) -> Result<Self> {
    self.origin_url()?;
    if self.namespaces.static_name == self.namespaces.dynamic_name {
      return Err(eyre!(
        "Static and dynamic namespaces must have different names (both are '{}')",
        self.namespaces.static_name
      ));
    }
    Ok(self)
  }

  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  /// The preload manifest as GET requests, in order.
  pub fn precache_requests(&self) -> Result<Vec<Request>> {
    let origin = self.origin_url()?;
    self
      .precache
      .iter()
      .map(|target| Request::parse("GET", target, &origin))
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_defaults_match_original_deployment() {
    let config = Config::default();
    assert_eq!(config.precache.len(), 6);
    assert_eq!(config.precache[0], "./index.html");
    assert_eq!(config.routing.data_marker, "donnees_cadastre.json");
    assert_eq!(config.network.timeout(), Duration::from_secs(30));
  }

  #[test]
  fn test_partial_yaml_keeps_other_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
      file,
      "origin: https://cadastre.example/app/\nnamespaces:\n  version: 3\nkey_headers: [accept-language]"
    )
    .unwrap();

    let config = Config::load(Some(file.path())).unwrap();

    assert_eq!(config.namespaces.version, 3);
    assert_eq!(config.namespaces.static_name, "cadastre-ci");
    assert_eq!(config.key_headers, vec!["accept-language"]);
    assert_eq!(config.precache.len(), 6);
  }

  #[test]
  fn test_explicit_missing_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load(Some(&dir.path().join("nope.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }

  #[test]
  fn test_same_namespace_names_are_rejected() {
    let config = Config {
      namespaces: NamespaceConfig {
        static_name: "x".to_string(),
        dynamic_name: "x".to_string(),
        version: 1,
      },
      ..Config::default()
    };
    assert!(config.validated().is_err());
  }

  #[test]
  fn test_precache_requests_resolve_relative_entries() {
    let config = Config {
      origin: "https://cadastre.example/app/".to_string(),
      ..Config::default()
    };
    let requests = config.precache_requests().unwrap();

    assert_eq!(requests.len(), 6);
    assert_eq!(
      requests[0].url.as_str(),
      "https://cadastre.example/app/index.html"
    );
    assert_eq!(requests[4].url.host_str(), Some("unpkg.com"));
    assert!(requests.iter().all(|r| r.is_get()));
  }
}
