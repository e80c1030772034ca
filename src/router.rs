//! Classification of intercepted requests into caching strategies.

use url::Url;

use crate::config::RoutingConfig;

/// The caching discipline applied to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
  /// Fresh data first, dynamic namespace as offline fallback
  NetworkFirst,
  /// Static namespace first, network refill on miss, 503 when both fail
  CacheFirstWithRefill,
  /// Any namespace first, network otherwise, failures propagate
  CacheFirstWithFallback,
}

/// Maps URLs to routes using marker tokens. First match wins:
/// 1. data marker in the path
/// 2. tile marker in the host, or tile path marker in the path
/// 3. everything else
#[derive(Debug, Clone)]
pub struct Router {
  data_marker: String,
  tile_host_marker: String,
  tile_path_marker: String,
}

impl Router {
  pub fn new(config: &RoutingConfig) -> Self {
    Self {
      data_marker: config.data_marker.clone(),
      tile_host_marker: config.tile_host_marker.clone(),
      tile_path_marker: config.tile_path_marker.clone(),
    }
  }

  pub fn classify(&self, url: &Url) -> Route {
    let path = url.path();

    if contains(path, &self.data_marker) {
      return Route::NetworkFirst;
    }

    let host = url.host_str().unwrap_or("");
    if contains(host, &self.tile_host_marker) || contains(path, &self.tile_path_marker) {
      return Route::CacheFirstWithRefill;
    }

    Route::CacheFirstWithFallback
  }
}

/// An empty marker never matches.
fn contains(haystack: &str, marker: &str) -> bool {
  !marker.is_empty() && haystack.contains(marker)
}
