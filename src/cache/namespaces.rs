//! Versioned cache namespaces on top of a storage backend.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::storage::{CacheStorage, CachedResponse};
use super::traits::RequestKey;
use crate::config::NamespaceConfig;
use crate::types::{Request, Response};

/// The two live namespace ids for the current version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceSet {
  /// Long-lived assets (preload manifest, tiles)
  pub static_id: String,
  /// Frequently changing data
  pub dynamic_id: String,
}

impl NamespaceSet {
  pub fn from_config(config: &NamespaceConfig) -> Self {
    Self {
      static_id: format!("{}-v{}", config.static_name, config.version),
      dynamic_id: format!("{}-v{}", config.dynamic_name, config.version),
    }
  }

  pub fn ids(&self) -> [&str; 2] {
    [self.static_id.as_str(), self.dynamic_id.as_str()]
  }
}

/// Outcome of pruning stale namespaces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
  pub deleted: Vec<String>,
  /// Namespaces whose deletion failed, with the reason
  pub failed: Vec<(String, String)>,
}

/// Owns the namespaces of a store and hands out handles to them.
pub struct NamespaceManager<S: CacheStorage> {
  storage: Arc<S>,
  /// Request headers that take part in the entry key
  key_headers: Arc<[String]>,
}

impl<S: CacheStorage> NamespaceManager<S> {
  pub fn new(storage: S, key_headers: Vec<String>) -> Self {
    Self {
      storage: Arc::new(storage),
      key_headers: key_headers.into(),
    }
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  pub fn key(&self, request: &Request) -> RequestKey {
    RequestKey::new(request, &self.key_headers)
  }

  /// Create the namespace if needed and return a handle to it. Idempotent.
  pub fn ensure(&self, id: &str) -> Result<NamespaceHandle<S>> {
    if self.storage.has_namespace(id)? {
      debug!(namespace = %id, "namespace already exists");
    } else {
      self.storage.create_namespace(id)?;
      info!(namespace = %id, "created namespace");
    }
    Ok(self.handle(id))
  }

  /// A handle without touching the store.
  pub fn handle(&self, id: &str) -> NamespaceHandle<S> {
    NamespaceHandle {
      id: id.to_string(),
      storage: Arc::clone(&self.storage),
      key_headers: Arc::clone(&self.key_headers),
    }
  }

  pub fn namespace_ids(&self) -> Result<Vec<String>> {
    self.storage.list_namespaces()
  }

  /// Delete every namespace not in `keep`.
  ///
  /// Deletions are independent: one failing does not stop the others.
  /// Only a failure to enumerate the namespaces is an error.
  pub fn prune(&self, keep: &[&str]) -> Result<PruneReport> {
    let mut report = PruneReport::default();

    for id in self.storage.list_namespaces()? {
      if keep.contains(&id.as_str()) {
        continue;
      }

      match self.storage.delete_namespace(&id) {
        Ok(_) => {
          info!(namespace = %id, "deleted stale namespace");
          report.deleted.push(id);
        }
        Err(e) => {
          warn!(namespace = %id, error = %e, "failed to delete stale namespace");
          report.failed.push((id, e.to_string()));
        }
      }
    }

    Ok(report)
  }

  /// Look a request up in every namespace, oldest first.
  ///
  /// Store errors are logged and treated as a miss.
  pub fn match_any(&self, request: &Request) -> Option<CachedResponse> {
    let key = self.key(request);

    let ids = match self.storage.list_namespaces() {
      Ok(ids) => ids,
      Err(e) => {
        warn!(error = %e, "failed to list namespaces, treating as cache miss");
        return None;
      }
    };

    for id in ids {
      match self.storage.get(&id, &key) {
        Ok(Some(cached)) => {
          debug!(namespace = %id, url = %request.url, "cache hit");
          return Some(cached);
        }
        Ok(None) => {}
        Err(e) => warn!(namespace = %id, error = %e, "cache read failed"),
      }
    }

    None
  }
}

impl<S: CacheStorage> Clone for NamespaceManager<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      key_headers: Arc::clone(&self.key_headers),
    }
  }
}

/// Handle to one namespace.
pub struct NamespaceHandle<S: CacheStorage> {
  id: String,
  storage: Arc<S>,
  key_headers: Arc<[String]>,
}

impl<S: CacheStorage> NamespaceHandle<S> {
  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn get(&self, request: &Request) -> Result<Option<CachedResponse>> {
    let key = RequestKey::new(request, &self.key_headers);
    self.storage.get(&self.id, &key)
  }

  /// Store a snapshot for `request`. Only GET requests can be stored.
  pub fn put(&self, request: &Request, response: &Response) -> Result<()> {
    if !request.is_get() {
      return Err(eyre!(
        "Refusing to cache {} {}: only GET requests are stored",
        request.method,
        request.url
      ));
    }

    let key = RequestKey::new(request, &self.key_headers);
    self.storage.put(&self.id, &key, response)
  }

  pub fn len(&self) -> Result<usize> {
    self.storage.entry_count(&self.id)
  }
}

impl<S: CacheStorage> Clone for NamespaceHandle<S> {
  fn clone(&self) -> Self {
    Self {
      id: self.id.clone(),
      storage: Arc::clone(&self.storage),
      key_headers: Arc::clone(&self.key_headers),
    }
  }
}
