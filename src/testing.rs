//! Test doubles shared by the module tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};

use crate::cache::{CacheStorage, CachedResponse, RequestKey, SqliteStorage};
use crate::fetch::{Fetch, FetchError};
use crate::types::{Request, Response};

/// Scripted network: each URL either answers with a response or fails.
/// Unknown URLs fail. Every call is counted.
#[derive(Clone, Default)]
pub struct MockFetcher {
  routes: Arc<Mutex<HashMap<String, Option<Response>>>>,
  calls: Arc<AtomicUsize>,
  delay: Option<Duration>,
}

impl MockFetcher {
  pub fn new() -> Self {
    Self::default()
  }

  /// Every fetch sleeps this long before answering.
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  pub fn respond(&self, url: &str, response: Response) {
    self.routes.lock().unwrap().insert(url.to_string(), Some(response));
  }

  pub fn fail(&self, url: &str) {
    self.routes.lock().unwrap().insert(url.to_string(), None);
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

impl Fetch for MockFetcher {
  async fn fetch(&self, request: &Request) -> std::result::Result<Response, FetchError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }

    let reply = self.routes.lock().unwrap().get(request.url.as_str()).cloned();
    match reply {
      Some(Some(response)) => Ok(response),
      _ => Err(FetchError::network(&request.url, "offline")),
    }
  }
}

/// In-memory store whose entry writes always fail, as with a full disk.
/// Everything else goes to a real SQLite store.
pub struct ReadOnlyStorage {
  inner: SqliteStorage,
}

impl ReadOnlyStorage {
  pub fn new() -> Self {
    Self {
      inner: SqliteStorage::open_in_memory().unwrap(),
    }
  }
}

impl CacheStorage for ReadOnlyStorage {
  fn create_namespace(&self, name: &str) -> Result<()> {
    self.inner.create_namespace(name)
  }

  fn has_namespace(&self, name: &str) -> Result<bool> {
    self.inner.has_namespace(name)
  }

  fn list_namespaces(&self) -> Result<Vec<String>> {
    self.inner.list_namespaces()
  }

  fn delete_namespace(&self, name: &str) -> Result<bool> {
    self.inner.delete_namespace(name)
  }

  fn get(&self, namespace: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
    self.inner.get(namespace, key)
  }

  fn put(&self, namespace: &str, _key: &RequestKey, _response: &Response) -> Result<()> {
    Err(eyre!("Failed to store entry in {}: database or disk is full", namespace))
  }

  fn entry_count(&self, namespace: &str) -> Result<usize> {
    self.inner.entry_count(namespace)
  }

  fn get_meta(&self, key: &str) -> Result<Option<String>> {
    self.inner.get_meta(key)
  }

  fn set_meta(&self, key: &str, value: &str) -> Result<()> {
    self.inner.set_meta(key, value)
  }
}
