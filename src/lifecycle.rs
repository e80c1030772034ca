//! Install/activate lifecycle of the cache.
//!
//! Parsed -> Installing -> Installed -> Activating -> Active. Install creates
//! both namespaces and preloads the manifest, activation prunes every other
//! namespace. A new install restarts the cycle, but a controller that has
//! been activated keeps serving from the cache while it reinstalls.

use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{info, warn};

use crate::cache::{CacheStorage, NamespaceHandle, NamespaceManager, NamespaceSet, PruneReport};
use crate::fetch::Fetch;
use crate::types::Request;

/// Meta key recording which namespace set was last activated.
const ACTIVE_SET_KEY: &str = "active_namespaces";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  /// Nothing installed yet in this run
  Parsed,
  Installing,
  /// Installed, waiting for activation
  Installed,
  Activating,
  /// Controlling requests
  Active,
}

/// Outcome of preloading the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreloadReport {
  pub cached: Vec<String>,
  /// URLs that could not be cached, with the reason
  pub failed: Vec<(String, String)>,
}

pub struct LifecycleController<S: CacheStorage> {
  namespaces: NamespaceManager<S>,
  set: NamespaceSet,
  manifest: Vec<Request>,
  state: Mutex<LifecycleState>,
  /// Set by activation or resume, never cleared by a reinstall
  controlling: AtomicBool,
}

impl<S: CacheStorage> LifecycleController<S> {
  pub fn new(namespaces: NamespaceManager<S>, set: NamespaceSet, manifest: Vec<Request>) -> Self {
    Self {
      namespaces,
      set,
      manifest,
      state: Mutex::new(LifecycleState::Parsed),
      controlling: AtomicBool::new(false),
    }
  }

  pub fn namespaces(&self) -> &NamespaceManager<S> {
    &self.namespaces
  }

  pub fn set(&self) -> &NamespaceSet {
    &self.set
  }

  pub fn state(&self) -> LifecycleState {
    *self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Whether requests are answered from the cache. Stays true through a
  /// reinstall once the controller has been activated.
  pub fn is_controlling(&self) -> bool {
    self.controlling.load(Ordering::SeqCst)
  }

  fn transition(&self, to: LifecycleState) {
    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
    info!(from = ?*state, to = ?to, "lifecycle transition");
    *state = to;
  }

  /// Pick up an activation from an earlier run of the same version.
  pub fn resume(&self) -> Result<bool> {
    let active = self.namespaces.storage().get_meta(ACTIVE_SET_KEY)?;
    if active.as_deref() == Some(self.set_marker().as_str()) {
      self.transition(LifecycleState::Active);
      self.controlling.store(true, Ordering::SeqCst);
      return Ok(true);
    }
    Ok(false)
  }

  /// Create both namespaces and preload the manifest into the static one.
  ///
  /// Individual preload failures are reported, never fatal. The controller
  /// moves to Installed right away without waiting for older instances.
  pub async fn install<F: Fetch>(&self, fetcher: &F) -> Result<PreloadReport> {
    self.transition(LifecycleState::Installing);

    let static_ns = match self.ensure_namespaces() {
      Ok(handle) => handle,
      Err(e) => {
        self.transition(LifecycleState::Parsed);
        return Err(e);
      }
    };

    info!(namespace = static_ns.id(), assets = self.manifest.len(), "caching static assets");
    let report = preload(&static_ns, &self.manifest, fetcher).await;
    if !report.failed.is_empty() {
      warn!(
        failed = report.failed.len(),
        cached = report.cached.len(),
        "some static assets were not cached"
      );
    }

    self.transition(LifecycleState::Installed);
    Ok(report)
  }

  fn ensure_namespaces(&self) -> Result<NamespaceHandle<S>> {
    self.namespaces.ensure(&self.set.dynamic_id)?;
    self.namespaces.ensure(&self.set.static_id)
  }

  /// Delete every namespace but the current two, then take control.
  ///
  /// Completes only once pruning is done.
  pub async fn activate(&self) -> Result<PruneReport> {
    match self.state() {
      LifecycleState::Installed | LifecycleState::Active => {}
      other => return Err(eyre!("Cannot activate from state {:?}", other)),
    }

    self.transition(LifecycleState::Activating);

    let report = match self.namespaces.prune(&self.set.ids()) {
      Ok(report) => report,
      Err(e) => {
        self.transition(LifecycleState::Installed);
        return Err(e);
      }
    };

    if let Err(e) = self
      .namespaces
      .storage()
      .set_meta(ACTIVE_SET_KEY, &self.set_marker())
    {
      warn!(error = %e, "failed to record active version");
    }

    info!(
      deleted = report.deleted.len(),
      failed = report.failed.len(),
      "activated"
    );
    self.transition(LifecycleState::Active);
    self.controlling.store(true, Ordering::SeqCst);
    Ok(report)
  }

  fn set_marker(&self) -> String {
    format!("{},{}", self.set.static_id, self.set.dynamic_id)
  }
}

/// Fetch every manifest entry concurrently and store the successful ones.
///
/// Network failures, non-2xx statuses and write failures are recorded per
/// entry; the rest of the manifest is still cached.
pub async fn preload<S, F>(
  namespace: &NamespaceHandle<S>,
  manifest: &[Request],
  fetcher: &F,
) -> PreloadReport
where
  S: CacheStorage,
  F: Fetch,
{
  let responses = join_all(manifest.iter().map(|request| fetcher.fetch(request))).await;

  let mut report = PreloadReport::default();
  for (request, result) in manifest.iter().zip(responses) {
    let url = request.url.to_string();
    let outcome = match result {
      Ok(response) if response.is_ok() => namespace
        .put(request, &response)
        .map_err(|e| e.to_string()),
      Ok(response) => Err(format!("unexpected status {}", response.status)),
      Err(e) => Err(e.to_string()),
    };

    match outcome {
      Ok(()) => report.cached.push(url),
      Err(reason) => {
        warn!(url = %url, reason = %reason, "asset not cached");
        report.failed.push((url, reason));
      }
    }
  }

  report
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStorage;
  use crate::config::NamespaceConfig;
  use crate::testing::MockFetcher;
  use crate::types::Response;
  use url::Url;

  const INDEX: &str = "http://localhost:8080/index.html";
  const MANIFEST: &str = "http://localhost:8080/manifest.json";
  const LEAFLET: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js";

  fn manifest() -> Vec<Request> {
    [INDEX, MANIFEST, LEAFLET]
      .iter()
      .map(|u| Request::get(Url::parse(u).unwrap()))
      .collect()
  }

  fn controller_with(
    storage: SqliteStorage,
    version: u32,
  ) -> LifecycleController<SqliteStorage> {
    let namespaces = NamespaceManager::new(storage, Vec::new());
    let set = NamespaceSet::from_config(&NamespaceConfig {
      version,
      ..NamespaceConfig::default()
    });
    LifecycleController::new(namespaces, set, manifest())
  }

  fn controller() -> LifecycleController<SqliteStorage> {
    controller_with(SqliteStorage::open_in_memory().unwrap(), 1)
  }

  #[tokio::test]
  async fn test_install_creates_namespaces_and_preloads() {
    let lifecycle = controller();
    let fetcher = MockFetcher::new();
    fetcher.respond(INDEX, Response::new(200, "<html/>"));
    fetcher.respond(MANIFEST, Response::new(200, "{}"));
    fetcher.respond(LEAFLET, Response::new(200, "L"));

    let report = lifecycle.install(&fetcher).await.unwrap();

    assert_eq!(lifecycle.state(), LifecycleState::Installed);
    assert_eq!(report.cached.len(), 3);
    assert!(report.failed.is_empty());
    let ids = lifecycle.namespaces().namespace_ids().unwrap();
    assert!(ids.contains(&"cadastre-ci-v1".to_string()));
    assert!(ids.contains(&"cadastre-data-v1".to_string()));
    let static_ns = lifecycle.namespaces().handle("cadastre-ci-v1");
    assert_eq!(static_ns.len().unwrap(), 3);
  }

  #[tokio::test]
  async fn test_preload_failure_does_not_abort_the_rest() {
    let lifecycle = controller();
    let fetcher = MockFetcher::new();
    fetcher.respond(INDEX, Response::new(200, "<html/>"));
    fetcher.respond(MANIFEST, Response::new(404, "missing"));
    fetcher.fail(LEAFLET);

    let report = lifecycle.install(&fetcher).await.unwrap();

    assert_eq!(report.cached, vec![INDEX.to_string()]);
    assert_eq!(report.failed.len(), 2);
    assert_eq!(report.failed[0].0, MANIFEST);
    assert!(report.failed[0].1.contains("404"));
    assert_eq!(lifecycle.state(), LifecycleState::Installed);
    assert_eq!(fetcher.calls(), 3);
  }

  #[tokio::test]
  async fn test_activate_before_install_is_rejected() {
    let lifecycle = controller();
    assert!(lifecycle.activate().await.is_err());
    assert_eq!(lifecycle.state(), LifecycleState::Parsed);
  }

  #[tokio::test]
  async fn test_activation_prunes_all_other_versions() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let old = controller_with(storage, 1);
    let fetcher = MockFetcher::new();
    fetcher.respond(INDEX, Response::new(200, "v1"));
    old.install(&fetcher).await.unwrap();
    old.activate().await.unwrap();
    old.namespaces().ensure("unrelated").unwrap();

    // Same store, bumped version
    let new = LifecycleController::new(
      old.namespaces().clone(),
      NamespaceSet::from_config(&NamespaceConfig {
        version: 2,
        ..NamespaceConfig::default()
      }),
      manifest(),
    );
    fetcher.respond(INDEX, Response::new(200, "v2"));
    new.install(&fetcher).await.unwrap();
    let report = new.activate().await.unwrap();

    assert_eq!(
      report.deleted,
      vec!["cadastre-data-v1", "cadastre-ci-v1", "unrelated"]
    );
    assert_eq!(
      new.namespaces().namespace_ids().unwrap(),
      vec!["cadastre-data-v2", "cadastre-ci-v2"]
    );
    let index = Request::get(Url::parse(INDEX).unwrap());
    let cached = new.namespaces().handle("cadastre-ci-v2").get(&index).unwrap().unwrap();
    assert_eq!(cached.response.body, b"v2");
    assert_eq!(new.state(), LifecycleState::Active);
  }

  #[tokio::test]
  async fn test_current_namespaces_survive_reactivation_untouched() {
    let lifecycle = controller();
    let fetcher = MockFetcher::new();
    fetcher.respond(INDEX, Response::new(200, "<html/>"));
    lifecycle.install(&fetcher).await.unwrap();
    lifecycle.activate().await.unwrap();

    let report = lifecycle.activate().await.unwrap();

    assert!(report.deleted.is_empty());
    assert_eq!(lifecycle.namespaces().handle("cadastre-ci-v1").len().unwrap(), 1);
  }

  #[tokio::test]
  async fn test_resume_only_for_same_version() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let fetcher = MockFetcher::new();

    let first = controller_with(SqliteStorage::open(Some(&path)).unwrap(), 1);
    first.install(&fetcher).await.unwrap();
    first.activate().await.unwrap();

    let same = controller_with(SqliteStorage::open(Some(&path)).unwrap(), 1);
    assert!(same.resume().unwrap());
    assert!(same.is_controlling());

    let bumped = controller_with(SqliteStorage::open(Some(&path)).unwrap(), 2);
    assert!(!bumped.resume().unwrap());
    assert_eq!(bumped.state(), LifecycleState::Parsed);
  }

  #[tokio::test]
  async fn test_reinstall_keeps_control() {
    let lifecycle = controller();
    let fetcher = MockFetcher::new();
    assert!(!lifecycle.is_controlling());

    lifecycle.install(&fetcher).await.unwrap();
    assert!(!lifecycle.is_controlling());
    lifecycle.activate().await.unwrap();
    assert!(lifecycle.is_controlling());

    lifecycle.install(&fetcher).await.unwrap();
    assert_eq!(lifecycle.state(), LifecycleState::Installed);
    assert!(lifecycle.is_controlling());
  }
}
