use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::cache::{CacheResult, CacheStorage, NamespaceManager, NamespaceSet, PruneReport};
use crate::config::Config;
use crate::fetch::Fetch;
use crate::lifecycle::{LifecycleController, LifecycleState, PreloadReport};
use crate::notification::Notification;
use crate::router::Router;
use crate::strategy::{self, Served};
use crate::types::Request;

/// Worker events
#[derive(Debug)]
pub enum Event {
  Install,
  Activate,
  /// An outgoing request to answer
  Intercept(Request),
  /// A push message, with its raw payload if any
  PushReceived(Option<Vec<u8>>),
  /// The user picked an action on a displayed notification
  NotificationAction {
    action: String,
    notification: Notification,
  },
}

/// What handling an event produced.
#[derive(Debug)]
pub enum EventOutcome {
  Installed(PreloadReport),
  Activated(PruneReport),
  Response(Served),
  ShowNotification(Notification),
  /// Notification closed, this page should be opened
  OpenWindow(String),
  /// Notification closed, nothing else to do
  Dismissed,
}

/// The interception layer: lifecycle, routing and strategies over one store.
pub struct Worker<S: CacheStorage, F: Fetch> {
  inner: Arc<WorkerInner<S, F>>,
}

struct WorkerInner<S: CacheStorage, F: Fetch> {
  lifecycle: LifecycleController<S>,
  router: Router,
  fetcher: F,
}

impl<S: CacheStorage, F: Fetch> Worker<S, F> {
  /// Build a worker over `storage`, resuming an earlier activation of the
  /// same namespace version.
  pub fn new(config: &Config, storage: S, fetcher: F) -> Result<Self> {
    let namespaces = NamespaceManager::new(storage, config.key_headers.clone());
    let set = NamespaceSet::from_config(&config.namespaces);
    let lifecycle = LifecycleController::new(namespaces, set, config.precache_requests()?);

    if lifecycle.resume()? {
      info!(namespaces = ?lifecycle.set().ids(), "resumed active worker");
    }

    Ok(Self {
      inner: Arc::new(WorkerInner {
        lifecycle,
        router: Router::new(&config.routing),
        fetcher,
      }),
    })
  }

  pub fn state(&self) -> LifecycleState {
    self.inner.lifecycle.state()
  }

  pub fn namespaces(&self) -> &NamespaceManager<S> {
    self.inner.lifecycle.namespaces()
  }

  /// Route one event to the component that owns it.
  pub async fn handle(&self, event: Event) -> Result<EventOutcome> {
    match event {
      Event::Install => {
        let report = self.inner.lifecycle.install(&self.inner.fetcher).await?;
        Ok(EventOutcome::Installed(report))
      }
      Event::Activate => {
        let report = self.inner.lifecycle.activate().await?;
        Ok(EventOutcome::Activated(report))
      }
      Event::Intercept(request) => Ok(EventOutcome::Response(self.intercept(&request).await)),
      Event::PushReceived(data) => Ok(EventOutcome::ShowNotification(Notification::from_push(
        data.as_deref(),
      ))),
      Event::NotificationAction {
        action,
        notification,
      } => Ok(match notification.on_action(&action) {
        Some(url) => EventOutcome::OpenWindow(url.to_string()),
        None => EventOutcome::Dismissed,
      }),
    }
  }

  /// Answer a request. Until the first activation requests go straight to
  /// the network; after it, a reinstall does not interrupt cache service.
  pub async fn intercept(&self, request: &Request) -> Served {
    let inner = &self.inner;

    if !inner.lifecycle.is_controlling() {
      debug!(url = %request.url, "not controlling, passing through");
      return inner
        .fetcher
        .fetch(request)
        .await
        .map(CacheResult::from_network);
    }

    let route = inner.router.classify(&request.url);
    strategy::respond(
      route,
      request,
      inner.lifecycle.namespaces(),
      inner.lifecycle.set(),
      &inner.fetcher,
    )
    .await
  }
}

impl<S: CacheStorage, F: Fetch> Clone for Worker<S, F> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

type Envelope = (Event, oneshot::Sender<Result<EventOutcome>>);

/// Feeds events to a worker from a channel.
///
/// Lifecycle and notification events are handled one at a time, in order.
/// Each intercepted request runs as its own task so a slow fetch never
/// holds up other requests.
#[derive(Clone)]
pub struct Dispatcher {
  tx: mpsc::UnboundedSender<Envelope>,
}

impl Dispatcher {
  pub fn spawn<S, F>(worker: Worker<S, F>) -> Self
  where
    S: CacheStorage + 'static,
    F: Fetch + 'static,
  {
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();

    tokio::spawn(async move {
      while let Some((event, reply)) = rx.recv().await {
        match event {
          Event::Intercept(request) => {
            let worker = worker.clone();
            tokio::spawn(async move {
              let served = worker.intercept(&request).await;
              // Ignore send errors - caller may have gone away
              let _ = reply.send(Ok(EventOutcome::Response(served)));
            });
          }
          other => {
            let outcome = worker.handle(other).await;
            let _ = reply.send(outcome);
          }
        }
      }
    });

    Self { tx }
  }

  /// Send an event and wait for its outcome.
  pub async fn send(&self, event: Event) -> Result<EventOutcome> {
    let (reply_tx, reply_rx) = oneshot::channel();
    self
      .tx
      .send((event, reply_tx))
      .map_err(|_| eyre!("Dispatcher has stopped"))?;

    reply_rx
      .await
      .map_err(|_| eyre!("Event was dropped before completing"))?
  }
}
