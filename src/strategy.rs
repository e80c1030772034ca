//! The three caching strategies.
//!
//! Each handler returns the response for one request and may write to a
//! namespace on the way. Cache writes are awaited before the response is
//! returned; a failed write is logged and never fails the request.

use tracing::{debug, warn};

use crate::cache::{CacheResult, CacheStorage, NamespaceHandle, NamespaceManager, NamespaceSet};
use crate::fetch::{Fetch, FetchError};
use crate::router::Route;
use crate::types::{Request, Response};

pub type Served = Result<CacheResult<Response>, FetchError>;

/// Run the strategy selected for `route`.
pub async fn respond<S, F>(
  route: Route,
  request: &Request,
  namespaces: &NamespaceManager<S>,
  set: &NamespaceSet,
  fetcher: &F,
) -> Served
where
  S: CacheStorage,
  F: Fetch,
{
  debug!(?route, method = %request.method, url = %request.url, "routing request");

  match route {
    Route::NetworkFirst => {
      network_first(request, &namespaces.handle(&set.dynamic_id), fetcher).await
    }
    Route::CacheFirstWithRefill => {
      Ok(cache_first_with_refill(request, &namespaces.handle(&set.static_id), fetcher).await)
    }
    Route::CacheFirstWithFallback => cache_first_with_fallback(request, namespaces, fetcher).await,
  }
}

/// Network first, dynamic namespace when offline.
///
/// A network failure with nothing cached propagates the failure.
pub async fn network_first<S, F>(
  request: &Request,
  dynamic: &NamespaceHandle<S>,
  fetcher: &F,
) -> Served
where
  S: CacheStorage,
  F: Fetch,
{
  match fetcher.fetch(request).await {
    Ok(response) => {
      store(dynamic, request, &response);
      Ok(CacheResult::from_network(response))
    }
    Err(err) => {
      debug!(url = %request.url, error = %err, "network failed, trying dynamic cache");
      match lookup(dynamic, request) {
        Some(cached) => Ok(CacheResult::from_cache(cached.response, cached.cached_at)),
        None => Err(err),
      }
    }
  }
}

/// Static namespace first; on a miss fetch and store. Never fails: with
/// neither cache nor network the answer is an empty 503.
pub async fn cache_first_with_refill<S, F>(
  request: &Request,
  static_ns: &NamespaceHandle<S>,
  fetcher: &F,
) -> CacheResult<Response>
where
  S: CacheStorage,
  F: Fetch,
{
  if let Some(cached) = lookup(static_ns, request) {
    return CacheResult::from_cache(cached.response, cached.cached_at);
  }

  match fetcher.fetch(request).await {
    Ok(response) => {
      store(static_ns, request, &response);
      CacheResult::from_network(response)
    }
    Err(err) => {
      debug!(url = %request.url, error = %err, "tile unavailable");
      CacheResult::synthetic(Response::unavailable())
    }
  }
}

/// Any live namespace first, then the network as-is. Nothing is written here.
pub async fn cache_first_with_fallback<S, F>(
  request: &Request,
  namespaces: &NamespaceManager<S>,
  fetcher: &F,
) -> Served
where
  S: CacheStorage,
  F: Fetch,
{
  if let Some(cached) = namespaces.match_any(request) {
    return Ok(CacheResult::from_cache(cached.response, cached.cached_at));
  }

  fetcher.fetch(request).await.map(CacheResult::from_network)
}

/// Read errors count as misses.
fn lookup<S: CacheStorage>(
  namespace: &NamespaceHandle<S>,
  request: &Request,
) -> Option<crate::cache::CachedResponse> {
  match namespace.get(request) {
    Ok(Some(cached)) => {
      debug!(namespace = namespace.id(), url = %request.url, "cache hit");
      Some(cached)
    }
    Ok(None) => {
      debug!(namespace = namespace.id(), url = %request.url, "cache miss");
      None
    }
    Err(e) => {
      warn!(namespace = namespace.id(), error = %e, "cache read failed, treating as miss");
      None
    }
  }
}

fn store<S: CacheStorage>(namespace: &NamespaceHandle<S>, request: &Request, response: &Response) {
  if let Err(e) = namespace.put(request, response) {
    warn!(namespace = namespace.id(), url = %request.url, error = %e, "cache write failed");
  }
}
