//! Core types for the caching system: request keys and served results.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::types::Request;

/// Identity of a request inside a namespace.
///
/// The canonical form is the uppercased method, the absolute URL without its
/// fragment, and the values of the configured content-negotiation headers
/// (lowercased names, sorted). Storage uses the SHA-256 of that form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestKey {
  hash: String,
  canonical: String,
}

impl RequestKey {
  pub fn new(request: &Request, key_headers: &[String]) -> Self {
    let mut url = request.url.clone();
    url.set_fragment(None);

    let mut canonical = format!("{} {}", request.method.to_ascii_uppercase(), url);

    let mut names: Vec<String> = key_headers.iter().map(|h| h.to_ascii_lowercase()).collect();
    names.sort();
    names.dedup();
    for name in names {
      let value = request.header(&name).unwrap_or("");
      canonical.push('\n');
      canonical.push_str(&name);
      canonical.push_str(": ");
      canonical.push_str(value.trim());
    }

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Self { hash, canonical }
  }

  pub fn hash(&self) -> &str {
    &self.hash
  }

  pub fn canonical(&self) -> &str {
    &self.canonical
  }
}

/// Result of serving a request, including where the response came from.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Live data from the network.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// A stored snapshot.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
    }
  }

  /// A response fabricated locally because neither cache nor network could serve.
  pub fn synthetic(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Synthetic,
      cached_at: None,
    }
  }
}

/// Indicates where served data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  Network,
  Cache,
  Synthetic,
}
