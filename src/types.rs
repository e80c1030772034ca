//! Request and response values passed between the router, the strategies and the store.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// An outgoing request as seen by the interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: String,
  pub url: Url,
  pub headers: Vec<(String, String)>,
}

impl Request {
  /// A plain GET for an absolute URL.
  #[cfg(test)]
  pub fn get(url: Url) -> Self {
    Self {
      method: "GET".to_string(),
      url,
      headers: Vec::new(),
    }
  }

  /// Parse a request target, resolving relative references (`./index.html`)
  /// against `origin`. Absolute URLs are kept as they are.
  pub fn parse(method: &str, target: &str, origin: &Url) -> Result<Self> {
    let method = method.trim();
    if method.is_empty() || !method.bytes().all(|b| b.is_ascii_alphabetic()) {
      return Err(eyre!("Invalid request method '{}'", method));
    }

    let url = origin
      .join(target)
      .map_err(|e| eyre!("Invalid request URL '{}': {}", target, e))?;

    Ok(Self {
      method: method.to_ascii_uppercase(),
      url,
      headers: Vec::new(),
    })
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  /// Case-insensitive header lookup; the first occurrence wins.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  pub fn is_get(&self) -> bool {
    self.method == "GET"
  }
}

/// A full response snapshot: status, headers and body bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  /// The terminal fallback for tile requests: 503 with an empty body.
  pub fn unavailable() -> Self {
    Self::new(503, Vec::new())
  }

  #[cfg(test)]
  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  /// 2xx status.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }
}
