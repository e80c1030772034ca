//! Network access used by the strategies.

use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use thiserror::Error;
use tracing::debug;

use crate::config::NetworkConfig;
use crate::types::{Request, Response};

/// A fetch that could not produce a response at all.
///
/// HTTP error statuses are not failures: they come back as a `Response`.
#[derive(Debug, Error)]
pub enum FetchError {
  #[error("network request to {url} failed: {reason}")]
  Network { url: String, reason: String },
  #[error("unsupported request method {0}")]
  InvalidMethod(String),
}

impl FetchError {
  pub fn network(url: impl ToString, reason: impl ToString) -> Self {
    Self::Network {
      url: url.to_string(),
      reason: reason.to_string(),
    }
  }
}

/// Something that can perform a request over the network.
pub trait Fetch: Send + Sync {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response, FetchError>> + Send;
}

/// HTTP fetcher backed by reqwest.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new(config: &NetworkConfig) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(config.timeout())
      .user_agent(config.user_agent.clone())
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

impl Fetch for HttpFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
      .map_err(|_| FetchError::InvalidMethod(request.method.clone()))?;

    let mut builder = self.client.request(method, request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| FetchError::network(&request.url, e))?;

    let status = response.status().as_u16();
    let headers: Vec<(String, String)> = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    // A body cut off mid-transfer is as good as no response
    let body = response
      .bytes()
      .await
      .map_err(|e| FetchError::network(&request.url, e))?;

    debug!(url = %request.url, status, bytes = body.len(), "fetched");

    Ok(Response {
      status,
      headers,
      body: body.to_vec(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  #[test]
  fn test_network_error_message_names_url() {
    let err = FetchError::network("http://localhost/a", "connection refused");
    assert_eq!(
      err.to_string(),
      "network request to http://localhost/a failed: connection refused"
    );
  }

  #[tokio::test]
  async fn test_unreachable_host_is_a_network_failure() {
    let fetcher = HttpFetcher::new(&NetworkConfig {
      timeout_secs: 2,
      ..NetworkConfig::default()
    })
    .unwrap();
    // Port 9 on localhost (discard) is closed on any sane test host
    let request = Request::get(Url::parse("http://127.0.0.1:9/index.html").unwrap());

    let err = fetcher.fetch(&request).await.unwrap_err();
    assert!(matches!(err, FetchError::Network { .. }));
  }

  #[tokio::test]
  async fn test_invalid_method_is_rejected_before_sending() {
    let fetcher = HttpFetcher::new(&NetworkConfig::default()).unwrap();
    let mut request = Request::get(Url::parse("http://127.0.0.1:9/").unwrap());
    request.method = "BAD METHOD".to_string();

    let err = fetcher.fetch(&request).await.unwrap_err();
    assert!(matches!(err, FetchError::InvalidMethod(_)));
  }
}
