//! Downloading feed text.
//!
//! [`FeedTransport`] is the seam between the adapter and the network. The
//! adapter only ever issues plain GET requests, so the trait is a single
//! method; [`HttpTransport`] implements it with reqwest.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{SourceError, SourceResult};
use crate::source::{BoxFuture, FeedResponse};

/// A downloaded feed: response metadata plus the decoded body.
#[derive(Debug, Clone)]
pub struct FeedBody {
    /// Response metadata.
    pub response: FeedResponse,
    /// The body decoded as text.
    pub text: String,
}

/// Performs the GET request for a feed.
pub trait FeedTransport: Send + Sync {
    /// Downloads `url`, sending `headers` verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error on connection failure or a non-success status.
    fn get<'a>(
        &'a self,
        url: &'a Url,
        headers: &'a BTreeMap<String, String>,
    ) -> BoxFuture<'a, SourceResult<FeedBody>>;
}

/// Settings for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Request timeout.
    pub timeout: Duration,
    /// User-Agent header.
    pub user_agent: String,
    /// Whether to verify TLS certificates.
    pub verify_tls: bool,
}

impl HttpTransportConfig {
    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets a custom user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Disables TLS certificate verification.
    pub fn with_insecure_tls(mut self) -> Self {
        self.verify_tls = false;
        self
    }
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("icsfeed/{}", env!("CARGO_PKG_VERSION")),
            verify_tls: true,
        }
    }
}

/// HTTP transport backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Creates a transport with the given settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &HttpTransportConfig) -> SourceResult<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                SourceError::network(format!("Failed to create HTTP client: {}", e)).with_cause(e)
            })?;

        Ok(Self { client })
    }

    async fn download(
        &self,
        url: &Url,
        headers: &BTreeMap<String, String>,
    ) -> SourceResult<FeedBody> {
        let header_map = build_header_map(headers)?;

        trace!(url = %url, headers = headers.len(), "Sending request");

        let response = self
            .client
            .get(url.clone())
            .headers(header_map)
            .send()
            .await
            .map_err(|e| SourceError::network(format!("Request failed: {}", e)).with_cause(e))?;

        let meta = FeedResponse {
            status: response.status(),
            url: response.url().clone(),
            headers: response.headers().clone(),
        };

        let text = handle_response(response).await?;
        debug!(url = %meta.url, bytes = text.len(), "Downloaded feed");

        Ok(FeedBody {
            response: meta,
            text,
        })
    }
}

impl FeedTransport for HttpTransport {
    fn get<'a>(
        &'a self,
        url: &'a Url,
        headers: &'a BTreeMap<String, String>,
    ) -> BoxFuture<'a, SourceResult<FeedBody>> {
        Box::pin(self.download(url, headers))
    }
}

/// Converts configured headers into a reqwest header map.
fn build_header_map(headers: &BTreeMap<String, String>) -> SourceResult<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            SourceError::configuration(format!("Invalid header name '{}': {}", name, e))
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| {
            SourceError::configuration(format!("Invalid value for header '{}': {}", name, e))
        })?;
        map.append(header_name, header_value);
    }
    Ok(map)
}

/// Checks the status and extracts the body.
async fn handle_response(response: Response) -> SourceResult<String> {
    let status = response.status();
    trace!(status = %status, "Received response");

    match status {
        s if s.is_success() => response.text().await.map_err(|e| {
            SourceError::network(format!("Failed to read response: {}", e)).with_cause(e)
        }),
        StatusCode::UNAUTHORIZED => Err(SourceError::authentication(
            "Authentication failed: feed requires credentials",
        )),
        StatusCode::FORBIDDEN => Err(SourceError::authorization("Access denied to feed")),
        StatusCode::NOT_FOUND | StatusCode::GONE => Err(SourceError::not_found("Feed not found")),
        StatusCode::TOO_MANY_REQUESTS => {
            Err(SourceError::rate_limited("Too many requests to server"))
        }
        s if s.is_server_error() => {
            let body = response.text().await.unwrap_or_default();
            Err(SourceError::server(format!(
                "Server error ({}): {}",
                s, body
            )))
        }
        s => {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %s, body = %body, "Unexpected response status");
            Err(SourceError::invalid_response(format!(
                "Unexpected status {}: {}",
                s, body
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceErrorCode;

    #[test]
    fn config_defaults() {
        let config = HttpTransportConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.user_agent.starts_with("icsfeed/"));
        assert!(config.verify_tls);
    }

    #[test]
    fn config_builder() {
        let config = HttpTransportConfig::default()
            .with_timeout(Duration::from_secs(5))
            .with_user_agent("calendar-host/2.0")
            .with_insecure_tls();
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.user_agent, "calendar-host/2.0");
        assert!(!config.verify_tls);
        assert!(HttpTransport::new(&config).is_ok());
    }

    #[test]
    fn header_map_keeps_values_verbatim() {
        let mut headers = BTreeMap::new();
        headers.insert("Authorization".to_string(), "Bearer s3cret".to_string());
        headers.insert("X-Calendar".to_string(), "team".to_string());

        let map = build_header_map(&headers).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["authorization"], "Bearer s3cret");
        assert_eq!(map["x-calendar"], "team");
    }

    #[test]
    fn invalid_header_is_a_configuration_error() {
        let mut headers = BTreeMap::new();
        headers.insert("Bad Header".to_string(), "x".to_string());
        let err = build_header_map(&headers).unwrap_err();
        assert_eq!(err.code(), SourceErrorCode::ConfigurationError);

        let mut headers = BTreeMap::new();
        headers.insert("X-Ok".to_string(), "line\nbreak".to_string());
        let err = build_header_map(&headers).unwrap_err();
        assert_eq!(err.code(), SourceErrorCode::ConfigurationError);
    }
}
