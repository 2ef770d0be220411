//! Shared `reqwest` transport used by both upstream sources.

use std::io;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{ETAG, HeaderMap, LAST_MODIFIED, USER_AGENT};
use reqwest::{Client, Response};

use crate::detector::RemoteMeta;
use crate::error::TransportError;

/// User agent sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = "openfiscal-sync/0.1";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Settings shared by the HTTP-backed sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSourceConfig {
    /// Per-request timeout covering connection and body transfer.
    pub timeout: Duration,
    /// Value of the `User-Agent` header.
    pub user_agent: String,
    /// Accept certificates that fail validation.
    pub accept_invalid_certs: bool,
    /// Largest body, in bytes, that will be buffered.
    pub max_body_bytes: usize,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            accept_invalid_certs: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl HttpSourceConfig {
    /// Override the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Toggle acceptance of invalid TLS certificates.
    #[must_use]
    pub const fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Override the body size cap.
    #[must_use]
    pub const fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }
}

/// Thin wrapper around a configured [`Client`].
#[derive(Debug, Clone)]
pub(crate) struct HttpTransport {
    client: Client,
    config: HttpSourceConfig,
}

impl HttpTransport {
    pub(crate) fn new(config: HttpSourceConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|err| TransportError::Client {
                message: err.to_string(),
            })?;
        Ok(Self { client, config })
    }

    /// Download `url` into memory, refusing bodies above the configured cap.
    pub(crate) async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let response = self.send(self.client.get(url), url).await?;
        self.read_capped(response, url).await
    }

    /// Issue a `HEAD` request and collect the change-detection headers.
    pub(crate) async fn head(&self, url: &str) -> Result<RemoteMeta, TransportError> {
        let response = self.send(self.client.head(url), url).await?;
        Ok(remote_meta(response.headers()))
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<Response, TransportError> {
        request
            .header(USER_AGENT, self.config.user_agent.as_str())
            .send()
            .await
            .map_err(|err| convert_reqwest_error(err, url))?
            .error_for_status()
            .map_err(|err| convert_reqwest_error(err, url))
    }

    async fn read_capped(&self, response: Response, url: &str) -> Result<Vec<u8>, TransportError> {
        let limit = self.config.max_body_bytes;
        if response
            .content_length()
            .and_then(|length| usize::try_from(length).ok())
            .is_some_and(|length| length > limit)
        {
            return Err(TransportError::BodyTooLarge {
                url: url.to_owned(),
                limit,
            });
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|err| convert_reqwest_error(err, url))?;
            if body.len().saturating_add(bytes.len()) > limit {
                return Err(TransportError::BodyTooLarge {
                    url: url.to_owned(),
                    limit,
                });
            }
            body.extend_from_slice(&bytes);
        }
        Ok(body)
    }
}

fn remote_meta(headers: &HeaderMap) -> RemoteMeta {
    let header_text = |name| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_owned)
    };
    RemoteMeta {
        etag: header_text(ETAG),
        last_modified: header_text(LAST_MODIFIED),
    }
}

fn convert_reqwest_error(error: reqwest::Error, url: &str) -> TransportError {
    if let Some(status) = error.status() {
        return TransportError::Http {
            url: url.to_owned(),
            status: status.as_u16(),
            message: error.to_string(),
        };
    }
    if error.is_timeout() {
        return TransportError::Timeout {
            url: url.to_owned(),
        };
    }
    TransportError::Network {
        url: url.to_owned(),
        source: io::Error::other(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use rstest::rstest;

    #[rstest]
    fn builders_override_defaults() {
        let config = HttpSourceConfig::default()
            .with_timeout(Duration::from_secs(5))
            .with_user_agent("probe/1")
            .with_accept_invalid_certs(true)
            .with_max_body_bytes(10);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.user_agent, "probe/1");
        assert!(config.accept_invalid_certs);
        assert_eq!(config.max_body_bytes, 10);
    }

    #[rstest]
    fn defaults_cap_bodies_at_64_mebibytes() {
        let config = HttpSourceConfig::default();
        assert_eq!(config.max_body_bytes, 64 * 1024 * 1024);
        assert!(!config.accept_invalid_certs);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }

    #[rstest]
    fn collects_change_detection_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(ETAG, HeaderValue::from_static("\"abc\""));
        headers.insert(LAST_MODIFIED, HeaderValue::from_static("   "));
        let meta = remote_meta(&headers);
        assert_eq!(meta.etag.as_deref(), Some("\"abc\""));
        assert_eq!(meta.last_modified, None);
    }

    #[rstest]
    #[case(TransportError::Http { url: "u".into(), status: 503, message: String::new() }, true)]
    #[case(TransportError::Http { url: "u".into(), status: 429, message: String::new() }, true)]
    #[case(TransportError::Http { url: "u".into(), status: 404, message: String::new() }, false)]
    #[case(TransportError::Timeout { url: "u".into() }, true)]
    #[case(TransportError::BodyTooLarge { url: "u".into(), limit: 1 }, false)]
    fn classifies_transient_failures(#[case] error: TransportError, #[case] expected: bool) {
        assert_eq!(error.is_transient(), expected);
    }
}
