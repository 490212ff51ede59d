//! HTTP client for the Scheduler status service.
//!
//! The [`StatusClient`] speaks a small RPC-over-HTTP protocol: each call is a
//! `POST` of the empty message to `{endpoint}/Scheduler/{Method}`. The
//! streaming call answers with newline-delimited frames (see
//! [`crate::Frame`]); the unary call answers with a single JSON object.

use std::{fmt, time::Duration};

use reqwest::{Url, header};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    codec::{DEFAULT_MAX_FRAME_LEN, FrameDecoder},
    retry::RetryPolicy,
    stream::StatusStream,
    types::{StatusUpdate, WatchError},
};

/// Path of the streaming status call, relative to the endpoint.
pub const WATCH_SYSTEM_STATUS: &str = "Scheduler/WatchSystemStatus";

/// Path of the unary status call, relative to the endpoint.
pub const SYSTEM_STATUS: &str = "Scheduler/SystemStatus";

/// Media type of the streaming response body.
pub const NDJSON: &str = "application/x-ndjson";

/// The empty request message.
#[derive(Debug, Clone, Copy, Default, Serialize)]
struct Empty {}

/// Configuration for the status client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Bound on establishing the TCP/TLS connection.
    pub connect_timeout: Duration,
    /// Bound on the gap between chunks of the streaming body.
    ///
    /// `None` waits indefinitely.
    pub idle_timeout: Option<Duration>,
    /// Upper bound on a single frame of the streaming body, in bytes.
    pub max_frame_len: usize,
    /// Reconnection policy used by [`crate::StatusWatcher`].
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            idle_timeout: None,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            retry: RetryPolicy::Never,
        }
    }
}

/// Client bound to a single status endpoint.
///
/// Construction performs no network I/O. Cloning is cheap and clones share
/// the underlying connection pool.
#[derive(Clone)]
pub struct StatusClient {
    /// The endpoint as given by the caller.
    endpoint: String,
    /// Resolved URL of the streaming call.
    watch_url: Url,
    /// Resolved URL of the unary call.
    status_url: Url,
    /// Client configuration.
    config: ClientConfig,
    /// HTTP client.
    http: reqwest::Client,
}

impl fmt::Debug for StatusClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusClient")
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StatusClient {
    /// Creates a client for `endpoint` with default configuration.
    ///
    /// Accepts `http://host:port`, `https://host:port`, or a bare
    /// `host:port`, which is treated as plain HTTP.
    pub fn connect(endpoint: &str) -> Result<Self, WatchError> {
        Self::with_config(endpoint, ClientConfig::default())
    }

    /// Creates a client for `endpoint` with the given configuration.
    pub fn with_config(endpoint: &str, config: ClientConfig) -> Result<Self, WatchError> {
        let base = parse_endpoint(endpoint)?;
        let watch_url = join(endpoint, &base, WATCH_SYSTEM_STATUS)?;
        let status_url = join(endpoint, &base, SYSTEM_STATUS)?;

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| invalid(endpoint, format!("failed to build http client: {e}")))?;

        debug!(endpoint, url = %watch_url, "status client configured");
        Ok(Self { endpoint: endpoint.to_string(), watch_url, status_url, config, http })
    }

    /// Returns the endpoint as given.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the client configuration.
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Opens the streaming status call.
    ///
    /// Resolves once the server has accepted the call. Failures to connect
    /// or a non-success HTTP status are returned here; later failures are
    /// yielded by the stream.
    pub async fn watch_status(&self) -> Result<StatusStream, WatchError> {
        let response = self
            .http
            .post(self.watch_url.clone())
            .header(header::ACCEPT, NDJSON)
            .json(&Empty {})
            .send()
            .await
            .map_err(|e| WatchError::from_request(&e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(endpoint = %self.endpoint, %status, "status stream rejected");
            return Err(WatchError::HttpStatus(status.as_u16()));
        }

        info!(endpoint = %self.endpoint, "status stream established");
        let decoder = FrameDecoder::with_max_frame_len(self.config.max_frame_len);
        Ok(StatusStream::from_body(response.bytes_stream(), decoder, self.config.idle_timeout))
    }

    /// Fetches the current system status with a single unary call.
    pub async fn system_status(&self) -> Result<StatusUpdate, WatchError> {
        let response = self
            .http
            .post(self.status_url.clone())
            .header(header::ACCEPT, "application/json")
            .json(&Empty {})
            .send()
            .await
            .map_err(|e| WatchError::from_request(&e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(endpoint = %self.endpoint, %status, "system status rejected");
            return Err(WatchError::HttpStatus(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| WatchError::Stream(e.to_string()))?;
        let update: StatusUpdate =
            serde_json::from_slice(&body).map_err(|e| WatchError::Decode(e.to_string()))?;
        update.validate()?;
        Ok(update)
    }
}

/// Parses and checks an endpoint address.
fn parse_endpoint(endpoint: &str) -> Result<Url, WatchError> {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        return Err(invalid(endpoint, "empty address"));
    }

    let candidate =
        if trimmed.contains("://") { trimmed.to_string() } else { format!("http://{trimmed}") };
    let mut url = Url::parse(&candidate).map_err(|e| invalid(endpoint, e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(endpoint, format!("unsupported scheme {:?}", url.scheme())));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid(endpoint, "missing host"));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid(endpoint, "query and fragment are not allowed"));
    }

    // Keep any path prefix when joining method paths.
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn join(endpoint: &str, base: &Url, method: &str) -> Result<Url, WatchError> {
    base.join(method).map_err(|e| invalid(endpoint, e.to_string()))
}

fn invalid(endpoint: &str, reason: impl Into<String>) -> WatchError {
    WatchError::InvalidEndpoint { endpoint: endpoint.to_string(), reason: reason.into() }
}
