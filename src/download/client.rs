//! HTTP client wrapper for ranged payload requests.
//!
//! This module provides the `HttpClient` struct which builds the shared
//! reqwest client (proxy, timeouts, user agent) and issues GET requests with
//! an optional byte-range offset. Payloads are requested with identity
//! encoding so byte offsets and lengths refer to the stored bytes. Response
//! classification is left to the transfer state machine.

use std::time::Duration;

use reqwest::header::{ACCEPT_ENCODING, RANGE};
use reqwest::{Client, Proxy};
use tracing::{debug, instrument};

use super::constants::{CONNECT_TIMEOUT_SECS, TRANSFER_TIMEOUT_SECS};
use super::error::DownloadError;
use crate::user_agent;

/// Settings shared by every HTTP client built for a run.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Proxy URL (`scheme://ip:port`) applied to all requests.
    pub proxy: Option<String>,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout.
    pub timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            proxy: None,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            timeout: Duration::from_secs(TRANSFER_TIMEOUT_SECS),
        }
    }
}

impl ClientSettings {
    /// Returns a copy with a different whole-request timeout.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout,
            ..self.clone()
        }
    }
}

/// HTTP client for payload transfers.
///
/// Created once per run and cloned into workers to share the connection pool.
///
/// # Example
///
/// ```no_run
/// use idfetch_core::download::{ClientSettings, HttpClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new(&ClientSettings::default())?;
/// let response = client.get_from("https://example.com/v.mp4", 1024).await?;
/// println!("status: {}", response.status());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Builds a client from the given settings.
    ///
    /// # Errors
    ///
    /// Returns the reqwest build error (e.g. an unusable proxy URL).
    pub fn new(settings: &ClientSettings) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_client(settings)?,
        })
    }

    /// Sends a GET for `url`, resuming at `offset` bytes when nonzero.
    ///
    /// Only transport failures are errors here; every HTTP status is returned
    /// as a response for the caller to classify.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`], [`DownloadError::Timeout`] or
    /// [`DownloadError::Network`].
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    pub async fn get_from(&self, url: &str, offset: u64) -> Result<reqwest::Response, DownloadError> {
        let parsed = url::Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let mut request = self.client.get(parsed).header(ACCEPT_ENCODING, "identity");
        if offset > 0 {
            debug!(offset, "requesting byte range");
            request = request.header(RANGE, format!("bytes={offset}-"));
        }

        request
            .send()
            .await
            .map_err(|e| DownloadError::from_request(url, e))
    }
}

/// Builds a reqwest client with gzip, timeouts, user agent and optional proxy.
pub(crate) fn build_client(settings: &ClientSettings) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .connect_timeout(settings.connect_timeout)
        .timeout(settings.timeout)
        .gzip(true)
        .user_agent(user_agent::default_user_agent());
    if let Some(proxy) = &settings.proxy {
        builder = builder.proxy(Proxy::all(proxy)?);
    }
    builder.build()
}
