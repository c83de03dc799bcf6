//! # HTTP Retrieval Utilities
//!
//! An asynchronous API client wrapper around `reqwest` used for every
//! platform capability. It joins paths onto the platform base URL, injects a
//! fresh bearer token from a `TokenSource`, trusts the platform CA and,
//! when asked to, retries transient failures with exponential backoff.

use std::path::Path;
use std::sync::Arc;

use reqwest::{header::HeaderMap, Method, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::platform::{PlatformError, TokenSource};

/// A standardized container for API responses.
///
/// This struct wraps the deserialized data along with metadata about the
/// HTTP transaction, such as status codes and headers.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The successfully deserialized response body, if any.
    pub data: Option<T>,
    /// The raw error body returned by the server if the request failed.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
    /// The headers returned by the server.
    pub headers: HeaderMap,
}

impl<T> ApiResponse<T> {
    /// Turns a non-2xx response into `PlatformError::Status`.
    pub fn into_result(self) -> Result<T, PlatformError> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(PlatformError::Status {
                status: self.status,
                body: self.error_body.unwrap_or_default(),
            }),
        }
    }
}

/// Builds a plain `reqwest` client, trusting `ca_cert` when given.
pub fn build_http_client(ca_cert: Option<&Path>) -> Result<reqwest::Client, PlatformError> {
    let mut builder = reqwest::Client::builder();
    if let Some(path) = ca_cert {
        let pem = std::fs::read(path)?;
        builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        debug!(ca = %path.display(), "Trusting platform CA certificate");
    }
    Ok(builder.build()?)
}

/// Parses `base_url` so that relative paths join below it rather than
/// replacing its last segment.
pub fn parse_base_url(base_url: &str) -> Result<Url, PlatformError> {
    let mut url = Url::parse(base_url)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// A flexible asynchronous HTTP client.
///
/// Built on top of `reqwest_middleware`, it handles base URLs,
/// authentication tokens, and automatic retries.
pub struct ApiClient {
    /// The underlying middleware-enabled client.
    inner: ClientWithMiddleware,
    /// The base URL to which all relative paths are joined.
    base_url: Url,
    /// Source of the bearer token attached to every request.
    tokens: Option<Arc<dyn TokenSource>>,
}

impl ApiClient {
    /// Creates a new `ApiClient` that retries transient failures up to
    /// `max_retries` times with exponential backoff. Zero sends every request
    /// exactly once, for callers that run their own retry loop.
    ///
    /// # Errors
    /// Fails when `base_url` is not an absolute URL or `ca_cert` is unreadable.
    pub fn new(
        base_url: &str,
        tokens: Option<Arc<dyn TokenSource>>,
        ca_cert: Option<&Path>,
        max_retries: u32,
    ) -> Result<Self, PlatformError> {
        let mut builder = ClientBuilder::new(build_http_client(ca_cert)?);
        if max_retries > 0 {
            let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
            builder = builder.with(RetryTransientMiddleware::new_with_policy(retry_policy));
        }
        let client = builder.build();

        Ok(Self {
            inner: client,
            base_url: parse_base_url(base_url)?,
            tokens,
        })
    }

    /// The base URL every path is joined onto.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn bearer(&self) -> Result<Option<String>, PlatformError> {
        let Some(tokens) = &self.tokens else {
            return Ok(None);
        };
        let tokens = Arc::clone(tokens);
        let token = tokio::task::spawn_blocking(move || tokens.get_token())
            .await
            .map_err(|e| PlatformError::MissingToken(e.to_string()))??;
        Ok(Some(token.access_token))
    }

    /// Performs a request and captures status, headers and body.
    ///
    /// # Arguments
    /// * `method` - The HTTP verb.
    /// * `path` - The path relative to the base URL, without a leading slash.
    /// * `query` - Query parameters, encoded by `reqwest`.
    ///
    /// # Errors
    /// Returns a `PlatformError` if token retrieval, URL joining or network
    /// execution fails. Non-2xx statuses are reported in the `ApiResponse`.
    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<ApiResponse<T>, PlatformError>
    where
        T: DeserializeOwned,
    {
        let full_url = self.base_url.join(path)?;
        debug!(%method, url = %full_url, "Platform request");
        let mut req = self.inner.request(method, full_url);

        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(token) = self.bearer().await? {
            req = req.bearer_auth(token);
        }

        let response = req.send().await?;
        let status = response.status();
        let resp_headers = response.headers().clone();

        if status.is_success() {
            let data = response.json::<T>().await?;
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                success: true,
                headers: resp_headers,
            })
        } else {
            let error_text = response.text().await.ok();
            Ok(ApiResponse {
                data: None,
                error_body: error_text,
                status: status.as_u16(),
                success: false,
                headers: resp_headers,
            })
        }
    }

    /// GETs `path` and deserializes a 2xx body, failing on any other status.
    pub async fn get_json<T>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, PlatformError>
    where
        T: DeserializeOwned,
    {
        self.request(Method::GET, path, query).await?.into_result()
    }
}
