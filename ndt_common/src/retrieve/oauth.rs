//! # OAuth2 Client Credentials
//!
//! Fetches IAM access tokens with the client-credentials grant and caches
//! them until shortly before they expire.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{Duration, Utc};
use reqwest::Url;
use serde::Deserialize;
use tokio::runtime::Handle;
use tracing::{debug, info};

use super::ky_http::{build_http_client, parse_base_url};
use crate::platform::{AccessToken, PlatformError, TokenSource};

const TOKEN_PATH: &str = "auth/realms/master/protocol/openid-connect/token";
/// Tokens are treated as expired this long before IAM says they are.
const EXPIRY_LEEWAY_SECONDS: i64 = 5;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// A caching client-credentials token provider.
///
/// `get_token` blocks the calling thread on `handle`, so it must not be
/// called from inside an async task.
pub struct OAuthTokenProvider {
    http: reqwest::Client,
    handle: Handle,
    token_url: Url,
    client_id: String,
    client_secret: String,
    cache: Mutex<Option<AccessToken>>,
}

impl OAuthTokenProvider {
    /// Targets the IAM token endpoint below `base_url`.
    pub fn new(
        base_url: &str,
        client_id: &str,
        client_secret: &str,
        ca_cert: Option<&Path>,
        handle: Handle,
    ) -> Result<Self, PlatformError> {
        Ok(Self {
            http: build_http_client(ca_cert)?,
            handle,
            token_url: parse_base_url(base_url)?.join(TOKEN_PATH)?,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            cache: Mutex::new(None),
        })
    }

    async fn fetch(&self) -> Result<AccessToken, PlatformError> {
        debug!(url = %self.token_url, "Requesting access token");
        let response = self
            .http
            .post(self.token_url.clone())
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", "openid"),
            ])
            .send()
            .await
            .map_err(|e| PlatformError::MissingToken(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::MissingToken(format!("IAM returned {status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::MissingToken(e.to_string()))?;
        Ok(AccessToken {
            access_token: token.access_token,
            expires_at: Utc::now() + Duration::seconds(token.expires_in - EXPIRY_LEEWAY_SECONDS),
        })
    }
}

impl TokenSource for OAuthTokenProvider {
    fn get_token(&self) -> Result<AccessToken, PlatformError> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = cache.as_ref().filter(|t| t.expires_at > Utc::now()) {
            return Ok(token.clone());
        }

        let token = self.handle.block_on(self.fetch())?;
        info!(expires_at = %token.expires_at, "Fetched new access token");
        *cache = Some(token.clone());
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, routing::post, Form, Json, Router};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn spawn_iam(expires_in: i64) -> (String, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/auth/realms/master/protocol/openid-connect/token",
                post(
                    move |State(calls): State<Arc<AtomicUsize>>,
                          Form(form): Form<HashMap<String, String>>| async move {
                        let n = calls.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(
                            form.get("grant_type").map(String::as_str),
                            Some("client_credentials")
                        );
                        assert_eq!(form.get("scope").map(String::as_str), Some("openid"));
                        Json(serde_json::json!({
                            "access_token": format!("token-{n}"),
                            "expires_in": expires_in,
                        }))
                    },
                ),
            )
            .with_state(Arc::clone(&calls));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), calls)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn token_is_cached_until_expiry() {
        let (base, calls) = spawn_iam(300).await;
        let provider = Arc::new(
            OAuthTokenProvider::new(&base, "rapp-client", "secret", None, Handle::current())
                .unwrap(),
        );

        let p = Arc::clone(&provider);
        let (first, second) = tokio::task::spawn_blocking(move || (p.get_token(), p.get_token()))
            .await
            .unwrap();
        assert_eq!(first.unwrap().access_token, "token-0");
        assert_eq!(second.unwrap().access_token, "token-0");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn token_inside_leeway_is_refetched() {
        let (base, calls) = spawn_iam(EXPIRY_LEEWAY_SECONDS).await;
        let provider = Arc::new(
            OAuthTokenProvider::new(&base, "rapp-client", "secret", None, Handle::current())
                .unwrap(),
        );

        let p = Arc::clone(&provider);
        let second = tokio::task::spawn_blocking(move || {
            p.get_token().unwrap();
            p.get_token().unwrap()
        })
        .await
        .unwrap();
        assert_eq!(second.access_token, "token-1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
