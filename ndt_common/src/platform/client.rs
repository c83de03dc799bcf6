//! # Platform Client
//!
//! Authenticated `ApiClient`s plus the rApp's client id, shared by all
//! capability implementations in the sibling modules. Data Management
//! lookups go through a client without transport retries because the
//! connection resolver runs its own bounded retry loop around them.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use super::{PlatformError, TokenSource};
use crate::retrieve::ApiClient;

/// Transient-failure retries for the query capabilities.
pub const HTTP_RETRIES: u32 = 3;

/// REST client for every platform capability the app talks to.
pub struct PlatformClient {
    pub(crate) api: ApiClient,
    /// Sends each request once; used for Data Management.
    pub(crate) jobs_api: ApiClient,
    pub(crate) client_id: String,
}

impl PlatformClient {
    /// Builds a client for the platform at `base_url`, authenticating every
    /// request with a token from `tokens`.
    pub fn new(
        base_url: &str,
        client_id: &str,
        tokens: Arc<dyn TokenSource>,
        ca_cert: Option<&Path>,
    ) -> Result<Self, PlatformError> {
        let api = ApiClient::new(base_url, Some(Arc::clone(&tokens)), ca_cert, HTTP_RETRIES)?;
        let jobs_api = ApiClient::new(base_url, Some(tokens), ca_cert, 0)?;
        info!(base_url = %api.base_url(), client_id, "Platform client ready");
        Ok(Self {
            api,
            jobs_api,
            client_id: client_id.to_string(),
        })
    }

    /// The rApp client id, which is also the Data Management consumer id.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}
