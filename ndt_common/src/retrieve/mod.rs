//! # Data Retrieval Module
//!
//! Generic HTTP plumbing shared by every platform capability client.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: A generic HTTP `ApiClient` built on `reqwest` and
//!   `reqwest-middleware`, featuring bearer-token injection and automatic
//!   retries with exponential backoff.
//! - **`oauth`**: The IAM client-credentials `TokenSource`.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Generic HTTP API client with retry middleware for resilient network requests.
pub mod ky_http;
/// Cached OAuth2 client-credentials token provider.
pub mod oauth;

pub use ky_http::{ApiClient, ApiResponse};
pub use oauth::OAuthTokenProvider;
