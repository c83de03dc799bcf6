//! # Network Data Template App: server
//!
//! The HTTP surface of the app. The binary in `main.rs` wires it to the
//! platform clients, the message-bus consumer and the report scheduler.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Route table and handlers.
pub mod routes;
/// The background task serving the router.
pub mod server;

pub use routes::{router, AppState, BASE_PATH};
pub use server::spawn_server;
