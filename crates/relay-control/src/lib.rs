//! HTTP transport for the control server and the blob store.
//!
//! [`HttpControlPlane`] implements both [`relay_core::ControlPlane`] and
//! [`relay_core::BlobStore`] over a single `reqwest` client.

mod config;
pub use config::ControlConfig;

mod error;
pub use error::ClientError;

mod classify;

mod endpoints;

mod client;
pub use client::HttpControlPlane;
