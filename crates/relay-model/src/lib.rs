//! Data model shared by the agent crates.
//!
//! - [`domain`]: identifiers, job status, load snapshots and log-upload bookkeeping.
//! - [`kind`]: the immutable job descriptor and the per-kind payloads.
//! - [`wire`]: request/response records exchanged with the control server.

mod domain;
pub use domain::*;

mod kind;
pub use kind::*;

mod wire;
pub use wire::*;

mod error;
pub use error::ModelError;
