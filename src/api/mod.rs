//! API layer for capsule federation
//!
//! REST endpoints for peers (fetch, verify) and for the owning domain's own
//! tooling (create, access history).

pub mod error;
mod rest;
pub mod types;
mod utils;

pub use error::{ApiError, DenialResponse, ErrorCode};
pub use rest::{federation_router, internal_router};
