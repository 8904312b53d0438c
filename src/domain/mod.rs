//! Domain types for capsule federation
//!
//! - [`Artifact`] / [`NewArtifact`]: encrypted capsules and their metadata
//! - [`PeerEntry`]: registry entries for federation peers
//! - [`AccessLogEntry`]: audit records of fetch attempts

mod access;
mod artifact;
mod peer;
mod types;

pub use access::*;
pub use artifact::*;
pub use peer::*;
pub use types::*;
