//! Capsule Federation Library
//!
//! Encrypted artifact storage with capability-token access and
//! cross-domain federation.
//!
//! An owning domain encrypts each artifact under a fresh AES-256-GCM key,
//! stores the ciphertext with a digest of the key, and hands out a token of
//! the form `{domain}/voice/{artifact_id}#{base64url(key)}`. A peer domain
//! presents the key back to the owner's federation gateway, receives the
//! ciphertext if the owner trusts it, and decrypts locally.
//!
//! ## Modules
//!
//! - [`domain`] - Core domain types (artifacts, peers, access log entries)
//! - [`crypto`] - Authenticated cipher, key verification, token codec
//! - [`infra`] - Storage traits and PostgreSQL/SQLite implementations
//! - [`federation`] - Trust policy, gateway, publisher and client
//! - [`auth`] - API keys for internal routes, federation rate limiting
//! - [`api`] - REST routes
//! - [`metrics`] - Counters and Prometheus export
//! - [`telemetry`] - Tracing subscriber setup

pub mod api;
pub mod auth;
pub mod crypto;
pub mod domain;
pub mod federation;
pub mod infra;
pub mod metrics;
pub mod migrations;
pub mod server;
pub mod telemetry;

// Re-export commonly used types
pub use crypto::{CapabilityToken, CipherError, MalformedTokenError};
pub use domain::{AccessType, Artifact, ArtifactId, DenialReason, PeerEntry, TrustLevel};
pub use federation::{ArtifactPublisher, FederationClient, FederationGateway, FetchOutcome};
pub use infra::{CapsuleError, Result};
