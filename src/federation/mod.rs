//! Cross-domain federation: trust policy, the serving gateway, artifact
//! publishing and the requesting client.

mod client;
mod gateway;
pub mod policy;
mod publisher;

pub use client::{ClientError, FederationClient, FETCH_PATH};
pub use gateway::{FederationGateway, FetchOutcome, FetchRequest, FetchedArtifact, Verdict};
pub use policy::FederationPolicy;
pub use publisher::{ArtifactPublisher, PublishOptions};
