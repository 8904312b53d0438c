//! Requester side of federation: redeem a capability token against its
//! owning domain and decrypt locally.

use base64::Engine;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::api::types::{FetchArtifactRequest, FetchArtifactResponse};
use crate::api::DenialResponse;
use crate::crypto::{decrypt, CapabilityToken, CipherError};
use crate::domain::DenialReason;

/// Path of the fetch endpoint on every peer.
pub const FETCH_PATH: &str = "/api/v1/federation/fetch";

#[derive(Debug, Error)]
pub enum ClientError {
    /// The owning domain refused the request
    #[error("fetch denied: {0}")]
    Denied(DenialReason),

    /// Ciphertext failed authentication under the token's key
    #[error("integrity check failed")]
    Integrity,

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The peer answered with something that is not a valid fetch response
    #[error("unexpected response: {0}")]
    Protocol(String),
}

impl From<CipherError> for ClientError {
    fn from(_: CipherError) -> Self {
        ClientError::Integrity
    }
}

/// HTTP client used by a local domain to fetch artifacts from peers.
pub struct FederationClient {
    http: reqwest::Client,
    local_domain: String,
    scheme: String,
}

impl FederationClient {
    pub fn new(local_domain: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            local_domain: local_domain.into(),
            scheme: "https".to_string(),
        })
    }

    /// Use plain `http://` when contacting peers (local development).
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn local_domain(&self) -> &str {
        &self.local_domain
    }

    fn fetch_url(&self, domain: &str) -> String {
        format!("{}://{}{}", self.scheme, domain, FETCH_PATH)
    }

    /// Fetch the ciphertext named by `token` from its owning domain and
    /// decrypt it with the token's key.
    #[instrument(skip(self, token), fields(domain = %token.domain(), artifact_id = %token.artifact_id()))]
    pub async fn fetch(&self, token: &CapabilityToken) -> Result<Vec<u8>, ClientError> {
        let request = FetchArtifactRequest {
            artifact_id: token.artifact_id().clone(),
            access_key: token.access_key_b64(),
            requesting_domain: self.local_domain.clone(),
        };

        let response = self
            .http
            .post(self.fetch_url(token.domain()))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return match response.json::<DenialResponse>().await {
                Ok(denial) => Err(ClientError::Denied(denial.error)),
                Err(_) => Err(ClientError::Protocol(format!("status {status}"))),
            };
        }

        let body: FetchArtifactResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Protocol(e.to_string()))?;
        let ciphertext = decode_standard(&body.ciphertext_b64, "ciphertext_b64")?;
        let nonce = decode_standard(&body.nonce_b64, "nonce_b64")?;

        debug!(ciphertext_len = ciphertext.len(), "ciphertext received");
        Ok(decrypt(&ciphertext, token.key_bytes(), &nonce)?)
    }
}

fn decode_standard(value: &str, field: &str) -> Result<Vec<u8>, ClientError> {
    base64::engine::general_purpose::STANDARD
        .decode(value)
        .map_err(|e| ClientError::Protocol(format!("{field}: {e}")))
}
