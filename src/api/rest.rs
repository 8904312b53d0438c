//! REST API endpoints for capsule federation.

use axum::extract::{ConnectInfo, Extension, FromRequest, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use chrono::Duration;
use std::net::SocketAddr;
use tracing::info;

use super::error::{validation_error, ApiError, DenialResponse, MalformedRequest};
use super::types::{
    AccessHistoryResponse, CreateArtifactRequest, CreateArtifactResponse, FetchArtifactRequest,
    FetchArtifactResponse, VerifyKeyRequest, VerifyKeyResponse,
};
use super::utils::decode_base64_any;
use crate::auth::AuthContextExt;
use crate::crypto::base64_url_decode;
use crate::domain::ArtifactId;
use crate::federation::{FetchOutcome, FetchRequest, PublishOptions};
use crate::server::AppState;

/// Internal routes, mounted under `/api` behind API-key auth.
pub fn internal_router() -> Router<AppState> {
    Router::new()
        .route("/v1/artifacts", post(create_artifact))
        .route("/v1/artifacts/:artifact_id/access-log", get(get_access_history))
}

/// Peer-facing routes, mounted under `/api`. Authorized by the capability
/// key in the request body.
pub fn federation_router() -> Router<AppState> {
    Router::new()
        .route("/v1/federation/fetch", post(fetch_artifact))
        .route("/v1/federation/verify", post(verify_key))
}

/// JSON body on peer-facing routes. Parse failures answer in the same flat
/// `{"error": ...}` shape as denials.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(MalformedRequest))]
struct FederationJson<T>(T);

/// POST /api/v1/artifacts
async fn create_artifact(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Json(request): Json<CreateArtifactRequest>,
) -> Result<(StatusCode, Json<CreateArtifactResponse>), ApiError> {
    let plaintext = decode_base64_any(&request.plaintext_b64)
        .map_err(|e| validation_error("plaintext_b64", e))?;

    let mut options = PublishOptions::default()
        .with_access_type(request.access_type.unwrap_or_default())
        .with_trusted_domains(request.trusted_domains.unwrap_or_default());
    if let Some(secs) = request.expires_in_secs {
        if secs <= 0 {
            return Err(validation_error("expires_in_secs", "must be positive"));
        }
        let ttl = Duration::try_seconds(secs)
            .ok_or_else(|| validation_error("expires_in_secs", "out of range"))?;
        options = options.with_expires_in(ttl);
    }

    let (artifact_id, token) = state
        .publisher
        .create(&plaintext, &state.local_domain, options)
        .await?;

    info!(artifact_id = %artifact_id, caller = %auth.key_label, "artifact published");
    Ok((
        StatusCode::CREATED,
        Json(CreateArtifactResponse {
            artifact_id,
            token: token.encode(),
        }),
    ))
}

/// GET /api/v1/artifacts/:artifact_id/access-log
async fn get_access_history(
    State(state): State<AppState>,
    Path(artifact_id): Path<String>,
) -> Result<Json<AccessHistoryResponse>, ApiError> {
    let artifact_id = ArtifactId::from(artifact_id);
    let entries = state.access_log.history(&artifact_id).await?;

    Ok(Json(AccessHistoryResponse {
        artifact_id,
        entries: entries.into_iter().map(Into::into).collect(),
    }))
}

/// POST /api/v1/federation/fetch
async fn fetch_artifact(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    FederationJson(request): FederationJson<FetchArtifactRequest>,
) -> Result<Response, ApiError> {
    // A blank domain reaches the gateway, which denies and logs it.
    let requesting_domain = request.requesting_domain.trim();

    // An undecodable key is an invalid key, reported after the policy checks.
    let candidate_key = base64_url_decode(request.access_key.trim()).unwrap_or_default();
    let address = state
        .trusted_proxies
        .client_address(&headers, connect_info.as_ref());
    let fetch = FetchRequest::new(request.artifact_id, candidate_key, requesting_domain)
        .with_address(address);

    match state.gateway.fetch(fetch).await? {
        FetchOutcome::Granted(artifact) => {
            let engine = base64::engine::general_purpose::STANDARD;
            Ok(Json(FetchArtifactResponse {
                ciphertext_b64: engine.encode(&artifact.ciphertext),
                nonce_b64: engine.encode(artifact.nonce),
            })
            .into_response())
        }
        FetchOutcome::Denied(reason) => Ok(DenialResponse { error: reason }.into_response()),
    }
}

/// POST /api/v1/federation/verify
async fn verify_key(
    State(state): State<AppState>,
    FederationJson(request): FederationJson<VerifyKeyRequest>,
) -> Result<Json<VerifyKeyResponse>, ApiError> {
    let candidate_key =
        zeroize::Zeroizing::new(base64_url_decode(request.access_key.trim()).unwrap_or_default());
    let verdict = state
        .gateway
        .verify(&request.artifact_id, &candidate_key)
        .await?;

    Ok(Json(VerifyKeyResponse {
        valid: verdict.is_valid(),
        reason: verdict.reason(),
    }))
}
