//! HTTP server bootstrap for capsule federation.
//!
//! This module wires together:
//! - configuration
//! - the database backend (PostgreSQL or SQLite)
//! - the federation gateway and artifact publisher
//! - the Axum router

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::signal;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::api::{ApiError, ErrorCode};
use crate::auth::{
    ApiKeyValidator, AuthMiddlewareState, Authenticator, RateLimiter, TrustedProxies,
};
use crate::domain::TrustLevel;
use crate::federation::{ArtifactPublisher, FederationGateway, FederationPolicy};
use crate::infra::{AccessLog, ArtifactStore, Database, PeerRegistry, Stores};
use crate::metrics::MetricsRegistry;
use crate::telemetry::{init_tracing, TelemetryConfig};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// `postgres://...` or `sqlite:...`
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub max_connections: u32,
    pub migrate_on_startup: bool,
    /// Domain stamped on artifacts created here and used in their tokens
    pub local_domain: String,
    pub minimum_trust: TrustLevel,
    /// If false, internal routes accept unauthenticated requests.
    pub require_auth: bool,
    pub internal_api_key: Option<String>,
    pub federation_rate_limit: Option<u32>,
    /// Reverse proxies whose `X-Forwarded-For` entries are believed
    pub trusted_proxy_hops: usize,
    pub cors_allow_origins: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env_var("DATABASE_URL")
            .unwrap_or_else(|| "sqlite://capsules.db?mode=rwc".to_string());

        let port: u16 = match env_var("PORT") {
            Some(p) => p
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid PORT {p:?}: {e}"))?,
            None => 8080,
        };
        let host = env_var("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let listen_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid listen address {host}:{port}: {e}"))?;

        let max_connections: u32 = env_var("MAX_DB_CONNECTIONS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        let migrate_on_startup = env_var("DB_MIGRATE_ON_STARTUP")
            .map(|v| {
                !matches!(
                    v.trim().to_ascii_lowercase().as_str(),
                    "0" | "false" | "off"
                )
            })
            .unwrap_or(true);

        let minimum_trust = match env_var("FEDERATION_MIN_TRUST") {
            Some(v) => v
                .parse::<TrustLevel>()
                .map_err(|e| anyhow::anyhow!("FEDERATION_MIN_TRUST: {e}"))?,
            None => TrustLevel::Trusted,
        };

        let require_auth = env_var("AUTH_MODE")
            .map(|v| v.trim() != "disabled")
            .unwrap_or(true);

        Ok(Self {
            database_url,
            listen_addr,
            max_connections,
            migrate_on_startup,
            local_domain: env_var("LOCAL_DOMAIN").unwrap_or_else(|| "localhost".to_string()),
            minimum_trust,
            require_auth,
            internal_api_key: env_var("INTERNAL_API_KEY"),
            federation_rate_limit: env_var("FEDERATION_RATE_LIMIT_PER_MINUTE")
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|v| *v > 0),
            trusted_proxy_hops: match env_var("TRUSTED_PROXY_HOPS") {
                Some(v) => v
                    .trim()
                    .parse()
                    .map_err(|e| anyhow::anyhow!("invalid TRUSTED_PROXY_HOPS {v:?}: {e}"))?,
                None => 0,
            },
            cors_allow_origins: env_var("CORS_ALLOW_ORIGINS"),
        })
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub local_domain: String,
    pub database: Database,
    pub access_log: Arc<dyn AccessLog>,
    pub peers: Arc<dyn PeerRegistry>,
    pub gateway: Arc<FederationGateway>,
    pub publisher: Arc<ArtifactPublisher>,
    pub metrics: Arc<MetricsRegistry>,
    pub trusted_proxies: TrustedProxies,
}

impl AppState {
    pub fn new(
        local_domain: impl Into<String>,
        database: Database,
        policy: FederationPolicy,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let Stores {
            artifacts,
            peers,
            access_log,
        } = database.stores();
        Self::with_stores(local_domain, database, artifacts, peers, access_log, policy, metrics)
    }

    pub fn with_stores(
        local_domain: impl Into<String>,
        database: Database,
        artifacts: Arc<dyn ArtifactStore>,
        peers: Arc<dyn PeerRegistry>,
        access_log: Arc<dyn AccessLog>,
        policy: FederationPolicy,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let gateway = FederationGateway::new(
            artifacts.clone(),
            peers.clone(),
            access_log.clone(),
            policy,
        )
        .with_metrics(metrics.clone());
        let publisher = ArtifactPublisher::new(artifacts).with_metrics(metrics.clone());

        Self {
            local_domain: local_domain.into(),
            database,
            access_log,
            peers,
            gateway: Arc::new(gateway),
            publisher: Arc::new(publisher),
            metrics,
            trusted_proxies: TrustedProxies::default(),
        }
    }

    pub fn with_trusted_proxies(mut self, proxies: TrustedProxies) -> Self {
        self.trusted_proxies = proxies;
        self
    }
}

/// Start the HTTP server.
pub async fn run() -> anyhow::Result<()> {
    init_tracing(&TelemetryConfig::from_env())?;

    info!("Starting capsule federation v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!(
        listen_addr = %config.listen_addr,
        local_domain = %config.local_domain,
        minimum_trust = config.minimum_trust.as_str(),
        max_connections = config.max_connections,
        "configuration loaded"
    );

    let api_key_validator = Arc::new(ApiKeyValidator::new());
    if let Some(key) = &config.internal_api_key {
        api_key_validator.register_plaintext(key, "bootstrap");
        info!("Internal API key is configured");
    }
    if config.require_auth && api_key_validator.is_empty() {
        anyhow::bail!(
            "AUTH_MODE=required but no INTERNAL_API_KEY is set (or set AUTH_MODE=disabled for local dev)"
        );
    }
    if !config.require_auth {
        warn!("AUTH_MODE=disabled: internal routes are unauthenticated");
    }
    let auth_state = AuthMiddlewareState {
        authenticator: Arc::new(Authenticator::new(api_key_validator)),
        require_auth: config.require_auth,
    };
    let trusted_proxies = TrustedProxies::hops(config.trusted_proxy_hops);
    if config.trusted_proxy_hops > 0 {
        info!(hops = config.trusted_proxy_hops, "X-Forwarded-For trusted behind proxies");
    }
    let rate_limiter = config
        .federation_rate_limit
        .map(|rpm| Arc::new(RateLimiter::new(rpm).with_trusted_proxies(trusted_proxies)));

    let database = Database::connect(&config.database_url, config.max_connections).await?;
    info!(backend = database.backend_name(), "Connected to database");

    if config.migrate_on_startup {
        info!("Running database migrations...");
        database.migrate().await?;
        info!("Database migrations applied");
    } else {
        info!("DB migrations skipped (DB_MIGRATE_ON_STARTUP=0)");
    }

    let state = AppState::new(
        config.local_domain.clone(),
        database,
        FederationPolicy::new(config.minimum_trust),
        Arc::new(MetricsRegistry::new()),
    )
    .with_trusted_proxies(trusted_proxies);

    let mut app = build_router(state, auth_state, rate_limiter);
    if let Some(cors_layer) = cors_layer(config.cors_allow_origins.as_deref())? {
        app = app.layer(cors_layer);
    }

    info!("Starting HTTP server on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

/// Assemble the full router.
pub fn build_router(
    state: AppState,
    auth_state: AuthMiddlewareState,
    rate_limiter: Option<Arc<RateLimiter>>,
) -> Router {
    let internal = crate::api::internal_router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        crate::auth::auth_middleware,
    ));

    let mut federation = crate::api::federation_router();
    if let Some(limiter) = rate_limiter {
        federation = federation.layer(axum::middleware::from_fn_with_state(
            limiter,
            crate::auth::rate_limit_middleware,
        ));
    }

    Router::new()
        .nest("/api", internal.merge(federation))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: Option<&str>) -> anyhow::Result<Option<CorsLayer>> {
    let Some(origins) = origins.map(str::trim).filter(|o| !o.is_empty()) else {
        return Ok(None);
    };

    let allow_origin = if origins == "*" {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = origins
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<HeaderValue>()
                    .map_err(|e| anyhow::anyhow!("Invalid CORS origin {s:?}: {e}"))
            })
            .collect::<anyhow::Result<_>>()?;
        AllowOrigin::list(origins)
    };

    Ok(Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
    ))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating shutdown..."),
    }
}

/// Health check endpoint.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "service": "capsule-federation",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness check endpoint.
async fn readiness_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<axum::Json<serde_json::Value>, ApiError> {
    match state.database.ping().await {
        Ok(()) => Ok(axum::Json(serde_json::json!({
            "status": "ready",
            "database": state.database.backend_name(),
        }))),
        Err(e) => {
            warn!(error = %e, "readiness check failed");
            Err(ApiError::new(
                ErrorCode::ServiceUnavailable,
                "Database unavailable",
            ))
        }
    }
}

/// Prometheus text exposition.
async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.to_prometheus().await,
    )
}
