//! Application setup and server configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::Extension,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware,
    routing::{get, patch, post},
    Router,
};
use sqlx::PgPool;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::common::StorePolicy;
use crate::config::{Config, IceServer};
use crate::domains::auth::{AuthorizationGate, JwtService};
use crate::domains::exchanges::{ExchangeLifecycleManager, PostgresExchangeStore};
use crate::domains::skills::PostgresSkillCatalog;
use crate::kernel::{RelayConfig, SessionRelay};
use crate::server::middleware::jwt_auth_middleware;
use crate::server::routes::{
    create_exchange_handler, get_exchange_handler, health_handler, ice_servers_handler,
    list_exchanges_handler, rate_exchange_handler, session_ws_handler,
    transition_status_handler, withdraw_exchange_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Absent when running on in-memory stores.
    pub db_pool: Option<PgPool>,
    pub lifecycle: Arc<ExchangeLifecycleManager>,
    pub relay: SessionRelay,
    pub gate: AuthorizationGate,
    pub ice_servers: Arc<Vec<IceServer>>,
}

impl AppState {
    pub fn new(
        lifecycle: ExchangeLifecycleManager,
        relay: SessionRelay,
        gate: AuthorizationGate,
        ice_servers: Vec<IceServer>,
    ) -> Self {
        Self {
            db_pool: None,
            lifecycle: Arc::new(lifecycle),
            relay,
            gate,
            ice_servers: Arc::new(ice_servers),
        }
    }

    /// Postgres-backed state with JWT verification, as run in production.
    pub fn from_config(pool: PgPool, config: &Config) -> Self {
        let policy = StorePolicy::new(config.store_timeout, config.store_max_attempts);
        let lifecycle = ExchangeLifecycleManager::new(
            Arc::new(PostgresExchangeStore::new(pool.clone())),
            Arc::new(PostgresSkillCatalog::new(pool.clone())),
            policy,
        );

        let relay = SessionRelay::with_config(RelayConfig {
            room_capacity: config.session_room_capacity,
            outbox_capacity: config.session_outbox_capacity,
        });

        let jwt_service = JwtService::new(&config.jwt_secret, config.jwt_issuer.clone());
        let gate = AuthorizationGate::new(Arc::new(jwt_service));

        Self::new(lifecycle, relay, gate, config.ice_servers.clone()).with_db_pool(pool)
    }

    pub fn with_db_pool(mut self, pool: PgPool) -> Self {
        self.db_pool = Some(pool);
        self
    }
}

/// Router-level settings: CORS, rate limiting and request timeout.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
    pub request_timeout: Duration,
}

impl HttpSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            allowed_origins: config.allowed_origins.clone(),
            rate_limit_per_second: config.rate_limit_per_second,
            rate_limit_burst: config.rate_limit_burst,
            ..Self::default()
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            rate_limit_per_second: 10,
            rate_limit_burst: 20,
            request_timeout: Duration::from_secs(30),
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
}

/// Build the Axum application router
///
/// The router needs `ConnectInfo<SocketAddr>` (or a forwarding header) for
/// per-IP rate limiting; serve it with `into_make_service_with_connect_info`.
pub fn build_app(state: AppState, settings: &HttpSettings) -> Result<Router> {
    // One token every 1000/rate ms, refilling a bucket of `burst`
    let replenish_ms = (1000 / settings.rate_limit_per_second.max(1)).max(1);
    let rate_limit_config = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(replenish_ms)
            .burst_size(settings.rate_limit_burst.max(1))
            .use_headers()
            .finish()
            .context("Invalid rate limiter configuration")?,
    );

    let rate_limit_layer = GovernorLayer {
        config: rate_limit_config,
    };

    let gate = state.gate.clone();

    let app = Router::new()
        .route(
            "/exchanges",
            post(create_exchange_handler).get(list_exchanges_handler),
        )
        .route(
            "/exchanges/:id",
            get(get_exchange_handler).delete(withdraw_exchange_handler),
        )
        .route("/exchanges/:id/status", patch(transition_status_handler))
        .route("/exchanges/:id/rate", post(rate_exchange_handler))
        .route("/session/ice-servers", get(ice_servers_handler))
        .route("/ws", get(session_ws_handler))
        .route("/health", get(health_handler))
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(middleware::from_fn(move |req, next| {
            jwt_auth_middleware(gate.clone(), req, next)
        }))
        .layer(rate_limit_layer)
        .layer(Extension(state))
        .layer(TimeoutLayer::new(settings.request_timeout))
        .layer(cors_layer(&settings.allowed_origins))
        .layer(TraceLayer::new_for_http());

    Ok(app)
}
