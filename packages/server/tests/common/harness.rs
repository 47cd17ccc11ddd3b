//! Test harness with testcontainers for integration testing.
//!
//! Uses a shared Postgres container across all tests. The container and
//! migrations are initialized once on first test, then reused.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{extract::ConnectInfo, Extension, Router};
use skillswap_core::common::{MemberId, StorePolicy};
use skillswap_core::domains::auth::{AuthorizationGate, JwtService};
use skillswap_core::domains::exchanges::{ExchangeLifecycleManager, PostgresExchangeStore};
use skillswap_core::domains::skills::PostgresSkillCatalog;
use skillswap_core::kernel::SessionRelay;
use skillswap_core::server::{build_app, AppState, HttpSettings};
use skillswap_core::IceServer;
use sqlx::PgPool;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

pub const TEST_JWT_SECRET: &str = "test_secret";
pub const TEST_JWT_ISSUER: &str = "skillswap-test";

/// Shared test infrastructure that persists across all tests.
struct SharedTestInfra {
    db_url: String,
    // Keep the container alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
}

/// Global shared infrastructure - initialized once, reused by all tests.
static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        // Run tests with: RUST_LOG=debug cargo test -- --nocapture
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = Postgres::default()
            .with_tag("16")
            .with_cmd(["-c", "max_connections=200"])
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let pg_host = postgres.get_host().await?;
        let pg_port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!(
            "postgresql://postgres:postgres@{}:{}/postgres",
            pg_host, pg_port
        );

        // Run migrations once on the shared database
        let pool = PgPool::connect(&db_url)
            .await
            .context("Failed to connect to Postgres for migrations")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            db_url,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared test infrastructure")
            })
            .await
    }
}

/// Test harness that manages test infrastructure.
///
/// Each test gets a fresh pool against the shared database. Tests create
/// their own members and skills, so they never see each other's rows.
///
/// ```ignore
/// use test_context::test_context;
///
/// #[test_context(TestHarness)]
/// #[tokio::test]
/// async fn my_test(ctx: &TestHarness) {
///     let app = ctx.app();
///     // ... test code
/// }
/// ```
pub struct TestHarness {
    /// Database pool - use this for test fixtures.
    pub db_pool: PgPool,
    pub jwt: JwtService,
    pub relay: SessionRelay,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new().await.expect("Failed to create test harness")
    }

    async fn teardown(self) {
        self.db_pool.close().await;
    }
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        let infra = SharedTestInfra::get().await;

        let db_pool = PgPool::connect(&infra.db_url)
            .await
            .context("Failed to connect to test database")?;

        Ok(Self {
            db_pool,
            jwt: JwtService::new(TEST_JWT_SECRET, TEST_JWT_ISSUER.to_string()),
            relay: SessionRelay::new(),
        })
    }

    pub fn lifecycle(&self) -> ExchangeLifecycleManager {
        ExchangeLifecycleManager::new(
            Arc::new(PostgresExchangeStore::new(self.db_pool.clone())),
            Arc::new(PostgresSkillCatalog::new(self.db_pool.clone())),
            StorePolicy::new(Duration::from_secs(5), 3),
        )
    }

    pub fn state(&self) -> AppState {
        AppState::new(
            self.lifecycle(),
            self.relay.clone(),
            AuthorizationGate::new(Arc::new(self.jwt.clone())),
            vec![IceServer {
                urls: "stun:stun.test:3478".to_string(),
                username: None,
                credential: None,
            }],
        )
        .with_db_pool(self.db_pool.clone())
    }

    /// Router with a fixed client address for the rate limiter, for `oneshot` use.
    pub fn app(&self) -> Router {
        let settings = HttpSettings {
            rate_limit_burst: 1000,
            ..HttpSettings::default()
        };
        build_app(self.state(), &settings)
            .expect("Failed to build app")
            .layer(Extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000)))))
    }

    /// Serve the router on an ephemeral port. Returns its address.
    pub async fn serve(&self) -> Result<SocketAddr> {
        let settings = HttpSettings {
            rate_limit_burst: 1000,
            ..HttpSettings::default()
        };
        let app = build_app(self.state(), &settings)?;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("Failed to bind test listener")?;
        let addr = listener.local_addr()?;

        tokio::spawn(async move {
            let _ = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await;
        });

        Ok(addr)
    }

    pub fn token_for(&self, member_id: MemberId) -> String {
        self.jwt
            .create_token(member_id, chrono::Duration::hours(1))
            .expect("Failed to create token")
    }
}
