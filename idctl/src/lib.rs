//! idctl - identity control layer
//!
//! Authentication and session-token lifecycle for a multi-role client
//! application: OTP-backed signup and login, dual-token issuance (short-lived
//! access token + durable, revocable refresh token persisted per user and
//! device), refresh verification and revocation, and in-session role
//! switching.
//!
//! ## Architecture
//!
//! - [`api`]: HTTP handlers and wire models; one handler per use case
//! - [`auth`]: JWT minting/verification and the authenticated principal
//! - [`otp`]: pluggable OTP provider behind a two-method gateway trait
//! - [`db`]: repository-per-entity persistence over PostgreSQL
//! - [`audit`]: fire-and-forget redacted audit trail
//!
//! The [`Application`] struct owns startup and shutdown: it connects the
//! pool, runs migrations, builds the router, and serves until the shutdown
//! signal fires.

pub mod api;
pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod openapi;
pub mod otp;
pub mod telemetry;
pub mod types;

pub use config::Config;
pub use errors::Error;

use crate::audit::AuditSink;
use crate::otp::OtpProvider;
use axum::{
    routing::{get, post},
    Router,
};
use bon::Builder;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{debug, info, Level};
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

/// Shared application state passed to all handlers
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub otp: Arc<dyn OtpProvider>,
    pub audit: AuditSink,
}

/// Embedded migrations, also used by `#[sqlx::test]` to prepare test databases
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Build the full application router
pub fn build_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/auth/v1/otp", post(api::handlers::auth::send_otp))
        .route("/auth/v1/signup", post(api::handlers::auth::signup))
        .route("/auth/v1/login", post(api::handlers::auth::login))
        .route("/auth/v1/refresh", post(api::handlers::auth::refresh))
        .route("/auth/v1/logout", post(api::handlers::auth::logout))
        .route("/auth/v1/switch-role", post(api::handlers::auth::switch_role))
        .with_state(state);

    Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .merge(auth_routes)
        .merge(RapiDoc::with_openapi("/api-docs/openapi.json", openapi::ApiDoc::openapi()).path("/docs"))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Main application struct that owns all resources and lifecycle.
///
/// 1. **Create**: [`Application::new`] connects the database, runs
///    migrations, instantiates the OTP provider, and builds the router
/// 2. **Serve**: [`Application::serve`] binds a TCP port and handles
///    requests until the shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting identity control layer with configuration: {:#?}", config);

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await?;
        migrator().run(&pool).await?;

        let state = AppState::builder()
            .db(pool.clone())
            .config(config.clone())
            .otp(otp::create_provider(config.otp.clone()))
            .audit(AuditSink::new(pool.clone()))
            .build();

        let router = build_router(state);

        Ok(Self { router, config, pool })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Identity control layer listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;

        Ok(())
    }
}
