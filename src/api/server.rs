//! HTTP server: router, middleware and serve loop

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    http::{
        header::{CONTENT_TYPE, COOKIE},
        HeaderValue, Method,
    },
    middleware,
    routing::{get, post},
    Router,
};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use super::{error::expose_error_details, handlers};
use crate::core::app_state::AppState;
use crate::core::config::ServerConfig;
use crate::core::error::{Error, Result};
use crate::core::factory::ConfiguredAppState;
use crate::storage::StorageImpl;
use crate::system::metrics::init_registry;

/// How often expired sessions and stale rate-limit windows are swept
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, COOKIE]);

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        cors.allow_origin(Any).allow_credentials(false)
    } else {
        cors.allow_origin(AllowOrigin::list(origins))
            .allow_credentials(true)
    }
}

/// Creates the application router with all routes and middleware
pub fn create_app<S: StorageImpl>(app_state: AppState<S>) -> Router {
    let cors = cors_layer(&app_state.config.server);
    let expose_errors = app_state.config.server.expose_errors;
    init_registry();

    let router = Router::new()
        // Page layout
        .route(
            "/layout",
            get(handlers::get_layout::<S>).post(handlers::resolve_with_defaults::<S>),
        )
        // Lifecycle (admin)
        .route("/draft", post(handlers::save_draft::<S>))
        .route("/publish", post(handlers::publish::<S>))
        .route("/save", post(handlers::save_direct::<S>))
        .route("/publish-page", post(handlers::publish_page::<S>))
        .route("/state", get(handlers::block_state::<S>))
        // Bulk transfer (admin)
        .route("/export", get(handlers::export_rows::<S>))
        .route("/import", post(handlers::import_rows::<S>))
        // Sessions
        .route("/admin/login", post(handlers::login::<S>))
        .route("/admin/logout", post(handlers::logout::<S>))
        // System routes
        .route("/health", get(handlers::health_check::<S>))
        .route("/info", get(handlers::system_info::<S>))
        .route("/metrics", get(handlers::metrics::<S>));

    let router = if expose_errors {
        tracing::warn!("Exposing internal error details in responses");
        router.layer(middleware::map_response(expose_error_details))
    } else {
        router
    };

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(app_state)
}

fn spawn_maintenance<S: StorageImpl>(app_state: &AppState<S>) -> tokio::task::JoinHandle<()> {
    let sessions = app_state.sessions.clone();
    let limiter = app_state.limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
        loop {
            interval.tick().await;
            sessions.purge_expired();
            limiter.purge_stale();
        }
    })
}

async fn serve<S: StorageImpl>(addr: SocketAddr, app_state: AppState<S>) -> Result<()> {
    let maintenance = spawn_maintenance(&app_state);
    let app = create_app(app_state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::config(format!("Cannot bind {}: {}", addr, e)))?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Health check available at http://{}/health", addr);

    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    maintenance.abort();
    result.map_err(|e| Error::config(format!("HTTP server failed: {}", e)))
}

/// Start the HTTP server with the configured AppState
pub async fn start_server(configured_app_state: ConfiguredAppState) -> Result<()> {
    let http_addr = configured_app_state.http_addr();
    tracing::info!(
        "Starting server on {} with {} storage",
        http_addr,
        configured_app_state.backend_name()
    );

    match configured_app_state {
        ConfiguredAppState::Memory { app_state } => serve(http_addr, app_state).await,
        ConfiguredAppState::Sqlite { app_state } => serve(http_addr, app_state).await,
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        _ = terminate => tracing::info!("Received terminate signal"),
    }

    tracing::warn!("Shutting down gracefully");
}
