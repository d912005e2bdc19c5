use axum::{
    http::{header, HeaderValue, Method},
    Router,
};
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gymble::api::middleware::session::{create_session_layer, AppState};
use gymble::config::Config;
use gymble::{db, jobs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gymble=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Gymble server...");

    let config = Config::from_env()?;
    tracing::info!(
        access_code_ttl_seconds = config.access_code_ttl_seconds,
        single_use_codes = config.access_code_single_use,
        "Configuration loaded successfully"
    );

    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let session_layer = create_session_layer(pool.clone(), config.cookie_secure).await?;
    tracing::info!("Session layer initialized");

    let mut scheduler = jobs::start_scheduler(pool.clone(), &config).await?;

    let state = AppState {
        pool: pool.clone(),
        config: config.clone(),
    };

    let app = Router::new()
        .merge(gymble::api::health::router())
        .merge(gymble::api::auth::router())
        .merge(gymble::api::gyms::router())
        .merge(gymble::api::plans::router())
        .merge(gymble::api::members::router())
        .merge(gymble::api::attendance::router())
        .merge(gymble::api::dashboard::router())
        .layer(session_layer)
        .layer(cors_layer(&config.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!(base_url = %config.base_url, "Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!(error = %e, "Scheduler did not shut down cleanly");
    }

    Ok(())
}

/// Credentialed CORS for the configured front-end origins
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // Keep serving; the process can still be stopped externally
        tracing::error!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, cleaning up...");
}
