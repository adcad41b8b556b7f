mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use murmur_api::directory::{HttpDirectory, StaticDirectory, UserDirectory};
use murmur_api::logging::{LogBuffer, LogBufferLayer};
use murmur_api::rate_limit::RateLimiter;
use murmur_api::routes;
use murmur_api::state::{AppState, AppStateInner};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;

    // Init logging: stdout plus the in-memory ring buffer
    let log_buffer = LogBuffer::new(config.log_buffer);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "murmur_server=debug,murmur_api=debug,murmur_db=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(LogBufferLayer::new(log_buffer.clone()))
        .init();

    // Init database
    let db = murmur_db::Database::open(&PathBuf::from(&config.db_path))?;

    let directory: Arc<dyn UserDirectory> = match &config.directory {
        Some(dir) => {
            info!("User directory at {}", dir.url);
            Arc::new(HttpDirectory::new(dir.url.clone(), dir.secret_key.clone()))
        }
        None => {
            info!("No user directory configured; /api/users will be empty");
            Arc::new(StaticDirectory::default())
        }
    };

    // Shared state
    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        limiter: RateLimiter::in_memory(config.rate_limit),
        directory,
    });

    let app = routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(
        rate_limit_max = config.rate_limit.max_requests,
        rate_limit_window_ms = config.rate_limit.window.as_millis() as u64,
        log_buffer = log_buffer.capacity(),
        "Murmur server listening on {}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
