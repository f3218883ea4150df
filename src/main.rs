//! Lectern Server
//!
//! Reading-state synchronization and chapter-resource caching: multi-device
//! progress sync with last-write-wins conflict resolution, and
//! lease-coordinated chapter description extraction.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lectern::chapters::HttpExtractionBackend;
use lectern::config::Config;
use lectern::coordinator::{
    BackoffPolicy, DescriptionExtractor, ExtractionService, LeaseCoordinator, SqliteExpiryStore,
};
use lectern::db;
use lectern::routes;
use lectern::state::AppState;

/// Bridges the coordinator to the upstream description model endpoint
struct UpstreamExtractor {
    backend: HttpExtractionBackend,
}

#[async_trait::async_trait]
impl DescriptionExtractor for UpstreamExtractor {
    async fn extract(
        &self,
        book_id: &str,
        chapter_index: u32,
    ) -> anyhow::Result<Vec<lectern::chapters::SceneDescription>> {
        use lectern::chapters::ExtractionBackend;
        let data = self.backend.fetch_descriptions(book_id, chapter_index).await?;
        Ok(data.descriptions)
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lectern=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing::info!("Starting Lectern Server v{}", env!("CARGO_PKG_VERSION"));

    // Initialize database
    let db_pool = db::create_pool(&config.database.url)
        .await
        .expect("Failed to initialize database");
    tracing::info!("Database initialized at {}", config.database.url);

    // Lease store shares the server database
    let lease_store = SqliteExpiryStore::new(db_pool.clone());
    lease_store
        .init()
        .await
        .expect("Failed to initialize lease store");
    let lease = LeaseCoordinator::new(Arc::new(lease_store), config.coordinator.lease_ttl());

    let extractor_url = std::env::var("EXTRACTOR_URL")
        .unwrap_or_else(|_| "http://localhost:8700".to_string());
    let extractor = Arc::new(UpstreamExtractor {
        backend: HttpExtractionBackend::new(extractor_url),
    });

    let backoff = BackoffPolicy {
        budget: config.coordinator.wait_budget(),
        ..BackoffPolicy::default()
    };
    let extraction = ExtractionService::new(db_pool.clone(), lease, extractor, backoff);

    let app_state = AppState::new(config.clone(), db_pool, extraction);

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = Router::new()
        .nest("/health", routes::health::router())
        .nest("/api/v1/progress", routes::progress::router())
        .nest("/api/v1/books", routes::chapters::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state);

    // Start server with graceful shutdown
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Lectern Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listen address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Server shutdown complete");
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
